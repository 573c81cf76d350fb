use bytes::Bytes;
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::{audio::codec, error::CodecError};

/// A named, fully decoded clip. Immutable once loaded; queues hold it by `Arc`.
#[derive(Debug, PartialEq, Eq)]
pub struct Clip {
    pub name: String,
    pub frames: Vec<Bytes>,
}

impl Clip {
    pub fn new(name: impl Into<String>, frames: Vec<Bytes>) -> Self {
        Self {
            name: name.into(),
            frames,
        }
    }
}

/// Listing entry for the `list` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipSummary {
    pub name: String,
    pub frames: usize,
}

impl ClipSummary {
    /// Duración de reproducción a `frame_duration` por frame.
    pub fn duration(&self, frame_duration: Duration) -> Duration {
        frame_duration * self.frames as u32
    }
}

/// Resultado de una carga completa del directorio.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub failures: Vec<(PathBuf, CodecError)>,
}

/// Named clips shared by every guild.
///
/// The map sits behind a `parking_lot::RwLock`; the lock is never held across
/// an `.await`, so decoding happens outside it and only the insert is
/// serialized.
#[derive(Debug)]
pub struct ClipCatalog {
    dir: PathBuf,
    extension: String,
    clips: RwLock<BTreeMap<String, Arc<Clip>>>,
}

impl ClipCatalog {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            clips: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ruta donde vive (o vivirá) el clip `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, self.extension))
    }

    /// Scans the storage directory and registers every file with the clip
    /// extension. Files that fail to decode are skipped and returned in the
    /// report; only an unreadable directory is an error.
    pub async fn load_all(&self) -> std::io::Result<LoadReport> {
        let mut report = LoadReport::default();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = self.clip_name(&path) else {
                debug!("Ignorando {}", path.display());
                continue;
            };

            match self.load_file(&name, &path).await {
                Ok(_) => report.loaded += 1,
                Err(e) => {
                    warn!("⚠️ No se pudo cargar {}: {}", path.display(), e);
                    report.failures.push((path, e));
                }
            }
        }

        info!(
            "📂 Catálogo cargado desde {}: {} clips, {} fallidos",
            self.dir.display(),
            report.loaded,
            report.failures.len()
        );
        Ok(report)
    }

    /// Decodes one file and registers it under `name`. A malformed file
    /// registers nothing, not even its readable prefix.
    pub async fn load_file(&self, name: &str, path: &Path) -> Result<Arc<Clip>, CodecError> {
        let frames = codec::decode_file(path).await?;
        let clip = Arc::new(Clip::new(name, frames));
        self.insert(clip.clone());
        Ok(clip)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Clip>> {
        self.clips.read().get(name).cloned()
    }

    /// Inserta o reemplaza un clip.
    pub fn insert(&self, clip: Arc<Clip>) {
        let name = clip.name.clone();
        if self.clips.write().insert(name.clone(), clip).is_some() {
            info!("♻️ Clip reemplazado: {}", name);
        } else {
            info!("➕ Clip registrado: {}", name);
        }
    }

    /// Resumen ordenado por nombre.
    pub fn list(&self) -> Vec<ClipSummary> {
        self.clips
            .read()
            .values()
            .map(|clip| ClipSummary {
                name: clip.name.clone(),
                frames: clip.frames.len(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clips.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.read().is_empty()
    }

    fn clip_name(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?;
        if !ext.eq_ignore_ascii_case(&self.extension) {
            return None;
        }
        path.file_stem()?.to_str().map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::encode;
    use pretty_assertions::assert_eq;

    async fn write_clip(dir: &Path, file: &str, frames: &[&[u8]]) {
        fs::write(dir.join(file), encode(frames).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn load_all_registers_valid_files_and_reports_broken_ones() {
        let dir = tempfile::tempdir().unwrap();
        write_clip(dir.path(), "hola.dca", &[b"f1", b"f2"]).await;
        write_clip(dir.path(), "adios.dca", &[b"f3"]).await;
        fs::write(dir.path().join("roto.dca"), [9u8, 0, 1])
            .await
            .unwrap();
        fs::write(dir.path().join("notas.txt"), "no es audio")
            .await
            .unwrap();

        let catalog = ClipCatalog::new(dir.path(), "dca");
        let report = catalog.load_all().await.unwrap();

        assert_eq!(report.loaded, 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].0.ends_with("roto.dca"));
        assert!(catalog.get("roto").is_none());
        assert!(catalog.get("notas").is_none());
        assert_eq!(
            catalog.get("hola").unwrap().frames,
            vec![Bytes::from_static(b"f1"), Bytes::from_static(b"f2")]
        );
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ClipCatalog::new(dir.path().join("nope"), "dca");
        assert!(catalog.load_all().await.is_err());
    }

    #[test]
    fn insert_overwrites_and_list_is_sorted() {
        let catalog = ClipCatalog::new("/tmp", "dca");
        catalog.insert(Arc::new(Clip::new("zeta", vec![Bytes::new()])));
        catalog.insert(Arc::new(Clip::new("alfa", vec![])));
        catalog.insert(Arc::new(Clip::new("zeta", vec![Bytes::new(), Bytes::new()])));

        assert_eq!(
            catalog.list(),
            vec![
                ClipSummary { name: "alfa".into(), frames: 0 },
                ClipSummary { name: "zeta".into(), frames: 2 },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_are_not_lost() {
        let catalog = Arc::new(ClipCatalog::new("/tmp", "dca"));
        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let catalog = catalog.clone();
                tokio::spawn(async move {
                    catalog.insert(Arc::new(Clip::new(format!("clip{}", i), vec![])));
                    catalog.get(&format!("clip{}", i)).is_some()
                })
            })
            .collect();

        for found in futures::future::join_all(tasks).await {
            assert!(found.unwrap());
        }
        assert_eq!(catalog.len(), 64);
    }

    #[test]
    fn duration_follows_frame_count() {
        let clip = ClipSummary { name: "x".into(), frames: 50 };
        assert_eq!(clip.duration(Duration::from_millis(20)), Duration::from_secs(1));
    }

    #[test]
    fn path_for_uses_extension() {
        let catalog = ClipCatalog::new("/clips", "dca");
        assert_eq!(catalog.path_for("hola"), PathBuf::from("/clips/hola.dca"));
    }
}
