//! Test doubles shared by the session, registry and dispatcher tests.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    audio::voice::{VoiceConnection, VoiceConnector},
    error::VoiceError,
};

/// Records everything sent to it and how many drains were speaking at once.
#[derive(Default)]
pub struct RecordingConnection {
    frames: Mutex<Vec<Bytes>>,
    speaking_now: AtomicUsize,
    max_speaking: AtomicUsize,
    episodes: AtomicUsize,
    disconnected: AtomicBool,
    fail_after: Option<usize>,
}

impl RecordingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connection that accepts `frames` frames and then reports a lost link.
    pub fn failing_after(frames: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_after: Some(frames),
            ..Self::default()
        })
    }

    pub fn frames(&self) -> Vec<Bytes> {
        self.frames.lock().clone()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn max_speaking(&self) -> usize {
        self.max_speaking.load(Ordering::SeqCst)
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking_now.load(Ordering::SeqCst) > 0
    }

    pub fn episodes(&self) -> usize {
        self.episodes.load(Ordering::SeqCst)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceConnection for RecordingConnection {
    async fn send_frame(&self, frame: Bytes) -> Result<(), VoiceError> {
        if self.is_disconnected() {
            return Err(VoiceError::ConnectionLost("desconectado".into()));
        }
        {
            let mut frames = self.frames.lock();
            if self.fail_after.is_some_and(|limit| frames.len() >= limit) {
                return Err(VoiceError::ConnectionLost("socket cerrado".into()));
            }
            frames.push(frame);
        }
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn set_speaking(&self, speaking: bool) -> Result<(), VoiceError> {
        if speaking {
            let now = self.speaking_now.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_speaking.fetch_max(now, Ordering::SeqCst);
            self.episodes.fetch_add(1, Ordering::SeqCst);
        } else {
            self.speaking_now.fetch_sub(1, Ordering::SeqCst);
        }
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), VoiceError> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out a fresh [`RecordingConnection`] per join and keeps them around.
#[derive(Default)]
pub struct RecordingConnector {
    pub connections: Mutex<Vec<Arc<RecordingConnection>>>,
    pub refuse: bool,
}

impl RecordingConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            refuse: true,
            ..Self::default()
        })
    }

    pub fn last(&self) -> Arc<RecordingConnection> {
        self.connections
            .lock()
            .last()
            .cloned()
            .expect("no se abrió ninguna conexión")
    }

    pub fn connect_count(&self) -> usize {
        self.connections.lock().len()
    }
}

#[async_trait]
impl VoiceConnector for RecordingConnector {
    async fn connect(
        &self,
        _guild_id: GuildId,
        _channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
        if self.refuse {
            return Err(VoiceError::Connect("sin permisos".into()));
        }
        let connection = RecordingConnection::new();
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }
}

/// Espera (con timeout) a que se cumpla una condición.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("la condición no se cumplió a tiempo");
}
