//! Frame container codec.
//!
//! Clips are stored on disk as a bare sequence of records:
//!
//! ```text
//! [u16 little-endian frame length][frame length bytes of Opus payload] ...
//! ```
//!
//! There is no header and no trailer; the stream ends at end-of-file. Decoding
//! slices frames out of the file buffer with [`Bytes`], so frames share the
//! single allocation the file was read into.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::path::Path;
use tracing::debug;

use crate::error::{CodecError, Malformation};

/// Size of the little-endian length prefix in front of every frame.
pub const LENGTH_PREFIX: usize = 2;

/// Decodifica un contenedor completo en memoria.
///
/// Ending exactly on a record boundary (including an empty input) is a clean
/// end. Running out of bytes inside a prefix or a payload yields
/// [`CodecError::MalformedContainer`] with the frames decoded so far.
pub fn decode(mut data: Bytes) -> Result<Vec<Bytes>, CodecError> {
    let total = data.len();
    let mut frames = Vec::new();

    while data.has_remaining() {
        let offset = total - data.remaining();

        if data.remaining() < LENGTH_PREFIX {
            return Err(CodecError::MalformedContainer {
                partial: frames,
                reason: Malformation::TruncatedLength { offset },
            });
        }

        let len = data.get_u16_le() as usize;
        if data.remaining() < len {
            return Err(CodecError::MalformedContainer {
                partial: frames,
                reason: Malformation::TruncatedPayload {
                    offset,
                    expected: len,
                    available: data.remaining(),
                },
            });
        }

        frames.push(data.split_to(len));
    }

    Ok(frames)
}

/// Lee y decodifica un archivo de clip.
pub async fn decode_file(path: &Path) -> Result<Vec<Bytes>, CodecError> {
    let raw = tokio::fs::read(path).await?;
    let size = raw.len();
    let frames = decode(Bytes::from(raw))?;
    debug!(
        "📦 {} decodificado: {} frames ({} bytes)",
        path.display(),
        frames.len(),
        size
    );
    Ok(frames)
}

/// Appends one record to `out`.
pub fn put_frame(out: &mut BytesMut, frame: &[u8]) -> Result<(), CodecError> {
    let len = u16::try_from(frame.len()).map_err(|_| CodecError::FrameTooLarge(frame.len()))?;
    out.reserve(LENGTH_PREFIX + frame.len());
    out.put_u16_le(len);
    out.put_slice(frame);
    Ok(())
}

/// Codifica frames en el formato de contenedor.
pub fn encode<I, F>(frames: I) -> Result<Bytes, CodecError>
where
    I: IntoIterator<Item = F>,
    F: AsRef<[u8]>,
{
    let mut out = BytesMut::new();
    for frame in frames {
        put_frame(&mut out, frame.as_ref())?;
    }
    Ok(out.freeze())
}
