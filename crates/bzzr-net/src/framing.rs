//! Length-prefixed framing for the event stream.
//!
//! ```text
//! +-------------------+--------------------+
//! | length (4 bytes)  |   payload          |
//! | u32 little-endian |   (length bytes)   |
//! +-------------------+--------------------+
//! ```
//!
//! The length does **not** include the 4 prefix bytes. A zero-length frame is
//! valid and carries nothing.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Frame size limits.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest payload accepted in either direction, in bytes.
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1 << 20,
        }
    }
}

/// Framing failures.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A frame longer than [`FrameConfig::max_payload_size`].
    #[error("frame of {size} bytes is over the {max} byte limit")]
    PayloadTooLarge {
        /// Offending payload length.
        size: usize,
        /// Limit in force.
        max: u32,
    },

    /// The peer hung up, possibly mid-frame.
    #[error("peer closed the stream")]
    ConnectionClosed,

    /// Any other socket error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FrameError {
    fn too_large(size: usize, config: &FrameConfig) -> Self {
        Self::PayloadTooLarge {
            size,
            max: config.max_payload_size,
        }
    }
}

async fn fill<R: AsyncReadExt + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::ConnectionClosed),
        Err(e) => Err(FrameError::Io(e)),
    }
}

/// Read one frame and return its payload.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Vec<u8>, FrameError> {
    let mut prefix = [0u8; 4];
    fill(reader, &mut prefix).await?;

    let size = u32::from_le_bytes(prefix);
    if size > config.max_payload_size {
        return Err(FrameError::too_large(size as usize, config));
    }

    let mut payload = vec![0u8; size as usize];
    fill(reader, &mut payload).await?;
    Ok(payload)
}

/// Write one frame and flush it.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let size = u32::try_from(payload.len())
        .ok()
        .filter(|size| *size <= config.max_payload_size)
        .ok_or_else(|| FrameError::too_large(payload.len(), config))?;

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&size.to_le_bytes());
    frame.extend_from_slice(payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
