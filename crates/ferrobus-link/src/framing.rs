//! Frame-boundary recovery over a byte stream.
//!
//! Modbus RTU has no length prefix; the only frame delimiter a receiver has
//! is silence on the line. [`read_frame`] therefore waits up to the response
//! timeout for the first byte and then keeps reading until the line stays
//! idle for longer than the inter-byte timeout. The same loop is used for
//! TCP, where a response arrives contiguously and the trailing idle gap
//! simply ends the read.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{timeout, Instant};

/// The two receive timeouts of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Maximum wait for the first byte of a reply.
    pub response: Duration,
    /// Maximum idle gap inside one frame; a longer gap ends the frame.
    pub inter_byte: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            response: Duration::from_millis(300),
            inter_byte: Duration::from_millis(32),
        }
    }
}

impl Timeouts {
    pub fn new(response: Duration, inter_byte: Duration) -> Self {
        Self {
            response,
            inter_byte,
        }
    }
}

/// Reads one idle-gap-delimited frame into `buf`.
///
/// Returns the number of bytes received: 0 means the response timeout
/// expired without a single byte, a positive count is a candidate frame
/// (its integrity is the frame parser's business). Reading end-of-stream
/// maps to [`io::ErrorKind::UnexpectedEof`].
pub async fn read_frame<R>(io: &mut R, buf: &mut [u8], timeouts: Timeouts) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut cursor = 0usize;
    let mut last_progress = Instant::now();

    while cursor < buf.len() {
        let idle_budget = if cursor == 0 {
            timeouts.response
        } else {
            timeouts.inter_byte
        };
        let Some(remaining) = idle_budget.checked_sub(last_progress.elapsed()) else {
            break;
        };

        match timeout(remaining, io.read(&mut buf[cursor..])).await {
            Ok(Ok(0)) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed while waiting for a frame",
                ));
            }
            Ok(Ok(n)) => {
                cursor += n;
                last_progress = Instant::now();
            }
            Ok(Err(err)) => return Err(err),
            // Idle gap elapsed: no response yet (cursor == 0) or end of frame.
            Err(_) => break,
        }
    }

    Ok(cursor)
}

/// Discards everything currently readable without waiting for more.
pub async fn drain_pending<R>(io: &mut R) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut scratch = [0u8; 256];
    let mut drained = 0usize;

    loop {
        match timeout(Duration::ZERO, io.read(&mut scratch)).await {
            Ok(Ok(0)) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed while draining",
                ));
            }
            Ok(Ok(n)) => drained += n,
            Ok(Err(err)) => return Err(err),
            Err(_) => return Ok(drained),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{drain_pending, read_frame, Timeouts};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::time::sleep;

    fn test_timeouts() -> Timeouts {
        Timeouts::new(Duration::from_millis(300), Duration::from_millis(32))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_zero_when_no_response_arrives() {
        let (mut near, _far) = tokio::io::duplex(64);
        let mut buf = [0u8; 64];
        let n = read_frame(&mut near, &mut buf, test_timeouts()).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn collects_bytes_split_by_short_pauses() {
        let (mut near, mut far) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            far.write_all(&[0x11, 0x03]).await.unwrap();
            sleep(Duration::from_millis(10)).await;
            far.write_all(&[0x00, 0x6B]).await.unwrap();
            sleep(Duration::from_millis(10)).await;
            far.write_all(&[0x00, 0x03, 0x76, 0x87]).await.unwrap();
            far
        });

        let mut buf = [0u8; 64];
        let n = read_frame(&mut near, &mut buf, test_timeouts()).await.unwrap();
        assert_eq!(&buf[..n], &[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87]);

        writer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn inter_byte_gap_splits_frames() {
        let (mut near, mut far) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            far.write_all(&[0xAA, 0xBB]).await.unwrap();
            sleep(Duration::from_millis(100)).await;
            far.write_all(&[0xCC]).await.unwrap();
            far
        });

        let mut buf = [0u8; 64];
        let n = read_frame(&mut near, &mut buf, test_timeouts()).await.unwrap();
        assert_eq!(&buf[..n], &[0xAA, 0xBB]);

        let n = read_frame(&mut near, &mut buf, test_timeouts()).await.unwrap();
        assert_eq!(&buf[..n], &[0xCC]);

        writer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn first_byte_may_take_up_to_the_response_timeout() {
        let (mut near, mut far) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            sleep(Duration::from_millis(250)).await;
            far.write_all(&[0x42]).await.unwrap();
            far
        });

        let mut buf = [0u8; 64];
        let n = read_frame(&mut near, &mut buf, test_timeouts()).await.unwrap();
        assert_eq!(&buf[..n], &[0x42]);

        writer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_buffer_capacity() {
        let (mut near, mut far) = tokio::io::duplex(64);
        far.write_all(&[0u8; 16]).await.unwrap();

        let mut buf = [0u8; 8];
        let n = read_frame(&mut near, &mut buf, test_timeouts()).await.unwrap();
        assert_eq!(n, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_stream_is_an_error() {
        let (mut near, far) = tokio::io::duplex(64);
        drop(far);

        let mut buf = [0u8; 8];
        let err = read_frame(&mut near, &mut buf, test_timeouts()).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_discards_stale_bytes() {
        let (mut near, mut far) = tokio::io::duplex(64);
        far.write_all(&[1, 2, 3]).await.unwrap();

        assert_eq!(drain_pending(&mut near).await.unwrap(), 3);
        assert_eq!(drain_pending(&mut near).await.unwrap(), 0);
    }
}
