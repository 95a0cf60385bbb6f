//! # Frame Reader/Writer
//!
//! One message, one frame: bytes followed by the [`crate::message::SENTINEL`]
//! terminator. [`FrameReader`] accumulates bytes across as many `read` calls
//! as it takes to observe the sentinel, so it is correct regardless of how
//! the kernel happens to chunk a TCP stream — it never assumes one frame per
//! syscall, and it never assumes one frame per `read`: if a single
//! connection carries multiple frames back-to-back, bytes belonging to the
//! next frame that arrived in the same `read` as the current frame's
//! sentinel are retained for the next call instead of discarded. The size
//! check happens against the accumulated buffer *before* any attempt to
//! decode, so an oversized or runaway sender is rejected cheaply.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FramingError;
use crate::message::{Message, SENTINEL};

/// Buffered, sentinel-framed reader over any `AsyncRead`.
///
/// Construct one per connection and call [`FrameReader::read_frame`]
/// repeatedly; it carries any bytes read past one frame's sentinel forward
/// to the next call.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    /// Prefix of `buf` already confirmed not to contain the sentinel, so a
    /// frame split across many reads isn't rescanned from the start.
    scanned: usize,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            scanned: 0,
        }
    }

    /// Reads and decodes the next framed [`Message`].
    ///
    /// Returns `Ok(None)` once the peer has closed the connection with no
    /// partial frame pending — the clean end of a long-lived session. A
    /// connection closed mid-frame is a [`FramingError::Truncated`] error.
    pub async fn read_frame(
        &mut self,
        max_message_size: usize,
    ) -> Result<Option<Message>, FramingError> {
        loop {
            if let Some(sentinel_at) = self.find_sentinel() {
                let payload_len = sentinel_at;
                if payload_len > max_message_size {
                    return Err(FramingError::FrameTooLarge {
                        size: payload_len,
                        max: max_message_size,
                    });
                }
                let message = Message::from_bytes(&self.buf[..payload_len])?;
                let rest_at = sentinel_at + SENTINEL.len();
                self.buf.drain(..rest_at);
                self.scanned = 0;
                return Ok(Some(message));
            }

            if self.buf.len() > max_message_size + SENTINEL.len() {
                return Err(FramingError::FrameTooLarge {
                    size: self.buf.len(),
                    max: max_message_size,
                });
            }

            let mut chunk = [0u8; 4096];
            let n = self
                .inner
                .read(&mut chunk)
                .await
                .map_err(|_| FramingError::Truncated)?;

            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(FramingError::Truncated);
            }

            self.scanned = self.buf.len().saturating_sub(SENTINEL.len() - 1);
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn find_sentinel(&self) -> Option<usize> {
        let search_from = self.scanned.min(self.buf.len());
        find_subslice(&self.buf[search_from..], SENTINEL).map(|pos| search_from + pos)
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Encodes and writes one framed [`Message`] to `writer`, flushing so the
/// peer observes it promptly.
pub async fn write_frame<W>(writer: &mut W, message: &Message) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = message.to_bytes()?;
    writer
        .write_all(&bytes)
        .await
        .map_err(|e| FramingError::Encode(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| FramingError::Encode(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Body, Operation};
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_a_single_frame() {
        let msg = Message::request(
            "a:1",
            "b:2",
            Some("client".into()),
            None,
            Operation::QueueCreate,
            Body::Text("orders".into()),
        );
        let mut buf = Vec::new();
        write_frame(&mut buf, &msg).await.unwrap();

        let mut reader = FrameReader::new(Cursor::new(buf));
        let decoded = reader.read_frame(4096).await.unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn reads_multiple_frames_from_one_stream() {
        let a = Message::request("a:1", "b:2", None, None, Operation::BrokerInfo, Body::Empty);
        let b = Message::request(
            "a:1",
            "b:2",
            None,
            None,
            Operation::QueuePop,
            Body::Text("q".into()),
        );

        let mut buf = Vec::new();
        write_frame(&mut buf, &a).await.unwrap();
        write_frame(&mut buf, &b).await.unwrap();

        let mut reader = FrameReader::new(Cursor::new(buf));
        let first = reader.read_frame(4096).await.unwrap().unwrap();
        let second = reader.read_frame(4096).await.unwrap().unwrap();
        assert_eq!(first, a);
        assert_eq!(second, b);
    }

    #[tokio::test]
    async fn retains_bytes_past_the_sentinel_for_the_next_frame() {
        // Both frames arrive in a single underlying read, as if the kernel
        // had coalesced them into one chunk.
        let a = Message::request("a:1", "b:2", None, None, Operation::NoOp, Body::Empty);
        let b = Message::request("a:1", "b:2", None, None, Operation::NoOp, Body::Empty);
        let mut buf = Vec::new();
        write_frame(&mut buf, &a).await.unwrap();
        write_frame(&mut buf, &b).await.unwrap();

        let mut reader = FrameReader::new(Cursor::new(buf));
        let first = reader.read_frame(4096).await.unwrap().unwrap();
        assert_eq!(first, a);
        let second = reader.read_frame(4096).await.unwrap().unwrap();
        assert_eq!(second, b);
    }

    #[tokio::test]
    async fn returns_none_on_clean_close() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let result = reader.read_frame(4096).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn rejects_oversized_frame_before_decode() {
        let msg = Message::request(
            "a:1",
            "b:2",
            None,
            None,
            Operation::QueuePush,
            Body::Bytes(vec![0u8; 64]),
        );
        let mut buf = Vec::new();
        write_frame(&mut buf, &msg).await.unwrap();

        let mut reader = FrameReader::new(Cursor::new(buf));
        let result = reader.read_frame(8).await;
        assert!(matches!(result, Err(FramingError::FrameTooLarge { .. })));
    }

    struct OneByteAtATime<T> {
        inner: Cursor<T>,
    }

    impl<T: AsRef<[u8]> + Unpin> AsyncRead for OneByteAtATime<T> {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            let mut one = [0u8; 1];
            let mut tmp = tokio::io::ReadBuf::new(&mut one);
            match std::pin::Pin::new(&mut self.inner).poll_read(cx, &mut tmp) {
                std::task::Poll::Ready(Ok(())) => {
                    let filled = tmp.filled();
                    if !filled.is_empty() {
                        buf.put_slice(filled);
                    }
                    std::task::Poll::Ready(Ok(()))
                }
                other => other,
            }
        }
    }

    #[tokio::test]
    async fn handles_byte_at_a_time_delivery() {
        let msg = Message::request("a:1", "b:2", None, None, Operation::NoOp, Body::Empty);
        let mut buf = Vec::new();
        write_frame(&mut buf, &msg).await.unwrap();

        let mut reader = FrameReader::new(OneByteAtATime {
            inner: Cursor::new(buf),
        });
        let decoded = reader.read_frame(4096).await.unwrap().unwrap();
        assert_eq!(decoded, msg);
    }
}
