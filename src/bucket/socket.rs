use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::bucket::{Bucket, BucketBytes, BucketError, BucketSink, PollBucket, MAX_READ};

/// Per-refill buffer size.
const READ_BUF: usize = 8192;

/// Bucket over the read half of a TCP stream.
///
/// A `read(n)` with an empty buffer performs one large OS read and
/// hands out at most `n` bytes; the rest stays buffered and peekable.
/// That keeps line-oriented parsing on top of `peek` from consuming
/// past its delimiter.
pub struct SocketBucket {
    half: OwnedReadHalf,
    pending: Bytes,
    eof: bool,
}

impl SocketBucket {
    pub fn new(half: OwnedReadHalf) -> Self {
        Self {
            half,
            pending: Bytes::new(),
            eof: false,
        }
    }
}

#[async_trait]
impl Bucket for SocketBucket {
    fn peek(&self) -> BucketBytes {
        if !self.pending.is_empty() {
            BucketBytes::Data(self.pending.clone())
        } else if self.eof {
            BucketBytes::Eof
        } else {
            BucketBytes::Empty
        }
    }

    async fn read(&mut self, requested: usize) -> Result<BucketBytes, BucketError> {
        if self.pending.is_empty() {
            if self.eof {
                return Ok(BucketBytes::Eof);
            }
            let mut buf = BytesMut::with_capacity(READ_BUF);
            let n = self.half.read_buf(&mut buf).await?;
            if n == 0 {
                self.eof = true;
                return Ok(BucketBytes::Eof);
            }
            self.pending = buf.freeze();
        }
        if requested == 0 {
            return Ok(BucketBytes::Empty);
        }
        let n = requested.min(self.pending.len());
        Ok(BucketBytes::Data(self.pending.split_to(n)))
    }

    fn as_poll(&mut self) -> Option<&mut dyn PollBucket> {
        Some(self)
    }
}

#[async_trait]
impl PollBucket for SocketBucket {
    async fn poll(&mut self, min: usize) -> Result<BucketBytes, BucketError> {
        while self.pending.len() < min && !self.eof {
            let mut buf = BytesMut::with_capacity(READ_BUF);
            let n = self.half.read_buf(&mut buf).await?;
            if n == 0 {
                self.eof = true;
                break;
            }
            if self.pending.is_empty() {
                self.pending = buf.freeze();
            } else {
                let mut joined = BytesMut::from(&self.pending[..]);
                joined.extend_from_slice(&buf);
                self.pending = joined.freeze();
            }
        }
        Ok(self.peek())
    }
}

/// Sink over the write half of a TCP stream.
///
/// `send` pulls the composed bucket segment by segment, so the message
/// is streamed rather than materialized. `shutdown` half-closes the
/// transport and is idempotent.
pub struct SocketSink {
    half: OwnedWriteHalf,
    shut: bool,
}

impl SocketSink {
    pub fn new(half: OwnedWriteHalf) -> Self {
        Self { half, shut: false }
    }
}

#[async_trait]
impl BucketSink for SocketSink {
    async fn send(&mut self, mut bucket: Box<dyn Bucket>) -> Result<(), BucketError> {
        loop {
            match bucket.read(MAX_READ).await? {
                BucketBytes::Data(d) => self.half.write_all(&d).await?,
                BucketBytes::Empty => continue,
                BucketBytes::Eof => break,
            }
        }
        self.half.flush().await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), BucketError> {
        if !self.shut {
            self.shut = true;
            self.half.shutdown().await?;
        }
        Ok(())
    }
}
