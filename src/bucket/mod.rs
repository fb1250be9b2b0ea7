//! Lazy pull-based byte sources and sinks.
//!
//! A [`Bucket`] hands out whatever bytes are immediately available, up
//! to a caller-supplied bound, and signals end-of-stream with a sticky
//! [`BucketBytes::Eof`]. Decorator buckets own exactly one inner bucket
//! and transform bytes in flight; concatenation is lazy and keeps long
//! chains flat.

pub mod aggregate;
pub mod bytes;
pub mod chunk;
pub mod dechunk;
pub mod memory;
pub mod socket;
pub mod take;

pub use aggregate::AggregateBucket;
pub use bytes::BucketBytes;
pub use chunk::ChunkEncodeBucket;
pub use dechunk::DechunkBucket;
pub use memory::MemoryBucket;
pub use socket::{SocketBucket, SocketSink};
pub use take::TakeBucket;

use async_trait::async_trait;
use ::bytes::{Bytes, BytesMut};
use thiserror::Error;

/// Upper bound meaning "as much as you have".
pub const MAX_READ: usize = usize::MAX;

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unexpected end of stream in {0}")]
    UnexpectedEof(&'static str),
}

/// A lazy byte source.
///
/// `read` is the sole suspension point; everything else is synchronous.
/// Optional capabilities (seek, duplicate-at-offset) are discovered
/// through the `as_seek`/`duplicate_at` hooks and default to "not
/// supported".
#[async_trait]
pub trait Bucket: Send {
    /// Currently buffered, unconsumed data. Never performs I/O, never
    /// advances the position, and is idempotent until the next read.
    /// May return `Empty` even when a read would produce data.
    fn peek(&self) -> BucketBytes;

    /// Pulls at most `requested` bytes. Returns fewer if that is all
    /// that is immediately available. Once the source is permanently
    /// exhausted this returns `Eof`, and keeps returning `Eof` on every
    /// later call; a byte range handed out once is never handed out
    /// again.
    async fn read(&mut self, requested: usize) -> Result<BucketBytes, BucketError>;

    /// Number of bytes left, when cheaply known.
    fn remaining_hint(&self) -> Option<u64> {
        None
    }

    /// Random-access capability, if this bucket has one.
    fn as_seek(&mut self) -> Option<&mut dyn SeekBucket> {
        None
    }

    /// Creates an independent cursor over the same resource positioned
    /// at `offset`, without disturbing this bucket's position.
    fn duplicate_at(&self, _offset: u64) -> Option<Box<dyn Bucket>> {
        None
    }

    /// Non-blocking poll capability, if this bucket has one.
    fn as_poll(&mut self) -> Option<&mut dyn PollBucket> {
        None
    }

    /// Multi-segment read capability, if this bucket has one.
    fn as_read_buffers(&mut self) -> Option<&mut dyn ReadBuffersBucket> {
        None
    }

    /// In-place append used by [`concat`] to keep composition chains
    /// flat. Buckets that cannot absorb return the operand unchanged.
    fn try_absorb(&mut self, other: Box<dyn Bucket>) -> Result<(), Box<dyn Bucket>> {
        Err(other)
    }
}

/// Random access for buckets that support it. Seeking invalidates any
/// pending peek.
#[async_trait]
pub trait SeekBucket: Bucket {
    async fn seek(&mut self, position: u64) -> Result<(), BucketError>;
}

/// Peek with permission to refill.
///
/// Like [`Bucket::peek`], but a buffering bucket may perform one read
/// from its source so that at least `min` bytes become visible when the
/// source has them. Nothing is consumed; a following `read` hands out
/// the same bytes.
#[async_trait]
pub trait PollBucket: Bucket {
    async fn poll(&mut self, min: usize) -> Result<BucketBytes, BucketError>;
}

/// Vectored read: every immediately available segment in one call.
///
/// Returns up to `max` total bytes as whole segments plus a flag that
/// is true once the source is exhausted. Consumes what it returns.
#[async_trait]
pub trait ReadBuffersBucket: Bucket {
    async fn read_buffers(
        &mut self,
        max: usize,
    ) -> Result<(Vec<Bytes>, bool), BucketError>;
}

/// Polls `bucket` through its facet when it has one, falling back to a
/// plain peek.
pub async fn poll(bucket: &mut dyn Bucket, min: usize) -> Result<BucketBytes, BucketError> {
    match bucket.as_poll() {
        Some(p) => p.poll(min).await,
        None => Ok(bucket.peek()),
    }
}

/// A writable byte sink.
///
/// `send` accepts an already-composed bucket to transmit, so headers
/// and body can be combined lazily without the caller materializing
/// the message; the sink pulls and forwards segment by segment.
#[async_trait]
pub trait BucketSink: Send {
    async fn send(&mut self, bucket: Box<dyn Bucket>) -> Result<(), BucketError>;

    /// Transport half-close/flush. Idempotent.
    async fn shutdown(&mut self) -> Result<(), BucketError>;
}

/// Lazily concatenates two buckets; the right operand is untouched
/// until the left signals Eof. Extends an existing aggregate in place
/// instead of nesting another wrapper.
pub fn concat(mut left: Box<dyn Bucket>, right: Box<dyn Bucket>) -> Box<dyn Bucket> {
    match left.try_absorb(right) {
        Ok(()) => left,
        Err(right) => Box::new(AggregateBucket::pair(left, right)),
    }
}

/// How a line handed out by [`read_line`] was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eol {
    CrLf,
    Lf,
    /// The source ended before any line terminator.
    None,
}

/// Reads one `\n`-terminated line, returning its content without the
/// terminator. Consumes nothing past the line: buffered lookahead via
/// `peek` bounds every read, and when nothing is buffered a single
/// byte is pulled to force a refill.
pub async fn read_line(
    bucket: &mut dyn Bucket,
    max: usize,
) -> Result<(Bytes, Eol), BucketError> {
    let mut out = BytesMut::new();

    loop {
        if out.last() == Some(&b'\n') {
            break;
        }
        if out.len() > max {
            return Err(BucketError::Decode("line too long".into()));
        }

        let pk = bucket.peek();
        let want = match pk {
            BucketBytes::Data(ref d) if !d.is_empty() => {
                match d.iter().position(|&b| b == b'\n') {
                    Some(i) => i + 1,
                    None => d.len(),
                }
            }
            _ => {
                // Nothing buffered: pull one byte so the underlying
                // source refills without overshooting the line.
                match bucket.read(1).await? {
                    BucketBytes::Data(d) => {
                        out.extend_from_slice(&d);
                        continue;
                    }
                    BucketBytes::Empty => continue,
                    BucketBytes::Eof => return Ok((out.freeze(), Eol::None)),
                }
            }
        };

        let mut got = 0;
        while got < want {
            match bucket.read(want - got).await? {
                BucketBytes::Data(d) => {
                    got += d.len();
                    out.extend_from_slice(&d);
                }
                BucketBytes::Empty => continue,
                BucketBytes::Eof => return Ok((out.freeze(), Eol::None)),
            }
        }
    }

    let eol = if out.ends_with(b"\r\n") {
        out.truncate(out.len() - 2);
        Eol::CrLf
    } else {
        out.truncate(out.len() - 1);
        Eol::Lf
    };
    Ok((out.freeze(), eol))
}

/// Reads until Eof, discarding everything.
pub async fn drain(bucket: &mut dyn Bucket) -> Result<u64, BucketError> {
    let mut total = 0u64;
    loop {
        match bucket.read(MAX_READ).await? {
            BucketBytes::Data(d) => total += d.len() as u64,
            BucketBytes::Empty => continue,
            BucketBytes::Eof => return Ok(total),
        }
    }
}

/// Reads until Eof, collecting everything. Test and convenience path;
/// the protocol layers themselves never materialize a full message.
pub async fn read_to_vec(bucket: &mut dyn Bucket) -> Result<Vec<u8>, BucketError> {
    let mut out = Vec::new();
    loop {
        match bucket.read(MAX_READ).await? {
            BucketBytes::Data(d) => out.extend_from_slice(&d),
            BucketBytes::Empty => continue,
            BucketBytes::Eof => return Ok(out),
        }
    }
}
