use async_trait::async_trait;
use bytes::Bytes;

use crate::bucket::{Bucket, BucketBytes, BucketError, MAX_READ};

const CRLF: &[u8] = b"\r\n";
const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Outbound HTTP/1.1 chunked transfer-coding encoder.
///
/// Wraps an arbitrary byte-producing bucket and frames its output as
/// `<hex-size>\r\n<payload>\r\n` repeated, terminated by `0\r\n\r\n`.
/// Two buffers are staged: `remaining` (bytes currently being handed
/// out) and `next` (an already-pulled raw payload not yet framed).
/// Payload pulls always request the largest practical size, not the
/// caller's bound, to keep chunks large; the caller's bound only limits
/// how much of the staged bytes one read hands out.
pub struct ChunkEncodeBucket {
    inner: Box<dyn Bucket>,
    remaining: BucketBytes,
    next: BucketBytes,
    add_eol: bool,
    eof: bool,
}

impl ChunkEncodeBucket {
    pub fn new(inner: Box<dyn Bucket>) -> Self {
        Self {
            inner,
            remaining: BucketBytes::Empty,
            next: BucketBytes::Empty,
            add_eol: false,
            eof: false,
        }
    }
}

#[async_trait]
impl Bucket for ChunkEncodeBucket {
    fn peek(&self) -> BucketBytes {
        if self.remaining.has_data() {
            self.remaining.clone()
        } else if self.eof && !self.next.has_data() && !self.add_eol {
            BucketBytes::Eof
        } else {
            BucketBytes::Empty
        }
    }

    async fn read(&mut self, requested: usize) -> Result<BucketBytes, BucketError> {
        if !self.remaining.has_data() {
            if self.next.has_data() {
                self.remaining = std::mem::take(&mut self.next);
            } else if self.add_eol {
                self.remaining = BucketBytes::from(CRLF);
                self.add_eol = false;
            } else if !self.eof {
                let payload = self.inner.read(MAX_READ).await?;
                if payload.has_data() {
                    let header = format!("{:x}\r\n", payload.len());
                    self.remaining = BucketBytes::Data(Bytes::from(header.into_bytes()));
                    self.next = payload;
                    self.add_eol = true;
                } else {
                    self.eof = true;
                    self.remaining = BucketBytes::from(LAST_CHUNK);
                }
            }
        }

        if self.remaining.has_data() {
            let out = self.remaining.split_to(requested.min(self.remaining.len()));
            if !self.remaining.has_data() && self.next.has_data() {
                self.remaining = std::mem::take(&mut self.next);
            }
            return Ok(out);
        }

        Ok(BucketBytes::Eof)
    }
}
