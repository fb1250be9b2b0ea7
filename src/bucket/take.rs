use async_trait::async_trait;

use crate::bucket::{Bucket, BucketBytes, BucketError};

/// Decorator handing out exactly `n` bytes from its inner bucket, then
/// Eof.
///
/// The inner source ending early is an error: a bounded body that comes
/// up short means the transport died mid-message. `into_inner` recovers
/// the inner bucket so a live transport can be handed back once the
/// bound is consumed.
pub struct TakeBucket {
    inner: Box<dyn Bucket>,
    left: u64,
}

impl TakeBucket {
    pub fn new(inner: Box<dyn Bucket>, n: u64) -> Self {
        Self { inner, left: n }
    }

    pub fn is_done(&self) -> bool {
        self.left == 0
    }

    pub fn into_inner(self) -> Box<dyn Bucket> {
        self.inner
    }
}

#[async_trait]
impl Bucket for TakeBucket {
    fn peek(&self) -> BucketBytes {
        if self.left == 0 {
            return BucketBytes::Eof;
        }
        let pk = self.inner.peek();
        if pk.len() as u64 > self.left {
            pk.slice(0, self.left as usize)
        } else {
            pk
        }
    }

    async fn read(&mut self, requested: usize) -> Result<BucketBytes, BucketError> {
        if self.left == 0 {
            return Ok(BucketBytes::Eof);
        }
        let bound = requested.min(usize::try_from(self.left).unwrap_or(usize::MAX));
        match self.inner.read(bound).await? {
            BucketBytes::Data(d) => {
                self.left -= d.len() as u64;
                Ok(BucketBytes::Data(d))
            }
            BucketBytes::Empty => Ok(BucketBytes::Empty),
            BucketBytes::Eof => Err(BucketError::UnexpectedEof("bounded read")),
        }
    }

    fn remaining_hint(&self) -> Option<u64> {
        Some(self.left)
    }
}
