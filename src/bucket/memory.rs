use async_trait::async_trait;
use bytes::Bytes;

use crate::bucket::{Bucket, BucketBytes, BucketError, PollBucket, ReadBuffersBucket, SeekBucket};

/// Leaf bucket over an in-memory byte span.
///
/// Reads hand out reference-counted views into the same storage, so a
/// `MemoryBucket` can be duplicated at an arbitrary offset for free.
#[derive(Debug, Clone)]
pub struct MemoryBucket {
    data: Bytes,
    pos: usize,
}

impl MemoryBucket {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    pub fn from_static(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }
}

impl From<String> for MemoryBucket {
    fn from(s: String) -> Self {
        Self::new(Bytes::from(s.into_bytes()))
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    fn peek(&self) -> BucketBytes {
        if self.pos >= self.data.len() {
            BucketBytes::Eof
        } else {
            BucketBytes::Data(self.data.slice(self.pos..))
        }
    }

    async fn read(&mut self, requested: usize) -> Result<BucketBytes, BucketError> {
        if self.pos >= self.data.len() {
            return Ok(BucketBytes::Eof);
        }
        if requested == 0 {
            return Ok(BucketBytes::Empty);
        }
        let n = requested.min(self.data.len() - self.pos);
        let out = self.data.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(BucketBytes::Data(out))
    }

    fn remaining_hint(&self) -> Option<u64> {
        Some((self.data.len() - self.pos) as u64)
    }

    fn as_seek(&mut self) -> Option<&mut dyn SeekBucket> {
        Some(self)
    }

    fn duplicate_at(&self, offset: u64) -> Option<Box<dyn Bucket>> {
        let pos = (offset as usize).min(self.data.len());
        Some(Box::new(MemoryBucket {
            data: self.data.clone(),
            pos,
        }))
    }

    fn as_poll(&mut self) -> Option<&mut dyn PollBucket> {
        Some(self)
    }

    fn as_read_buffers(&mut self) -> Option<&mut dyn ReadBuffersBucket> {
        Some(self)
    }
}

#[async_trait]
impl PollBucket for MemoryBucket {
    // Everything is already buffered; polling is a peek.
    async fn poll(&mut self, _min: usize) -> Result<BucketBytes, BucketError> {
        Ok(self.peek())
    }
}

#[async_trait]
impl ReadBuffersBucket for MemoryBucket {
    async fn read_buffers(
        &mut self,
        max: usize,
    ) -> Result<(Vec<Bytes>, bool), BucketError> {
        match self.read(max).await? {
            BucketBytes::Data(d) => {
                let done = self.pos >= self.data.len();
                Ok((vec![d], done))
            }
            _ => Ok((Vec::new(), true)),
        }
    }
}

#[async_trait]
impl SeekBucket for MemoryBucket {
    async fn seek(&mut self, position: u64) -> Result<(), BucketError> {
        self.pos = (position as usize).min(self.data.len());
        Ok(())
    }
}
