use std::collections::VecDeque;

use async_trait::async_trait;

use bytes::Bytes;

use crate::bucket::{Bucket, BucketBytes, BucketError, ReadBuffersBucket};

/// Lazy concatenation of buckets.
///
/// The next operand is untouched until the current one signals Eof.
/// Appending to an aggregate extends it in place, so long composition
/// chains stay flat instead of nesting wrappers.
#[derive(Default)]
pub struct AggregateBucket {
    parts: VecDeque<Box<dyn Bucket>>,
}

impl AggregateBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pair(left: Box<dyn Bucket>, right: Box<dyn Bucket>) -> Self {
        let mut parts = VecDeque::with_capacity(2);
        parts.push_back(left);
        parts.push_back(right);
        Self { parts }
    }

    pub fn push(&mut self, bucket: Box<dyn Bucket>) {
        self.parts.push_back(bucket);
    }

    pub fn push_front(&mut self, bucket: Box<dyn Bucket>) {
        self.parts.push_front(bucket);
    }

    pub fn is_exhausted(&self) -> bool {
        self.parts.is_empty()
    }
}

#[async_trait]
impl Bucket for AggregateBucket {
    fn peek(&self) -> BucketBytes {
        // Cannot pop exhausted operands from `&self`; skim past any
        // that already report Eof.
        for part in &self.parts {
            match part.peek() {
                BucketBytes::Eof => continue,
                other => return other,
            }
        }
        if self.parts.is_empty() {
            BucketBytes::Eof
        } else {
            BucketBytes::Empty
        }
    }

    async fn read(&mut self, requested: usize) -> Result<BucketBytes, BucketError> {
        loop {
            let Some(front) = self.parts.front_mut() else {
                return Ok(BucketBytes::Eof);
            };
            match front.read(requested).await? {
                BucketBytes::Eof => {
                    self.parts.pop_front();
                }
                other => return Ok(other),
            }
        }
    }

    fn remaining_hint(&self) -> Option<u64> {
        let mut total = 0u64;
        for part in &self.parts {
            total += part.remaining_hint()?;
        }
        Some(total)
    }

    fn try_absorb(&mut self, other: Box<dyn Bucket>) -> Result<(), Box<dyn Bucket>> {
        self.parts.push_back(other);
        Ok(())
    }

    fn as_read_buffers(&mut self) -> Option<&mut dyn ReadBuffersBucket> {
        Some(self)
    }
}

#[async_trait]
impl ReadBuffersBucket for AggregateBucket {
    /// Collects whole segments across operands. Stops at the byte
    /// budget or when the current operand has nothing buffered.
    async fn read_buffers(
        &mut self,
        max: usize,
    ) -> Result<(Vec<Bytes>, bool), BucketError> {
        let mut out = Vec::new();
        let mut left = max;
        loop {
            let Some(front) = self.parts.front_mut() else {
                return Ok((out, true));
            };
            match front.read(left).await? {
                BucketBytes::Data(d) => {
                    left = left.saturating_sub(d.len());
                    out.push(d);
                    if left == 0 {
                        return Ok((out, false));
                    }
                }
                BucketBytes::Empty => return Ok((out, false)),
                BucketBytes::Eof => {
                    self.parts.pop_front();
                }
            }
        }
    }
}
