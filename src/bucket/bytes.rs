use bytes::Bytes;

/// A view over bytes produced by a bucket read.
///
/// `Data` is a cheap reference-counted span into the producing bucket's
/// storage. `Empty` means "no data available this call, retry";
/// `Eof` is the permanent end-of-stream marker and is distinguishable
/// from `Empty`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BucketBytes {
    /// A span of bytes. By convention non-empty.
    Data(Bytes),
    /// No data right now; a later read may still produce bytes.
    #[default]
    Empty,
    /// The source is permanently exhausted.
    Eof,
}

impl BucketBytes {
    pub fn len(&self) -> usize {
        match self {
            BucketBytes::Data(d) => d.len(),
            _ => 0,
        }
    }

    /// True when this view carries no bytes. Note that `Eof` is also
    /// empty; use [`BucketBytes::is_eof`] to tell the two apart.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, BucketBytes::Eof)
    }

    pub fn has_data(&self) -> bool {
        self.len() > 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            BucketBytes::Data(d) => d,
            _ => &[],
        }
    }

    /// Returns a view of at most `len` bytes starting at `start`,
    /// sharing the same storage. Slicing `Empty` or `Eof` is a no-op.
    pub fn slice(&self, start: usize, len: usize) -> BucketBytes {
        match self {
            BucketBytes::Data(d) => {
                let start = start.min(d.len());
                let end = (start + len).min(d.len());
                BucketBytes::Data(d.slice(start..end))
            }
            other => other.clone(),
        }
    }

    /// Splits off and returns the first `n` bytes, keeping the rest in
    /// place. No-op on `Empty`/`Eof`.
    pub fn split_to(&mut self, n: usize) -> BucketBytes {
        match self {
            BucketBytes::Data(d) => {
                let n = n.min(d.len());
                let head = d.split_to(n);
                if d.is_empty() {
                    *self = BucketBytes::Empty;
                }
                BucketBytes::Data(head)
            }
            other => other.clone(),
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            BucketBytes::Data(d) => d,
            _ => Bytes::new(),
        }
    }
}

impl From<Bytes> for BucketBytes {
    fn from(b: Bytes) -> Self {
        if b.is_empty() {
            BucketBytes::Empty
        } else {
            BucketBytes::Data(b)
        }
    }
}

impl From<&'static [u8]> for BucketBytes {
    fn from(b: &'static [u8]) -> Self {
        Bytes::from_static(b).into()
    }
}

impl From<Vec<u8>> for BucketBytes {
    fn from(b: Vec<u8>) -> Self {
        Bytes::from(b).into()
    }
}
