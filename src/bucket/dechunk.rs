use async_trait::async_trait;

use crate::bucket::{read_line, Bucket, BucketBytes, BucketError, Eol};

// Generous cap for the size line: the token itself is at most 16 hex
// digits, but extension parameters may follow.
const MAX_SIZE_LINE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the next chunk-size line.
    Start,
    /// Inside a chunk payload.
    Chunk,
    /// Consuming the CRLF that closes a chunk payload.
    Term,
    /// Consuming the final CRLF after the `0` chunk.
    Fin,
    /// One byte of the final CRLF still owed.
    Fin2,
    Eof,
}

/// Inbound HTTP/1.1 chunked transfer-coding decoder, the structural
/// mirror of [`ChunkEncodeBucket`](crate::bucket::ChunkEncodeBucket).
///
/// Malformed size tokens and a transport that ends mid-frame are decode
/// failures, distinct from I/O errors.
pub struct DechunkBucket {
    inner: Box<dyn Bucket>,
    state: State,
    chunk_left: usize,
}

impl DechunkBucket {
    pub fn new(inner: Box<dyn Bucket>) -> Self {
        Self {
            inner,
            state: State::Start,
            chunk_left: 0,
        }
    }

    pub fn into_inner(self) -> Box<dyn Bucket> {
        self.inner
    }

    async fn advance(&mut self) -> Result<(), BucketError> {
        while self.state != State::Chunk && self.state != State::Eof {
            match self.state {
                State::Start => {
                    let (line, eol) = read_line(self.inner.as_mut(), MAX_SIZE_LINE).await?;
                    if eol == Eol::None {
                        return Err(BucketError::UnexpectedEof("chunk size line"));
                    }
                    self.chunk_left = parse_chunk_size(&line)?;
                    self.state = if self.chunk_left > 0 {
                        State::Chunk
                    } else {
                        State::Fin
                    };
                }
                State::Term => {
                    let bb = self.inner.read(self.chunk_left).await?;
                    if bb.is_eof() {
                        return Err(BucketError::UnexpectedEof("chunk terminator"));
                    }
                    for &b in bb.as_slice() {
                        let expect = if self.chunk_left == 2 { b'\r' } else { b'\n' };
                        if b != expect {
                            return Err(BucketError::Decode("corrupt chunk terminator".into()));
                        }
                        self.chunk_left -= 1;
                    }
                    if self.chunk_left == 0 {
                        self.state = State::Start;
                    }
                }
                State::Fin => {
                    let bb = self.inner.read(2).await?;
                    if bb.is_eof() {
                        return Err(BucketError::UnexpectedEof("final chunk terminator"));
                    }
                    match bb.as_slice() {
                        b"" => {}
                        b"\r\n" => self.state = State::Eof,
                        b"\r" => self.state = State::Fin2,
                        _ => {
                            return Err(BucketError::Decode(
                                "corrupt final chunk terminator".into(),
                            ))
                        }
                    }
                }
                State::Fin2 => {
                    let bb = self.inner.read(1).await?;
                    if bb.is_eof() {
                        return Err(BucketError::UnexpectedEof("final chunk terminator"));
                    }
                    match bb.as_slice() {
                        b"" => {}
                        b"\n" => self.state = State::Eof,
                        _ => {
                            return Err(BucketError::Decode(
                                "corrupt final chunk terminator".into(),
                            ))
                        }
                    }
                }
                State::Chunk | State::Eof => unreachable!(),
            }
        }
        Ok(())
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, BucketError> {
    let token = line
        .iter()
        .position(|&b| b == b';')
        .map_or(line, |i| &line[..i]);
    let token: &[u8] = {
        let s = token
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(token.len());
        let e = token
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(s, |i| i + 1);
        &token[s..e]
    };
    if token.is_empty() || token.len() > 16 || !token.iter().all(u8::is_ascii_hexdigit) {
        return Err(BucketError::Decode(format!(
            "invalid chunk size token: {:?}",
            String::from_utf8_lossy(line)
        )));
    }
    let mut value = 0usize;
    for &b in token {
        let digit = (b as char).to_digit(16).unwrap() as usize;
        value = value
            .checked_mul(16)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| BucketError::Decode("chunk size overflow".into()))?;
    }
    Ok(value)
}

#[async_trait]
impl Bucket for DechunkBucket {
    fn peek(&self) -> BucketBytes {
        match self.state {
            State::Chunk => {
                let pk = self.inner.peek();
                if pk.len() > self.chunk_left {
                    pk.slice(0, self.chunk_left)
                } else {
                    pk
                }
            }
            State::Eof => BucketBytes::Eof,
            _ => BucketBytes::Empty,
        }
    }

    async fn read(&mut self, requested: usize) -> Result<BucketBytes, BucketError> {
        loop {
            match self.state {
                State::Chunk => {
                    let bb = self.inner.read(requested.min(self.chunk_left)).await?;
                    if bb.is_eof() {
                        return Err(BucketError::UnexpectedEof("chunk payload"));
                    }
                    self.chunk_left -= bb.len();
                    if self.chunk_left == 0 {
                        self.state = State::Term;
                        self.chunk_left = 2;
                    }
                    return Ok(bb);
                }
                State::Eof => return Ok(BucketBytes::Eof),
                _ => self.advance().await?,
            }
        }
    }
}
