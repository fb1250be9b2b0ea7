use std::collections::HashMap;
use std::mem;

use crate::bucket::{
    read_line, Bucket, BucketBytes, BucketError, BucketSink, DechunkBucket, Eol, TakeBucket,
    MAX_READ,
};
use crate::client::channel::Channel;
use crate::client::request::{basic_auth_value, Method, Request};
use crate::client::{Client, ClientError};

const MAX_HEADER_LINE: usize = 16 * 1024;

/// Outcome of resolving one hop's status line, consumed by the loop in
/// [`Request::get_response`].
pub(crate) enum Turn {
    /// Final response; all redirects settled.
    Done(Response),
    /// Redirect-class status with a resolved target; the hop's body has
    /// been drained and its channel released.
    Redirect { target: url::Url },
    /// 401 with usable credentials; resend with this `Authorization`.
    Retry { authorization: String },
}

/// Channel halves kept while a framed body is streamed, so the
/// transport can be reassembled and pooled once the body is drained.
struct ReusableHalf {
    key: String,
    writer: Box<dyn BucketSink>,
    /// Trailing end-of-line quirk to drain before the next exchange.
    pending_eol: bool,
    /// False when the response demanded connection closure.
    reusable: bool,
}

enum Body {
    /// Between construction and status resolution.
    Pending(Channel),
    /// Bounded by an explicit Content-Length.
    Sized { take: TakeBucket, rest: ReusableHalf },
    /// Chunk-delimited.
    Chunked {
        de: DechunkBucket,
        rest: ReusableHalf,
    },
    /// No framing: read until the connection ends. Never reusable.
    /// The writer is held so the transport stays fully open while the
    /// body streams.
    UntilClose {
        reader: Box<dyn Bucket>,
        _writer: Box<dyn BucketSink>,
    },
    Done,
}

/// A parsed HTTP response streaming its body from a channel.
///
/// States: awaiting status line, headers parsed, body streaming,
/// complete. Redirect and authentication branches surface as [`Turn`]
/// values instead of completed responses. The channel is returned to
/// the pool exactly once, and only after the body has been fully
/// drained - "headers parsed" is never sufficient for reuse.
pub struct Response {
    client: Client,
    status: u16,
    version: String,
    reason: String,
    headers: HashMap<String, String>,
    body: Body,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Response {
    pub(crate) fn new(client: Client, channel: Channel) -> Self {
        Self {
            client,
            status: 0,
            version: String::new(),
            reason: String::new(),
            headers: HashMap::new(),
            body: Body::Pending(channel),
        }
    }

    /// Writes the composed request through the channel sink. On failure
    /// the channel is discarded, never pooled.
    pub(crate) async fn send(&mut self, wire: Box<dyn Bucket>) -> Result<(), ClientError> {
        let Body::Pending(channel) = &mut self.body else {
            return Ok(());
        };
        if let Err(e) = channel.writer.send(wire).await {
            self.body = Body::Done;
            return Err(e.into());
        }
        Ok(())
    }

    /// Parses the status line and header block, then classifies the
    /// hop. Any parse or transport failure drops the channel on the
    /// way out.
    pub(crate) async fn resolve(
        mut self,
        req: &Request,
        allow_auth: bool,
    ) -> Result<Turn, ClientError> {
        let Body::Pending(mut channel) = mem::replace(&mut self.body, Body::Done) else {
            return Err(ClientError::InvalidStatusLine("response reused".into()));
        };

        let (mut line, mut eol) = read_line(channel.reader.as_mut(), MAX_HEADER_LINE).await?;
        if channel.pending_eol && line.is_empty() && eol == Eol::CrLf {
            (line, eol) = read_line(channel.reader.as_mut(), MAX_HEADER_LINE).await?;
        }
        channel.pending_eol = false;
        if eol == Eol::None {
            return Err(BucketError::UnexpectedEof("status line").into());
        }

        let text = std::str::from_utf8(&line)
            .map_err(|_| ClientError::InvalidStatusLine(String::from_utf8_lossy(&line).into()))?;
        let mut parts = text.splitn(3, ' ');
        let version = parts.next().unwrap_or("");
        let status = parts.next().unwrap_or("");
        let reason = parts.next().unwrap_or("");
        let Some(version) = version.strip_prefix("HTTP/") else {
            return Err(ClientError::InvalidStatusLine(text.to_string()));
        };
        let status: u16 = match status.parse() {
            Ok(s) if (100..1000).contains(&s) => s,
            _ => return Err(ClientError::InvalidStatusLine(text.to_string())),
        };
        self.version = version.to_string();
        self.status = status;
        self.reason = reason.to_string();
        self.headers = read_header_block(channel.reader.as_mut()).await?;

        match status {
            301 | 302 | 307 | 308 if req.follows_redirects() => {
                let location = self
                    .header("Location")
                    .or_else(|| self.header("Content-Location"))
                    .ok_or(ClientError::MissingRedirectTarget)?
                    .to_string();
                let target = req
                    .uri()
                    .join(&location)
                    .map_err(|_| ClientError::InvalidTarget(location))?;
                self.drain_hop(channel, req.http_method()).await?;
                Ok(Turn::Redirect { target })
            }
            401 if allow_auth => match self.basic_challenge(req) {
                Some(authorization) => {
                    self.drain_hop(channel, req.http_method()).await?;
                    Ok(Turn::Retry { authorization })
                }
                None => {
                    self.begin_body(channel, req.http_method()).await;
                    Ok(Turn::Done(self))
                }
            },
            _ => {
                self.begin_body(channel, req.http_method()).await;
                Ok(Turn::Done(self))
            }
        }
    }

    /// Answers a Basic challenge from the client's credential source,
    /// or None when the challenge cannot be satisfied.
    fn basic_challenge(&self, req: &Request) -> Option<String> {
        let www = self.header("WWW-Authenticate")?;
        let mut parts = www.splitn(2, ' ');
        if !parts.next()?.eq_ignore_ascii_case("basic") {
            return None;
        }
        let realm = parse_realm(parts.next().unwrap_or(""));
        let (user, pass) = self.client.credentials_for(req.uri(), &realm)?;
        Some(basic_auth_value(&user, &pass))
    }

    /// Selects body framing from the headers: chunked transfer-coding
    /// wins; an explicit length bounds the body; absent both, the body
    /// runs until the connection ends and the channel is not reusable.
    async fn begin_body(&mut self, channel: Channel, method: Method) {
        let Channel {
            key,
            reader,
            writer,
            ..
        } = channel;
        let reusable = !self.connection_close();

        let bodyless =
            method == Method::HEAD || self.status == 204 || self.status == 304;
        if bodyless {
            self.body = Body::Done;
            self.release(key, reader, writer, false, reusable).await;
            return;
        }

        if self.chunked() {
            self.body = Body::Chunked {
                de: DechunkBucket::new(reader),
                rest: ReusableHalf {
                    key,
                    writer,
                    pending_eol: true,
                    reusable,
                },
            };
        } else if let Some(len) = self.content_length() {
            if len == 0 {
                self.body = Body::Done;
                self.release(key, reader, writer, false, reusable).await;
            } else {
                self.body = Body::Sized {
                    take: TakeBucket::new(reader, len),
                    rest: ReusableHalf {
                        key,
                        writer,
                        pending_eol: false,
                        reusable,
                    },
                };
            }
        } else {
            self.body = Body::UntilClose {
                reader,
                _writer: writer,
            };
        }
    }

    /// Drains a redirect/auth hop's body and releases its channel so
    /// the next hop can acquire it.
    async fn drain_hop(&mut self, channel: Channel, method: Method) -> Result<(), ClientError> {
        self.begin_body(channel, method).await;
        loop {
            if self.read(MAX_READ).await?.is_eof() {
                return Ok(());
            }
        }
    }

    async fn release(
        &self,
        key: String,
        reader: Box<dyn Bucket>,
        writer: Box<dyn BucketSink>,
        pending_eol: bool,
        reusable: bool,
    ) {
        if reusable {
            let mut channel = Channel::new(key, reader, writer);
            channel.pending_eol = pending_eol;
            self.client.release_channel(channel).await;
        } else {
            tracing::debug!(origin = %key, "channel closed, not pooled");
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length")?.trim().parse().ok()
    }

    fn chunked(&self) -> bool {
        self.header("Transfer-Encoding")
            .map(|te| {
                te.split(',')
                    .any(|t| t.trim().eq_ignore_ascii_case("chunked"))
            })
            .unwrap_or(false)
    }

    fn connection_close(&self) -> bool {
        self.header("Connection")
            .map(|c| c.split(',').any(|t| t.trim().eq_ignore_ascii_case("close")))
            .unwrap_or(false)
    }

    /// Currently buffered body bytes.
    pub fn peek(&self) -> BucketBytes {
        match &self.body {
            Body::Pending(_) => BucketBytes::Empty,
            Body::Sized { take, .. } => take.peek(),
            Body::Chunked { de, .. } => de.peek(),
            Body::UntilClose { reader, .. } => reader.peek(),
            Body::Done => BucketBytes::Eof,
        }
    }

    /// Pulls at most `requested` body bytes. The first Eof hands the
    /// drained channel back to the pool; later reads keep returning
    /// Eof.
    pub async fn read(&mut self, requested: usize) -> Result<BucketBytes, ClientError> {
        let result = match &mut self.body {
            Body::Pending(_) => return Ok(BucketBytes::Empty),
            Body::Done => return Ok(BucketBytes::Eof),
            Body::Sized { take, .. } => take.read(requested).await,
            Body::Chunked { de, .. } => de.read(requested).await,
            Body::UntilClose { reader, .. } => reader.read(requested).await,
        };
        match result {
            Ok(bb) => {
                if bb.is_eof() {
                    self.finish_body().await;
                }
                Ok(bb)
            }
            Err(e) => {
                // Framing state is indeterminate: discard the channel.
                self.body = Body::Done;
                Err(e.into())
            }
        }
    }

    /// Collects the remaining body. Convenience for callers that want
    /// the bytes materialized.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, ClientError> {
        let mut out = Vec::new();
        loop {
            match self.read(MAX_READ).await? {
                BucketBytes::Data(d) => out.extend_from_slice(&d),
                BucketBytes::Empty => continue,
                BucketBytes::Eof => return Ok(out),
            }
        }
    }

    /// Recovers the transport reader from the body decorator and pools
    /// the channel.
    async fn finish_body(&mut self) {
        match mem::replace(&mut self.body, Body::Done) {
            Body::Sized { take, rest } => {
                self.release(
                    rest.key,
                    take.into_inner(),
                    rest.writer,
                    rest.pending_eol,
                    rest.reusable,
                )
                .await;
            }
            Body::Chunked { de, rest } => {
                self.release(
                    rest.key,
                    de.into_inner(),
                    rest.writer,
                    rest.pending_eol,
                    rest.reusable,
                )
                .await;
            }
            // Until-close bodies end with a dead transport; nothing to
            // pool. Pending/Done carry no channel here.
            _ => {}
        }
    }
}

async fn read_header_block(
    reader: &mut dyn Bucket,
) -> Result<HashMap<String, String>, ClientError> {
    let mut headers = HashMap::new();
    loop {
        let (line, eol) = read_line(reader, MAX_HEADER_LINE).await?;
        if eol == Eol::None {
            return Err(BucketError::UnexpectedEof("header block").into());
        }
        if line.is_empty() {
            return Ok(headers);
        }
        let text = String::from_utf8_lossy(&line);
        if let Some((key, value)) = text.split_once(':') {
            headers.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
}

fn parse_realm(challenge: &str) -> String {
    let lower = challenge.to_ascii_lowercase();
    let Some(start) = lower.find("realm=\"") else {
        return String::new();
    };
    let rest = &challenge[start + 7..];
    match rest.find('"') {
        Some(end) => rest[..end].to_string(),
        None => rest.to_string(),
    }
}
