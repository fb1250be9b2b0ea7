use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use url::{Position, Url};

use crate::bucket::{concat, Bucket, ChunkEncodeBucket, MemoryBucket};
use crate::client::channel::origin_key;
use crate::client::response::{Response, Turn};
use crate::client::{Client, ClientError, Scheme};

/// HTTP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    OPTIONS,
    PATCH,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }
}

enum BodySource {
    /// Replayable across redirect hops.
    Buffer(Bytes),
    /// Streamed; consumed by the first hop that sends it.
    Stream(Option<Box<dyn Bucket>>, Option<u64>),
}

/// A single logical HTTP exchange: per-attempt state whose target URI
/// is rewritten per redirect hop and whose redirect budget is charged
/// once per hop.
pub struct Request {
    client: Client,
    uri: Url,
    scheme: Scheme,
    method: Method,
    headers: HashMap<String, String>,
    body: Option<BodySource>,
    pre_authenticate: bool,
    follow_redirects: bool,
    max_redirects: u32,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("uri", &self.uri)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Request {
    pub(crate) fn new(client: Client, uri: Url, scheme: Scheme) -> Self {
        let max_redirects = client.config().max_redirects;
        Self {
            client,
            uri,
            scheme,
            method: Method::GET,
            headers: HashMap::new(),
            body: None,
            pre_authenticate: false,
            follow_redirects: true,
            max_redirects,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Buffered body; replayable when a redirect forces a resend.
    /// Sent with `Content-Length`.
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(BodySource::Buffer(body.into()));
        self
    }

    /// Streaming body. With a known length it is sent with
    /// `Content-Length`; without one it is chunk-encoded on the wire.
    /// A streaming body can only be sent once.
    pub fn body_stream(mut self, body: Box<dyn Bucket>, length: Option<u64>) -> Self {
        self.body = Some(BodySource::Stream(Some(body), length));
        self
    }

    pub fn pre_authenticate(mut self, yes: bool) -> Self {
        self.pre_authenticate = yes;
        self
    }

    pub fn follow_redirects(mut self, yes: bool) -> Self {
        self.follow_redirects = yes;
        self
    }

    pub fn max_redirects(mut self, n: u32) -> Self {
        self.max_redirects = n;
        self
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub(crate) fn http_method(&self) -> Method {
        self.method
    }

    pub(crate) fn follows_redirects(&self) -> bool {
        self.follow_redirects
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }

    /// Composes the wire bytes of this request as a lazy bucket chain:
    /// request line, header block, then the (possibly chunk-encoded)
    /// body. Payload bytes are never copied.
    ///
    /// Public so integration tests can assert on the produced bytes.
    pub fn compose(&mut self) -> Result<Box<dyn Bucket>, ClientError> {
        let path = &self.uri[Position::BeforePath..Position::AfterQuery];
        let line = format!("{} {} HTTP/1.1\r\n", self.method.as_str(), path);

        let mut block = String::new();
        if !self.has_header("host") {
            let host = self
                .uri
                .host_str()
                .ok_or_else(|| ClientError::InvalidTarget(self.uri.to_string()))?;
            match self.uri.port() {
                Some(port) => block.push_str(&format!("Host: {}:{}\r\n", host, port)),
                None => block.push_str(&format!("Host: {}\r\n", host)),
            }
        }
        if !self.has_header("accept-encoding") {
            // No content decoding in this layer, so advertise none.
            block.push_str("Accept-Encoding: identity\r\n");
        }
        if let Some(ua) = &self.client.config().user_agent {
            if !self.has_header("user-agent") {
                block.push_str(&format!("User-Agent: {}\r\n", ua));
            }
        }
        match &self.body {
            Some(BodySource::Buffer(b)) if !self.has_header("content-length") => {
                block.push_str(&format!("Content-Length: {}\r\n", b.len()));
            }
            Some(BodySource::Stream(_, Some(len))) if !self.has_header("content-length") => {
                block.push_str(&format!("Content-Length: {}\r\n", len));
            }
            Some(BodySource::Stream(_, None)) if !self.has_header("transfer-encoding") => {
                block.push_str("Transfer-Encoding: chunked\r\n");
            }
            _ => {}
        }
        for (key, value) in &self.headers {
            block.push_str(&format!("{}: {}\r\n", key, value));
        }
        block.push_str("\r\n");

        let head = concat(
            Box::new(MemoryBucket::from(line)),
            Box::new(MemoryBucket::from(block)),
        );

        Ok(match &mut self.body {
            None => head,
            Some(BodySource::Buffer(b)) => {
                concat(head, Box::new(MemoryBucket::new(b.clone())))
            }
            Some(BodySource::Stream(stream, length)) => {
                let stream = stream.take().ok_or(ClientError::BodyConsumed)?;
                match length {
                    Some(_) => concat(head, stream),
                    None => concat(head, Box::new(ChunkEncodeBucket::new(stream))),
                }
            }
        })
    }

    /// Drives the exchange to a settled response: acquires or reuses a
    /// channel, sends the composed request, and resolves status-line
    /// turns until every redirect (and at most one authentication
    /// retry) is absorbed. The caller never observes an intermediate
    /// 3xx response.
    pub async fn get_response(mut self) -> Result<Response, ClientError> {
        let mut budget = self.max_redirects;
        let mut auth_tried = false;

        loop {
            let key = origin_key(&self.uri)?;
            let channel = match self.client.take_channel(&key).await {
                Some(channel) => channel,
                None => self.client.connect(&self.uri, self.scheme).await?,
            };

            if self.pre_authenticate && !self.has_header("authorization") {
                if let Some((user, pass)) =
                    self.client.credentials_for(&self.uri, "pre-authenticate")
                {
                    self.headers
                        .insert("Authorization".into(), basic_auth_value(&user, &pass));
                }
            }

            let wire = self.compose()?;
            let mut response = Response::new(self.client.clone(), channel);
            response.send(wire).await?;

            match response.resolve(&self, !auth_tried).await? {
                Turn::Done(response) => return Ok(response),
                Turn::Redirect { target } => {
                    if budget == 0 {
                        return Err(ClientError::TooManyRedirects(self.max_redirects));
                    }
                    budget -= 1;
                    tracing::debug!(from = %self.uri, to = %target, remaining = budget, "following redirect");
                    self.scheme = Client::scheme_for(&target)?;
                    self.uri = target;
                }
                Turn::Retry { authorization } => {
                    auth_tried = true;
                    self.headers.insert("Authorization".into(), authorization);
                }
            }
        }
    }
}

pub(crate) fn basic_auth_value(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, pass)))
}
