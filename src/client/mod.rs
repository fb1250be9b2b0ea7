//! HTTP/1.1 client built on buckets.
//!
//! The client owns a pool of released channels keyed by origin, hands
//! out per-attempt [`Request`] values, and is the single place where a
//! target's scheme is examined: `http` and `https` share one request
//! implementation and differ only in how the channel is established.

pub mod channel;
pub mod error;
pub mod request;
pub mod response;
pub mod tls;

pub use channel::Channel;
pub use error::ClientError;
pub use request::{Method, Request};
pub use response::Response;
pub use tls::TlsConnector;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use url::Url;

use crate::bucket::{Bucket, BucketSink, SocketBucket, SocketSink};
use crate::client::channel::origin_key;
use crate::config::ClientConfig;

/// Supplies credentials for Basic authentication challenges and
/// pre-authentication.
pub trait CredentialSource: Send + Sync {
    fn credentials(&self, uri: &Url, realm: &str) -> Option<(String, String)>;
}

/// Channel-establishment strategy, selected once per request from the
/// target scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scheme {
    Http,
    Https,
}

struct ClientInner {
    config: ClientConfig,
    /// One reusable slot per origin; insert replaces.
    channels: Mutex<HashMap<String, Channel>>,
    tls: Option<Arc<dyn TlsConnector>>,
    credentials: Option<Arc<dyn CredentialSource>>,
}

/// HTTP(S) client and channel pool. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub struct ClientBuilder {
    config: ClientConfig,
    tls: Option<Arc<dyn TlsConnector>>,
    credentials: Option<Arc<dyn CredentialSource>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            tls: None,
            credentials: None,
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tls_connector(mut self, tls: Arc<dyn TlsConnector>) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn credentials(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(source);
        self
    }

    pub fn build(self) -> Client {
        Client {
            inner: Arc::new(ClientInner {
                config: self.config,
                channels: Mutex::new(HashMap::new()),
                tls: self.tls,
                credentials: self.credentials,
            }),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        ClientBuilder::new().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a request for `target`. The scheme is examined here,
    /// once, to pick the channel-establishment strategy.
    pub fn request(&self, target: &str) -> Result<Request, ClientError> {
        let url =
            Url::parse(target).map_err(|_| ClientError::InvalidTarget(target.to_string()))?;
        self.request_url(url)
    }

    pub fn request_url(&self, url: Url) -> Result<Request, ClientError> {
        let scheme = Self::scheme_for(&url)?;
        Ok(Request::new(self.clone(), url, scheme))
    }

    /// Convenience GET with all redirects resolved.
    pub async fn get(&self, target: &str) -> Result<Response, ClientError> {
        self.request(target)?.get_response().await
    }

    pub(crate) fn scheme_for(url: &Url) -> Result<Scheme, ClientError> {
        match url.scheme() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(ClientError::UnsupportedScheme(other.to_string())),
        }
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub(crate) fn credentials_for(&self, uri: &Url, realm: &str) -> Option<(String, String)> {
        self.inner.credentials.as_ref()?.credentials(uri, realm)
    }

    /// Removes the released channel for this origin, if any.
    pub(crate) async fn take_channel(&self, key: &str) -> Option<Channel> {
        let channel = self.inner.channels.lock().await.remove(key);
        if channel.is_some() {
            tracing::debug!(origin = %key, "reusing pooled channel");
        }
        channel
    }

    /// Returns a drained, reusable channel to its origin slot.
    pub(crate) async fn release_channel(&self, channel: Channel) {
        tracing::debug!(origin = %channel.key, pending_eol = channel.pending_eol, "channel released to pool");
        self.inner
            .channels
            .lock()
            .await
            .insert(channel.key.clone(), channel);
    }

    /// Establishes a fresh transport to the target origin, wrapping it
    /// in TLS for the https strategy. A connect or handshake failure
    /// drops every partially constructed half before propagating.
    pub(crate) async fn connect(&self, url: &Url, scheme: Scheme) -> Result<Channel, ClientError> {
        let key = origin_key(url)?;
        let host = url
            .host_str()
            .ok_or_else(|| ClientError::InvalidTarget(url.to_string()))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ClientError::InvalidTarget(url.to_string()))?;
        let addr = format!("{}:{}", host, port);

        let stream = timeout(self.inner.config.connect_timeout(), TcpStream::connect(&addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout(addr.clone()))?
            .map_err(|e| ClientError::Connect {
                origin: addr.clone(),
                source: e,
            })?;
        tracing::debug!(origin = %key, "connected");

        let (read_half, write_half) = stream.into_split();
        let reader: Box<dyn Bucket> = Box::new(SocketBucket::new(read_half));
        let writer: Box<dyn BucketSink> = Box::new(SocketSink::new(write_half));

        let (reader, writer) = match scheme {
            Scheme::Http => (reader, writer),
            Scheme::Https => {
                let tls = self.inner.tls.as_ref().ok_or(ClientError::TlsUnavailable)?;
                tls.wrap(reader, writer, &host).await?
            }
        };

        Ok(Channel::new(key, reader, writer))
    }
}
