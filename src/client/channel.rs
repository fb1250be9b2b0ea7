use url::Url;

use crate::bucket::{Bucket, BucketSink};
use crate::client::ClientError;

/// A reusable transport bound to one origin: the reader bucket and
/// writer sink of a live connection, plus the trailing end-of-line
/// quirk that must be drained before the channel serves another
/// request.
pub struct Channel {
    pub(crate) key: String,
    pub(crate) reader: Box<dyn Bucket>,
    pub(crate) writer: Box<dyn BucketSink>,
    pub(crate) pending_eol: bool,
}

impl Channel {
    pub(crate) fn new(key: String, reader: Box<dyn Bucket>, writer: Box<dyn BucketSink>) -> Self {
        Self {
            key,
            reader,
            writer,
            pending_eol: false,
        }
    }

    pub fn origin(&self) -> &str {
        &self.key
    }
}

/// Normalized pool key: `scheme://host:port` with a lowercase host and
/// the effective port.
pub fn origin_key(url: &Url) -> Result<String, ClientError> {
    let host = url
        .host_str()
        .ok_or_else(|| ClientError::InvalidTarget(url.to_string()))?
        .to_ascii_lowercase();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ClientError::InvalidTarget(url.to_string()))?;
    Ok(format!("{}://{}:{}", url.scheme(), host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_key_normalizes_host_and_port() {
        let a = Url::parse("http://Example.COM/x/y?q=1").unwrap();
        let b = Url::parse("http://example.com:80/other").unwrap();
        assert_eq!(origin_key(&a).unwrap(), "http://example.com:80");
        assert_eq!(origin_key(&a).unwrap(), origin_key(&b).unwrap());
    }

    #[test]
    fn origin_key_separates_schemes_and_ports() {
        let http = Url::parse("http://h/").unwrap();
        let https = Url::parse("https://h/").unwrap();
        let alt = Url::parse("http://h:8080/").unwrap();
        assert_ne!(origin_key(&http).unwrap(), origin_key(&https).unwrap());
        assert_ne!(origin_key(&http).unwrap(), origin_key(&alt).unwrap());
    }
}
