use async_trait::async_trait;

use crate::bucket::{Bucket, BucketError, BucketSink};

/// Collaborator-supplied TLS layer.
///
/// Given the raw transport's reader/writer pair and the target host
/// name, returns a new pair performing the handshake transparently on
/// first use. Everything downstream of the channel stays agnostic to
/// whether TLS is active.
#[async_trait]
pub trait TlsConnector: Send + Sync {
    async fn wrap(
        &self,
        reader: Box<dyn Bucket>,
        writer: Box<dyn BucketSink>,
        host: &str,
    ) -> Result<(Box<dyn Bucket>, Box<dyn BucketSink>), BucketError>;
}
