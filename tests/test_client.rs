//! End-to-end client tests against a scripted loopback server:
//! keep-alive channel reuse, redirect chaining, chunked bodies, and
//! Basic authentication.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use url::Url;

use rill::client::{Client, ClientError, CredentialSource};

/// One canned response; `close_after` drops the connection once it is
/// written.
struct Canned {
    bytes: Vec<u8>,
    close_after: bool,
}

fn ok_body(body: &str) -> Canned {
    Canned {
        bytes: format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
        .into_bytes(),
        close_after: false,
    }
}

fn redirect(to: &str) -> Canned {
    Canned {
        bytes: format!(
            "HTTP/1.1 302 Found\r\nLocation: {}\r\nContent-Length: 0\r\n\r\n",
            to
        )
        .into_bytes(),
        close_after: false,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_test_writer()
        .try_init();
}

struct TestServer {
    addr: SocketAddr,
    accepts: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    async fn request_heads(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

/// Serves canned responses in order, across however many connections
/// the client opens. Connections are kept alive until told otherwise.
async fn spawn_server(responses: Vec<Canned>) -> TestServer {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let queue = Arc::new(Mutex::new(VecDeque::from(responses)));

    let accepts_counter = accepts.clone();
    let request_log = requests.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                break;
            };
            accepts_counter.fetch_add(1, Ordering::SeqCst);
            let queue = queue.clone();
            let request_log = request_log.clone();
            tokio::spawn(async move {
                let mut buf: Vec<u8> = Vec::new();
                loop {
                    // read one request head; the tests only send
                    // bodyless requests
                    let head_end = loop {
                        if let Some(i) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            break Some(i + 4);
                        }
                        let mut tmp = [0u8; 1024];
                        match sock.read(&mut tmp).await {
                            Ok(0) | Err(_) => break None,
                            Ok(n) => buf.extend_from_slice(&tmp[..n]),
                        }
                    };
                    let Some(end) = head_end else { break };
                    let head: Vec<u8> = buf.drain(..end).collect();
                    request_log
                        .lock()
                        .await
                        .push(String::from_utf8_lossy(&head).into_owned());

                    let Some(canned) = queue.lock().await.pop_front() else {
                        break;
                    };
                    if sock.write_all(&canned.bytes).await.is_err() {
                        break;
                    }
                    let _ = sock.flush().await;
                    if canned.close_after {
                        break;
                    }
                }
            });
        }
    });

    TestServer {
        addr,
        accepts,
        requests,
    }
}

#[tokio::test]
async fn simple_get_returns_status_and_body() -> Result<()> {
    let server = spawn_server(vec![ok_body("ok")]).await;
    let client = Client::new();

    let mut response = client.get(&server.url("/a")).await?;
    assert_eq!(response.status(), 200);
    assert_eq!(response.version(), "1.1");
    assert_eq!(response.read_to_end().await?, b"ok");
    Ok(())
}

#[tokio::test]
async fn drained_keep_alive_response_reuses_the_transport() -> Result<()> {
    let server = spawn_server(vec![ok_body("one"), ok_body("two")]).await;
    let client = Client::new();

    let mut first = client.get(&server.url("/1")).await?;
    assert_eq!(first.read_to_end().await?, b"one");

    let mut second = client.get(&server.url("/2")).await?;
    assert_eq!(second.read_to_end().await?, b"two");

    assert_eq!(server.accepts(), 1);
    Ok(())
}

#[tokio::test]
async fn undrained_response_never_returns_its_channel() -> Result<()> {
    let server = spawn_server(vec![ok_body("one"), ok_body("two")]).await;
    let client = Client::new();

    let first = client.get(&server.url("/1")).await?;
    drop(first); // body never drained; channel must not be pooled

    let mut second = client.get(&server.url("/2")).await?;
    assert_eq!(second.read_to_end().await?, b"two");

    assert_eq!(server.accepts(), 2);
    Ok(())
}

#[tokio::test]
async fn distinct_origins_never_share_a_channel() -> Result<()> {
    let a = spawn_server(vec![ok_body("a")]).await;
    let b = spawn_server(vec![ok_body("b")]).await;
    let client = Client::new();

    let mut ra = client.get(&a.url("/")).await?;
    assert_eq!(ra.read_to_end().await?, b"a");
    let mut rb = client.get(&b.url("/")).await?;
    assert_eq!(rb.read_to_end().await?, b"b");

    assert_eq!(a.accepts(), 1);
    assert_eq!(b.accepts(), 1);
    Ok(())
}

#[tokio::test]
async fn same_host_redirect_settles_on_one_connection() -> Result<()> {
    let server = spawn_server(vec![redirect("/b"), ok_body("ok")]).await;
    let client = Client::new();

    let mut response = client.get(&server.url("/a")).await?;
    assert_eq!(response.status(), 200);
    assert_eq!(response.read_to_end().await?, b"ok");

    // both hops shared one physical connection
    assert_eq!(server.accepts(), 1);
    let heads = server.request_heads().await;
    assert_eq!(heads.len(), 2);
    assert!(heads[0].starts_with("GET /a "));
    assert!(heads[1].starts_with("GET /b "));
    Ok(())
}

#[tokio::test]
async fn cross_origin_redirect_switches_transport() -> Result<()> {
    let b = spawn_server(vec![ok_body("from-b")]).await;
    let a = spawn_server(vec![redirect(&b.url("/x"))]).await;
    let client = Client::new();

    let mut response = client.get(&a.url("/a")).await?;
    assert_eq!(response.status(), 200);
    assert_eq!(response.read_to_end().await?, b"from-b");

    assert_eq!(a.accepts(), 1);
    assert_eq!(b.accepts(), 1);
    Ok(())
}

#[tokio::test]
async fn relative_redirect_is_resolved_against_the_current_target() -> Result<()> {
    let server = spawn_server(vec![redirect("sibling"), ok_body("ok")]).await;
    let client = Client::new();

    let response = client.get(&server.url("/dir/a")).await?;
    assert_eq!(response.status(), 200);

    let heads = server.request_heads().await;
    assert!(heads[1].starts_with("GET /dir/sibling "));
    Ok(())
}

#[tokio::test]
async fn unbounded_redirect_chain_fails_with_budget_error() -> Result<()> {
    let hops: Vec<Canned> = (0..16).map(|_| redirect("/loop")).collect();
    let server = spawn_server(hops).await;
    let client = Client::new();

    let err = client.get(&server.url("/loop")).await.unwrap_err();
    assert!(matches!(err, ClientError::TooManyRedirects(10)));

    // one initial request plus exactly ten charged hops
    assert_eq!(server.request_heads().await.len(), 11);
    Ok(())
}

#[tokio::test]
async fn redirect_without_target_is_a_protocol_error() -> Result<()> {
    let server = spawn_server(vec![Canned {
        bytes: b"HTTP/1.1 302 Found\r\nContent-Length: 0\r\n\r\n".to_vec(),
        close_after: false,
    }])
    .await;
    let client = Client::new();

    let err = client.get(&server.url("/a")).await.unwrap_err();
    assert!(matches!(err, ClientError::MissingRedirectTarget));
    Ok(())
}

#[tokio::test]
async fn malformed_status_line_is_a_decode_failure() -> Result<()> {
    let server = spawn_server(vec![Canned {
        bytes: b"NOT-HTTP nonsense\r\n\r\n".to_vec(),
        close_after: true,
    }])
    .await;
    let client = Client::new();

    let err = client.get(&server.url("/a")).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidStatusLine(_)));
    Ok(())
}

#[tokio::test]
async fn chunked_body_is_decoded_and_channel_stays_reusable() -> Result<()> {
    let server = spawn_server(vec![
        Canned {
            bytes: b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n"
                .to_vec(),
            close_after: false,
        },
        ok_body("next"),
    ])
    .await;
    let client = Client::new();

    let mut first = client.get(&server.url("/1")).await?;
    assert_eq!(first.read_to_end().await?, b"hello world");

    let mut second = client.get(&server.url("/2")).await?;
    assert_eq!(second.read_to_end().await?, b"next");

    assert_eq!(server.accepts(), 1);
    Ok(())
}

#[tokio::test]
async fn connection_close_response_is_not_pooled() -> Result<()> {
    let server = spawn_server(vec![
        Canned {
            bytes: b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close\r\n\r\none".to_vec(),
            close_after: true,
        },
        ok_body("two"),
    ])
    .await;
    let client = Client::new();

    let mut first = client.get(&server.url("/1")).await?;
    assert_eq!(first.read_to_end().await?, b"one");

    let mut second = client.get(&server.url("/2")).await?;
    assert_eq!(second.read_to_end().await?, b"two");

    assert_eq!(server.accepts(), 2);
    Ok(())
}

#[tokio::test]
async fn connection_close_in_a_token_list_is_honored() -> Result<()> {
    let server = spawn_server(vec![
        Canned {
            bytes: b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close, TE\r\n\r\none"
                .to_vec(),
            close_after: true,
        },
        ok_body("two"),
    ])
    .await;
    let client = Client::new();

    let mut first = client.get(&server.url("/1")).await?;
    assert_eq!(first.read_to_end().await?, b"one");

    let mut second = client.get(&server.url("/2")).await?;
    assert_eq!(second.read_to_end().await?, b"two");

    assert_eq!(server.accepts(), 2);
    Ok(())
}

#[tokio::test]
async fn unframed_body_reads_until_the_connection_ends() -> Result<()> {
    let server = spawn_server(vec![
        Canned {
            bytes: b"HTTP/1.1 200 OK\r\n\r\nstream-tail".to_vec(),
            close_after: true,
        },
        ok_body("two"),
    ])
    .await;
    let client = Client::new();

    let mut first = client.get(&server.url("/1")).await?;
    assert_eq!(first.read_to_end().await?, b"stream-tail");

    let mut second = client.get(&server.url("/2")).await?;
    assert_eq!(second.read_to_end().await?, b"two");

    // an unframed body ends with a dead transport
    assert_eq!(server.accepts(), 2);
    Ok(())
}

struct FixedCredentials;

impl CredentialSource for FixedCredentials {
    fn credentials(&self, _uri: &Url, _realm: &str) -> Option<(String, String)> {
        Some(("user".into(), "pw".into()))
    }
}

#[tokio::test]
async fn basic_challenge_is_answered_once() -> Result<()> {
    let server = spawn_server(vec![
        Canned {
            bytes:
                b"HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"r\"\r\nContent-Length: 0\r\n\r\n"
                    .to_vec(),
            close_after: false,
        },
        ok_body("secret"),
    ])
    .await;
    let client = Client::builder()
        .credentials(Arc::new(FixedCredentials))
        .build();

    let mut response = client.get(&server.url("/private")).await?;
    assert_eq!(response.status(), 200);
    assert_eq!(response.read_to_end().await?, b"secret");

    let heads = server.request_heads().await;
    assert_eq!(heads.len(), 2);
    assert!(!heads[0].contains("Authorization:"));
    assert!(heads[1].contains("Authorization: Basic dXNlcjpwdw==\r\n"));
    Ok(())
}

#[tokio::test]
async fn unanswerable_challenge_surfaces_the_401() -> Result<()> {
    let server = spawn_server(vec![Canned {
        bytes:
            b"HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"r\"\r\nContent-Length: 0\r\n\r\n"
                .to_vec(),
        close_after: false,
    }])
    .await;
    let client = Client::new(); // no credential source

    let response = client.get(&server.url("/private")).await?;
    assert_eq!(response.status(), 401);
    Ok(())
}

#[tokio::test]
async fn pre_authentication_sends_credentials_up_front() -> Result<()> {
    let server = spawn_server(vec![ok_body("ok")]).await;
    let client = Client::builder()
        .credentials(Arc::new(FixedCredentials))
        .build();

    let response = client
        .request(&server.url("/private"))?
        .pre_authenticate(true)
        .get_response()
        .await?;
    assert_eq!(response.status(), 200);

    let heads = server.request_heads().await;
    assert!(heads[0].contains("Authorization: Basic dXNlcjpwdw==\r\n"));
    Ok(())
}

#[tokio::test]
async fn connect_failure_is_a_transport_error() {
    let client = Client::new();
    // port 1 on loopback is virtually always closed
    let err = client.get("http://127.0.0.1:1/").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Connect { .. } | ClientError::ConnectTimeout(_)
    ));
}

#[tokio::test]
async fn unsupported_scheme_is_rejected_at_the_factory() {
    let client = Client::new();
    let err = client.request("ftp://example.com/").unwrap_err();
    assert!(matches!(err, ClientError::UnsupportedScheme(_)));
}

#[tokio::test]
async fn https_without_connector_fails_before_any_bytes() {
    let client = Client::new();
    let err = client.get("https://127.0.0.1:1/").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::TlsUnavailable | ClientError::Connect { .. } | ClientError::ConnectTimeout(_)
    ));
}
