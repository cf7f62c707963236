//! HTTP sink client.
//!
//! Opens a fresh HTTP/1.1 connection per request, POSTs the payload and
//! treats exactly `204 No Content` as success. Any other status, a
//! transport error or an elapsed timeout is a delivery failure.

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, StatusCode, header};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::SinkError;

/// Port appended to a sink host given without one.
pub const DEFAULT_PORT: u16 = 4242;

/// Append [`DEFAULT_PORT`] unless `host` already names a port.
pub fn with_default_port(host: &str) -> String {
    if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:{DEFAULT_PORT}")
    }
}

/// Client for an OpenTSDB-compatible ingestion endpoint.
#[derive(Debug, Clone)]
pub struct HttpSink {
    /// `host:port` of the sink.
    addr: String,
    /// Upper bound for connect + request + response.
    timeout: Duration,
}

impl HttpSink {
    pub fn new(host: &str, timeout: Duration) -> Self {
        Self {
            addr: with_default_port(host),
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// POST `body` to `path` with the given extra headers.
    pub async fn post(
        &self,
        path: &str,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> Result<(), SinkError> {
        let url = self.url(path);
        match tokio::time::timeout(self.timeout, self.send(path, &url, headers, body)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout {
                url,
                millis: self.timeout.as_millis() as u64,
            }),
        }
    }

    async fn send(
        &self,
        path: &str,
        url: &str,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> Result<(), SinkError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| SinkError::Connect {
                addr: self.addr.clone(),
                source,
            })?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|source| SinkError::Handshake {
                addr: self.addr.clone(),
                source,
            })?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "sink connection closed");
            }
        });

        let mut req = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::HOST, self.addr.as_str())
            .header(header::USER_AGENT, "tally/0.1")
            .body(Full::new(Bytes::from(body)))?;
        req.headers_mut().extend(headers);

        let resp = sender
            .send_request(req)
            .await
            .map_err(|source| SinkError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(());
        }

        let body = match resp.into_body().collect().await {
            Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
            Err(_) => String::new(),
        };
        Err(SinkError::Status {
            url: url.to_string(),
            status,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use http::{HeaderValue, Response};
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use tokio::net::TcpListener;

    type Seen = Arc<Mutex<Vec<(String, HeaderMap, Vec<u8>)>>>;

    /// Serve every connection with a fixed status, recording requests.
    async fn serve_status(status: u16, body: &'static str) -> (SocketAddr, Seen) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen: Seen = Arc::default();
        let seen_srv = seen.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let seen = seen_srv.clone();
                tokio::spawn(async move {
                    let svc = service_fn(move |req: Request<Incoming>| {
                        let seen = seen.clone();
                        async move {
                            let path = req.uri().path().to_string();
                            let headers = req.headers().clone();
                            let bytes = req.into_body().collect().await?.to_bytes();
                            seen.lock().unwrap().push((path, headers, bytes.to_vec()));
                            Ok::<_, hyper::Error>(
                                Response::builder()
                                    .status(status)
                                    .body(Full::new(Bytes::from_static(body.as_bytes())))
                                    .unwrap(),
                            )
                        }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), svc)
                        .await;
                });
            }
        });

        (addr, seen)
    }

    #[test]
    fn default_port_appended() {
        assert_eq!(with_default_port("tsdb"), "tsdb:4242");
        assert_eq!(with_default_port("tsdb:8070"), "tsdb:8070");
        assert_eq!(HttpSink::new("tsdb", Duration::from_secs(1)).url("/api/put"), "http://tsdb:4242/api/put");
    }

    #[tokio::test]
    async fn post_no_content_is_success() {
        let (addr, seen) = serve_status(204, "").await;
        let sink = HttpSink::new(&addr.to_string(), Duration::from_secs(5));

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        sink.post("/api/put", headers, b"[]".to_vec()).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "/api/put");
        assert_eq!(seen[0].1[header::CONTENT_TYPE], "application/json");
        assert_eq!(seen[0].2, b"[]");
    }

    #[tokio::test]
    async fn post_ok_status_is_failure() {
        let (addr, _) = serve_status(200, "").await;
        let sink = HttpSink::new(&addr.to_string(), Duration::from_secs(5));

        let err = sink.post("/api/put", HeaderMap::new(), Vec::new()).await.unwrap_err();
        assert!(matches!(err, SinkError::Status { status, .. } if status == StatusCode::OK));
    }

    #[tokio::test]
    async fn post_error_status_carries_body() {
        let (addr, _) = serve_status(400, "unknown metric").await;
        let sink = HttpSink::new(&addr.to_string(), Duration::from_secs(5));

        match sink.post("/api/put", HeaderMap::new(), Vec::new()).await {
            Err(SinkError::Status { status, body, .. }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "unknown metric");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    /// Accept connections and hold them open without ever answering.
    async fn serve_silent() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        addr
    }

    #[tokio::test]
    async fn post_without_response_times_out() {
        let addr = serve_silent().await;
        let sink = HttpSink::new(&addr.to_string(), Duration::from_millis(100));

        let err = sink.post("/api/put", HeaderMap::new(), b"[]".to_vec()).await.unwrap_err();
        match &err {
            SinkError::Timeout { url, millis } => {
                assert_eq!(url, &format!("http://{addr}/api/put"));
                assert_eq!(*millis, 100);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().ends_with("timed out after 100ms"));
    }

    #[tokio::test]
    async fn post_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sink = HttpSink::new(&addr.to_string(), Duration::from_secs(5));
        let err = sink.post("/api/put", HeaderMap::new(), Vec::new()).await.unwrap_err();
        assert!(matches!(err, SinkError::Connect { .. }));
    }
}
