//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler
//! function. Connections are persistent (keep-alive) unless the client asks
//! otherwise.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_MAX_REQUEST_BYTES;
use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Builds the reply for a request whose declared size exceeds the cap.
pub type RejectHandler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Binds to a TCP address and dispatches incoming requests to a handler.
///
/// ```rust,no_run
/// use crmgate::server::Server;
/// use crmgate::http::{Request, Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server
///         .run_until(
///             |_req: Request| async { Response::new(StatusCode::Ok).body("ok") },
///             async { tokio::signal::ctrl_c().await.ok(); },
///         )
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    max_request_bytes: usize,
    on_too_large: Option<RejectHandler>,
}

impl Server {
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            on_too_large: None,
        })
    }

    /// Caps head plus body size. Larger requests get `413`.
    #[must_use]
    pub fn with_max_request_bytes(mut self, max: usize) -> Self {
        self.max_request_bytes = max;
        self
    }

    /// Replaces the generic `413` body for requests whose head parsed but
    /// whose declared body is over the cap.
    #[must_use]
    pub fn with_payload_too_large<F>(mut self, reply: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.on_too_large = Some(Arc::new(reply));
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until the process exits or the listener fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, std::future::pending()).await
    }

    /// Serves until `shutdown` resolves. Connections already accepted keep
    /// running on their own tasks.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        let max_request_bytes = self.max_request_bytes;
        let on_too_large = self.on_too_large.clone();
        info!(address = %self.local_addr, "crmgate listening");

        tokio::pin!(shutdown);
        loop {
            let (stream, peer_addr) = tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);
            let limits = Limits {
                max_request_bytes,
                on_too_large: on_too_large.clone(),
            };

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler, limits).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

struct Limits {
    max_request_bytes: usize,
    on_too_large: Option<RejectHandler>,
}

fn error_response(status: StatusCode, message: String) -> Response {
    Response::json(status, &serde_json::json!({ "error": message }))
}

async fn reject(stream: &mut TcpStream, response: Response) -> Result<(), std::io::Error> {
    stream.write_all(&response.keep_alive(false).into_bytes()).await?;
    stream.flush().await
}

/// Handles a single TCP connection over its lifetime, one request per loop
/// iteration, until the peer closes or sends `Connection: close`.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    limits: Limits,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) if buf.len() > limits.max_request_bytes => {
                warn!(peer = %peer_addr, size = buf.len(), "request head too large, sending 413");
                let response = error_response(StatusCode::PayloadTooLarge, "Request entity too large".to_owned());
                reject(&mut stream, response).await?;
                break;
            }
            Err(RequestError::Incomplete) => continue,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                reject(&mut stream, error_response(StatusCode::BadRequest, format!("Bad Request: {e}"))).await?;
                break;
            }
        };

        let content_length = match request.content_length() {
            Ok(length) => length,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                reject(&mut stream, error_response(StatusCode::BadRequest, format!("Bad Request: {e}"))).await?;
                break;
            }
        };

        let total_needed = body_offset + content_length;
        if total_needed > limits.max_request_bytes {
            warn!(peer = %peer_addr, content_length, "declared body too large, sending 413");
            let response = match &limits.on_too_large {
                Some(reply) => reply(&request),
                None => error_response(StatusCode::PayloadTooLarge, "Request entity too large".to_owned()),
            };
            reject(&mut stream, response).await?;
            break;
        }
        if buf.len() < total_needed {
            continue;
        }

        let keep_alive = request.is_keep_alive();
        let head_and_body = buf.split_to(total_needed).freeze();
        let request = request.with_body(head_and_body.slice(body_offset..));

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = handler(request).await.keep_alive(keep_alive);
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn roundtrip(server: Server, raw: &[u8]) -> String {
        let addr = server.local_addr();
        tokio::spawn(server.run(|req: Request| async move {
            Response::new(StatusCode::Ok).body(String::from_utf8_lossy(req.body()).into_owned())
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn body_is_attached_to_the_request() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let reply = roundtrip(
            server,
            b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 200 OK"), "{reply}");
        assert!(reply.ends_with("hello"), "{reply}");
    }

    #[tokio::test]
    async fn declared_oversize_body_gets_413() {
        let server = Server::bind("127.0.0.1:0").await.unwrap().with_max_request_bytes(256);
        let reply = roundtrip(
            server,
            b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 100000\r\n\r\n",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 413"), "{reply}");
    }

    #[tokio::test]
    async fn oversize_reply_can_be_customized() {
        let server = Server::bind("127.0.0.1:0")
            .await
            .unwrap()
            .with_max_request_bytes(256)
            .with_payload_too_large(|req: &Request| {
                Response::json(
                    StatusCode::PayloadTooLarge,
                    &serde_json::json!({ "error": format!("{} is limited to 256 bytes", req.path()) }),
                )
            });
        let reply = roundtrip(
            server,
            b"POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: 100000\r\n\r\n",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 413"), "{reply}");
        assert!(reply.contains("/upload is limited to 256 bytes"), "{reply}");
    }

    #[tokio::test]
    async fn invalid_content_length_gets_400() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let reply = roundtrip(server, b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: lots\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 400"), "{reply}");
        assert!(reply.contains("invalid Content-Length header: lots"), "{reply}");
    }

    #[tokio::test]
    async fn shutdown_future_stops_the_accept_loop() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let result = server
            .run_until(|_req: Request| async { Response::new(StatusCode::Ok) }, async {})
            .await;
        assert!(result.is_ok());
    }
}
