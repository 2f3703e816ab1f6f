//! Admin API server.
//!
//! The listener is bound before `run`, so callers can ask for port 0 and
//! read the address actually in use.

use crate::admin_api::router::route_request;
use crate::admin_api::AdminState;
use anyhow::Context;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Admin API server for the imposter store
pub struct AdminApiServer {
    listener: TcpListener,
    state: Arc<AdminState>,
}

impl AdminApiServer {
    /// Bind the admin API on `addr`
    pub async fn bind(addr: SocketAddr, state: Arc<AdminState>) -> Result<Self, anyhow::Error> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind admin API on {addr}"))?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve admin connections until accepting fails
    pub async fn run(self) -> Result<(), anyhow::Error> {
        info!(
            "rift-store Admin API (Mountebank-compatible) listening on http://{}",
            self.local_addr()?
        );

        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!("Admin API connection from {}", peer);
            let io = TokioIo::new(stream);
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    route_request(req, Arc::clone(&state))
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Admin API connection from {} failed: {}", peer, e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imposters::{ImpostersRepository, InMemoryImpostersRepository};
    use crate::matcher::JsonPredicateMatcher;
    use crate::validation::DefaultStubValidator;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn send(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_serves_admin_api_over_tcp() {
        let repo: Arc<dyn ImpostersRepository> = Arc::new(InMemoryImpostersRepository::new());
        let state = Arc::new(AdminState::new(
            repo,
            Arc::new(DefaultStubValidator::new(false)),
            Arc::new(JsonPredicateMatcher),
        ));
        let server = AdminApiServer::bind("127.0.0.1:0".parse().unwrap(), state)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        tokio::spawn(server.run());

        let body = r#"{"port":4545,"protocol":"http"}"#;
        let created = send(
            addr,
            &format!(
                "POST /imposters HTTP/1.1\r\nHost: localhost:2525\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            ),
        )
        .await;
        assert!(created.starts_with("HTTP/1.1 201"), "{created}");
        assert!(created.contains("http://localhost:2525/imposters/4545"));

        let listed = send(
            addr,
            "GET /imposters HTTP/1.1\r\nHost: localhost:2525\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(listed.starts_with("HTTP/1.1 200"), "{listed}");
        assert!(listed.contains("\"port\": 4545"));
    }

    #[tokio::test]
    async fn test_bind_failure_names_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let repo: Arc<dyn ImpostersRepository> = Arc::new(InMemoryImpostersRepository::new());
        let state = Arc::new(AdminState::new(
            repo,
            Arc::new(DefaultStubValidator::new(false)),
            Arc::new(JsonPredicateMatcher),
        ));

        let err = AdminApiServer::bind(addr, state).await.err().unwrap();
        assert!(err.to_string().contains(&addr.to_string()));
    }
}
