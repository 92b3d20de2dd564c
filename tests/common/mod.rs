//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::HeaderMap;
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use ws_proxy::config::{ProxyConfig, RouteConfig};
use ws_proxy::{HttpServer, SessionRegistry, Shutdown};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const WAIT: Duration = Duration::from_secs(5);

/// Handshake headers seen by a mock upstream, one entry per connection.
pub type SeenHeaders = Arc<Mutex<Vec<HeaderMap>>>;

/// Start a WebSocket echo upstream.
///
/// - Text and binary messages are echoed back.
/// - Text `close:<code>` makes the upstream close with that code and reason "backend failure".
/// - The first requested sub-protocol, if any, is selected.
pub async fn start_echo_upstream(addr: SocketAddr) -> SeenHeaders {
    let listener = TcpListener::bind(addr).await.unwrap();
    let seen: SeenHeaders = Arc::default();
    let recorded = seen.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let callback = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
                    recorded.lock().unwrap().push(request.headers().clone());
                    let selected = request
                        .headers()
                        .get("sec-websocket-protocol")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.split(',').next())
                        .map(|p| p.trim().to_string());
                    if let Some(protocol) = selected {
                        response
                            .headers_mut()
                            .insert("sec-websocket-protocol", HeaderValue::from_str(&protocol).unwrap());
                    }
                    Ok(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };
                echo(&mut ws).await;
            });
        }
    });

    seen
}

async fn echo(ws: &mut WebSocketStream<TcpStream>) {
    while let Some(Ok(message)) = ws.next().await {
        match message {
            Message::Text(text) if text.as_str().starts_with("close:") => {
                let code: u16 = text.as_str()["close:".len()..].parse().unwrap();
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: "backend failure".to_string().into(),
                };
                let _ = ws.close(Some(frame)).await;
            }
            Message::Text(_) | Message::Binary(_) => {
                if ws.send(message).await.is_err() {
                    break;
                }
            }
            // Close replies are queued by tungstenite and flushed on the next read.
            _ => {}
        }
    }
}

/// Start a plain HTTP backend that returns a fixed response.
pub async fn start_mock_backend(addr: SocketAddr, response: &'static str) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let response_str = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.len(),
                    response
                );
                let _ = socket.write_all(response_str.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
}

pub fn route(name: &str, path_prefix: &str, upstream: SocketAddr) -> RouteConfig {
    RouteConfig {
        name: name.into(),
        host: None,
        path_prefix: Some(path_prefix.into()),
        uri: format!("http://{upstream}"),
        preserve_host: false,
        priority: 0,
    }
}

pub fn gateway_config(gateway: SocketAddr, routes: Vec<RouteConfig>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = gateway.to_string();
    config.routes = routes;
    config.timeouts.connect_secs = 2;
    config.timeouts.close_secs = 2;
    config
}

/// A running gateway. Dropping it leaves the server running until the test ends.
pub struct Gateway {
    pub shutdown: Shutdown,
    pub registry: Arc<SessionRegistry>,
    pub config_updates: mpsc::UnboundedSender<ProxyConfig>,
    pub server: tokio::task::JoinHandle<()>,
}

pub async fn start_gateway(config: ProxyConfig) -> Gateway {
    let shutdown = Shutdown::new();
    let (config_updates, updates) = mpsc::unbounded_channel();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let server = HttpServer::new(config);
    let registry = server.registry();
    let server_shutdown = shutdown.subscribe();

    let server = tokio::spawn(async move {
        let _ = server.run(listener, updates, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    Gateway {
        shutdown,
        registry,
        config_updates,
        server,
    }
}

/// Open a WebSocket through the gateway, optionally requesting sub-protocols.
pub async fn connect(url: &str, protocols: Option<&'static str>) -> (Client, Response) {
    let mut request = url.into_client_request().unwrap();
    if let Some(protocols) = protocols {
        request
            .headers_mut()
            .insert("sec-websocket-protocol", HeaderValue::from_static(protocols));
    }
    let (ws, response) = tokio::time::timeout(WAIT, tokio_tungstenite::connect_async(request))
        .await
        .expect("connect timed out")
        .expect("handshake failed");
    (ws, response.map(|_| ()))
}

/// Next data message, skipping control frames.
pub async fn next_data(ws: &mut Client) -> Message {
    loop {
        let message = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("no message in time")
            .expect("stream ended")
            .expect("read failed");
        if message.is_text() || message.is_binary() || message.is_close() {
            return message;
        }
    }
}

/// Read until the peer's close frame; returns its code and reason.
pub async fn expect_close(ws: &mut Client) -> (u16, String) {
    loop {
        match next_data(ws).await {
            Message::Close(Some(frame)) => return (u16::from(frame.code), frame.reason.to_string()),
            Message::Close(None) => return (1005, String::new()),
            _ => continue,
        }
    }
}

/// Poll until the registry holds `count` sessions.
pub async fn wait_for_sessions(registry: &SessionRegistry, count: usize) {
    tokio::time::timeout(WAIT, async {
        while registry.len() != count {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {count} sessions, found {}", registry.len()));
}
