//! Plain HTTP requests pass through the gateway untouched by the WebSocket proxy.

use std::net::SocketAddr;

mod common;

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_http_request_forwarded() {
    let backend: SocketAddr = "127.0.0.1:29301".parse().unwrap();
    let gateway: SocketAddr = "127.0.0.1:29302".parse().unwrap();
    common::start_mock_backend(backend, "Hello from backend").await;
    let gw = common::start_gateway(common::gateway_config(
        gateway,
        vec![common::route("api", "/api", backend)],
    ))
    .await;

    let res = client()
        .get(format!("http://{gateway}/api/items"))
        .send()
        .await
        .expect("gateway unreachable");
    assert_eq!(res.status(), 200);
    assert!(res.headers().get("x-request-id").is_some());
    assert_eq!(res.text().await.unwrap(), "Hello from backend");
    assert!(gw.registry.is_empty());
}

#[tokio::test]
async fn test_unrouted_request_is_404() {
    let gateway: SocketAddr = "127.0.0.1:29312".parse().unwrap();
    let _gw = common::start_gateway(common::gateway_config(gateway, vec![])).await;

    let res = client().get(format!("http://{gateway}/nothing")).send().await.unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn test_backend_down_is_502() {
    let backend: SocketAddr = "127.0.0.1:29321".parse().unwrap();
    let gateway: SocketAddr = "127.0.0.1:29322".parse().unwrap();
    let _gw = common::start_gateway(common::gateway_config(
        gateway,
        vec![common::route("api", "/", backend)],
    ))
    .await;

    let res = client().get(format!("http://{gateway}/")).send().await.unwrap();
    assert_eq!(res.status(), 502);
}
