//! End-to-end tests for the WebSocket proxy over real loopback sockets.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

mod common;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[tokio::test]
async fn test_echo_and_normal_close() {
    let upstream = addr(29101);
    let gateway = addr(29102);
    common::start_echo_upstream(upstream).await;
    let gw = common::start_gateway(common::gateway_config(
        gateway,
        vec![common::route("chat", "/chat", upstream)],
    ))
    .await;

    let (mut ws, _) = common::connect(&format!("ws://{gateway}/chat"), None).await;
    common::wait_for_sessions(&gw.registry, 1).await;

    for i in 0..5 {
        ws.send(Message::Text(format!("msg-{i}").into())).await.unwrap();
    }
    ws.send(Message::Binary(vec![1u8, 2, 3].into())).await.unwrap();
    for i in 0..5 {
        assert_eq!(common::next_data(&mut ws).await, Message::Text(format!("msg-{i}").into()));
    }
    assert_eq!(common::next_data(&mut ws).await, Message::Binary(vec![1u8, 2, 3].into()));

    ws.close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "bye".to_string().into(),
    }))
    .await
    .unwrap();
    let (code, _) = common::expect_close(&mut ws).await;
    assert_eq!(code, 1000);

    common::wait_for_sessions(&gw.registry, 0).await;
}

#[tokio::test]
async fn test_subprotocols_and_host_rewrite() {
    let upstream = addr(29111);
    let gateway = addr(29112);
    let seen = common::start_echo_upstream(upstream).await;
    let _gw = common::start_gateway(common::gateway_config(
        gateway,
        vec![common::route("chat", "/", upstream)],
    ))
    .await;

    let (mut ws, response) =
        common::connect(&format!("ws://{gateway}/socket?room=7"), Some("chat, superchat")).await;
    assert_eq!(response.headers().get("sec-websocket-protocol").unwrap(), "chat");

    ws.send(Message::Text("ping".to_string().into())).await.unwrap();
    assert_eq!(common::next_data(&mut ws).await, Message::Text("ping".to_string().into()));

    let headers = seen.lock().unwrap()[0].clone();
    assert_eq!(headers.get("host").unwrap(), upstream.to_string().as_str());
    assert_eq!(headers.get("sec-websocket-protocol").unwrap(), "chat, superchat");
    assert_eq!(headers.get("x-forwarded-host").unwrap(), gateway.to_string().as_str());
    assert_eq!(headers.get("x-forwarded-for").unwrap(), "127.0.0.1");
    assert!(headers.get("x-request-id").is_some());
}

#[tokio::test]
async fn test_preserve_host() {
    let upstream = addr(29121);
    let gateway = addr(29122);
    let seen = common::start_echo_upstream(upstream).await;
    let mut route = common::route("chat", "/", upstream);
    route.preserve_host = true;
    let _gw = common::start_gateway(common::gateway_config(gateway, vec![route])).await;

    let (mut ws, _) = common::connect(&format!("ws://{gateway}/"), None).await;
    ws.send(Message::Text("hi".to_string().into())).await.unwrap();
    common::next_data(&mut ws).await;

    let headers = seen.lock().unwrap()[0].clone();
    assert_eq!(headers.get("host").unwrap(), gateway.to_string().as_str());
}

#[tokio::test]
async fn test_upstream_close_codes_reach_client() {
    let upstream = addr(29131);
    let gateway = addr(29132);
    common::start_echo_upstream(upstream).await;
    let gw = common::start_gateway(common::gateway_config(
        gateway,
        vec![common::route("chat", "/", upstream)],
    ))
    .await;

    // Standard and application codes pass through unchanged.
    for expected in [1011u16, 4001] {
        let (mut ws, _) = common::connect(&format!("ws://{gateway}/"), None).await;
        ws.send(Message::Text(format!("close:{expected}").into())).await.unwrap();
        let (code, reason) = common::expect_close(&mut ws).await;
        assert_eq!(code, expected);
        assert_eq!(reason, "backend failure");
    }

    // Codes that may not be forwarded become a protocol error.
    let (mut ws, _) = common::connect(&format!("ws://{gateway}/"), None).await;
    ws.send(Message::Text("close:1013".to_string().into())).await.unwrap();
    let (code, reason) = common::expect_close(&mut ws).await;
    assert_eq!(code, 1002);
    assert!(reason.is_empty());

    common::wait_for_sessions(&gw.registry, 0).await;
}

#[tokio::test]
async fn test_dial_failure_closes_client_with_protocol_error() {
    // Nothing listens on the upstream port.
    let upstream = addr(29141);
    let gateway = addr(29142);
    let gw = common::start_gateway(common::gateway_config(
        gateway,
        vec![common::route("dead", "/", upstream)],
    ))
    .await;

    let (mut ws, _) = common::connect(&format!("ws://{gateway}/"), None).await;
    let (code, reason) = common::expect_close(&mut ws).await;
    assert_eq!(code, 1002);
    assert_eq!(reason, "upstream unavailable");
    assert!(gw.registry.is_empty());
}

#[tokio::test]
async fn test_shutdown_closes_sessions_going_away() {
    let upstream = addr(29151);
    let gateway = addr(29152);
    common::start_echo_upstream(upstream).await;
    let gw = common::start_gateway(common::gateway_config(
        gateway,
        vec![common::route("chat", "/", upstream)],
    ))
    .await;

    let (mut ws, _) = common::connect(&format!("ws://{gateway}/"), None).await;
    common::wait_for_sessions(&gw.registry, 1).await;

    assert!(gw.shutdown.trigger());
    let (code, _) = common::expect_close(&mut ws).await;
    assert_eq!(code, 1001);

    tokio::time::timeout(Duration::from_secs(5), gw.server)
        .await
        .expect("server did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_unmatched_upgrade_is_404() {
    let upstream = addr(29161);
    let gateway = addr(29162);
    let _gw = common::start_gateway(common::gateway_config(
        gateway,
        vec![common::route("chat", "/chat", upstream)],
    ))
    .await;

    let result = tokio_tungstenite::connect_async(format!("ws://{gateway}/elsewhere")).await;
    match result {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 404);
        }
        Err(e) => panic!("expected HTTP 404, got {e:?}"),
        Ok(_) => panic!("upgrade unexpectedly succeeded"),
    }
}

#[tokio::test]
async fn test_route_reload() {
    let upstream = addr(29171);
    let gateway = addr(29172);
    common::start_echo_upstream(upstream).await;
    let gw = common::start_gateway(common::gateway_config(gateway, vec![])).await;

    assert!(tokio_tungstenite::connect_async(format!("ws://{gateway}/live")).await.is_err());

    let config = common::gateway_config(gateway, vec![common::route("live", "/live", upstream)]);
    gw.config_updates.send(config).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (mut ws, _) = common::connect(&format!("ws://{gateway}/live"), None).await;
    ws.send(Message::Text("reloaded".to_string().into())).await.unwrap();
    assert_eq!(common::next_data(&mut ws).await, Message::Text("reloaded".to_string().into()));
}
