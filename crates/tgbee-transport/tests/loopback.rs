#![cfg(all(feature = "http-client", feature = "http-server"))]

use std::time::Duration;

use axum::{Json, Router, routing::post};
use serde_json::{Value, json};
use tgbee_core::{ApiError, ApiExt, GetUpdates, UpdateFetcher};
use tgbee_framework::PushSource;
use tgbee_transport::{BotApiClient, SECRET_TOKEN_HEADER, WebhookConfig, WebhookServer};
use tokio::net::TcpListener;

/// A fake Bot API answering three methods under `/botT0KEN/`.
async fn fake_api() -> String {
    let router = Router::new()
        .route(
            "/botT0KEN/getMe",
            post(|| async {
                Json(json!({
                    "ok": true,
                    "result": {"id": 1, "is_bot": true, "first_name": "bee"}
                }))
            }),
        )
        .route(
            "/botT0KEN/getUpdates",
            post(|Json(params): Json<Value>| async move {
                let offset = params["offset"].as_i64().unwrap_or(0);
                Json(json!({"ok": true, "result": [
                    {"update_id": offset, "poll": {"id": "p", "question": "q"}},
                    {"update_id": offset + 1, "some_future_kind": {"x": 1}},
                ]}))
            }),
        )
        .route(
            "/botT0KEN/sendMessage",
            post(|| async {
                Json(json!({
                    "ok": false,
                    "error_code": 429,
                    "description": "Too Many Requests: retry after 3",
                    "parameters": {"retry_after": 3}
                }))
            }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
}

#[tokio::test]
async fn client_decodes_envelopes() {
    let client = BotApiClient::builder("T0KEN")
        .api_url(fake_api().await)
        .request_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let me = client.get_me().await.unwrap();
    assert_eq!(me.first_name, "bee");

    let updates = client
        .get_updates(&GetUpdates {
            offset: Some(40),
            timeout: Duration::from_secs(0),
            ..Default::default()
        })
        .await
        .unwrap();
    let ids: Vec<i64> = updates.iter().map(|u| u.update_id).collect();
    assert_eq!(ids, vec![40, 41]);

    let err = client.send_message(1, "hi").await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::Api { code: 429, retry_after: Some(3), .. }
    ));
}

#[tokio::test]
async fn webhook_accepts_posts_over_tcp() {
    let (_source, handle) = PushSource::new(4);
    let config = WebhookConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        path: "/tg".to_string(),
        secret_token: Some("k".to_string()),
    };
    let listener = WebhookServer::new(config, handle.clone()).bind().await.unwrap();
    let url = format!("http://{}/tg", listener.local_addr());

    let http = reqwest::Client::new();
    let status = http
        .post(&url)
        .header(SECRET_TOKEN_HEADER, "k")
        .json(&json!({"update_id": 9, "poll": {"id": "p", "question": "q"}}))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status.as_u16(), 200);
    assert_eq!(handle.last_accepted().await, Some(9));

    listener.shutdown().await;
    assert!(http.post(&url).body("{}").send().await.is_err());
}
