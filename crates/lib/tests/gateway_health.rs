//! Integration test: start the gateway from config on a free port, GET /, assert identity JSON,
//! then check the handshake. Does not require Gemini, WhatsApp or Redis.
//! The server task is left running when the test ends.

use lib::config::Config;
use lib::gateway;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

#[tokio::test]
async fn gateway_identity_http_responds_with_name() {
    let port = free_port();

    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.whatsapp.verify_token = Some("health-token".to_string());

    let gateway_handle = tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(format!("{}/", base)).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: serde_json::Value = resp.json().await.expect("parse JSON");
                assert_eq!(
                    json.get("message").and_then(|v| v.as_str()),
                    Some("Sofia - Assistente IA Cognox.ai")
                );

                let ok = client
                    .get(format!(
                        "{}/webhook?hub.mode=subscribe&hub.verify_token=health-token&hub.challenge=42",
                        base
                    ))
                    .send()
                    .await
                    .expect("handshake request");
                assert_eq!(ok.status().as_u16(), 200);
                assert_eq!(ok.text().await.unwrap(), "42");
                return;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    gateway_handle.abort();
    panic!(
        "GET {}/ did not return 200 with identity JSON within 5s; last error: {:?}",
        base, last_err
    );
}
