use std::net::TcpListener;

use luna_config::AppConfig;
use luna_gateway::GatewayServer;

/// Pick a random available port.
fn random_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind to random port");
    listener.local_addr().unwrap().port()
}

/// Start the gateway in the background and return its base URL.
async fn start_test_gateway(mut config: AppConfig, config_dir: std::path::PathBuf) -> String {
    let port = config.gateway.port;
    config.auth.password_iterations = 1_000;
    config.validate().expect("test config should validate");
    tokio::spawn(async move {
        let server = GatewayServer::new(config, config_dir);
        let _ = server.run().await;
    });

    for _ in 0..50 {
        if TcpListener::bind(format!("127.0.0.1:{port}")).is_err() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    format!("http://127.0.0.1:{port}")
}

#[tokio::test]
async fn serves_health_and_registration_over_tcp() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.gateway.port = random_port();
    let base = start_test_gateway(config, dir.path().to_path_buf()).await;
    let client = reqwest::Client::new();

    let health = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(health.status(), 200);
    assert_eq!(health.text().await.unwrap(), "ok");

    let registered = client
        .post(format!("{base}/api/users/register"))
        .json(&serde_json::json!({ "email": "tcp@example.com", "password": "long enough" }))
        .send()
        .await
        .unwrap();
    assert_eq!(registered.status(), 201);
    assert!(dir.path().join("data").join("luna.db").exists());
}

#[tokio::test]
async fn cors_allows_only_the_frontend() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.gateway.port = random_port();
    config.gateway.frontend_url = Some("https://app.luna.test".to_string());
    let base = start_test_gateway(config, dir.path().to_path_buf()).await;
    let client = reqwest::Client::new();

    let allowed = client
        .get(format!("{base}/health"))
        .header("origin", "https://app.luna.test")
        .send()
        .await
        .unwrap();
    assert_eq!(
        allowed
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("https://app.luna.test")
    );

    let other = client
        .get(format!("{base}/health"))
        .header("origin", "https://evil.test")
        .send()
        .await
        .unwrap();
    assert!(other.headers().get("access-control-allow-origin").is_none());
}
