//! Integration tests for the manager facade.

use replay_sidecar::config::SidecarConfig;
use replay_sidecar::Manager;

#[tokio::test]
async fn test_stop_before_start_is_a_noop() {
    let config = SidecarConfig::default();
    let mut manager = Manager::new(&config);

    manager
        .stop()
        .await
        .expect("Stop on a never-started manager must not fail");
    manager.stop().await.expect("Stop must stay idempotent");
}

#[cfg(unix)]
mod full_stack {
    use std::path::PathBuf;
    use std::time::Duration;

    use futures::SinkExt;
    use replay_sidecar::config::SidecarConfig;
    use replay_sidecar::relay::RelayEvent;
    use replay_sidecar::{Manager, SidecarError};
    use tempfile::TempDir;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    fn write_script(dir: &TempDir) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-proxy");
        std::fs::write(&path, "#!/bin/sh\nsleep 30\n").expect("Should write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Should set script permissions");
        path
    }

    async fn free_addr() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn test_start_serves_relay_and_stop_tears_down() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir);

        // The test owns the listener the proxy readiness probe will hit.
        let proxy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_port = proxy_listener.local_addr().unwrap().port();

        let config = SidecarConfig {
            proxy_path: script,
            proxy_port,
            cache_path: dir.path().join("cache.mitm"),
            relay_listen: free_addr().await,
            readiness_timeout_secs: 5,
            max_relay_connections: 8,
            log_level: "info".to_string(),
        };
        config.validate().expect("Test configuration should validate");

        let mut manager = Manager::new(&config);
        let (tx, mut events) = mpsc::unbounded_channel();
        manager.relay().set_observer(tx);

        manager.start().await.expect("Start should bring up proxy and relay");
        assert!(manager.proxy_running(), "The proxy handle should be live after start");

        // The relay is reachable and observes messages once start returns.
        let (mut client, _) = connect_async(format!("ws://{}", config.relay_listen))
            .await
            .expect("The relay should accept connections after start");
        client
            .send(Message::Text("crawl-event".to_string()))
            .await
            .unwrap();

        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("Timed out waiting for a relay event")
                .expect("Event channel closed unexpectedly");
            if let RelayEvent::Message { payload, .. } = event {
                assert_eq!(payload.as_slice(), &b"crawl-event"[..]);
                break;
            }
        }

        client.close(None).await.unwrap();

        manager.stop().await.expect("Stop should tear down cleanly");
        assert!(!manager.proxy_running(), "The proxy handle should be gone after stop");
        assert!(manager.relay().is_closed(), "The relay listener should be closed");
    }

    #[tokio::test]
    async fn test_relay_bind_failure_aborts_start_and_stops_proxy() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir);

        let proxy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_port = proxy_listener.local_addr().unwrap().port();

        // Occupy the relay port so the listener cannot bind.
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay_listen = occupied.local_addr().unwrap();

        let config = SidecarConfig {
            proxy_path: script,
            proxy_port,
            cache_path: dir.path().join("cache.mitm"),
            relay_listen,
            readiness_timeout_secs: 5,
            max_relay_connections: 8,
            log_level: "info".to_string(),
        };

        let mut manager = Manager::new(&config);
        let err = manager
            .start()
            .await
            .expect_err("An occupied relay port must abort start");

        match err {
            SidecarError::ListenerBind { addr, .. } => assert_eq!(addr, relay_listen),
            other => panic!("Expected ListenerBind, got {:?}", other),
        }
        assert!(
            !manager.proxy_running(),
            "The proxy must be stopped when the relay fails to start"
        );
    }
}
