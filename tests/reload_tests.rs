use std::sync::Arc;

use combinator::config::BackendEntry;
use combinator::rdb::{RdbBackend as _, RdbGateway};
use combinator::{Gateway, GatewayConfig};

fn entry(id: &str, url: &str) -> BackendEntry {
    BackendEntry {
        id: id.to_string(),
        enabled: true,
        url: url.to_string(),
    }
}

#[tokio::test]
async fn reload_with_identical_url_retains_the_handle() {
    let gateway = RdbGateway::new(&[entry("r1", "sqlite://:memory:")]);
    gateway.start().await.expect("start");

    let before = gateway.lookup("r1").await.expect("handle");
    gateway
        .reload(&[entry("r1", "sqlite://:memory:")])
        .await
        .expect("reload");
    let after = gateway.lookup("r1").await.expect("handle");

    assert!(Arc::ptr_eq(&before, &after));

    // The retained handle still serves requests.
    after
        .exec("CREATE TABLE kept (n INTEGER);", &[])
        .await
        .expect("exec on retained handle");
}

#[tokio::test]
async fn reload_with_changed_url_swaps_the_handle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url_a = format!("sqlite://{}/a.db", dir.path().display());
    let url_b = format!("sqlite://{}/b.db", dir.path().display());

    let gateway = RdbGateway::new(&[entry("r1", &url_a)]);
    gateway.start().await.expect("start");

    let old = gateway.lookup("r1").await.expect("handle");
    old.exec("CREATE TABLE only_in_a (n INTEGER);", &[])
        .await
        .expect("exec");

    gateway.reload(&[entry("r1", &url_b)]).await.expect("reload");
    let new = gateway.lookup("r1").await.expect("handle");
    assert!(!Arc::ptr_eq(&old, &new));

    // The new handle reads b.db, which has no tables.
    let csv = new
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'only_in_a';",
            &[],
        )
        .await
        .expect("query");
    assert_eq!(String::from_utf8_lossy(&csv), "name\n");

    // The old handle was closed by the swap.
    assert!(old.query("SELECT 1;", &[]).await.is_err());
}

#[tokio::test]
async fn reload_key_set_matches_the_new_configuration() {
    let gateway = RdbGateway::new(&[
        entry("a", "sqlite://:memory:"),
        entry("b", "sqlite://:memory:"),
    ]);
    gateway.start().await.expect("start");

    gateway
        .reload(&[entry("b", "sqlite://:memory:"), entry("c", "sqlite://:memory:")])
        .await
        .expect("reload");

    assert!(gateway.lookup("a").await.is_none());
    assert!(gateway.lookup("b").await.is_some());
    assert!(gateway.lookup("c").await.is_some());

    let ids: Vec<String> = gateway
        .services()
        .await
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec!["b", "c"]);
}

#[tokio::test]
async fn failed_reload_keeps_the_previous_backends_dispatchable() {
    let gateway = RdbGateway::new(&[entry("a", "sqlite://:memory:")]);
    gateway.start().await.expect("start");

    let err = gateway
        .reload(&[
            entry("a", "sqlite://:memory:"),
            entry("bad", "mysql://nope/db"),
        ])
        .await;
    assert!(err.is_err());

    assert!(gateway.lookup("a").await.is_some());
    assert!(gateway.lookup("bad").await.is_none());
}

#[tokio::test]
async fn root_gateway_fans_reload_out_to_every_family() {
    let config: GatewayConfig = serde_json::from_value(serde_json::json!({
        "rdb": [{"id": "r", "url": "sqlite://:memory:"}],
        "kv": [{"id": "k", "url": "memory://"}]
    }))
    .expect("config");

    let gateway = Gateway::new(&config, false);
    gateway
        .start_router(None, false)
        .await
        .expect("gateway start");

    let next: GatewayConfig = serde_json::from_value(serde_json::json!({
        "rdb": [{"id": "r2", "url": "sqlite://:memory:"}],
        "kv": [{"id": "k", "url": "memory://"}]
    }))
    .expect("config");
    gateway.reload(&next).await.expect("reload");
}
