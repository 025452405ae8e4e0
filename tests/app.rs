//! End-to-end tests of the assembled application.

use anyhow::Result;
use std::sync::{atomic::Ordering, Arc};
use substream::{
    app::App,
    config::{Config, OutputFormat, StoreKind},
    core::{IssuanceEvent, Output},
};
use tempfile::tempdir;
use tokio::sync::watch;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod helpers;
use helpers::{
    mock_notifier::RecordingNotifier, mock_output::CollectingOutput, mock_ws::ScriptedWebSocket,
    test_config, wait_until,
};

/// Runs the app over `events`, then shuts it down once the outputs have
/// been flushed. Returns the lines the outputs received.
async fn run_events(config: Config, events: Vec<IssuanceEvent>) -> Result<Vec<String>> {
    let output = CollectingOutput::new();
    let (events_tx, events_rx) = async_channel::unbounded();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = App::builder(config)
        .events_rx_for_test(events_rx)
        .output_override(vec![Arc::new(output.clone()) as Arc<dyn Output>])
        .build(shutdown_rx)
        .await?;

    for event in events {
        events_tx.send(event).await?;
    }
    drop(events_tx);

    wait_until(|| output.flushed.load(Ordering::SeqCst)).await;
    shutdown_tx.send(true)?;
    app.run().await?;
    Ok(output.lines())
}

#[tokio::test]
async fn test_untargeted_run_reports_each_label_once() -> Result<()> {
    let lines = run_events(
        test_config(),
        vec![
            IssuanceEvent::certificate(["api.example.com", "www.example.com"]),
            IssuanceEvent::heartbeat(),
            IssuanceEvent::certificate(["api.example.org", "mail.b.example.net"]),
            IssuanceEvent::certificate(["0123456789abcdef01234567.example.com"]),
        ],
    )
    .await?;

    assert_eq!(lines, vec!["[+] api", "[+] mail"]);
    Ok(())
}

#[tokio::test]
async fn test_targeted_run_reports_full_hostnames() -> Result<()> {
    let mut config = test_config();
    config.filter.domains = vec!["example.com".to_string()];

    let lines = run_events(
        config,
        vec![IssuanceEvent::certificate([
            "foo.bar.example.com",
            "api.example.org",
            "example.com",
        ])],
    )
    .await?;

    assert_eq!(lines, vec!["[+] foo.bar.example.com", "[+] example.com"]);
    Ok(())
}

#[tokio::test]
async fn test_domain_file_enables_targeted_mode() -> Result<()> {
    let dir = tempdir()?;
    let file = dir.path().join("domains.txt");
    std::fs::write(&file, "# watched\nexample.org\n\n")?;

    let mut config = test_config();
    config.filter.domains_file = Some(file);

    let lines = run_events(
        config,
        vec![IssuanceEvent::certificate([
            "api.example.com",
            "api.example.org",
        ])],
    )
    .await?;

    assert_eq!(lines, vec!["[+] api.example.org"]);
    Ok(())
}

#[tokio::test]
async fn test_missing_domain_file_fails_startup() {
    let mut config = test_config();
    config.filter.domains_file = Some("/definitely/not/here.txt".into());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (_events_tx, events_rx) = async_channel::unbounded();

    let result = App::builder(config)
        .events_rx_for_test(events_rx)
        .output_override(vec![])
        .build(shutdown_rx)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_persistent_store_survives_restart() -> Result<()> {
    let dir = tempdir()?;
    let mut config = test_config();
    config.deduplication.store = StoreKind::Sqlite;
    config.deduplication.db_path = dir.path().join("labels.db");
    config.deduplication.realert_threshold = 2;

    let first = run_events(
        config.clone(),
        vec![IssuanceEvent::certificate(["api.example.com"])],
    )
    .await?;
    assert_eq!(first, vec!["[+] api"]);

    let second = run_events(
        config,
        vec![
            IssuanceEvent::certificate(["api.example.org"]),
            IssuanceEvent::certificate(["api.example.net"]),
            IssuanceEvent::certificate(["api.example.io"]),
        ],
    )
    .await?;
    assert_eq!(second, vec!["[#] api (seen 2 times)", "[#] api (seen 4 times)"]);
    Ok(())
}

#[tokio::test]
async fn test_file_sink_lists_first_sightings() -> Result<()> {
    let dir = tempdir()?;
    let out_path = dir.path().join("found.txt");
    std::fs::write(&out_path, "existing\n")?;

    let mut config = test_config();
    config.output.file = Some(out_path.clone());
    config.output.format = OutputFormat::Json;
    config.deduplication.store = StoreKind::Sqlite;
    config.deduplication.db_path = dir.path().join("labels.db");
    config.deduplication.realert_threshold = 1;

    let (events_tx, events_rx) = async_channel::unbounded();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config)
        .events_rx_for_test(events_rx)
        .build(shutdown_rx)
        .await?;

    events_tx
        .send(IssuanceEvent::certificate(["api.example.com", "mail.example.com"]))
        .await?;
    events_tx
        .send(IssuanceEvent::certificate(["api.example.org"]))
        .await?;
    drop(events_tx);

    // The output task exits once the pipeline has drained, flushing the file.
    wait_until(|| {
        std::fs::read_to_string(&out_path)
            .map(|s| s.lines().count() == 3)
            .unwrap_or(false)
    })
    .await;
    shutdown_tx.send(true)?;
    app.run().await?;

    assert_eq!(std::fs::read_to_string(&out_path)?, "existing\napi\nmail\n");
    Ok(())
}

#[tokio::test]
async fn test_websocket_feed_reaches_outputs_and_notifier() -> Result<()> {
    let ws = ScriptedWebSocket::new();
    ws.push_text(helpers::mock_ws::heartbeat_message());
    ws.push_certificate(&["api.example.com", "sni.example.com"]);
    ws.push_text("garbage".to_string());
    ws.push_certificate(&["mail.example.com"]);

    let output = CollectingOutput::new();
    let notifier = RecordingNotifier::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = App::builder(test_config())
        .websocket_override(Box::new(ws))
        .output_override(vec![Arc::new(output.clone()) as Arc<dyn Output>])
        .notifier_override(Arc::new(notifier.clone()))
        .build(shutdown_rx)
        .await?;

    // The scripted connection closes after its frames, which closes the
    // pipeline and lets every stage drain.
    wait_until(|| notifier.messages().len() == 2).await;
    shutdown_tx.send(true)?;
    app.run().await?;

    assert_eq!(output.lines(), vec!["[+] api", "[+] mail"]);
    assert_eq!(notifier.messages(), vec!["[+] api", "[+] mail"]);
    Ok(())
}

#[tokio::test]
async fn test_telegram_delivery_uses_bot_api() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_string_contains("chat_id=42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.output.telegram.enabled = true;
    config.output.telegram.chat_id = Some("42".to_string());
    config.output.telegram.bot_token = Some("123:abc".to_string());
    config.output.telegram.api_base_url = server.uri();

    let output = CollectingOutput::new();
    let (events_tx, events_rx) = async_channel::unbounded();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config)
        .events_rx_for_test(events_rx)
        .output_override(vec![Arc::new(output.clone()) as Arc<dyn Output>])
        .build(shutdown_rx)
        .await?;

    events_tx
        .send(IssuanceEvent::certificate(["api.example.com"]))
        .await?;

    let poll_server = async {
        loop {
            let received = server.received_requests().await.unwrap_or_default();
            if !received.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(helpers::WAIT, poll_server).await?;

    shutdown_tx.send(true)?;
    app.run().await?;
    assert_eq!(output.lines(), vec!["[+] api"]);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_with_idle_feed_completes() -> Result<()> {
    let ws = ScriptedWebSocket::held_open();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = App::builder(test_config())
        .websocket_override(Box::new(ws))
        .output_override(vec![])
        .build(shutdown_rx)
        .await?;

    shutdown_tx.send(true)?;
    tokio::time::timeout(helpers::WAIT, app.run()).await??;
    Ok(())
}
