//! Full connector runs against mock identity and journal services, writing to
//! an NDJSON file.

use std::fs;
use std::path::Path;

use journal_connector::config::Config;
use journal_connector::runner::Connector;
use journal_connector::RunOutcome;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, workdir: &Path, backend: &str) -> Config {
    let key_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/test_private_key.pem");
    let toml = format!(
        r#"
        [connector]
        checkpoint_dir = "{checkpoints}"
        checkpoint_backend = "{backend}"
        ims_host = "{uri}"
        request_timeout_secs = 5
        output = "{output}"

        [[inputs]]
        name = "primary"
        endpoint = "{uri}/events"
        api_key = "key123"
        technical_account_id = "tech@techacct.adobe.com"
        org_id = "org@AdobeOrg"
        client_secret = "secret-value"
        private_key_path = "{key}"
        "#,
        checkpoints = workdir.join("checkpoints").display(),
        output = workdir.join("events.ndjson").display(),
        uri = server.uri(),
        key = key_path.display(),
        backend = backend,
    );
    Config::from_toml_str(&toml).unwrap()
}

async fn mount_services(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/ims/exchange/jwt/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-abc",
            "expires_in": 86_399_000
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .and(query_param_is_missing("from"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [
                {"event_id": "e1", "event": {"n": 1}},
                {"event_id": "e2", "event": {"n": 2}}
            ],
            "next": "c1"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .and(query_param("from", "c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [{"event_id": "e3", "event": {"n": 3}}],
            "next": ""
        })))
        .mount(server)
        .await;
}

fn written_ids(output: &Path) -> Vec<String> {
    fs::read_to_string(output)
        .unwrap_or_default()
        .lines()
        .map(|line| {
            let record: Value = serde_json::from_str(line).unwrap();
            record["event_id"].as_str().unwrap().to_string()
        })
        .collect()
}

async fn run_twice(backend: &str) {
    let server = MockServer::start().await;
    mount_services(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&server, dir.path(), backend);
    let inputs = config.select_inputs(None).unwrap();
    let connector = Connector::from_settings(config.connector.clone()).unwrap();
    let cancel = CancellationToken::new();

    let first = connector.run_once(&inputs, &cancel).await;
    assert_eq!(first.len(), 1);
    let summary = first[0].result.as_ref().unwrap();
    assert_eq!(summary.delivered, 3);
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.outcome, RunOutcome::Drained);

    let second = connector.run_once(&inputs, &cancel).await;
    let summary = second[0].result.as_ref().unwrap();
    assert_eq!(summary.delivered, 0);
    assert_eq!(summary.skipped, 1);

    assert_eq!(written_ids(&dir.path().join("events.ndjson")), vec!["e1", "e2", "e3"]);
}

#[tokio::test]
async fn file_backend_delivers_each_event_once_across_runs() {
    run_twice("file").await;
}

#[tokio::test]
async fn sqlite_backend_delivers_each_event_once_across_runs() {
    run_twice("sqlite").await;
}

#[tokio::test]
async fn records_carry_source_and_sourcetype() {
    let server = MockServer::start().await;
    mount_services(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&server, dir.path(), "file");
    let inputs = config.select_inputs(Some("primary")).unwrap();
    let connector = Connector::from_settings(config.connector.clone()).unwrap();

    connector.run_once(&inputs, &CancellationToken::new()).await;

    let body = fs::read_to_string(dir.path().join("events.ndjson")).unwrap();
    let first: Value = serde_json::from_str(body.lines().next().unwrap()).unwrap();
    assert_eq!(first["source"], "primary");
    assert_eq!(first["sourcetype"], "adobe_io_events");
    assert_eq!(first["event"]["n"], 1);
}

#[tokio::test]
async fn validate_counts_failing_inputs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_client"})))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&server, dir.path(), "file");
    let inputs = config.select_inputs(None).unwrap();
    let connector = Connector::from_settings(config.connector.clone()).unwrap();

    assert_eq!(connector.validate(&inputs).await, 1);
    assert!(!dir.path().join("checkpoints").exists());
}

#[tokio::test]
async fn cancelled_token_skips_every_input() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&server, dir.path(), "file");
    let inputs = config.select_inputs(None).unwrap();
    let connector = Connector::from_settings(config.connector.clone()).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(connector.run_once(&inputs, &cancel).await.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}
