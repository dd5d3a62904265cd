#![allow(dead_code)]

use lib_common::api::{ApiState, BasicCredentials, EncoderOptions, WireRecord, router};
use lib_common::records::{MemRecordStore, PipelineConfig, Records};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const USER: &str = "admin";
pub const PASSWORD: &str = "admin";

/// A records server bound to an ephemeral loopback port.
pub struct TestServer {
    pub base: String,
    pub shutdown: CancellationToken,
    pub records: Records<MemRecordStore>,
    pub handle: JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

pub async fn spawn_server(pipeline: PipelineConfig, encoder: EncoderOptions) -> TestServer {
    let shutdown = CancellationToken::new();
    let records =
        Records::with_relay_capacity(MemRecordStore::new(pipeline), pipeline.relay_capacity);
    let state = ApiState::new(records.clone(), shutdown.clone()).with_encoder(encoder);
    let app = router(state, BasicCredentials::new(USER, PASSWORD));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let token = shutdown.clone();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
            .expect("serve");
    });

    TestServer {
        base: format!("http://{}", addr),
        shutdown,
        records,
        handle,
    }
}

pub async fn default_server() -> TestServer {
    spawn_server(PipelineConfig::default(), EncoderOptions::default()).await
}

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub async fn create(
    client: &reqwest::Client,
    server: &TestServer,
    name: &str,
    data: &str,
) -> WireRecord {
    let response = client
        .post(server.url("/create"))
        .basic_auth(USER, Some(PASSWORD))
        .json(&serde_json::json!({ "name": name, "data": data }))
        .send()
        .await
        .expect("create request");
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    response.json().await.expect("created record")
}
