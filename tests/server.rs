//! HTTP serving layer tests against a live listener.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;

use corpus_chat::completion::CompletionProvider;
use corpus_chat::config::Config;
use corpus_chat::error::CompletionError;
use corpus_chat::server::{router, AppState};
use corpus_chat::session::{Message, Role};

/// Echoes the last user message. `"fail"` produces a provider error and
/// `"slow"` holds the turn open for a while before answering `"done"`.
struct Echo;

#[async_trait]
impl CompletionProvider for Echo {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, messages: &[Message]) -> Result<Message, CompletionError> {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if last == "slow" {
            tokio::time::sleep(Duration::from_millis(500)).await;
            return Ok(Message::assistant("done"));
        }
        if last == "fail" {
            return Err(CompletionError::Api {
                status: 429,
                body: "rate limited".to_string(),
            });
        }
        let seed_len = messages[0].content.len();
        Ok(Message::assistant(format!("echo({}): {}", seed_len, last)))
    }
}

async fn spawn_server() -> String {
    let state = AppState::new(Config::default(), Arc::new(Echo), "seed".to_string()).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn archive() -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        zip.start_file("a.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"Hello").unwrap();
        zip.start_file("._a.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"noise").unwrap();
        zip.finish().unwrap();
    }
    buf
}

async fn create_session(client: &reqwest::Client, base: &str, body: Option<Value>) -> String {
    let mut request = client.post(format!("{}/sessions", base));
    if let Some(body) = body {
        request = request.json(&body);
    }
    let resp = request.send().await.unwrap();
    assert_eq!(resp.status(), 201);
    let json: Value = resp.json().await.unwrap();
    json["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_version() {
    let base = spawn_server().await;
    let json: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn conversation_round_trip() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &base, None).await;

    let resp = client
        .post(format!("{}/sessions/{}/messages", base, id))
        .json(&json!({ "content": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["reply"]["role"], "assistant");
    assert_eq!(json["reply"]["content"], "echo(4): hi");
    assert_eq!(json["state"], "idle");

    let history: Value = client
        .get(format!("{}/sessions/{}/messages", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "assistant");
    assert_eq!(messages[1]["role"], "user");
    assert_eq!(messages[1]["content"], "hi");
}

#[tokio::test]
async fn blank_submit_appends_nothing() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &base, None).await;

    let json: Value = client
        .post(format!("{}/sessions/{}/messages", base, id))
        .json(&json!({ "content": "   " }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(json["reply"].is_null());
    assert_eq!(json["state"], "idle");
}

#[tokio::test]
async fn completion_failure_leaves_turn_unanswered() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &base, None).await;

    let resp = client
        .post(format!("{}/sessions/{}/messages", base, id))
        .json(&json!({ "content": "fail" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "completion_failed");

    let history: Value = client
        .get(format!("{}/sessions/{}/messages", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["state"], "awaiting_response");
    assert_eq!(history["unanswered"], 1);
    assert_eq!(history["messages"][0]["content"], "fail");
}

#[tokio::test]
async fn ingest_then_seed_session_from_corpus() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/ingest", base))
        .body(archive())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["success_count"], 1);
    assert_eq!(report["text"], "Hello\n");
    assert_eq!(report["cached"], false);
    let key = report["key"].as_str().unwrap().to_string();

    let again: Value = client
        .post(format!("{}/ingest", base))
        .body(archive())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["cached"], true);

    let id = create_session(&client, &base, Some(json!({ "corpus_key": key }))).await;
    let json: Value = client
        .post(format!("{}/sessions/{}/messages", base, id))
        .json(&json!({ "content": "summarize" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    // "seed\n\nHello\n"
    assert_eq!(json["reply"]["content"], "echo(12): summarize");
}

#[tokio::test]
async fn error_statuses() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/ingest", base))
        .body("not a zip at all ".repeat(30))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "corrupt_archive");

    let resp = client
        .post(format!("{}/sessions", base))
        .json(&json!({ "corpus_key": "missing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let unknown = uuid::Uuid::new_v4();
    let resp = client
        .get(format!("{}/sessions/{}/messages", base, unknown))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let id = create_session(&client, &base, None).await;
    let resp = client
        .delete(format!("{}/sessions/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    let resp = client
        .delete(format!("{}/sessions/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn overlapping_submit_on_same_session_conflicts() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &base, None).await;
    let url = format!("{}/sessions/{}/messages", base, id);

    let first = {
        let client = client.clone();
        let url = url.clone();
        tokio::spawn(async move {
            client
                .post(url)
                .json(&json!({ "content": "slow" }))
                .send()
                .await
                .unwrap()
        })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;

    let second = client
        .post(&url)
        .json(&json!({ "content": "two" }))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 409);
    let json: Value = second.json().await.unwrap();
    assert_eq!(json["error"]["code"], "conflict");

    let first = first.await.unwrap();
    assert_eq!(first.status(), 200);

    let history: Value = client
        .get(&url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "done");
    assert_eq!(messages[1]["content"], "slow");
    assert_eq!(history["unanswered"], 0);
}

/// A second listener standing in for a remote archive host.
async fn spawn_archive_host() -> String {
    use axum::{http::StatusCode, routing::get, Router};

    let zip = archive();
    let app = Router::new()
        .route(
            "/works.zip",
            get(move || {
                let zip = zip.clone();
                async move { zip }
            }),
        )
        .route("/missing.zip", get(|| async { StatusCode::NOT_FOUND }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn ingest_by_url() {
    let base = spawn_server().await;
    let host = spawn_archive_host().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/ingest", base))
        .query(&[("url", format!("{}/works.zip", host))])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["success_count"], 1);
    assert_eq!(report["text"], "Hello\n");

    let resp = client
        .post(format!("{}/ingest", base))
        .query(&[("url", format!("{}/missing.zip", host))])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "fetch_failed");
    assert!(json["error"]["message"].as_str().unwrap().contains("404"));

    let resp = client
        .post(format!("{}/ingest", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
