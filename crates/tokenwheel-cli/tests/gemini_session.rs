//! End-to-end runs of `generate` and `step` against a mocked Gemini API.

use std::sync::{Arc, Mutex};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const CAT_RESPONSE: &str = include_str!("../../tokenwheel-core/tests/fixtures/gemini_cat_mat.json");

/// Creates a temp TOKENWHEEL_HOME directory for test isolation.
fn temp_home() -> TempDir {
    TempDir::new().expect("create temp tokenwheel home")
}

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

fn cat_response() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/json")
        .set_body_string(CAT_RESPONSE)
}

/// Mounts the cat fixture for every call and records request bodies.
async fn mount_recording(server: &MockServer) -> Arc<Mutex<Vec<String>>> {
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let recorded = bodies.clone();
    Mock::given(method("POST"))
        .and(path_regex(r"^/models/[^/]+:generateContent$"))
        .and(header("x-goog-api-key", "test-api-key"))
        .respond_with(move |req: &Request| {
            recorded
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(&req.body).to_string());
            cat_response()
        })
        .mount(server)
        .await;
    bodies
}

#[tokio::test]
async fn test_generate_prints_tokens_and_candidates() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_home();
    let server = MockServer::start().await;
    let bodies = mount_recording(&server).await;

    cargo_bin_cmd!("tokenwheel")
        .env("TOKENWHEEL_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", server.uri())
        .args(["generate", "-p", "The cat sat on the"])
        .assert()
        .success()
        .stdout(predicate::str::contains("The cat sat on the mat."))
        .stdout(predicate::str::contains("\" floor\" 40.0%"));

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let body: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(body["generationConfig"]["responseLogprobs"], true);
    assert_eq!(body["generationConfig"]["logprobs"], 8);
}

#[tokio::test]
async fn test_step_accepts_to_completion() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_home();
    let server = MockServer::start().await;
    let bodies = mount_recording(&server).await;

    cargo_bin_cmd!("tokenwheel")
        .env("TOKENWHEEL_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", server.uri())
        .args(["step", "-p", "The cat sat on the"])
        .write_stdin("a\na\nq\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("[stepping 1/2]"))
        .stdout(predicate::str::contains("[complete]"))
        .stdout(predicate::str::contains("The cat sat on the mat."));

    assert_eq!(bodies.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_step_undo_makes_no_call() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_home();
    let server = MockServer::start().await;
    let bodies = mount_recording(&server).await;

    cargo_bin_cmd!("tokenwheel")
        .env("TOKENWHEEL_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", server.uri())
        .args(["step", "-p", "The cat sat on the"])
        .write_stdin("a\nu\nu\nq\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("cannot undo while stepping"));

    assert_eq!(bodies.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_step_temperature_applies_to_later_calls() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_home();
    let server = MockServer::start().await;
    let bodies = mount_recording(&server).await;

    cargo_bin_cmd!("tokenwheel")
        .env("TOKENWHEEL_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", server.uri())
        .args(["step"])
        .write_stdin("temp 0.25\nstart The cat sat on the\nq\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("temperature 0.25"));

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let body: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    let temperature = body["generationConfig"]["temperature"].as_f64().unwrap();
    assert!((temperature - 0.25).abs() < 1e-6);
}

#[tokio::test]
async fn test_step_confirm_regenerates_from_divergent_text() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_home();
    let server = MockServer::start().await;
    let bodies = mount_recording(&server).await;

    cargo_bin_cmd!("tokenwheel")
        .env("TOKENWHEEL_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", server.uri())
        .args(["step", "-p", "The cat sat on the"])
        .write_stdin("s 2\nc\nq\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("The cat sat on the[ floor]"))
        .stdout(predicate::str::contains("The cat sat on the floor\n"));

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 2);
    let second: serde_json::Value = serde_json::from_str(&bodies[1]).unwrap();
    assert_eq!(
        second["contents"][0]["parts"][0]["text"],
        "The cat sat on the floor"
    );
}

#[tokio::test]
async fn test_step_reports_safety_block() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_home();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r":generateContent$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#),
        )
        .mount(&server)
        .await;

    cargo_bin_cmd!("tokenwheel")
        .env("TOKENWHEEL_HOME", home.path())
        .env("GEMINI_API_KEY", "test-api-key")
        .env("GEMINI_BASE_URL", server.uri())
        .args(["step", "-p", "something"])
        .write_stdin("q\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("[idle]"))
        .stdout(predicate::str::contains("Generation blocked (SAFETY)"))
        .stdout(predicate::str::contains("retry"));
}

#[test]
fn test_step_without_api_key_fails() {
    let home = temp_home();

    cargo_bin_cmd!("tokenwheel")
        .env("TOKENWHEEL_HOME", home.path())
        .env_remove("GEMINI_API_KEY")
        .args(["step", "-p", "hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GEMINI_API_KEY"));
}
