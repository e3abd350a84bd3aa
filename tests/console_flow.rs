//! End-to-end console flows over the router.
//!
//! Uses stub cluster tools and a stub token exchanger so no containers,
//! clouds, or identity providers are involved.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use skylift::config::OAuthConfig;
use skylift::handoff::{CredentialHandoff, TokenExchanger};
use skylift::jobs::JobRegistry;
use skylift::server::{router, AppState};
use skylift::testing::{test_secrets_document, StubClusterControl, StubTokenExchanger};
use skylift::vault::CredentialVault;

struct Console {
    router: Router,
    exchanger: Arc<StubTokenExchanger>,
    _data_dir: tempfile::TempDir,
}

fn console() -> Console {
    let data_dir = tempfile::tempdir().unwrap();
    let vault = Arc::new(CredentialVault::new(data_dir.path()).unwrap());
    let exchanger = Arc::new(StubTokenExchanger::new());
    let handoff = Arc::new(CredentialHandoff::new(
        vault,
        Arc::clone(&exchanger) as Arc<dyn TokenExchanger>,
        OAuthConfig::default(),
    ));
    let registry = Arc::new(JobRegistry::new(Arc::new(StubClusterControl::new())));

    Console {
        router: router(AppState { registry, handoff }),
        exchanger,
        _data_dir: data_dir,
    }
}

async fn post_json(router: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, axum::response::Response) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    (resp.status(), resp)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 16).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn wait_until_terminal(router: &Router, uri: &str) -> serde_json::Value {
    for _ in 0..200 {
        let (status, json) = get(router, uri).await;
        assert_eq!(status, StatusCode::OK);
        let state = json["status"].as_str().unwrap_or_default().to_string();
        if state == "succeeded" || state == "failed" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job at {} never reached a terminal state", uri);
}

fn gce_submission() -> serde_json::Value {
    serde_json::json!({
        "email": "admin@example.com",
        "password": "hunter2",
        "deployment": "cloud",
        "infrastructure": "gce",
        "deployment_type": "simple",
        "max_nodes": 4,
        "instance_type": "n1-standard-2",
        "machine_image": "skylift-image-1",
        "project": "my-project",
        "client_secrets": test_secrets_document("abc123"),
    })
}

fn cookies_of(resp: &axum::response::Response) -> Vec<String> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| {
            // keep only "name=value"
            v.to_str().unwrap().split(';').next().unwrap().to_string()
        })
        .collect()
}

#[tokio::test]
async fn full_delegated_deployment_flow() {
    let console = console();

    // Submitting a GCE deployment stashes the form and redirects out.
    let (status, resp) = post_json(&console.router, "/deployments", gce_submission()).await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let location = resp.headers()["location"].to_str().unwrap().to_string();
    assert!(location.contains("response_type=code"));
    assert!(location.contains("client_id=abc123"));

    let cookies = cookies_of(&resp);
    assert_eq!(cookies.len(), 2);

    // The provider calls back with a code and the browser replays the
    // cookies; the deployment starts from the recovered submission.
    let req = Request::builder()
        .uri("/oauth2/callback?code=xyz")
        .header(COOKIE, cookies.join("; "))
        .body(Body::empty())
        .unwrap();
    let resp = console.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 16).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "started");
    let keyname = json["keyname"].as_str().unwrap().to_string();

    // The exchanger saw exactly the code from the callback.
    assert_eq!(
        console.exchanger.codes.lock().await.as_slice(),
        &["xyz".to_string()]
    );

    // And the job runs to completion, observable by polling.
    let report =
        wait_until_terminal(&console.router, &format!("/deployments/{}/status", keyname)).await;
    assert_eq!(report["status"], "succeeded");
}

#[tokio::test]
async fn replaying_a_raced_cookie_fails_cleanly() {
    let console = console();

    let (_, first) = post_json(&console.router, "/deployments", gce_submission()).await;
    let first_cookies = cookies_of(&first);

    // A second stash for the same client id rotates the key.
    let (_, _second) = post_json(&console.router, "/deployments", gce_submission()).await;

    let req = Request::builder()
        .uri("/oauth2/callback?code=xyz")
        .header(COOKIE, first_cookies.join("; "))
        .body(Body::empty())
        .unwrap();
    let resp = console.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 16).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "error");
    assert!(json["error_message"]
        .as_str()
        .unwrap()
        .contains("recover the stashed submission"));
}

#[tokio::test]
async fn terminate_and_poll_lifecycle() {
    let console = console();

    let (status, resp) = post_json(
        &console.router,
        "/deployments",
        serde_json::json!({
            "email": "admin@example.com",
            "password": "pw",
            "deployment": "cloud",
            "infrastructure": "ec2",
            "deployment_type": "simple",
            "max_nodes": 2,
            "instance_type": "m1.large",
            "machine_image": "emi-12345678",
            "access_key": "AKIA",
            "secret_key": "shh",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 16).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let keyname = json["keyname"].as_str().unwrap().to_string();

    wait_until_terminal(&console.router, &format!("/deployments/{}/status", keyname)).await;

    // Termination status is its own registry: nothing there yet.
    let (status, _) = get(
        &console.router,
        &format!("/terminations/{}/status", keyname),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(
        &console.router,
        &format!("/deployments/{}/terminate", keyname),
        serde_json::Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let report = wait_until_terminal(
        &console.router,
        &format!("/terminations/{}/status", keyname),
    )
    .await;
    assert_eq!(report["status"], "succeeded");
}

#[tokio::test]
async fn a_fresh_console_forgets_previous_keynames() {
    // Starting a deployment on one console instance...
    let first = console();
    let (_, resp) = post_json(
        &first.router,
        "/deployments",
        serde_json::json!({
            "email": "admin@example.com",
            "password": "pw",
            "deployment": "cluster",
            "ips_yaml": "controller: 10.0.0.1",
            "root_password": "rootpw",
        }),
    )
    .await;
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 16).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let keyname = json["keyname"].as_str().unwrap().to_string();

    // ...means nothing after a "restart": the registries are in-memory
    // only, so the keyname can no longer be polled or terminated.
    let second = console();
    let (status, _) = get(&second.router, &format!("/deployments/{}/status", keyname)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(
        &second.router,
        &format!("/deployments/{}/terminate", keyname),
        serde_json::Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
