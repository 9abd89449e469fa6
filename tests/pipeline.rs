use std::time::Duration;

use renderapi::hooks::AuthHook;
use renderapi::{Client, Error};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> Client {
    Client::new(server.uri(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn sends_rendered_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("X-Request-Id", "req-42"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(json!({
            "name": "ADA",
            "email": "ada@example.com",
            "role": "root",
            "tags": "a,b"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let template = r#"{
        "request": {
            "method": "POST",
            "path": "/users",
            "headers": {"X-Request-Id": "req-{{ id }}"}
        },
        "body": {
            "name": "{{ toUpper(user.name) }}",
            "email": "{{ toLower(user.email) }}",
            "role": "{% if user.role == 'admin' %}root{% else %}user{% endif %}",
            "tags": "{{ join(user.tags, ',') }}"
        }
    }"#;
    let data = json!({
        "id": 42,
        "user": {"name": "Ada", "email": "ADA@example.com", "role": "admin", "tags": ["a", "b"]}
    });

    let response = client(&server)
        .execute_template_json(template, &data)
        .await
        .unwrap();
    assert_eq!(response.status.as_u16(), 201);
    assert_eq!(response.text(), r#"{"id":1}"#);
}

#[tokio::test]
async fn cached_responses_skip_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(200).set_body_string("v1"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let template = r#"{"request": {"path": "/config"}, "caching": {"enabled": true, "ttl": 30}}"#;
    let data = json!({});
    let first = client.execute_template_json(template, &data).await.unwrap();
    let second = client.execute_template_json(template, &data).await.unwrap();
    assert_eq!(first.text(), "v1");
    assert_eq!(second.text(), "v1");
}

#[tokio::test]
async fn global_hooks_run_after_template_hooks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header("Authorization", "Bearer global"))
        .and(header("X-From-Script", "yes"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = client(&server);
    client.add_before_hook(AuthHook::new("global"));
    let template = r#"{
        "request": {"method": "POST", "path": "/login"},
        "body": {"user": "{{ user }}"},
        "beforeHooks": [{
            "type": "js",
            "name": "tag",
            "script": "function processRequest(r) { r.headers['Authorization'] = 'Bearer template'; r.headers['X-From-Script'] = 'yes'; return r; }"
        }]
    }"#;
    let response = client
        .execute_template_json(template, &json!({"user": "ada"}))
        .await
        .unwrap();
    assert_eq!(response.status.as_u16(), 200);
}

#[tokio::test]
async fn template_after_hooks_can_rewrite_the_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [1, 2, 3]})))
        .mount(&server)
        .await;

    let template = r#"{
        "request": {"path": "/items"},
        "afterHooks": [{
            "type": "js",
            "script": "function processResponse(r) { return { status: 202, body: { count: r.body.items.length } }; }"
        }]
    }"#;
    let response = client(&server)
        .execute_template_json(template, &json!({}))
        .await
        .unwrap();
    assert_eq!(response.status.as_u16(), 202);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body, json!({"count": 3}));
}

#[tokio::test]
async fn http_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let template = r#"{"request": {"path": "/flaky"}, "retry": {"enabled": true, "initialDelay": 10}}"#;
    let response = client(&server)
        .execute_template_json(template, &json!({}))
        .await
        .unwrap();
    assert_eq!(response.status.as_u16(), 503);
}

#[tokio::test]
async fn hook_failures_name_the_stage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let template = r#"{
        "request": {"method": "POST", "path": "/x"},
        "body": {"a": 1},
        "beforeHooks": [{"type": "js", "name": "broken", "script": "function processRequest(r) { throw new Error('nope'); }"}]
    }"#;
    let err = client(&server)
        .execute_template_json(template, &json!({}))
        .await
        .unwrap_err();
    match &err {
        Error::BeforeHook { hook, .. } => assert_eq!(hook, "broken"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("before-request hook `broken` failed"));
}

#[tokio::test]
async fn template_timeout_applies_to_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let template = r#"{"request": {"path": "/slow", "timeout": 1}}"#;
    let err = client(&server)
        .execute_template_json(template, &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}

#[tokio::test]
async fn template_and_data_files() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/profile"))
        .and(body_json(json!({"name": "Grace"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let template_path = dir.path().join("profile.json");
    let data_path = dir.path().join("data.json");
    std::fs::write(
        &template_path,
        r#"{"request": {"method": "PUT", "path": "/profile"}, "body": {"name": "{{ title(name) }}"}}"#,
    )
    .unwrap();
    std::fs::write(&data_path, r#"{"name": "grace"}"#).unwrap();

    let response = client(&server)
        .execute_template_with_data_file(&template_path, &data_path)
        .await
        .unwrap();
    assert_eq!(response.status.as_u16(), 204);

    let err = client(&server)
        .execute_template_with_data_file(dir.path().join("missing.json"), &data_path)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}
