//! End to end dispatch tests over real sockets.

use std::fs;

use reqwest::StatusCode;
use serde_json::{json, Value};
use switchyard::config::AppConfig;
use switchyard::http::X_REQUEST_ID;
use switchyard::RequestContext;

mod common;

#[tokio::test]
async fn routed_get_returns_envelope() {
    let server = common::start(common::dispatcher(AppConfig::default(), |r| {
        r.prefix("api")
            .bind_func("double", |ctx: &mut RequestContext, n: i64| ctx.set_data(n * 2));
    }))
    .await;

    let response = common::client()
        .get(server.url("/api/double/21"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(X_REQUEST_ID));
    assert_eq!(
        response.headers()["content-type"],
        "application/json;charset=UTF-8"
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "msg": "", "code": 0, "data": 42 }));

    server.stop().await;
}

#[tokio::test]
async fn form_and_json_parameters_reach_the_handler() {
    let server = common::start(common::dispatcher(AppConfig::default(), |r| {
        r.bind_func("sum", |ctx: &mut RequestContext| {
            let a = ctx.param_i64("a", "a", true, 0, 0, 0);
            let b = ctx.param_i64("b", "b", false, 0, 0, 10);
            match (a, b) {
                (Ok(a), Ok(b)) => ctx.set_data(a + b),
                (Err(e), _) | (_, Err(e)) => ctx.add_error(e),
            }
        });
    }))
    .await;
    let client = common::client();

    let body: Value = client
        .post(server.url("/sum"))
        .form(&[("a", "2"), ("b", "3")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"], 5);

    let body: Value = client
        .post(server.url("/sum"))
        .json(&json!({ "a": 7 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"], 17);

    let body: Value = client
        .get(server.url("/sum"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["code"], 2000);
    assert!(!body["msg"].as_str().unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn panicking_handler_is_isolated() {
    let server = common::start(common::dispatcher(AppConfig::default(), |r| {
        r.bind_func("boom", |_: &mut RequestContext| panic!("database password"));
        r.bind_func("ok", |ctx: &mut RequestContext| ctx.set_data(true));
    }))
    .await;
    let client = common::client();

    let response = client.get(server.url("/boom")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let text = response.text().await.unwrap();
    assert!(!text.contains("password"));

    let response = client.get(server.url("/ok")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn unmatched_path_falls_back_to_static_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();
    fs::create_dir(dir.path().join("docs")).unwrap();
    fs::write(dir.path().join("docs/index.html"), "<p>docs</p>").unwrap();

    let mut config = AppConfig::default();
    config.static_dir.local_path = dir.path().to_string_lossy().into_owned();
    config.static_dir.prefix = "assets/".into();

    let server = common::start(common::dispatcher(config, |r| {
        r.bind_func("ping", |ctx: &mut RequestContext| ctx.set_data("pong"));
    }))
    .await;
    let client = common::client();

    let response = client.get(server.url("/assets/app.js")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(X_REQUEST_ID));
    assert_eq!(response.text().await.unwrap(), "console.log(1)");

    let response = client.get(server.url("/assets/docs")).send().await.unwrap();
    assert_eq!(response.text().await.unwrap(), "<p>docs</p>");

    let response = client.get(server.url("/assets/missing.css")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn admission_rejects_when_bucket_is_empty() {
    let mut config = AppConfig::default();
    config.rate.per_second = 0.1;
    config.rate.bucket = 1;
    config.rate.wait_millisecond = 0;

    let server = common::start(common::dispatcher(config, |r| {
        r.bind_func("ping", |ctx: &mut RequestContext| ctx.set_data("pong"));
    }))
    .await;
    let client = common::client();

    let first = client.get(server.url("/ping")).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let second = client.get(server.url("/ping")).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    server.stop().await;
}

#[tokio::test]
async fn global_middleware_headers_reach_the_client() {
    let dispatcher = common::dispatcher(AppConfig::default(), |r| {
        r.bind_func("ping", |ctx: &mut RequestContext| ctx.set_data("pong"));
    })
    .with_global_middleware(|_: &axum::http::Request<axum::body::Body>, headers: &mut axum::http::HeaderMap| {
        headers.insert("access-control-allow-origin", "*".parse().unwrap());
        true
    });
    let server = common::start(dispatcher).await;

    let response = common::client().get(server.url("/ping")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    server.stop().await;
}

#[tokio::test]
async fn route_middleware_can_answer_for_the_handler() {
    let server = common::start(common::dispatcher(AppConfig::default(), |r| {
        r.prefix("admin")
            .bind_middleware(|ctx: &mut RequestContext| {
                ctx.fail(401, "login required");
                false
            })
            .bind_func("stats", |_: &mut RequestContext| unreachable!());
    }))
    .await;

    let body: Value = common::client()
        .get(server.url("/admin/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "msg": "login required", "code": 401, "data": {} }));
    assert_eq!(server.dispatcher.inflight().active_count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn timed_out_request_still_completes_and_recycles_its_context() {
    let mut config = AppConfig::default();
    config.http.request_timeout_secs = 1;

    let server = common::start(common::dispatcher(config, |r| {
        r.bind_func("slow", |ctx: &mut RequestContext| {
            std::thread::sleep(std::time::Duration::from_millis(1500));
            ctx.set_data("late");
        });
    }))
    .await;

    let response = common::client().get(server.url("/slow")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

    let dispatcher = &server.dispatcher;
    for _ in 0..50 {
        if dispatcher.inflight().active_count() == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    assert_eq!(dispatcher.inflight().active_count(), 0);
    assert_eq!(dispatcher.pool().idle_count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn encoded_paths_reach_routes_and_files_decoded() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("my file.txt"), "spaced").unwrap();
    let mut config = AppConfig::default();
    config.static_dir.local_path = dir.path().to_string_lossy().into_owned();

    let server = common::start(common::dispatcher(config, |r| {
        r.bind_func("echo", |ctx: &mut RequestContext, text: String| ctx.set_data(text));
    }))
    .await;
    let client = common::client();

    let body: Value = client
        .get(server.url("/echo/hello%20world"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"], "hello world");

    let response = client.get(server.url("/my%20file.txt")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "spaced");

    server.stop().await;
}
