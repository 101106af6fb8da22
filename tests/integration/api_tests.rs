use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use crate::helpers::test_harness::TestHarness;
use examsearch::web::create_router;
use examsearch::Config;

async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_search_endpoint_shape() -> Result<()> {
    let (harness, _) = TestHarness::seeded().await?;
    let app = create_router(harness.state.clone());

    let (status, body) = send(&app, get("/api/v1/search?query=politics%20dirty%20game&top_n=3")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "politics dirty game");
    assert_eq!(body["degraded"], false);
    assert!(body.get("degraded_reason").is_none());

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    for r in results {
        assert!(r["id"].as_str().unwrap().parse::<Uuid>().is_ok());
        assert!(r["text"].is_string());
        assert!(r["tags"].is_array());
        let score = r["score"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&score));
    }
    Ok(())
}

#[tokio::test]
async fn test_search_with_tag_filter() -> Result<()> {
    let (harness, _) = TestHarness::seeded().await?;
    let app = create_router(harness.state.clone());

    let (status, body) = send(
        &app,
        get("/api/v1/search?query=politics&tags=philosophy,ethics&top_n=10"),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_blank_query_is_bad_request() -> Result<()> {
    let harness = TestHarness::new().await?;
    let app = create_router(harness.state.clone());

    for uri in [
        "/api/v1/search?query=%20%20",
        "/api/v1/search",
        "/api/v1/semantic-search?query=",
        "/api/v1/keyword-search?query=",
    ] {
        let (status, body) = send(&app, get(uri)).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"].is_string());
    }

    let (status, _) = send(&app, get("/api/v1/search?query=love&top_n=0")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_degraded_search_over_http() -> Result<()> {
    let (harness, _) = TestHarness::seeded().await?;
    let app = create_router(harness.with_failing_embedder(Config::default())?);

    let (status, body) = send(&app, get("/api/v1/search?query=politics%20dirty%20game")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["degraded"], true);
    assert!(body["degraded_reason"].is_string());

    let (status, _) = send(&app, get("/api/v1/semantic-search?query=politics")).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (_, body) = send(&app, get("/health")).await?;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["embedding"]["provider"], "failing");
    Ok(())
}

#[tokio::test]
async fn test_question_lifecycle() -> Result<()> {
    let harness = TestHarness::new().await?;
    let app = create_router(harness.state.clone());

    let (status, created) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/questions",
            json!({
                "text": "Describe love in three sentences",
                "tags": ["poetry"],
                "difficulty": "easy",
                "type": "short_answer"
            }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["type"], "short_answer");

    let (status, fetched) = send(&app, get(&format!("/api/v1/questions/{}", id))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["text"], "Describe love in three sentences");

    let (status, patched) = send(
        &app,
        json_request(
            Method::PATCH,
            &format!("/api/v1/questions/{}", id),
            json!({ "tags": ["emotion"], "difficulty": "medium" }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["tags"], json!(["poetry", "emotion"]));
    assert_eq!(patched["difficulty"], "medium");

    let (status, _) = send(
        &app,
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/v1/questions/{}", id))
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, get(&format!("/api/v1/questions/{}", id))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
    Ok(())
}

#[tokio::test]
async fn test_unknown_question_is_not_found() -> Result<()> {
    let harness = TestHarness::new().await?;
    let app = create_router(harness.state.clone());
    let id = Uuid::new_v4();

    let (status, _) = send(&app, get(&format!("/api/v1/questions/{}", id))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/v1/questions/{}", id))
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_bulk_create_and_list() -> Result<()> {
    let harness = TestHarness::new().await?;
    let app = create_router(harness.state.clone());

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/questions/bulk",
            json!([
                { "text": "Who is the most influential rapper right now?", "tags": ["music"] },
                { "text": "Is politics a dirty game?", "tags": ["political"], "type": "essay" }
            ]),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["stored"], 2);

    let (status, body) = send(&app, get("/api/v1/questions?tags=political")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(&app, get("/api/v1/keyword-search?query=rapper")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_health_and_metrics() -> Result<()> {
    let harness = TestHarness::new().await?;
    let app = create_router(harness.state.clone());

    let (status, body) = send(&app, get("/health")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["embedding"]["provider"], "mock");

    let response = app.clone().oneshot(get("/metrics")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_malformed_input_gets_json_error() -> Result<()> {
    let harness = TestHarness::new().await?;
    let app = create_router(harness.state.clone());

    for uri in [
        "/api/v1/search?query=love&top_n=abc",
        "/api/v1/semantic-search?query=love&top_n=-1",
        "/api/v1/keyword-search?query=love&limit=many",
        "/api/v1/questions?offset=x",
        "/api/v1/questions/not-a-uuid",
    ] {
        let (status, body) = send(&app, get(uri)).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"].is_string(), "{}", uri);
    }

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/questions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))?;
    let (status, body) = send(&app, request).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    Ok(())
}

#[tokio::test]
async fn test_operator_words_in_query_are_searchable() -> Result<()> {
    let (harness, _) = TestHarness::seeded().await?;
    let app = create_router(harness.state.clone());

    for uri in [
        "/api/v1/search?query=Explain%20IN%20detail",
        "/api/v1/search?query=Is%20a%20%3E%20b%20fair%3F",
        "/api/v1/search?query=politics%20AND",
        "/api/v1/keyword-search?query=NOT",
        "/api/v1/keyword-search?query=is%20it%20%3Cfair%3E%20politics",
    ] {
        let (status, _) = send(&app, get(uri)).await?;
        assert_eq!(status, StatusCode::OK, "{}", uri);
    }

    let (_, body) = send(&app, get("/api/v1/keyword-search?query=politics%20AND%20corrupt")).await?;
    assert_eq!(body.as_array().unwrap().len(), 6);
    Ok(())
}
