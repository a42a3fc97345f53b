//! API integration tests driven through the router.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestFixture;

async fn submit(fixture: &TestFixture, body: serde_json::Value) -> String {
    let response = fixture.post("/api/v1/jobs", body).await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    response.body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert!(response.body.get("workers").is_none());
}

#[tokio::test]
async fn test_config_exposes_defaults() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["executor"]["workers"], 2);
    assert_eq!(response.body["versioning"]["max_allocation_attempts"], 30);
}

#[tokio::test]
async fn test_submit_job_returns_pending_view() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({"kind": "train", "project_id": 1, "field_id": 4}),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["state"], "pending");
    assert_eq!(response.body["kind"], "train");
    assert_eq!(response.body["target"]["field_id"], 4);
}

#[tokio::test]
async fn test_submit_invalid_job_is_unprocessable() {
    let fixture = TestFixture::new();

    // Index jobs take no field
    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({"kind": "index", "project_id": 1, "field_id": 2}),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body["error"].as_str().unwrap().contains("field_id"));

    // Predict without a field
    let response = fixture
        .post("/api/v1/jobs", json!({"kind": "predict", "project_id": 1}))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);

    let listed = fixture.get("/api/v1/jobs").await;
    assert_eq!(listed.body["total"], 0);
}

#[tokio::test]
async fn test_get_unknown_job_is_not_found() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/jobs/does-not-exist").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_jobs_filters_and_clamps_limit() {
    let fixture = TestFixture::new();
    submit(&fixture, json!({"kind": "index", "project_id": 1})).await;
    submit(&fixture, json!({"kind": "index", "project_id": 2})).await;
    submit(
        &fixture,
        json!({"kind": "train", "project_id": 1, "field_id": 3}),
    )
    .await;

    let response = fixture.get("/api/v1/jobs?project_id=1").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["total"], 2);

    let response = fixture.get("/api/v1/jobs?kind=index&limit=1").await;
    assert_eq!(response.body["total"], 2);
    assert_eq!(response.body["jobs"].as_array().unwrap().len(), 1);

    let response = fixture.get("/api/v1/jobs?limit=5000").await;
    assert_eq!(response.body["limit"], 1000);
    assert_eq!(response.body["jobs"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_cancel_job_then_conflict() {
    let fixture = TestFixture::new();
    let id = submit(&fixture, json!({"kind": "index", "project_id": 1})).await;

    let response = fixture
        .post_empty(&format!("/api/v1/jobs/{}/cancel", id))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["state"], "cancelled");

    let response = fixture
        .post_empty(&format!("/api/v1/jobs/{}/cancel", id))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let response = fixture.post_empty("/api/v1/jobs/missing/cancel").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_project_index_status_follows_jobs() {
    let fixture = TestFixture::new();
    fixture.env.add_document(1, 1, "alpha beta");
    fixture.env.add_document(1, 2, "");

    let response = fixture.get("/api/v1/projects/1/index").await;
    assert_eq!(response.body["status"], "pending");
    assert_eq!(response.body["total"], 2);
    assert!(response.body["last_job"].is_null());

    let id = submit(&fixture, json!({"kind": "index", "project_id": 1})).await;
    fixture.env.executor().execute(&id).unwrap();

    let response = fixture.get("/api/v1/projects/1/index").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "invalid");
    assert_eq!(response.body["indexed"], 1);
    assert_eq!(response.body["failed"], 1);
    assert_eq!(response.body["last_job"]["id"], id.as_str());

    let response = fixture
        .get("/api/v1/projects/1/index/entries?status=failed")
        .await;
    let entries = response.body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["document_id"], 2);
}

#[tokio::test]
async fn test_empty_project_is_valid() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/projects/9/index").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "valid");
    assert_eq!(response.body["total"], 0);
}

#[tokio::test]
async fn test_field_versions_and_predictions() {
    let fixture = TestFixture::new();
    let env = &fixture.env;
    env.add_document(1, 1, "cheap flights to rome");
    env.add_document(1, 2, "hotel booking by the sea");
    env.add_document(1, 3, "football match tonight");
    env.add_document(1, 4, "tennis final result");
    let (field, classes) = env.create_field(1, "topic", &["travel", "sport"]);
    for (doc, class) in [(1, 0), (2, 0), (3, 1), (4, 1)] {
        env.label(doc, field.field_id, classes[class].class_id);
    }

    let executor = env.executor();
    for body in [
        json!({"kind": "index", "project_id": 1}),
        json!({"kind": "train", "project_id": 1, "field_id": field.field_id}),
        json!({"kind": "predict", "project_id": 1, "field_id": field.field_id}),
    ] {
        let id = submit(&fixture, body).await;
        executor.execute(&id).unwrap();
        let view = fixture.get(&format!("/api/v1/jobs/{}", id)).await;
        assert_eq!(view.body["state"], "success", "{:?}", view.body);
    }

    let response = fixture
        .get(&format!("/api/v1/fields/{}/versions", field.field_id))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["latest_ready"], 1);
    assert_eq!(response.body["versions"][0]["status"], "ready");

    let response = fixture
        .get(&format!(
            "/api/v1/fields/{}/predictions?limit=2",
            field.field_id
        ))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["predictions"].as_array().unwrap().len(), 2);

    let response = fixture.get("/api/v1/fields/999/versions").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new();
    submit(&fixture, json!({"kind": "index", "project_id": 1})).await;

    let (status, body) = fixture.get_text("/api/v1/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("lexiclass_jobs_by_state"));
    assert!(body.contains("lexiclass_http_requests_total"));
}

#[tokio::test]
async fn test_corpus_built_over_http_trains_and_predicts() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/v1/projects/1/documents",
            json!({"documents": [
                {"document_id": 1, "text": "cheap flights to rome"},
                {"document_id": 2, "text": "hotel booking by the sea"},
                {"document_id": 3, "text": "football match tonight"},
                {"document_id": 4, "text": "tennis final result"},
            ]}),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    assert_eq!(response.body["stored"], 4);
    assert_eq!(response.body["registered"], 4);

    let response = fixture
        .post(
            "/api/v1/projects/1/fields",
            json!({"name": "topic", "classes": ["travel"]}),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    let field_id = response.body["field"]["field_id"].as_i64().unwrap();
    let travel = response.body["classes"][0]["class_id"].as_i64().unwrap();

    let response = fixture
        .post(
            &format!("/api/v1/fields/{}/classes", field_id),
            json!({"name": "sport"}),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let sport = response.body["class_id"].as_i64().unwrap();

    for (doc, class) in [(1, travel), (2, travel), (3, sport), (4, sport)] {
        let response = fixture
            .put(
                &format!("/api/v1/fields/{}/labels/{}", field_id, doc),
                json!({"class_id": class}),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        assert_eq!(response.body["class_id"], class);
    }

    let response = fixture.get(&format!("/api/v1/fields/{}", field_id)).await;
    assert_eq!(response.body["classes"].as_array().unwrap().len(), 2);
    let response = fixture.get("/api/v1/projects/1/fields").await;
    assert_eq!(response.body["fields"][0]["name"], "topic");

    let executor = fixture.env.executor();
    for body in [
        json!({"kind": "index", "project_id": 1}),
        json!({"kind": "train", "project_id": 1, "field_id": field_id}),
        json!({"kind": "predict", "project_id": 1, "field_id": field_id}),
    ] {
        let id = submit(&fixture, body).await;
        executor.execute(&id).unwrap();
        let view = fixture.get(&format!("/api/v1/jobs/{}", id)).await;
        assert_eq!(view.body["state"], "success", "{:?}", view.body);
    }

    let response = fixture
        .get(&format!("/api/v1/fields/{}/predictions", field_id))
        .await;
    assert_eq!(response.body["predictions"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_delete_documents_forgets_them() {
    let fixture = TestFixture::new();
    fixture
        .post(
            "/api/v1/projects/1/documents",
            json!({"documents": [
                {"document_id": 1, "text": "alpha"},
                {"document_id": 2, "text": "beta"},
            ]}),
        )
        .await;

    let response = fixture
        .delete("/api/v1/projects/1/documents", json!({"document_ids": [2, 9]}))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["removed"], 1);

    let response = fixture.get("/api/v1/projects/1/index").await;
    assert_eq!(response.body["total"], 1);
    assert!(fixture
        .env
        .stores
        .artifacts
        .read_document(1, 2)
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_reupload_keeps_registration() {
    let fixture = TestFixture::new();
    let upload = json!({"documents": [{"document_id": 1, "text": "alpha"}]});
    fixture.post("/api/v1/projects/1/documents", upload.clone()).await;

    let response = fixture.post("/api/v1/projects/1/documents", upload).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["stored"], 1);
    assert_eq!(response.body["registered"], 0);
}

#[tokio::test]
async fn test_corpus_write_errors() {
    let fixture = TestFixture::new();

    // Empty and invalid uploads
    let response = fixture
        .post("/api/v1/projects/1/documents", json!({"documents": []}))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let response = fixture
        .post(
            "/api/v1/projects/1/documents",
            json!({"documents": [{"document_id": -3, "text": "x"}]}),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);

    // Duplicate field name in a project
    let created = fixture
        .post("/api/v1/projects/1/fields", json!({"name": "topic"}))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let response = fixture
        .post("/api/v1/projects/1/fields", json!({"name": "topic"}))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    // Repeated class names are rejected before anything is created
    let response = fixture
        .post(
            "/api/v1/projects/1/fields",
            json!({"name": "tone", "classes": ["calm", "calm"]}),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let response = fixture.get("/api/v1/projects/1/fields").await;
    assert_eq!(response.body["fields"].as_array().unwrap().len(), 1);

    // Classes on an unknown field
    let response = fixture
        .post("/api/v1/fields/999/classes", json!({"name": "x"}))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    // A label must use a class of its own field
    let field_id = created.body["field"]["field_id"].as_i64().unwrap();
    let other = fixture
        .post(
            "/api/v1/projects/1/fields",
            json!({"name": "lang", "classes": ["en"]}),
        )
        .await;
    let foreign = other.body["classes"][0]["class_id"].as_i64().unwrap();
    let response = fixture
        .put(
            &format!("/api/v1/fields/{}/labels/1", field_id),
            json!({"class_id": foreign}),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}
