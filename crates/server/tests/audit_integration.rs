//! Audit trail integration tests.
//!
//! Events are written by a background task, so every assertion polls the
//! audit endpoint until the expected event shows up.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{fixtures, TestFixture};

fn submission(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "subject": fixtures::INVOICE_SUBJECT,
        "text": fixtures::INVOICE_TEXT
    })
}

#[tokio::test]
async fn test_job_lifecycle_audited() {
    let fixture = TestFixture::new().await;
    let job = fixture.classify(submission("t-1")).await;

    let received = fixture
        .wait_for_audit("ticket_id=t-1", "ticket_received")
        .await;
    assert_eq!(received["events"][0]["data"]["new_ticket"], true);
    assert_eq!(received["events"][0]["data"]["language"], "en");

    let created = fixture.wait_for_audit("ticket_id=t-1", "job_created").await;
    assert_eq!(created["events"][0]["job_id"], job.id.as_str());
    assert_eq!(created["events"][0]["data"]["trigger"], "submission");

    let indexed = fixture
        .wait_for_audit(&format!("job_id={}", job.id), "ticket_indexed")
        .await;
    assert_eq!(indexed["events"][0]["data"]["backend"], "memory");

    // One record per settled attempt, all for this job
    let attempts = fixture
        .wait_for_audit(&format!("job_id={}", job.id), "step_attempt_finished")
        .await;
    for event in attempts["events"].as_array().unwrap() {
        assert_eq!(event["ticket_id"], "t-1");
        assert_eq!(event["event_type"], "step_attempt_finished");
    }
}

#[tokio::test]
async fn test_duplicate_rejection_audited() {
    let fixture = TestFixture::gated().await;

    let first = fixture.post("/api/v1/tickets", submission("t-1")).await;
    let job_id = first.body["job"]["id"].as_str().unwrap().to_string();
    let second = fixture.post("/api/v1/tickets", submission("t-1")).await;
    assert_status!(second, StatusCode::CONFLICT);

    let rejected = fixture
        .wait_for_audit("ticket_id=t-1", "duplicate_submission_rejected")
        .await;
    assert_eq!(rejected["events"][0]["data"]["active_job_id"], job_id.as_str());

    fixture.release(1);
    fixture.wait_for_terminal(&job_id).await;
}

#[tokio::test]
async fn test_cancel_request_audited() {
    let fixture = TestFixture::gated().await;

    let submitted = fixture.post("/api/v1/tickets", submission("t-1")).await;
    let job_id = submitted.body["job"]["id"].as_str().unwrap().to_string();

    let response = fixture.delete(&format!("/api/v1/jobs/{}", job_id)).await;
    assert_status!(response, StatusCode::OK);

    let requested = fixture
        .wait_for_audit(&format!("job_id={}", job_id), "job_cancel_requested")
        .await;
    assert_eq!(requested["events"][0]["ticket_id"], "t-1");

    fixture.release(1);
    fixture.wait_for_terminal(&job_id).await;
}

#[tokio::test]
async fn test_search_audited() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/search", json!({ "query": "refund for my invoice", "top_k": 3 }))
        .await;
    assert_status!(response, StatusCode::OK);

    let searched = fixture.wait_for_audit("", "semantic_search_executed").await;
    let data = &searched["events"][0]["data"];
    assert_eq!(data["type"], "semantic_search_executed");
    assert_eq!(data["query"], "refund for my invoice");
    assert_eq!(data["top_k"], 3);
    assert_eq!(data["results_count"], 0);
}

#[tokio::test]
async fn test_audit_pagination_and_filters() {
    let fixture = TestFixture::new().await;
    fixture.classify(submission("t-1")).await;
    fixture.classify(submission("t-2")).await;

    fixture.wait_for_audit("ticket_id=t-2", "job_created").await;

    let page = fixture.get("/api/v1/audit?limit=2").await;
    assert_status!(page, StatusCode::OK);
    assert_eq!(page.body["limit"], 2);
    assert_eq!(page.body["events"].as_array().unwrap().len(), 2);
    assert!(page.body["total"].as_i64().unwrap() > 2);

    let t1 = fixture.get("/api/v1/audit?ticket_id=t-1&limit=1000").await;
    for event in t1.body["events"].as_array().unwrap() {
        assert_eq!(event["ticket_id"], "t-1");
    }

    let none = fixture.get("/api/v1/audit?ticket_id=nope").await;
    assert_eq!(none.body["total"], 0);

    let future = fixture.get("/api/v1/audit?from=2999-01-01T00:00:00Z").await;
    assert_status!(future, StatusCode::OK);
    assert_eq!(future.body["total"], 0);
}

#[tokio::test]
async fn test_audit_rejects_inverted_time_range() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .get("/api/v1/audit?from=2030-01-01T00:00:00Z&to=2020-01-01T00:00:00Z")
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}
