//! HTTP surface tests, driven in-process with `tower::ServiceExt::oneshot`.

mod fixtures;
mod helpers;

use std::sync::Arc;

use axum::http::StatusCode;
use tower::ServiceExt;

use cheque_extract::services::store::JobStore;
use cheque_extract::services::worker::Worker;
use fixtures::PAYEE_AND_ACCOUNT;
use helpers::*;

#[tokio::test]
async fn submit_rejects_bytes_that_are_not_an_image() {
    let store = memory_store();
    let app = test_app(store.clone(), None);

    let request = extract_request(
        &[FormPart::File {
            name: "file",
            filename: "cheque.png",
            bytes: b"0123456789",
        }],
        None,
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_input");
    assert_eq!(store.queue_depth().await.unwrap(), 0);
}

#[tokio::test]
async fn submit_rejects_unsupported_extension() {
    let store = memory_store();
    let app = test_app(store.clone(), None);
    let png = cheque_png(&PAYEE_AND_ACCOUNT);

    let request = extract_request(
        &[FormPart::File {
            name: "file",
            filename: "cheque.pdf",
            bytes: &png,
        }],
        None,
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.queue_depth().await.unwrap(), 0);
}

#[tokio::test]
async fn submit_requires_a_file_field() {
    let app = test_app(memory_store(), None);

    let request = extract_request(
        &[FormPart::Text {
            name: "perform_recognition",
            value: "true",
        }],
        None,
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submit_rejects_a_malformed_flag() {
    let app = test_app(memory_store(), None);
    let png = cheque_png(&PAYEE_AND_ACCOUNT);

    let request = extract_request(
        &[
            FormPart::File {
                name: "file",
                filename: "cheque.png",
                bytes: &png,
            },
            FormPart::Text {
                name: "perform_recognition",
                value: "maybe",
            },
        ],
        None,
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submit_accepts_an_image_and_reports_pending() {
    let store = memory_store();
    let app = test_app(store.clone(), None);
    let png = cheque_png(&PAYEE_AND_ACCOUNT);

    let request = extract_request(
        &[
            FormPart::File {
                name: "file",
                filename: "cheque.png",
                bytes: &png,
            },
            FormPart::Text {
                name: "perform_recognition",
                value: "true",
            },
        ],
        None,
    );
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    let job_id = body["job_id"].as_str().expect("job_id is a string").to_string();
    assert_eq!(store.queue_depth().await.unwrap(), 1);

    let response = app
        .oneshot(get_request(&format!("/api/v1/result/{job_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({"status": "pending"}));
}

#[tokio::test]
async fn legacy_field_names_are_accepted() {
    let store = memory_store();
    let app = test_app(store.clone(), None);
    let png = cheque_png(&PAYEE_AND_ACCOUNT);

    let request = extract_request(
        &[
            FormPart::File {
                name: "image",
                filename: "cheque.png",
                bytes: &png,
            },
            FormPart::Text {
                name: "perform_ocr",
                value: "1",
            },
        ],
        None,
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let delivery = store.dequeue().await.unwrap();
    assert!(delivery.options.perform_recognition);
    assert_eq!(delivery.input, png);
}

#[tokio::test]
async fn polling_an_unissued_id_is_unknown() {
    let app = test_app(memory_store(), None);

    let response = app
        .oneshot(get_request(&format!("/api/v1/result/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, serde_json::json!({"status": "unknown"}));
}

#[tokio::test]
async fn polling_a_malformed_id_is_unknown() {
    let app = test_app(memory_store(), None);

    let response = app
        .oneshot(get_request("/api/v1/result/not-a-job-id"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["status"], "unknown");
}

#[tokio::test]
async fn completed_job_is_served_to_pollers() {
    let store = memory_store();
    let app = test_app(store.clone(), None);
    let png = cheque_png(&PAYEE_AND_ACCOUNT);

    let request = extract_request(
        &[
            FormPart::File {
                name: "file",
                filename: "cheque.png",
                bytes: &png,
            },
            FormPart::Text {
                name: "perform_recognition",
                value: "true",
            },
        ],
        None,
    );
    let response = app.clone().oneshot(request).await.unwrap();
    let job_id = body_json(response).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let (pipeline, _) = fake_pipeline(&PAYEE_AND_ACCOUNT);
    let worker = Worker::new(0, store.clone(), pipeline);
    worker.process_next().await.unwrap();

    let response = app
        .oneshot(get_request(&format!("/api/v1/result/{job_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["recognized_text"], PAYEE_AND_ACCOUNT.expected_digits);
    let objects = body["data"]["detected_objects"].as_object().unwrap();
    assert_eq!(objects.len(), 2);
    let payee_confidence = objects["payee"]["confidence"].as_f64().unwrap();
    assert!((payee_confidence - 0.92).abs() < 1e-6);
    assert!(objects["account"]["cropped_image"].is_string());
    assert!(body["data"]["labeled_image"].is_string());
}

#[tokio::test]
async fn api_key_guards_the_api_but_not_health() {
    let store = memory_store();
    let app = test_app(store.clone(), Some("s3cret"));
    let png = cheque_png(&PAYEE_AND_ACCOUNT);
    let parts = [FormPart::File {
        name: "file",
        filename: "cheque.png",
        bytes: &png,
    }];

    let response = app
        .clone()
        .oneshot(extract_request(&parts, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "unauthorized");

    let response = app
        .clone()
        .oneshot(extract_request(&parts, Some("wrong")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(extract_request(&parts, Some("s3cret")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_reports_store_status_and_depth() {
    let store = memory_store();
    store
        .enqueue(cheque_png(&PAYEE_AND_ACCOUNT), Default::default())
        .await
        .unwrap();
    let app = test_app(store, None);

    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["store"]["status"], "ok");
    assert_eq!(body["checks"]["store"]["queue_depth"], 1);
}

#[tokio::test]
async fn unreachable_store_surfaces_as_store_unavailable() {
    let app = test_app(Arc::new(FailingStore), None);
    let png = cheque_png(&PAYEE_AND_ACCOUNT);

    let response = app
        .clone()
        .oneshot(extract_request(
            &[FormPart::File {
                name: "file",
                filename: "cheque.png",
                bytes: &png,
            }],
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"], "store_unavailable");

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/v1/result/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "degraded");
}
