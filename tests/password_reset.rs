//! Integration tests for the forgot-password flow.
//!
//! A teacher proves who they are with email plus TOTVS number and gets a
//! single-use token back.

mod common;

use common::*;
use serde_json::{json, Value};
use serial_test::serial;

async fn request_token(app: &TestApp, teacher: &TestTeacher) -> String {
    let response = app
        .post_public(
            "/auth/forgot-password",
            json!({ "email": teacher.email, "totvs_number": teacher.totvs_number }),
        )
        .await;
    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    body["reset_token"].as_str().unwrap().to_string()
}

#[tokio::test]
#[serial]
async fn test_forgot_password_returns_token() {
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;

    let response = app
        .post_public(
            "/auth/forgot-password",
            json!({ "email": teacher.email, "totvs_number": teacher.totvs_number }),
        )
        .await;

    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["reset_token"].as_str().unwrap().len(), 64);
    assert!(body["expires_at"].as_str().is_some());
    assert_eq!(
        app.count_outbox_events("auth.password.reset_requested", teacher.id),
        1
    );
}

#[tokio::test]
#[serial]
async fn test_forgot_password_rejects_mismatched_identity() {
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let other = app.register_teacher(&[UNIT]).await;

    let response = app
        .post_public(
            "/auth/forgot-password",
            json!({ "email": teacher.email, "totvs_number": other.totvs_number }),
        )
        .await;

    assert_status!(response, 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "IDENTITY_MISMATCH");
}

#[tokio::test]
#[serial]
async fn test_forgot_password_requires_both_fields() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/auth/forgot-password",
            json!({ "email": "", "totvs_number": "123" }),
        )
        .await;

    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn test_reset_password_with_valid_token() {
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let token = request_token(&app, &teacher).await;

    let response = app
        .post_public(
            "/auth/reset-password",
            json!({ "token": token, "password": "redefinida123" }),
        )
        .await;

    assert_status!(response, 200);
    assert_status!(app.login(&teacher.totvs_number, PASSWORD).await, 401);
    assert_status!(app.login(&teacher.totvs_number, "redefinida123").await, 200);
}

#[tokio::test]
#[serial]
async fn test_reset_password_with_invalid_token() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/auth/reset-password",
            json!({ "token": "0".repeat(64), "password": "redefinida123" }),
        )
        .await;

    assert_status!(response, 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_RESET_TOKEN");
}

#[tokio::test]
#[serial]
async fn test_reset_token_can_only_be_used_once() {
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let token = request_token(&app, &teacher).await;
    let first = app
        .post_public(
            "/auth/reset-password",
            json!({ "token": token, "password": "redefinida123" }),
        )
        .await;
    assert_status!(first, 200);

    let second = app
        .post_public(
            "/auth/reset-password",
            json!({ "token": token, "password": "outraSenha456" }),
        )
        .await;

    assert_status!(second, 400);
}

#[tokio::test]
#[serial]
async fn test_new_reset_request_invalidates_old_token() {
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let old = request_token(&app, &teacher).await;
    let new = request_token(&app, &teacher).await;

    let stale = app
        .post_public(
            "/auth/reset-password",
            json!({ "token": old, "password": "redefinida123" }),
        )
        .await;
    let fresh = app
        .post_public(
            "/auth/reset-password",
            json!({ "token": new, "password": "redefinida123" }),
        )
        .await;

    assert_status!(stale, 400);
    assert_status!(fresh, 200);
}

#[tokio::test]
#[serial]
async fn test_reset_password_rejects_short_password() {
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let token = request_token(&app, &teacher).await;

    let response = app
        .post_public(
            "/auth/reset-password",
            json!({ "token": token, "password": "curta" }),
        )
        .await;

    assert_status!(response, 400);
}
