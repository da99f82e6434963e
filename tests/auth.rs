//! Authentication integration tests.
//!
//! Teacher sign-up, the three login identifiers, session endpoints and
//! password changes.

mod common;

use common::{TestApp, HEAD_OFFICE, OTHER_UNIT, PASSWORD, UNIT};
use serde_json::{json, Value};
use serial_test::serial;

fn registration(email: &str, totvs: &str) -> Value {
    json!({
        "full_name": "João Pereira",
        "totvs_number": totvs,
        "email": email,
        "password": PASSWORD,
        "confirm_password": PASSWORD,
        "units": [UNIT],
    })
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
#[serial]
async fn register_returns_teacher_profile_and_tokens() {
    // Arrange
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();
    let totvs = TestApp::unique_totvs();

    // Act
    let response = app
        .post_public("/auth/register", registration(&email, &totvs))
        .await;

    // Assert
    assert_status!(response, 200);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["profile"]["role"], "teacher");
    assert_eq!(body["profile"]["email"], email.as_str());
    assert_eq!(body["profile"]["totvs_number"], totvs.as_str());
    assert_eq!(body["profile"]["units"], json!([UNIT]));
    assert!(body["access_token"].as_str().is_some());
    assert!(body["refresh_token"].as_str().is_some());
}

#[tokio::test]
#[serial]
async fn register_rejects_email_outside_institutional_domain() {
    // Arrange
    let app = TestApp::spawn().await;
    let body = registration("maria@gmail.com", &TestApp::unique_totvs());

    // Act
    let response = app.post_public("/auth/register", body).await;

    // Assert
    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn register_rejects_mismatched_confirmation() {
    // Arrange
    let app = TestApp::spawn().await;
    let mut body = registration(&TestApp::unique_email(), &TestApp::unique_totvs());
    body["confirm_password"] = json!("outraSenha99");

    // Act
    let response = app.post_public("/auth/register", body).await;

    // Assert
    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn register_rejects_empty_unit_list() {
    // Arrange
    let app = TestApp::spawn().await;
    let mut body = registration(&TestApp::unique_email(), &TestApp::unique_totvs());
    body["units"] = json!([]);

    // Act
    let response = app.post_public("/auth/register", body).await;

    // Assert
    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn register_rejects_unknown_unit() {
    // Arrange
    let app = TestApp::spawn().await;
    let mut body = registration(&TestApp::unique_email(), &TestApp::unique_totvs());
    body["units"] = json!(["Objetivo Atlântida"]);

    // Act
    let response = app.post_public("/auth/register", body).await;

    // Assert
    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn register_returns_409_for_duplicate_email() {
    // Arrange
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;

    // Act
    let response = app
        .post_public(
            "/auth/register",
            registration(&teacher.email, &TestApp::unique_totvs()),
        )
        .await;

    // Assert
    assert_status!(response, 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "EMAIL_EXISTS");
}

#[tokio::test]
#[serial]
async fn register_returns_409_for_duplicate_totvs() {
    // Arrange
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;

    // Act
    let response = app
        .post_public(
            "/auth/register",
            registration(&TestApp::unique_email(), &teacher.totvs_number),
        )
        .await;

    // Assert
    assert_status!(response, 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "TOTVS_EXISTS");
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
#[serial]
async fn login_accepts_totvs_number() {
    // Arrange
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;

    // Act
    let response = app.login(&teacher.totvs_number, PASSWORD).await;

    // Assert
    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["profile"]["role"], "teacher");
    assert_eq!(body["profile"]["id"], teacher.id.to_string());
}

#[tokio::test]
#[serial]
async fn login_accepts_email_in_any_case() {
    // Arrange
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;

    // Act
    let response = app.login(&teacher.email.to_uppercase(), PASSWORD).await;

    // Assert
    assert_status!(response, 200);
}

#[tokio::test]
#[serial]
async fn login_accepts_admin_username() {
    // Arrange
    let app = TestApp::spawn().await;

    // Act
    let admin = app.create_admin(Some(HEAD_OFFICE)).await;
    let response = app.get("/auth/me", &admin.access_token).await;

    // Assert
    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["role"], "admin");
    assert_eq!(body["username"], admin.username.as_str());
    assert_eq!(body["is_super_admin"], true);
}

#[tokio::test]
#[serial]
async fn login_returns_401_for_wrong_password() {
    // Arrange
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;

    // Act
    let response = app.login(&teacher.totvs_number, "senhaErrada1").await;

    // Assert
    assert_status!(response, 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
#[serial]
async fn login_returns_401_for_unknown_identifier() {
    // Arrange
    let app = TestApp::spawn().await;

    // Act
    let response = app.login("000000000", PASSWORD).await;

    // Assert
    assert_status!(response, 401);
}

#[tokio::test]
#[serial]
async fn login_is_refused_for_disabled_teacher() {
    // Arrange
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let admin = app.create_admin(Some(UNIT)).await;
    let toggle = app
        .post(
            &format!("/admin/teachers/{}/toggle-active", teacher.id),
            &admin.access_token,
            json!({}),
        )
        .await;
    assert_status!(toggle, 200);

    // Act
    let response = app.login(&teacher.totvs_number, PASSWORD).await;

    // Assert
    assert_status!(response, 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "ACCOUNT_INACTIVE");
}

// ============================================================================
// Session endpoints
// ============================================================================

#[tokio::test]
#[serial]
async fn me_returns_401_without_token() {
    // Arrange
    let app = TestApp::spawn().await;

    // Act
    let response = app.get_public("/auth/me").await;

    // Assert
    assert_status!(response, 401);
}

#[tokio::test]
#[serial]
async fn me_lists_every_linked_unit() {
    // Arrange
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT, OTHER_UNIT]).await;

    // Act
    let response = app.get("/auth/me", &teacher.access_token).await;

    // Assert
    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["role"], "teacher");
    assert_eq!(body["units"], json!([UNIT, OTHER_UNIT]));
}

#[tokio::test]
#[serial]
async fn refresh_issues_new_token_pair() {
    // Arrange
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;

    // Act
    let response = app
        .post_public(
            "/auth/refresh",
            json!({ "refresh_token": teacher.refresh_token }),
        )
        .await;

    // Assert
    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["access_token"].as_str().is_some());
    assert_ne!(body["refresh_token"], teacher.refresh_token.as_str());
}

#[tokio::test]
#[serial]
async fn refresh_token_cannot_be_reused() {
    // Arrange
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let first = app
        .post_public(
            "/auth/refresh",
            json!({ "refresh_token": teacher.refresh_token }),
        )
        .await;
    assert_status!(first, 200);

    // Act
    let second = app
        .post_public(
            "/auth/refresh",
            json!({ "refresh_token": teacher.refresh_token }),
        )
        .await;

    // Assert
    assert_status!(second, 401);
}

#[tokio::test]
#[serial]
async fn change_password_requires_current_password() {
    // Arrange
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;

    // Act
    let response = app
        .post(
            "/auth/change-password",
            &teacher.access_token,
            json!({ "current_password": "naoEhEssa1", "new_password": "novaSenha123" }),
        )
        .await;

    // Assert
    assert_status!(response, 401);
}

#[tokio::test]
#[serial]
async fn change_password_lets_teacher_log_in_with_new_password() {
    // Arrange
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;

    // Act
    let response = app
        .post(
            "/auth/change-password",
            &teacher.access_token,
            json!({ "current_password": PASSWORD, "new_password": "novaSenha123" }),
        )
        .await;

    // Assert
    assert_status!(response, 200);
    assert_status!(app.login(&teacher.totvs_number, PASSWORD).await, 401);
    assert_status!(app.login(&teacher.totvs_number, "novaSenha123").await, 200);
}
