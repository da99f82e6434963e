//! Equipment booking integration tests: availability, confirmation with a
//! signed term, conflicts, cancellation and the admin side.

mod common;

use common::{booking_body, future_weekday, TestApp, OTHER_UNIT, UNIT};
use serde_json::{json, Value};
use serial_test::serial;
use uuid::Uuid;

#[tokio::test]
#[serial]
async fn create_booking_returns_signed_term() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let projector = app.create_equipment(&admin, "Projetor", 3).await;
    let date = future_weekday();

    // Act
    let response = app
        .post(
            "/bookings",
            &teacher.access_token,
            booking_body(date, json!([{ "equipment_id": projector, "quantity": 2 }])),
        )
        .await;

    // Assert
    assert_status!(response, 201);
    let body: Value = response.json().await.unwrap();
    let rows = body["bookings"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["quantity"], 2);
    assert_eq!(rows[0]["status"], "active");
    assert_eq!(rows[0]["term_signed"], true);
    assert_eq!(body["term_document"]["user_totvs"], teacher.totvs_number.as_str());
    assert_eq!(body["term_hash"].as_str().unwrap().len(), 64);
    assert_eq!(body["display_id"].as_str().unwrap().len(), 6);
    assert!(body["verification_token"].as_str().is_some());
}

#[tokio::test]
#[serial]
async fn create_booking_emits_outbox_event() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let notebook = app.create_equipment(&admin, "Notebook", 1).await;

    // Act
    let response = app
        .post(
            "/bookings",
            &teacher.access_token,
            booking_body(
                future_weekday(),
                json!([{ "equipment_id": notebook, "quantity": 1 }]),
            ),
        )
        .await;

    // Assert
    assert_status!(response, 201);
    let body: Value = response.json().await.unwrap();
    let id: Uuid = body["bookings"][0]["id"].as_str().unwrap().parse().unwrap();
    assert_eq!(app.count_outbox_events("booking.created", id), 1);
}

#[tokio::test]
#[serial]
async fn availability_subtracts_overlapping_bookings() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let projector = app.create_equipment(&admin, "Projetor", 3).await;
    let date = future_weekday();
    let created = app
        .post(
            "/bookings",
            &teacher.access_token,
            booking_body(date, json!([{ "equipment_id": projector, "quantity": 2 }])),
        )
        .await;
    assert_status!(created, 201);

    // Act
    let overlapping = app
        .get(
            &format!(
                "/equipment/availability?unit={UNIT}&date={date}&start_time=11:00&end_time=12:00"
            ),
            &teacher.access_token,
        )
        .await;
    let adjacent = app
        .get(
            &format!(
                "/equipment/availability?unit={UNIT}&date={date}&start_time=11:40&end_time=12:30"
            ),
            &teacher.access_token,
        )
        .await;

    // Assert
    assert_status!(overlapping, 200);
    assert_status!(adjacent, 200);
    let find = |list: Value| {
        list.as_array()
            .unwrap()
            .iter()
            .find(|e| e["id"] == projector.to_string())
            .map(|e| e["available_quantity"].as_i64().unwrap())
            .unwrap()
    };
    assert_eq!(find(overlapping.json().await.unwrap()), 1);
    assert_eq!(find(adjacent.json().await.unwrap()), 3);
}

#[tokio::test]
#[serial]
async fn create_booking_returns_409_when_stock_is_taken() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;
    let first = app.register_teacher(&[UNIT]).await;
    let second = app.register_teacher(&[UNIT]).await;
    let speaker = app.create_equipment(&admin, "Caixa de Som", 1).await;
    let date = future_weekday();
    let lines = json!([{ "equipment_id": speaker, "quantity": 1 }]);
    let taken = app
        .post("/bookings", &first.access_token, booking_body(date, lines.clone()))
        .await;
    assert_status!(taken, 201);

    // Act
    let response = app
        .post("/bookings", &second.access_token, booking_body(date, lines))
        .await;

    // Assert
    assert_status!(response, 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "EQUIPMENT_UNAVAILABLE");
}

#[tokio::test]
#[serial]
async fn create_booking_requires_accepted_term() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let projector = app.create_equipment(&admin, "Projetor", 1).await;
    let mut body = booking_body(
        future_weekday(),
        json!([{ "equipment_id": projector, "quantity": 1 }]),
    );
    body["term_accepted"] = json!(false);

    // Act
    let response = app.post("/bookings", &teacher.access_token, body).await;

    // Assert
    assert_status!(response, 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "TERM_NOT_ACCEPTED");
}

#[tokio::test]
#[serial]
async fn create_booking_rejects_unit_the_teacher_is_not_linked_to() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;
    let teacher = app.register_teacher(&[OTHER_UNIT]).await;
    let projector = app.create_equipment(&admin, "Projetor", 1).await;

    // Act
    let response = app
        .post(
            "/bookings",
            &teacher.access_token,
            booking_body(
                future_weekday(),
                json!([{ "equipment_id": projector, "quantity": 1 }]),
            ),
        )
        .await;

    // Assert
    assert_status!(response, 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "UNIT_NOT_LINKED");
}

#[tokio::test]
#[serial]
async fn create_booking_enforces_minimum_advance_time() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let projector = app.create_equipment(&admin, "Projetor", 1).await;
    app.save_settings(
        &admin,
        json!({ "min_advance_time_enabled": true, "min_advance_time_hours": 720 }),
    )
    .await;

    // Act
    let response = app
        .post(
            "/bookings",
            &teacher.access_token,
            booking_body(
                future_weekday(),
                json!([{ "equipment_id": projector, "quantity": 1 }]),
            ),
        )
        .await;

    // Assert
    assert_status!(response, 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "MIN_ADVANCE_TIME");

    app.save_settings(&admin, json!({})).await;
}

#[tokio::test]
#[serial]
async fn recurring_booking_requires_authorization() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let projector = app.create_equipment(&admin, "Projetor", 1).await;

    // Act
    let response = app
        .post(
            "/bookings",
            &teacher.access_token,
            json!({
                "unit": UNIT,
                "local": "Sala 12",
                "is_recurring": true,
                "day_of_week": 2,
                "start_time": "07:30",
                "end_time": "09:10",
                "equipments": [{ "equipment_id": projector, "quantity": 1 }],
                "term_accepted": true,
            }),
        )
        .await;

    // Assert
    assert_status!(response, 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "RECURRING_NOT_AUTHORIZED");
}

#[tokio::test]
#[serial]
async fn cancelled_booking_leaves_teacher_list_and_frees_stock() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let projector = app.create_equipment(&admin, "Projetor", 1).await;
    let date = future_weekday();
    let lines = json!([{ "equipment_id": projector, "quantity": 1 }]);
    let created: Value = app
        .post("/bookings", &teacher.access_token, booking_body(date, lines.clone()))
        .await
        .json()
        .await
        .unwrap();
    let id = created["bookings"][0]["id"].as_str().unwrap();

    // Act
    let response = app
        .post(
            &format!("/bookings/{id}/cancel"),
            &teacher.access_token,
            json!({}),
        )
        .await;

    // Assert
    assert_status!(response, 204);
    let mine: Value = app
        .get("/bookings/mine", &teacher.access_token)
        .await
        .json()
        .await
        .unwrap();
    assert!(mine.as_array().unwrap().iter().all(|b| b["id"] != id));
    let again = app
        .post("/bookings", &teacher.access_token, booking_body(date, lines))
        .await;
    assert_status!(again, 201);
}

#[tokio::test]
#[serial]
async fn teacher_cannot_cancel_someone_elses_booking() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;
    let owner = app.register_teacher(&[UNIT]).await;
    let other = app.register_teacher(&[UNIT]).await;
    let projector = app.create_equipment(&admin, "Projetor", 1).await;
    let created: Value = app
        .post(
            "/bookings",
            &owner.access_token,
            booking_body(
                future_weekday(),
                json!([{ "equipment_id": projector, "quantity": 1 }]),
            ),
        )
        .await
        .json()
        .await
        .unwrap();
    let id = created["bookings"][0]["id"].as_str().unwrap();

    // Act
    let response = app
        .post(&format!("/bookings/{id}/cancel"), &other.access_token, json!({}))
        .await;

    // Assert
    assert_status!(response, 404);
}

#[tokio::test]
#[serial]
async fn teacher_routes_reject_admin_tokens() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;

    // Act
    let response = app.get("/bookings/mine", &admin.access_token).await;

    // Assert
    assert_status!(response, 403);
}

#[tokio::test]
#[serial]
async fn admin_routes_reject_teacher_tokens() {
    // Arrange
    let app = TestApp::spawn().await;
    let teacher = app.register_teacher(&[UNIT]).await;

    // Act
    let response = app.get("/admin/bookings", &teacher.access_token).await;

    // Assert
    assert_status!(response, 403);
}

#[tokio::test]
#[serial]
async fn admin_can_close_and_cancel_bookings_of_their_unit() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let projector = app.create_equipment(&admin, "Projetor", 2).await;
    let created: Value = app
        .post(
            "/bookings",
            &teacher.access_token,
            booking_body(
                future_weekday(),
                json!([{ "equipment_id": projector, "quantity": 1 }]),
            ),
        )
        .await
        .json()
        .await
        .unwrap();
    let id = created["bookings"][0]["id"].as_str().unwrap().to_string();

    // Act
    let closed = app
        .post(
            &format!("/admin/bookings/{id}/close"),
            &admin.access_token,
            json!({}),
        )
        .await;
    let deleted = app
        .post(
            "/admin/bookings/delete",
            &admin.access_token,
            json!({ "ids": [id] }),
        )
        .await;

    // Assert
    assert_status!(closed, 200);
    let closed: Value = closed.json().await.unwrap();
    assert_eq!(closed["status"], "encerrado");
    assert_status!(deleted, 200);
    let deleted: Value = deleted.json().await.unwrap();
    assert_eq!(deleted["cancelled"], 1);
    assert_eq!(app.count_audit_entries("DELETE_BOOKINGS", &id), 1);
}

#[tokio::test]
#[serial]
async fn admin_of_another_unit_cannot_close_booking() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;
    let outsider = app.create_admin(Some(OTHER_UNIT)).await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let projector = app.create_equipment(&admin, "Projetor", 1).await;
    let created: Value = app
        .post(
            "/bookings",
            &teacher.access_token,
            booking_body(
                future_weekday(),
                json!([{ "equipment_id": projector, "quantity": 1 }]),
            ),
        )
        .await
        .json()
        .await
        .unwrap();
    let id = created["bookings"][0]["id"].as_str().unwrap();

    // Act
    let response = app
        .post(
            &format!("/admin/bookings/{id}/close"),
            &outsider.access_token,
            json!({}),
        )
        .await;

    // Assert
    assert_status!(response, 404);
}

#[tokio::test]
#[serial]
async fn admin_list_searches_by_teacher_name() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let name = format!("Lousa {}", Uuid::new_v4().simple());
    let board = app.create_equipment(&admin, &name, 1).await;
    let created = app
        .post(
            "/bookings",
            &teacher.access_token,
            booking_body(
                future_weekday(),
                json!([{ "equipment_id": board, "quantity": 1 }]),
            ),
        )
        .await;
    assert_status!(created, 201);

    // Act
    let response = app
        .get(
            &format!("/admin/bookings?search={}", name.replace(' ', "%20")),
            &admin.access_token,
        )
        .await;

    // Assert
    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["equipment_name"], name.as_str());
    assert_eq!(data[0]["teacher_totvs"], teacher.totvs_number.as_str());
    assert_eq!(body["pagination"]["total_count"], 1);
}

#[tokio::test]
#[serial]
async fn verification_token_resolves_public_term() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.create_admin(Some(UNIT)).await;
    let teacher = app.register_teacher(&[UNIT]).await;
    let projector = app.create_equipment(&admin, "Projetor", 1).await;
    let created: Value = app
        .post(
            "/bookings",
            &teacher.access_token,
            booking_body(
                future_weekday(),
                json!([{ "equipment_id": projector, "quantity": 1 }]),
            ),
        )
        .await
        .json()
        .await
        .unwrap();
    let token = created["verification_token"].as_str().unwrap();

    // Act
    let valid = app.get_public(&format!("/verify/{token}")).await;
    let unknown = app.get_public("/verify/nao-existe").await;

    // Assert
    assert_status!(valid, 200);
    let body: Value = valid.json().await.unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["teacher_totvs"], teacher.totvs_number.as_str());
    assert_eq!(body["term_hash"], created["term_hash"]);
    assert_status!(unknown, 404);
    let body: Value = unknown.json().await.unwrap();
    assert_eq!(body, json!({ "valid": false }));
}
