//! Testes da API HTTP contra um banco SQLite temporário

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Duration;
use clinic_queue::permissions::ADMIN_ROLE;
use clinic_queue::{
    open_store, Action, Area, ClinicId, FrontDesk, Permissions, RoomPolicies, Session, StoreConfig,
};
use front_desk::{build_router, AppState, JwtIdentity};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tokio_test::assert_ok;
use tower::ServiceExt;

const SECRET: &[u8] = b"segredo-de-teste";

struct TestApp {
    _dir: TempDir,
    router: Router,
    identity: Arc<JwtIdentity>,
}

impl TestApp {
    async fn spawn() -> Self {
        let dir = assert_ok!(tempdir());
        let config = StoreConfig {
            db_path: dir.path().join("front-desk.db").to_string_lossy().to_string(),
            key_phrase: "frase de teste".to_string(),
            key_salt: "salt-de-teste".to_string(),
            max_connections: 2,
        };
        let store = assert_ok!(open_store(&config).await);
        let desk = FrontDesk::new(Arc::new(store), RoomPolicies::default());
        let state = AppState::new(desk, JwtIdentity::new(SECRET));

        Self {
            router: build_router(state.clone()),
            identity: state.identity.clone(),
            _dir: dir,
        }
    }

    fn token(&self, clinic: &str, role: &str, permissions: Permissions) -> String {
        let session = Session {
            user_id: format!("{}-user", role),
            clinic_id: ClinicId::from(clinic),
            role: role.to_string(),
            permissions,
        };
        assert_ok!(self.identity.issue(&session, Duration::minutes(10)))
    }

    fn admin(&self, clinic: &str) -> String {
        self.token(clinic, ADMIN_ROLE, Permissions::new())
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        let request = assert_ok!(request);

        let response = assert_ok!(self.router.clone().oneshot(request).await);
        let status = response.status();
        let bytes = assert_ok!(hyper::body::to_bytes(response.into_body()).await);
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            assert_ok!(serde_json::from_slice::<Value>(&bytes))
        };
        (status, value)
    }

    async fn walk_in(&self, token: &str, name: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/clinics/c1/walk-ins",
                Some(token),
                Some(json!({ "patient_name": name })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }
}

fn queue_ids(body: &Value) -> Vec<String> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::spawn().await;
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "front-desk");
}

#[tokio::test]
async fn requests_without_valid_token_are_rejected() {
    let app = TestApp::spawn().await;

    let (status, body) = app.call(Method::GET, "/clinics/c1/queue", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let forged = JwtIdentity::new(b"outro-segredo")
        .issue(
            &Session {
                user_id: "x".to_string(),
                clinic_id: ClinicId::from("c1"),
                role: ADMIN_ROLE.to_string(),
                permissions: Permissions::new(),
            },
            Duration::minutes(5),
        )
        .unwrap();
    let (status, _) = app
        .call(Method::GET, "/clinics/c1/queue", Some(&forged), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_is_bound_to_its_clinic() {
    let app = TestApp::spawn().await;
    let token = app.admin("c1");

    let (status, _) = app
        .call(Method::GET, "/clinics/c2/queue", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let id = app.walk_in(&token, "Ana").await;
    let other = app.admin("c2");
    let (status, _) = app
        .call(Method::POST, &format!("/appointments/{}/exam", id), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn visit_flow_with_exam_eviction() {
    let app = TestApp::spawn().await;
    let token = app.admin("c1");

    let ana = app.walk_in(&token, "Ana").await;
    let (status, body) = app
        .call(
            Method::POST,
            "/clinics/c1/appointments",
            Some(&token),
            Some(json!({ "patient_name": "Bruno", "payment_cents": 20000 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "booked");
    let bruno = body["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(Method::POST, &format!("/appointments/{}/check-in", bruno), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "applied");

    // Posição explícita vem antes do walk-in sem posição
    let (_, body) = app
        .call(Method::GET, "/clinics/c1/queue", Some(&token), None)
        .await;
    assert_eq!(queue_ids(&body), vec![bruno.clone(), ana.clone()]);

    let (status, _) = app
        .call(Method::POST, &format!("/appointments/{}/exam", bruno), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(Method::POST, &format!("/appointments/{}/exam", ana), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["evicted"], json!([bruno]));

    let (_, body) = app
        .call(Method::POST, &format!("/appointments/{}/complete", ana), Some(&token), None)
        .await;
    assert_eq!(body["outcome"], "applied");
    let (status, body) = app
        .call(Method::POST, &format!("/appointments/{}/complete", ana), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "unchanged");

    let (status, body) = app
        .call(Method::GET, "/clinics/c1/summary", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["by_status"]["completed"], 2);
    assert_eq!(body["walk_ins"], 1);
    assert_eq!(body["revenue_cents"], 20000);
}

#[tokio::test]
async fn invalid_payload_is_unprocessable() {
    let app = TestApp::spawn().await;
    let token = app.admin("c1");

    let (status, body) = app
        .call(
            Method::POST,
            "/clinics/c1/walk-ins",
            Some(&token),
            Some(json!({ "patient_name": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("patient_name"));
}

#[tokio::test]
async fn reorder_moves_and_rejects_out_of_range() {
    let app = TestApp::spawn().await;
    let token = app.admin("c1");
    let ana = app.walk_in(&token, "Ana").await;
    let bruno = app.walk_in(&token, "Bruno").await;

    let (status, _) = app
        .call(
            Method::POST,
            "/clinics/c1/queue/reorder",
            Some(&token),
            Some(json!({ "from_index": 5, "to_index": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .call(
            Method::POST,
            "/clinics/c1/queue/reorder",
            Some(&token),
            Some(json!({ "from_index": 1, "to_index": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue_ids(&body), vec![bruno.clone(), ana.clone()]);

    let (_, body) = app
        .call(Method::GET, "/clinics/c1/queue", Some(&token), None)
        .await;
    assert_eq!(queue_ids(&body), vec![bruno, ana]);
    assert_eq!(body[0]["queue_order"], 0);
    assert_eq!(body[1]["queue_order"], 1);
}

#[tokio::test]
async fn missing_permission_is_forbidden() {
    let app = TestApp::spawn().await;
    let receptionist = app.token(
        "c1",
        "receptionist",
        Permissions::new().grant(Area::Queue, &[Action::CheckIn]),
    );

    let id = app.walk_in(&receptionist, "Ana").await;
    let (status, body) = app
        .call(Method::POST, &format!("/appointments/{}/exam", id), Some(&receptionist), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("rooms/route"));

    let (status, _) = app
        .call(Method::GET, "/clinics/c1/queue", Some(&receptionist), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn resting_doctor_blocks_exam_entry() {
    let app = TestApp::spawn().await;
    let token = app.admin("c1");
    let id = app.walk_in(&token, "Ana").await;

    let (status, body) = app
        .call(
            Method::PUT,
            "/clinics/c1/settings",
            Some(&token),
            Some(json!({ "doctor": "resting", "assistant": "available", "booking_paused": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["doctor"], "resting");

    let (status, _) = app
        .call(Method::POST, &format!("/appointments/{}/exam", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app
        .call(Method::GET, "/clinics/c1/queue", Some(&token), None)
        .await;
    assert_eq!(body[0]["status"], "checked-in");
}

#[tokio::test]
async fn calling_pointer_follows_patient_status() {
    let app = TestApp::spawn().await;
    let token = app.admin("c1");
    let id = app.walk_in(&token, "Ana").await;

    let (status, _) = app
        .call(
            Method::PUT,
            "/clinics/c1/rooms/exam/calling",
            Some(&token),
            Some(json!({ "appointment_id": id })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .call(Method::GET, "/clinics/c1/rooms/exam/calling", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["room"], "exam");
    assert_eq!(body["appointment"]["id"], id.as_str());

    app.call(Method::POST, &format!("/appointments/{}/exam", id), Some(&token), None)
        .await;
    let (_, body) = app
        .call(Method::GET, "/clinics/c1/rooms/exam/calling", Some(&token), None)
        .await;
    assert!(body["appointment"].is_null());
}

#[tokio::test]
async fn details_patch_updates_fields_and_payment() {
    let app = TestApp::spawn().await;
    let token = app.admin("c1");
    let id = app.walk_in(&token, "Ana").await;

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/appointments/{}/details", id),
            Some(&token),
            Some(json!({ "diagnosis": "Sinusite", "payment_cents": 15000 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["patient_name"], "Ana");
    assert_eq!(body["details"]["diagnosis"], "Sinusite");
    assert_eq!(body["payment_cents"], 15000);

    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/appointments/{}/details", id),
            Some(&token),
            Some(json!({ "payment_cents": -5 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn moderator_shift_lifecycle() {
    let app = TestApp::spawn().await;
    let token = app.token(
        "c1",
        "moderator",
        Permissions::new().grant(Area::Moderators, &[Action::TrackShift]),
    );

    let (status, body) = app
        .call(Method::POST, "/clinics/c1/shifts/start", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["moderator_id"], "moderator-user");

    let (status, _) = app
        .call(Method::POST, "/clinics/c1/shifts/start", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .call(Method::POST, "/clinics/c1/shifts/end", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["ended_at"].is_number());

    let (status, body) = app
        .call(
            Method::GET,
            "/clinics/c1/shifts?moderator=moderator-user",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn queue_stream_opens_event_stream() {
    let app = TestApp::spawn().await;
    let token = app.admin("c1");

    let request = assert_ok!(Request::builder()
        .uri("/clinics/c1/queue/stream")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty()));
    let response = assert_ok!(app.router.clone().oneshot(request).await);

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(content_type.starts_with("text/event-stream"));
}
