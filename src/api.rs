use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::confirm::{PendingPayment, PendingPaymentLog};
use crate::controller::QrController;
use crate::countdown::seconds_remaining;
use crate::error::QrError;
use crate::types::{iso_millis, GenerateReq, GenerateRes, PaymentIntent, ScanReq, SlotStatusRes};

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<QrController>,
    pub payments: Arc<PendingPaymentLog>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/qr/generate", post(generate))
        .route("/api/qr/slots/:id", get(slot_status).delete(close_slot))
        .route("/api/qr/scan", post(scan))
        .route("/api/qr/confirm", post(confirm))
        .route("/api/payments/pending", get(list_pending))
        .with_state(state)
}

// ---------- API HANDLERS ---------- //

async fn generate(
    State(app): State<AppState>,
    Json(req): Json<GenerateReq>,
) -> Result<Json<GenerateRes>, QrError> {
    let slot_id = req.slot_id.unwrap_or_else(Uuid::new_v4);
    let code = app.controller.generate(slot_id, &req.params)?;
    Ok(Json(GenerateRes {
        slot_id,
        display_string: code.display_string,
        expires_at: iso_millis::format(&code.expires_at),
        seconds_remaining: seconds_remaining(code.expires_at, app.controller.clock().now()),
    }))
}

async fn slot_status(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SlotStatusRes>, QrError> {
    let status = app.controller.slot_status(id)?;
    Ok(Json(SlotStatusRes {
        slot_id: id,
        state: status.state.label(),
        seconds_remaining: status.seconds_remaining,
        label: status.label,
        low_time: status.low_time,
        expires_at: iso_millis::format(&status.expires_at),
    }))
}

async fn close_slot(State(app): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, QrError> {
    app.controller.close(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn scan(State(app): State<AppState>, Json(req): Json<ScanReq>) -> Result<Json<PaymentIntent>, QrError> {
    Ok(Json(app.controller.consume_scan(&req.raw, req.source)?))
}

async fn confirm(
    State(app): State<AppState>,
    Json(req): Json<ScanReq>,
) -> Result<Json<PendingPayment>, QrError> {
    Ok(Json(app.controller.consume_and_confirm(&req.raw, req.source)?))
}

async fn list_pending(State(app): State<AppState>) -> Json<Vec<PendingPayment>> {
    Json(app.payments.list())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::codec::PayloadCodec;
    use crate::signature::{HmacSigner, SignatureService};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 18, 10, 0, 0).unwrap()));
        let payments = Arc::new(PendingPaymentLog::new(clock.clone()));
        let controller = Arc::new(QrController::new(
            PayloadCodec::default(),
            SignatureService::new(Arc::new(HmacSigner::new(b"api-secret".to_vec()).unwrap())),
            clock.clone(),
            payments.clone(),
        ));
        let state = AppState { controller, payments };
        (router(state), clock)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(b) => {
                req = req.header("content-type", "application/json");
                Body::from(b.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    #[tokio::test]
    async fn generate_show_and_scan() {
        let (app, _) = app();
        let (status, issued) = call(
            &app,
            "POST",
            "/api/qr/generate",
            Some(json!({"walletId": "WAL001", "amount": 1000, "currency": "USD", "ttlSeconds": 300})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(issued["secondsRemaining"], 300);
        assert_eq!(issued["expiresAt"], "2026-10-18T10:05:00.000Z");

        let slot = issued["slotId"].as_str().unwrap().to_string();
        let (status, shown) = call(&app, "GET", &format!("/api/qr/slots/{slot}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(shown["state"], "active");
        assert_eq!(shown["label"], "5:00");
        assert_eq!(shown["lowTime"], false);

        let raw = issued["displayString"].clone();
        let (status, intent) = call(&app, "POST", "/api/qr/scan", Some(json!({"raw": raw, "source": "camera"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(intent["walletId"], "WAL001");
        assert_eq!(intent["amount"], 1000);
    }

    #[tokio::test]
    async fn errors_carry_distinct_codes() {
        let (app, clock) = app();
        let (_, issued) = call(&app, "POST", "/api/qr/generate", Some(json!({"walletId": "WAL001"}))).await;
        let raw = issued["displayString"].as_str().unwrap().to_string();

        let (status, body) = call(&app, "POST", "/api/qr/scan", Some(json!({"raw": "neowallet://pay?v=1", "source": "upload"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "malformed_payload");

        let codec = PayloadCodec::default();
        let mut payload = codec.parse(&raw).unwrap();
        payload.wallet_id = "WAL999".into();
        let forged = codec.serialize(&payload).unwrap();
        let (status, body) = call(&app, "POST", "/api/qr/scan", Some(json!({"raw": forged, "source": "camera"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "tampered_or_invalid_signature");

        clock.advance(Duration::seconds(301));
        let (status, body) = call(&app, "POST", "/api/qr/scan", Some(json!({"raw": raw, "source": "camera"}))).await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["error"], "expired");

        let (status, body) = call(&app, "POST", "/api/qr/generate", Some(json!({"walletId": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_input");
    }

    #[tokio::test]
    async fn closing_a_slot() {
        let (app, _) = app();
        let (_, issued) = call(&app, "POST", "/api/qr/generate", Some(json!({"walletId": "WAL001"}))).await;
        let uri = format!("/api/qr/slots/{}", issued["slotId"].as_str().unwrap());

        let (status, _) = call(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = call(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "unknown_slot");
    }

    #[tokio::test]
    async fn confirm_records_pending_payment() {
        let (app, _) = app();
        let (_, issued) = call(
            &app,
            "POST",
            "/api/qr/generate",
            Some(json!({"walletId": "WAL002", "amount": 12.5, "note": "coffee"})),
        )
        .await;
        let raw = issued["displayString"].clone();
        let (status, pending) = call(&app, "POST", "/api/qr/confirm", Some(json!({"raw": raw, "source": "upload"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending["walletId"], "WAL002");
        assert_eq!(pending["note"], "coffee");

        let (_, list) = call(&app, "GET", "/api/payments/pending", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["amount"], 12.5);
    }
}
