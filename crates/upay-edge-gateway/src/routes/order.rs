use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde_json::{Map, Value};

use crate::error::GatewayError;
use crate::metrics;
use crate::state::AppState;

/// Client identity from the configured address header, if present and readable.
fn client_identity<'a>(req: &'a HttpRequest, header_name: &str) -> Option<&'a str> {
    req.headers()
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
}

/// * /create-order - Create an order at the processor and redirect the payer to it
pub async fn create_order(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let identity = client_identity(&req, &state.config.client_ip_header);
    let oid = state.gateway.new_order_id();

    let redirect_url = state
        .gateway
        .create_order(
            identity,
            &oid,
            &state.config.order_user_id,
            state.config.order_amount,
        )
        .await?;

    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, redirect_url))
        .finish())
}

/// * /notify - Verify a payment notification posted by the processor
pub async fn notify(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, GatewayError> {
    let payload: Map<String, Value> = serde_json::from_slice(&body).map_err(|e| {
        metrics::NOTIFICATIONS_TOTAL
            .with_label_values(&["malformed"])
            .inc();
        tracing::warn!(error = %e, "notification body is not a JSON object");
        GatewayError::MalformedNotification(e.to_string())
    })?;

    let accepted = state.gateway.handle_notification(payload)?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(if accepted { "success" } else { "failed" }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/create-order", web::route().to(create_order))
        .route("/notify", web::route().to(notify));
}
