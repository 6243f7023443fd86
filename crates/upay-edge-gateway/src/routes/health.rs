use actix_web::{web, HttpRequest, HttpResponse};

use crate::metrics;
use crate::state::AppState;

const GREETING: &str = "Hello World!";

/// GET /hello, and the fallback for any unmatched path
pub async fn hello() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(GREETING)
}

/// GET /health - Liveness plus the active rate limit backend
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let limiter = state.gateway.limiter();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "upay-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "rateLimiter": {
            "backend": limiter.backend(),
            "maxAttempts": limiter.policy().max_attempts,
            "windowSecs": limiter.policy().window.as_secs(),
        },
    }))
}

/// GET /metrics - Prometheus metrics, bearer-token gated
pub async fn metrics(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match state.config.metrics_token {
        Some(ref expected) => {
            let authorized = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|token| upay::security::constant_time_eq(token.as_bytes(), expected.as_bytes()))
                .unwrap_or(false);

            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None if !state.config.public_metrics => {
            return HttpResponse::Forbidden().json(serde_json::json!({
                "error": "forbidden",
                "message": "Set METRICS_TOKEN or UPAY_PUBLIC_METRICS=true to access /metrics"
            }));
        }
        None => {}
    }

    match metrics::metrics_output() {
        Ok(output) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(output),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            HttpResponse::InternalServerError().body("Failed to encode metrics")
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/hello", web::get().to(hello))
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics));
}
