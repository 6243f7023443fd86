use std::sync::Mutex;

use actix_web::{web, App, HttpResponse, HttpServer};
use serde_json::{json, Value};

use upay::order::{MerchantProfile, OrderCreationRequest};
use upay::sign::{verify, SignableMessage, SignedMessage};
use upay::{HttpOrderProcessor, OrderProcessor, UpstreamError};

const SECRET: &str = "shared-secret";

struct MockUpstream {
    reply: Value,
    received: Mutex<Vec<Value>>,
}

async fn order_endpoint(body: web::Json<Value>, mock: web::Data<MockUpstream>) -> HttpResponse {
    mock.received.lock().unwrap().push(body.into_inner());
    HttpResponse::Ok().json(&mock.reply)
}

/// Start a local processor stand-in on an ephemeral port.
fn spawn_upstream(reply: Value) -> (String, web::Data<MockUpstream>) {
    let mock = web::Data::new(MockUpstream {
        reply,
        received: Mutex::new(Vec::new()),
    });
    let app_mock = mock.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_mock.clone())
            .route("/api/v1/order", web::post().to(order_endpoint))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();
    let addr = server.addrs()[0];
    actix_rt::spawn(server.run());
    (format!("http://{addr}"), mock)
}

fn signed_order() -> OrderCreationRequest {
    let merchant = MerchantProfile {
        mch_id: "1".into(),
        memo: "testpayment".into(),
        notify_url: "https://edge.example/notify".into(),
        redirect_url: "https://shop.example/done".into(),
    };
    let mut order = OrderCreationRequest::new(&merchant, "TESTabc", "1", 1.23, 1_700_000_000_000);
    order.sign_with(SECRET);
    order
}

#[actix_rt::test]
async fn test_accepted_order_returns_upstream_id() {
    let (base, mock) = spawn_upstream(json!({"code": 1, "message": "ok", "data": {"id": "UP123"}}));
    let processor = HttpOrderProcessor::new(reqwest::Client::new(), base);

    let id = processor.create_order(&signed_order()).await.unwrap();
    assert_eq!(id, "UP123");

    let received = mock.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["oid"], "TESTabc");
    assert_eq!(received[0]["expiredAt"], 1_700_000_000_000i64 + 3_600_000);
}

#[actix_rt::test]
async fn test_wire_body_signature_verifies() {
    let (base, mock) = spawn_upstream(json!({"code": 1, "data": {"id": "UP1"}}));
    let processor = HttpOrderProcessor::new(reqwest::Client::new(), base);
    processor.create_order(&signed_order()).await.unwrap();

    let body = mock.received.lock().unwrap()[0].clone();
    let mut fields = SignableMessage::from_json_object(body.as_object().unwrap()).unwrap();
    let claimed = fields.remove_signature().expect("sign field on the wire");
    assert!(verify(&fields, &claimed, SECRET));
    assert!(!verify(&fields, &claimed, "not-the-secret"));
}

#[actix_rt::test]
async fn test_rejected_order() {
    let (base, _mock) = spawn_upstream(json!({"code": 0, "message": "invalid sign"}));
    let processor = HttpOrderProcessor::new(reqwest::Client::new(), base);

    let err = processor.create_order(&signed_order()).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Rejected { code: 0, .. }));
}

#[actix_rt::test]
async fn test_unreachable_upstream_is_transport_error() {
    let processor = HttpOrderProcessor::new(reqwest::Client::new(), "http://127.0.0.1:1");
    let err = processor.create_order(&signed_order()).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Transport(_)));
}
