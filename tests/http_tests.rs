mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use common::{signed_callback, Harness};
use conference_portal::db::{PaymentRole, PaymentStatus};
use conference_portal::routes::router;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn form_encode(pairs: &[(&str, &str)]) -> String {
    reqwest::Url::parse_with_params("http://form.test/", pairs)
        .unwrap()
        .query()
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new().await;
    let response = router(h.state.clone())
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["env"], "test");
}

#[tokio::test]
async fn test_create_payment_and_callback_redirect() {
    let h = Harness::new().await;
    h.add_user("U1", PaymentRole::Attendee, "").await;
    let app = router(h.state.clone());

    let response = app
        .clone()
        .oneshot(post_json(
            "/create-payment",
            json!({ "uid": "U1", "frontendUrl": "https://frontend.test" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["paymentRequired"], true);
    let txnid = body["txnid"].as_str().unwrap().to_string();

    let tx = h.stores.payments.get(&txnid).await.unwrap().unwrap();
    let callback = signed_callback(&tx, "success");
    let form = form_encode(&[
        ("status", callback.status.as_str()),
        ("email", callback.email.as_str()),
        ("firstname", callback.firstname.as_str()),
        ("productinfo", callback.productinfo.as_str()),
        ("amount", callback.amount.as_str()),
        ("txnid", callback.txnid.as_str()),
        ("hash", callback.hash.as_str()),
        ("easepayid", "E900001"),
    ]);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::post("/payment-success")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(form.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_redirection());
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://frontend.test/payment-result?status=success"));
        assert!(location.contains(&format!("txnid={}", txnid)));
        assert!(location.contains("amount=1000.00"));
    }

    let stored = h.stores.payments.get(&txnid).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Success);

    let response = app
        .oneshot(
            Request::get("/payment-status/U1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["paymentStatus"], "success");
    assert_eq!(body["paymentTxnId"], txnid.as_str());
}

#[tokio::test]
async fn test_forged_callback_is_acknowledged_but_ignored() {
    let h = Harness::new().await;
    h.add_user("U1", PaymentRole::Attendee, "").await;
    let app = router(h.state.clone());

    let body = json_body(
        app.clone()
            .oneshot(post_json("/create-payment", json!({ "uid": "U1" })))
            .await
            .unwrap(),
    )
    .await;
    let txnid = body["txnid"].as_str().unwrap().to_string();

    let form = form_encode(&[
        ("status", "success"),
        ("amount", "1000.00"),
        ("txnid", txnid.as_str()),
        ("hash", "deadbeef"),
    ]);
    let response = app
        .oneshot(
            Request::post("/payment-success")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("http://frontend.test/payment-result?status=failure"));
    assert!(location.contains("reason=hash_mismatch"));

    let stored = h.stores.payments.get(&txnid).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Initiated);
}

#[tokio::test]
async fn test_errors_are_structured() {
    let h = Harness::new().await;
    let app = router(h.state.clone());

    let response = app
        .clone()
        .oneshot(post_json(
            "/admin/verify-user",
            json!({ "userId": "U1", "action": "approved", "adminId": "U1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let response = app
        .clone()
        .oneshot(Request::get("/receipt/U1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "NOT_AVAILABLE");

    let response = app
        .oneshot(post_json("/create-payment", json!({ "frontendUrl": "x" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_multipart_id_card_upload() {
    let h = Harness::new().await;
    let app = router(h.state.clone());

    let boundary = "XBOUNDARYX";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"userId\"\r\n\r\nU1\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"idCard\"; filename=\"id.png\"\r\n\
         Content-Type: image/png\r\n\r\nPNGDATA\r\n--{b}--\r\n",
        b = boundary
    );
    let response = app
        .clone()
        .oneshot(
            Request::post("/upload-id-card")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["verificationStatus"], "pending");
    let url = json["idCardUrl"].as_str().unwrap();

    // The stored file is served back under /files.
    let path = url.trim_start_matches("http://api.test");
    let response = app
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"PNGDATA");
}
