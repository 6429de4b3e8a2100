pub mod guard;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::analysis::handlers as analysis;
use crate::auth::handlers as auth;
use crate::payments::handlers as payments;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.upload_body_limit();

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/health/db", get(health::db_health_handler))
        // Accounts
        .route("/api/auth/register", post(auth::handle_register))
        .route("/api/auth/login", post(auth::handle_login))
        .route("/api/auth/me", get(auth::handle_me))
        .route("/api/auth/logout", post(auth::handle_logout))
        // Payments and subscription
        .route(
            "/api/payments",
            get(payments::handle_list_payments).post(payments::handle_record_payment),
        )
        .route(
            "/api/payments/check-subscription",
            get(payments::handle_check_subscription),
        )
        .route("/api/razorpay", post(payments::handle_create_order))
        .route("/api/razorpay/verify", post(payments::handle_verify))
        // Documents and analysis
        .route(
            "/api/upload",
            post(analysis::handle_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/files", get(analysis::handle_files))
        .route("/api/analyze", post(analysis::handle_analyze))
        .route(
            "/api/analysis",
            get(analysis::handle_list_analyses).post(analysis::handle_record_analysis),
        )
        .route("/api/reports/:id", get(analysis::handle_download_report))
        .layer(middleware::from_fn(guard::page_guard))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::analysis::dispatch::tests::{subscribe, test_state, FakeModel};

    const BOUNDARY: &str = "resify-test-boundary";

    fn json_request(method: &str, uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn upload_request(pdf: &[u8], tier: &str, cookie: &str) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"pdfFile\"; filename=\"paper.pdf\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(pdf);
        body.extend_from_slice(
            format!(
                "\r\n--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"targetTier\"\r\n\r\n{tier}\r\n--{BOUNDARY}--\r\n"
            )
            .as_bytes(),
        );
        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::COOKIE, cookie)
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn session_cookie(response: &Response) -> String {
        let raw = response.headers()[header::SET_COOKIE].to_str().unwrap();
        raw.split(';').next().unwrap().to_string()
    }

    async fn register(app: &Router, email: &str, username: &str) -> Response {
        app.clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                json!({ "username": username, "email": email, "password": "hunter22" }),
                None,
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_me_and_duplicate_email() {
        let (state, _dir) = test_state(Arc::new(FakeModel::default())).await;
        let app = build_router(state);

        let response = register(&app, "ada@example.org", "ada").await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = session_cookie(&response);
        let user = body_json(response).await;
        assert_eq!(user["email"], "ada@example.org");
        assert!(user.get("passwordHash").is_none());

        let response = app
            .clone()
            .oneshot(get_request("/api/auth/me", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["username"], "ada");

        let response = register(&app, "ada@example.org", "someone-else").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["message"], "Email already in use");
    }

    #[tokio::test]
    async fn test_protected_api_needs_session() {
        let (state, _dir) = test_state(Arc::new(FakeModel::default())).await;
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(get_request("/api/payments", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(get_request("/api/payments/check-subscription", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["hasActiveSubscription"], false);
    }

    #[tokio::test]
    async fn test_page_guard_redirects() {
        let (state, _dir) = test_state(Arc::new(FakeModel::default())).await;
        let app = build_router(state);
        let cookie = format!("session={}", Uuid::new_v4());

        let response = app
            .clone()
            .oneshot(get_request("/dashboard", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/login");

        let response = app
            .clone()
            .oneshot(get_request("/login", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::LOCATION], "/dashboard");

        let response = app.oneshot(get_request("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upload_then_analyze_requires_subscription() {
        let model = Arc::new(FakeModel::default());
        let (state, _dir) = test_state(model.clone()).await;
        let app = build_router(state.clone());

        let response = register(&app, "grace@example.org", "grace").await;
        let cookie = session_cookie(&response);
        let user_id = Uuid::parse_str(body_json(response).await["id"].as_str().unwrap()).unwrap();

        let response = app
            .clone()
            .oneshot(upload_request(b"%PDF-1.7 body", "q2", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let uploaded = body_json(response).await;
        assert_eq!(uploaded["fileIds"]["targetTier"], "Q2");
        let pdf_id = uploaded["fileIds"]["pdfFileId"].as_str().unwrap().to_string();

        let analyze = json!({ "pdfFileId": pdf_id, "targetTier": "Q2" });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/analyze", analyze.clone(), Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);

        subscribe(&state, user_id).await;
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/analyze", analyze, Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let result = body_json(response).await;
        assert!(result["analysisText"].as_str().unwrap().contains("Q2"));

        let response = app
            .oneshot(get_request("/api/analysis", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_pdf_rejected_before_storage() {
        let (mut state, dir) = test_state(Arc::new(FakeModel::default())).await;
        state.config.max_pdf_bytes = 1024;
        let app = build_router(state);
        let cookie = format!("session={}", Uuid::new_v4());

        let mut pdf = b"%PDF-".to_vec();
        pdf.resize(2048, b' ');
        let response = app
            .oneshot(upload_request(&pdf, "Q1", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
