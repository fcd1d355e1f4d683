use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::shared::state::AppState;
use crate::system::auth::middleware::{require_admin, require_auth};
use crate::system::middleware::request_logger::request_logger;
use crate::system::rate_limit::middleware::{limit_admin, limit_customer, limit_public};
use crate::{handlers, system};

/// Configures all application routes
pub fn configure_routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(public_routes(&state))
        .merge(customer_routes(&state))
        .merge(admin_routes(&state))
        .layer(middleware::from_fn(request_logger))
        .layer(cors)
        .with_state(state)
}

fn public_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // ========================================
        // AUTH
        // ========================================
        .route("/api/auth/register", post(system::handlers::auth::register))
        .route("/api/auth/token", post(system::handlers::auth::token))
        .route("/api/auth/login", post(system::handlers::auth::login))
        .route("/api/auth/logout", post(system::handlers::auth::logout))
        .route("/api/auth/verify", post(system::handlers::auth::verify))
        // ========================================
        // CATALOG
        // ========================================
        .route("/api/products", get(handlers::products::list_public))
        .route("/api/products/:id", get(handlers::products::get_public))
        .route("/api/offers", get(handlers::offers::list_public))
        .route("/api/offers/:id", get(handlers::offers::get_public))
        .route_layer(middleware::from_fn_with_state(state.clone(), limit_public))
}

fn customer_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // Callables
        .route(
            "/api/functions/createAdminUser",
            post(system::handlers::functions::create_admin_user),
        )
        .route(
            "/api/functions/sendVerificationCode",
            post(system::handlers::functions::send_verification_code),
        )
        .route(
            "/api/functions/verifyCode",
            post(system::handlers::functions::verify_code),
        )
        // Cart
        .route(
            "/api/carts/me",
            get(handlers::carts::get_mine).delete(handlers::carts::clear),
        )
        .route("/api/carts/me/offers", post(handlers::carts::add_offer))
        .route("/api/carts/me/products", post(handlers::carts::add_product))
        .route(
            "/api/carts/me/items/:id",
            put(handlers::carts::update_quantity).delete(handlers::carts::remove_item),
        )
        .route("/api/carts/me/validate", post(handlers::carts::validate))
        .route("/api/carts/me/events", get(handlers::carts::events))
        // Orders
        .route("/api/orders", post(handlers::orders::checkout))
        .route("/api/orders/mine", get(handlers::orders::list_mine))
        .route("/api/orders/:id", get(handlers::orders::get))
        .route("/api/orders/:id/events", get(handlers::orders::events))
        // The last route layer runs first: authenticate, then rate-limit per user.
        .route_layer(middleware::from_fn_with_state(state.clone(), limit_customer))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
}

fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/admin/products",
            get(handlers::products::list_all).post(handlers::products::create),
        )
        .route(
            "/api/admin/products/:id",
            put(handlers::products::update).delete(handlers::products::delete),
        )
        .route(
            "/api/admin/offers",
            get(handlers::offers::list_all).post(handlers::offers::create),
        )
        .route(
            "/api/admin/offers/:id",
            put(handlers::offers::update).delete(handlers::offers::delete),
        )
        .route(
            "/api/admin/offers/:id/publish",
            post(handlers::offers::publish),
        )
        .route(
            "/api/admin/offers/:id/deactivate",
            post(handlers::offers::deactivate),
        )
        .route("/api/admin/orders", get(handlers::orders::list))
        .route(
            "/api/admin/orders/:id/status",
            post(handlers::orders::update_status),
        )
        .route(
            "/api/admin/orders/:id/transitions",
            get(handlers::orders::transitions),
        )
        .route(
            "/api/admin/orders/:id/invoice",
            put(handlers::orders::set_invoice),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), limit_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::config::parse_config;
    use crate::shared::data::db::connect_in_memory;
    use crate::system::auth::jwt::JwtKeys;
    use crate::system::users::service as user_service;
    use crate::system::verification::sms::LoggingSmsSender;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use contracts::system::auth::RegisterRequest;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let db = connect_in_memory().await.unwrap();
        let config = parse_config("[database]\npath = \"unused.db\"\n").unwrap();
        let jwt = JwtKeys::from_secret("router-test-secret", 1);
        AppState::new(db, config, jwt, Arc::new(LoggingSmsSender))
    }

    async fn customer_token(state: &AppState) -> String {
        let user = user_service::register_customer(
            &state.db,
            RegisterRequest {
                email: "shopper@example.com".into(),
                password: "Str0ngPass!".into(),
                first_name: "Sam".into(),
                last_name: "Shopper".into(),
                phone: None,
            },
        )
        .await
        .unwrap();
        state.jwt.issue(&user).unwrap().0
    }

    async fn admin_token(state: &AppState) -> String {
        let user = user_service::create_bootstrap_admin(&state.db, "root@example.com", "Str0ngPass!")
            .await
            .unwrap();
        state.jwt.issue(&user).unwrap().0
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_and_public_catalog_are_open() {
        let app = configure_routes(test_state().await);

        let response = app.clone().oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");

        let response = app.oneshot(get("/api/products", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "[]");
    }

    #[tokio::test]
    async fn customer_routes_require_a_token() {
        let state = test_state().await;
        let token = customer_token(&state).await;
        let app = configure_routes(state);

        let response = app.clone().oneshot(get("/api/carts/me", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("\"unauthenticated\""));

        let response = app.oneshot(get("/api/carts/me", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "null");
    }

    #[tokio::test]
    async fn admin_routes_reject_customers() {
        let state = test_state().await;
        let customer = customer_token(&state).await;
        let admin = admin_token(&state).await;
        let app = configure_routes(state);

        let response = app
            .clone()
            .oneshot(get("/api/admin/orders", Some(&customer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(get("/api/admin/orders", Some(&admin)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "[]");
    }

    #[tokio::test]
    async fn login_installs_admin_cookie() {
        let state = test_state().await;
        let admin = admin_token(&state).await;
        let customer = customer_token(&state).await;
        let app = configure_routes(state);

        let login = |token: &str| {
            Request::builder()
                .method(Method::POST)
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(format!(r#"{{"idToken":"{}"}}"#, token)))
                .unwrap()
        };

        let response = app.clone().oneshot(login(&admin)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));

        // The cookie alone authenticates admin requests.
        let request = Request::builder()
            .uri("/api/admin/products")
            .header(header::COOKIE, cookie.split(';').next().unwrap())
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(login(&customer)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_ids_are_invalid_arguments() {
        let state = test_state().await;
        let token = customer_token(&state).await;
        let app = configure_routes(state);

        let response = app
            .oneshot(get("/api/orders/not-a-uuid", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("\"invalid-argument\""));
    }
}
