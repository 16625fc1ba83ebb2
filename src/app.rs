use std::net::SocketAddr;
use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::response::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::{auth, customers, listings};

async fn health() -> ApiResult<()> {
    Ok(ApiResponse::message("ok"))
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1",
              Router::new()
                  .merge(auth::router())
                  .merge(listings::router())
                  .merge(customers::router())
                  .route("/health", get(health))
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
        .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::{Audience, ADMIN_SUBJECT};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let (status, body) = call(app, get("/api/v1/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["errno"], 20000);
    }

    #[tokio::test]
    async fn missing_token_is_rejected_with_envelope() {
        let app = build_app(AppState::fake());
        let (status, body) = call(app, get("/api/v1/house/list", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["errno"], 40050);
    }

    #[tokio::test]
    async fn user_token_cannot_reach_admin_routes() {
        let state = AppState::fake();
        let token = state.keys.issue("13800000000", Audience::User).unwrap();
        let app = build_app(state);
        let (status, body) = call(app, get("/api/v1/admin/list", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["errno"], 40150);
    }

    #[tokio::test]
    async fn admin_token_cannot_reach_house_routes() {
        let state = AppState::fake();
        let token = state.keys.issue(ADMIN_SUBJECT, Audience::Admin).unwrap();
        let app = build_app(state);
        let (status, body) = call(app, get("/api/v1/house/list", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["errno"], 40150);
    }

    #[tokio::test]
    async fn garbage_token_is_invalid() {
        let app = build_app(AppState::fake());
        let (status, body) = call(app, get("/api/v1/user/list", Some("nope"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["errno"], 40100);
    }
}
