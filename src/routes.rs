use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::Config,
    error::SignError,
    signer::create_signed_url,
    types::{AuthReq, AuthRes, ErrorRes},
    user::{select_user, User},
};

pub struct AppState {
    pub config: Config,
    pub users: Vec<User>,
}

/// `/auth` signs embed URLs; every other path is served from the static
/// demo directory.
pub fn router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);
    let timeout = state.config.request_timeout;

    Router::new()
        .route("/auth", get(auth))
        .fallback_service(static_files)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
}

// ---------- API HANDLERS ---------- //

// Session and permission checks for the caller belong here, before signing.
async fn auth(
    State(state): State<Arc<AppState>>,
    Query(req): Query<AuthReq>,
) -> Result<Json<AuthRes>, Response> {
    let Some(src) = req.src.filter(|s| !s.is_empty()) else {
        return Err(bad("src"));
    };
    let Some(user) = select_user(&state.users, req.user_id.as_deref()) else {
        return Err(SignError::Configuration("no demo users loaded".into()).into_response());
    };

    let url = create_signed_url(
        &src,
        user,
        &state.config.embed_host,
        &state.config.embed_secret,
    )
    .map_err(IntoResponse::into_response)?;

    info!(
        external_user_id = %user.external_user_id,
        src = %src,
        "issued signed embed url"
    );
    Ok(Json(AuthRes { url }))
}

fn bad(s: &'static str) -> Response {
    let body = ErrorRes {
        code: "ValidationError",
        message: format!("missing/invalid {}", s),
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::VerifyError,
        signer::{verify_signed_url, Secret},
    };
    use axum::{body::Body, http::Request};
    use std::{path::PathBuf, time::Duration};
    use tower::ServiceExt;

    const SECRET: &str = "s3cr3t";

    fn state() -> Arc<AppState> {
        let mut second = User::new("u2");
        second.first_name = Some("Second".into());
        let mut first = User::new("u1");
        first.first_name = Some("Demo".into());
        Arc::new(AppState {
            config: Config {
                embed_host: "https://looker.example.com".into(),
                embed_secret: Secret::new(SECRET),
                demo_host: "localhost".into(),
                demo_port: 0,
                demo_user_file: PathBuf::from("demo/demo_user.json"),
                static_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demo"),
                request_timeout: Duration::from_secs(10),
            },
            users: vec![first, second],
        })
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = router(state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_should_return_verifiable_signed_url() {
        let (status, body) = get_json("/auth?src=%2Fembed%2Fdashboards%2F1").await;
        assert_eq!(status, StatusCode::OK);

        let url = body["url"].as_str().unwrap();
        assert!(url.starts_with("https://looker.example.com/embed/dashboards/1?"));
        let verified = verify_signed_url(url, &Secret::new(SECRET)).unwrap();
        assert_eq!(verified.external_user_id, "u1");
        assert_eq!(
            verify_signed_url(url, &Secret::new("wrong")),
            Err(VerifyError::SignatureMismatch)
        );
    }

    #[tokio::test]
    async fn test_should_select_user_from_query() {
        let (status, body) = get_json("/auth?src=/embed/looks/4&userId=u2").await;
        assert_eq!(status, StatusCode::OK);
        let url = body["url"].as_str().unwrap();
        assert!(url.contains("external_user_id=u2"));
        assert!(url.contains("first_name=Second"));

        let (_, body) = get_json("/auth?src=/embed/looks/4&userId=nobody").await;
        assert!(body["url"].as_str().unwrap().contains("external_user_id=u1"));
    }

    #[tokio::test]
    async fn test_should_reject_missing_src() {
        let (status, body) = get_json("/auth").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("url").is_none());
        assert_eq!(body["code"], "ValidationError");
    }

    #[tokio::test]
    async fn test_should_reject_invalid_src_without_url() {
        let (status, body) = get_json("/auth?src=%2F%2Fevil.example.com%2Fx").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("url").is_none());
        assert_eq!(body["code"], "ValidationError");
    }

    #[tokio::test]
    async fn test_should_hide_configuration_errors_from_callers() {
        let mut state = Arc::into_inner(state()).unwrap();
        state.config.embed_secret = Secret::new("changeme");
        let resp = router(Arc::new(state))
            .oneshot(
                Request::builder()
                    .uri("/auth?src=/embed/looks/4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(!String::from_utf8_lossy(&bytes).contains("changeme"));
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body.get("url").is_none());
        assert_eq!(body["code"], "ConfigurationError");
        assert_eq!(body["message"], "Invalid Configuration");
    }

    #[tokio::test]
    async fn test_should_serve_demo_index() {
        let resp = router(state())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = router(state())
            .oneshot(Request::builder().uri("/missing.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
