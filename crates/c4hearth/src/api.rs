use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::CommandError;
use crate::engine::CoverCommand;
use crate::engine::CoverState;
use crate::engine::Device;
use crate::engine::Engine;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
    integrations: usize,
}

/// Response for the /v1/covers endpoint
#[derive(Serialize)]
struct CoversResponse {
    covers: BTreeMap<String, CoverState>,
    devices: BTreeMap<String, Device>,
}

/// Response for rejected or accepted commands
#[derive(Serialize)]
struct CommandResponse {
    status: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    engine: Arc<Engine>,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
            integrations: state.engine.integration_count(),
        }),
    )
}

/// Handler for GET /v1/covers
#[tracing::instrument(skip(state))]
async fn list_covers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.state_snapshot();
    (
        StatusCode::OK,
        Json(CoversResponse {
            covers: snapshot
                .covers
                .iter()
                .map(|(id, cover)| (id.clone(), cover.clone()))
                .collect(),
            devices: snapshot.devices.clone(),
        }),
    )
}

/// Handler for POST /v1/covers/{entity_id}/{command}
#[tracing::instrument(skip(state))]
async fn cover_command(
    State(state): State<Arc<AppState>>,
    Path((entity_id, command)): Path<(String, String)>,
) -> impl IntoResponse {
    let respond = |status: StatusCode, message: String| {
        (status, Json(CommandResponse { status: message }))
    };

    let command = match CoverCommand::from_str(&command) {
        Ok(c) => c,
        Err(_) => {
            return respond(
                StatusCode::BAD_REQUEST,
                format!("Unknown cover command: {}", command),
            );
        }
    };

    match state.engine.send_cover_command(entity_id, command) {
        Ok(()) => respond(StatusCode::ACCEPTED, "accepted".to_string()),
        Err(e @ CommandError::UnknownEntity(_)) => respond(StatusCode::NOT_FOUND, e.to_string()),
        Err(e) => {
            tracing::warn!("Failed to route cover command: {}", e);
            respond(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/covers", get(list_covers))
        .route("/v1/covers/:entity_id/:command", post(cover_command))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to `listen:port` and serves until `shutdown_rx` fires. Returns an
/// error if the address is invalid or cannot be bound.
pub async fn serve(
    listen: String,
    port: u16,
    engine: Arc<Engine>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, engine });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::engine::FromIntegrationMessage;
    use crate::engine::FromIntegrationSender;
    use crate::engine::Integration;
    use crate::engine::ToIntegrationMessage;

    /// Announces one cover and accepts every command
    struct OneCover;

    #[async_trait]
    impl Integration for OneCover {
        fn name(&self) -> &str {
            "one_cover"
        }

        async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
            let _ = tx
                .send(FromIntegrationMessage::EntityDiscovered {
                    entity_id: "cover.c4_5".to_string(),
                    integration_name: "one_cover".to_string(),
                    device: Device::new("2".to_string(), "Hub".to_string()),
                })
                .await;
            let _ = tx
                .send(FromIntegrationMessage::CoverStateChanged {
                    entity_id: "cover.c4_5".to_string(),
                    closed: true,
                    attributes: BTreeMap::new(),
                })
                .await;
            Ok(())
        }

        async fn handle_message(
            &mut self,
            _msg: ToIntegrationMessage,
        ) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }
    }

    async fn test_router() -> Router {
        let engine = Arc::new(Engine::new());
        engine.register_integration("one_cover".to_string(), Box::new(OneCover));
        tokio::spawn({
            let engine = engine.clone();
            async move { engine.run().await }
        });

        // Wait for the announced cover to land in the state snapshot.
        for _ in 0..100 {
            if engine.state_snapshot().covers.contains_key("cover.c4_5") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        create_router(Arc::new(AppState {
            version: "test",
            engine,
        }))
    }

    async fn request(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_ping() {
        let (status, body) = request(test_router().await, "GET", "/v1/ping").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_info() {
        let (status, body) = request(test_router().await, "GET", "/v1/info").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], "test");
        assert_eq!(body["integrations"], 1);
    }

    #[tokio::test]
    async fn test_list_covers() {
        let (status, body) = request(test_router().await, "GET", "/v1/covers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["covers"]["cover.c4_5"]["closed"], true);
        assert_eq!(body["devices"]["2"]["name"], "Hub");
    }

    #[tokio::test]
    async fn test_cover_command_accepted() {
        let (status, _) = request(test_router().await, "POST", "/v1/covers/cover.c4_5/open").await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_cover_command_errors() {
        let app = test_router().await;

        let (status, _) = request(app.clone(), "POST", "/v1/covers/cover.c4_5/stop").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = request(app, "POST", "/v1/covers/cover.c4_404/close").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "No integration found for entity: cover.c4_404");
    }
}
