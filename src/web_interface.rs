use crate::{
    codec::SharedKey,
    dto::LocationRow,
    ingest::Ingestor,
    query,
    store::LocationStore,
    util::{config::Settings, ApiError},
};
use axum::{
    body::Bytes,
    extract::{FromRef, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[derive(Clone)]
struct WebConfig {
    map_url_template: String,
    expose_plaintext_errors: bool,
}

#[derive(Clone, FromRef)]
struct AppState {
    ingestor: Ingestor,
    store: LocationStore,
    web_config: WebConfig,
}

async fn receive(
    State(ingestor): State<Ingestor>,
    State(web_config): State<WebConfig>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    ingestor
        .ingest_body(&body)
        .await
        .map_err(|error| ApiError::Ingest {
            error,
            expose_plaintext: web_config.expose_plaintext_errors,
        })?;

    Ok(Json(json!({ "status": "ok" })))
}

async fn last_position(
    State(store): State<LocationStore>,
    Path(device): Path<String>,
) -> Result<Json<LocationRow>, ApiError> {
    query::last_position(&store, &device)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn map_redirect(
    State(store): State<LocationStore>,
    State(web_config): State<WebConfig>,
    Path(device): Path<String>,
) -> Result<Response, ApiError> {
    let (lat, lon) = query::last_coordinates(&store, &device)
        .await?
        .ok_or(ApiError::NotFound)?;
    let url = query::map_link(&web_config.map_url_template, lat, lon);

    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

fn router(state: AppState, cors_permissive: bool) -> Router {
    let app = Router::new()
        .route("/public/receive", post(receive))
        .route("/last/:device", get(last_position))
        .route("/map/:device", get(map_redirect))
        .fallback(not_found)
        .with_state(state)
        .layer(CompressionLayer::new());

    let app = if cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };

    app.layer(TraceLayer::new_for_http())
}

pub async fn start_server(pool: SqlitePool, key: SharedKey, settings: &Settings) -> anyhow::Result<()> {
    let store = LocationStore::new(pool);
    let state = AppState {
        ingestor: Ingestor::new(key, store.clone()),
        store,
        web_config: WebConfig {
            map_url_template: settings.map_url_template.clone(),
            expose_plaintext_errors: settings.expose_plaintext_errors,
        },
    };

    if settings.expose_plaintext_errors {
        info!("Parse errors will echo decrypted plaintext to clients");
    }

    let app = router(state, settings.cors_permissive);

    let listener = TcpListener::bind(&settings.http_addr).await?;
    info!("Listening on {}", &settings.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Web server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received shutdown signal");
    }
}
