use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, put},
    Json, Router,
};
use server_api::{
    delete_purifier, list_purifiers, replace_purifier, set_purifier_status, upsert_purifier,
    ApiContext,
};
use shared::{
    domain::{NewPurifier, PurifierRecord},
    error::{ApiError, ErrorCode},
    protocol::StatusUpdate,
};
use storage::Storage;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext { storage },
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "purifier record service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/purifiers", get(http_list_purifiers).post(http_upsert_purifier))
        .route(
            "/purifiers/:id",
            put(http_replace_purifier).delete(http_delete_purifier),
        )
        .route("/purifiers/:id/status", patch(http_set_status))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> ApiResult<&'static str> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| error_response(ApiError::new(ErrorCode::Internal, e.to_string())))?;
    Ok("ok")
}

async fn http_list_purifiers(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<PurifierRecord>>> {
    let purifiers = list_purifiers(&state.api).await.map_err(error_response)?;
    Ok(Json(purifiers))
}

async fn http_upsert_purifier(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewPurifier>,
) -> ApiResult<Json<PurifierRecord>> {
    let record = upsert_purifier(&state.api, input)
        .await
        .map_err(error_response)?;
    Ok(Json(record))
}

async fn http_replace_purifier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<NewPurifier>,
) -> ApiResult<Json<PurifierRecord>> {
    let record = replace_purifier(&state.api, &id, input)
        .await
        .map_err(error_response)?;
    Ok(Json(record))
}

async fn http_set_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Json<PurifierRecord>> {
    let record = set_purifier_status(&state.api, &id, update.status)
        .await
        .map_err(error_response)?;
    Ok(Json(record))
}

async fn http_delete_purifier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    delete_purifier(&state.api, &id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

fn error_response(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => {
            error!(message = %err.message, "record service internal error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(err))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
