use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiPath;
use crate::services::grid::{self, DeleteResponse, PowerFlowReport, UploadResponse};
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/grid/files/upload", post(upload))
        .route("/grid/ids", get(list_ids))
        .route("/grid/:grid_id", delete(remove))
        .route("/grid/:grid_id/power-flow", get(power_flow))
}

async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart = multipart?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        return grid::upload_grid(&state, filename.as_deref(), content)
            .await
            .map(Json);
    }
    Err(ApiError::BadRequest("Uploaded file is empty".into()))
}

async fn list_ids(State(state): State<AppState>) -> ApiResult<Json<Vec<i32>>> {
    grid::list_grid_ids(&state).await.map(Json)
}

async fn remove(
    State(state): State<AppState>,
    ApiPath(grid_id): ApiPath<i32>,
) -> ApiResult<Json<DeleteResponse>> {
    grid::delete_grid(&state, grid_id).await.map(Json)
}

async fn power_flow(
    State(state): State<AppState>,
    ApiPath(grid_id): ApiPath<i32>,
) -> ApiResult<Json<PowerFlowReport>> {
    grid::run_power_flow(&state, grid_id).await.map(Json)
}
