use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::services::health::{self, DbHealth};
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new().route("/health/db", get(db))
}

async fn db(State(state): State<AppState>) -> (StatusCode, Json<DbHealth>) {
    let report = health::check_db(&state).await;
    let status = if report.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
