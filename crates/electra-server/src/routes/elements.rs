use axum::extract::State;
use axum::routing::{get, patch};
use axum::{Json, Router};
use electra_core::ElementKind;
use electra_store::ElementRow;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::services::elements::{self, StatusUpdate};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct GridFilter {
    grid_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    active: bool,
}

/// List, fetch and status routes for every element family.
pub(super) fn routes() -> Router<AppState> {
    ElementKind::ALL
        .into_iter()
        .fold(Router::new(), |router, kind| {
            let base = format!("/{}", kind.route());
            let listing = get(move |s: State<AppState>, q: ApiQuery<GridFilter>| list(kind, s, q));
            router
                .route(&base, listing.clone())
                .route(&format!("{base}/"), listing)
                .route(
                    &format!("{base}/:id"),
                    get(move |s: State<AppState>, p: ApiPath<i32>| fetch(kind, s, p)),
                )
                .route(
                    &format!("{base}/:id/status"),
                    patch(
                        move |s: State<AppState>, p: ApiPath<i32>, b: ApiJson<StatusBody>| {
                            set_status(kind, s, p, b)
                        },
                    ),
                )
        })
}

async fn list(
    kind: ElementKind,
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<GridFilter>,
) -> ApiResult<Json<Vec<ElementRow>>> {
    elements::list_elements(&state, kind, filter.grid_id)
        .await
        .map(Json)
}

async fn fetch(
    kind: ElementKind,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<Json<ElementRow>> {
    elements::get_element(&state, kind, id).await.map(Json)
}

async fn set_status(
    kind: ElementKind,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(body): ApiJson<StatusBody>,
) -> ApiResult<Json<StatusUpdate>> {
    elements::update_status(&state, kind, id, body.active)
        .await
        .map(Json)
}
