use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use doclake_core::document::DocumentId;
use doclake_core::history::{History, CREATED_AT_FIELD, OBJECT_ID_FIELD};
use doclake_core::store::{Filter, OrderBy};

use crate::error::ApiResult;
use crate::state::AppState;

/// Read access to recorded history entries.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/history/{object_id}", get(list_entries))
        .route("/v1/history/{object_id}/latest", get(latest_entry))
}

/// Every entry of one document, oldest first.
async fn list_entries(
    State(state): State<AppState>,
    Path(object_id): Path<String>,
) -> ApiResult<Json<Vec<History>>> {
    let object_id: DocumentId = object_id.parse()?;
    let entries = state
        .history()
        .find_where_with_order(
            by_object_id(object_id),
            vec![(CREATED_AT_FIELD.to_string(), OrderBy::Asc)],
        )
        .await?;
    Ok(Json(entries))
}

async fn latest_entry(
    State(state): State<AppState>,
    Path(object_id): Path<String>,
) -> ApiResult<Json<History>> {
    let object_id: DocumentId = object_id.parse()?;
    let entry = state.history().last_inserted(by_object_id(object_id)).await?;
    Ok(Json(entry))
}

fn by_object_id(object_id: DocumentId) -> Filter {
    Filter::new().equals(OBJECT_ID_FIELD, object_id.to_value())
}
