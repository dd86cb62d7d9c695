use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use takeoff_core::engine::ToolReport;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ToolsQuery {
    #[serde(default)]
    bundles: bool,
}

/// GET /api/takeoff/:project_id/tools?bundles=true: BTX tool units for the
/// current Setup selection, optionally grouped per location.
pub async fn get_tools(
    State(app): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<ToolsQuery>,
) -> Result<Json<ToolReport>, AppError> {
    Ok(Json(
        app.engine
            .generate_tools(&project_id, query.bundles)
            .await?,
    ))
}
