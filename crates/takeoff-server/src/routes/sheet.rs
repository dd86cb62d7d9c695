use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use takeoff_core::engine::SheetConfig;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SheetQuery {
    #[serde(default)]
    tab: Option<String>,
}

/// GET /api/takeoff/:project_id/sheet-config?tab=: sections, locations and
/// items of a takeoff tab (the template tab when `tab` is omitted).
pub async fn get_sheet_config(
    State(app): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<SheetQuery>,
) -> Result<Json<SheetConfig>, AppError> {
    Ok(Json(
        app.engine
            .sheet_config(&project_id, query.tab.as_deref())
            .await?,
    ))
}
