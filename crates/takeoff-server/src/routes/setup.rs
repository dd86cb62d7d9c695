use axum::extract::{Path, State};
use axum::Json;
use takeoff_core::setup::SetupSummary;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/takeoff/:project_id/setup-config: what the Setup tab currently
/// selects. Always reads the tab fresh.
pub async fn get_setup_config(
    State(app): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<SetupSummary>, AppError> {
    Ok(Json(app.engine.setup_summary(&project_id).await?))
}
