use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use takeoff_core::materialize::CreatedVersion;
use takeoff_core::versions::{CopiedVersion, DeletedVersion, VersionList};

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/takeoff/:project_id/create-version: materialize a new version
/// tab from the template and the current Setup selection.
pub async fn create_version(
    State(app): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<CreatedVersion>, AppError> {
    Ok(Json(app.engine.create_version(&project_id).await?))
}

/// GET /api/takeoff/:project_id/versions: tracker entries and tab presence.
pub async fn list_versions(
    State(app): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<VersionList>, AppError> {
    Ok(Json(app.engine.list_versions(&project_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateVersionBody {
    sheet_name: String,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    status: Option<String>,
}

/// PUT /api/takeoff/:project_id/versions: activate a version and/or change
/// its status.
pub async fn update_version(
    State(app): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<UpdateVersionBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    if body.is_active.is_none() && body.status.is_none() {
        return Err(AppError::bad_request("nothing to update: pass is_active or status"));
    }
    if body.is_active == Some(false) {
        return Err(AppError::bad_request(
            "a version is deactivated by activating another",
        ));
    }

    let mut entry = None;
    if body.is_active == Some(true) {
        entry = Some(
            app.engine
                .set_active_version(&project_id, &body.sheet_name)
                .await?,
        );
    }
    if let Some(status) = body.status.as_deref() {
        entry = Some(
            app.engine
                .update_version_status(&project_id, &body.sheet_name, status)
                .await?,
        );
    }

    Ok(Json(serde_json::json!({
        "project_id": project_id,
        "sheet_name": body.sheet_name,
        "entry": entry,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CopyVersionBody {
    source_sheet_name: String,
}

/// POST /api/takeoff/:project_id/versions: copy an existing version tab.
pub async fn copy_version(
    State(app): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<CopyVersionBody>,
) -> Result<Json<CopiedVersion>, AppError> {
    Ok(Json(
        app.engine
            .copy_version(&project_id, &body.source_sheet_name)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct DeleteVersionQuery {
    #[serde(default)]
    sheet: Option<String>,
    #[serde(default)]
    force: bool,
}

/// DELETE /api/takeoff/:project_id/versions?sheet=&force=: delete a version
/// tab and retire its tracker entry.
pub async fn delete_version(
    State(app): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<DeleteVersionQuery>,
) -> Result<Json<DeletedVersion>, AppError> {
    let sheet = query
        .sheet
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("sheet is required"))?;
    Ok(Json(
        app.engine
            .delete_version(&project_id, &sheet, query.force)
            .await?,
    ))
}
