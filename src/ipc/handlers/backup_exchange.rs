use crate::backup;
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::require_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_export(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(workspace) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let out_path = PathBuf::from(require_str(&req.params, "outPath")?);

    let summary = backup::export_bundle(&workspace, &out_path)
        .map_err(|e| HandlerErr::new("backup_export_failed", format!("{e:#}")))?;

    Ok(ok(
        &req.id,
        json!({
            "outPath": out_path.to_string_lossy(),
            "bundleFormat": summary.bundle_format,
            "entryCount": summary.entry_count
        }),
    ))
}

fn handle_import(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(workspace) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let in_path = PathBuf::from(require_str(&req.params, "inPath")?);

    // Close the open connection before the database file is replaced.
    state.db = None;
    let summary = backup::import_bundle(&in_path, &workspace)
        .map_err(|e| HandlerErr::new("backup_import_failed", format!("{e:#}")))?;
    let conn = db::open_db(&workspace)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:?}")))?;
    state.db = Some(conn);

    Ok(ok(
        &req.id,
        json!({ "bundleFormatDetected": summary.bundle_format_detected }),
    ))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(handle_export(state, req).unwrap_or_else(|e| e.response(&req.id))),
        "backup.import" => Some(handle_import(state, req).unwrap_or_else(|e| e.response(&req.id))),
        _ => None,
    }
}
