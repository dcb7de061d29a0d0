use crate::calc;
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{require_class, require_db, require_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn weights_to_rows(weights: &calc::CategoryWeights) -> Vec<serde_json::Value> {
    let mut pairs: Vec<(String, f64)> = weights
        .iter()
        .map(|(c, w)| (c.to_string(), w))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
        .into_iter()
        .map(|(category, weight)| json!({ "category": category, "weight": weight }))
        .collect()
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = require_str(&req.params, "classId")?;
    require_class(conn, class_id)?;

    let stored = db::load_category_weights(conn, class_id).map_err(HandlerErr::db)?;
    let is_default = stored.is_none();
    let weights = stored.unwrap_or_else(calc::default_category_weights);

    Ok(ok(
        &req.id,
        json!({
            "weights": weights_to_rows(&weights),
            "totalWeight": weights.total(),
            "isDefault": is_default
        }),
    ))
}

fn handle_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = require_str(&req.params, "classId")?;
    require_class(conn, class_id)?;

    let Some(map) = req.params.get("weights").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::new(
            "bad_params",
            "params.weights must be an object of category -> weight",
        ));
    };

    let mut weights = calc::CategoryWeights::new();
    for (category, value) in map {
        let category = category.trim();
        if category.is_empty() {
            return Err(HandlerErr::new("bad_params", "category names must not be empty"));
        }
        let Some(weight) = value.as_f64() else {
            return Err(HandlerErr::with_details(
                "bad_params",
                "weights must be numeric",
                json!({ "category": category }),
            ));
        };
        if !weight.is_finite() || weight < 0.0 {
            return Err(HandlerErr::with_details(
                "bad_params",
                "weights must be non-negative",
                json!({ "category": category, "weight": weight }),
            ));
        }
        weights.set(category, weight);
    }

    // Full replacement: the stored configuration always mirrors the last
    // map the client sent.
    conn.execute(
        "DELETE FROM category_weights WHERE class_id = ?",
        [class_id],
    )
    .map_err(HandlerErr::db)?;
    for (category, weight) in weights.iter() {
        conn.execute(
            "INSERT INTO category_weights(class_id, category, weight) VALUES(?, ?, ?)",
            (class_id, category, weight),
        )
        .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
    }

    // Totals other than 100 are stored as-is; the client decides whether to
    // warn. The aggregator renormalizes regardless.
    Ok(ok(
        &req.id,
        json!({
            "weights": weights_to_rows(&weights),
            "totalWeight": weights.total()
        }),
    ))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "weights.get" => Some(handle_get(state, req).unwrap_or_else(|e| e.response(&req.id))),
        "weights.set" => Some(handle_set(state, req).unwrap_or_else(|e| e.response(&req.id))),
        _ => None,
    }
}
