//! Automation command engine.
//!
//! A fixed catalog of named operations over the shape store, partitioned into
//! creation, manipulation, layout and query families. `execute` is the
//! dispatch boundary: every internal failure is converted into a structured
//! outcome there, so a failing operation never takes down its caller and
//! never leaves a half-applied write behind. Mutations go through the same
//! transactional path as human edits and replicate identically.

mod catalog;
mod create;
mod edit;
mod layout;

pub use catalog::{catalog, is_known_tool, ToolSpec};

use crate::shapes::{Color, Shape};
use crate::store::{Origin, ShapeStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Creator recorded on shapes the engine builds.
pub const AUTOMATION_CREATOR: &str = "automation";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("shape {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Codec(#[from] serde_json::Error),
}

/// One planned operation: a catalog name plus its parameter object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

/// Structured result of one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Executes catalog operations against a shape store.
pub struct Engine {
    origin: Origin,
    creator: String,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            origin: Origin::Automation,
            creator: AUTOMATION_CREATOR.to_string(),
        }
    }

    /// Tag this engine's writes with a different origin, e.g. `Origin::User`
    /// when its edits should land on the user's undo stack.
    pub fn with_origin(origin: Origin) -> Self {
        Self {
            origin,
            creator: AUTOMATION_CREATOR.to_string(),
        }
    }

    /// Run one catalog operation. Never panics and never partially applies:
    /// failures come back as `{success: false, error}`.
    pub fn execute(&self, store: &mut ShapeStore, name: &str, params: &Value) -> ToolOutcome {
        match self.dispatch(store, name, params) {
            Ok(result) => ToolOutcome::ok(result),
            Err(err) => {
                log::debug!("tool {name} failed: {err}");
                ToolOutcome::fail(err.to_string())
            }
        }
    }

    /// Run a planned batch in order. One failing call does not stop the rest.
    pub fn execute_all(&self, store: &mut ShapeStore, calls: &[ToolCall]) -> Vec<ToolOutcome> {
        calls
            .iter()
            .map(|call| self.execute(store, &call.name, &call.params))
            .collect()
    }

    fn dispatch(
        &self,
        store: &mut ShapeStore,
        name: &str,
        params: &Value,
    ) -> Result<Value, EngineError> {
        match name {
            "createRectangle" => create::rectangle(self, store, params),
            "createCircle" => create::circle(self, store, params),
            "createEllipse" => create::ellipse(self, store, params),
            "createLine" => create::line(self, store, params),
            "createText" => create::text(self, store, params),
            "createPolygon" => create::polygon(self, store, params),
            "createStar" => create::star(self, store, params),
            "createImage" => create::image(self, store, params),
            "moveShape" => edit::move_shape(self, store, params),
            "resizeShape" => edit::resize_shape(self, store, params),
            "rotateShape" => edit::rotate_shape(self, store, params),
            "changeShapeColor" => edit::change_shape_color(self, store, params),
            "deleteShape" => edit::delete_shape(self, store, params),
            "duplicateShape" => edit::duplicate_shape(self, store, params),
            "bringToFront" => edit::bring_to_front(self, store, params),
            "sendToBack" => edit::send_to_back(self, store, params),
            "arrangeHorizontal" => layout::arrange_horizontal(self, store, params),
            "arrangeVertical" => layout::arrange_vertical(self, store, params),
            "arrangeGrid" => layout::arrange_grid(self, store, params),
            "distributeShapes" => layout::distribute_shapes(self, store, params),
            "alignShapes" => layout::align_shapes(self, store, params),
            "getCanvasState" => edit::get_canvas_state(store),
            "findShapesByType" => edit::find_shapes_by_type(store, params),
            "findShapesByColor" => edit::find_shapes_by_color(store, params),
            other => Err(EngineError::UnknownTool(other.to_string())),
        }
    }

    /// Read a shape that an operation is about to mutate.
    fn require(&self, store: &ShapeStore, id: &str) -> Result<Shape, EngineError> {
        store
            .get(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    /// Commit one written shape and return its record.
    fn write(&self, store: &mut ShapeStore, shape: Shape) -> Result<Value, EngineError> {
        let record = serde_json::to_value(&shape)?;
        store.transact(self.origin.clone(), |txn| txn.set(shape))?;
        Ok(record)
    }

    fn origin(&self) -> Origin {
        self.origin.clone()
    }

    fn creator(&self) -> &str {
        &self.creator
    }
}

// Parameter extraction. Tool params arrive as loosely typed JSON from the
// upstream model; every violation becomes a Validation error, not a panic.

fn missing(key: &str) -> EngineError {
    EngineError::Validation(format!("missing required parameter: {key}"))
}

fn req_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, EngineError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| missing(key))
}

fn req_f64(params: &Value, key: &str) -> Result<f64, EngineError> {
    params
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| missing(key))
}

fn opt_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn opt_f64(params: &Value, key: &str) -> Option<f64> {
    params.get(key).and_then(Value::as_f64)
}

fn opt_u32(params: &Value, key: &str) -> Option<u32> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .map(|n| n.min(u32::MAX as u64) as u32)
}

fn req_color(params: &Value, key: &str) -> Result<Color, EngineError> {
    parse_color(key, req_str(params, key)?)
}

fn opt_color(params: &Value, key: &str) -> Result<Option<Color>, EngineError> {
    opt_str(params, key)
        .map(|raw| parse_color(key, raw))
        .transpose()
}

fn parse_color(key: &str, raw: &str) -> Result<Color, EngineError> {
    raw.parse()
        .map_err(|e| EngineError::Validation(format!("invalid {key}: {e}")))
}

/// The `shapeIds` list shared by every layout operation.
fn req_id_list(params: &Value, key: &str) -> Result<Vec<String>, EngineError> {
    let raw = params
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| missing(key))?;
    let mut ids = Vec::with_capacity(raw.len());
    for entry in raw {
        match entry.as_str() {
            Some(id) => ids.push(id.to_string()),
            None => {
                return Err(EngineError::Validation(format!(
                    "{key} must be an array of shape id strings"
                )))
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_tool_message() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        let outcome = engine.execute(&mut store, "teleportShape", &json!({}));
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Unknown tool: teleportShape"));
    }

    #[test]
    fn test_failure_leaves_store_untouched() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        let outcome = engine.execute(&mut store, "moveShape", &json!({"shapeId": "nope", "x": 1.0, "y": 2.0}));
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("shape nope not found"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_every_catalog_name_dispatches() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        for spec in catalog() {
            let outcome = engine.execute(&mut store, spec.name, &json!({}));
            let unknown = format!("Unknown tool: {}", spec.name);
            assert_ne!(
                outcome.error.as_deref(),
                Some(unknown.as_str()),
                "{} is in the catalog but not dispatched",
                spec.name
            );
        }
    }

    #[test]
    fn test_create_find_delete_round() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();

        let created = engine.execute(
            &mut store,
            "createRectangle",
            &json!({"x": 100.0, "y": 100.0}),
        );
        assert!(created.success, "{:?}", created.error);
        let record = created.result.expect("record");
        let id = record["id"].as_str().expect("id").to_string();
        assert_eq!(record["width"], json!(150.0));
        assert_eq!(record["height"], json!(100.0));
        assert_eq!(record["createdBy"], json!("automation"));

        let found = engine.execute(&mut store, "findShapesByType", &json!({"type": "rectangle"}));
        assert!(found.success);
        let found = found.result.expect("result");
        assert_eq!(found["count"], json!(1));
        assert_eq!(found["shapes"][0]["id"].as_str(), Some(id.as_str()));

        let deleted = engine.execute(&mut store, "deleteShape", &json!({"shapeId": id}));
        assert!(deleted.success);

        let state = engine.execute(&mut store, "getCanvasState", &json!({}));
        assert!(state.success);
        let state = state.result.expect("result");
        assert_eq!(state["count"], json!(0));
        assert_eq!(state["shapes"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn test_creation_z_order_follows_store_size() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        for expected_z in 0..3i64 {
            let outcome = engine.execute(&mut store, "createCircle", &json!({"x": 0.0, "y": 0.0}));
            let record = outcome.result.expect("record");
            assert_eq!(record["zIndex"], json!(expected_z));
        }
    }

    #[test]
    fn test_execute_all_continues_past_failures() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        let calls = vec![
            ToolCall {
                name: "moveShape".to_string(),
                params: json!({"shapeId": "ghost", "x": 0.0, "y": 0.0}),
            },
            ToolCall {
                name: "createRectangle".to_string(),
                params: json!({"x": 0.0, "y": 0.0}),
            },
        ];
        let outcomes = engine.execute_all(&mut store, &calls);
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].success);
        assert!(outcomes[1].success);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_tool_call_wire_shape() {
        let call: ToolCall =
            serde_json::from_value(json!({"name": "createCircle", "params": {"radius": 10.0}}))
                .expect("decode");
        assert_eq!(call.name, "createCircle");
        assert_eq!(call.params["radius"], json!(10.0));

        // params may be omitted entirely
        let bare: ToolCall = serde_json::from_value(json!({"name": "getCanvasState"})).expect("decode");
        assert!(bare.params.is_null());
    }
}
