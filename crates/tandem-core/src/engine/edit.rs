//! Manipulation and query families.
//!
//! Every manipulation re-reads its shape by id first and fails with
//! `NotFound` before any write, so a bad id has no partial effect. Queries
//! never mutate state or timestamps.

use super::{opt_color, opt_f64, req_color, req_f64, req_str, Engine, EngineError};
use crate::now_millis;
use crate::shapes::{new_shape_id, ShapeKind};
use crate::store::ShapeStore;
use serde_json::{json, Value};

const DEFAULT_DUPLICATE_OFFSET: f64 = 20.0;

pub(super) fn move_shape(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let id = req_str(params, "shapeId")?;
    let x = req_f64(params, "x")?;
    let y = req_f64(params, "y")?;
    let mut shape = engine.require(store, id)?;
    shape.x = x;
    shape.y = y;
    shape.touch(now_millis());
    engine.write(store, shape)
}

/// Size fields are routed by variant: width/height land on rectangles and
/// images, radii on the radius-bearing variants, font size on text. Fields
/// that do not apply to the variant are ignored; if nothing applied the
/// call is rejected.
pub(super) fn resize_shape(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let id = req_str(params, "shapeId")?;
    let mut shape = engine.require(store, id)?;

    let mut touched = false;
    match &mut shape.kind {
        ShapeKind::Rectangle { width, height } | ShapeKind::Image { width, height, .. } => {
            if let Some(w) = opt_f64(params, "width") {
                *width = w;
                touched = true;
            }
            if let Some(h) = opt_f64(params, "height") {
                *height = h;
                touched = true;
            }
        }
        ShapeKind::Circle { radius } | ShapeKind::Polygon { radius, .. } => {
            if let Some(r) = opt_f64(params, "radius") {
                *radius = r;
                touched = true;
            }
        }
        ShapeKind::Ellipse { radius_x, radius_y } => {
            if let Some(r) = opt_f64(params, "radiusX") {
                *radius_x = r;
                touched = true;
            }
            if let Some(r) = opt_f64(params, "radiusY") {
                *radius_y = r;
                touched = true;
            }
        }
        ShapeKind::Star {
            inner_radius,
            outer_radius,
            ..
        } => {
            if let Some(r) = opt_f64(params, "innerRadius") {
                *inner_radius = r;
                touched = true;
            }
            if let Some(r) = opt_f64(params, "outerRadius") {
                *outer_radius = r;
                touched = true;
            }
        }
        ShapeKind::Text { font_size, .. } => {
            if let Some(size) = opt_f64(params, "fontSize") {
                *font_size = size;
                touched = true;
            }
        }
        ShapeKind::Line { .. } => {}
    }

    if !touched {
        return Err(EngineError::Validation(format!(
            "no applicable size parameters for {}",
            shape.type_name()
        )));
    }
    shape.touch(now_millis());
    engine.write(store, shape)
}

pub(super) fn rotate_shape(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let id = req_str(params, "shapeId")?;
    let degrees = req_f64(params, "rotation")?;
    let mut shape = engine.require(store, id)?;
    shape.set_rotation(degrees);
    shape.touch(now_millis());
    engine.write(store, shape)
}

pub(super) fn change_shape_color(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let id = req_str(params, "shapeId")?;
    let fill = opt_color(params, "fill")?;
    let stroke = opt_color(params, "stroke")?;
    if fill.is_none() && stroke.is_none() {
        return Err(EngineError::Validation(
            "changeShapeColor needs fill or stroke".to_string(),
        ));
    }

    let mut shape = engine.require(store, id)?;
    if let Some(color) = fill {
        shape.fill = Some(color);
    }
    if let Some(color) = stroke {
        shape.stroke = Some(color);
    }
    shape.touch(now_millis());
    engine.write(store, shape)
}

pub(super) fn delete_shape(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let id = req_str(params, "shapeId")?;
    engine.require(store, id)?;
    let id = id.to_string();
    let doomed = id.clone();
    store.transact(engine.origin(), |txn| txn.delete(doomed))?;
    Ok(json!({ "id": id, "deleted": true }))
}

pub(super) fn duplicate_shape(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let id = req_str(params, "shapeId")?;
    let mut copy = engine.require(store, id)?;
    copy.id = new_shape_id();
    copy.x += opt_f64(params, "offsetX").unwrap_or(DEFAULT_DUPLICATE_OFFSET);
    copy.y += opt_f64(params, "offsetY").unwrap_or(DEFAULT_DUPLICATE_OFFSET);
    copy.z_index = store.len() as i64;
    copy.created_by = engine.creator().to_string();
    copy.created_at = now_millis();
    copy.updated_at = None;
    copy.dragged_by = None;
    engine.write(store, copy)
}

pub(super) fn bring_to_front(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let id = req_str(params, "shapeId")?;
    let mut shape = engine.require(store, id)?;
    let top = store.list().iter().map(|s| s.z_index).max().unwrap_or(0);
    shape.z_index = top + 1;
    shape.touch(now_millis());
    engine.write(store, shape)
}

pub(super) fn send_to_back(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let id = req_str(params, "shapeId")?;
    let mut shape = engine.require(store, id)?;
    let bottom = store.list().iter().map(|s| s.z_index).min().unwrap_or(0);
    shape.z_index = bottom - 1;
    shape.touch(now_millis());
    engine.write(store, shape)
}

pub(super) fn get_canvas_state(store: &ShapeStore) -> Result<Value, EngineError> {
    let shapes = store.list();
    Ok(json!({
        "count": shapes.len(),
        "shapes": serde_json::to_value(shapes)?,
    }))
}

pub(super) fn find_shapes_by_type(
    store: &ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let wanted = req_str(params, "type")?;
    if !ShapeKind::all_type_names().contains(&wanted) {
        return Err(EngineError::Validation(format!(
            "unknown shape type: {wanted}"
        )));
    }
    let shapes: Vec<_> = store
        .list()
        .into_iter()
        .filter(|s| s.type_name() == wanted)
        .collect();
    Ok(json!({
        "count": shapes.len(),
        "shapes": serde_json::to_value(shapes)?,
    }))
}

pub(super) fn find_shapes_by_color(
    store: &ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let wanted = req_color(params, "color")?;
    let shapes: Vec<_> = store
        .list()
        .into_iter()
        .filter(|s| s.fill == Some(wanted))
        .collect();
    Ok(json!({
        "count": shapes.len(),
        "shapes": serde_json::to_value(shapes)?,
    }))
}
