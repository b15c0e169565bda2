//! Layout family: reposition a set of shapes in one transaction.
//!
//! Ids are resolved to live shapes first; ids that no longer resolve are
//! skipped silently. An operation fails only when the surviving candidate set
//! is empty (or below 2 for distribution). Packing math needs a footprint,
//! and radius- and point-based variants store no width/height, so those fall
//! back to a nominal extent.

use super::{opt_f64, req_id_list, req_str, Engine, EngineError};
use crate::now_millis;
use crate::shapes::Shape;
use crate::store::ShapeStore;
use serde_json::{json, Value};
use std::cmp::Ordering;

const DEFAULT_SPACING: f64 = 20.0;
const FALLBACK_EXTENT: f64 = 100.0;

fn resolve(store: &ShapeStore, ids: &[String]) -> Vec<Shape> {
    ids.iter().filter_map(|id| store.get(id)).collect()
}

fn width_hint(shape: &Shape) -> f64 {
    let (w, _) = shape.extent();
    if w > 0.0 { w } else { FALLBACK_EXTENT }
}

fn height_hint(shape: &Shape) -> f64 {
    let (_, h) = shape.extent();
    if h > 0.0 { h } else { FALLBACK_EXTENT }
}

fn no_candidates() -> EngineError {
    EngineError::Validation("none of the shape ids resolve".to_string())
}

/// Write the repositioned set atomically and report the new positions.
fn commit(
    engine: &Engine,
    store: &mut ShapeStore,
    shapes: Vec<Shape>,
) -> Result<Value, EngineError> {
    let now = now_millis();
    let mut positions = Vec::with_capacity(shapes.len());
    let mut batch = Vec::with_capacity(shapes.len());
    for mut shape in shapes {
        shape.touch(now);
        positions.push(json!({ "id": shape.id, "x": shape.x, "y": shape.y }));
        batch.push(shape);
    }
    store.transact(engine.origin(), |txn| {
        for shape in batch {
            txn.set(shape);
        }
    })?;
    Ok(json!({ "count": positions.len(), "positions": positions }))
}

pub(super) fn arrange_horizontal(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let ids = req_id_list(params, "shapeIds")?;
    let mut shapes = resolve(store, &ids);
    if shapes.is_empty() {
        return Err(no_candidates());
    }
    let spacing = opt_f64(params, "spacing").unwrap_or(DEFAULT_SPACING);
    let start_y = opt_f64(params, "startY").unwrap_or(shapes[0].y);
    let mut cursor = opt_f64(params, "startX").unwrap_or(shapes[0].x);

    for shape in &mut shapes {
        shape.x = cursor;
        shape.y = start_y;
        cursor += width_hint(shape) + spacing;
    }
    commit(engine, store, shapes)
}

pub(super) fn arrange_vertical(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let ids = req_id_list(params, "shapeIds")?;
    let mut shapes = resolve(store, &ids);
    if shapes.is_empty() {
        return Err(no_candidates());
    }
    let spacing = opt_f64(params, "spacing").unwrap_or(DEFAULT_SPACING);
    let start_x = opt_f64(params, "startX").unwrap_or(shapes[0].x);
    let mut cursor = opt_f64(params, "startY").unwrap_or(shapes[0].y);

    for shape in &mut shapes {
        shape.x = start_x;
        shape.y = cursor;
        cursor += height_hint(shape) + spacing;
    }
    commit(engine, store, shapes)
}

pub(super) fn arrange_grid(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let ids = req_id_list(params, "shapeIds")?;
    let columns = params
        .get("columns")
        .and_then(Value::as_u64)
        .ok_or_else(|| super::missing("columns"))? as usize;
    if columns == 0 {
        return Err(EngineError::Validation(
            "columns must be at least 1".to_string(),
        ));
    }

    let mut shapes = resolve(store, &ids);
    if shapes.is_empty() {
        return Err(no_candidates());
    }
    let spacing = opt_f64(params, "spacing").unwrap_or(DEFAULT_SPACING);
    let start_x = opt_f64(params, "startX").unwrap_or(shapes[0].x);
    let start_y = opt_f64(params, "startY").unwrap_or(shapes[0].y);

    // Uniform cells sized by the largest member.
    let cell_w = shapes.iter().map(width_hint).fold(0.0, f64::max) + spacing;
    let cell_h = shapes.iter().map(height_hint).fold(0.0, f64::max) + spacing;

    for (i, shape) in shapes.iter_mut().enumerate() {
        let row = i / columns;
        let col = i % columns;
        shape.x = start_x + col as f64 * cell_w;
        shape.y = start_y + row as f64 * cell_h;
    }
    commit(engine, store, shapes)
}

pub(super) fn distribute_shapes(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let ids = req_id_list(params, "shapeIds")?;
    let axis = req_str(params, "axis")?;
    if axis != "horizontal" && axis != "vertical" {
        return Err(EngineError::Validation(
            "axis must be horizontal or vertical".to_string(),
        ));
    }

    let mut shapes = resolve(store, &ids);
    if shapes.len() < 2 {
        return Err(EngineError::Validation(
            "distributeShapes requires at least 2 resolvable shapes".to_string(),
        ));
    }

    let horizontal = axis == "horizontal";
    shapes.sort_by(|a, b| {
        let (lhs, rhs) = if horizontal { (a.x, b.x) } else { (a.y, b.y) };
        lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal)
    });

    let first = if horizontal { shapes[0].x } else { shapes[0].y };
    let last_shape = &shapes[shapes.len() - 1];
    let last = if horizontal { last_shape.x } else { last_shape.y };
    let step = (last - first) / (shapes.len() - 1) as f64;

    for (i, shape) in shapes.iter_mut().enumerate() {
        let coord = first + step * i as f64;
        if horizontal {
            shape.x = coord;
        } else {
            shape.y = coord;
        }
    }
    commit(engine, store, shapes)
}

pub(super) fn align_shapes(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let ids = req_id_list(params, "shapeIds")?;
    let alignment = req_str(params, "alignment")?;

    let mut shapes = resolve(store, &ids);
    if shapes.is_empty() {
        return Err(no_candidates());
    }

    match alignment {
        "left" => {
            let edge = shapes.iter().map(|s| s.x).fold(f64::INFINITY, f64::min);
            for shape in &mut shapes {
                shape.x = edge;
            }
        }
        "right" => {
            let edge = shapes
                .iter()
                .map(|s| s.x + s.extent().0)
                .fold(f64::NEG_INFINITY, f64::max);
            for shape in &mut shapes {
                shape.x = edge - shape.extent().0;
            }
        }
        "top" => {
            let edge = shapes.iter().map(|s| s.y).fold(f64::INFINITY, f64::min);
            for shape in &mut shapes {
                shape.y = edge;
            }
        }
        "bottom" => {
            let edge = shapes
                .iter()
                .map(|s| s.y + s.extent().1)
                .fold(f64::NEG_INFINITY, f64::max);
            for shape in &mut shapes {
                shape.y = edge - shape.extent().1;
            }
        }
        "center" => {
            let left = shapes.iter().map(|s| s.x).fold(f64::INFINITY, f64::min);
            let right = shapes
                .iter()
                .map(|s| s.x + s.extent().0)
                .fold(f64::NEG_INFINITY, f64::max);
            let mid = (left + right) / 2.0;
            for shape in &mut shapes {
                shape.x = mid - shape.extent().0 / 2.0;
            }
        }
        "middle" => {
            let top = shapes.iter().map(|s| s.y).fold(f64::INFINITY, f64::min);
            let bottom = shapes
                .iter()
                .map(|s| s.y + s.extent().1)
                .fold(f64::NEG_INFINITY, f64::max);
            let mid = (top + bottom) / 2.0;
            for shape in &mut shapes {
                shape.y = mid - shape.extent().1 / 2.0;
            }
        }
        other => {
            return Err(EngineError::Validation(format!(
                "alignment must be one of left, right, top, bottom, center, middle (got {other})"
            )))
        }
    }
    commit(engine, store, shapes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::ShapeKind;
    use serde_json::json;

    fn seed(store: &mut ShapeStore, kind: ShapeKind, x: f64, y: f64) -> String {
        let z = store.len() as i64;
        let shape = Shape::new(kind, x, y, z, "alice");
        let id = shape.id.clone();
        store.set(shape).expect("seed");
        id
    }

    fn rect_at(store: &mut ShapeStore, x: f64, y: f64) -> String {
        seed(
            store,
            ShapeKind::Rectangle {
                width: 150.0,
                height: 100.0,
            },
            x,
            y,
        )
    }

    fn x_of(store: &ShapeStore, id: &str) -> f64 {
        store.get(id).expect("present").x
    }

    fn y_of(store: &ShapeStore, id: &str) -> f64 {
        store.get(id).expect("present").y
    }

    #[test]
    fn test_horizontal_packing_advances_by_extent() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        let a = rect_at(&mut store, 500.0, 500.0);
        let b = rect_at(&mut store, 0.0, 0.0);

        arrange_horizontal(
            &engine,
            &mut store,
            &json!({"shapeIds": [a, b], "startX": 10.0, "startY": 20.0}),
        )
        .expect("arrange");

        assert!((x_of(&store, &a) - 10.0).abs() < f64::EPSILON);
        assert!((y_of(&store, &a) - 20.0).abs() < f64::EPSILON);
        // 10 + 150 + default spacing 20
        assert!((x_of(&store, &b) - 180.0).abs() < f64::EPSILON);
        assert!((y_of(&store, &b) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_packing_falls_back_for_radius_variants() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        let a = seed(&mut store, ShapeKind::Circle { radius: 40.0 }, 0.0, 0.0);
        let b = seed(&mut store, ShapeKind::Circle { radius: 40.0 }, 9.0, 9.0);

        arrange_horizontal(
            &engine,
            &mut store,
            &json!({"shapeIds": [a, b], "startX": 0.0, "startY": 0.0}),
        )
        .expect("arrange");
        assert!((x_of(&store, &b) - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_vertical_packing() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        let a = rect_at(&mut store, 0.0, 0.0);
        let b = rect_at(&mut store, 50.0, 50.0);

        arrange_vertical(
            &engine,
            &mut store,
            &json!({"shapeIds": [a, b], "startX": 0.0, "startY": 0.0, "spacing": 10.0}),
        )
        .expect("arrange");
        assert!((y_of(&store, &b) - 110.0).abs() < f64::EPSILON);
        assert!((x_of(&store, &b) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_grid_is_row_major() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        let a = rect_at(&mut store, 0.0, 0.0);
        let b = rect_at(&mut store, 0.0, 0.0);
        let c = rect_at(&mut store, 0.0, 0.0);

        arrange_grid(
            &engine,
            &mut store,
            &json!({
                "shapeIds": [a, b, c],
                "columns": 2,
                "startX": 0.0,
                "startY": 0.0,
                "spacing": 10.0
            }),
        )
        .expect("arrange");

        // cells are 160 x 110
        assert!((x_of(&store, &a) - 0.0).abs() < f64::EPSILON);
        assert!((x_of(&store, &b) - 160.0).abs() < f64::EPSILON);
        assert!((x_of(&store, &c) - 0.0).abs() < f64::EPSILON);
        assert!((y_of(&store, &c) - 110.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_grid_requires_columns() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        let a = rect_at(&mut store, 0.0, 0.0);

        let err = arrange_grid(&engine, &mut store, &json!({"shapeIds": [a.clone()]}))
            .expect_err("missing columns");
        assert_eq!(err.to_string(), "missing required parameter: columns");

        let err = arrange_grid(
            &engine,
            &mut store,
            &json!({"shapeIds": [a], "columns": 0}),
        )
        .expect_err("zero columns");
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_distribute_spaces_evenly_between_endpoints() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        let a = rect_at(&mut store, 0.0, 0.0);
        let b = rect_at(&mut store, 90.0, 0.0);
        let c = rect_at(&mut store, 30.0, 0.0);

        distribute_shapes(
            &engine,
            &mut store,
            &json!({"shapeIds": [a, b, c], "axis": "horizontal"}),
        )
        .expect("distribute");

        assert!((x_of(&store, &a) - 0.0).abs() < f64::EPSILON);
        assert!((x_of(&store, &c) - 45.0).abs() < f64::EPSILON);
        assert!((x_of(&store, &b) - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_distribute_needs_two_and_a_real_axis() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        let a = rect_at(&mut store, 0.0, 0.0);

        let err = distribute_shapes(
            &engine,
            &mut store,
            &json!({"shapeIds": [a.clone()], "axis": "horizontal"}),
        )
        .expect_err("one shape");
        assert!(err.to_string().contains("at least 2"));

        let b = rect_at(&mut store, 10.0, 0.0);
        let err = distribute_shapes(
            &engine,
            &mut store,
            &json!({"shapeIds": [a, b], "axis": "diagonal"}),
        )
        .expect_err("bad axis");
        assert!(err.to_string().contains("horizontal or vertical"));
    }

    #[test]
    fn test_align_left_snaps_to_minimum_x() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        let a = rect_at(&mut store, 10.0, 0.0);
        let b = rect_at(&mut store, 50.0, 10.0);
        let c = rect_at(&mut store, 90.0, 20.0);

        align_shapes(
            &engine,
            &mut store,
            &json!({"shapeIds": [a.clone(), b.clone(), c.clone()], "alignment": "left"}),
        )
        .expect("align");

        for id in [&a, &b, &c] {
            assert!((x_of(&store, id) - 10.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_align_right_respects_extents() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        let wide = rect_at(&mut store, 0.0, 0.0);
        let narrow = seed(
            &mut store,
            ShapeKind::Image {
                src: "x.png".to_string(),
                width: 50.0,
                height: 50.0,
            },
            200.0,
            0.0,
        );

        align_shapes(
            &engine,
            &mut store,
            &json!({"shapeIds": [wide.clone(), narrow.clone()], "alignment": "right"}),
        )
        .expect("align");

        // right edge is max(0 + 150, 200 + 50) = 250
        assert!((x_of(&store, &wide) - 100.0).abs() < f64::EPSILON);
        assert!((x_of(&store, &narrow) - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unresolved_ids_are_skipped_silently() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        let a = rect_at(&mut store, 30.0, 0.0);

        let result = align_shapes(
            &engine,
            &mut store,
            &json!({"shapeIds": [a, "ghost"], "alignment": "left"}),
        )
        .expect("align");
        assert_eq!(result["count"], json!(1));
    }

    #[test]
    fn test_empty_candidate_set_fails() {
        let engine = Engine::new();
        let mut store = ShapeStore::new();
        let err = align_shapes(
            &engine,
            &mut store,
            &json!({"shapeIds": ["ghost"], "alignment": "left"}),
        )
        .expect_err("nothing to align");
        assert!(matches!(err, EngineError::Validation(_)));

        let err = align_shapes(&engine, &mut store, &json!({"shapeIds": [], "alignment": "left"}))
            .expect_err("empty list");
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
