//! Creation family: one operation per shape variant.
//!
//! Omitted optional fields take the documented defaults. Every created shape
//! gets a fresh id, z order equal to the store size at creation, creator
//! `"automation"` and a creation timestamp of now.

use super::{opt_color, opt_f64, opt_str, opt_u32, req_str, Engine, EngineError};
use crate::shapes::{
    Shape, ShapeKind, DEFAULT_CIRCLE_RADIUS, DEFAULT_ELLIPSE_RADIUS_X, DEFAULT_ELLIPSE_RADIUS_Y,
    DEFAULT_FILL, DEFAULT_FONT_SIZE, DEFAULT_IMAGE_HEIGHT, DEFAULT_IMAGE_WIDTH, DEFAULT_LINE_STROKE,
    DEFAULT_POLYGON_RADIUS, DEFAULT_POLYGON_SIDES, DEFAULT_RECT_HEIGHT, DEFAULT_RECT_WIDTH,
    DEFAULT_STAR_INNER_RADIUS, DEFAULT_STAR_OUTER_RADIUS, DEFAULT_STAR_POINTS, DEFAULT_STROKE_WIDTH,
    DEFAULT_TEXT_FILL,
};
use crate::store::ShapeStore;
use serde_json::Value;

const DEFAULT_POSITION: f64 = 100.0;

fn build(engine: &Engine, store: &ShapeStore, kind: ShapeKind, params: &Value) -> Shape {
    let x = opt_f64(params, "x").unwrap_or(DEFAULT_POSITION);
    let y = opt_f64(params, "y").unwrap_or(DEFAULT_POSITION);
    Shape::new(kind, x, y, store.len() as i64, engine.creator())
}

fn apply_style(shape: &mut Shape, params: &Value) -> Result<(), EngineError> {
    if let Some(fill) = opt_color(params, "fill")? {
        shape.fill = Some(fill);
    }
    if let Some(stroke) = opt_color(params, "stroke")? {
        shape.stroke = Some(stroke);
    }
    if let Some(width) = opt_f64(params, "strokeWidth") {
        shape.stroke_width = Some(width);
    }
    if let Some(opacity) = opt_f64(params, "opacity") {
        shape.opacity = opacity.clamp(0.0, 1.0);
    }
    if let Some(degrees) = opt_f64(params, "rotation") {
        shape.set_rotation(degrees);
    }
    Ok(())
}

pub(super) fn rectangle(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let kind = ShapeKind::Rectangle {
        width: opt_f64(params, "width").unwrap_or(DEFAULT_RECT_WIDTH),
        height: opt_f64(params, "height").unwrap_or(DEFAULT_RECT_HEIGHT),
    };
    let mut shape = build(engine, store, kind, params);
    shape.fill = Some(DEFAULT_FILL);
    apply_style(&mut shape, params)?;
    engine.write(store, shape)
}

pub(super) fn circle(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let kind = ShapeKind::Circle {
        radius: opt_f64(params, "radius").unwrap_or(DEFAULT_CIRCLE_RADIUS),
    };
    let mut shape = build(engine, store, kind, params);
    shape.fill = Some(DEFAULT_FILL);
    apply_style(&mut shape, params)?;
    engine.write(store, shape)
}

pub(super) fn ellipse(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let kind = ShapeKind::Ellipse {
        radius_x: opt_f64(params, "radiusX").unwrap_or(DEFAULT_ELLIPSE_RADIUS_X),
        radius_y: opt_f64(params, "radiusY").unwrap_or(DEFAULT_ELLIPSE_RADIUS_Y),
    };
    let mut shape = build(engine, store, kind, params);
    shape.fill = Some(DEFAULT_FILL);
    apply_style(&mut shape, params)?;
    engine.write(store, shape)
}

pub(super) fn line(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let points = line_points(params)?;
    let mut shape = build(engine, store, ShapeKind::Line { points }, params);
    shape.stroke = Some(DEFAULT_LINE_STROKE);
    shape.stroke_width = Some(DEFAULT_STROKE_WIDTH);
    apply_style(&mut shape, params)?;
    engine.write(store, shape)
}

fn line_points(params: &Value) -> Result<Vec<[f64; 2]>, EngineError> {
    let raw = params
        .get("points")
        .and_then(Value::as_array)
        .ok_or_else(|| super::missing("points"))?;
    let mut points = Vec::with_capacity(raw.len());
    for entry in raw {
        let pair = entry
            .as_array()
            .filter(|p| p.len() == 2)
            .and_then(|p| Some([p[0].as_f64()?, p[1].as_f64()?]));
        match pair {
            Some(point) => points.push(point),
            None => {
                return Err(EngineError::Validation(
                    "points must be an array of [x, y] number pairs".to_string(),
                ))
            }
        }
    }
    if points.len() < 2 {
        return Err(EngineError::Validation(
            "points must contain at least 2 [x, y] pairs".to_string(),
        ));
    }
    Ok(points)
}

pub(super) fn text(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let kind = ShapeKind::Text {
        text: req_str(params, "text")?.to_string(),
        font_size: opt_f64(params, "fontSize").unwrap_or(DEFAULT_FONT_SIZE),
        font_family: opt_str(params, "fontFamily").map(str::to_string),
    };
    let mut shape = build(engine, store, kind, params);
    shape.fill = Some(DEFAULT_TEXT_FILL);
    apply_style(&mut shape, params)?;
    engine.write(store, shape)
}

pub(super) fn polygon(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let sides = opt_u32(params, "sides").unwrap_or(DEFAULT_POLYGON_SIDES);
    if sides < 3 {
        return Err(EngineError::Validation(
            "sides must be at least 3".to_string(),
        ));
    }
    let kind = ShapeKind::Polygon {
        sides,
        radius: opt_f64(params, "radius").unwrap_or(DEFAULT_POLYGON_RADIUS),
    };
    let mut shape = build(engine, store, kind, params);
    shape.fill = Some(DEFAULT_FILL);
    apply_style(&mut shape, params)?;
    engine.write(store, shape)
}

pub(super) fn star(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let points = opt_u32(params, "points").unwrap_or(DEFAULT_STAR_POINTS);
    if points < 3 {
        return Err(EngineError::Validation(
            "points must be at least 3".to_string(),
        ));
    }
    let kind = ShapeKind::Star {
        points,
        inner_radius: opt_f64(params, "innerRadius").unwrap_or(DEFAULT_STAR_INNER_RADIUS),
        outer_radius: opt_f64(params, "outerRadius").unwrap_or(DEFAULT_STAR_OUTER_RADIUS),
    };
    let mut shape = build(engine, store, kind, params);
    shape.fill = Some(DEFAULT_FILL);
    apply_style(&mut shape, params)?;
    engine.write(store, shape)
}

pub(super) fn image(
    engine: &Engine,
    store: &mut ShapeStore,
    params: &Value,
) -> Result<Value, EngineError> {
    let kind = ShapeKind::Image {
        src: req_str(params, "src")?.to_string(),
        width: opt_f64(params, "width").unwrap_or(DEFAULT_IMAGE_WIDTH),
        height: opt_f64(params, "height").unwrap_or(DEFAULT_IMAGE_HEIGHT),
    };
    let mut shape = build(engine, store, kind, params);
    apply_style(&mut shape, params)?;
    engine.write(store, shape)
}
