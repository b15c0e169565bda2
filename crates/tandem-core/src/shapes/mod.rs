//! Shape records for the shared canvas.
//!
//! A shape is one flat record: common fields shared by every variant plus a
//! closed tagged union carrying variant-specific geometry. Records are always
//! rewritten whole, never field-by-field, so conflict resolution stays at the
//! record level.

mod color;

pub use color::{Color, ParseColorError};

use crate::now_millis;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique shape identifier. Assigned once at creation, never reused.
pub type ShapeId = String;

/// Mint a fresh shape id.
pub fn new_shape_id() -> ShapeId {
    Uuid::new_v4().to_string()
}

pub const DEFAULT_RECT_WIDTH: f64 = 150.0;
pub const DEFAULT_RECT_HEIGHT: f64 = 100.0;
pub const DEFAULT_CIRCLE_RADIUS: f64 = 50.0;
pub const DEFAULT_ELLIPSE_RADIUS_X: f64 = 75.0;
pub const DEFAULT_ELLIPSE_RADIUS_Y: f64 = 50.0;
pub const DEFAULT_FONT_SIZE: f64 = 24.0;
pub const DEFAULT_POLYGON_SIDES: u32 = 6;
pub const DEFAULT_POLYGON_RADIUS: f64 = 50.0;
pub const DEFAULT_STAR_POINTS: u32 = 5;
pub const DEFAULT_STAR_INNER_RADIUS: f64 = 25.0;
pub const DEFAULT_STAR_OUTER_RADIUS: f64 = 50.0;
pub const DEFAULT_IMAGE_WIDTH: f64 = 150.0;
pub const DEFAULT_IMAGE_HEIGHT: f64 = 100.0;

/// Default fill for filled variants created without an explicit color.
pub const DEFAULT_FILL: Color = Color::rgb(0x3b, 0x82, 0xf6);
/// Default fill for text, which reads badly in the accent blue.
pub const DEFAULT_TEXT_FILL: Color = Color::rgb(0x11, 0x18, 0x27);
/// Default stroke for line shapes.
pub const DEFAULT_LINE_STROKE: Color = Color::rgb(0x3b, 0x82, 0xf6);
pub const DEFAULT_STROKE_WIDTH: f64 = 2.0;

/// Variant-specific geometry. The `type` tag travels inline with the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeKind {
    Rectangle {
        width: f64,
        height: f64,
    },
    Circle {
        radius: f64,
    },
    #[serde(rename_all = "camelCase")]
    Ellipse {
        radius_x: f64,
        radius_y: f64,
    },
    /// Polyline; points are offsets from the record position.
    Line {
        points: Vec<[f64; 2]>,
    },
    #[serde(rename_all = "camelCase")]
    Text {
        text: String,
        font_size: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_family: Option<String>,
    },
    /// Regular polygon described by side count and circumscribed radius.
    Polygon {
        sides: u32,
        radius: f64,
    },
    #[serde(rename_all = "camelCase")]
    Star {
        points: u32,
        inner_radius: f64,
        outer_radius: f64,
    },
    Image {
        src: String,
        width: f64,
        height: f64,
    },
}

impl ShapeKind {
    /// The wire name of this variant, matching the serialized `type` tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            ShapeKind::Rectangle { .. } => "rectangle",
            ShapeKind::Circle { .. } => "circle",
            ShapeKind::Ellipse { .. } => "ellipse",
            ShapeKind::Line { .. } => "line",
            ShapeKind::Text { .. } => "text",
            ShapeKind::Polygon { .. } => "polygon",
            ShapeKind::Star { .. } => "star",
            ShapeKind::Image { .. } => "image",
        }
    }

    /// All valid `type` tag values.
    pub fn all_type_names() -> [&'static str; 8] {
        [
            "rectangle", "circle", "ellipse", "line", "text", "polygon", "star", "image",
        ]
    }
}

/// One canvas shape: common record fields plus variant geometry, serialized
/// flat (the variant tag and fields sit beside the common fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    pub id: ShapeId,
    #[serde(flatten)]
    pub kind: ShapeKind,
    pub x: f64,
    pub y: f64,
    /// Orderable draw index; not required to be contiguous or unique.
    pub z_index: i64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Degrees in [0, 360).
    #[serde(default)]
    pub rotation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    pub created_by: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
    /// Connection id of the peer currently manipulating this shape, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dragged_by: Option<String>,
}

fn default_opacity() -> f64 {
    1.0
}

/// Wrap a rotation in degrees into [0, 360).
pub fn normalize_rotation(degrees: f64) -> f64 {
    degrees.rem_euclid(360.0)
}

impl Shape {
    /// Create a shape with a fresh id, stamped with the current time.
    pub fn new(kind: ShapeKind, x: f64, y: f64, z_index: i64, created_by: impl Into<String>) -> Self {
        Self {
            id: new_shape_id(),
            kind,
            x,
            y,
            z_index,
            opacity: 1.0,
            rotation: 0.0,
            fill: None,
            stroke: None,
            stroke_width: None,
            created_by: created_by.into(),
            created_at: now_millis(),
            updated_at: None,
            dragged_by: None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Width/height as stored on the record. Radius- and point-based variants
    /// report zero extent; layout math treats their position as the footprint.
    pub fn extent(&self) -> (f64, f64) {
        match &self.kind {
            ShapeKind::Rectangle { width, height } | ShapeKind::Image { width, height, .. } => {
                (*width, *height)
            }
            _ => (0.0, 0.0),
        }
    }

    /// Set rotation, wrapped into [0, 360).
    pub fn set_rotation(&mut self, degrees: f64) {
        self.rotation = normalize_rotation(degrees);
    }

    /// Fold accumulated scale factors into the intrinsic size fields so the
    /// stored dimensions stay true sizes, never pending multipliers.
    ///
    /// Widths, radii and x offsets take `sx`; heights, font size and y offsets
    /// take `sy`. Single-radius variants take `sx` (uniform gestures pass the
    /// same factor on both axes).
    pub fn bake_scale(&mut self, sx: f64, sy: f64) {
        match &mut self.kind {
            ShapeKind::Rectangle { width, height } | ShapeKind::Image { width, height, .. } => {
                *width *= sx;
                *height *= sy;
            }
            ShapeKind::Ellipse { radius_x, radius_y } => {
                *radius_x *= sx;
                *radius_y *= sy;
            }
            ShapeKind::Circle { radius } | ShapeKind::Polygon { radius, .. } => {
                *radius *= sx;
            }
            ShapeKind::Star {
                inner_radius,
                outer_radius,
                ..
            } => {
                *inner_radius *= sx;
                *outer_radius *= sx;
            }
            ShapeKind::Text { font_size, .. } => {
                *font_size *= sy;
            }
            ShapeKind::Line { points } => {
                for p in points.iter_mut() {
                    p[0] *= sx;
                    p[1] *= sy;
                }
            }
        }
    }

    /// Record a modification time.
    pub fn touch(&mut self, now_ms: u64) {
        self.updated_at = Some(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64) -> Shape {
        Shape::new(
            ShapeKind::Rectangle {
                width: DEFAULT_RECT_WIDTH,
                height: DEFAULT_RECT_HEIGHT,
            },
            x,
            y,
            0,
            "test",
        )
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        let a = rect(0.0, 0.0);
        let b = rect(0.0, 0.0);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_normalize_rotation() {
        assert!((normalize_rotation(370.0) - 10.0).abs() < f64::EPSILON);
        assert!((normalize_rotation(-90.0) - 270.0).abs() < f64::EPSILON);
        assert!((normalize_rotation(720.0)).abs() < f64::EPSILON);
        assert!((normalize_rotation(359.5) - 359.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bake_scale_rectangle() {
        let mut s = rect(10.0, 10.0);
        s.bake_scale(2.0, 0.5);
        assert_eq!(
            s.kind,
            ShapeKind::Rectangle {
                width: 300.0,
                height: 50.0
            }
        );
    }

    #[test]
    fn test_bake_scale_radius_and_text() {
        let mut c = Shape::new(ShapeKind::Circle { radius: 40.0 }, 0.0, 0.0, 0, "test");
        c.bake_scale(1.5, 1.5);
        assert_eq!(c.kind, ShapeKind::Circle { radius: 60.0 });

        let mut t = Shape::new(
            ShapeKind::Text {
                text: "hi".to_string(),
                font_size: 24.0,
                font_family: None,
            },
            0.0,
            0.0,
            0,
            "test",
        );
        t.bake_scale(1.0, 2.0);
        match t.kind {
            ShapeKind::Text { font_size, .. } => assert!((font_size - 48.0).abs() < f64::EPSILON),
            _ => panic!("variant changed"),
        }
    }

    #[test]
    fn test_extent_only_for_sized_variants() {
        assert_eq!(rect(0.0, 0.0).extent(), (150.0, 100.0));
        let c = Shape::new(ShapeKind::Circle { radius: 40.0 }, 0.0, 0.0, 0, "test");
        assert_eq!(c.extent(), (0.0, 0.0));
    }

    #[test]
    fn test_serialized_record_is_flat() {
        let mut s = rect(5.0, 6.0);
        s.fill = Some(DEFAULT_FILL);
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["type"], "rectangle");
        assert_eq!(v["width"], 150.0);
        assert_eq!(v["zIndex"], 0);
        assert_eq!(v["createdBy"], "test");
        assert_eq!(v["fill"], "#3b82f6");
        // absent optionals stay off the wire
        assert!(v.get("draggedBy").is_none());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let raw = r#"{
            "id": "s1", "type": "circle", "radius": 30.0,
            "x": 1.0, "y": 2.0, "zIndex": 3,
            "createdBy": "alice", "createdAt": 1000
        }"#;
        let s: Shape = serde_json::from_str(raw).unwrap();
        assert_eq!(s.kind, ShapeKind::Circle { radius: 30.0 });
        assert!((s.opacity - 1.0).abs() < f64::EPSILON);
        assert!((s.rotation).abs() < f64::EPSILON);
        assert!(s.dragged_by.is_none());
    }
}
