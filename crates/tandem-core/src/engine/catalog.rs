//! The fixed operation catalog, in the function-schema form instruction
//! models consume: name, description, JSON Schema parameter object.
//!
//! This is the contract the planner exposes upstream; the dispatch table in
//! `Engine::execute` is the other half and both must agree on names.

use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

pub fn is_known_tool(name: &str) -> bool {
    catalog().iter().any(|spec| spec.name == name)
}

pub fn catalog() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "createRectangle",
            description: "Create a rectangle. Defaults: 150x100 at (100,100), fill #3b82f6.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "x": { "type": "number", "description": "Left edge x" },
                    "y": { "type": "number", "description": "Top edge y" },
                    "width": { "type": "number" },
                    "height": { "type": "number" },
                    "fill": { "type": "string", "description": "Hex color like #3b82f6" },
                    "stroke": { "type": "string" },
                    "strokeWidth": { "type": "number" },
                    "opacity": { "type": "number", "description": "0 to 1" },
                    "rotation": { "type": "number", "description": "Degrees" }
                },
                "required": []
            }),
        },
        ToolSpec {
            name: "createCircle",
            description: "Create a circle. Defaults: radius 50 at (100,100), fill #3b82f6.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "x": { "type": "number", "description": "Center x" },
                    "y": { "type": "number", "description": "Center y" },
                    "radius": { "type": "number" },
                    "fill": { "type": "string" },
                    "stroke": { "type": "string" },
                    "strokeWidth": { "type": "number" },
                    "opacity": { "type": "number" },
                    "rotation": { "type": "number" }
                },
                "required": []
            }),
        },
        ToolSpec {
            name: "createEllipse",
            description: "Create an ellipse. Defaults: radii 75x50 at (100,100), fill #3b82f6.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "x": { "type": "number", "description": "Center x" },
                    "y": { "type": "number", "description": "Center y" },
                    "radiusX": { "type": "number" },
                    "radiusY": { "type": "number" },
                    "fill": { "type": "string" },
                    "stroke": { "type": "string" },
                    "strokeWidth": { "type": "number" },
                    "opacity": { "type": "number" },
                    "rotation": { "type": "number" }
                },
                "required": []
            }),
        },
        ToolSpec {
            name: "createLine",
            description: "Create a polyline from [x, y] point pairs relative to the position.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "x": { "type": "number", "description": "Origin x the points offset from" },
                    "y": { "type": "number", "description": "Origin y the points offset from" },
                    "points": {
                        "type": "array",
                        "items": {
                            "type": "array",
                            "items": { "type": "number" },
                            "minItems": 2,
                            "maxItems": 2
                        },
                        "minItems": 2,
                        "description": "At least two [x, y] pairs"
                    },
                    "stroke": { "type": "string" },
                    "strokeWidth": { "type": "number" },
                    "opacity": { "type": "number" }
                },
                "required": ["points"]
            }),
        },
        ToolSpec {
            name: "createText",
            description: "Create a text label. Defaults: font size 24, fill #111827.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "x": { "type": "number" },
                    "y": { "type": "number" },
                    "fontSize": { "type": "number" },
                    "fontFamily": { "type": "string" },
                    "fill": { "type": "string" },
                    "opacity": { "type": "number" },
                    "rotation": { "type": "number" }
                },
                "required": ["text"]
            }),
        },
        ToolSpec {
            name: "createPolygon",
            description: "Create a regular polygon. Defaults: 6 sides, radius 50, fill #3b82f6.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "x": { "type": "number", "description": "Center x" },
                    "y": { "type": "number", "description": "Center y" },
                    "sides": { "type": "integer", "minimum": 3 },
                    "radius": { "type": "number" },
                    "fill": { "type": "string" },
                    "stroke": { "type": "string" },
                    "strokeWidth": { "type": "number" },
                    "opacity": { "type": "number" },
                    "rotation": { "type": "number" }
                },
                "required": []
            }),
        },
        ToolSpec {
            name: "createStar",
            description: "Create a star. Defaults: 5 points, radii 25/50, fill #3b82f6.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "x": { "type": "number", "description": "Center x" },
                    "y": { "type": "number", "description": "Center y" },
                    "points": { "type": "integer", "minimum": 3 },
                    "innerRadius": { "type": "number" },
                    "outerRadius": { "type": "number" },
                    "fill": { "type": "string" },
                    "stroke": { "type": "string" },
                    "strokeWidth": { "type": "number" },
                    "opacity": { "type": "number" },
                    "rotation": { "type": "number" }
                },
                "required": []
            }),
        },
        ToolSpec {
            name: "createImage",
            description: "Place an image by URL. Defaults: 150x100 at (100,100).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "src": { "type": "string", "description": "Image URL" },
                    "x": { "type": "number" },
                    "y": { "type": "number" },
                    "width": { "type": "number" },
                    "height": { "type": "number" },
                    "opacity": { "type": "number" },
                    "rotation": { "type": "number" }
                },
                "required": ["src"]
            }),
        },
        ToolSpec {
            name: "moveShape",
            description: "Move a shape to an absolute position.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "shapeId": { "type": "string" },
                    "x": { "type": "number" },
                    "y": { "type": "number" }
                },
                "required": ["shapeId", "x", "y"]
            }),
        },
        ToolSpec {
            name: "resizeShape",
            description: "Resize a shape. Width/height apply to rectangles and images, radius to circles and polygons, radiusX/radiusY to ellipses, innerRadius/outerRadius to stars, fontSize to text.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "shapeId": { "type": "string" },
                    "width": { "type": "number" },
                    "height": { "type": "number" },
                    "radius": { "type": "number" },
                    "radiusX": { "type": "number" },
                    "radiusY": { "type": "number" },
                    "innerRadius": { "type": "number" },
                    "outerRadius": { "type": "number" },
                    "fontSize": { "type": "number" }
                },
                "required": ["shapeId"]
            }),
        },
        ToolSpec {
            name: "rotateShape",
            description: "Set a shape's rotation in degrees (normalized to 0-360).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "shapeId": { "type": "string" },
                    "rotation": { "type": "number" }
                },
                "required": ["shapeId", "rotation"]
            }),
        },
        ToolSpec {
            name: "changeShapeColor",
            description: "Change a shape's fill and/or stroke color.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "shapeId": { "type": "string" },
                    "fill": { "type": "string", "description": "Hex color" },
                    "stroke": { "type": "string", "description": "Hex color" }
                },
                "required": ["shapeId"]
            }),
        },
        ToolSpec {
            name: "deleteShape",
            description: "Delete a shape.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "shapeId": { "type": "string" }
                },
                "required": ["shapeId"]
            }),
        },
        ToolSpec {
            name: "duplicateShape",
            description: "Duplicate a shape with a position offset (default 20,20).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "shapeId": { "type": "string" },
                    "offsetX": { "type": "number" },
                    "offsetY": { "type": "number" }
                },
                "required": ["shapeId"]
            }),
        },
        ToolSpec {
            name: "bringToFront",
            description: "Raise a shape above everything else.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "shapeId": { "type": "string" }
                },
                "required": ["shapeId"]
            }),
        },
        ToolSpec {
            name: "sendToBack",
            description: "Push a shape behind everything else.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "shapeId": { "type": "string" }
                },
                "required": ["shapeId"]
            }),
        },
        ToolSpec {
            name: "arrangeHorizontal",
            description: "Pack shapes left to right with even spacing, in the given order.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "shapeIds": { "type": "array", "items": { "type": "string" } },
                    "startX": { "type": "number" },
                    "startY": { "type": "number" },
                    "spacing": { "type": "number", "description": "Gap between shapes, default 20" }
                },
                "required": ["shapeIds"]
            }),
        },
        ToolSpec {
            name: "arrangeVertical",
            description: "Pack shapes top to bottom with even spacing, in the given order.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "shapeIds": { "type": "array", "items": { "type": "string" } },
                    "startX": { "type": "number" },
                    "startY": { "type": "number" },
                    "spacing": { "type": "number" }
                },
                "required": ["shapeIds"]
            }),
        },
        ToolSpec {
            name: "arrangeGrid",
            description: "Pack shapes into a row-major grid with the given column count.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "shapeIds": { "type": "array", "items": { "type": "string" } },
                    "columns": { "type": "integer", "minimum": 1 },
                    "startX": { "type": "number" },
                    "startY": { "type": "number" },
                    "spacing": { "type": "number" }
                },
                "required": ["shapeIds", "columns"]
            }),
        },
        ToolSpec {
            name: "distributeShapes",
            description: "Spread shapes evenly along one axis between the two outermost shapes. Needs at least 2 shapes.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "shapeIds": { "type": "array", "items": { "type": "string" } },
                    "axis": { "type": "string", "enum": ["horizontal", "vertical"] }
                },
                "required": ["shapeIds", "axis"]
            }),
        },
        ToolSpec {
            name: "alignShapes",
            description: "Align shapes to an edge or center of their bounding set.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "shapeIds": { "type": "array", "items": { "type": "string" } },
                    "alignment": {
                        "type": "string",
                        "enum": ["left", "right", "top", "bottom", "center", "middle"]
                    }
                },
                "required": ["shapeIds", "alignment"]
            }),
        },
        ToolSpec {
            name: "getCanvasState",
            description: "List every shape on the canvas in draw order.",
            parameters: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        },
        ToolSpec {
            name: "findShapesByType",
            description: "List shapes of one variant.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "type": {
                        "type": "string",
                        "enum": ["rectangle", "circle", "ellipse", "line", "text", "polygon", "star", "image"]
                    }
                },
                "required": ["type"]
            }),
        },
        ToolSpec {
            name: "findShapesByColor",
            description: "List shapes whose fill matches a hex color.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "color": { "type": "string", "description": "Hex color like #3b82f6" }
                },
                "required": ["color"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_has_all_families() {
        let specs = catalog();
        assert_eq!(specs.len(), 24);

        let names: HashSet<&str> = specs.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), specs.len(), "duplicate tool name");
        assert!(names.contains("createRectangle"));
        assert!(names.contains("duplicateShape"));
        assert!(names.contains("arrangeGrid"));
        assert!(names.contains("findShapesByColor"));
    }

    #[test]
    fn test_schemas_are_object_shaped() {
        for spec in catalog() {
            assert_eq!(
                spec.parameters["type"], "object",
                "{} is not an object schema",
                spec.name
            );
            let props = spec.parameters["properties"]
                .as_object()
                .unwrap_or_else(|| panic!("{} has no properties object", spec.name));
            for key in spec.parameters["required"].as_array().expect("required") {
                let key = key.as_str().expect("required entries are strings");
                assert!(
                    props.contains_key(key),
                    "{} requires unknown parameter {key}",
                    spec.name
                );
            }
        }
    }

    #[test]
    fn test_is_known_tool() {
        assert!(is_known_tool("moveShape"));
        assert!(!is_known_tool("explodeShape"));
    }
}
