use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Avoid,
    Pylon,
    Module,
    Boat,
    Text,
    Unknown,
}

/// Image-plane vertex in pixel coordinates (x right, y down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
}

impl Vertex {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// 4 (planar quad) or 8 (projected cuboid) vertices tagged with an object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    vertices: Vec<Vertex>,
    pub object_type: ObjectType,
}

impl BoundingBox {
    /// Returns `None` unless exactly 4 or 8 vertices are given.
    pub fn new(vertices: Vec<Vertex>, object_type: ObjectType) -> Option<Self> {
        match vertices.len() {
            4 | 8 => Some(Self { vertices, object_type }),
            _ => None,
        }
    }

    /// Axis-aligned box from two opposite corners, vertices clockwise from top-left.
    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32, object_type: ObjectType) -> Self {
        let (l, r) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        let (t, b) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        Self {
            vertices: vec![
                Vertex::new(l, t),
                Vertex::new(r, t),
                Vertex::new(r, b),
                Vertex::new(l, b),
            ],
            object_type,
        }
    }

    /// Degenerate box collapsed onto a single pixel.
    pub fn point(x: f32, y: f32, object_type: ObjectType) -> Self {
        Self::from_corners(x, y, x, y, object_type)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn center(&self) -> Vertex {
        let n = self.vertices.len() as f32;
        let (sx, sy) = self
            .vertices
            .iter()
            .fold((0.0, 0.0), |(sx, sy), v| (sx + v.x, sy + v.y));
        Vertex::new(sx / n, sy / n)
    }

    /// (min_x, min_y, max_x, max_y)
    pub fn extent(&self) -> (f32, f32, f32, f32) {
        self.vertices.iter().fold(
            (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
            |(x0, y0, x1, y1), v| (x0.min(v.x), y0.min(v.y), x1.max(v.x), y1.max(v.y)),
        )
    }

    pub fn width(&self) -> f32 {
        let (x0, _, x1, _) = self.extent();
        x1 - x0
    }

    pub fn height(&self) -> f32 {
        let (_, y0, _, y1) = self.extent();
        y1 - y0
    }

    pub fn within(&self, width: u32, height: u32) -> bool {
        self.vertices.iter().all(|v| {
            v.x >= 0.0 && v.y >= 0.0 && v.x <= (width as f32 - 1.0) && v.y <= (height as f32 - 1.0)
        })
    }
}

/// Which detector ran cleanly on the most recent frame of a mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureFlags {
    pub obstacle_failed: bool,
    pub module_failed: bool,
    pub geometry_failed: bool,
    pub text_failed: bool,
}

impl FailureFlags {
    pub fn any(&self) -> bool {
        self.obstacle_failed || self.module_failed || self.geometry_failed || self.text_failed
    }
}
