//! Small geometric value types shared by textures, boards, and framebuffers.

use ash::vk;

/// A 2D width/height pair, used by framebuffers, boards, and render passes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl From<(u32, u32)> for Extent {
    fn from(v: (u32, u32)) -> Self {
        Self { width: v.0, height: v.1 }
    }
}

impl From<Extent> for vk::Extent2D {
    fn from(v: Extent) -> Self {
        vk::Extent2D { width: v.width, height: v.height }
    }
}

/// The dimensionality of a [`crate::tex::Tex`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Dims {
    D1,
    D2,
    D3,
}

/// A width/height/depth triple describing the shape of a texture or a transfer window.
///
/// Invariant (enforced by [`Shape::validate`]): `dims == D1` implies `y == z == 1`; `dims == D2`
/// implies `z == 1`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Shape {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Shape {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub fn validate(&self, dims: Dims) -> bool {
        match dims {
            Dims::D1 => self.y == 1 && self.z == 1,
            Dims::D2 => self.z == 1,
            Dims::D3 => true,
        }
    }

    pub fn texel_count(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

impl From<Shape> for vk::Extent3D {
    fn from(v: Shape) -> Self {
        vk::Extent3D { width: v.x, height: v.y, depth: v.z }
    }
}

impl From<Shape> for vk::Offset3D {
    fn from(v: Shape) -> Self {
        vk::Offset3D { x: v.x as i32, y: v.y as i32, z: v.z as i32 }
    }
}
