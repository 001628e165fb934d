//! Tex (C6): a typed handle onto a GPU image with explicit shape and format, with an optional
//! persistent staging [`Dat`] cached on first transfer.
//!
//! Grounded on `resources.h`'s `DvzTex` (`DvzTexDims dims`, `uvec3 shape`, `DvzImages* img`,
//! `DvzDat* stg`).

use crate::dat::Dat;
use crate::extent::{Dims, Shape};
use crate::handle::ImageHandle;
use ash::vk;
use bitflags::bitflags;

bitflags! {
    #[derive(Default)]
    pub struct TexFlags: u32 {
        /// Keep the staging Dat cached across transfers instead of recreating it per call.
        const PERSISTENT_STAGING = 0b0000_0001;
    }
}

pub struct Tex {
    pub(crate) dims: Dims,
    pub(crate) shape: Shape,
    pub(crate) format: vk::Format,
    pub(crate) flags: TexFlags,
    pub(crate) image: ImageHandle,
    pub(crate) staging: Option<Dat>,
}

impl Tex {
    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn flags(&self) -> TexFlags {
        self.flags
    }

    pub fn image(&self) -> ImageHandle {
        self.image
    }

    pub fn staging(&self) -> Option<&Dat> {
        self.staging.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_validates_against_declared_dims() {
        assert!(Shape::new(8, 1, 1).validate(Dims::D1));
        assert!(!Shape::new(8, 2, 1).validate(Dims::D1));
        assert!(Shape::new(8, 24, 1).validate(Dims::D2));
        assert!(!Shape::new(8, 24, 2).validate(Dims::D2));
        assert!(Shape::new(8, 24, 4).validate(Dims::D3));
    }
}
