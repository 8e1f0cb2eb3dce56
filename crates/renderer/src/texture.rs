//! Texture unit bookkeeping and decoded image containers.

use std::collections::HashMap;

use crate::device::{PixelFormat, TextureData, TextureDesc, TextureKind};

/// Assigns texture units per `(owner, role)` pair.
///
/// A pair always maps to the same unit until its owner is released, and no two
/// live pairs share a unit. Owned by one rendering instance and only touched
/// from the graphics thread.
#[derive(Debug, Default)]
pub struct TextureUnitAllocator {
    units: HashMap<(u64, String), u32>,
    free: Vec<u32>,
    next: u32,
}

impl TextureUnitAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unit for `role` of `owner`, allocating one on first request.
    pub fn unit(&mut self, owner: u64, role: &str) -> u32 {
        if let Some(unit) = self.units.get(&(owner, role.to_string())) {
            return *unit;
        }
        let unit = match self.free.pop() {
            Some(unit) => unit,
            None => {
                let unit = self.next;
                self.next += 1;
                unit
            }
        };
        log::debug!("texture unit {unit} -> owner {owner} '{role}'");
        self.units.insert((owner, role.to_string()), unit);
        unit
    }

    /// Unit already assigned to `role` of `owner`, if any.
    pub fn get(&self, owner: u64, role: &str) -> Option<u32> {
        self.units.get(&(owner, role.to_string())).copied()
    }

    /// Return every unit held by `owner` to the pool. Lowest units are handed out first.
    pub fn release(&mut self, owner: u64) {
        let mut released: Vec<u32> = Vec::new();
        self.units.retain(|(o, _), unit| {
            if *o == owner {
                released.push(*unit);
                false
            } else {
                true
            }
        });
        self.free.extend(released);
        self.free.sort_unstable_by(|a, b| b.cmp(a));
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// A decoded 2D image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn rgb(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgb8,
            pixels,
        }
    }

    pub fn rgba(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            pixels,
        }
    }

    /// A single-colour image.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba.repeat((width * height) as usize);
        Self::rgba(width, height, pixels)
    }

    pub fn desc(&self, label: &str, mipmaps: bool, anisotropy: u16) -> TextureDesc {
        TextureDesc {
            label: label.to_string(),
            kind: TextureKind::D2,
            width: self.width,
            height: self.height,
            format: self.format,
            mipmaps,
            anisotropy,
        }
    }

    pub fn data(&self) -> TextureData {
        TextureData {
            layers: vec![self.pixels.clone()],
        }
    }
}

/// Six cube map faces in +X, -X, +Y, -Y, +Z, -Z order.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeMapData {
    pub faces: [ImageData; 6],
}

impl CubeMapData {
    /// Faces must share size and format.
    pub fn is_consistent(&self) -> bool {
        let first = &self.faces[0];
        self.faces
            .iter()
            .all(|f| f.width == first.width && f.height == first.height && f.format == first.format)
    }

    pub fn desc(&self, label: &str) -> TextureDesc {
        let first = &self.faces[0];
        TextureDesc {
            label: label.to_string(),
            kind: TextureKind::Cube,
            width: first.width,
            height: first.height,
            format: first.format,
            mipmaps: false,
            anisotropy: 1,
        }
    }

    pub fn data(&self) -> TextureData {
        TextureData {
            layers: self.faces.iter().map(|f| f.pixels.clone()).collect(),
        }
    }
}

/// Expand tightly packed RGB8 pixels to RGBA8.
pub fn rgb_to_rgba(pixels: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() / 3 * 4);
    for rgb in pixels.chunks_exact(3) {
        out.extend_from_slice(rgb);
        out.push(255);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_pair_same_unit() {
        let mut units = TextureUnitAllocator::new();
        let a = units.unit(1, "diffuse");
        assert_eq!(units.unit(1, "diffuse"), a);
        assert_eq!(units.get(1, "diffuse"), Some(a));
    }

    #[test]
    fn roles_and_owners_get_distinct_units() {
        let mut units = TextureUnitAllocator::new();
        let a_diffuse = units.unit(1, "diffuse");
        let a_normal = units.unit(1, "normal");
        let b_diffuse = units.unit(2, "diffuse");
        assert_ne!(a_diffuse, a_normal);
        assert_ne!(a_diffuse, b_diffuse);
        assert_ne!(a_normal, b_diffuse);
    }

    #[test]
    fn released_units_are_reused_without_collision() {
        let mut units = TextureUnitAllocator::new();
        units.unit(1, "diffuse");
        units.unit(1, "normal");
        let kept = units.unit(2, "diffuse");
        units.release(1);
        assert_eq!(units.len(), 1);
        let c = units.unit(3, "diffuse");
        let d = units.unit(3, "normal");
        assert_ne!(c, kept);
        assert_ne!(d, kept);
        assert_ne!(c, d);
        assert_eq!(units.get(1, "diffuse"), None);
    }

    #[test]
    fn rgb_expands_to_rgba() {
        assert_eq!(rgb_to_rgba(&[1, 2, 3, 4, 5, 6]), vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }
}
