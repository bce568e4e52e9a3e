//! Core voxel color types.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Index into a mesh palette.
///
/// Index 0 is reserved for empty space by convention. Nothing in the codec
/// enforces it; collision and generation treat it as "no voxel".
pub type ColorIndex = u8;

/// The empty (air) color index.
pub const EMPTY_COLOR: ColorIndex = 0;

/// An 8-bit RGBA palette color, laid out the way shaders read it.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(C)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    /// Fully transparent black, used for the empty slot.
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    /// Create a new color
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color
    #[inline]
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Pack as a little-endian `u32` (`r` in the low byte).
    #[inline]
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes([self.r, self.g, self.b, self.a])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_little_endian() {
        let c = Rgba8::new(1, 2, 3, 4);
        assert_eq!(c.to_u32(), 0x0403_0201);
        assert_eq!(bytemuck::bytes_of(&c), &[1, 2, 3, 4]);
    }

    #[test]
    fn opaque_has_full_alpha() {
        assert_eq!(Rgba8::opaque(10, 20, 30).a, 255);
        assert_eq!(Rgba8::default(), Rgba8::TRANSPARENT);
    }
}
