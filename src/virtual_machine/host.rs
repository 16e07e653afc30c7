//! Host boundary.
//!
//! The CPU never touches input devices or the renderer directly. Everything
//! it needs to read from the outside world goes through [`Host`]; everything
//! it wants drawn goes into the [`Gcp`](super::gcp::Gcp) queue.

use std::fmt;

/// Input and renderer state the CPU reaches during execution.
pub trait Host {
    /// Whether the key with `code` is currently held.
    fn is_key_down(&self, code: i32) -> bool;

    /// Forgets a held key. Called when a program overwrites `R8`.
    fn release_key(&mut self, code: i32);

    /// Display size in pixels, read by `LDRESX` / `LDRESY`.
    fn display_size(&self) -> (u16, u16);

    /// Whether `sprite` overlaps any other sprite on its layer whose collision
    /// group is `group`.
    fn sprite_collides(&self, sprite: u8, group: i32) -> bool;

    fn sprite_attribute(&self, sprite: u8, attr: SpriteAttr) -> f32;

    /// Moves `sprite` immediately. `SPRX` / `SPRY` still queue the matching
    /// GCP command; this keeps collision queries in the same pass current.
    fn set_sprite_position(&mut self, sprite: u8, axis: Axis, value: f32);

    /// Case-insensitive font lookup.
    fn has_font(&self, name: &str) -> bool;
}

/// Horizontal or vertical, for display size and sprite position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Sprite attribute readable with `LDSPR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpriteAttr {
    X,
    Y,
    /// Scaled width.
    Width,
    /// Scaled height.
    Height,
    Rotation,
    Speed,
}

impl SpriteAttr {
    pub const ALL: [SpriteAttr; 6] = [
        SpriteAttr::X,
        SpriteAttr::Y,
        SpriteAttr::Width,
        SpriteAttr::Height,
        SpriteAttr::Rotation,
        SpriteAttr::Speed,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            SpriteAttr::X => "x",
            SpriteAttr::Y => "y",
            SpriteAttr::Width => "width",
            SpriteAttr::Height => "height",
            SpriteAttr::Rotation => "rotation",
            SpriteAttr::Speed => "speed",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|attr| attr.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SpriteAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
