//! Graphics Command Processor.
//!
//! Side-effecting graphics instructions do not draw anything themselves: the
//! CPU validates their operands and appends a [`GcpCmd`] to the [`Gcp`] queue.
//! Once per frame the host replays the queue, in order, into a [`Renderer`]
//! and the queue starts empty again. Persistent sprite and layer state lives
//! in the renderer, fed incrementally by these commands.

use crate::virtual_machine::program::{Color, ImageGroup};
use std::mem;

/// One queued drawing or state-change command.
#[derive(Debug, Clone, PartialEq)]
pub enum GcpCmd {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Color,
    },
    /// Binds an image group and makes the sprite visible.
    SpriteSet {
        sprite: u8,
        group: ImageGroup,
    },
    SpriteLayer {
        sprite: u8,
        layer: u8,
    },
    SpriteVisible {
        sprite: u8,
        visible: bool,
    },
    SpriteX {
        sprite: u8,
        value: f32,
    },
    SpriteY {
        sprite: u8,
        value: f32,
    },
    SpriteRotation {
        sprite: u8,
        degrees: f32,
    },
    SpriteRotationOffset {
        sprite: u8,
        degrees: f32,
    },
    SpriteSpeed {
        sprite: u8,
        speed: f32,
    },
    SpriteAcceleration {
        sprite: u8,
        value: f32,
    },
    SpriteWrap {
        sprite: u8,
        wrap: bool,
    },
    SpriteImage {
        sprite: u8,
        image: i32,
    },
    SpriteMaxSpeed {
        sprite: u8,
        speed: f32,
    },
    SpriteFriction {
        sprite: u8,
        friction: f32,
    },
    SpritePriority {
        sprite: u8,
        priority: i32,
    },
    SpriteGroup {
        sprite: u8,
        group: i32,
    },
    SpriteAnimate {
        sprite: u8,
        from: u16,
        to: u16,
    },
    SpriteFps {
        sprite: u8,
        fps: i32,
    },
    /// Finish the running animation cycle, then hide the sprite.
    SpriteStopAnimation {
        sprite: u8,
    },
    /// Zero the sprite's velocity.
    SpriteHalt {
        sprite: u8,
    },
    SpriteAlpha {
        sprite: u8,
        alpha: f32,
    },
    SpriteScale {
        sprite: u8,
        scale: f32,
    },
    LayerResolution {
        layer: u8,
        width: u16,
        height: u16,
    },
    LayerVisible {
        layer: u8,
        visible: bool,
    },
    /// Lower-cased font name.
    FontSet {
        name: String,
        size: f32,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        color_index: i32,
    },
}

impl GcpCmd {
    /// Sprite the command addresses, if any.
    pub fn sprite(&self) -> Option<u8> {
        use GcpCmd::*;
        match self {
            SpriteSet { sprite, .. }
            | SpriteLayer { sprite, .. }
            | SpriteVisible { sprite, .. }
            | SpriteX { sprite, .. }
            | SpriteY { sprite, .. }
            | SpriteRotation { sprite, .. }
            | SpriteRotationOffset { sprite, .. }
            | SpriteSpeed { sprite, .. }
            | SpriteAcceleration { sprite, .. }
            | SpriteWrap { sprite, .. }
            | SpriteImage { sprite, .. }
            | SpriteMaxSpeed { sprite, .. }
            | SpriteFriction { sprite, .. }
            | SpritePriority { sprite, .. }
            | SpriteGroup { sprite, .. }
            | SpriteAnimate { sprite, .. }
            | SpriteFps { sprite, .. }
            | SpriteStopAnimation { sprite }
            | SpriteHalt { sprite }
            | SpriteAlpha { sprite, .. }
            | SpriteScale { sprite, .. } => Some(*sprite),
            Rect { .. }
            | LayerResolution { .. }
            | LayerVisible { .. }
            | FontSet { .. }
            | Text { .. } => None,
        }
    }
}

/// Consumer of one frame's commands.
pub trait Renderer {
    fn begin_frame(&mut self) {}

    fn apply(&mut self, cmd: &GcpCmd);

    fn end_frame(&mut self) {}
}

/// FIFO queue of graphics commands for the current frame.
#[derive(Debug, Default, Clone)]
pub struct Gcp {
    cmds: Vec<GcpCmd>,
}

impl Gcp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cmd(&mut self, cmd: GcpCmd) {
        self.cmds.push(cmd);
    }

    /// Commands queued so far, oldest first.
    pub fn pending(&self) -> &[GcpCmd] {
        &self.cmds
    }

    pub fn len(&self) -> usize {
        self.cmds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    /// Drains the queue in enqueue order.
    pub fn flush(&mut self) -> Vec<GcpCmd> {
        mem::take(&mut self.cmds)
    }

    /// Replays the queue into `renderer` as one frame, then clears it.
    ///
    /// The frame is opened and closed even when nothing is queued.
    pub fn draw<R: Renderer + ?Sized>(&mut self, renderer: &mut R) {
        renderer.begin_frame();
        for cmd in self.flush() {
            renderer.apply(&cmd);
        }
        renderer.end_frame();
    }

    /// Drops queued commands without drawing them.
    pub fn clear(&mut self) {
        self.cmds.clear();
    }
}

/// Renderer that only records what it was given.
#[derive(Debug, Default, Clone)]
pub struct RecordingRenderer {
    pub frames: usize,
    pub cmds: Vec<GcpCmd>,
}

impl Renderer for RecordingRenderer {
    fn begin_frame(&mut self) {
        self.frames += 1;
    }

    fn apply(&mut self, cmd: &GcpCmd) {
        self.cmds.push(cmd.clone());
    }
}
