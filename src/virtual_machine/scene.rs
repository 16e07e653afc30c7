//! Headless scene.
//!
//! [`Scene`] is the reference [`Renderer`] and [`Host`]: it keeps sprite and
//! layer state fed by GCP commands, moves and animates sprites once per frame,
//! answers the CPU's queries and records the rectangles and text drawn in the
//! current frame. Nothing is rasterised.

use crate::config::MachineConfig;
use crate::virtual_machine::gcp::{GcpCmd, Renderer};
use crate::virtual_machine::host::{Axis, Host, SpriteAttr};
use crate::virtual_machine::program::{Color, ImageGroup};
use crate::virtual_machine::vm::{LAYER_COUNT, SPRITE_COUNT};
use std::collections::HashSet;

/// Speed cap applied to acceleration impulses until `SPRMXS` changes it.
pub const DEFAULT_MAX_SPEED: f32 = 3.0;
/// Animation frames per second until `SPRFPS` changes it.
pub const DEFAULT_FPS: f32 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    pub index: u8,
    pub layer: Option<u8>,
    pub x: f32,
    pub y: f32,
    /// Unscaled frame size, taken from the image group.
    pub width: f32,
    pub height: f32,
    /// Degrees; 0 points up.
    pub rotation: f32,
    pub rotation_offset: f32,
    pub scale: f32,
    pub alpha: f32,
    pub visible: bool,
    pub wrap: bool,
    pub priority: i32,
    pub velocity: (f32, f32),
    pub speed: f32,
    pub max_speed: f32,
    /// Velocity multiplier applied every frame.
    pub friction: f32,
    pub group: Option<ImageGroup>,
    pub image: i32,
    pub collision_group: i32,
    pub animating: bool,
    pub fps: f32,
    pub animation: (u16, u16),
    since_last_frame: f32,
    hide_after_cycle: bool,
}

impl Sprite {
    fn new(index: u8) -> Self {
        Self {
            index,
            layer: None,
            x: 0.0,
            y: 0.0,
            width: ImageGroup::DEFAULT_SIZE as f32,
            height: ImageGroup::DEFAULT_SIZE as f32,
            rotation: 0.0,
            rotation_offset: 0.0,
            scale: 1.0,
            alpha: 1.0,
            visible: false,
            wrap: false,
            priority: 0,
            velocity: (0.0, 0.0),
            speed: 0.0,
            max_speed: DEFAULT_MAX_SPEED,
            friction: 1.0,
            group: None,
            image: 0,
            collision_group: 0,
            animating: false,
            fps: DEFAULT_FPS,
            animation: (0, 0),
            since_last_frame: 0.0,
            hide_after_cycle: false,
        }
    }

    pub fn scaled_size(&self) -> (f32, f32) {
        (self.width * self.scale, self.height * self.scale)
    }

    /// Unit vector of the current heading.
    fn heading(&self) -> (f32, f32) {
        let radians = (self.rotation - 90.0).to_radians();
        (radians.cos(), radians.sin())
    }

    fn update_velocity(&mut self) {
        let (dx, dy) = self.heading();
        self.velocity = (dx * self.speed, dy * self.speed);
    }

    /// Adds `amount` along the heading, capped at the maximum speed.
    fn accelerate(&mut self, amount: f32) {
        let (dx, dy) = self.heading();
        let (vx, vy) = (self.velocity.0 + dx * amount, self.velocity.1 + dy * amount);
        let speed = (vx * vx + vy * vy).sqrt();
        self.velocity = if speed > self.max_speed && speed > 0.0 {
            (vx / speed * self.max_speed, vy / speed * self.max_speed)
        } else {
            (vx, vy)
        };
    }

    fn overlaps(&self, other: &Sprite) -> bool {
        let (w1, h1) = self.scaled_size();
        let (w2, h2) = other.scaled_size();
        self.x < other.x + w2 && other.x < self.x + w1 && self.y < other.y + h2 && other.y < self.y + h1
    }

    /// Moves one frame and wraps once fully outside `bounds`.
    fn step_motion(&mut self, bounds: (f32, f32)) {
        self.velocity.0 *= self.friction;
        self.velocity.1 *= self.friction;
        self.x += self.velocity.0;
        self.y += self.velocity.1;

        if !self.wrap {
            return;
        }
        let (width, height) = bounds;
        if self.x < -self.width {
            self.x = width - self.width;
        } else if self.x > width {
            self.x = 0.0;
        }
        if self.y < -self.height {
            self.y = height - self.height;
        } else if self.y > height {
            self.y = 0.0;
        }
    }

    fn step_animation(&mut self, delta_secs: f32) {
        if !self.animating || self.fps <= 0.0 {
            return;
        }
        self.since_last_frame += delta_secs;
        if self.since_last_frame < 1.0 / self.fps {
            return;
        }
        self.since_last_frame = 0.0;
        self.image += 1;
        let (from, to) = self.animation;
        if self.image > to as i32 {
            self.image = from as i32;
            if self.hide_after_cycle {
                self.visible = false;
                self.animating = false;
                self.hide_after_cycle = false;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Layer {
    /// `None` follows the display size.
    pub size: Option<(u16, u16)>,
    pub visible: bool,
}

/// One immediate-mode draw of the current frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawItem {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Color,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        color_index: i32,
        font: Option<String>,
        size: f32,
    },
}

#[derive(Debug, Clone)]
pub struct Scene {
    sprites: Vec<Sprite>,
    layers: [Layer; LAYER_COUNT],
    display: (u16, u16),
    fonts: Vec<String>,
    font: Option<(String, f32)>,
    keys: HashSet<i32>,
    draws: Vec<DrawItem>,
    frames: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(&MachineConfig::default())
    }
}

impl Scene {
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            sprites: (0..SPRITE_COUNT).map(|i| Sprite::new(i as u8)).collect(),
            layers: [Layer::default(); LAYER_COUNT],
            display: config.display_size(),
            fonts: config.fonts.iter().map(|f| f.to_lowercase()).collect(),
            font: None,
            keys: HashSet::new(),
            draws: Vec::new(),
            frames: 0,
        }
    }

    /// Forgets all sprite, layer, font and draw state. Held keys survive.
    pub fn reset(&mut self) {
        for (i, sprite) in self.sprites.iter_mut().enumerate() {
            *sprite = Sprite::new(i as u8);
        }
        self.layers = [Layer::default(); LAYER_COUNT];
        self.font = None;
        self.draws.clear();
        self.frames = 0;
    }

    pub fn sprite(&self, index: u8) -> &Sprite {
        &self.sprites[index as usize]
    }

    pub fn sprites(&self) -> &[Sprite] {
        &self.sprites
    }

    pub fn layer(&self, index: u8) -> Option<&Layer> {
        self.layers.get(index as usize)
    }

    /// Visible sprites attached to `layer` (`None` for the display), in
    /// drawing order: lower priority first, then lower index.
    pub fn draw_order(&self, layer: Option<u8>) -> Vec<&Sprite> {
        let mut sprites: Vec<&Sprite> = self
            .sprites
            .iter()
            .filter(|s| s.visible && s.layer == layer)
            .collect();
        sprites.sort_by_key(|s| (s.priority, s.index));
        sprites
    }

    pub fn draws(&self) -> &[DrawItem] {
        &self.draws
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn key_down(&mut self, code: i32) {
        self.keys.insert(code);
    }

    pub fn key_up(&mut self, code: i32) {
        self.keys.remove(&code);
    }

    /// Size a sprite on `layer` wraps against.
    fn bounds(&self, layer: Option<u8>) -> (f32, f32) {
        let (w, h) = layer
            .and_then(|l| self.layers.get(l as usize))
            .and_then(|l| l.size)
            .unwrap_or(self.display);
        (w as f32, h as f32)
    }

    /// Moves and animates every visible sprite by one frame.
    pub fn advance(&mut self, delta_secs: f32) {
        for i in 0..self.sprites.len() {
            if !self.sprites[i].visible {
                continue;
            }
            let bounds = self.bounds(self.sprites[i].layer);
            let sprite = &mut self.sprites[i];
            sprite.step_motion(bounds);
            sprite.step_animation(delta_secs);
        }
    }
}

impl Renderer for Scene {
    fn begin_frame(&mut self) {
        self.draws.clear();
    }

    fn apply(&mut self, cmd: &GcpCmd) {
        if let Some(index) = cmd.sprite() {
            self.apply_sprite(index, cmd);
            return;
        }
        match cmd {
            GcpCmd::Rect {
                x,
                y,
                width,
                height,
                color,
            } => self.draws.push(DrawItem::Rect {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
                color: *color,
            }),
            GcpCmd::LayerResolution {
                layer,
                width,
                height,
            } => {
                if let Some(l) = self.layers.get_mut(*layer as usize) {
                    l.size = Some((*width, *height));
                }
            }
            GcpCmd::LayerVisible { layer, visible } => {
                if let Some(l) = self.layers.get_mut(*layer as usize) {
                    l.visible = *visible;
                }
            }
            GcpCmd::FontSet { name, size } => self.font = Some((name.clone(), *size)),
            GcpCmd::Text {
                text,
                x,
                y,
                color_index,
            } => {
                let (font, size) = match &self.font {
                    Some((name, size)) => (Some(name.clone()), *size),
                    None => (None, 0.0),
                };
                self.draws.push(DrawItem::Text {
                    text: text.clone(),
                    x: *x,
                    y: *y,
                    color_index: *color_index,
                    font,
                    size,
                });
            }
            _ => {}
        }
    }

    fn end_frame(&mut self) {
        self.frames += 1;
    }
}

impl Scene {
    fn apply_sprite(&mut self, index: u8, cmd: &GcpCmd) {
        let sprite = &mut self.sprites[index as usize];
        match cmd {
            GcpCmd::SpriteSet { group, .. } => {
                sprite.width = group.width as f32;
                sprite.height = group.height as f32;
                sprite.group = Some(group.clone());
                sprite.image = 0;
                sprite.visible = true;
            }
            GcpCmd::SpriteLayer { layer, .. } => sprite.layer = Some(*layer),
            GcpCmd::SpriteVisible { visible, .. } => sprite.visible = *visible,
            GcpCmd::SpriteX { value, .. } => sprite.x = *value,
            GcpCmd::SpriteY { value, .. } => sprite.y = *value,
            GcpCmd::SpriteRotation { degrees, .. } => {
                sprite.rotation = *degrees;
                if sprite.speed != 0.0 {
                    sprite.update_velocity();
                }
            }
            GcpCmd::SpriteRotationOffset { degrees, .. } => sprite.rotation_offset = *degrees,
            GcpCmd::SpriteSpeed { speed, .. } => {
                sprite.speed = *speed;
                sprite.update_velocity();
            }
            GcpCmd::SpriteAcceleration { value, .. } => sprite.accelerate(*value),
            GcpCmd::SpriteWrap { wrap, .. } => sprite.wrap = *wrap,
            GcpCmd::SpriteImage { image, .. } => {
                sprite.image = *image;
                sprite.animating = false;
            }
            GcpCmd::SpriteMaxSpeed { speed, .. } => sprite.max_speed = *speed,
            GcpCmd::SpriteFriction { friction, .. } => sprite.friction = *friction,
            GcpCmd::SpritePriority { priority, .. } => sprite.priority = *priority,
            GcpCmd::SpriteGroup { group, .. } => sprite.collision_group = *group,
            GcpCmd::SpriteAnimate { from, to, .. } => {
                sprite.animation = (*from, *to);
                sprite.animating = true;
                if !(*from as i32..=*to as i32).contains(&sprite.image) {
                    sprite.image = *from as i32;
                    sprite.since_last_frame = 0.0;
                }
            }
            GcpCmd::SpriteFps { fps, .. } => sprite.fps = *fps as f32,
            GcpCmd::SpriteStopAnimation { .. } => {
                sprite.hide_after_cycle = true;
                sprite.image = 0;
            }
            GcpCmd::SpriteHalt { .. } => sprite.velocity = (0.0, 0.0),
            GcpCmd::SpriteAlpha { alpha, .. } => sprite.alpha = *alpha,
            GcpCmd::SpriteScale { scale, .. } => sprite.scale = *scale,
            _ => {}
        }
    }
}

impl Host for Scene {
    fn is_key_down(&self, code: i32) -> bool {
        self.keys.contains(&code)
    }

    fn release_key(&mut self, code: i32) {
        self.keys.remove(&code);
    }

    fn display_size(&self) -> (u16, u16) {
        self.display
    }

    /// Only visible sprites on the same layer count as obstacles.
    fn sprite_collides(&self, sprite: u8, group: i32) -> bool {
        let me = &self.sprites[sprite as usize];
        self.sprites.iter().any(|other| {
            other.index != me.index
                && other.visible
                && other.layer == me.layer
                && other.collision_group == group
                && me.overlaps(other)
        })
    }

    fn sprite_attribute(&self, sprite: u8, attr: SpriteAttr) -> f32 {
        let s = &self.sprites[sprite as usize];
        match attr {
            SpriteAttr::X => s.x,
            SpriteAttr::Y => s.y,
            SpriteAttr::Width => s.scaled_size().0,
            SpriteAttr::Height => s.scaled_size().1,
            SpriteAttr::Rotation => s.rotation,
            SpriteAttr::Speed => s.speed,
        }
    }

    fn set_sprite_position(&mut self, sprite: u8, axis: Axis, value: f32) {
        let s = &mut self.sprites[sprite as usize];
        match axis {
            Axis::X => s.x = value,
            Axis::Y => s.y = value,
        }
    }

    fn has_font(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.fonts.iter().any(|f| *f == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::gcp::Gcp;

    const EPS: f32 = 1e-4;

    fn scene_with(cmds: Vec<GcpCmd>) -> Scene {
        let mut scene = Scene::default();
        let mut gcp = Gcp::new();
        for cmd in cmds {
            gcp.add_cmd(cmd);
        }
        gcp.draw(&mut scene);
        scene
    }

    fn show(sprite: u8) -> GcpCmd {
        GcpCmd::SpriteSet {
            sprite,
            group: ImageGroup::new("Ship", 4),
        }
    }

    #[test]
    fn sprset_shows_sprite_with_group_size() {
        let mut group = ImageGroup::new("Rock", 2);
        group.width = 8;
        group.height = 12;
        let scene = scene_with(vec![GcpCmd::SpriteSet { sprite: 5, group }]);
        let sprite = scene.sprite(5);
        assert!(sprite.visible);
        assert_eq!((sprite.width, sprite.height), (8.0, 12.0));
        assert_eq!(scene.frames(), 1);
    }

    #[test]
    fn speed_moves_along_heading() {
        let mut scene = scene_with(vec![
            show(0),
            GcpCmd::SpriteX { sprite: 0, value: 100.0 },
            GcpCmd::SpriteY { sprite: 0, value: 100.0 },
            GcpCmd::SpriteRotation { sprite: 0, degrees: 90.0 },
            GcpCmd::SpriteSpeed { sprite: 0, speed: 2.0 },
        ]);
        scene.advance(0.016);
        let sprite = scene.sprite(0);
        assert!((sprite.x - 102.0).abs() < EPS, "{}", sprite.x);
        assert!((sprite.y - 100.0).abs() < EPS, "{}", sprite.y);
    }

    #[test]
    fn rotation_zero_moves_up() {
        let mut scene = scene_with(vec![show(0), GcpCmd::SpriteSpeed { sprite: 0, speed: 1.0 }]);
        scene.advance(0.016);
        assert!((scene.sprite(0).y + 1.0).abs() < EPS);
    }

    #[test]
    fn acceleration_is_capped_at_max_speed() {
        let scene = scene_with(vec![
            show(1),
            GcpCmd::SpriteMaxSpeed { sprite: 1, speed: 2.0 },
            GcpCmd::SpriteAcceleration { sprite: 1, value: 5.0 },
        ]);
        let (vx, vy) = scene.sprite(1).velocity;
        assert!(((vx * vx + vy * vy).sqrt() - 2.0).abs() < EPS);
    }

    #[test]
    fn friction_and_halt() {
        let mut scene = scene_with(vec![
            show(2),
            GcpCmd::SpriteFriction { sprite: 2, friction: 0.5 },
            GcpCmd::SpriteRotation { sprite: 2, degrees: 90.0 },
            GcpCmd::SpriteSpeed { sprite: 2, speed: 4.0 },
        ]);
        scene.advance(0.016);
        assert!((scene.sprite(2).x - 2.0).abs() < EPS);

        let mut gcp = Gcp::new();
        gcp.add_cmd(GcpCmd::SpriteHalt { sprite: 2 });
        gcp.draw(&mut scene);
        scene.advance(0.016);
        assert!((scene.sprite(2).x - 2.0).abs() < EPS);
    }

    #[test]
    fn wrapping_uses_layer_size() {
        let mut scene = scene_with(vec![
            show(3),
            GcpCmd::LayerResolution { layer: 1, width: 100, height: 50 },
            GcpCmd::SpriteLayer { sprite: 3, layer: 1 },
            GcpCmd::SpriteWrap { sprite: 3, wrap: true },
            GcpCmd::SpriteX { sprite: 3, value: 99.0 },
            GcpCmd::SpriteRotation { sprite: 3, degrees: 90.0 },
            GcpCmd::SpriteSpeed { sprite: 3, speed: 2.0 },
        ]);
        scene.advance(0.016);
        assert_eq!(scene.sprite(3).x, 0.0);
    }

    #[test]
    fn animation_cycles_and_stop_hides() {
        let mut scene = scene_with(vec![
            show(4),
            GcpCmd::SpriteFps { sprite: 4, fps: 10 },
            GcpCmd::SpriteAnimate { sprite: 4, from: 1, to: 2 },
        ]);
        assert_eq!(scene.sprite(4).image, 1);
        scene.advance(0.1);
        assert_eq!(scene.sprite(4).image, 2);
        scene.advance(0.1);
        assert_eq!(scene.sprite(4).image, 1);

        let mut gcp = Gcp::new();
        gcp.add_cmd(GcpCmd::SpriteStopAnimation { sprite: 4 });
        gcp.draw(&mut scene);
        scene.advance(0.1);
        scene.advance(0.1);
        assert!(scene.sprite(4).visible);
        scene.advance(0.1);
        assert!(!scene.sprite(4).visible);
    }

    #[test]
    fn collision_needs_group_layer_and_overlap() {
        let scene = scene_with(vec![
            show(0),
            show(1),
            show(2),
            GcpCmd::SpriteGroup { sprite: 1, group: 3 },
            GcpCmd::SpriteX { sprite: 1, value: 20.0 },
            GcpCmd::SpriteGroup { sprite: 2, group: 4 },
        ]);
        assert!(scene.sprite_collides(0, 3));
        assert!(scene.sprite_collides(0, 4));
        assert!(!scene.sprite_collides(0, 5));

        let scene = scene_with(vec![
            show(0),
            show(1),
            GcpCmd::SpriteGroup { sprite: 1, group: 3 },
            GcpCmd::SpriteX { sprite: 1, value: 32.0 },
        ]);
        assert!(!scene.sprite_collides(0, 3), "touching edges do not overlap");
    }

    #[test]
    fn attribute_queries_use_scale() {
        let scene = scene_with(vec![
            show(9),
            GcpCmd::SpriteScale { sprite: 9, scale: 2.0 },
            GcpCmd::SpriteX { sprite: 9, value: 7.0 },
        ]);
        assert_eq!(scene.sprite_attribute(9, SpriteAttr::Width), 64.0);
        assert_eq!(scene.sprite_attribute(9, SpriteAttr::X), 7.0);
    }

    #[test]
    fn text_uses_current_font() {
        let scene = scene_with(vec![
            GcpCmd::FontSet { name: "square".into(), size: 12.0 },
            GcpCmd::Text { text: "HI".into(), x: 1.0, y: 2.0, color_index: 5 },
        ]);
        assert_eq!(
            scene.draws(),
            &[DrawItem::Text {
                text: "HI".into(),
                x: 1.0,
                y: 2.0,
                color_index: 5,
                font: Some("square".into()),
                size: 12.0
            }]
        );
        assert!(scene.has_font("Square"));
        assert!(!scene.has_font("comic"));
    }

    #[test]
    fn draw_order_follows_priority() {
        let scene = scene_with(vec![
            show(1),
            show(2),
            GcpCmd::SpritePriority { sprite: 1, priority: 5 },
        ]);
        let order: Vec<u8> = scene.draw_order(None).iter().map(|s| s.index).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn keys_and_release() {
        let mut scene = Scene::default();
        scene.key_down(32);
        assert!(scene.is_key_down(32));
        scene.release_key(32);
        assert!(!scene.is_key_down(32));
    }
}
