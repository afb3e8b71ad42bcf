use std::fmt;
use std::rc::Rc;

use tracing::warn;

use super::actor::ActorTable;
use super::engine::EngineError;
use super::geometry::{Rect, Vec2};
use super::ids::ActorId;
use super::surface::{Bitmap, Color, Surface, MAX_SURFACE_SIDE};

/// Draw callback run after the map and actors, e.g. message box text.
pub type Overlay = Box<dyn Fn(&mut Surface)>;

/// World-space window of a view. The size is fixed at creation; only the
/// origin moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    origin: Vec2,
    width: f32,
    height: f32,
}

impl Camera {
    pub fn new(origin: Vec2, width: f32, height: f32) -> Self {
        Self {
            origin,
            width,
            height,
        }
    }

    /// Like [`Camera::new`], but refuses extents that are not finite, not
    /// positive, or larger than [`MAX_SURFACE_SIDE`].
    pub fn try_new(origin: Vec2, width: f32, height: f32) -> Result<Self, EngineError> {
        let fits = |side: f32| side.is_finite() && side > 0.0 && side <= MAX_SURFACE_SIDE as f32;
        if !(fits(width) && fits(height)) {
            return Err(EngineError::InvalidViewSize { width, height });
        }
        Ok(Self::new(origin, width, height))
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn rect(&self) -> Rect {
        Rect::new(
            self.origin.x,
            self.origin.y,
            self.origin.x + self.width,
            self.origin.y + self.height,
        )
    }

    /// Translates by `movement`, then pins each axis inside `bounds`.
    ///
    /// Only the origin is recomputed, so the extent never drifts.
    fn translate_clamped(&mut self, movement: Vec2, bounds: &Rect) {
        self.origin = Vec2::new(
            clamp_axis(self.origin.x + movement.x, self.width, bounds.min.x, bounds.max.x),
            clamp_axis(self.origin.y + movement.y, self.height, bounds.min.y, bounds.max.y),
        );
    }
}

fn clamp_axis(min: f32, extent: f32, lower: f32, upper: f32) -> f32 {
    if min < lower {
        lower
    } else if min + extent > upper {
        upper - extent
    } else {
        min
    }
}

/// A camera into a scene with its own drawing surface.
pub struct View {
    /// Centre of the view on the scene surface.
    position: Vec2,
    camera: Camera,
    visible: bool,
    background: Color,
    focus: Option<ActorId>,
    visible_actors: Vec<ActorId>,
    surface: Surface,
    map: Option<Rc<Bitmap>>,
    overlay: Option<Overlay>,
}

impl View {
    /// Views start hidden.
    pub fn new(position: Vec2, camera: Camera, background: Color) -> Self {
        let surface = Surface::sized_for(&camera.rect());
        Self {
            position,
            camera,
            visible: false,
            background,
            focus: None,
            visible_actors: Vec::new(),
            surface,
            map: None,
            overlay: None,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn background(&self) -> Color {
        self.background
    }

    pub fn focus(&self) -> Option<&ActorId> {
        self.focus.as_ref()
    }

    pub fn visible_actors(&self) -> &[ActorId] {
        &self.visible_actors
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn has_map(&self) -> bool {
        self.map.is_some()
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    pub fn set_background(&mut self, background: Color) {
        self.background = background;
    }

    /// Moves the view on the scene surface; the camera is untouched.
    pub fn move_to(&mut self, position: Vec2) {
        self.position = position;
    }

    pub fn focus_on(&mut self, actor: ActorId) {
        self.focus = Some(actor);
    }

    pub fn clear_focus(&mut self) {
        self.focus = None;
    }

    /// Adds `actor` to the render list. Already-listed ids are not duplicated.
    pub fn show_actor(&mut self, actor: ActorId) {
        if !self.visible_actors.contains(&actor) {
            self.visible_actors.push(actor);
        }
    }

    pub fn hide_actor(&mut self, actor: &str) {
        self.visible_actors.retain(|id| id.as_str() != actor);
    }

    pub(crate) fn bind_map(&mut self, map: Rc<Bitmap>) {
        self.map = Some(map);
    }

    pub fn set_overlay(&mut self, overlay: impl Fn(&mut Surface) + 'static) {
        self.overlay = Some(Box::new(overlay));
    }

    /// Scrolls the camera by `movement`, pinned inside the bound map when
    /// there is one.
    pub fn center_on(&mut self, movement: Vec2) {
        match &self.map {
            Some(map) => self.camera.translate_clamped(movement, &map.bounds()),
            None => self.camera.origin += movement,
        }
    }

    /// True when every corner of `target` lies inside the camera window.
    pub fn camera_contains(&self, target: &Rect) -> bool {
        self.camera.rect().contains_rect(target)
    }

    /// Redraws the private surface: map through the camera, listed actors,
    /// then the overlay.
    pub fn render(&mut self, actors: &ActorTable) {
        if !self.visible {
            return;
        }
        self.surface.clear(self.background);

        if let Some(map) = self.map.clone() {
            if let Some(movement) = self.focus_movement(actors) {
                self.camera.translate_clamped(movement, &map.bounds());
            }
            self.surface.draw_bitmap_region(&map, &self.camera.rect());
        }

        for id in &self.visible_actors {
            match actors.get(id.as_str()) {
                Some(actor) => actor.draw(&mut self.surface, self.camera.origin),
                None => warn!(actor = %id, "view_actor_missing"),
            }
        }

        if let Some(overlay) = &self.overlay {
            overlay(&mut self.surface);
        }
    }

    /// Offset between the focus actor and the centre of the camera window.
    fn focus_movement(&self, actors: &ActorTable) -> Option<Vec2> {
        let focus = self.focus.as_ref()?;
        let Some(actor) = actors.get(focus.as_str()) else {
            warn!(actor = %focus, "view_focus_actor_missing");
            return None;
        };
        let local = actor.position() - self.camera.origin;
        let center = Vec2::new(self.camera.width * 0.5, self.camera.height * 0.5);
        Some(local - center)
    }

    /// Renders, then composites onto `destination` centred at `position`.
    pub fn draw(&mut self, destination: &mut Surface, actors: &ActorTable) {
        if !self.visible {
            return;
        }
        self.render(actors);
        destination.draw_surface_centered(&self.surface, self.position);
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("position", &self.position)
            .field("camera", &self.camera)
            .field("visible", &self.visible)
            .field("focus", &self.focus)
            .field("visible_actors", &self.visible_actors)
            .field("has_map", &self.map.is_some())
            .field("has_overlay", &self.overlay.is_some())
            .finish()
    }
}
