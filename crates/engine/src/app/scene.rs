use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{debug, trace, warn};

use super::actor::ActorTable;
use super::engine::EngineError;
use super::geometry::{Direction, Rect, Vec2};
use super::ids::{ActorId, ViewId};
use super::surface::{Color, Surface};
use super::view::{Camera, View};
use crate::content::MapData;

/// A set of views composed in insertion order, plus the actors and static
/// map geometry they share.
#[derive(Debug)]
pub struct Scene {
    base_speed: f32,
    background: Color,
    surface: Surface,
    views: HashMap<ViewId, View>,
    view_order: Vec<ViewId>,
    actors: Vec<ActorId>,
    map: Option<MapData>,
}

impl Scene {
    pub fn new(base_speed: f32, background: Color, width: u32, height: u32) -> Self {
        Self {
            base_speed,
            background,
            surface: Surface::new(width, height),
            views: HashMap::new(),
            view_order: Vec::new(),
            actors: Vec::new(),
            map: None,
        }
    }

    pub fn base_speed(&self) -> f32 {
        self.base_speed
    }

    pub fn background(&self) -> Color {
        self.background
    }

    pub fn set_background(&mut self, background: Color) {
        self.background = background;
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn map(&self) -> Option<&MapData> {
        self.map.as_ref()
    }

    pub fn set_map(&mut self, map: MapData) {
        self.map = Some(map);
    }

    /// Creates a hidden view and appends it to the draw order.
    pub fn new_view(
        &mut self,
        id: ViewId,
        position: Vec2,
        camera: Camera,
        background: Color,
    ) -> &mut View {
        self.attach_view(id, View::new(position, camera, background))
    }

    /// Appends `view` to the draw order. An id that is already attached is
    /// replaced in place, keeping its slot.
    pub fn attach_view(&mut self, id: ViewId, view: View) -> &mut View {
        if !self.views.contains_key(&id) {
            self.view_order.push(id.clone());
        }
        debug!(view = %id, "view_attached");
        match self.views.entry(id) {
            Entry::Occupied(mut entry) => {
                entry.insert(view);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(view),
        }
    }

    pub fn get_view(&self, id: &str) -> Result<&View, EngineError> {
        self.views.get(id).ok_or_else(|| EngineError::ViewNotFound {
            view: id.to_string(),
        })
    }

    pub fn get_view_mut(&mut self, id: &str) -> Result<&mut View, EngineError> {
        self.views.get_mut(id).ok_or_else(|| EngineError::ViewNotFound {
            view: id.to_string(),
        })
    }

    /// Detaches a view; the survivors keep their relative order.
    pub fn remove_view(&mut self, id: &str) -> Option<View> {
        let removed = self.views.remove(id)?;
        self.view_order.retain(|view| view.as_str() != id);
        debug!(view = id, "view_removed");
        Some(removed)
    }

    pub fn view_order(&self) -> &[ViewId] {
        &self.view_order
    }

    /// Binds the scene's map image to a view.
    pub fn use_map(&mut self, view: &str) -> Result<(), EngineError> {
        let image = self
            .map
            .as_ref()
            .map(|map| map.image.clone())
            .ok_or(EngineError::NoMapData)?;
        self.get_view_mut(view)?.bind_map(image);
        Ok(())
    }

    /// Attaches an actor from the engine table. Attaching twice is a no-op.
    pub fn use_actor(&mut self, actor: ActorId) {
        if !self.actors.contains(&actor) {
            self.actors.push(actor);
        }
    }

    pub fn has_actor(&self, actor: &str) -> bool {
        self.actors.iter().any(|id| id.as_str() == actor)
    }

    pub fn actors(&self) -> &[ActorId] {
        &self.actors
    }

    pub fn require_actor(&self, actor: &str) -> Result<(), EngineError> {
        if self.has_actor(actor) {
            Ok(())
        } else {
            Err(EngineError::ActorNotAttached {
                actor: actor.to_string(),
            })
        }
    }

    /// Moves an attached actor one frame's worth in a cardinal direction.
    /// Returns whether the move was allowed.
    pub fn move_actor(
        &self,
        actors: &mut ActorTable,
        actor: &str,
        direction: Direction,
        dt: f32,
    ) -> Result<bool, EngineError> {
        self.move_actor_along(actors, actor, direction.unit(), dt)
    }

    /// Free-form variant of [`Scene::move_actor`]; 0 degrees is east,
    /// 90 is north.
    pub fn move_actor_angle(
        &self,
        actors: &mut ActorTable,
        actor: &str,
        degrees: f32,
        dt: f32,
    ) -> Result<bool, EngineError> {
        self.move_actor_along(actors, actor, Vec2::from_angle_degrees(degrees), dt)
    }

    fn move_actor_along(
        &self,
        actors: &mut ActorTable,
        id: &str,
        unit: Vec2,
        dt: f32,
    ) -> Result<bool, EngineError> {
        self.require_actor(id)?;
        let actor = actors.get_mut(id).ok_or_else(|| EngineError::ActorNotFound {
            actor: id.to_string(),
        })?;

        let movement = unit * (self.base_speed * dt * actor.speed);
        let proposed = actor.clip().moved(movement);
        let allowed = if !actor.collision {
            self.contains(&proposed)
        } else if self.map.is_some() {
            self.collision_free(&proposed)
        } else {
            self.views
                .values()
                .filter(|view| view.focus().is_some_and(|focus| focus.as_str() == id))
                .all(|view| view.camera_contains(&proposed))
        };

        if allowed {
            actor.move_by(movement);
        } else {
            trace!(actor = id, "actor_move_blocked");
        }
        Ok(allowed)
    }

    /// Advances every attached actor along its destination queue.
    pub fn process_actor_destinations(&self, actors: &mut ActorTable, dt: f32) {
        for id in &self.actors {
            let Some(actor) = actors.get_mut(id.as_str()) else {
                warn!(actor = %id, "scene_actor_missing");
                continue;
            };
            if actor.is_idle() {
                continue;
            }
            let travel = dt * self.base_speed * actor.speed;
            if actor.step_toward_destination(travel) {
                trace!(actor = %id, "actor_destination_reached");
            }
        }
    }

    /// True when `rect` overlaps none of the map's collision rectangles.
    pub fn collision_free(&self, rect: &Rect) -> bool {
        self.map.as_ref().map_or(true, |map| {
            !map.collision.iter().any(|obstacle| obstacle.intersects(rect))
        })
    }

    /// Corner containment against the scene's renderable bounds.
    pub fn contains(&self, rect: &Rect) -> bool {
        self.surface.bounds().contains_rect(rect)
    }

    /// Clears to the background and composites every view in draw order.
    pub fn render(&mut self, actors: &ActorTable) -> &Surface {
        self.surface.clear(self.background);
        for id in &self.view_order {
            match self.views.get_mut(id) {
                Some(view) => view.draw(&mut self.surface, actors),
                None => warn!(view = %id, "scene_view_missing"),
            }
        }
        &self.surface
    }
}
