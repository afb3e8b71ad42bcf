use std::collections::hash_map;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use super::geometry::{Rect, Vec2};
use super::ids::ActorId;
use super::surface::{Bitmap, Surface};

/// A positioned sprite that scripts and input can move around a scene.
///
/// `position` is the sprite's centre; `clip` is recomputed from it on every
/// move so it never goes stale.
#[derive(Debug, Clone)]
pub struct Actor {
    position: Vec2,
    destinations: VecDeque<Vec2>,
    sprite: Rc<Bitmap>,
    clip: Rect,
    pub speed: f32,
    pub visible: bool,
    pub collision: bool,
}

impl Actor {
    pub fn new(sprite: Rc<Bitmap>, position: Vec2, speed: f32) -> Self {
        let clip = clip_for(&sprite, position);
        Self {
            position,
            destinations: VecDeque::new(),
            sprite,
            clip,
            speed,
            visible: false,
            collision: true,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn clip(&self) -> Rect {
        self.clip
    }

    pub fn sprite(&self) -> &Bitmap {
        &self.sprite
    }

    /// Relocates without any bounds or collision checks; the scene owns those.
    pub fn move_to(&mut self, position: Vec2) {
        self.position = position;
        self.clip = clip_for(&self.sprite, position);
    }

    pub fn move_by(&mut self, delta: Vec2) {
        self.move_to(self.position + delta);
    }

    pub fn queue_destination(&mut self, destination: Vec2) {
        self.destinations.push_back(destination);
    }

    pub fn destinations(&self) -> &VecDeque<Vec2> {
        &self.destinations
    }

    pub fn clear_destinations(&mut self) {
        self.destinations.clear();
    }

    pub fn is_idle(&self) -> bool {
        self.destinations.is_empty()
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

    pub fn set_collision(&mut self, collision: bool) {
        self.collision = collision;
    }

    /// Advances toward the head of the destination queue by `travel` units.
    ///
    /// Arrival snaps exactly onto the destination and pops it, so the actor
    /// never overshoots. A zero-length leg counts as already arrived. Returns
    /// true when a destination was reached this step.
    pub fn step_toward_destination(&mut self, travel: f32) -> bool {
        let Some(&destination) = self.destinations.front() else {
            return false;
        };

        let motion = destination - self.position;
        let distance = motion.length();
        if distance == 0.0 || travel >= distance {
            self.move_to(destination);
            self.destinations.pop_front();
            return true;
        }

        self.move_to(self.position + motion * (travel / distance));
        false
    }

    /// Draws the sprite relative to the camera origin of the target view.
    pub fn draw(&self, surface: &mut Surface, camera_origin: Vec2) {
        surface.draw_bitmap_centered(&self.sprite, self.position - camera_origin);
    }
}

fn clip_for(sprite: &Bitmap, position: Vec2) -> Rect {
    Rect::from_center(position, sprite.width() as f32, sprite.height() as f32)
}

/// The engine-wide actor registry. Scenes and views refer to entries by id.
#[derive(Debug, Default)]
pub struct ActorTable {
    actors: HashMap<ActorId, Actor>,
}

impl ActorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the replaced actor when `id` was already registered.
    pub fn insert(&mut self, id: ActorId, actor: Actor) -> Option<Actor> {
        self.actors.insert(id, actor)
    }

    pub fn get(&self, id: &str) -> Option<&Actor> {
        self.actors.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Actor> {
        self.actors.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.actors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, ActorId, Actor> {
        self.actors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor_at(x: f32, y: f32) -> Actor {
        Actor::new(
            Rc::new(Bitmap::filled(4, 2, [1, 2, 3, 255])),
            Vec2::new(x, y),
            1.0,
        )
    }

    #[test]
    fn empty_queue_is_a_no_op() {
        let mut actor = actor_at(3.0, 4.0);
        assert!(!actor.step_toward_destination(100.0));
        assert_eq!(actor.position(), Vec2::new(3.0, 4.0));
    }

    #[test]
    fn arrival_snaps_exactly_and_empties_queue() {
        let mut actor = actor_at(0.0, 0.0);
        actor.queue_destination(Vec2::new(10.0, 10.0));

        assert!(actor.step_toward_destination(50.0));
        assert_eq!(actor.position(), Vec2::new(10.0, 10.0));
        assert!(actor.is_idle());
        assert_eq!(actor.clip(), Rect::new(8.0, 9.0, 12.0, 11.0));
    }

    #[test]
    fn waypoints_are_consumed_in_fifo_order() {
        let mut actor = actor_at(0.0, 0.0);
        actor.queue_destination(Vec2::new(5.0, 0.0));
        actor.queue_destination(Vec2::new(5.0, 5.0));

        actor.step_toward_destination(5.0);
        assert_eq!(actor.position(), Vec2::new(5.0, 0.0));
        assert_eq!(actor.destinations().front(), Some(&Vec2::new(5.0, 5.0)));

        actor.step_toward_destination(2.0);
        assert_eq!(actor.position(), Vec2::new(5.0, 2.0));
        actor.step_toward_destination(3.0);
        assert_eq!(actor.position(), Vec2::new(5.0, 5.0));
        assert!(actor.is_idle());
    }

    #[test]
    fn zero_distance_leg_pops_immediately() {
        let mut actor = actor_at(2.0, 2.0);
        actor.queue_destination(Vec2::new(2.0, 2.0));
        actor.queue_destination(Vec2::new(4.0, 2.0));

        assert!(actor.step_toward_destination(0.0));
        assert_eq!(actor.position(), Vec2::new(2.0, 2.0));
        assert_eq!(actor.destinations().len(), 1);
        assert!(actor.position().x.is_finite());
    }

    #[test]
    fn partial_travel_interpolates_along_the_leg() {
        let mut actor = actor_at(0.0, 0.0);
        actor.queue_destination(Vec2::new(6.0, 8.0));

        assert!(!actor.step_toward_destination(5.0));
        let position = actor.position();
        assert!((position.x - 3.0).abs() < 1e-5);
        assert!((position.y - 4.0).abs() < 1e-5);
        assert_eq!(actor.destinations().len(), 1);
    }

    #[test]
    fn clip_follows_every_position_change() {
        let mut actor = actor_at(0.0, 0.0);
        actor.move_by(Vec2::new(2.0, 1.0));
        assert_eq!(actor.clip(), Rect::from_center(Vec2::new(2.0, 1.0), 4.0, 2.0));
    }

    #[test]
    fn table_replaces_by_id() {
        let mut table = ActorTable::new();
        assert!(table.insert(ActorId::from("a"), actor_at(0.0, 0.0)).is_none());
        assert!(table.insert(ActorId::from("a"), actor_at(1.0, 0.0)).is_some());
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get("a").map(Actor::position),
            Some(Vec2::new(1.0, 0.0))
        );
    }
}
