use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// World and map coordinates are y-up with the origin at the bottom-left.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing at `degrees`, counter-clockwise from east.
    pub fn from_angle_degrees(degrees: f32) -> Self {
        let radians = degrees.to_radians();
        Self {
            x: radians.cos(),
            y: radians.sin(),
        }
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    pub fn distance_to(self, other: Vec2) -> f32 {
        (other - self).length()
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
        }
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        self.scaled(rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;

    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// Cardinal directions for discrete, input-driven movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const fn degrees(self) -> f32 {
        match self {
            Direction::East => 0.0,
            Direction::North => 90.0,
            Direction::West => 180.0,
            Direction::South => 270.0,
        }
    }

    pub const fn unit(self) -> Vec2 {
        match self {
            Direction::North => Vec2::new(0.0, 1.0),
            Direction::East => Vec2::new(1.0, 0.0),
            Direction::South => Vec2::new(0.0, -1.0),
            Direction::West => Vec2::new(-1.0, 0.0),
        }
    }
}

/// Axis-aligned rectangle spanning `[min, max)` on both axes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub const fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min: Vec2::new(min_x, min_y),
            max: Vec2::new(max_x, max_y),
        }
    }

    pub const fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn from_center(center: Vec2, width: f32, height: f32) -> Self {
        let half = Vec2::new(width * 0.5, height * 0.5);
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }

    pub fn moved(&self, delta: Vec2) -> Self {
        Self {
            min: self.min + delta,
            max: self.max + delta,
        }
    }

    pub fn corners(&self) -> [Vec2; 4] {
        [
            self.min,
            Vec2::new(self.max.x, self.min.y),
            self.max,
            Vec2::new(self.min.x, self.max.y),
        ]
    }

    pub fn contains_point(&self, point: Vec2) -> bool {
        self.min.x <= point.x
            && point.x < self.max.x
            && self.min.y <= point.y
            && point.y < self.max.y
    }

    /// Corner containment: every corner of `target` lies inside `self`.
    ///
    /// Because the rectangle is half-open, a target touching the max edge is
    /// not contained.
    pub fn contains_rect(&self, target: &Rect) -> bool {
        target
            .corners()
            .iter()
            .all(|corner| self.contains_point(*corner))
    }

    /// Strict overlap; rectangles that only share an edge do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_rect_checks_every_corner() {
        let target = Rect::new(0.0, 0.0, 200.0, 200.0);
        let inside = Rect::new(20.0, 20.0, 40.0, 40.0);
        let outside = Rect::new(300.0, 200.0, 320.0, 220.0);
        let edge = Rect::new(190.0, 100.0, 210.0, 120.0);

        assert!(target.contains_rect(&inside));
        assert!(!target.contains_rect(&outside));
        assert!(!target.contains_rect(&edge));
    }

    #[test]
    fn touching_edges_do_not_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 20.0, 10.0);
        let c = Rect::new(9.0, 9.0, 12.0, 12.0);

        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
        assert!(c.intersects(&b));
    }

    #[test]
    fn from_center_keeps_extents() {
        let rect = Rect::from_center(Vec2::new(10.0, 20.0), 8.0, 4.0);
        assert_eq!(rect, Rect::new(6.0, 18.0, 14.0, 22.0));
        assert_eq!(rect.center(), Vec2::new(10.0, 20.0));
    }

    #[test]
    fn direction_units_match_angles() {
        for direction in [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ] {
            let from_angle = Vec2::from_angle_degrees(direction.degrees());
            let unit = direction.unit();
            assert!((from_angle.x - unit.x).abs() < 1e-6);
            assert!((from_angle.y - unit.y).abs() < 1e-6);
        }
    }
}
