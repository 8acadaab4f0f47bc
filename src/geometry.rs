use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};
use std::ops::{Add, Mul, Sub};

/// Cell coordinate in the maze grid.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPoint {
    pub x: u8,
    pub y: u8,
}

impl GridPoint {
    pub const fn new(x: u8, y: u8) -> Self {
        GridPoint { x, y }
    }

    /// Neighbour in direction `side`, or `None` when it falls outside `width` x `height`.
    pub fn neighbor(self, side: Side, width: u8, height: u8) -> Option<GridPoint> {
        let (dx, dy) = side.offset();
        let x = self.x as i16 + dx as i16;
        let y = self.y as i16 + dy as i16;
        if x < 0 || y < 0 || x >= width as i16 || y >= height as i16 {
            return None;
        }
        Some(GridPoint::new(x as u8, y as u8))
    }
}

/// Discrete heading. The discriminant is the number of quarter turns from +X.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Right = 0,
    Up = 1,
    Left = 2,
    Down = 3,
}

impl Default for Side {
    fn default() -> Self {
        Side::Up
    }
}

impl Side {
    /// Enumeration order, also the tie-break order of the planner.
    pub const ALL: [Side; 4] = [Side::Right, Side::Up, Side::Left, Side::Down];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Side {
        Side::ALL[index % 4]
    }

    pub fn turned_left(self) -> Side {
        Side::from_index(self.index() + 1)
    }

    pub fn turned_right(self) -> Side {
        Side::from_index(self.index() + 3)
    }

    pub fn turned_back(self) -> Side {
        Side::from_index(self.index() + 2)
    }

    pub fn offset(self) -> (i8, i8) {
        match self {
            Side::Right => (1, 0),
            Side::Up => (0, 1),
            Side::Left => (-1, 0),
            Side::Down => (0, -1),
        }
    }

    pub fn angle(self) -> f32 {
        self.index() as f32 * FRAC_PI_2
    }

    pub fn unit(self) -> Point {
        let (dx, dy) = self.offset();
        Point::new(dx as f32, dy as f32)
    }
}

/// Rounds a continuous heading to the nearest of the four sides.
pub fn angle_to_grid(angle: f32) -> Side {
    let quarter = (wrap_angle(angle) / FRAC_PI_2).round() as i32;
    Side::from_index(quarter.rem_euclid(4) as usize)
}

/// Wraps an angle into (-PI, PI].
pub fn wrap_angle(angle: f32) -> f32 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridPose {
    pub position: GridPoint,
    pub orientation: Side,
}

impl GridPose {
    pub const fn new(position: GridPoint, orientation: Side) -> Self {
        GridPose {
            position,
            orientation,
        }
    }

    /// One cell ahead, same heading. Leaving the grid wraps the u8
    /// coordinate, so callers must bounds-check the result.
    pub fn front(&self) -> GridPose {
        let (dx, dy) = self.orientation.offset();
        GridPose {
            position: GridPoint::new(
                self.position.x.wrapping_add(dx as u8),
                self.position.y.wrapping_add(dy as u8),
            ),
            orientation: self.orientation,
        }
    }

    pub fn turned_left(&self) -> GridPose {
        GridPose::new(self.position, self.orientation.turned_left())
    }

    pub fn turned_right(&self) -> GridPose {
        GridPose::new(self.position, self.orientation.turned_right())
    }

    pub fn turned_back(&self) -> GridPose {
        GridPose::new(self.position, self.orientation.turned_back())
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32, // [m]
    pub y: f32, // [m]
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Point { x, y }
    }

    /// Centre of `cell`.
    pub fn from_grid(cell: GridPoint, cell_size: f32) -> Point {
        Point::new(
            (cell.x as f32 + 0.5) * cell_size,
            (cell.y as f32 + 0.5) * cell_size,
        )
    }

    /// Cell containing this point. Negative coordinates saturate to 0.
    pub fn to_grid(&self, cell_size: f32) -> GridPoint {
        GridPoint::new(
            (self.x / cell_size).floor() as u8,
            (self.y / cell_size).floor() as u8,
        )
    }

    pub fn dot(&self, other: Point) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// z component of `self x other`.
    pub fn cross(&self, other: Point) -> f32 {
        self.x * other.y - self.y * other.x
    }

    /// Heading of the vector from `self` to `other`.
    pub fn bearing(&self, other: Point) -> f32 {
        let d = other - *self;
        d.y.atan2(d.x)
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Point {
    type Output = Point;
    fn mul(self, rhs: f32) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Point,
    pub orientation: f32, // [rad]
}

impl Pose {
    pub const fn new(position: Point, orientation: f32) -> Self {
        Pose {
            position,
            orientation,
        }
    }

    pub fn from_grid(pose: GridPose, cell_size: f32) -> Pose {
        Pose::new(
            Point::from_grid(pose.position, cell_size),
            pose.orientation.angle(),
        )
    }

    pub fn to_grid(&self, cell_size: f32) -> GridPose {
        GridPose::new(
            self.position.to_grid(cell_size),
            angle_to_grid(self.orientation),
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct Twist {
    pub linear: f32,  // [m/s] or [m] for displacements
    pub angular: f32, // [rad/s] or [rad] for displacements
}

impl Twist {
    pub const fn new(linear: f32, angular: f32) -> Self {
        Twist { linear, angular }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct State {
    pub pose: Pose,
    pub velocity: Twist,
}
