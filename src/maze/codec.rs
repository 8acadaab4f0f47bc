//! Binary snapshot of a maze, used to persist the explored map.
//!
//! The blob is a postcard encoded [`Snapshot`] followed by the
//! CRC-16/XMODEM of the payload (little endian).

use super::{Maze, UNREACHABLE};
use crate::geometry::{GridPoint, GridPose};
use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

const MAGIC: [u8; 4] = *b"MMAZ";
const VERSION: u8 = 2;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
struct Votes {
    wall: [u8; 4],
    free: [u8; 4],
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct Snapshot {
    magic: [u8; 4],
    version: u8,
    width: u8,
    height: u8,
    start: GridPose,
    exploring: bool,
    returning: bool,
    goal: Vec<GridPoint>,
    cells: Vec<Votes>,
    route: Vec<(u16, GridPose)>,
}

impl Snapshot {
    fn of(maze: &Maze) -> Self {
        Snapshot {
            magic: MAGIC,
            version: VERSION,
            width: maze.width,
            height: maze.height,
            start: maze.start,
            exploring: maze.exploring,
            returning: maze.returning,
            goal: maze.goal.iter().copied().collect(),
            cells: maze
                .cells
                .iter()
                .map(|c| Votes {
                    wall: c.wall_count,
                    free: c.free_count,
                })
                .collect(),
            route: maze.best_route.iter().map(|(c, p)| (*c, *p)).collect(),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.magic == MAGIC, "Not a maze snapshot");
        ensure!(self.version == VERSION, "Unsupported maze version {}", self.version);
        let (width, height) = (self.width, self.height);
        ensure!(width > 0 && height > 0, "Empty maze {}x{}", width, height);
        let inside = |p: GridPoint| p.x < width && p.y < height;
        ensure!(inside(self.start.position), "Start is outside the maze");
        ensure!(self.goal.iter().all(|p| inside(*p)), "Goal is outside the maze");
        ensure!(
            self.cells.len() == width as usize * height as usize,
            "Expected {} cells, found {}",
            width as usize * height as usize,
            self.cells.len()
        );
        for (cost, pose) in self.route.iter() {
            ensure!(*cost < UNREACHABLE, "Route entry with unreachable cost");
            ensure!(inside(pose.position), "Route leaves the maze");
        }
        Ok(())
    }
}

pub fn to_bytes(maze: &Maze) -> anyhow::Result<Vec<u8>> {
    let mut buf = postcard::to_allocvec(&Snapshot::of(maze)).context("Failed to encode maze")?;
    let crc = crc16::State::<crc16::XMODEM>::calculate(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Rebuilds a maze and its costmap from a snapshot.
pub fn from_bytes(data: &[u8]) -> anyhow::Result<Maze> {
    ensure!(data.len() >= 2, "Maze data too short ({} bytes)", data.len());
    let (body, tail) = data.split_at(data.len() - 2);
    let expected = u16::from_le_bytes([tail[0], tail[1]]);
    let actual = crc16::State::<crc16::XMODEM>::calculate(body);
    ensure!(
        expected == actual,
        "Maze checksum mismatch: {:04X} != {:04X}",
        expected,
        actual
    );

    let (snapshot, rest): (Snapshot, _) =
        postcard::take_from_bytes(body).context("Malformed maze data")?;
    ensure!(rest.is_empty(), "Trailing bytes in maze data");
    snapshot.validate()?;

    let mut maze = Maze::new(
        snapshot.width,
        snapshot.height,
        snapshot.start,
        snapshot.goal.iter().copied(),
    );
    for (cell, votes) in maze.cells.iter_mut().zip(snapshot.cells.iter()) {
        cell.wall_count = votes.wall;
        cell.free_count = votes.free;
    }
    maze.exploring = snapshot.exploring;
    maze.returning = snapshot.returning;
    maze.best_route = snapshot.route.into_iter().collect();
    maze.calculate_costmap();
    Ok(maze)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Side;
    use crate::maze::Information;
    use crate::sensors::Observation;

    fn explored() -> Maze {
        let start = GridPose::new(GridPoint::new(0, 0), Side::Up);
        let mut maze = Maze::new(4, 4, start, [GridPoint::new(2, 2), GridPoint::new(3, 3)]);
        let info = Information {
            left: Observation::Free,
            front: Observation::Wall,
            right: Observation::Wall,
            ..Information::default()
        };
        maze.update(GridPose::new(GridPoint::new(1, 1), Side::Up), &info);
        maze.update(GridPose::new(GridPoint::new(2, 2), Side::Up), &Information::default());
        maze.update(GridPose::new(GridPoint::new(0, 0), Side::Down), &Information::default());
        maze
    }

    #[test]
    fn snapshot_restores_walls_flags_and_route() {
        let maze = explored();
        assert!(!maze.exploring());
        let restored = from_bytes(&to_bytes(&maze).unwrap()).unwrap();

        assert_eq!(restored.cells, maze.cells);
        assert_eq!(restored.goal, maze.goal);
        assert_eq!(restored.start(), maze.start());
        assert_eq!(restored.exploring(), maze.exploring());
        assert_eq!(restored.best_route(), maze.best_route());
        assert!(!restored.best_route().is_empty());
    }

    #[test]
    fn corruption_is_detected() {
        let mut bytes = to_bytes(&explored()).unwrap();
        bytes[20] ^= 0x01;
        assert!(from_bytes(&bytes).is_err());
    }

    #[test]
    fn truncated_data_is_rejected() {
        let bytes = to_bytes(&explored()).unwrap();
        assert!(from_bytes(&bytes[..1]).is_err());
        let mut short = bytes[..bytes.len() - 10].to_vec();
        let crc = crc16::State::<crc16::XMODEM>::calculate(&short);
        short.extend_from_slice(&crc.to_le_bytes());
        assert!(from_bytes(&short).is_err());
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut bytes = to_bytes(&explored()).unwrap();
        bytes[0] = b'X';
        let body_len = bytes.len() - 2;
        let crc = crc16::State::<crc16::XMODEM>::calculate(&bytes[..body_len]);
        bytes[body_len..].copy_from_slice(&crc.to_le_bytes());
        assert!(from_bytes(&bytes).is_err());
    }

    #[test]
    fn cell_count_must_match_the_size() {
        let mut snapshot = Snapshot::of(&explored());
        snapshot.cells.pop();
        let mut bytes = postcard::to_allocvec(&snapshot).unwrap();
        let crc = crc16::State::<crc16::XMODEM>::calculate(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        assert!(from_bytes(&bytes).is_err());
    }
}
