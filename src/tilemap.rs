use crate::components::TileType;
use crate::physics_core::Aabb;
use bevy::prelude::*;

#[derive(Resource, Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Tilemap {
    pub width: usize,
    pub height: usize,
    pub tiles: Vec<u8>,
    /// Tile the chased target starts on (`P` in level text).
    pub target_spawn: Option<(i32, i32)>,
    /// Tile the planning agent starts on (`A` in level text).
    pub agent_spawn: Option<(i32, i32)>,
}

impl Tilemap {
    /// Parse a level drawn as text, one row per line, top row first.
    pub fn from_ascii<S: AsRef<str>>(rows: &[S]) -> Result<Self, String> {
        let Some(first) = rows.first() else {
            return Err("level has no rows".to_string());
        };
        let width = first.as_ref().chars().count();
        if width == 0 {
            return Err("level rows are empty".to_string());
        }
        let mut tilemap = Tilemap {
            width,
            height: rows.len(),
            tiles: Vec::with_capacity(width * rows.len()),
            ..Default::default()
        };
        let mut unknown = Vec::new();
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.chars().count() != width {
                return Err(format!(
                    "row {y} has {} columns, expected {width}",
                    row.chars().count()
                ));
            }
            for (x, c) in row.chars().enumerate() {
                let tile = match c {
                    '#' => TileType::Floor,
                    'H' => TileType::Ladder,
                    '.' | ' ' => TileType::Empty,
                    'P' => {
                        tilemap.target_spawn = Some((x as i32, y as i32));
                        TileType::Empty
                    }
                    'A' => {
                        tilemap.agent_spawn = Some((x as i32, y as i32));
                        TileType::Empty
                    }
                    other => {
                        if !unknown.contains(&other) {
                            unknown.push(other);
                        }
                        TileType::Empty
                    }
                };
                tilemap.tiles.push(tile as u8);
            }
        }
        if !unknown.is_empty() {
            warn!("treating unknown tiles {unknown:?} as empty");
        }
        Ok(tilemap)
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let rows: Vec<&str> = text
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .collect();
        Self::from_ascii(&rows)
    }

    pub fn get_tile(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return TileType::Empty as u8;
        }
        self.tiles[y as usize * self.width + x as usize]
    }

    pub fn get(&self, x: i32, y: i32) -> TileType {
        TileType::from_u8(self.get_tile(x, y))
    }

    #[cfg(test)]
    pub fn set(&mut self, x: i32, y: i32, tile: TileType) {
        if x >= 0 && y >= 0 && x < self.width as i32 && y < self.height as i32 {
            self.tiles[y as usize * self.width + x as usize] = tile as u8;
        }
    }

    /// Tiles overlapped by a world-space box. Edges that merely touch a
    /// tile do not count.
    pub fn coord2map(&self, aabb: &Aabb, tile_size: f32) -> TileRect {
        TileRect {
            x0: (aabb.min_x / tile_size).floor() as i32,
            y0: (aabb.min_y / tile_size).floor() as i32,
            x1: (aabb.max_x / tile_size).ceil() as i32,
            y1: (aabb.max_y / tile_size).ceil() as i32,
        }
    }

    /// World-space centre of a body of `height` standing on top of the tile
    /// below `(tx, ty)`.
    pub fn standing_center(&self, tx: i32, ty: i32, tile_size: f32, height: f32) -> Vec2 {
        Vec2::new(
            (tx as f32 + 0.5) * tile_size,
            (ty + 1) as f32 * tile_size - height / 2.0,
        )
    }

    /// A small two-storey level: the target waits on a platform reachable
    /// by a ladder.
    pub fn demo_level() -> Result<Self, String> {
        const ROWS: [&str; 15] = [
            ".........................",
            ".........................",
            ".........................",
            ".........................",
            ".........................",
            ".........................",
            ".........................",
            ".........................",
            ".........................",
            ".........................",
            "..........P..............",
            "........####H............",
            "............H......#.....",
            ".........A..H.....###....",
            "#########################",
        ];
        Self::from_ascii(&ROWS)
    }
}

/// Half-open rectangle of tile coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

/// Prefix-sum table answering "is there any matching tile in this
/// rectangle" in constant time.
#[derive(Clone, Debug, Default)]
pub struct RangeMap {
    width: usize,
    height: usize,
    sums: Vec<u32>,
}

impl RangeMap {
    pub fn new(tilemap: &Tilemap, f: impl Fn(TileType) -> bool) -> Self {
        let (w, h) = (tilemap.width, tilemap.height);
        let mut sums = vec![0u32; (w + 1) * (h + 1)];
        for y in 0..h {
            let mut row = 0u32;
            for x in 0..w {
                if f(tilemap.get(x as i32, y as i32)) {
                    row += 1;
                }
                sums[(y + 1) * (w + 1) + x + 1] = sums[y * (w + 1) + x + 1] + row;
            }
        }
        Self {
            width: w,
            height: h,
            sums,
        }
    }

    pub fn count(&self, rect: TileRect) -> u32 {
        let x0 = rect.x0.clamp(0, self.width as i32) as usize;
        let x1 = rect.x1.clamp(0, self.width as i32) as usize;
        let y0 = rect.y0.clamp(0, self.height as i32) as usize;
        let y1 = rect.y1.clamp(0, self.height as i32) as usize;
        if x1 <= x0 || y1 <= y0 {
            return 0;
        }
        let stride = self.width + 1;
        self.sums[y1 * stride + x1] + self.sums[y0 * stride + x0]
            - self.sums[y0 * stride + x1]
            - self.sums[y1 * stride + x0]
    }

    pub fn exists(&self, rect: TileRect) -> bool {
        self.count(rect) > 0
    }
}

/// Read-only snapshot of the tile categories the planner tests against.
/// Must be rebuilt whenever the tilemap changes.
#[derive(Resource, Clone, Debug, Default)]
pub struct TileRanges {
    pub obstacle: RangeMap,
    pub grabbable: RangeMap,
    pub stoppable: RangeMap,
}

impl TileRanges {
    pub fn build(tilemap: &Tilemap) -> Self {
        Self {
            obstacle: RangeMap::new(tilemap, TileType::is_solid),
            grabbable: RangeMap::new(tilemap, TileType::is_climbable),
            stoppable: RangeMap::new(tilemap, TileType::is_stoppable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: i32, y0: i32, x1: i32, y1: i32) -> TileRect {
        TileRect { x0, y0, x1, y1 }
    }

    #[test]
    fn parses_tiles_and_spawn_markers() {
        let tm = Tilemap::from_ascii(&["A..P", ".H..", "####"]).unwrap();
        assert_eq!((tm.width, tm.height), (4, 3));
        assert_eq!(tm.get(1, 1), TileType::Ladder);
        assert_eq!(tm.get(2, 2), TileType::Floor);
        assert_eq!(tm.get(3, 0), TileType::Empty);
        assert_eq!(tm.agent_spawn, Some((0, 0)));
        assert_eq!(tm.target_spawn, Some((3, 0)));
        assert_eq!(tm.get(-1, 0), TileType::Empty);
        assert_eq!(tm.get(0, 7), TileType::Empty);
    }

    #[test]
    fn rejects_malformed_levels() {
        assert!(Tilemap::from_ascii::<&str>(&[]).is_err());
        assert!(Tilemap::from_ascii(&["...", ".."]).is_err());
        assert!(Tilemap::from_ascii(&["", ""]).is_err());
    }

    #[test]
    fn unknown_markers_load_as_empty() {
        let tm = Tilemap::from_ascii(&["a.BC", "#H##"]).unwrap();
        assert_eq!((tm.width, tm.height), (4, 2));
        for x in 0..4 {
            assert_eq!(tm.get(x, 0), TileType::Empty);
        }
        assert_eq!(tm.get(1, 1), TileType::Ladder);
        assert_eq!(tm.agent_spawn, None);
    }

    #[test]
    fn parse_skips_blank_lines() {
        let tm = Tilemap::parse("\n..H\n\n###\n").unwrap();
        assert_eq!((tm.width, tm.height), (3, 2));
    }

    #[test]
    fn range_map_counts_matching_tiles() {
        let tm = Tilemap::from_ascii(&["#..", ".H.", "###"]).unwrap();
        let ranges = TileRanges::build(&tm);
        assert_eq!(ranges.obstacle.count(rect(0, 0, 3, 3)), 4);
        assert!(ranges.obstacle.exists(rect(0, 0, 1, 1)));
        assert!(!ranges.obstacle.exists(rect(1, 0, 3, 2)));
        assert!(ranges.grabbable.exists(rect(1, 1, 2, 2)));
        assert_eq!(ranges.stoppable.count(rect(0, 0, 3, 3)), 5);
    }

    #[test]
    fn range_map_clips_out_of_bounds_queries() {
        let tm = Tilemap::from_ascii(&["..", "##"]).unwrap();
        let ranges = TileRanges::build(&tm);
        assert!(ranges.obstacle.exists(rect(-5, -5, 10, 10)));
        assert!(!ranges.obstacle.exists(rect(-5, -5, 10, 1)));
        assert!(!ranges.obstacle.exists(rect(5, 5, 10, 10)));
    }

    #[test]
    fn coord2map_excludes_touching_edges() {
        let tm = Tilemap::from_ascii(&["...."]).unwrap();
        let aabb = Aabb::from_center(24.0, 8.0, 16.0, 16.0);
        assert_eq!(tm.coord2map(&aabb, 16.0), rect(1, 0, 2, 1));
        let straddling = Aabb::from_center(16.0, 8.0, 16.0, 16.0);
        assert_eq!(tm.coord2map(&straddling, 16.0), rect(0, 0, 2, 1));
    }
}
