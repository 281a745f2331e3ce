//! External region extraction for binary masks.
//!
//! Foreground is 8-connected and background 4-connected, the usual pairing that
//! keeps borders and holes topologically consistent. Only outermost regions are
//! reported: a blob sitting inside a hole of another blob is not a separate
//! candidate. Each region's area is the polygon (shoelace) area of its traced
//! outer boundary, measured through pixel centers, so a filled `w x h`
//! rectangle measures `(w - 1) * (h - 1)` and an isolated pixel measures 0.

use crate::frame::BinaryMask;

/// A connected foreground region of a binary mask.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionCandidate {
    /// Polygon area of the outer boundary, in square pixels.
    pub area: f64,
    /// Number of foreground pixels in the region.
    pub pixels: usize,
    /// Outer boundary, clockwise, starting at the top-left-most pixel.
    pub boundary: Vec<(i32, i32)>,
}

// Clockwise in image coordinates (y grows downward), starting east.
const DIRS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];
const WEST: usize = 4;

/// Mask padded by a one pixel zero frame so tracing never leaves the grid.
struct Padded {
    width: i32,
    height: i32,
    cells: Vec<bool>,
}

impl Padded {
    fn new(mask: &BinaryMask) -> Self {
        let width = mask.width() as i32 + 2;
        let height = mask.height() as i32 + 2;
        let mut cells = vec![false; (width * height) as usize];
        for y in 0..mask.height() {
            for x in 0..mask.width() {
                if mask.is_set(x, y) {
                    cells[((y as i32 + 1) * width + x as i32 + 1) as usize] = true;
                }
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    fn index(&self, x: i32, y: i32) -> usize {
        (y * self.width + x) as usize
    }

    fn inside(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    fn on(&self, x: i32, y: i32) -> bool {
        self.inside(x, y) && self.cells[self.index(x, y)]
    }

    /// Background reachable from the frame through 4-connected steps.
    fn outer_background(&self) -> Vec<bool> {
        let mut outside = vec![false; self.cells.len()];
        let mut stack = vec![(0, 0)];
        outside[0] = true;
        while let Some((x, y)) = stack.pop() {
            for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                let (nx, ny) = (x + dx, y + dy);
                if !self.inside(nx, ny) {
                    continue;
                }
                let idx = self.index(nx, ny);
                if !outside[idx] && !self.cells[idx] {
                    outside[idx] = true;
                    stack.push((nx, ny));
                }
            }
        }
        outside
    }
}

/// Extract the outermost connected regions of `mask`, in raster order of their
/// top-left-most pixel.
pub fn external_regions(mask: &BinaryMask) -> Vec<RegionCandidate> {
    if mask.is_empty() {
        return Vec::new();
    }
    let grid = Padded::new(mask);
    let outside = grid.outer_background();
    let mut visited = vec![false; grid.cells.len()];
    let mut regions = Vec::new();

    for y in 0..grid.height {
        for x in 0..grid.width {
            let idx = grid.index(x, y);
            if !grid.cells[idx] || visited[idx] {
                continue;
            }
            // Raster order guarantees (x, y) is this component's top-left-most pixel.
            let (pixels, external) = flood_component(&grid, &outside, &mut visited, (x, y));
            if !external {
                continue;
            }
            let boundary = trace_boundary(&grid, (x, y));
            let area = polygon_area(&boundary);
            regions.push(RegionCandidate {
                area,
                pixels,
                boundary: boundary.into_iter().map(|(bx, by)| (bx - 1, by - 1)).collect(),
            });
        }
    }
    regions
}

/// Mark an 8-connected component visited. Returns its pixel count and whether it
/// touches the outer background.
fn flood_component(
    grid: &Padded,
    outside: &[bool],
    visited: &mut [bool],
    seed: (i32, i32),
) -> (usize, bool) {
    let mut stack = vec![seed];
    visited[grid.index(seed.0, seed.1)] = true;
    let mut pixels = 0;
    let mut external = false;

    while let Some((x, y)) = stack.pop() {
        pixels += 1;
        for (dx, dy) in DIRS {
            let (nx, ny) = (x + dx, y + dy);
            if !grid.inside(nx, ny) {
                continue;
            }
            let idx = grid.index(nx, ny);
            if grid.cells[idx] {
                if !visited[idx] {
                    visited[idx] = true;
                    stack.push((nx, ny));
                }
            } else if (dx == 0 || dy == 0) && outside[idx] {
                external = true;
            }
        }
    }
    (pixels, external)
}

/// Moore-neighbour trace of the outer boundary starting at the component's
/// top-left-most pixel. Stops when the first move is about to repeat.
fn trace_boundary(grid: &Padded, start: (i32, i32)) -> Vec<(i32, i32)> {
    let mut boundary = vec![start];
    let Some((first, first_back)) = next_boundary_pixel(grid, start, WEST) else {
        return boundary;
    };

    let mut current = first;
    let mut back = first_back;
    let limit = grid.cells.len() * 4;
    while boundary.len() <= limit {
        if current == start {
            match next_boundary_pixel(grid, current, back) {
                Some((next, _)) if next == first => break,
                Some((next, next_back)) => {
                    boundary.push(current);
                    current = next;
                    back = next_back;
                    continue;
                }
                None => break,
            }
        }
        boundary.push(current);
        match next_boundary_pixel(grid, current, back) {
            Some((next, next_back)) => {
                current = next;
                back = next_back;
            }
            None => break,
        }
    }
    boundary
}

/// From `current`, scan neighbours clockwise starting just after the background
/// neighbour at `back`. Returns the next foreground pixel and the direction from
/// it to the last background pixel examined.
fn next_boundary_pixel(
    grid: &Padded,
    current: (i32, i32),
    back: usize,
) -> Option<((i32, i32), usize)> {
    let mut prev = (current.0 + DIRS[back].0, current.1 + DIRS[back].1);
    for step in 1..=8 {
        let dir = (back + step) % 8;
        let cand = (current.0 + DIRS[dir].0, current.1 + DIRS[dir].1);
        if grid.on(cand.0, cand.1) {
            let delta = (prev.0 - cand.0, prev.1 - cand.1);
            let new_back = DIRS.iter().position(|&d| d == delta)?;
            return Some((cand, new_back));
        }
        prev = cand;
    }
    None
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[(i32, i32)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, &(x0, y0)) in points.iter().enumerate() {
        let (x1, y1) = points[(i + 1) % points.len()];
        twice += x0 as i64 * y1 as i64 - x1 as i64 * y0 as i64;
    }
    (twice.abs() as f64) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with_rects(w: u32, h: u32, rects: &[(u32, u32, u32, u32)]) -> BinaryMask {
        BinaryMask::from_fn(w, h, |x, y| {
            rects
                .iter()
                .any(|&(rx, ry, rw, rh)| x >= rx && x < rx + rw && y >= ry && y < ry + rh)
        })
    }

    #[test]
    fn empty_mask_has_no_regions() {
        assert!(external_regions(&BinaryMask::empty(16, 16)).is_empty());
        assert!(external_regions(&BinaryMask::empty(0, 0)).is_empty());
    }

    #[test]
    fn rectangle_area_is_measured_between_pixel_centers() {
        let mask = mask_with_rects(20, 20, &[(3, 4, 5, 7)]);
        let regions = external_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 24.0);
        assert_eq!(regions[0].pixels, 35);
        assert_eq!(regions[0].boundary[0], (3, 4));
    }

    #[test]
    fn single_pixel_and_lines_have_zero_area() {
        let mask = mask_with_rects(10, 10, &[(1, 1, 1, 1), (4, 2, 5, 1)]);
        let regions = external_regions(&mask);
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|r| r.area == 0.0));
    }

    #[test]
    fn diagonal_neighbours_join_one_region() {
        let mask = BinaryMask::from_fn(6, 6, |x, y| x == y);
        assert_eq!(external_regions(&mask).len(), 1);
    }

    #[test]
    fn region_touching_image_edge_is_traced() {
        let mask = mask_with_rects(8, 8, &[(0, 0, 4, 4)]);
        let regions = external_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 9.0);
    }

    #[test]
    fn blob_inside_hole_is_not_external() {
        // 9x9 ring with a 1-pixel wall, and a 1x1 dot in the middle of the hole.
        let mask = BinaryMask::from_fn(13, 13, |x, y| {
            let ring = (2..=10).contains(&x)
                && (2..=10).contains(&y)
                && (x == 2 || x == 10 || y == 2 || y == 10);
            ring || (x == 6 && y == 6)
        });
        let regions = external_regions(&mask);
        assert_eq!(regions.len(), 1);
        // outer boundary of the ring encloses the hole
        assert_eq!(regions[0].area, 64.0);
    }

    #[test]
    fn concave_corner_is_cut_diagonally() {
        let thick = mask_with_rects(12, 12, &[(1, 1, 3, 8), (1, 6, 8, 3)]);
        let regions = external_regions(&thick);
        assert_eq!(regions.len(), 1);
        // 24 for the axis-aligned outline, plus half a pixel where the
        // 8-connected boundary steps across the inner corner
        assert_eq!(regions[0].area, 24.5);
        assert_eq!(regions[0].pixels, 24 + 15);
    }

    #[test]
    fn shoelace_of_square() {
        assert_eq!(polygon_area(&[(0, 0), (4, 0), (4, 4), (0, 4)]), 16.0);
        assert_eq!(polygon_area(&[(0, 0), (4, 0)]), 0.0);
    }
}
