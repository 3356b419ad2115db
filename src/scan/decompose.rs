//! Boundary extraction on the pixel-corner grid.
//!
//! Contours run between pixels rather than through pixel centres, so a
//! straight edge of N pixels produces 2 points, not N. Outer boundaries come
//! out clockwise on screen (positive area), holes counter-clockwise.

use std::collections::HashSet;

use kurbo::Point;

use crate::error::TraceError;

/// Accumulated matching cells of one scan.
#[derive(Debug, Clone)]
pub struct CellMask {
    data: Vec<bool>,
    width: i32,
    height: i32,
}

impl CellMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![false; width as usize * height as usize],
            width: width as i32,
            height: height as i32,
        }
    }

    pub fn set(&mut self, x: u32, y: u32) {
        if (x as i32) < self.width && (y as i32) < self.height {
            self.data[y as usize * self.width as usize + x as usize] = true;
        }
    }

    /// Cell at (x, y). Out-of-bounds = false.
    pub fn get(&self, x: i32, y: i32) -> bool {
        if x < 0 || x >= self.width || y < 0 || y >= self.height {
            return false;
        }
        self.data[(y * self.width + x) as usize]
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }
}

/// Edge direction on the corner grid (y down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Dir {
    Right,
    Down,
    Left,
    Up,
}

impl Dir {
    fn step(self) -> (i32, i32) {
        match self {
            Dir::Right => (1, 0),
            Dir::Down => (0, 1),
            Dir::Left => (-1, 0),
            Dir::Up => (0, -1),
        }
    }

    /// Clockwise turn on screen.
    fn cw(self) -> Dir {
        match self {
            Dir::Right => Dir::Down,
            Dir::Down => Dir::Left,
            Dir::Left => Dir::Up,
            Dir::Up => Dir::Right,
        }
    }

    fn ccw(self) -> Dir {
        self.cw().cw().cw()
    }
}

/// Whether a boundary edge leaves corner (vx, vy) in direction `dir`, with
/// the set cell on its right-hand side (screen clockwise).
fn has_edge(mask: &CellMask, vx: i32, vy: i32, dir: Dir) -> bool {
    match dir {
        Dir::Right => mask.get(vx, vy) && !mask.get(vx, vy - 1),
        Dir::Down => mask.get(vx - 1, vy) && !mask.get(vx, vy),
        Dir::Left => mask.get(vx - 1, vy - 1) && !mask.get(vx - 1, vy),
        Dir::Up => mask.get(vx, vy - 1) && !mask.get(vx - 1, vy - 1),
    }
}

/// Trace every boundary loop of the mask, in raster order of first cell.
///
/// At a saddle (two cells touching diagonally) the clockwise turn is taken,
/// so diagonal neighbours stay separate loops.
pub fn trace_boundaries(mask: &CellMask) -> Result<Vec<Vec<Point>>, TraceError> {
    let mut visited: HashSet<(i32, i32, Dir)> = HashSet::new();
    let mut loops = Vec::new();

    for y in 0..mask.height {
        for x in 0..mask.width {
            if !has_edge(mask, x, y, Dir::Right) || visited.contains(&(x, y, Dir::Right)) {
                continue;
            }
            loops.push(trace_loop(mask, x, y, &mut visited)?);
        }
    }
    Ok(loops)
}

fn trace_loop(
    mask: &CellMask,
    x: i32,
    y: i32,
    visited: &mut HashSet<(i32, i32, Dir)>,
) -> Result<Vec<Point>, TraceError> {
    let start = (x, y, Dir::Right);
    let (mut vx, mut vy, mut dir) = start;
    let mut corners: Vec<(i32, i32)> = Vec::new();
    let mut dirs: Vec<Dir> = Vec::new();

    loop {
        visited.insert((vx, vy, dir));
        corners.push((vx, vy));
        dirs.push(dir);

        let (dx, dy) = dir.step();
        vx += dx;
        vy += dy;
        dir = [dir.cw(), dir, dir.ccw()]
            .into_iter()
            .find(|&d| has_edge(mask, vx, vy, d))
            .ok_or_else(|| TraceError::invariant(format!("open boundary at ({vx}, {vy})")))?;

        if (vx, vy, dir) == start {
            break;
        }
    }

    // Keep only the corners where the direction changes.
    let n = corners.len();
    Ok((0..n)
        .filter(|&i| dirs[(i + n - 1) % n] != dirs[i])
        .map(|i| Point::new(corners[i].0 as f64, corners[i].1 as f64))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::signed_area;

    fn mask_from(rows: &[&str]) -> CellMask {
        let mut mask = CellMask::new(rows[0].len() as u32, rows.len() as u32);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                if c == '#' {
                    mask.set(x as u32, y as u32);
                }
            }
        }
        mask
    }

    #[test]
    fn rectangle_has_four_corners() {
        let mask = mask_from(&["......", ".####.", ".####.", "......"]);
        let loops = trace_boundaries(&mask).unwrap();
        assert_eq!(loops.len(), 1);
        assert_eq!(
            loops[0],
            vec![
                Point::new(1.0, 1.0),
                Point::new(5.0, 1.0),
                Point::new(5.0, 3.0),
                Point::new(1.0, 3.0),
            ]
        );
        assert_eq!(signed_area(&loops[0]), 8.0);
    }

    #[test]
    fn hole_runs_counter_clockwise() {
        let mask = mask_from(&["###", "#.#", "###"]);
        let loops = trace_boundaries(&mask).unwrap();
        assert_eq!(loops.len(), 2);
        assert_eq!(signed_area(&loops[0]), 9.0);
        assert_eq!(signed_area(&loops[1]), -1.0);
    }

    #[test]
    fn diagonal_cells_stay_separate() {
        let mask = mask_from(&["#.", ".#"]);
        let loops = trace_boundaries(&mask).unwrap();
        assert_eq!(loops.len(), 2);
        assert!(loops.iter().all(|l| l.len() == 4));
    }
}
