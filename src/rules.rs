//! Rules module for Conway's Game of Life
//!
//! The GPU evaluates the rule in `rules/conway_classic.wgsl`. This module holds
//! the same rule on the CPU as a reference evaluator: it checks readbacks of
//! the device buffers and never drives the simulation.
//!
//! Game of Life standard rules (B3/S23):
//! 1. Any live cell with two or three live neighbors survives
//! 2. Any dead cell with exactly three live neighbors becomes alive
//! 3. Every other cell is dead in the next generation

mod patterns;

pub use patterns::Pattern;

use crate::grid::GridDimensions;

pub const DEAD: u32 = 0;
pub const LIVE: u32 = 1;

/// Next state of a single cell given its current state and live neighbor count.
pub fn next_state(current: u32, live_neighbors: u32) -> u32 {
    match (current != DEAD, live_neighbors) {
        (true, 2) | (true, 3) => LIVE,
        (false, 3) => LIVE,
        _ => DEAD,
    }
}

/// Count live cells among the 8 neighbors of (x, y), wrapping at the edges.
pub fn count_neighbors(grid: &[u32], dims: GridDimensions, x: u32, y: u32) -> u32 {
    let (width, height) = (dims.width(), dims.height());
    let mut count = 0;

    for dy in 0..3 {
        for dx in 0..3 {
            // Skip the cell itself
            if dx == 1 && dy == 1 {
                continue;
            }

            let nx = (x + width + dx - 1) % width;
            let ny = (y + height + dy - 1) % height;

            if grid[dims.index(nx, ny)] != DEAD {
                count += 1;
            }
        }
    }

    count
}

/// Compute one generation from `source` into `destination`.
///
/// Reads only `source`, so every new value depends on old neighbor values alone.
pub fn step(source: &[u32], destination: &mut [u32], dims: GridDimensions) {
    let size = dims.cell_count();
    assert_eq!(source.len(), size, "source buffer does not match the grid");
    assert_eq!(destination.len(), size, "destination buffer does not match the grid");

    for y in 0..dims.height() {
        for x in 0..dims.width() {
            let idx = dims.index(x, y);
            let neighbors = count_neighbors(source, dims, x, y);
            destination[idx] = next_state(source[idx], neighbors);
        }
    }
}

/// Number of live cells in a generation.
pub fn population(grid: &[u32]) -> usize {
    grid.iter().filter(|&&cell| cell != DEAD).count()
}

/// Place a pattern anchored at (x, y). Cells that fall off an edge wrap around.
pub fn place_pattern(grid: &mut [u32], dims: GridDimensions, pattern: Pattern, x: u32, y: u32) {
    let (width, height) = (dims.width() as i64, dims.height() as i64);

    for &(dx, dy) in pattern.offsets() {
        let cx = (x as i64 + dx as i64).rem_euclid(width) as u32;
        let cy = (y as i64 + dy as i64).rem_euclid(height) as u32;
        grid[dims.index(cx, cy)] = LIVE;
    }
}

/// A dead grid with `pattern` placed at its center.
pub fn grid_with_pattern(dims: GridDimensions, pattern: Pattern) -> Vec<u32> {
    let mut grid = vec![DEAD; dims.cell_count()];
    place_pattern(&mut grid, dims, pattern, dims.width() / 2, dims.height() / 2);
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(width: u32, height: u32) -> GridDimensions {
        GridDimensions::new(width, height).unwrap()
    }

    fn advance(grid: &[u32], dims: GridDimensions, generations: usize) -> Vec<u32> {
        let mut current = grid.to_vec();
        let mut next = vec![DEAD; grid.len()];
        for _ in 0..generations {
            step(&current, &mut next, dims);
            std::mem::swap(&mut current, &mut next);
        }
        current
    }

    #[test]
    fn transition_table() {
        for neighbors in 0..=8 {
            let survives = neighbors == 2 || neighbors == 3;
            assert_eq!(next_state(LIVE, neighbors), u32::from(survives), "live with {neighbors}");
            assert_eq!(next_state(DEAD, neighbors), u32::from(neighbors == 3), "dead with {neighbors}");
        }
    }

    #[test]
    fn block_is_a_still_life() {
        let dims = dims(6, 6);
        let block = grid_with_pattern(dims, Pattern::Block);
        assert_eq!(population(&block), 4);
        assert_eq!(advance(&block, dims, 1), block);
        assert_eq!(advance(&block, dims, 7), block);
    }

    #[test]
    fn blinker_has_period_two() {
        let dims = dims(5, 5);
        let blinker = grid_with_pattern(dims, Pattern::Blinker);

        let once = advance(&blinker, dims, 1);
        assert_ne!(once, blinker);
        assert_eq!(population(&once), 3);
        // Vertical bar turns horizontal around the center.
        for x in 1..4 {
            assert_eq!(once[dims.index(x, 2)], LIVE);
        }

        assert_eq!(advance(&blinker, dims, 2), blinker);
    }

    #[test]
    fn corner_cells_are_neighbors_across_both_edges() {
        let dims = dims(8, 5);
        let mut grid = vec![DEAD; dims.cell_count()];
        grid[dims.index(0, 0)] = LIVE;
        grid[dims.index(7, 4)] = LIVE;

        assert_eq!(count_neighbors(&grid, dims, 0, 0), 1);
        assert_eq!(count_neighbors(&grid, dims, 7, 4), 1);
        // (3, 2) sits away from both.
        assert_eq!(count_neighbors(&grid, dims, 3, 2), 0);
    }

    #[test]
    fn blinker_straddling_the_seam_still_oscillates() {
        let dims = dims(6, 6);
        let mut grid = vec![DEAD; dims.cell_count()];
        // Vertical on column 0; the horizontal phase wraps into column 5.
        place_pattern(&mut grid, dims, Pattern::Blinker, 0, 3);
        let rotated = advance(&grid, dims, 1);
        assert_eq!(rotated[dims.index(5, 3)], LIVE);
        assert_eq!(rotated[dims.index(0, 3)], LIVE);
        assert_eq!(rotated[dims.index(1, 3)], LIVE);
        assert_eq!(advance(&grid, dims, 2), grid);
    }

    #[test]
    fn dead_grid_stays_dead() {
        let dims = dims(9, 7);
        let empty = vec![DEAD; dims.cell_count()];
        assert_eq!(population(&advance(&empty, dims, 10)), 0);
    }

    #[test]
    fn step_reads_only_the_previous_generation() {
        let dims = dims(13, 11);
        let source: Vec<u32> = (0..dims.cell_count() as u32)
            .map(|i| u32::from((i * 7 + i / 3) % 5 < 2))
            .collect();

        let mut first = vec![DEAD; source.len()];
        let mut second = vec![LIVE; source.len()];
        step(&source, &mut first, dims);
        step(&source, &mut second, dims);
        assert_eq!(first, second);

        for y in 0..dims.height() {
            for x in 0..dims.width() {
                let idx = dims.index(x, y);
                let expected = next_state(source[idx], count_neighbors(&source, dims, x, y));
                assert_eq!(first[idx], expected, "cell ({x}, {y})");
            }
        }
    }

    #[test]
    fn glider_translates_diagonally_after_four_generations() {
        let dims = dims(16, 16);
        let glider = grid_with_pattern(dims, Pattern::Glider);
        let moved = advance(&glider, dims, 4);
        assert_eq!(population(&moved), 5);

        let shifted: Vec<(u32, u32)> = (0..dims.height())
            .flat_map(|y| (0..dims.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| glider[dims.index(x, y)] == LIVE)
            .map(|(x, y)| ((x + 1) % 16, (y + 1) % 16))
            .collect();
        for (x, y) in shifted {
            assert_eq!(moved[dims.index(x, y)], LIVE, "cell ({x}, {y})");
        }
    }

    #[test]
    fn patterns_resolve_by_name() {
        for pattern in Pattern::ALL {
            assert_eq!(Pattern::from_name(pattern.name()), Some(pattern));
        }
        assert_eq!(Pattern::from_name(" Glider "), Some(Pattern::Glider));
        assert_eq!(Pattern::from_name("pulsar"), None);
    }

    #[test]
    fn gosper_gun_places_all_cells() {
        let dims = dims(64, 64);
        let grid = grid_with_pattern(dims, Pattern::GosperGliderGun);
        assert_eq!(population(&grid), 36);
    }
}
