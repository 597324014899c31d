//! Square validation grids over an AOI and their random subsampling.
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::aoi::AreaOfInterest;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub id: usize,
    /// [min_x, min_y, max_x, max_y]
    pub bounds: [f64; 4],
    /// Reference label: 1 damaged, 0 intact, absent when not yet surveyed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<u8>,
}

impl GridCell {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.bounds[0] + self.bounds[2]) / 2.0,
            (self.bounds[1] + self.bounds[3]) / 2.0,
        )
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.bounds[0] && x < self.bounds[2] && y >= self.bounds[1] && y < self.bounds[3]
    }
}

/// Cells of `cell_size` aligned on multiples of the size from the origin,
/// covering the AOI bounds; only cells whose centre lies in the AOI are kept.
/// Ids run from 1 in row-major order starting at the top-left.
pub fn fishnet(aoi: &AreaOfInterest, cell_size: f64) -> Result<Vec<GridCell>> {
    if !(cell_size.is_finite() && cell_size > 0.0) {
        return Err(Error::InvalidArgument {
            arg: "cell_size",
            value: cell_size.to_string(),
        });
    }
    let [min_x, min_y, max_x, max_y] = aoi.bounds();
    let col0 = (min_x / cell_size).floor() as i64;
    let col1 = (max_x / cell_size).ceil() as i64;
    let row0 = (min_y / cell_size).floor() as i64;
    let row1 = (max_y / cell_size).ceil() as i64;

    let mut cells = Vec::new();
    for row in (row0..row1).rev() {
        for col in col0..col1 {
            let x0 = col as f64 * cell_size;
            let y0 = row as f64 * cell_size;
            let mut cell = GridCell {
                id: 0,
                bounds: [x0, y0, x0 + cell_size, y0 + cell_size],
                damage: None,
            };
            let (cx, cy) = cell.center();
            if aoi.contains(cx, cy) {
                cell.id = cells.len() + 1;
                cells.push(cell);
            }
        }
    }
    info!("Fishnet of {} cells at {} units", cells.len(), cell_size);
    Ok(cells)
}

/// Random subset of `count` cells, renumbered from 1 in selection order.
/// A fixed `seed` makes the selection reproducible.
pub fn select_random(mut cells: Vec<GridCell>, count: usize, seed: Option<u64>) -> Vec<GridCell> {
    if count > cells.len() {
        warn!(
            "Requested {} cells but only {} are available; keeping all",
            count,
            cells.len()
        );
    }
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    cells.shuffle(&mut rng);
    cells.truncate(count);
    for (i, cell) in cells.iter_mut().enumerate() {
        cell.id = i + 1;
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fishnet_keeps_cells_centred_in_aoi() {
        let aoi = AreaOfInterest::new(vec![[0.0, 0.0], [110.0, 0.0], [0.0, 110.0], [0.0, 0.0]])
            .unwrap();
        let cells = fishnet(&aoi, 20.0).unwrap();
        // centres (10+20i, 10+20j) with i + j <= 4 lie below the hypotenuse
        assert_eq!(cells.len(), 15);
        assert!(cells.iter().all(|c| c.center().0 + c.center().1 < 110.0));
        assert_eq!(cells[0].id, 1);
        assert_eq!(cells[0].bounds, [0.0, 80.0, 20.0, 100.0]);
    }

    #[test]
    fn selection_is_seeded_and_renumbered() {
        let aoi = AreaOfInterest::from_bounds(0.0, 0.0, 200.0, 200.0).unwrap();
        let cells = fishnet(&aoi, 20.0).unwrap();
        assert_eq!(cells.len(), 100);
        let a = select_random(cells.clone(), 28, Some(7));
        let b = select_random(cells.clone(), 28, Some(7));
        assert_eq!(a, b);
        assert_eq!(a.len(), 28);
        assert_eq!(a.iter().map(|c| c.id).collect::<Vec<_>>(), (1..=28).collect::<Vec<_>>());
        assert_eq!(select_random(cells, 500, Some(1)).len(), 100);
    }

    #[test]
    fn non_positive_cell_size_is_rejected() {
        let aoi = AreaOfInterest::from_bounds(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(fishnet(&aoi, 0.0).is_err());
    }
}
