use ndarray::{Array2, Zip};
use tracing::info;

/// Set pixels equal to `value` that have no 8-connected neighbour equal to
/// `value` to 0. Returns the cleaned raster and the number of pixels removed.
pub fn remove_isolated(band: &Array2<f64>, value: f64) -> (Array2<f64>, usize) {
    let (rows, cols) = band.dim();
    let isolated = |r: usize, c: usize| {
        for dr in -1isize..=1 {
            for dc in -1isize..=1 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let (nr, nc) = (r as isize + dr, c as isize + dc);
                if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                    continue;
                }
                if band[[nr as usize, nc as usize]] == value {
                    return false;
                }
            }
        }
        true
    };

    let out = Zip::indexed(band).par_map_collect(|(r, c), &v| {
        if v == value && isolated(r, c) { 0.0 } else { v }
    });
    let removed = Zip::from(band)
        .and(&out)
        .fold(0usize, |n, &a, &b| if a == value && b != value { n + 1 } else { n });
    info!("Removed {} isolated pixels of value {}", removed, value);
    (out, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn single_pixels_are_removed_diagonal_pairs_kept() {
        let band = array![
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 1.0, 0.0],
            [f64::NAN, 0.0, 0.0, 0.0],
        ];
        let (out, removed) = remove_isolated(&band, 1.0);
        assert_eq!(removed, 1);
        assert_eq!(out[[0, 0]], 0.0);
        assert_eq!(out[[1, 3]], 1.0);
        assert_eq!(out[[2, 2]], 1.0);
        assert!(out[[3, 0]].is_nan());
    }
}
