//! Building-level damage from a binary change raster.
//!
//! A building is damaged when any change pixel overlaps its footprint with
//! positive area. Damaged buildings are then counted per camp polygon.
use std::collections::HashSet;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::aoi::rings_contain;
use crate::core::raster::GeoReference;
use crate::error::{Error, Result};

pub type Ring = Vec<[f64; 2]>;

/// A (multi)polygon feature: every polygon is an exterior ring followed by holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub id: u64,
    pub name: Option<String>,
    pub polygons: Vec<Vec<Ring>>,
}

/// Damaged buildings inside one camp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampDamage {
    #[serde(rename = "IDP_Camp")]
    pub camp: String,
    #[serde(rename = "Damaged_Buildings")]
    pub damaged_buildings: usize,
}

fn vertices(polygons: &[Vec<Ring>]) -> impl Iterator<Item = [f64; 2]> + '_ {
    polygons.iter().flatten().flatten().copied()
}

fn edges(polygons: &[Vec<Ring>]) -> impl Iterator<Item = ([f64; 2], [f64; 2])> + '_ {
    polygons
        .iter()
        .flatten()
        .flat_map(|ring| ring.windows(2).map(|w| (w[0], w[1])))
}

/// Shoelace area of a ring, closed or not.
fn ring_area(ring: &[[f64; 2]]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let [x0, y0] = ring[i];
            let [x1, y1] = ring[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum();
    twice.abs() / 2.0
}

/// One Sutherland-Hodgman pass against a half-plane.
fn clip_half_plane<I, C>(points: &[[f64; 2]], inside: I, cross: C) -> Vec<[f64; 2]>
where
    I: Fn([f64; 2]) -> bool,
    C: Fn([f64; 2], [f64; 2]) -> [f64; 2],
{
    let mut out = Vec::with_capacity(points.len() + 4);
    let Some(&last) = points.last() else {
        return out;
    };
    let mut prev = last;
    for &cur in points {
        match (inside(prev), inside(cur)) {
            (true, true) => out.push(cur),
            (true, false) => out.push(cross(prev, cur)),
            (false, true) => {
                out.push(cross(prev, cur));
                out.push(cur);
            }
            (false, false) => {}
        }
        prev = cur;
    }
    out
}

/// Part of `ring` inside `rect` ([min_x, min_y, max_x, max_y]).
fn clip_to_rect(ring: &[[f64; 2]], rect: [f64; 4]) -> Vec<[f64; 2]> {
    let at_x = |k: f64| {
        move |a: [f64; 2], b: [f64; 2]| {
            let t = (k - a[0]) / (b[0] - a[0]);
            [k, a[1] + t * (b[1] - a[1])]
        }
    };
    let at_y = |k: f64| {
        move |a: [f64; 2], b: [f64; 2]| {
            let t = (k - a[1]) / (b[1] - a[1]);
            [a[0] + t * (b[0] - a[0]), k]
        }
    };
    let [min_x, min_y, max_x, max_y] = rect;
    let pts = clip_half_plane(ring, |p| p[0] >= min_x, at_x(min_x));
    let pts = clip_half_plane(&pts, |p| p[0] <= max_x, at_x(max_x));
    let pts = clip_half_plane(&pts, |p| p[1] >= min_y, at_y(min_y));
    clip_half_plane(&pts, |p| p[1] <= max_y, at_y(max_y))
}

fn orientation(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

fn segment_distance(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 0.0 {
        (((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (ex, ey) = (a[0] + t * dx - p[0], a[1] + t * dy - p[1]);
    (ex * ex + ey * ey).sqrt()
}

/// Segments cross at a single interior point of both.
fn segments_cross(p: ([f64; 2], [f64; 2]), q: ([f64; 2], [f64; 2])) -> bool {
    let d1 = orientation(q.0, q.1, p.0);
    let d2 = orientation(q.0, q.1, p.1);
    let d3 = orientation(p.0, p.1, q.0);
    let d4 = orientation(p.0, p.1, q.1);
    d1 * d2 < 0.0 && d3 * d4 < 0.0
}

impl Footprint {
    /// [min_x, min_y, max_x, max_y] over every ring.
    pub fn bounds(&self) -> [f64; 4] {
        vertices(&self.polygons).fold(
            [
                f64::INFINITY,
                f64::INFINITY,
                f64::NEG_INFINITY,
                f64::NEG_INFINITY,
            ],
            |b, [x, y]| [b[0].min(x), b[1].min(y), b[2].max(x), b[3].max(y)],
        )
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygons.iter().any(|rings| rings_contain(rings, x, y))
    }

    /// Area shared with an axis-aligned rectangle. Holes are assumed to lie
    /// inside their exterior ring.
    pub fn overlap_area(&self, rect: [f64; 4]) -> f64 {
        self.polygons
            .iter()
            .map(|rings| {
                let mut rings = rings.iter();
                let exterior = rings
                    .next()
                    .map(|r| ring_area(&clip_to_rect(r, rect)))
                    .unwrap_or(0.0);
                let holes: f64 = rings.map(|r| ring_area(&clip_to_rect(r, rect))).sum();
                (exterior - holes).max(0.0)
            })
            .sum()
    }

    /// Inside and farther than `eps` from every edge.
    fn strictly_contains(&self, [x, y]: [f64; 2], eps: f64) -> bool {
        self.contains(x, y) && edges(&self.polygons).all(|(a, b)| segment_distance([x, y], a, b) > eps)
    }

    /// Vertices, edge midpoints and the vertex mean of every exterior ring.
    fn sample_points(&self) -> Vec<[f64; 2]> {
        let mut points: Vec<[f64; 2]> = vertices(&self.polygons).collect();
        points.extend(
            edges(&self.polygons).map(|(a, b)| [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0]),
        );
        for exterior in self.polygons.iter().filter_map(|rings| rings.first()) {
            if !exterior.is_empty() {
                let n = exterior.len() as f64;
                let (sx, sy) = exterior
                    .iter()
                    .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
                points.push([sx / n, sy / n]);
            }
        }
        points
    }

    /// Interiors overlap: two edges cross, or a sample point of one lies
    /// strictly inside the other. Shared boundaries alone do not count.
    pub fn intersects(&self, other: &Footprint) -> bool {
        let (a, b) = (self.bounds(), other.bounds());
        if a[0] > b[2] || b[0] > a[2] || a[1] > b[3] || b[1] > a[3] {
            return false;
        }
        let extent = (a[2] - a[0]).max(a[3] - a[1]).max(b[2] - b[0]).max(b[3] - b[1]);
        let eps = 1e-9 * extent.max(1.0);
        edges(&self.polygons).any(|e| edges(&other.polygons).any(|f| segments_cross(e, f)))
            || self.sample_points().into_iter().any(|p| other.strictly_contains(p, eps))
            || other.sample_points().into_iter().any(|p| self.strictly_contains(p, eps))
    }

    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("feature {}", self.id))
    }
}

/// Buildings overlapped by at least one pixel equal to `value`.
pub fn damaged_buildings<'a>(
    buildings: &'a [Footprint],
    band: &Array2<f64>,
    georef: &GeoReference,
    value: f64,
) -> Result<Vec<&'a Footprint>> {
    if !georef.is_north_up() {
        return Err(Error::InvalidArgument {
            arg: "geotransform",
            value: format!("{:?} is rotated or flipped", georef.geotransform),
        });
    }
    let gt = georef.geotransform;
    let (rows, cols) = band.dim();
    let min_cell_area = 1e-9 * (gt[1] * gt[5]).abs();

    let damaged: Vec<&Footprint> = buildings
        .iter()
        .filter(|building| {
            let [min_x, min_y, max_x, max_y] = building.bounds();
            let (r_top, c_left) = georef.world_to_pixel(min_x, max_y);
            let (r_bottom, c_right) = georef.world_to_pixel(max_x, min_y);
            let clamp = |v: f64, hi: usize| v.max(0.0).min(hi as f64) as usize;
            let (r0, r1) = (clamp(r_top.floor(), rows), clamp(r_bottom.ceil(), rows));
            let (c0, c1) = (clamp(c_left.floor(), cols), clamp(c_right.ceil(), cols));
            (r0..r1).any(|r| {
                (c0..c1).any(|c| {
                    if band[[r, c]] != value {
                        return false;
                    }
                    let x0 = gt[0] + c as f64 * gt[1];
                    let y1 = gt[3] + r as f64 * gt[5];
                    let cell = [x0, y1 + gt[5], x0 + gt[1], y1];
                    building.overlap_area(cell) > min_cell_area
                })
            })
        })
        .collect();
    info!(
        "{} of {} buildings overlap change pixels",
        damaged.len(),
        buildings.len()
    );
    Ok(damaged)
}

/// Damaged buildings per camp, in the camps' order. Features sharing a camp
/// name are merged; a building is counted once per camp.
pub fn damage_per_camp(damaged: &[&Footprint], camps: &[Footprint]) -> Vec<CampDamage> {
    let mut counts: Vec<(String, HashSet<u64>)> = Vec::new();
    for camp in camps {
        let name = camp.label();
        let idx = match counts.iter().position(|(n, _)| *n == name) {
            Some(idx) => idx,
            None => {
                counts.push((name, HashSet::new()));
                counts.len() - 1
            }
        };
        for building in damaged.iter().filter(|b| b.intersects(camp)) {
            counts[idx].1.insert(building.id);
        }
    }
    for (name, ids) in &counts {
        debug!("{}: {} damaged buildings", name, ids.len());
    }
    counts
        .into_iter()
        .map(|(camp, ids)| CampDamage {
            camp,
            damaged_buildings: ids.len(),
        })
        .collect()
}
