//! Local scene catalog standing in for an imagery archive query: scenes are
//! filtered by acquisition date and by footprint intersection with the AOI.
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::aoi::AreaOfInterest;
use crate::core::graph::SceneRef;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub path: PathBuf,
    pub acquired: NaiveDate,
    /// Footprint [min_x, min_y, max_x, max_y] in the imagery CRS
    pub bounds: [f64; 4],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneCatalog {
    pub scenes: Vec<CatalogEntry>,
}

impl SceneCatalog {
    /// Load a catalog file. Relative scene paths resolve against the catalog's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut catalog: SceneCatalog = serde_json::from_str(&text)?;
        if let Some(base) = path.parent() {
            for scene in &mut catalog.scenes {
                if scene.path.is_relative() {
                    scene.path = base.join(&scene.path);
                }
            }
        }
        info!("Loaded catalog {} with {} scenes", path.display(), catalog.scenes.len());
        Ok(catalog)
    }

    /// Scenes acquired in [start, end) whose footprint intersects the AOI,
    /// ordered by acquisition date (ties by id). An empty result is an error.
    pub fn query(&self, start: NaiveDate, end: NaiveDate, aoi: &AreaOfInterest) -> Result<Vec<SceneRef>> {
        if end <= start {
            return Err(Error::InvalidArgument {
                arg: "end",
                value: format!("{end} is not after {start}"),
            });
        }
        let mut hits: Vec<&CatalogEntry> = self
            .scenes
            .iter()
            .filter(|s| s.acquired >= start && s.acquired < end)
            .filter(|s| aoi.intersects_bounds(s.bounds))
            .collect();
        hits.sort_by(|a, b| a.acquired.cmp(&b.acquired).then_with(|| a.id.cmp(&b.id)));
        if hits.is_empty() {
            return Err(Error::EmptyCollection {
                label: format!("no scenes between {start} and {end} intersect the AOI"),
            });
        }
        info!("Catalog query {}..{} matched {} scenes", start, end, hits.len());
        Ok(hits
            .into_iter()
            .map(|s| SceneRef {
                id: s.id.clone(),
                path: s.path.clone(),
                acquired: Some(s.acquired),
            })
            .collect())
    }
}
