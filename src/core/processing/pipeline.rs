//! Builds the change-analysis graph for one sensor profile: pre and post
//! collections are composited and masked, texture metrics are computed on
//! each side, and every metric is differenced.
use tracing::info;

use crate::core::aoi::AreaOfInterest;
use crate::core::graph::{Graph, NodeId, Op, SceneRef};
use crate::core::params::SensorProfile;
use crate::core::raster::Image;
use crate::error::{Error, Result};
use crate::types::{MaskStage, TextureStatistic};

pub const NDVI_BAND: &str = "NDVI";
pub const NDWI_BAND: &str = "NDWI";

/// Images of one collection, either on disk or already in memory.
#[derive(Debug, Clone)]
pub enum CollectionInput {
    Scenes(Vec<SceneRef>),
    Images(Vec<Image>),
}

impl CollectionInput {
    pub fn len(&self) -> usize {
        match self {
            CollectionInput::Scenes(s) => s.len(),
            CollectionInput::Images(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricPlan {
    pub statistic: TextureStatistic,
    pub pre: NodeId,
    pub post: NodeId,
    pub difference: NodeId,
}

/// Node handles of every product of one analysis.
#[derive(Debug, Clone)]
pub struct AnalysisPlan {
    pub graph: Graph,
    /// Unmasked composite, display bands only, clipped
    pub pre_display: NodeId,
    pub post_display: NodeId,
    /// Masked, scaled and clipped composite with optional index bands
    pub pre_processed: NodeId,
    pub post_processed: NodeId,
    pub metrics: Vec<MetricPlan>,
}

impl AnalysisPlan {
    pub fn metric(&self, statistic: TextureStatistic) -> Option<&MetricPlan> {
        self.metrics.iter().find(|m| m.statistic == statistic)
    }
}

struct CollectionNodes {
    display: NodeId,
    processed: NodeId,
}

/// One node per image, each warped onto the AOI lattice so that every image
/// of both epochs shares one grid.
fn leaves(
    graph: &mut Graph,
    aoi: &AreaOfInterest,
    input: CollectionInput,
    label: &str,
) -> Result<Vec<NodeId>> {
    if input.is_empty() {
        return Err(Error::EmptyCollection {
            label: label.to_string(),
        });
    }
    let sources = match input {
        CollectionInput::Scenes(scenes) => scenes
            .into_iter()
            .map(|s| graph.load(s))
            .collect::<Result<Vec<_>>>()?,
        CollectionInput::Images(images) => images
            .into_iter()
            .enumerate()
            .map(|(i, img)| graph.constant(img, &format!("{label} image {i}")))
            .collect::<Result<Vec<_>>>()?,
    };
    sources.into_iter().map(|node| graph.warp(node, aoi)).collect()
}

/// Cloud mask (when the sensor has a classification band), vegetation mask,
/// then reflectance scaling.
fn mask_and_scale(
    graph: &mut Graph,
    profile: &SensorProfile,
    input: NodeId,
    label: &str,
) -> Result<NodeId> {
    let mut node = input;
    if let Some(scl) = &profile.scl_band {
        node = graph.add(
            Op::MaskClouds {
                input: node,
                scl_band: scl.clone(),
                clear_classes: profile.clear_classes.clone(),
            },
            format!("{label} cloud mask"),
        )?;
    }
    node = graph.add(
        Op::MaskVegetation {
            input: node,
            nir: profile.nir_band.clone(),
            red: profile.red_band.clone(),
            threshold: profile.vegetation_threshold,
        },
        format!("{label} vegetation mask"),
    )?;
    graph.add(
        Op::Scale {
            input: node,
            divisor: profile.reflectance_scale,
            exempt: profile.scl_band.iter().cloned().collect(),
        },
        format!("{label} reflectance scale"),
    )
}

fn add_collection(
    graph: &mut Graph,
    profile: &SensorProfile,
    aoi: &AreaOfInterest,
    input: CollectionInput,
    label: &str,
) -> Result<CollectionNodes> {
    let leaves = leaves(graph, aoi, input, label)?;
    let raw = graph.composite(leaves.clone(), profile.composite, &format!("{label} composite"))?;

    let display_bands: Vec<String> = profile.rgb_style.bands.to_vec();
    let display = graph.select(raw, &display_bands)?;
    let display = graph.clip(display, aoi)?;

    let mut processed = match profile.mask_stage {
        MaskStage::PerImage => {
            let masked = leaves
                .iter()
                .enumerate()
                .map(|(i, leaf)| mask_and_scale(graph, profile, *leaf, &format!("{label} image {i}")))
                .collect::<Result<Vec<_>>>()?;
            graph.composite(masked, profile.composite, &format!("{label} masked composite"))?
        }
        MaskStage::Composite => mask_and_scale(graph, profile, raw, label)?,
    };

    if profile.index_layers {
        processed = graph.add(
            Op::IndexBand {
                input: processed,
                a: profile.nir_band.clone(),
                b: profile.red_band.clone(),
                name: NDVI_BAND.to_string(),
            },
            format!("{label} NDVI"),
        )?;
        processed = graph.add(
            Op::IndexBand {
                input: processed,
                a: profile.green_band.clone(),
                b: profile.nir_band.clone(),
                name: NDWI_BAND.to_string(),
            },
            format!("{label} NDWI"),
        )?;
    }
    let processed = graph.clip(processed, aoi)?;
    Ok(CollectionNodes { display, processed })
}

/// Build the full graph. Nothing is evaluated here.
pub fn build_plan(
    profile: &SensorProfile,
    aoi: &AreaOfInterest,
    pre: CollectionInput,
    post: CollectionInput,
) -> Result<AnalysisPlan> {
    info!(
        "Planning {} analysis: {} pre-event and {} post-event images",
        profile.sensor,
        pre.len(),
        post.len()
    );
    let mut graph = Graph::new();
    let pre = add_collection(&mut graph, profile, aoi, pre, "pre-event")?;
    let post = add_collection(&mut graph, profile, aoi, post, "post-event")?;

    let mut metrics = Vec::with_capacity(profile.statistics.len());
    for &statistic in &profile.statistics {
        let mut texture = |input: NodeId, side: &str| {
            graph.add(
                Op::Texture {
                    input,
                    bands: profile.texture_bands.clone(),
                    statistic,
                    params: profile.glcm.clone(),
                },
                format!("{side} {}", statistic.combined_band_name()),
            )
        };
        let pre_metric = texture(pre.processed, "pre-event")?;
        let post_metric = texture(post.processed, "post-event")?;
        let difference = graph.abs_difference(
            pre_metric,
            post_metric,
            &profile.names.difference(statistic),
        )?;
        metrics.push(MetricPlan {
            statistic,
            pre: pre_metric,
            post: post_metric,
            difference,
        });
    }

    Ok(AnalysisPlan {
        graph,
        pre_display: pre.display,
        post_display: post.display,
        pre_processed: pre.processed,
        post_processed: post.processed,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sensor;

    fn aoi() -> AreaOfInterest {
        AreaOfInterest::from_bounds(0.0, -10.0, 10.0, 0.0).unwrap()
    }

    fn scenes(n: usize) -> CollectionInput {
        CollectionInput::Scenes(
            (0..n)
                .map(|i| SceneRef::from_path(format!("scene_{i}.tif")))
                .collect(),
        )
    }

    fn ops(plan: &AnalysisPlan) -> Vec<&'static str> {
        plan.graph.ops().map(|op| op.name()).collect()
    }

    #[test]
    fn planetscope_masks_each_capture_before_averaging() {
        let profile = SensorProfile::preset(Sensor::PlanetScope);
        let plan = build_plan(&profile, &aoi(), scenes(4), scenes(6)).unwrap();
        let names = ops(&plan);
        assert_eq!(names.iter().filter(|n| **n == "load").count(), 10);
        assert_eq!(names.iter().filter(|n| **n == "warp").count(), 10);
        assert_eq!(names.iter().filter(|n| **n == "mask_vegetation").count(), 10);
        assert_eq!(names.iter().filter(|n| **n == "mask_clouds").count(), 0);
        assert_eq!(plan.metrics.len(), 3);
        let masked = plan.graph.op(plan.pre_processed).unwrap();
        let Op::Clip { input, .. } = masked else {
            panic!("processed composite is not clipped");
        };
        assert!(matches!(plan.graph.op(*input), Some(Op::Composite { .. })));
    }

    #[test]
    fn sentinel2_masks_the_mosaic_and_adds_index_layers() {
        let profile = SensorProfile::preset(Sensor::Sentinel2);
        let plan = build_plan(&profile, &aoi(), scenes(3), scenes(2)).unwrap();
        let names = ops(&plan);
        assert_eq!(names.iter().filter(|n| **n == "mask_clouds").count(), 2);
        assert_eq!(names.iter().filter(|n| **n == "mask_vegetation").count(), 2);
        assert_eq!(names.iter().filter(|n| **n == "index_band").count(), 4);
        assert_eq!(names.iter().filter(|n| **n == "texture").count(), 4);
        let diff = plan.metric(TextureStatistic::Homogeneity).unwrap().difference;
        assert_eq!(
            plan.graph.label(diff),
            Some("S2_Combined_Enhanced_Homogeneity_Difference_Map_Algenina")
        );
    }

    #[test]
    fn empty_collection_is_fatal() {
        let profile = SensorProfile::preset(Sensor::Sentinel2);
        let err = build_plan(&profile, &aoi(), scenes(0), scenes(2)).unwrap_err();
        assert!(matches!(err, Error::EmptyCollection { label } if label == "pre-event"));
    }
}
