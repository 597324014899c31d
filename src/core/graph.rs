//! Lazy computation graph over images.
//!
//! A [`Graph`] records operations as nodes; nothing is computed while the
//! graph is built. Nodes can only reference nodes added before them, so every
//! graph is acyclic by construction. A [`Backend`] evaluates requested nodes;
//! [`LocalBackend`] runs them in-process and computes each shared node once.
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::aoi::AreaOfInterest;
use crate::core::processing::composite::composite;
use crate::core::processing::mask::{
    apply_mask, cloud_mask, scale_reflectance, vegetation_mask, with_index_band,
};
use crate::core::processing::ops::image_abs_difference;
use crate::core::processing::resample::warp_to_bounds;
use crate::core::processing::texture::{GlcmParams, combined_metric};
use crate::core::raster::Image;
use crate::error::{Error, Result};
use crate::types::{CompositeMethod, TextureStatistic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One scene on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRef {
    pub id: String,
    pub path: PathBuf,
    #[serde(default)]
    pub acquired: Option<NaiveDate>,
}

impl SceneRef {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            id,
            path,
            acquired: None,
        }
    }
}

/// Source of scene pixels for [`LocalBackend`].
pub trait SceneLoader {
    fn load(&self, scene: &SceneRef) -> Result<Image>;
}

#[derive(Debug, Clone)]
pub enum Op {
    Load(SceneRef),
    Constant(Image),
    Composite {
        inputs: Vec<NodeId>,
        method: CompositeMethod,
        label: String,
    },
    Select {
        input: NodeId,
        bands: Vec<String>,
    },
    Scale {
        input: NodeId,
        divisor: f64,
        exempt: Vec<String>,
    },
    MaskClouds {
        input: NodeId,
        scl_band: String,
        clear_classes: Vec<u8>,
    },
    MaskVegetation {
        input: NodeId,
        nir: String,
        red: String,
        threshold: f64,
    },
    /// Append `(a - b) / (a + b)` as band `name`
    IndexBand {
        input: NodeId,
        a: String,
        b: String,
        name: String,
    },
    Texture {
        input: NodeId,
        bands: Vec<String>,
        statistic: TextureStatistic,
        params: GlcmParams,
    },
    AbsDifference {
        a: NodeId,
        b: NodeId,
    },
    Clip {
        input: NodeId,
        aoi: AreaOfInterest,
    },
    /// Nearest-neighbour warp onto the pixel lattice covering the AOI bounds
    Warp {
        input: NodeId,
        aoi: AreaOfInterest,
    },
}

impl Op {
    pub fn inputs(&self) -> Vec<NodeId> {
        match self {
            Op::Load(_) | Op::Constant(_) => Vec::new(),
            Op::Composite { inputs, .. } => inputs.clone(),
            Op::AbsDifference { a, b } => vec![*a, *b],
            Op::Select { input, .. }
            | Op::Scale { input, .. }
            | Op::MaskClouds { input, .. }
            | Op::MaskVegetation { input, .. }
            | Op::IndexBand { input, .. }
            | Op::Texture { input, .. }
            | Op::Clip { input, .. }
            | Op::Warp { input, .. } => vec![*input],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::Load(_) => "load",
            Op::Constant(_) => "constant",
            Op::Composite { .. } => "composite",
            Op::Select { .. } => "select",
            Op::Scale { .. } => "scale",
            Op::MaskClouds { .. } => "mask_clouds",
            Op::MaskVegetation { .. } => "mask_vegetation",
            Op::IndexBand { .. } => "index_band",
            Op::Texture { .. } => "texture",
            Op::AbsDifference { .. } => "abs_difference",
            Op::Clip { .. } => "clip",
            Op::Warp { .. } => "warp",
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    op: Op,
    label: String,
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn op(&self, id: NodeId) -> Option<&Op> {
        self.nodes.get(id.0).map(|n| &n.op)
    }

    pub fn ops(&self) -> impl Iterator<Item = &Op> {
        self.nodes.iter().map(|n| &n.op)
    }

    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id.0).map(|n| n.label.as_str())
    }

    /// Append a node. Inputs must already exist in this graph.
    pub fn add(&mut self, op: Op, label: impl Into<String>) -> Result<NodeId> {
        let next = self.nodes.len();
        if let Some(bad) = op.inputs().into_iter().find(|i| i.0 >= next) {
            return Err(Error::Processing(format!(
                "node input {} does not precede node {}",
                bad.0, next
            )));
        }
        if let Op::Composite { inputs, label, .. } = &op {
            if inputs.is_empty() {
                return Err(Error::EmptyCollection {
                    label: label.clone(),
                });
            }
        }
        self.nodes.push(Node {
            op,
            label: label.into(),
        });
        Ok(NodeId(next))
    }

    pub fn load(&mut self, scene: SceneRef) -> Result<NodeId> {
        let label = format!("load {}", scene.id);
        self.add(Op::Load(scene), label)
    }

    pub fn constant(&mut self, image: Image, label: &str) -> Result<NodeId> {
        self.add(Op::Constant(image), label)
    }

    pub fn composite(
        &mut self,
        inputs: Vec<NodeId>,
        method: CompositeMethod,
        label: &str,
    ) -> Result<NodeId> {
        self.add(
            Op::Composite {
                inputs,
                method,
                label: label.to_string(),
            },
            label,
        )
    }

    pub fn select(&mut self, input: NodeId, bands: &[String]) -> Result<NodeId> {
        let label = format!("select {}", bands.join(","));
        self.add(
            Op::Select {
                input,
                bands: bands.to_vec(),
            },
            label,
        )
    }

    pub fn clip(&mut self, input: NodeId, aoi: &AreaOfInterest) -> Result<NodeId> {
        self.add(
            Op::Clip {
                input,
                aoi: aoi.clone(),
            },
            "clip",
        )
    }

    pub fn warp(&mut self, input: NodeId, aoi: &AreaOfInterest) -> Result<NodeId> {
        let label = format!("warp {}", self.label(input).unwrap_or_default());
        self.add(
            Op::Warp {
                input,
                aoi: aoi.clone(),
            },
            label,
        )
    }

    pub fn abs_difference(&mut self, a: NodeId, b: NodeId, label: &str) -> Result<NodeId> {
        self.add(Op::AbsDifference { a, b }, label)
    }

    /// Number of consumers per node, restricted to nodes reachable from `targets`.
    fn consumers(&self, targets: &[NodeId]) -> Result<(Vec<bool>, Vec<usize>)> {
        let mut needed = vec![false; self.nodes.len()];
        let mut uses = vec![0usize; self.nodes.len()];
        let mut stack = Vec::new();
        for t in targets {
            if t.0 >= self.nodes.len() {
                return Err(Error::Processing(format!("unknown node {}", t.0)));
            }
            stack.push(*t);
        }
        while let Some(id) = stack.pop() {
            if needed[id.0] {
                continue;
            }
            needed[id.0] = true;
            for input in self.nodes[id.0].op.inputs() {
                uses[input.0] += 1;
                stack.push(input);
            }
        }
        Ok((needed, uses))
    }
}

pub trait Backend {
    /// Evaluate `targets`, returning one image per target in the same order.
    fn evaluate(&self, graph: &Graph, targets: &[NodeId]) -> Result<Vec<Image>>;
}

/// In-process evaluation with ndarray kernels.
pub struct LocalBackend<L> {
    loader: L,
}

impl<L: SceneLoader> LocalBackend<L> {
    pub fn new(loader: L) -> Self {
        Self { loader }
    }

    fn run<'a>(&self, op: &Op, input: impl Fn(NodeId) -> Result<&'a Image>) -> Result<Image> {
        match op {
            Op::Load(scene) => self.loader.load(scene),
            Op::Constant(image) => Ok(image.clone()),
            Op::Composite {
                inputs,
                method,
                label,
            } => {
                let images = inputs
                    .iter()
                    .map(|id| input(*id).cloned())
                    .collect::<Result<Vec<_>>>()?;
                composite(&images, *method, label)
            }
            Op::Select { input: id, bands } => input(*id)?.select(bands),
            Op::Scale {
                input: id,
                divisor,
                exempt,
            } => Ok(scale_reflectance(input(*id)?, *divisor, exempt)),
            Op::MaskClouds {
                input: id,
                scl_band,
                clear_classes,
            } => {
                let image = input(*id)?;
                let mask = cloud_mask(image, scl_band, clear_classes)?;
                apply_mask(image, &mask)
            }
            Op::MaskVegetation {
                input: id,
                nir,
                red,
                threshold,
            } => {
                let image = input(*id)?;
                let mask = vegetation_mask(image, nir, red, *threshold)?;
                apply_mask(image, &mask)
            }
            Op::IndexBand {
                input: id,
                a,
                b,
                name,
            } => with_index_band(input(*id)?, a, b, name),
            Op::Texture {
                input: id,
                bands,
                statistic,
                params,
            } => combined_metric(input(*id)?, bands, *statistic, params),
            Op::AbsDifference { a, b } => image_abs_difference(input(*a)?, input(*b)?),
            Op::Clip { input: id, aoi } => aoi.clip(input(*id)?),
            Op::Warp { input: id, aoi } => warp_to_bounds(input(*id)?, aoi.bounds()),
        }
    }
}

impl<L: SceneLoader> Backend for LocalBackend<L> {
    fn evaluate(&self, graph: &Graph, targets: &[NodeId]) -> Result<Vec<Image>> {
        let (needed, mut uses) = graph.consumers(targets)?;
        for t in targets {
            // targets are held until the end
            uses[t.0] += 1;
        }
        let total = needed.iter().filter(|&&n| n).count();
        info!("Evaluating {} of {} graph nodes", total, graph.len());

        let mut results: Vec<Option<Image>> = vec![None; graph.len()];
        for (idx, node) in graph.nodes.iter().enumerate() {
            if !needed[idx] {
                continue;
            }
            debug!("node {} [{}] {}", idx, node.op.name(), node.label);
            let image = self
                .run(&node.op, |id| {
                    results[id.0].as_ref().ok_or_else(|| {
                        Error::Processing(format!("node {} evaluated before its input", id.0))
                    })
                })
                .map_err(|e| match e {
                    Error::Processing(msg) => {
                        Error::Processing(format!("{} ({}): {}", node.label, node.op.name(), msg))
                    }
                    other => other,
                })?;
            for input in node.op.inputs() {
                uses[input.0] -= 1;
                if uses[input.0] == 0 {
                    results[input.0] = None;
                }
            }
            results[idx] = Some(image);
        }

        targets
            .iter()
            .map(|t| {
                results[t.0]
                    .clone()
                    .ok_or_else(|| Error::Processing(format!("node {} was not evaluated", t.0)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::{Band, GeoReference};
    use ndarray::array;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct MapLoader {
        scenes: HashMap<String, Image>,
        loads: RefCell<Vec<String>>,
    }

    impl SceneLoader for MapLoader {
        fn load(&self, scene: &SceneRef) -> Result<Image> {
            self.loads.borrow_mut().push(scene.id.clone());
            self.scenes
                .get(&scene.id)
                .cloned()
                .ok_or_else(|| Error::Processing(format!("no scene {}", scene.id)))
        }
    }

    fn scene(id: &str) -> SceneRef {
        SceneRef {
            id: id.to_string(),
            path: PathBuf::from(format!("{id}.tif")),
            acquired: None,
        }
    }

    fn loader() -> MapLoader {
        let geo = GeoReference::default();
        let mut scenes = HashMap::new();
        scenes.insert("a".to_string(), Image::single("v", array![[1.0, 2.0]], geo.clone()));
        scenes.insert("b".to_string(), Image::single("v", array![[3.0, f64::NAN]], geo));
        MapLoader {
            scenes,
            loads: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn nodes_cannot_reference_later_nodes() {
        let mut g = Graph::new();
        let err = g.add(
            Op::Select {
                input: NodeId(0),
                bands: vec!["v".into()],
            },
            "bad",
        );
        assert!(err.is_err());
        assert!(g.is_empty());
    }

    #[test]
    fn empty_composite_is_rejected_at_build_time() {
        let mut g = Graph::new();
        assert!(matches!(
            g.composite(vec![], CompositeMethod::Mean, "pre"),
            Err(Error::EmptyCollection { .. })
        ));
    }

    #[test]
    fn shared_nodes_are_loaded_once() {
        let mut g = Graph::new();
        let a = g.load(scene("a")).unwrap();
        let b = g.load(scene("b")).unwrap();
        let mean = g.composite(vec![a, b], CompositeMethod::Mean, "mean").unwrap();
        let mosaic = g.composite(vec![a, b], CompositeMethod::Mosaic, "mosaic").unwrap();
        let diff = g.abs_difference(mean, mosaic, "diff").unwrap();

        let backend = LocalBackend::new(loader());
        let out = backend.evaluate(&g, &[diff, mean]).unwrap();
        assert_eq!(out[0].first_band().unwrap().data, array![[1.0, 0.0]]);
        assert_eq!(out[1].first_band().unwrap().data, array![[2.0, 2.0]]);
        assert_eq!(*backend.loader.loads.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn unreachable_nodes_are_not_evaluated() {
        let mut g = Graph::new();
        let a = g.load(scene("a")).unwrap();
        let _missing = g.load(scene("missing")).unwrap();
        let backend = LocalBackend::new(loader());
        let out = backend.evaluate(&g, &[a]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(*backend.loader.loads.borrow(), vec!["a"]);
    }

    #[test]
    fn vegetation_then_scale_chain() {
        let geo = GeoReference::default();
        let image = Image::from_bands(
            vec![
                Band::new("red", array![[1000.0, 1000.0]]),
                Band::new("nir", array![[1200.0, 4000.0]]),
            ],
            geo,
        )
        .unwrap();
        let mut g = Graph::new();
        let c = g.constant(image, "input").unwrap();
        let masked = g
            .add(
                Op::MaskVegetation {
                    input: c,
                    nir: "nir".into(),
                    red: "red".into(),
                    threshold: 0.25,
                },
                "veg",
            )
            .unwrap();
        let scaled = g
            .add(
                Op::Scale {
                    input: masked,
                    divisor: 10000.0,
                    exempt: vec![],
                },
                "scale",
            )
            .unwrap();
        let out = LocalBackend::new(loader()).evaluate(&g, &[scaled]).unwrap();
        let red = &out[0].band("red").unwrap().data;
        assert_eq!(red[[0, 0]], 0.1);
        assert!(red[[0, 1]].is_nan());
    }

    #[test]
    fn difference_of_misaligned_epochs_fails() {
        let geo = GeoReference::new([0.0, 10.0, 0.0, 10.0, 0.0, -10.0], "EPSG:32634");
        let mut g = Graph::new();
        let pre = g
            .constant(Image::single("v", array![[1.0, 2.0]], geo.clone()), "pre")
            .unwrap();
        let post = g
            .constant(Image::single("v", array![[1.0, 2.0]], geo.offset(0, 1)), "post")
            .unwrap();
        let diff = g.abs_difference(pre, post, "diff").unwrap();
        let err = LocalBackend::new(loader()).evaluate(&g, &[diff]).unwrap_err();
        assert!(matches!(err, Error::GridMismatch { .. }));
    }

    #[test]
    fn warped_leaves_composite_on_the_aoi_lattice() {
        let aoi = AreaOfInterest::from_bounds(0.0, 0.0, 30.0, 10.0).unwrap();
        let mut g = Graph::new();
        let west = g
            .constant(
                Image::single(
                    "v",
                    array![[1.0, 1.0]],
                    GeoReference::new([0.0, 10.0, 0.0, 10.0, 0.0, -10.0], ""),
                ),
                "west",
            )
            .unwrap();
        let east = g
            .constant(
                Image::single(
                    "v",
                    array![[3.0, 3.0]],
                    GeoReference::new([10.0, 10.0, 0.0, 10.0, 0.0, -10.0], ""),
                ),
                "east",
            )
            .unwrap();
        let leaves = vec![g.warp(west, &aoi).unwrap(), g.warp(east, &aoi).unwrap()];
        assert_eq!(g.label(leaves[1]), Some("warp east"));
        let mean = g.composite(leaves, CompositeMethod::Mean, "mean").unwrap();
        let out = LocalBackend::new(loader()).evaluate(&g, &[mean]).unwrap();
        assert_eq!(out[0].shape(), (1, 3));
        assert_eq!(out[0].first_band().unwrap().data, array![[1.0, 2.0, 3.0]]);
        assert_eq!(out[0].georef().geotransform[0], 0.0);
    }
}
