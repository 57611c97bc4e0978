//! Rendering pipelines
//!
//! A pipeline is an identity-carrying render graph the orchestrator
//! executes once per frame. Pipelines can be described as data
//! ([`PipelineSpec`]) and rebuilt from it: operation kinds are stable
//! tags in an explicit enum, so loading a pipeline never goes through
//! reflection.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::backend::RenderBackend;
use super::graph::{FrameContext, FrameReport, GraphError, OpId, Operation, RenderGraph};
use super::operation::{
    CameraProvideOperation, EntityProvideOperation, EyeProvideOperation, OutputToScreenOperation,
    RenderOperation, TargetProvideOperation,
};
use super::target::{TargetDesc, TargetPool};
use crate::core::Scene;

/// Process-unique pipeline identity, used to suppress redundant change
/// notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(u64);

impl PipelineId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// An executable rendering pipeline.
pub struct Pipeline {
    id: PipelineId,
    name: String,
    graph: RenderGraph,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PipelineId::next(),
            name: name.into(),
            graph: RenderGraph::new(),
        }
    }

    /// The canonical forward chain: entity, camera, eye, and target
    /// providers feeding a render operation that outputs to screen.
    pub fn standard(name: impl Into<String>) -> Self {
        let mut pipeline = Self::new(name);
        let graph = &mut pipeline.graph;
        let entities = graph.add(Box::new(EntityProvideOperation));
        let camera = graph.add(Box::new(CameraProvideOperation));
        let eye = graph.add(Box::new(EyeProvideOperation));
        let target = graph.add(Box::new(TargetProvideOperation::default()));
        let render = graph.add(Box::new(RenderOperation));
        let output = graph.add(Box::new(OutputToScreenOperation));
        let edges = [
            (camera, eye, 0),
            (entities, render, 0),
            (eye, render, 1),
            (target, render, 2),
            (render, output, 0),
        ];
        for (from, to, port) in edges {
            graph
                .connect(from, to, port)
                .expect("standard pipeline wiring is valid");
        }
        pipeline
    }

    /// Identity of this pipeline instance.
    #[must_use]
    pub const fn id(&self) -> PipelineId {
        self.id
    }

    /// Pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying graph, for wiring custom operations.
    pub fn graph_mut(&mut self) -> &mut RenderGraph {
        &mut self.graph
    }

    /// Execute one frame against `scene`.
    ///
    /// Failures degrade to a report; the previous presented image stays
    /// untouched.
    pub fn execute(
        &mut self,
        scene: &Scene,
        backend: &mut dyn RenderBackend,
        targets: &mut TargetPool,
        viewport: (u32, u32),
    ) -> FrameReport {
        targets.begin_frame();
        let mut ctx = FrameContext {
            scene,
            backend,
            targets,
            viewport,
        };
        self.graph.execute(&mut ctx)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("nodes", &self.graph.len())
            .finish()
    }
}

/// Stable tags for the operations a pipeline can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OpSpec {
    /// [`EntityProvideOperation`]
    EntityProvide,
    /// [`CameraProvideOperation`]
    CameraProvide,
    /// [`EyeProvideOperation`]
    EyeProvide,
    /// [`TargetProvideOperation`] with its descriptor
    TargetProvide(TargetDesc),
    /// [`RenderOperation`]
    Render,
    /// [`OutputToScreenOperation`]
    OutputToScreen,
}

impl OpSpec {
    fn build(self) -> Box<dyn Operation> {
        match self {
            Self::EntityProvide => Box::new(EntityProvideOperation),
            Self::CameraProvide => Box::new(CameraProvideOperation),
            Self::EyeProvide => Box::new(EyeProvideOperation),
            Self::TargetProvide(desc) => Box::new(TargetProvideOperation::new(desc)),
            Self::Render => Box::new(RenderOperation),
            Self::OutputToScreen => Box::new(OutputToScreenOperation),
        }
    }
}

/// One typed edge of a pipeline spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Index of the producer in the op list
    pub from: usize,
    /// Index of the consumer in the op list
    pub to: usize,
    /// Consumer input port
    pub port: usize,
}

/// Serializable description of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Pipeline name
    pub name: String,
    /// Operations in graph order
    pub ops: Vec<OpSpec>,
    /// Typed-value dependency edges
    pub edges: Vec<EdgeSpec>,
}

impl PipelineSpec {
    /// The spec matching [`Pipeline::standard`].
    pub fn standard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: vec![
                OpSpec::EntityProvide,
                OpSpec::CameraProvide,
                OpSpec::EyeProvide,
                OpSpec::TargetProvide(TargetDesc::default()),
                OpSpec::Render,
                OpSpec::OutputToScreen,
            ],
            edges: vec![
                EdgeSpec {
                    from: 1,
                    to: 2,
                    port: 0,
                },
                EdgeSpec {
                    from: 0,
                    to: 4,
                    port: 0,
                },
                EdgeSpec {
                    from: 2,
                    to: 4,
                    port: 1,
                },
                EdgeSpec {
                    from: 3,
                    to: 4,
                    port: 2,
                },
                EdgeSpec {
                    from: 4,
                    to: 5,
                    port: 0,
                },
            ],
        }
    }

    /// Build an executable pipeline from the description.
    ///
    /// # Errors
    ///
    /// [`GraphError`] when an edge references an unknown op or violates
    /// port typing.
    pub fn build(&self) -> Result<Pipeline, GraphError> {
        let mut pipeline = Pipeline::new(self.name.clone());
        let ids: Vec<OpId> = self
            .ops
            .iter()
            .map(|op| pipeline.graph.add(op.build()))
            .collect();
        for edge in &self.edges {
            let (Some(&from), Some(&to)) = (ids.get(edge.from), ids.get(edge.to)) else {
                return Err(GraphError::InvalidNode);
            };
            pipeline.graph.connect(from, to, edge.port)?;
        }
        Ok(pipeline)
    }

    /// Serialize to pretty RON.
    ///
    /// # Errors
    ///
    /// Serialization failure from the RON writer.
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Parse from RON.
    ///
    /// # Errors
    ///
    /// Parse failure from the RON reader.
    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::NullBackend;

    #[test]
    fn test_spec_round_trips_through_ron() {
        let spec = PipelineSpec::standard("forward");

        let text = spec.to_ron().unwrap();
        let parsed = PipelineSpec::from_ron(&text).unwrap();

        assert_eq!(spec, parsed);
    }

    #[test]
    fn test_built_spec_matches_standard_pipeline() {
        let mut scene = Scene::new("s");
        let camera = scene.store_mut().create("cam");
        scene
            .store_mut()
            .insert(camera, crate::ecs::Transform::default())
            .unwrap();
        scene
            .store_mut()
            .insert(camera, crate::ecs::CameraComponent::default())
            .unwrap();

        let mut pipeline = PipelineSpec::standard("forward").build().unwrap();
        let mut backend = NullBackend::default();
        let mut targets = TargetPool::new();

        let report = pipeline.execute(&scene, &mut backend, &mut targets, (320, 240));

        assert!(report.is_complete(), "aborted: {:?}", report.aborted);
        assert_eq!(backend.presents, 1);
    }

    #[test]
    fn test_bad_edge_fails_to_build() {
        let mut spec = PipelineSpec::standard("broken");
        spec.edges.push(EdgeSpec {
            from: 99,
            to: 0,
            port: 0,
        });

        assert!(spec.build().is_err());
    }

    #[test]
    fn test_each_pipeline_gets_a_distinct_id() {
        let a = Pipeline::new("a");
        let b = Pipeline::new("b");

        assert_ne!(a.id(), b.id());
    }
}
