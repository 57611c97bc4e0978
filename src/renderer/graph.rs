//! Render operation graph
//!
//! A frame is produced by a DAG of operations wired through typed
//! ports: providers resolve entities, the camera, its eye parameters,
//! and a render target; the render operation submits draw calls; the
//! output operation presents. Execution order is computed by
//! topological sort over the declared edges, never hand-coded. A node
//! that cannot satisfy its output short-circuits the rest of the frame,
//! leaving the previously presented image untouched.

use std::collections::VecDeque;

use glam::Mat4;
use smallvec::SmallVec;

use super::backend::RenderBackend;
use super::target::{TargetId, TargetPool};
use crate::core::Scene;
use crate::ecs::Entity;

/// The value kinds that can flow along graph edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Set of visible entities
    Entities,
    /// The resolved camera entity
    Camera,
    /// View and projection matrices
    Eye,
    /// A render target
    Target,
}

/// View parameters resolved from the active camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Eye {
    /// World-to-view matrix
    pub view: Mat4,
    /// View-to-clip matrix
    pub proj: Mat4,
}

/// A typed value produced by an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    /// Entities selected for drawing
    Entities(Vec<Entity>),
    /// The camera entity to render from
    Camera(Entity),
    /// Resolved view parameters
    Eye(Eye),
    /// Target to render into or present
    Target(TargetId),
}

impl SlotValue {
    /// The kind this value satisfies.
    #[must_use]
    pub const fn kind(&self) -> SlotKind {
        match self {
            Self::Entities(_) => SlotKind::Entities,
            Self::Camera(_) => SlotKind::Camera,
            Self::Eye(_) => SlotKind::Eye,
            Self::Target(_) => SlotKind::Target,
        }
    }
}

/// Errors raised while wiring or executing a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The dependency edges contain a cycle.
    Cycle,
    /// A connect call referenced a node that does not exist.
    InvalidNode,
    /// A connect call referenced an input port past the declared arity.
    PortOutOfRange {
        /// Consumer node name
        node: String,
        /// Offending port index
        port: usize,
    },
    /// Producer output kind does not match the consumer port kind.
    KindMismatch {
        /// What the consumer port expects
        expected: SlotKind,
        /// What the producer declares
        found: SlotKind,
    },
    /// An input port was never connected.
    UnwiredInput {
        /// Consumer node name
        node: String,
        /// Port index left unwired
        port: usize,
    },
    /// A node could not resolve a resource it must provide.
    ResourceUnavailable(String),
    /// The graphics backend rejected a submission.
    Backend(String),
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cycle => write!(f, "render graph contains a dependency cycle"),
            Self::InvalidNode => write!(f, "unknown graph node"),
            Self::PortOutOfRange { node, port } => {
                write!(f, "node '{node}' has no input port {port}")
            }
            Self::KindMismatch { expected, found } => {
                write!(f, "port expects {expected:?} but producer yields {found:?}")
            }
            Self::UnwiredInput { node, port } => {
                write!(f, "input port {port} of node '{node}' is not connected")
            }
            Self::ResourceUnavailable(what) => write!(f, "resource unavailable: {what}"),
            Self::Backend(e) => write!(f, "render backend: {e}"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Node lifecycle within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Never initialized; resources not yet allocated
    Uninitialized,
    /// Ready to execute this frame
    Ready,
    /// Already executed this frame
    Executed,
}

/// Everything an operation may touch while executing.
pub struct FrameContext<'a> {
    /// Scene being rendered
    pub scene: &'a Scene,
    /// Graphics backend receiving submissions
    pub backend: &'a mut dyn RenderBackend,
    /// Pool the target provider allocates from
    pub targets: &'a mut TargetPool,
    /// Presentation surface size in pixels
    pub viewport: (u32, u32),
}

/// One node of the render graph.
///
/// Implementations declare their typed ports up front; the graph feeds
/// `execute` exactly the values its producers yielded, in port order.
pub trait Operation {
    /// Display name used in logs and reports.
    fn name(&self) -> &str;

    /// Kinds of the input ports, in order.
    fn input_kinds(&self) -> &'static [SlotKind];

    /// Kind of the produced value, if any.
    fn output_kind(&self) -> Option<SlotKind>;

    /// Allocate resources on first use.
    ///
    /// # Errors
    ///
    /// Aborts the frame when resources cannot be allocated.
    fn initialize(&mut self, _ctx: &mut FrameContext) -> Result<(), GraphError> {
        Ok(())
    }

    /// Produce this node's output from its resolved inputs.
    ///
    /// # Errors
    ///
    /// Any error short-circuits the remainder of the frame.
    fn execute(
        &mut self,
        inputs: &[SlotValue],
        ctx: &mut FrameContext,
    ) -> Result<Option<SlotValue>, GraphError>;

    /// Release resources when the graph is dropped or rebuilt.
    fn shutdown(&mut self) {}
}

/// Identifier of a node within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId(usize);

struct Node {
    op: Box<dyn Operation>,
    state: NodeState,
    /// Producer node per input port, in declared order
    sources: SmallVec<[Option<OpId>; 4]>,
}

/// Outcome of one frame's graph execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    /// Number of nodes that executed
    pub executed: usize,
    /// Why the frame stopped early, if it did
    pub aborted: Option<String>,
}

impl FrameReport {
    /// Whether every node executed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }

    fn stopped(executed: usize, error: &GraphError) -> Self {
        Self {
            executed,
            aborted: Some(error.to_string()),
        }
    }
}

/// Directed acyclic graph of render operations.
pub struct RenderGraph {
    nodes: Vec<Node>,
}

impl RenderGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add an operation; its input ports start unwired.
    pub fn add(&mut self, op: Box<dyn Operation>) -> OpId {
        let arity = op.input_kinds().len();
        self.nodes.push(Node {
            op,
            state: NodeState::Uninitialized,
            sources: SmallVec::from_elem(None, arity),
        });
        OpId(self.nodes.len() - 1)
    }

    /// Wire producer `from` into input `port` of consumer `to`.
    ///
    /// # Errors
    ///
    /// Rejects unknown nodes, out-of-range ports, and kind mismatches;
    /// edges are typed-value dependencies, not ordering hints.
    pub fn connect(&mut self, from: OpId, to: OpId, port: usize) -> Result<(), GraphError> {
        if from.0 >= self.nodes.len() || to.0 >= self.nodes.len() {
            return Err(GraphError::InvalidNode);
        }
        let produced = self.nodes[from.0].op.output_kind().ok_or_else(|| {
            GraphError::ResourceUnavailable(format!(
                "node '{}' produces no output",
                self.nodes[from.0].op.name()
            ))
        })?;
        let consumer = &self.nodes[to.0];
        let Some(&expected) = consumer.op.input_kinds().get(port) else {
            return Err(GraphError::PortOutOfRange {
                node: consumer.op.name().to_string(),
                port,
            });
        };
        if produced != expected {
            return Err(GraphError::KindMismatch {
                expected,
                found: produced,
            });
        }
        self.nodes[to.0].sources[port] = Some(from);
        Ok(())
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Lifecycle state of a node.
    #[must_use]
    pub fn state(&self, id: OpId) -> Option<NodeState> {
        self.nodes.get(id.0).map(|n| n.state)
    }

    /// Execute the graph for one frame.
    ///
    /// Nodes run in a topological order of the dependency edges;
    /// independent nodes may run in any order, dependencies never
    /// execute after their consumers. The first failure stops the
    /// frame and is recorded on the report rather than propagated.
    pub fn execute(&mut self, ctx: &mut FrameContext) -> FrameReport {
        let order = match self.topological_order() {
            Ok(order) => order,
            Err(e) => {
                log::warn!("render graph not executable: {e}");
                return FrameReport::stopped(0, &e);
            }
        };
        if let Err(e) = self.check_wiring() {
            log::warn!("render graph not executable: {e}");
            return FrameReport::stopped(0, &e);
        }

        // Frame start: first-time initialization, then reset to Ready.
        for node in &mut self.nodes {
            if node.state == NodeState::Uninitialized {
                if let Err(e) = node.op.initialize(ctx) {
                    log::warn!("initializing '{}' failed: {e}", node.op.name());
                    return FrameReport::stopped(0, &e);
                }
            }
            node.state = NodeState::Ready;
        }

        let mut outputs: Vec<Option<SlotValue>> = (0..self.nodes.len()).map(|_| None).collect();
        let mut executed = 0;

        for id in order {
            let mut inputs: SmallVec<[SlotValue; 4]> = SmallVec::new();
            let mut broken_producer = None;
            for source in &self.nodes[id.0].sources {
                let source = source.expect("wiring checked above");
                match outputs[source.0].clone() {
                    Some(value) => inputs.push(value),
                    // Producers run first; an empty slot means one broke
                    // its declared-output contract.
                    None => {
                        broken_producer = Some(self.nodes[source.0].op.name().to_string());
                        break;
                    }
                }
            }
            if let Some(name) = broken_producer {
                let e =
                    GraphError::ResourceUnavailable(format!("node '{name}' produced no value"));
                log::warn!("render graph stopped: {e}");
                return FrameReport::stopped(executed, &e);
            }

            let node = &mut self.nodes[id.0];
            match node.op.execute(&inputs, ctx) {
                Ok(output) => {
                    node.state = NodeState::Executed;
                    executed += 1;
                    outputs[id.0] = output;
                }
                Err(e) => {
                    log::warn!("render node '{}' failed: {e}", node.op.name());
                    return FrameReport::stopped(executed, &e);
                }
            }
        }

        FrameReport {
            executed,
            aborted: None,
        }
    }

    fn check_wiring(&self) -> Result<(), GraphError> {
        for node in &self.nodes {
            for (port, source) in node.sources.iter().enumerate() {
                if source.is_none() {
                    return Err(GraphError::UnwiredInput {
                        node: node.op.name().to_string(),
                        port,
                    });
                }
            }
        }
        Ok(())
    }

    /// Kahn's algorithm over the wired edges.
    fn topological_order(&self) -> Result<Vec<OpId>, GraphError> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (to, node) in self.nodes.iter().enumerate() {
            for source in node.sources.iter().flatten() {
                children[source.0].push(to);
                in_degree[to] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(node) = queue.pop_front() {
            order.push(OpId(node));
            for &child in &children[node] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    queue.push_back(child);
                }
            }
        }

        if order.len() == n {
            Ok(order)
        } else {
            Err(GraphError::Cycle)
        }
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        for node in &mut self.nodes {
            node.op.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::NullBackend;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Test node: fixed ports, appends its tag to a shared trace.
    struct TraceOp {
        tag: &'static str,
        inputs: &'static [SlotKind],
        output: Option<SlotKind>,
        trace: Rc<RefCell<Vec<&'static str>>>,
        fail: bool,
    }

    impl Operation for TraceOp {
        fn name(&self) -> &str {
            self.tag
        }

        fn input_kinds(&self) -> &'static [SlotKind] {
            self.inputs
        }

        fn output_kind(&self) -> Option<SlotKind> {
            self.output
        }

        fn execute(
            &mut self,
            inputs: &[SlotValue],
            _ctx: &mut FrameContext,
        ) -> Result<Option<SlotValue>, GraphError> {
            if self.fail {
                return Err(GraphError::ResourceUnavailable(self.tag.to_string()));
            }
            for (port, input) in inputs.iter().enumerate() {
                assert_eq!(input.kind(), self.inputs[port], "typed port violated");
            }
            self.trace.borrow_mut().push(self.tag);
            Ok(self.output.map(|kind| match kind {
                SlotKind::Entities => SlotValue::Entities(Vec::new()),
                SlotKind::Camera => SlotValue::Camera(crate::ecs::Entity::from_bits(0)),
                SlotKind::Eye => SlotValue::Eye(Eye {
                    view: Mat4::IDENTITY,
                    proj: Mat4::IDENTITY,
                }),
                SlotKind::Target => SlotValue::Target(TargetId::from_raw(0)),
            }))
        }
    }

    struct Fixture {
        scene: Scene,
        backend: NullBackend,
        targets: TargetPool,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                scene: Scene::new("test"),
                backend: NullBackend::default(),
                targets: TargetPool::new(),
            }
        }

        fn ctx(&mut self) -> FrameContext<'_> {
            FrameContext {
                scene: &self.scene,
                backend: &mut self.backend,
                targets: &mut self.targets,
                viewport: (640, 480),
            }
        }
    }

    fn trace_graph() -> (RenderGraph, Rc<RefCell<Vec<&'static str>>>, OpId, OpId, OpId) {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let mut graph = RenderGraph::new();
        let eye = graph.add(Box::new(TraceOp {
            tag: "eye",
            inputs: &[],
            output: Some(SlotKind::Eye),
            trace: trace.clone(),
            fail: false,
        }));
        let target = graph.add(Box::new(TraceOp {
            tag: "target",
            inputs: &[],
            output: Some(SlotKind::Target),
            trace: trace.clone(),
            fail: false,
        }));
        let draw = graph.add(Box::new(TraceOp {
            tag: "draw",
            inputs: &[SlotKind::Eye, SlotKind::Target],
            output: Some(SlotKind::Target),
            trace: trace.clone(),
            fail: false,
        }));
        graph.connect(eye, draw, 0).unwrap();
        graph.connect(target, draw, 1).unwrap();
        (graph, trace, eye, target, draw)
    }

    #[test]
    fn test_dependencies_execute_before_consumers() {
        let (mut graph, trace, ..) = trace_graph();
        let mut fx = Fixture::new();

        let report = graph.execute(&mut fx.ctx());

        assert!(report.is_complete());
        assert_eq!(report.executed, 3);
        let order = trace.borrow();
        let position = |tag| order.iter().position(|&t| t == tag).unwrap();
        assert!(position("eye") < position("draw"));
        assert!(position("target") < position("draw"));
    }

    #[test]
    fn test_states_reset_between_frames() {
        let (mut graph, _, eye, _, draw) = trace_graph();
        let mut fx = Fixture::new();

        assert_eq!(graph.state(eye), Some(NodeState::Uninitialized));
        graph.execute(&mut fx.ctx());
        assert_eq!(graph.state(draw), Some(NodeState::Executed));

        let report = graph.execute(&mut fx.ctx());
        assert!(report.is_complete());
        assert_eq!(graph.state(draw), Some(NodeState::Executed));
    }

    #[test]
    fn test_failed_provider_short_circuits_consumers() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let mut graph = RenderGraph::new();
        let bad = graph.add(Box::new(TraceOp {
            tag: "bad-camera",
            inputs: &[],
            output: Some(SlotKind::Eye),
            trace: trace.clone(),
            fail: true,
        }));
        let draw = graph.add(Box::new(TraceOp {
            tag: "draw",
            inputs: &[SlotKind::Eye],
            output: None,
            trace: trace.clone(),
            fail: false,
        }));
        graph.connect(bad, draw, 0).unwrap();
        let mut fx = Fixture::new();

        let report = graph.execute(&mut fx.ctx());

        // The consumer never ran and the error stayed in the report.
        assert!(!report.is_complete());
        assert!(trace.borrow().is_empty());
        assert_eq!(graph.state(draw), Some(NodeState::Ready));
    }

    #[test]
    fn test_cycle_is_reported_not_looped() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let mut graph = RenderGraph::new();
        let a = graph.add(Box::new(TraceOp {
            tag: "a",
            inputs: &[SlotKind::Target],
            output: Some(SlotKind::Target),
            trace: trace.clone(),
            fail: false,
        }));
        let b = graph.add(Box::new(TraceOp {
            tag: "b",
            inputs: &[SlotKind::Target],
            output: Some(SlotKind::Target),
            trace: trace.clone(),
            fail: false,
        }));
        graph.connect(a, b, 0).unwrap();
        graph.connect(b, a, 0).unwrap();
        let mut fx = Fixture::new();

        let report = graph.execute(&mut fx.ctx());

        assert!(!report.is_complete());
        assert_eq!(report.executed, 0);
        assert!(trace.borrow().is_empty());
    }

    #[test]
    fn test_connect_rejects_kind_mismatch() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let mut graph = RenderGraph::new();
        let eye = graph.add(Box::new(TraceOp {
            tag: "eye",
            inputs: &[],
            output: Some(SlotKind::Eye),
            trace: trace.clone(),
            fail: false,
        }));
        let draw = graph.add(Box::new(TraceOp {
            tag: "draw",
            inputs: &[SlotKind::Target],
            output: None,
            trace,
            fail: false,
        }));

        let result = graph.connect(eye, draw, 0);

        assert_eq!(
            result,
            Err(GraphError::KindMismatch {
                expected: SlotKind::Target,
                found: SlotKind::Eye,
            })
        );
    }

    #[test]
    fn test_unwired_port_aborts_before_running() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let mut graph = RenderGraph::new();
        graph.add(Box::new(TraceOp {
            tag: "draw",
            inputs: &[SlotKind::Eye],
            output: None,
            trace: trace.clone(),
            fail: false,
        }));
        let mut fx = Fixture::new();

        let report = graph.execute(&mut fx.ctx());

        assert!(!report.is_complete());
        assert!(trace.borrow().is_empty());
    }
}
