//! Concrete render operations
//!
//! The building blocks pipelines are wired from: providers resolve the
//! frame's entities, camera, eye parameters, and target; the render
//! operation submits draw calls; the output operation presents.

use glam::Mat4;

use super::backend::DrawCall;
use super::graph::{Eye, FrameContext, GraphError, Operation, SlotKind, SlotValue};
use super::target::TargetDesc;
use crate::ecs::{self, CameraComponent, Entity, Meta, Renderable, Transform};

/// Supplies the set of visible entities for the frame.
///
/// Selects entities carrying `Renderable` + `Transform` whose meta is
/// enabled and whose renderable is visible.
#[derive(Debug, Default)]
pub struct EntityProvideOperation;

impl Operation for EntityProvideOperation {
    fn name(&self) -> &str {
        "entity-provide"
    }

    fn input_kinds(&self) -> &'static [SlotKind] {
        &[]
    }

    fn output_kind(&self) -> Option<SlotKind> {
        Some(SlotKind::Entities)
    }

    fn execute(
        &mut self,
        _inputs: &[SlotValue],
        ctx: &mut FrameContext,
    ) -> Result<Option<SlotValue>, GraphError> {
        let store = ctx.scene.store();
        let entities: Vec<Entity> = store
            .iter::<Renderable>()
            .filter(|(entity, renderable)| {
                renderable.visible
                    && store.has::<Transform>(*entity)
                    && store.get::<Meta>(*entity).is_none_or(|meta| meta.enabled)
            })
            .map(|(entity, _)| entity)
            .collect();
        Ok(Some(SlotValue::Entities(entities)))
    }
}

/// Resolves the camera entity the frame renders from.
///
/// The first enabled entity whose `CameraComponent` is marked `main`
/// wins; without one the frame degrades instead of drawing garbage.
#[derive(Debug, Default)]
pub struct CameraProvideOperation;

impl Operation for CameraProvideOperation {
    fn name(&self) -> &str {
        "camera-provide"
    }

    fn input_kinds(&self) -> &'static [SlotKind] {
        &[]
    }

    fn output_kind(&self) -> Option<SlotKind> {
        Some(SlotKind::Camera)
    }

    fn execute(
        &mut self,
        _inputs: &[SlotValue],
        ctx: &mut FrameContext,
    ) -> Result<Option<SlotValue>, GraphError> {
        let store = ctx.scene.store();
        store
            .iter::<CameraComponent>()
            .find(|(entity, camera)| {
                camera.main && store.get::<Meta>(*entity).is_none_or(|meta| meta.enabled)
            })
            .map(|(entity, _)| Some(SlotValue::Camera(entity)))
            .ok_or_else(|| GraphError::ResourceUnavailable("no active camera".to_string()))
    }
}

/// Computes view and projection matrices from the resolved camera.
#[derive(Debug, Default)]
pub struct EyeProvideOperation;

impl Operation for EyeProvideOperation {
    fn name(&self) -> &str {
        "eye-provide"
    }

    fn input_kinds(&self) -> &'static [SlotKind] {
        &[SlotKind::Camera]
    }

    fn output_kind(&self) -> Option<SlotKind> {
        Some(SlotKind::Eye)
    }

    fn execute(
        &mut self,
        inputs: &[SlotValue],
        ctx: &mut FrameContext,
    ) -> Result<Option<SlotValue>, GraphError> {
        let &SlotValue::Camera(camera) = &inputs[0] else {
            return Err(GraphError::ResourceUnavailable("camera input".to_string()));
        };
        let store = ctx.scene.store();
        let params = store
            .get::<CameraComponent>(camera)
            .copied()
            .ok_or_else(|| GraphError::ResourceUnavailable("camera destroyed".to_string()))?;

        let (position, rotation) = ecs::world_pose(store, camera)
            .map_err(|e| GraphError::ResourceUnavailable(e.to_string()))?;
        let view = Mat4::from_rotation_translation(rotation, position).inverse();

        let (width, height) = ctx.viewport;
        let aspect = width as f32 / height.max(1) as f32;
        let proj = Mat4::perspective_rh(params.fov, aspect, params.near, params.far);

        Ok(Some(SlotValue::Eye(Eye { view, proj })))
    }
}

/// Allocates or reuses a render target of the described size and format.
#[derive(Debug)]
pub struct TargetProvideOperation {
    desc: TargetDesc,
}

impl TargetProvideOperation {
    /// Provide a target matching `desc`.
    #[must_use]
    pub const fn new(desc: TargetDesc) -> Self {
        Self { desc }
    }

    /// The descriptor this operation provides.
    #[must_use]
    pub const fn desc(&self) -> TargetDesc {
        self.desc
    }
}

impl Default for TargetProvideOperation {
    fn default() -> Self {
        Self::new(TargetDesc::default())
    }
}

impl Operation for TargetProvideOperation {
    fn name(&self) -> &str {
        "target-provide"
    }

    fn input_kinds(&self) -> &'static [SlotKind] {
        &[]
    }

    fn output_kind(&self) -> Option<SlotKind> {
        Some(SlotKind::Target)
    }

    fn execute(
        &mut self,
        _inputs: &[SlotValue],
        ctx: &mut FrameContext,
    ) -> Result<Option<SlotValue>, GraphError> {
        let id = ctx.targets.acquire(self.desc, ctx.backend)?;
        Ok(Some(SlotValue::Target(id)))
    }
}

/// Issues the frame's draw submission.
///
/// Builds a world-space draw call per provided entity and hands the
/// batch to the backend. An entity whose hierarchy fails to resolve is
/// skipped with a warning; it must not take the frame down.
#[derive(Debug, Default)]
pub struct RenderOperation;

impl Operation for RenderOperation {
    fn name(&self) -> &str {
        "render"
    }

    fn input_kinds(&self) -> &'static [SlotKind] {
        &[SlotKind::Entities, SlotKind::Eye, SlotKind::Target]
    }

    fn output_kind(&self) -> Option<SlotKind> {
        Some(SlotKind::Target)
    }

    fn execute(
        &mut self,
        inputs: &[SlotValue],
        ctx: &mut FrameContext,
    ) -> Result<Option<SlotValue>, GraphError> {
        let (SlotValue::Entities(entities), SlotValue::Eye(eye), SlotValue::Target(target)) =
            (&inputs[0], &inputs[1], &inputs[2])
        else {
            return Err(GraphError::ResourceUnavailable("render inputs".to_string()));
        };

        let store = ctx.scene.store();
        let mut calls = Vec::with_capacity(entities.len());
        for &entity in entities {
            let Some(renderable) = store.get::<Renderable>(entity) else {
                continue;
            };
            match ecs::world_matrix(store, entity) {
                Ok(transform) => calls.push(DrawCall {
                    shape: renderable.shape,
                    transform,
                }),
                Err(e) => log::warn!("skipping {entity} in draw submission: {e}"),
            }
        }

        ctx.backend
            .submit(*target, eye, &calls)
            .map_err(|e| GraphError::Backend(e.to_string()))?;
        Ok(Some(SlotValue::Target(*target)))
    }
}

/// Presents the finished target.
///
/// Blits to the surface, or in editor mode to the offscreen texture
/// the viewport panel consumes; the backend decides which.
#[derive(Debug, Default)]
pub struct OutputToScreenOperation;

impl Operation for OutputToScreenOperation {
    fn name(&self) -> &str {
        "output-to-screen"
    }

    fn input_kinds(&self) -> &'static [SlotKind] {
        &[SlotKind::Target]
    }

    fn output_kind(&self) -> Option<SlotKind> {
        None
    }

    fn execute(
        &mut self,
        inputs: &[SlotValue],
        ctx: &mut FrameContext,
    ) -> Result<Option<SlotValue>, GraphError> {
        let &SlotValue::Target(target) = &inputs[0] else {
            return Err(GraphError::ResourceUnavailable("target input".to_string()));
        };
        ctx.backend
            .present(target)
            .map_err(|e| GraphError::Backend(e.to_string()))?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Scene;
    use crate::ecs::{Parent, Shape};
    use crate::renderer::backend::NullBackend;
    use crate::renderer::pipeline::Pipeline;
    use crate::renderer::target::TargetPool;
    use glam::Vec3;

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

        fn add_camera(&mut self) -> Entity {
            let camera = self.scene.store_mut().create("camera");
            self.scene
                .store_mut()
                .insert(camera, Transform::from_position(Vec3::new(0.0, 2.0, 5.0)))
                .unwrap();
            self.scene
                .store_mut()
                .insert(camera, CameraComponent::default())
                .unwrap();
            camera
        }

        fn add_cube(&mut self, name: &str) -> Entity {
            let cube = self.scene.store_mut().create(name);
            self.scene
                .store_mut()
                .insert(cube, Transform::default())
                .unwrap();
            self.scene
                .store_mut()
                .insert(cube, Renderable::new(Shape::Cube))
                .unwrap();
            cube
        }

        fn run(&mut self, pipeline: &mut Pipeline) -> crate::renderer::FrameReport {
            pipeline.execute(&self.scene, &mut self.backend, &mut self.targets, (800, 600))
        }
    }

    #[test]
    fn test_standard_pipeline_draws_and_presents() {
        let mut fx = Fixture::new();
        fx.add_camera();
        fx.add_cube("a");
        fx.add_cube("b");
        let mut pipeline = Pipeline::standard("main");

        let report = fx.run(&mut pipeline);

        assert!(report.is_complete(), "aborted: {:?}", report.aborted);
        assert_eq!(fx.backend.submits, 1);
        assert_eq!(fx.backend.draws, 2);
        assert_eq!(fx.backend.presents, 1);
    }

    #[test]
    fn test_missing_camera_skips_render_without_panic() {
        let mut fx = Fixture::new();
        fx.add_cube("a");
        let mut pipeline = Pipeline::standard("main");

        let report = fx.run(&mut pipeline);

        // The render operation must not execute and the failure stays
        // in the report.
        assert!(!report.is_complete());
        assert_eq!(fx.backend.submits, 0);
        assert_eq!(fx.backend.presents, 0);
    }

    #[test]
    fn test_invisible_and_disabled_entities_are_filtered() {
        let mut fx = Fixture::new();
        fx.add_camera();
        fx.add_cube("shown");
        let hidden = fx.add_cube("hidden");
        fx.scene
            .store_mut()
            .get_mut::<Renderable>(hidden)
            .unwrap()
            .visible = false;
        let disabled = fx.add_cube("disabled");
        fx.scene
            .store_mut()
            .get_mut::<Meta>(disabled)
            .unwrap()
            .enabled = false;
        let mut pipeline = Pipeline::standard("main");

        let report = fx.run(&mut pipeline);

        assert!(report.is_complete());
        assert_eq!(fx.backend.draws, 1);
    }

    #[test]
    fn test_cyclic_entity_is_skipped_not_fatal() {
        let mut fx = Fixture::new();
        fx.add_camera();
        fx.add_cube("ok");
        let a = fx.add_cube("cyclic");
        fx.scene.store_mut().insert(a, Parent(a)).unwrap();
        let mut pipeline = Pipeline::standard("main");

        let report = fx.run(&mut pipeline);

        assert!(report.is_complete());
        assert_eq!(fx.backend.draws, 1);
    }

    #[test]
    fn test_camera_on_disabled_entity_is_ignored() {
        let mut fx = Fixture::new();
        let camera = fx.add_camera();
        fx.scene
            .store_mut()
            .get_mut::<Meta>(camera)
            .unwrap()
            .enabled = false;
        let mut pipeline = Pipeline::standard("main");

        let report = fx.run(&mut pipeline);

        assert!(!report.is_complete());
    }

    #[test]
    fn test_second_frame_reuses_target() {
        let mut fx = Fixture::new();
        fx.add_camera();
        fx.add_cube("a");
        let mut pipeline = Pipeline::standard("main");

        fx.run(&mut pipeline);
        fx.run(&mut pipeline);

        assert_eq!(fx.backend.created.len(), 1);
        assert_eq!(fx.backend.presents, 2);
    }
}
