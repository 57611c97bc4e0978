//! Engine orchestrator and main loop
//!
//! The engine owns the active scene and pipeline, every subsystem, and
//! the attached middleware, and drives the frame in a fixed order:
//! drain boundary events into input, step physics (bridging its
//! events), run the script phase (which reads them), update audio, then
//! execute the render pipeline. Single-threaded; each phase runs to
//! completion before the next.

use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use super::events::{EventQueue, HostEvent};
use super::middleware::{Middleware, NullMiddleware};
use super::scene::{Scene, SceneId};
use super::time::Time;
use crate::audio::{AudioError, AudioManager};
use crate::input::Input;
use crate::renderer::{
    BackendError, FrameReport, OutputMode, Pipeline, PipelineId, TargetPool, WgpuRenderer,
};
use crate::scripting::{HostApi, ScriptBridge};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable VSync
    pub vsync: bool,
    /// Where presented frames go
    pub output_mode: OutputMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: String::from("Meridian"),
            width: 1280,
            height: 720,
            vsync: true,
            output_mode: OutputMode::Surface,
        }
    }
}

impl EngineConfig {
    /// Set the window title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set window dimensions.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable VSync.
    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Present offscreen for an embedding editor viewport.
    #[must_use]
    pub fn with_offscreen_output(mut self) -> Self {
        self.output_mode = OutputMode::Offscreen;
        self
    }
}

/// What the engine runs each frame.
///
/// Higher states enable more phases; the update falls through from
/// physics down to rendering the way the state allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Before initialization completes
    Init,
    /// Shutdown requested; the loop exits after this frame
    AwaitingShutdown,
    /// Only render the current state, no updates
    RenderOnly,
    /// System services run, gameplay and physics paused
    SystemUpdate,
    /// Scripts run, physics paused
    Logic,
    /// Everything runs
    Full,
}

impl EngineState {
    const fn runs_physics(self) -> bool {
        matches!(self, Self::Full)
    }

    const fn runs_scripts(self) -> bool {
        matches!(self, Self::Full | Self::Logic)
    }

    const fn runs_systems(self) -> bool {
        matches!(self, Self::Full | Self::Logic | Self::SystemUpdate)
    }

    const fn renders(self) -> bool {
        !matches!(self, Self::Init | Self::AwaitingShutdown)
    }
}

/// Errors that can stop the engine from starting.
#[derive(Debug)]
pub enum EngineError {
    /// Audio backend failed to initialize
    Audio(AudioError),
    /// Graphics backend failed to initialize
    Backend(BackendError),
    /// The host event loop failed
    EventLoop(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio(e) => write!(f, "audio init: {e}"),
            Self::Backend(e) => write!(f, "render init: {e}"),
            Self::EventLoop(e) => write!(f, "event loop: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<AudioError> for EngineError {
    fn from(e: AudioError) -> Self {
        Self::Audio(e)
    }
}

/// The engine: owns the active scene, the active pipeline, and every
/// subsystem, and drives the frame loop.
pub struct Engine {
    config: EngineConfig,
    state: EngineState,
    time: Time,
    input: Input,
    events: EventQueue,
    bridge: ScriptBridge,
    audio: Option<AudioManager>,
    scene: Option<Scene>,
    last_scene_id: Option<SceneId>,
    pipeline: Option<Pipeline>,
    last_pipeline_id: Option<PipelineId>,
    targets: TargetPool,
    renderer: Option<WgpuRenderer>,
    middleware: Box<dyn Middleware>,
    window: Option<Arc<Window>>,
    viewport: (u32, u32),
    last_report: Option<FrameReport>,
    should_quit: bool,
}

impl Engine {
    /// Create a full engine with the audio backend live.
    ///
    /// # Errors
    ///
    /// [`EngineError::Audio`] when no output device exists; native
    /// backend failure at startup is fatal, the engine refuses to
    /// start.
    pub fn new(config: EngineConfig, middleware: Box<dyn Middleware>) -> Result<Self, EngineError> {
        let audio = AudioManager::new()?;
        let mut engine = Self::assemble(config, Some(audio), middleware);
        log::info!("[Engine] all subsystems initialized");
        engine.middleware.on_runtime_initialized();
        engine.state = EngineState::SystemUpdate;
        Ok(engine)
    }

    /// Create an engine without window, renderer, or audio.
    ///
    /// For tools, servers, and tests: `update` runs every non-render
    /// phase, and rendering can be driven against any backend through
    /// the pipeline directly.
    #[must_use]
    pub fn headless(config: EngineConfig) -> Self {
        let mut engine = Self::assemble(config, None, Box::new(NullMiddleware));
        engine.middleware.on_runtime_initialized();
        engine.state = EngineState::Full;
        engine
    }

    fn assemble(
        config: EngineConfig,
        audio: Option<AudioManager>,
        middleware: Box<dyn Middleware>,
    ) -> Self {
        let viewport = (config.width, config.height);
        Self {
            config,
            state: EngineState::Init,
            time: Time::new(),
            input: Input::new(),
            events: EventQueue::new(),
            bridge: ScriptBridge::new(),
            audio,
            scene: None,
            last_scene_id: None,
            pipeline: None,
            last_pipeline_id: None,
            targets: TargetPool::new(),
            renderer: None,
            middleware,
            window: None,
            viewport,
            last_report: None,
            should_quit: false,
        }
    }

    /// Replace the attached middleware.
    pub fn attach_middleware(&mut self, middleware: Box<dyn Middleware>) {
        self.middleware = middleware;
    }

    /// Make `scene` the active scene, returning the previous one.
    ///
    /// Emits `on_scene_changed` only when the incoming instance differs
    /// from the one last set; re-setting the same instance is silent.
    pub fn set_scene(&mut self, scene: Scene) -> Option<Scene> {
        let changed = self.last_scene_id != Some(scene.id());
        self.last_scene_id = Some(scene.id());
        let previous = self.scene.replace(scene);
        if changed {
            log::info!("[Engine] scene changed");
            if let Some(scene) = self.scene.as_ref() {
                self.middleware.on_scene_changed(scene);
            }
        }
        previous
    }

    /// Remove and return the active scene without touching the change
    /// tracking.
    pub fn take_scene(&mut self) -> Option<Scene> {
        self.scene.take()
    }

    /// Make `pipeline` the active pipeline, returning the previous one.
    ///
    /// Same notification contract as [`Engine::set_scene`].
    pub fn set_pipeline(&mut self, pipeline: Pipeline) -> Option<Pipeline> {
        let changed = self.last_pipeline_id != Some(pipeline.id());
        self.last_pipeline_id = Some(pipeline.id());
        let previous = self.pipeline.replace(pipeline);
        if changed {
            log::info!("[Engine] pipeline changed");
            if let Some(pipeline) = self.pipeline.as_ref() {
                self.middleware.on_pipeline_changed(pipeline);
            }
        }
        previous
    }

    /// Remove and return the active pipeline.
    pub fn take_pipeline(&mut self) -> Option<Pipeline> {
        self.pipeline.take()
    }

    /// The active scene.
    #[must_use]
    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    /// The active scene, mutably.
    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        self.scene.as_mut()
    }

    /// Polled input state.
    #[must_use]
    pub const fn input(&self) -> &Input {
        &self.input
    }

    /// The boundary event queue; hosts embedding the engine push
    /// translated events here.
    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    /// The audio manager, absent in headless mode.
    pub fn audio_mut(&mut self) -> Option<&mut AudioManager> {
        self.audio.as_mut()
    }

    /// The script bridge.
    #[must_use]
    pub const fn bridge(&self) -> &ScriptBridge {
        &self.bridge
    }

    /// Frame clock.
    #[must_use]
    pub const fn time(&self) -> &Time {
        &self.time
    }

    /// Current engine state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Transition to `state`.
    pub fn set_state(&mut self, state: EngineState) {
        log::trace!("[Engine] state transition {:?} -> {state:?}", self.state);
        self.state = state;
    }

    /// Report of the most recent rendered frame.
    #[must_use]
    pub const fn last_frame_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    /// Ask the loop to exit after the current frame.
    pub fn request_shutdown(&mut self) {
        self.should_quit = true;
        self.set_state(EngineState::AwaitingShutdown);
    }

    /// Advance the engine by one frame.
    ///
    /// Phase order is a design invariant: physics events are bridged
    /// before scripts read them, and transforms are current before
    /// audio and rendering consume them.
    pub fn update(&mut self, delta: f32) {
        // Input: drain the boundary queue exactly once.
        let mut resized = None;
        let mut close_requested = false;
        for event in self.events.drain() {
            match event {
                HostEvent::Resized(width, height) => resized = Some((width, height)),
                HostEvent::CloseRequested => close_requested = true,
                _ => {}
            }
            self.input.apply(&event);
        }
        if let Some((width, height)) = resized {
            self.viewport = (width, height);
            if let Some(renderer) = self.renderer.as_mut() {
                use crate::renderer::RenderBackend;
                renderer.resize(width, height);
            }
        }
        if close_requested {
            self.request_shutdown();
        }

        // Physics: step and bridge events.
        if self.state.runs_physics() {
            if let Some(scene) = self.scene.as_mut() {
                scene.step_physics(delta);
            }
            self.middleware.on_physics_update(delta);
        }

        // Scripts: gameplay consumes the bridged events.
        if self.state.runs_scripts() {
            let mut quit = false;
            let mut api = HostApi {
                input: &self.input,
                scene: self.scene.as_mut(),
                audio: self.audio.as_mut(),
                quit: &mut quit,
            };
            self.middleware.on_script_update(delta, &self.bridge, &mut api);
            if quit {
                self.request_shutdown();
            }
        }

        // System services.
        if self.state.runs_systems() {
            if let (Some(audio), Some(scene)) = (self.audio.as_mut(), self.scene.as_ref()) {
                audio.update(scene.store(), scene.physics());
            }
            self.middleware.on_system_update(delta);
        }

        // Render.
        self.middleware.on_start_render();
        if self.state.renders()
            && let (Some(pipeline), Some(scene), Some(renderer)) = (
                self.pipeline.as_mut(),
                self.scene.as_ref(),
                self.renderer.as_mut(),
            )
        {
            let report = pipeline.execute(scene, renderer, &mut self.targets, self.viewport);
            if let Some(reason) = &report.aborted {
                log::debug!("[Engine] frame degraded: {reason}");
            }
            self.last_report = Some(report);
        }
        self.middleware.on_end_render();

        self.input.end_frame();
    }

    /// Run the engine loop until shutdown.
    ///
    /// # Errors
    ///
    /// [`EngineError::EventLoop`] when the host loop cannot start.
    pub fn run(mut self) -> Result<(), EngineError> {
        let _ = env_logger::try_init();
        log::info!("[Engine] starting: {}", self.config.title);

        let event_loop =
            EventLoop::new().map_err(|e| EngineError::EventLoop(e.to_string()))?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop
            .run_app(&mut self)
            .map_err(|e| EngineError::EventLoop(e.to_string()))?;
        Ok(())
    }

    fn shutdown(&mut self) {
        log::info!("[Engine] shutting down");
        self.middleware.on_runtime_shutdown();
        if let Some(audio) = self.audio.as_mut() {
            audio.stop_all();
        }
    }
}

impl ApplicationHandler for Engine {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .expect("Failed to create window"),
        );

        match pollster::block_on(WgpuRenderer::new(
            Arc::clone(&window),
            self.config.vsync,
            self.config.output_mode,
        )) {
            Ok(renderer) => {
                self.renderer = Some(renderer);
                self.window = Some(window);
                self.middleware.on_renderer_initialized();
                self.set_state(EngineState::Full);
            }
            Err(e) => {
                // Fatal: a dead graphics backend at startup means the
                // engine refuses to start.
                log::error!("[Engine] {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                self.events.push(HostEvent::CloseRequested);
            }

            WindowEvent::Resized(new_size) => {
                if new_size.width > 0 && new_size.height > 0 {
                    self.events
                        .push(HostEvent::Resized(new_size.width, new_size.height));
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let winit::keyboard::PhysicalKey::Code(code) = event.physical_key {
                    self.events.push(HostEvent::Key {
                        code,
                        pressed: event.state.is_pressed(),
                    });
                }
            }

            WindowEvent::MouseInput { state, button, .. } => {
                self.events.push(HostEvent::MouseButton {
                    button,
                    pressed: state.is_pressed(),
                });
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.events.push(HostEvent::CursorMoved(glam::Vec2::new(
                    position.x as f32,
                    position.y as f32,
                )));
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    winit::event::MouseScrollDelta::LineDelta(x, y) => glam::Vec2::new(x, y),
                    winit::event::MouseScrollDelta::PixelDelta(pos) => {
                        glam::Vec2::new(pos.x as f32, pos.y as f32)
                    }
                };
                self.events.push(HostEvent::MouseWheel(scroll));
            }

            WindowEvent::RedrawRequested => {
                self.time.update();
                let delta = self.time.delta();
                self.update(delta);

                if self.should_quit {
                    self.shutdown();
                    event_loop.exit();
                    return;
                }

                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{ColliderShape, DynamicActor, Transform};
    use crate::physics::TriggerEvent;
    use crate::scripting::ScriptBridge;
    use glam::Vec3;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Middleware for Recorder {
        fn on_scene_changed(&mut self, scene: &Scene) {
            self.log
                .borrow_mut()
                .push(format!("scene:{}", scene.name()));
        }

        fn on_pipeline_changed(&mut self, pipeline: &Pipeline) {
            self.log
                .borrow_mut()
                .push(format!("pipeline:{}", pipeline.name()));
        }

        fn on_physics_update(&mut self, _delta: f32) {
            self.log.borrow_mut().push("physics".to_string());
        }

        fn on_script_update(&mut self, _delta: f32, _bridge: &ScriptBridge, api: &mut HostApi) {
            let events = api
                .scene
                .as_deref()
                .map_or(0, |scene| scene.physics().events().trigger_events().len());
            self.log.borrow_mut().push(format!("script:{events}"));
        }
    }

    fn recorded_engine() -> (Engine, Rc<RefCell<Vec<String>>>) {
        let mut engine = Engine::headless(EngineConfig::default());
        let log = Rc::new(RefCell::new(Vec::new()));
        engine.attach_middleware(Box::new(Recorder { log: log.clone() }));
        (engine, log)
    }

    #[test]
    fn test_same_scene_instance_does_not_reemit() {
        let (mut engine, log) = recorded_engine();

        engine.set_scene(Scene::new("alpha"));
        assert_eq!(log.borrow().len(), 1);

        // Take the instance back out and set it again: same id, no
        // second notification.
        let alpha = engine.take_scene().unwrap();
        engine.set_scene(alpha);
        assert_eq!(log.borrow().len(), 1);

        engine.set_scene(Scene::new("beta"));
        assert_eq!(log.borrow().as_slice(), ["scene:alpha", "scene:beta"]);
    }

    #[test]
    fn test_same_pipeline_instance_does_not_reemit() {
        let (mut engine, log) = recorded_engine();

        engine.set_pipeline(Pipeline::standard("forward"));
        let forward = engine.take_pipeline().unwrap();
        engine.set_pipeline(forward);

        assert_eq!(log.borrow().as_slice(), ["pipeline:forward"]);
    }

    #[test]
    fn test_state_gates_physics_phase() {
        let (mut engine, _log) = recorded_engine();
        let mut scene = Scene::new("world");
        let body = scene.create_entity("faller");
        scene
            .store_mut()
            .insert(body, Transform::from_position(Vec3::new(0.0, 10.0, 0.0)))
            .unwrap();
        scene
            .store_mut()
            .insert(
                body,
                DynamicActor::new(ColliderShape::Box {
                    half_extents: Vec3::splat(0.5),
                }),
            )
            .unwrap();
        engine.set_scene(scene);

        engine.set_state(EngineState::SystemUpdate);
        for _ in 0..10 {
            engine.update(1.0 / 60.0);
        }
        let paused_y = engine.scene().unwrap().store().get::<Transform>(body).unwrap().position.y;
        assert!((paused_y - 10.0).abs() < f32::EPSILON, "physics ran while paused");

        engine.set_state(EngineState::Full);
        for _ in 0..10 {
            engine.update(1.0 / 60.0);
        }
        let running_y = engine.scene().unwrap().store().get::<Transform>(body).unwrap().position.y;
        assert!(running_y < 10.0, "physics did not run in Full state");
    }

    #[test]
    fn test_script_phase_sees_bridged_trigger_events() {
        let (mut engine, log) = recorded_engine();
        let mut scene = Scene::new("world");

        let zone = scene.create_entity("zone");
        scene
            .store_mut()
            .insert(zone, Transform::from_position(Vec3::new(0.0, 0.5, 0.0)))
            .unwrap();
        let mut sensor = crate::ecs::StaticActor::new(ColliderShape::Box {
            half_extents: Vec3::splat(2.0),
        });
        sensor.trigger = true;
        scene.store_mut().insert(zone, sensor).unwrap();

        let body = scene.create_entity("body");
        scene
            .store_mut()
            .insert(body, Transform::from_position(Vec3::new(0.0, 1.0, 0.0)))
            .unwrap();
        scene
            .store_mut()
            .insert(
                body,
                DynamicActor::new(ColliderShape::Box {
                    half_extents: Vec3::splat(0.25),
                }),
            )
            .unwrap();
        engine.set_scene(scene);

        for _ in 0..10 {
            engine.update(1.0 / 60.0);
        }

        // The recorder counted trigger events during the script phase;
        // at least one frame observed the enter event.
        let saw_event = log
            .borrow()
            .iter()
            .any(|entry| entry.starts_with("script:") && entry != "script:0");
        assert!(saw_event, "script phase never saw bridged events: {:?}", log.borrow());
        // And every frame ran physics before scripts.
        let entries = log.borrow();
        let first_physics = entries.iter().position(|e| e == "physics").unwrap();
        let first_script = entries.iter().position(|e| e.starts_with("script:")).unwrap();
        assert!(first_physics < first_script);
    }

    #[test]
    fn test_events_cleared_at_next_step_not_before() {
        let mut engine = Engine::headless(EngineConfig::default());
        let mut scene = Scene::new("world");
        let zone = scene.create_entity("zone");
        scene
            .store_mut()
            .insert(zone, Transform::default())
            .unwrap();
        engine.set_scene(scene);
        engine.update(1.0 / 60.0);

        // Inject an event after the step; it must survive until the
        // next step clears it.
        engine
            .scene_mut()
            .unwrap()
            .physics_mut()
            .events_mut()
            .register_trigger(TriggerEvent {
                trigger: zone,
                actor: zone,
                entered: true,
            });
        assert_eq!(
            engine.scene().unwrap().physics().events().trigger_events().len(),
            1
        );

        engine.update(1.0 / 60.0);
        assert!(engine.scene().unwrap().physics().events().is_empty());
    }

    #[test]
    fn test_close_request_transitions_to_shutdown() {
        let (mut engine, _log) = recorded_engine();
        engine.events_mut().push(HostEvent::CloseRequested);

        engine.update(1.0 / 60.0);

        assert_eq!(engine.state(), EngineState::AwaitingShutdown);
    }
}
