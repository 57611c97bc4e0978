//! Script-engine bridge
//!
//! The fixed set of named native callbacks a managed script runtime can
//! invoke. Signatures are primitive/value types only; callbacks are
//! plain functions dispatched through an explicit registry, looked up
//! by stable name.

use glam::Vec3;
use rustc_hash::FxHashMap;
use winit::keyboard::KeyCode;

use crate::audio::{AudioManager, InstanceId};
use crate::core::Scene;
use crate::ecs::{self, Entity};
use crate::input::Input;

/// Value types crossing the script boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    /// No value
    Void,
    /// Boolean
    Bool(bool),
    /// 64-bit integer (also carries entity and instance ids)
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// 2-component vector
    Vec2(f32, f32),
    /// 3-component vector
    Vec3(f32, f32, f32),
    /// String
    Str(String),
}

/// Errors surfaced to the calling script runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// No callback registered under the name.
    UnknownFunction(String),
    /// An argument was missing or of the wrong type.
    BadArgument {
        /// Zero-based argument index
        index: usize,
        /// Human-readable expectation
        expected: &'static str,
    },
    /// The subsystem backing the callback is not attached.
    Unavailable(&'static str),
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownFunction(name) => write!(f, "unknown native function '{name}'"),
            Self::BadArgument { index, expected } => {
                write!(f, "argument {index}: expected {expected}")
            }
            Self::Unavailable(what) => write!(f, "{what} is not available"),
        }
    }
}

impl std::error::Error for ScriptError {}

/// Positional arguments of one call.
#[derive(Debug, Clone, Default)]
pub struct ScriptArgs(Vec<ScriptValue>);

impl ScriptArgs {
    /// Wrap a list of values.
    #[must_use]
    pub fn new(values: Vec<ScriptValue>) -> Self {
        Self(values)
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no arguments were passed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn int_at(&self, index: usize) -> Result<i64, ScriptError> {
        match self.0.get(index) {
            Some(ScriptValue::Int(v)) => Ok(*v),
            _ => Err(ScriptError::BadArgument {
                index,
                expected: "int",
            }),
        }
    }

    fn float_at(&self, index: usize) -> Result<f64, ScriptError> {
        match self.0.get(index) {
            Some(ScriptValue::Float(v)) => Ok(*v),
            Some(ScriptValue::Int(v)) => Ok(*v as f64),
            _ => Err(ScriptError::BadArgument {
                index,
                expected: "float",
            }),
        }
    }

    fn str_at(&self, index: usize) -> Result<&str, ScriptError> {
        match self.0.get(index) {
            Some(ScriptValue::Str(v)) => Ok(v),
            _ => Err(ScriptError::BadArgument {
                index,
                expected: "string",
            }),
        }
    }

    fn vec3_at(&self, index: usize) -> Result<Vec3, ScriptError> {
        match self.0.get(index) {
            Some(ScriptValue::Vec3(x, y, z)) => Ok(Vec3::new(*x, *y, *z)),
            _ => Err(ScriptError::BadArgument {
                index,
                expected: "vec3",
            }),
        }
    }
}

/// What scripts may touch during the script phase.
///
/// Borrows the orchestrator's subsystems for the duration of the phase;
/// optional subsystems are absent in headless mode.
pub struct HostApi<'a> {
    /// Polled input state
    pub input: &'a Input,
    /// Active scene, if one is set
    pub scene: Option<&'a mut Scene>,
    /// Audio manager, absent in headless mode
    pub audio: Option<&'a mut AudioManager>,
    /// Set true to ask the engine to exit after this frame
    pub quit: &'a mut bool,
}

/// Signature every registered callback shares.
pub type NativeFn = fn(&mut HostApi, &ScriptArgs) -> Result<ScriptValue, ScriptError>;

/// Registry of named native callbacks.
pub struct ScriptBridge {
    functions: FxHashMap<&'static str, NativeFn>,
}

impl ScriptBridge {
    /// Create the bridge with the full callback set registered.
    #[must_use]
    pub fn new() -> Self {
        let mut bridge = Self {
            functions: FxHashMap::default(),
        };
        bridge.register("input.is_key_pressed", input_is_key_pressed);
        bridge.register("input.mouse_position", input_mouse_position);
        bridge.register("input.scroll_delta", input_scroll_delta);
        bridge.register("audio.play_oneshot", audio_play_oneshot);
        bridge.register("audio.play_looping", audio_play_looping);
        bridge.register("audio.stop", audio_stop);
        bridge.register("physics.raycast", physics_raycast);
        bridge.register("entity.position", entity_position);
        bridge
    }

    fn register(&mut self, name: &'static str, function: NativeFn) {
        self.functions.insert(name, function);
    }

    /// Invoke the callback registered under `name`.
    ///
    /// # Errors
    ///
    /// [`ScriptError::UnknownFunction`] for an unregistered name, plus
    /// whatever the callback itself reports.
    pub fn invoke(
        &self,
        name: &str,
        api: &mut HostApi,
        args: &ScriptArgs,
    ) -> Result<ScriptValue, ScriptError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| ScriptError::UnknownFunction(name.to_string()))?;
        function(api, args)
    }

    /// Names of every registered callback, unsorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.functions.keys().copied()
    }
}

impl Default for ScriptBridge {
    fn default() -> Self {
        Self::new()
    }
}

fn input_is_key_pressed(api: &mut HostApi, args: &ScriptArgs) -> Result<ScriptValue, ScriptError> {
    let key = key_from_name(args.str_at(0)?).ok_or(ScriptError::BadArgument {
        index: 0,
        expected: "known key name",
    })?;
    Ok(ScriptValue::Bool(api.input.is_key_pressed(key)))
}

fn input_mouse_position(api: &mut HostApi, _args: &ScriptArgs) -> Result<ScriptValue, ScriptError> {
    let position = api.input.mouse_position();
    Ok(ScriptValue::Vec2(position.x, position.y))
}

fn input_scroll_delta(api: &mut HostApi, _args: &ScriptArgs) -> Result<ScriptValue, ScriptError> {
    let delta = api.input.scroll_delta();
    Ok(ScriptValue::Vec2(delta.x, delta.y))
}

fn audio_play_oneshot(api: &mut HostApi, args: &ScriptArgs) -> Result<ScriptValue, ScriptError> {
    let entity = Entity::from_bits(args.int_at(0)? as u64);
    let sound = args.str_at(1)?;
    let volume = if args.len() > 2 { args.float_at(2)? } else { 1.0 };
    let audio = api
        .audio
        .as_deref_mut()
        .ok_or(ScriptError::Unavailable("audio"))?;
    match audio.play_oneshot(entity, sound, volume as f32) {
        Ok(id) => Ok(ScriptValue::Int(id.raw() as i64)),
        Err(e) => {
            // A failed voice is not fatal to the calling script.
            log::warn!("audio.play_oneshot: {e}");
            Ok(ScriptValue::Int(0))
        }
    }
}

fn audio_play_looping(api: &mut HostApi, args: &ScriptArgs) -> Result<ScriptValue, ScriptError> {
    let entity = Entity::from_bits(args.int_at(0)? as u64);
    let sound = args.str_at(1)?;
    let volume = if args.len() > 2 { args.float_at(2)? } else { 1.0 };
    let audio = api
        .audio
        .as_deref_mut()
        .ok_or(ScriptError::Unavailable("audio"))?;
    match audio.play_looping(entity, sound, volume as f32) {
        Ok(id) => Ok(ScriptValue::Int(id.raw() as i64)),
        Err(e) => {
            log::warn!("audio.play_looping: {e}");
            Ok(ScriptValue::Int(0))
        }
    }
}

fn audio_stop(api: &mut HostApi, args: &ScriptArgs) -> Result<ScriptValue, ScriptError> {
    let entity = Entity::from_bits(args.int_at(0)? as u64);
    let id = InstanceId::from_raw(args.int_at(1)? as u64);
    let audio = api
        .audio
        .as_deref_mut()
        .ok_or(ScriptError::Unavailable("audio"))?;
    Ok(ScriptValue::Bool(audio.stop(entity, id)))
}

fn physics_raycast(api: &mut HostApi, args: &ScriptArgs) -> Result<ScriptValue, ScriptError> {
    let origin = args.vec3_at(0)?;
    let direction = args.vec3_at(1)?;
    let max_distance = args.float_at(2)? as f32;
    let scene = api
        .scene
        .as_deref_mut()
        .ok_or(ScriptError::Unavailable("scene"))?;
    // Negative distance means no hit; keeps the return a plain float.
    let distance = scene
        .physics()
        .raycast(origin, direction, max_distance)
        .map_or(-1.0, |hit| hit.distance);
    Ok(ScriptValue::Float(f64::from(distance)))
}

fn entity_position(api: &mut HostApi, args: &ScriptArgs) -> Result<ScriptValue, ScriptError> {
    let entity = Entity::from_bits(args.int_at(0)? as u64);
    let scene = api
        .scene
        .as_deref_mut()
        .ok_or(ScriptError::Unavailable("scene"))?;
    if !scene.store().contains(entity) {
        // Invalid handles report "not found" rather than failing.
        return Ok(ScriptValue::Void);
    }
    match ecs::world_pose(scene.store(), entity) {
        Ok((position, _)) => Ok(ScriptValue::Vec3(position.x, position.y, position.z)),
        Err(e) => {
            log::warn!("entity.position: {e}");
            Ok(ScriptValue::Void)
        }
    }
}

fn key_from_name(name: &str) -> Option<KeyCode> {
    let key = match name {
        "KeyA" => KeyCode::KeyA,
        "KeyD" => KeyCode::KeyD,
        "KeyE" => KeyCode::KeyE,
        "KeyQ" => KeyCode::KeyQ,
        "KeyR" => KeyCode::KeyR,
        "KeyS" => KeyCode::KeyS,
        "KeyW" => KeyCode::KeyW,
        "Space" => KeyCode::Space,
        "Escape" => KeyCode::Escape,
        "Enter" => KeyCode::Enter,
        "ShiftLeft" => KeyCode::ShiftLeft,
        "ControlLeft" => KeyCode::ControlLeft,
        "ArrowUp" => KeyCode::ArrowUp,
        "ArrowDown" => KeyCode::ArrowDown,
        "ArrowLeft" => KeyCode::ArrowLeft,
        "ArrowRight" => KeyCode::ArrowRight,
        _ => return None,
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HostEvent;

    fn api<'a>(input: &'a Input, scene: Option<&'a mut Scene>, quit: &'a mut bool) -> HostApi<'a> {
        HostApi {
            input,
            scene,
            audio: None,
            quit,
        }
    }

    #[test]
    fn test_input_query_dispatch() {
        let bridge = ScriptBridge::new();
        let mut input = Input::new();
        input.apply(&HostEvent::Key {
            code: KeyCode::Space,
            pressed: true,
        });
        let mut quit = false;
        let mut host = api(&input, None, &mut quit);

        let result = bridge.invoke(
            "input.is_key_pressed",
            &mut host,
            &ScriptArgs::new(vec![ScriptValue::Str("Space".to_string())]),
        );

        assert_eq!(result, Ok(ScriptValue::Bool(true)));
    }

    #[test]
    fn test_unknown_function_is_an_error() {
        let bridge = ScriptBridge::new();
        let input = Input::new();
        let mut quit = false;
        let mut host = api(&input, None, &mut quit);

        let result = bridge.invoke("no.such_fn", &mut host, &ScriptArgs::default());

        assert_eq!(
            result,
            Err(ScriptError::UnknownFunction("no.such_fn".to_string()))
        );
    }

    #[test]
    fn test_bad_argument_is_reported() {
        let bridge = ScriptBridge::new();
        let input = Input::new();
        let mut quit = false;
        let mut host = api(&input, None, &mut quit);

        let result = bridge.invoke(
            "input.is_key_pressed",
            &mut host,
            &ScriptArgs::new(vec![ScriptValue::Int(3)]),
        );

        assert!(matches!(result, Err(ScriptError::BadArgument { .. })));
    }

    #[test]
    fn test_audio_without_manager_is_unavailable() {
        let bridge = ScriptBridge::new();
        let input = Input::new();
        let mut quit = false;
        let mut host = api(&input, None, &mut quit);

        let result = bridge.invoke(
            "audio.play_oneshot",
            &mut host,
            &ScriptArgs::new(vec![
                ScriptValue::Int(0),
                ScriptValue::Str("beep".to_string()),
            ]),
        );

        assert_eq!(result, Err(ScriptError::Unavailable("audio")));
    }

    #[test]
    fn test_entity_position_for_dead_entity_is_void() {
        let bridge = ScriptBridge::new();
        let input = Input::new();
        let mut scene = Scene::new("s");
        let e = scene.store_mut().create("gone");
        scene.destroy_entity(e);
        let mut quit = false;
        let mut host = api(&input, Some(&mut scene), &mut quit);

        let result = bridge.invoke(
            "entity.position",
            &mut host,
            &ScriptArgs::new(vec![ScriptValue::Int(e.to_bits() as i64)]),
        );

        assert_eq!(result, Ok(ScriptValue::Void));
    }

    #[test]
    fn test_entity_position_returns_world_position() {
        let bridge = ScriptBridge::new();
        let input = Input::new();
        let mut scene = Scene::new("s");
        let e = scene.store_mut().create("thing");
        scene
            .store_mut()
            .insert(
                e,
                crate::ecs::Transform::from_position(Vec3::new(1.0, 2.0, 3.0)),
            )
            .unwrap();
        let mut quit = false;
        let mut host = api(&input, Some(&mut scene), &mut quit);

        let result = bridge.invoke(
            "entity.position",
            &mut host,
            &ScriptArgs::new(vec![ScriptValue::Int(e.to_bits() as i64)]),
        );

        assert_eq!(result, Ok(ScriptValue::Vec3(1.0, 2.0, 3.0)));
    }
}
