//! Example runtime demonstrating engine features

use meridian::prelude::*;
use meridian::scripting::ScriptBridge;

/// Demo host: a falling crate on a ground plane, a trigger zone, and a
/// camera with the audio listener.
struct DemoHost {
    crate_entity: Entity,
    jump_queued: bool,
}

impl DemoHost {
    const fn new(crate_entity: Entity) -> Self {
        Self {
            crate_entity,
            jump_queued: false,
        }
    }
}

impl Middleware for DemoHost {
    fn on_renderer_initialized(&mut self) {
        log::info!("renderer live, entering full simulation");
    }

    fn on_script_update(&mut self, _delta: f32, bridge: &ScriptBridge, api: &mut HostApi) {
        if api.input.is_key_pressed(KeyCode::Escape) {
            *api.quit = true;
            return;
        }

        // The crate jumps on Space and steers with WASD.
        self.jump_queued |= api.input.is_key_just_pressed(KeyCode::Space);
        let mut force = Vec3::ZERO;
        if api.input.is_key_pressed(KeyCode::KeyW) {
            force.z -= 20.0;
        }
        if api.input.is_key_pressed(KeyCode::KeyS) {
            force.z += 20.0;
        }
        if api.input.is_key_pressed(KeyCode::KeyA) {
            force.x -= 20.0;
        }
        if api.input.is_key_pressed(KeyCode::KeyD) {
            force.x += 20.0;
        }

        let Some(scene) = api.scene.as_deref_mut() else {
            return;
        };
        if let Some(body) = scene
            .store()
            .get::<DynamicActor>(self.crate_entity)
            .and_then(|actor| actor.body)
        {
            if force != Vec3::ZERO {
                scene.physics_mut().apply_force(body, force);
            }
            if std::mem::take(&mut self.jump_queued) {
                scene.physics_mut().apply_impulse(body, Vec3::new(0.0, 5.0, 0.0));
            }
        }

        for event in scene.physics().events().trigger_events() {
            if event.entered {
                log::info!("trigger entered by {}", event.actor);
            }
        }

        // Query the crate's world position through the script surface.
        let args = ScriptArgs::new(vec![ScriptValue::Int(self.crate_entity.to_bits() as i64)]);
        if let Ok(ScriptValue::Vec3(_, y, _)) = bridge.invoke("entity.position", api, &args)
            && y < -20.0
        {
            log::info!("crate fell out of the world");
            *api.quit = true;
        }
    }
}

fn build_scene() -> (Scene, Entity) {
    let mut scene = Scene::new("demo");

    let ground = scene.create_entity("ground");
    scene
        .store_mut()
        .insert(
            ground,
            Transform {
                scale: Vec3::new(20.0, 1.0, 20.0),
                ..Default::default()
            },
        )
        .expect("ground is alive");
    scene
        .store_mut()
        .insert(ground, Renderable::new(Shape::Plane))
        .expect("ground is alive");
    scene
        .store_mut()
        .insert(
            ground,
            StaticActor::new(ColliderShape::Box {
                half_extents: Vec3::new(10.0, 0.1, 10.0),
            }),
        )
        .expect("ground is alive");

    let crate_entity = scene.create_entity("crate");
    scene
        .store_mut()
        .insert(crate_entity, Transform::from_position(Vec3::new(0.0, 5.0, 0.0)))
        .expect("crate is alive");
    scene
        .store_mut()
        .insert(crate_entity, Renderable::new(Shape::Cube))
        .expect("crate is alive");
    scene
        .store_mut()
        .insert(
            crate_entity,
            DynamicActor::new(ColliderShape::Box {
                half_extents: Vec3::splat(0.5),
            }),
        )
        .expect("crate is alive");

    let zone = scene.create_entity("zone");
    scene
        .store_mut()
        .insert(zone, Transform::from_position(Vec3::new(3.0, 1.0, 0.0)))
        .expect("zone is alive");
    let mut sensor = StaticActor::new(ColliderShape::Box {
        half_extents: Vec3::new(1.0, 1.0, 1.0),
    });
    sensor.trigger = true;
    scene.store_mut().insert(zone, sensor).expect("zone is alive");

    let camera = scene.create_entity("camera");
    let camera_transform = Transform::from_position_rotation(
        Vec3::new(0.0, 6.0, 12.0),
        Quat::from_rotation_x(-0.4),
    );
    scene
        .store_mut()
        .insert(camera, camera_transform)
        .expect("camera is alive");
    scene
        .store_mut()
        .insert(camera, CameraComponent::default())
        .expect("camera is alive");
    scene
        .store_mut()
        .insert(camera, AudioListenerComponent::default())
        .expect("camera is alive");

    (scene, crate_entity)
}

fn main() {
    let config = EngineConfig::default()
        .with_title("Meridian Demo")
        .with_size(1280, 720)
        .with_vsync(true);

    let (scene, crate_entity) = build_scene();

    let mut engine = match Engine::new(config, Box::new(DemoHost::new(crate_entity))) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("engine refused to start: {e}");
            return;
        }
    };
    engine.set_scene(scene);
    engine.set_pipeline(Pipeline::standard("forward"));

    if let Err(e) = engine.run() {
        eprintln!("Engine error: {e}");
    }
}
