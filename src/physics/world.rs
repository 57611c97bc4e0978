//! Physics simulation using rapier3d
//!
//! The only module that talks to the native physics backend. Each step
//! clears the event list, advances the simulation, translates rapier's
//! collision events into [`PhysicsEventList`] records, and writes
//! dynamic body poses back into `Transform` components.

use glam::{Quat, Vec3};
use nalgebra::UnitQuaternion;
use rapier3d::crossbeam;
use rapier3d::prelude::*;

use super::events::{self, PhysicsEventList, TriggerEvent};
use crate::ecs::{DynamicActor, Entity, EntityStore, StaticActor, Transform};
use crate::ecs::ColliderShape;

/// Handle to a rigid body owned by a [`PhysicsWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub(crate) RigidBodyHandle);

/// Result of a raycast.
#[derive(Debug, Clone, Copy)]
pub struct RaycastHit {
    /// Entity owning the hit collider
    pub entity: Entity,
    /// World-space point of intersection
    pub point: Vec3,
    /// Distance from the ray origin
    pub distance: f32,
}

fn quat_to_rapier(q: Quat) -> UnitQuaternion<f32> {
    UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(q.w, q.x, q.y, q.z))
}

fn rapier_to_quat(uq: &UnitQuaternion<f32>) -> Quat {
    let q = uq.quaternion();
    Quat::from_xyzw(q.i, q.j, q.k, q.w)
}

fn collider_builder(shape: &ColliderShape) -> ColliderBuilder {
    match *shape {
        ColliderShape::Box { half_extents } => {
            ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
        }
        ColliderShape::Sphere { radius } => ColliderBuilder::ball(radius),
        ColliderShape::Capsule {
            half_height,
            radius,
        } => ColliderBuilder::capsule_y(half_height, radius),
    }
}

/// Physics world for one scene.
pub struct PhysicsWorld {
    /// Gravity vector
    pub gravity: Vec3,
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    integration_parameters: IntegrationParameters,
    events: PhysicsEventList,
}

impl PhysicsWorld {
    /// Create a world with default gravity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_gravity(Vec3::new(0.0, -9.81, 0.0))
    }

    /// Create a world with custom gravity.
    #[must_use]
    pub fn with_gravity(gravity: Vec3) -> Self {
        Self {
            gravity,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            integration_parameters: IntegrationParameters::default(),
            events: PhysicsEventList::new(),
        }
    }

    /// Events bridged by the most recent [`PhysicsWorld::step`].
    #[must_use]
    pub fn events(&self) -> &PhysicsEventList {
        &self.events
    }

    /// Mutable access to the event list, for hosts that inject
    /// synthetic events between steps.
    pub fn events_mut(&mut self) -> &mut PhysicsEventList {
        &mut self.events
    }

    /// Advance the simulation by `dt`.
    ///
    /// Order within the step is fixed: clear last frame's events, create
    /// bodies for actors that do not have one yet, run the native step
    /// collecting its callbacks, translate them into the event list, and
    /// write dynamic poses back into `Transform` components. Consumers
    /// read the list after this returns and before the next step.
    pub fn step(&mut self, dt: f32, store: &mut EntityStore) {
        self.events.clear();
        self.ensure_bodies(store);

        self.integration_parameters.dt = dt;

        let (collision_send, collision_recv) = crossbeam::channel::unbounded();
        let (contact_force_send, _contact_force_recv) = crossbeam::channel::unbounded();
        let event_handler = ChannelEventCollector::new(collision_send, contact_force_send);

        self.pipeline.step(
            &vector![self.gravity.x, self.gravity.y, self.gravity.z],
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &event_handler,
        );

        while let Ok(event) = collision_recv.try_recv() {
            self.bridge_event(event);
        }

        self.write_back(store);
    }

    /// Create bodies for actors whose handles are unset (new components
    /// or a freshly deserialized scene).
    fn ensure_bodies(&mut self, store: &mut EntityStore) {
        let pending_static: Vec<(Entity, StaticActor, Transform)> = store
            .iter::<StaticActor>()
            .filter(|(_, actor)| actor.body.is_none())
            .map(|(entity, actor)| (entity, *actor, transform_of(store, entity)))
            .collect();
        for (entity, actor, transform) in pending_static {
            let handle = self.add_static(entity, &transform, &actor);
            if let Some(slot) = store.get_mut::<StaticActor>(entity) {
                slot.body = Some(handle);
            }
        }

        let pending_dynamic: Vec<(Entity, DynamicActor, Transform)> = store
            .iter::<DynamicActor>()
            .filter(|(_, actor)| actor.body.is_none())
            .map(|(entity, actor)| (entity, *actor, transform_of(store, entity)))
            .collect();
        for (entity, actor, transform) in pending_dynamic {
            let handle = self.add_dynamic(entity, &transform, &actor);
            if let Some(slot) = store.get_mut::<DynamicActor>(entity) {
                slot.body = Some(handle);
            }
        }
    }

    fn add_static(&mut self, entity: Entity, transform: &Transform, actor: &StaticActor) -> BodyHandle {
        let isometry = Isometry::from_parts(
            nalgebra::Translation3::new(
                transform.position.x,
                transform.position.y,
                transform.position.z,
            ),
            quat_to_rapier(transform.rotation),
        );
        let body = RigidBodyBuilder::fixed()
            .position(isometry)
            .user_data(u128::from(entity.to_bits()))
            .build();
        let handle = self.rigid_body_set.insert(body);
        let collider = collider_builder(&actor.shape)
            .sensor(actor.trigger)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .user_data(u128::from(entity.to_bits()))
            .build();
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);
        BodyHandle(handle)
    }

    fn add_dynamic(
        &mut self,
        entity: Entity,
        transform: &Transform,
        actor: &DynamicActor,
    ) -> BodyHandle {
        let isometry = Isometry::from_parts(
            nalgebra::Translation3::new(
                transform.position.x,
                transform.position.y,
                transform.position.z,
            ),
            quat_to_rapier(transform.rotation),
        );
        let body = RigidBodyBuilder::dynamic()
            .position(isometry)
            .user_data(u128::from(entity.to_bits()))
            .build();
        let handle = self.rigid_body_set.insert(body);
        let collider = collider_builder(&actor.shape)
            .density(actor.density)
            .sensor(actor.trigger)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .user_data(u128::from(entity.to_bits()))
            .build();
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);
        BodyHandle(handle)
    }

    fn bridge_event(&mut self, event: CollisionEvent) {
        let (h1, h2, started) = match event {
            CollisionEvent::Started(h1, h2, _) => (h1, h2, true),
            CollisionEvent::Stopped(h1, h2, _) => (h1, h2, false),
        };
        let (Some(c1), Some(c2)) = (self.collider_set.get(h1), self.collider_set.get(h2)) else {
            // A collider removed during the step can still produce a
            // stop event; nothing left to attribute it to.
            return;
        };
        let e1 = Entity::from_bits(c1.user_data as u64);
        let e2 = Entity::from_bits(c2.user_data as u64);

        if c1.is_sensor() || c2.is_sensor() {
            let (trigger, actor) = if c1.is_sensor() { (e1, e2) } else { (e2, e1) };
            self.events.register_trigger(TriggerEvent {
                trigger,
                actor,
                entered: started,
            });
        } else {
            self.events.register_collision(events::CollisionEvent {
                first: e1,
                second: e2,
                started,
            });
        }
    }

    /// Copy dynamic body poses into `Transform` components.
    fn write_back(&self, store: &mut EntityStore) {
        let bodies: Vec<(Entity, BodyHandle)> = store
            .iter::<DynamicActor>()
            .filter_map(|(entity, actor)| actor.body.map(|body| (entity, body)))
            .collect();
        for (entity, body) in bodies {
            let Some(rb) = self.rigid_body_set.get(body.0) else {
                continue;
            };
            let translation = rb.translation();
            let rotation = rapier_to_quat(rb.rotation());
            if let Some(transform) = store.get_mut::<Transform>(entity) {
                transform.position = Vec3::new(translation.x, translation.y, translation.z);
                transform.rotation = rotation;
            }
        }
    }

    /// Remove a body and its colliders.
    pub fn remove_body(&mut self, body: BodyHandle) {
        self.rigid_body_set.remove(
            body.0,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
    }

    /// Apply a continuous force to a dynamic body.
    pub fn apply_force(&mut self, body: BodyHandle, force: Vec3) {
        if let Some(rb) = self.rigid_body_set.get_mut(body.0) {
            rb.add_force(vector![force.x, force.y, force.z], true);
        }
    }

    /// Apply an instantaneous impulse to a dynamic body.
    pub fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec3) {
        if let Some(rb) = self.rigid_body_set.get_mut(body.0) {
            rb.apply_impulse(vector![impulse.x, impulse.y, impulse.z], true);
        }
    }

    /// Set the linear velocity of a body.
    pub fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3) {
        if let Some(rb) = self.rigid_body_set.get_mut(body.0) {
            rb.set_linvel(vector![velocity.x, velocity.y, velocity.z], true);
        }
    }

    /// Linear velocity of a body, `None` for an unknown handle.
    #[must_use]
    pub fn linear_velocity(&self, body: BodyHandle) -> Option<Vec3> {
        self.rigid_body_set.get(body.0).map(|rb| {
            let vel = rb.linvel();
            Vec3::new(vel.x, vel.y, vel.z)
        })
    }

    /// Cast a ray and return the closest hit.
    #[must_use]
    pub fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RaycastHit> {
        let ray = Ray::new(
            point![origin.x, origin.y, origin.z],
            vector![direction.x, direction.y, direction.z],
        );
        self.query_pipeline
            .cast_ray(
                &self.rigid_body_set,
                &self.collider_set,
                &ray,
                max_distance,
                true,
                QueryFilter::default(),
            )
            .map(|(handle, distance)| {
                let point = ray.point_at(distance);
                let entity = Entity::from_bits(self.collider_set[handle].user_data as u64);
                RaycastHit {
                    entity,
                    point: Vec3::new(point.x, point.y, point.z),
                    distance,
                }
            })
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

fn transform_of(store: &EntityStore, entity: Entity) -> Transform {
    store.get::<Transform>(entity).copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::ColliderShape;

    fn box_shape(half: f32) -> ColliderShape {
        ColliderShape::Box {
            half_extents: Vec3::splat(half),
        }
    }

    #[test]
    fn test_dynamic_body_falls_under_gravity() {
        let mut store = EntityStore::new();
        let mut world = PhysicsWorld::new();
        let e = store.create("faller");
        store
            .insert(e, Transform::from_position(Vec3::new(0.0, 10.0, 0.0)))
            .unwrap();
        store.insert(e, DynamicActor::new(box_shape(0.5))).unwrap();

        for _ in 0..30 {
            world.step(1.0 / 60.0, &mut store);
        }

        let y = store.get::<Transform>(e).unwrap().position.y;
        assert!(y < 10.0, "body did not fall: y = {y}");
    }

    #[test]
    fn test_step_assigns_body_handles() {
        let mut store = EntityStore::new();
        let mut world = PhysicsWorld::new();
        let e = store.create("actor");
        store.insert(e, Transform::default()).unwrap();
        store.insert(e, StaticActor::new(box_shape(1.0))).unwrap();

        world.step(1.0 / 60.0, &mut store);

        assert!(store.get::<StaticActor>(e).unwrap().body.is_some());
    }

    #[test]
    fn test_sensor_overlap_bridges_trigger_event() {
        let mut store = EntityStore::new();
        let mut world = PhysicsWorld::new();

        let zone = store.create("zone");
        store
            .insert(zone, Transform::from_position(Vec3::new(0.0, 0.5, 0.0)))
            .unwrap();
        let mut sensor = StaticActor::new(box_shape(2.0));
        sensor.trigger = true;
        store.insert(zone, sensor).unwrap();

        let body = store.create("body");
        store
            .insert(body, Transform::from_position(Vec3::new(0.0, 1.0, 0.0)))
            .unwrap();
        store.insert(body, DynamicActor::new(box_shape(0.25))).unwrap();

        let mut entered = false;
        for _ in 0..10 {
            world.step(1.0 / 60.0, &mut store);
            if world
                .events()
                .trigger_events()
                .iter()
                .any(|t| t.trigger == zone && t.actor == body && t.entered)
            {
                entered = true;
                break;
            }
        }

        assert!(entered, "no trigger event bridged");
    }

    #[test]
    fn test_contact_bridges_collision_event() {
        let mut store = EntityStore::new();
        let mut world = PhysicsWorld::new();

        let floor = store.create("floor");
        store.insert(floor, Transform::default()).unwrap();
        store
            .insert(
                floor,
                StaticActor::new(ColliderShape::Box {
                    half_extents: Vec3::new(10.0, 0.1, 10.0),
                }),
            )
            .unwrap();

        let ball = store.create("ball");
        store
            .insert(ball, Transform::from_position(Vec3::new(0.0, 1.0, 0.0)))
            .unwrap();
        store
            .insert(ball, DynamicActor::new(ColliderShape::Sphere { radius: 0.5 }))
            .unwrap();

        let mut touched = false;
        for _ in 0..120 {
            world.step(1.0 / 60.0, &mut store);
            if world.events().collision_events().iter().any(|c| {
                c.started
                    && ((c.first == floor && c.second == ball)
                        || (c.first == ball && c.second == floor))
            }) {
                touched = true;
                break;
            }
        }

        assert!(touched, "no collision event bridged");
    }

    #[test]
    fn test_raycast_reports_owning_entity() {
        let mut store = EntityStore::new();
        let mut world = PhysicsWorld::new();
        let wall = store.create("wall");
        store
            .insert(wall, Transform::from_position(Vec3::new(0.0, 0.0, -5.0)))
            .unwrap();
        store.insert(wall, StaticActor::new(box_shape(1.0))).unwrap();
        world.step(1.0 / 60.0, &mut store);

        let hit = world.raycast(Vec3::ZERO, Vec3::NEG_Z, 100.0);

        let hit = hit.expect("ray should hit the wall");
        assert_eq!(hit.entity, wall);
        assert!(hit.distance > 0.0 && hit.distance < 100.0);
    }
}
