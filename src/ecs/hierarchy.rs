//! Transform hierarchy
//!
//! World transforms are a pure function of an entity's local
//! [`Transform`] and its `Parent` chain, recomputed on demand. Nothing
//! is cached across frames; mutating a component is immediately visible
//! to the next computation.

use glam::{Mat4, Quat, Vec3};
use rustc_hash::FxHashSet;

use super::components::{Parent, Transform};
use super::{Entity, EntityStore};

/// Errors from walking a parent chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    /// The parent chain revisited `Entity`; the hierarchy is cyclic.
    Cycle(Entity),
    /// A `Parent` reference points at an entity that no longer resolves.
    MissingParent {
        /// Entity holding the dangling reference
        child: Entity,
        /// The reference that failed to resolve
        parent: Entity,
    },
}

impl std::fmt::Display for HierarchyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cycle(e) => write!(f, "cyclic hierarchy through entity {e}"),
            Self::MissingParent { child, parent } => {
                write!(f, "entity {child} references missing parent {parent}")
            }
        }
    }
}

impl std::error::Error for HierarchyError {}

/// Compute the world matrix of `entity`.
///
/// Walks upward through `Parent` references, accumulating
/// `translate * rotate * scale` per level, and terminates at the first
/// entity without a parent. An entity without a [`Transform`]
/// contributes identity. A visited set guards against cycles, so the
/// walk is bounded by the number of live entities.
///
/// # Errors
///
/// [`HierarchyError::Cycle`] if the chain revisits an entity,
/// [`HierarchyError::MissingParent`] if a parent reference dangles.
pub fn world_matrix(store: &EntityStore, entity: Entity) -> Result<Mat4, HierarchyError> {
    let mut matrix = local_matrix(store, entity);
    let mut visited = FxHashSet::default();
    visited.insert(entity);

    let mut current = entity;
    while let Some(&Parent(parent)) = store.get::<Parent>(current) {
        if !store.contains(parent) {
            return Err(HierarchyError::MissingParent {
                child: current,
                parent,
            });
        }
        if !visited.insert(parent) {
            return Err(HierarchyError::Cycle(parent));
        }
        matrix = local_matrix(store, parent) * matrix;
        current = parent;
    }

    Ok(matrix)
}

/// World position and rotation of `entity`.
///
/// Decomposes the world matrix; with a degenerate basis (for example a
/// zero scale somewhere in the chain) the rotation falls back to
/// identity instead of producing NaNs.
///
/// # Errors
///
/// Same conditions as [`world_matrix`].
pub fn world_pose(store: &EntityStore, entity: Entity) -> Result<(Vec3, Quat), HierarchyError> {
    let matrix = world_matrix(store, entity)?;
    let position = matrix.w_axis.truncate();
    let rotation = if matrix.determinant().abs() > f32::EPSILON {
        let (_, rotation, _) = matrix.to_scale_rotation_translation();
        rotation
    } else {
        Quat::IDENTITY
    };
    Ok((position, rotation))
}

fn local_matrix(store: &EntityStore, entity: Entity) -> Mat4 {
    store
        .get::<Transform>(entity)
        .map_or(Mat4::IDENTITY, Transform::matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn assert_vec3_near(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-4, "{a} != {b}");
    }

    #[test]
    fn test_identity_rotation_unit_scale_is_pure_translation() {
        let mut store = EntityStore::new();
        let e = store.create("e");
        store
            .insert(e, Transform::from_position(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();

        let matrix = world_matrix(&store, e).unwrap();

        assert_eq!(matrix, Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_missing_transform_is_identity() {
        let mut store = EntityStore::new();
        let e = store.create("bare");

        assert_eq!(world_matrix(&store, e).unwrap(), Mat4::IDENTITY);
    }

    #[test]
    fn test_parent_chain_accumulates() {
        let mut store = EntityStore::new();
        let root = store.create("root");
        let mid = store.create("mid");
        let leaf = store.create("leaf");
        store
            .insert(root, Transform::from_position(Vec3::new(10.0, 0.0, 0.0)))
            .unwrap();
        store
            .insert(mid, Transform::from_position(Vec3::new(0.0, 5.0, 0.0)))
            .unwrap();
        store
            .insert(leaf, Transform::from_position(Vec3::new(0.0, 0.0, 2.0)))
            .unwrap();
        store.insert(mid, Parent(root)).unwrap();
        store.insert(leaf, Parent(mid)).unwrap();

        let matrix = world_matrix(&store, leaf).unwrap();

        assert_vec3_near(matrix.w_axis.truncate(), Vec3::new(10.0, 5.0, 2.0));
    }

    #[test]
    fn test_parent_rotation_applies_to_child_offset() {
        let mut store = EntityStore::new();
        let root = store.create("root");
        let child = store.create("child");
        let quarter = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        store
            .insert(root, Transform::from_position_rotation(Vec3::ZERO, quarter))
            .unwrap();
        store
            .insert(child, Transform::from_position(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        store.insert(child, Parent(root)).unwrap();

        let matrix = world_matrix(&store, child).unwrap();

        // +X rotated a quarter turn around Y lands on -Z.
        assert_vec3_near(matrix.w_axis.truncate(), Vec3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn test_cycle_reports_instead_of_hanging() {
        let mut store = EntityStore::new();
        let a = store.create("a");
        let b = store.create("b");
        store.insert(a, Parent(b)).unwrap();
        store.insert(b, Parent(a)).unwrap();

        assert!(matches!(
            world_matrix(&store, a),
            Err(HierarchyError::Cycle(_))
        ));
    }

    #[test]
    fn test_self_parent_is_a_cycle() {
        let mut store = EntityStore::new();
        let a = store.create("a");
        store.insert(a, Parent(a)).unwrap();

        assert_eq!(world_matrix(&store, a), Err(HierarchyError::Cycle(a)));
    }

    #[test]
    fn test_destroyed_parent_reports_missing() {
        let mut store = EntityStore::new();
        let parent = store.create("parent");
        let child = store.create("child");
        store.insert(child, Parent(parent)).unwrap();
        store.destroy(parent);

        assert_eq!(
            world_matrix(&store, child),
            Err(HierarchyError::MissingParent { child, parent })
        );
    }

    #[test]
    fn test_zero_scale_is_tolerated() {
        let mut store = EntityStore::new();
        let e = store.create("flat");
        store
            .insert(
                e,
                Transform {
                    position: Vec3::new(0.0, 1.0, 0.0),
                    rotation: Quat::IDENTITY,
                    scale: Vec3::ZERO,
                },
            )
            .unwrap();

        let (position, rotation) = world_pose(&store, e).unwrap();

        assert_vec3_near(position, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(rotation, Quat::IDENTITY);
    }
}
