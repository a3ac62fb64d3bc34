//! Gravity force kernel
//!
//! Pure functions shared by every execution strategy. The software compute
//! backend also calls [`pair_force`] so that its emulation of the generated
//! device kernel evaluates exactly the same force law.
//!
//! For a target body `t` and another body `j` the contribution is
//!
//! **F = G * m_t * m_j / d * unit(p_j - p_t)**
//!
//! where `d` is the separation distance. Pairs whose separation is exactly
//! zero (self comparison or coincident bodies) contribute nothing.

use cgmath::{InnerSpace, Vector3, Zero};

use super::body::BodySnapshot;

/// Gravitational constant used by the harness (and the generated kernel)
pub const GRAVITATIONAL_CONSTANT: f32 = 6.675e-11;

/// Contribution of `other` to the force on `target`
///
/// Returns `None` when the two positions coincide.
pub fn pair_force(
    target_position: Vector3<f32>,
    target_mass: f32,
    other_position: Vector3<f32>,
    other_mass: f32,
) -> Option<Vector3<f32>> {
    let separation = other_position - target_position;
    if separation == Vector3::zero() {
        return None;
    }

    let distance = separation.magnitude();
    let size = GRAVITATIONAL_CONSTANT * (target_mass * other_mass) / distance;
    Some(separation / distance * size)
}

/// Net force on body `index` from every body in the snapshot
///
/// Sums in ascending `j`. O(N) per call, O(N²) for a full step.
pub fn force_on(index: usize, snapshot: &BodySnapshot) -> Vector3<f32> {
    let target_position = snapshot.positions()[index];
    let target_mass = snapshot.masses()[index];
    force_from_range(target_position, target_mass, snapshot, 0..snapshot.len())
}

/// Force on a target from the bodies in `sources` only
pub fn force_from_range(
    target_position: Vector3<f32>,
    target_mass: f32,
    snapshot: &BodySnapshot,
    sources: std::ops::Range<usize>,
) -> Vector3<f32> {
    let positions = &snapshot.positions()[sources.clone()];
    let masses = &snapshot.masses()[sources];

    positions
        .iter()
        .zip(masses)
        .filter_map(|(&position, &mass)| pair_force(target_position, target_mass, position, mass))
        .fold(Vector3::zero(), |total, force| total + force)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: Vector3<f32>, b: Vector3<f32>, tolerance: f32) -> bool {
        let scale = a.magnitude().max(b.magnitude()).max(f32::MIN_POSITIVE);
        (a - b).magnitude() / scale <= tolerance
    }

    #[test]
    fn test_coincident_bodies_contribute_nothing() {
        let p = Vector3::new(1.0, 2.0, 3.0);
        assert!(pair_force(p, 5.0, p, 7.0).is_none());
    }

    #[test]
    fn test_pair_force_magnitude_and_direction() {
        let force = pair_force(Vector3::zero(), 2.0, Vector3::new(4.0, 0.0, 0.0), 3.0).unwrap();
        let expected = GRAVITATIONAL_CONSTANT * 6.0 / 4.0;
        assert!((force.x - expected).abs() <= expected * 1e-6);
        assert_eq!(force.y, 0.0);
        assert_eq!(force.z, 0.0);
    }

    #[test]
    fn test_pair_force_is_antisymmetric() {
        let cases = [
            (Vector3::new(0.0, 0.0, 0.0), 1.0, Vector3::new(1.0, 1.0, 1.0), 10.0),
            (Vector3::new(-50.0, 3.0, 99.0), 9000.0, Vector3::new(12.0, -7.0, 0.5), 1.0),
            (Vector3::new(0.1, 0.2, 0.3), 42.0, Vector3::new(0.1, 0.2, 0.31), 42.0),
        ];

        for (pa, ma, pb, mb) in cases {
            let on_a = pair_force(pa, ma, pb, mb).unwrap();
            let on_b = pair_force(pb, mb, pa, ma).unwrap();
            assert!(approx_eq(on_a, -on_b, 1e-5), "{:?} vs {:?}", on_a, on_b);
        }
    }

    #[test]
    fn test_force_on_skips_self() {
        let snapshot = BodySnapshot::from_parts(
            vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(2.0, 0.0, 0.0)],
            vec![1.0, 1.0],
        )
        .unwrap();

        let force = force_on(0, &snapshot);
        let expected = GRAVITATIONAL_CONSTANT / 2.0;
        assert!(force.x > 0.0);
        assert!((force.x - expected).abs() <= expected * 1e-6);
    }

    #[test]
    fn test_range_sums_compose() {
        let snapshot = BodySnapshot::from_parts(
            (0..10)
                .map(|i| Vector3::new(i as f32, (i * i) as f32 * 0.1, -(i as f32)))
                .collect(),
            (0..10).map(|i| 1.0 + i as f32).collect(),
        )
        .unwrap();

        let target = snapshot.positions()[3];
        let mass = snapshot.masses()[3];
        let split = force_from_range(target, mass, &snapshot, 0..4)
            + force_from_range(target, mass, &snapshot, 4..10);
        assert!(approx_eq(split, force_on(3, &snapshot), 1e-5));
    }
}
