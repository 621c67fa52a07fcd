//! Geometric primitives shared by the kinematics and blending code.
//!
//! Quaternions here follow one crate-wide convention: local forward is the
//! rotated +Z axis, world up is +Y, and every heading quaternion is
//! canonicalized to a non-negative real part so interpolation between
//! consecutive frames never takes the long way around.

use nalgebra::{Matrix3, Rotation3, Unit, UnitQuaternion, Vector3};

use crate::skeleton::Channel;

/// World up axis.
#[must_use]
pub fn up() -> Vector3<f64> {
    Vector3::y()
}

/// Local forward axis before any rotation.
#[must_use]
pub fn forward() -> Vector3<f64> {
    Vector3::z()
}

/// Projection of `v` onto the direction of `onto`.
#[must_use]
pub fn project_onto(v: &Vector3<f64>, onto: &Vector3<f64>) -> Vector3<f64> {
    let n = onto.normalize();
    v.dot(&n) * n
}

/// Strip the vertical (up-axis) component of `v`.
#[must_use]
pub fn horizontal(v: &Vector3<f64>) -> Vector3<f64> {
    v - project_onto(v, &up())
}

/// Force the quaternion's real part non-negative.
///
/// `q` and `-q` encode the same rotation; fixing the sign makes slerp
/// between consecutive frames take the short arc.
#[must_use]
pub fn canonicalize(q: UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    if q.scalar() < 0.0 {
        UnitQuaternion::new_unchecked(-q.into_inner())
    } else {
        q
    }
}

/// Rotation whose local +Z axis points along `forward_dir` with `up_dir`
/// as the vertical reference, sign-canonicalized.
///
/// Both inputs must be non-degenerate and non-collinear; callers handle
/// fallback axes before getting here.
#[must_use]
pub fn look_rotation(forward_dir: &Vector3<f64>, up_dir: &Vector3<f64>) -> UnitQuaternion<f64> {
    let f = forward_dir.normalize();
    let u = up_dir.normalize();
    let right = u.cross(&f).normalize();
    let up_corrected = f.cross(&right);
    let basis = Matrix3::from_columns(&[right, up_corrected, f]);
    let rotation = Rotation3::from_matrix_unchecked(basis);
    canonicalize(UnitQuaternion::from_rotation_matrix(&rotation))
}

/// Per-axis rotation quaternion for one channel value in degrees.
///
/// Position channels yield the identity; decode treats them separately.
#[must_use]
pub fn channel_rotation(channel: Channel, degrees: f64) -> UnitQuaternion<f64> {
    let angle = degrees.to_radians();
    match channel {
        Channel::Xrotation => UnitQuaternion::from_axis_angle(&Vector3::x_axis(), angle),
        Channel::Yrotation => UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angle),
        Channel::Zrotation => UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle),
        _ => UnitQuaternion::identity(),
    }
}

/// Shortest-path spherical interpolation, safe for antipodal inputs.
///
/// nalgebra's `slerp` panics when the rotations are 180 degrees apart;
/// blending two arbitrary clips can hit that, so fall back to nudging one
/// endpoint off the singularity.
#[must_use]
pub fn slerp(a: &UnitQuaternion<f64>, b: &UnitQuaternion<f64>, t: f64) -> UnitQuaternion<f64> {
    a.try_slerp(b, t, 1e-9).unwrap_or_else(|| {
        let nudged = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 1e-6) * b;
        a.try_slerp(&nudged, t, 1e-9)
            .unwrap_or_else(|| if t < 0.5 { *a } else { *b })
    })
}

/// Smooth a unit direction toward a target by spherically rotating it.
///
/// `factor` is clamped to `[0, 1]`; 0 keeps `current`, 1 snaps to `target`.
#[must_use]
pub fn smooth_direction(
    current: &Vector3<f64>,
    target: &Vector3<f64>,
    factor: f64,
) -> Vector3<f64> {
    let factor = factor.clamp(0.0, 1.0);
    let (Some(cur), Some(tgt)) = (Unit::try_new(*current, 1e-12), Unit::try_new(*target, 1e-12))
    else {
        return *current;
    };
    let full = UnitQuaternion::rotation_between_axis(&cur, &tgt)
        .unwrap_or_else(UnitQuaternion::identity);
    let partial = UnitQuaternion::identity().nlerp(&full, factor);
    partial * *current
}

/// Signed angle from `a` to `b` about the up axis, in radians.
#[must_use]
pub fn yaw_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let a = horizontal(a);
    let b = horizontal(b);
    if a.norm() < 1e-12 || b.norm() < 1e-12 {
        return 0.0;
    }
    let cross = a.cross(&b).dot(&up());
    let dot = a.dot(&b);
    cross.atan2(dot)
}
