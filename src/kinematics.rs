//! Kinematics engine: raw channel decoding, virtual-root decomposition,
//! and hierarchical global transforms.
//!
//! Rotation channels compose in channel-declared order. BVH files declare
//! arbitrary per-joint rotation orders, so that order is authoritative;
//! nothing here assumes XYZ or ZYX.

use nalgebra::{Matrix4, UnitQuaternion, Vector3};

use crate::error::{MotionError, Result};
use crate::math;
use crate::motion::MotionFrame;
use crate::skeleton::Skeleton;

/// Result of factoring a joint pose into planar heading plus residual pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualSplit {
    /// Residual position in the heading frame.
    pub local_position: Vector3<f64>,
    /// Residual rotation in the heading frame.
    pub local_rotation: UnitQuaternion<f64>,
    /// Planar (horizontal) position of the heading frame.
    pub global_position: Vector3<f64>,
    /// Heading rotation about the up axis, sign-canonicalized.
    pub global_rotation: UnitQuaternion<f64>,
}

/// Decode one raw channel row into per-joint rotations and positions.
///
/// Walks the skeleton in preorder, consuming exactly `channels.len()`
/// values per joint. Position channels fill the joint position
/// component-wise; rotation channels (degrees) become per-axis quaternions
/// composed in declared order. The virtual root consumes nothing; its
/// transform is derived later by [`virtual_root_decompose`].
///
/// # Errors
///
/// [`MotionError::FrameDataShortfall`] if the row carries fewer values than
/// the hierarchy's channel sum. `frame_index` is only used for that report.
pub fn decode_frame(skeleton: &Skeleton, row: &[f64], frame_index: usize) -> Result<MotionFrame> {
    let needed = skeleton.channel_sum();
    if row.len() < needed {
        return Err(MotionError::frame_shortfall(frame_index, needed, row.len()));
    }

    let mut frame = MotionFrame::identity(skeleton.len());
    let mut cursor = 0;

    for id in skeleton.preorder() {
        if id == skeleton.virtual_root() {
            continue;
        }
        let joint = skeleton.joint(id);
        if joint.channels.is_empty() {
            continue;
        }

        let values = &row[cursor..cursor + joint.channels.len()];
        cursor += joint.channels.len();

        let mut rotation = UnitQuaternion::identity();
        let mut position = Vector3::zeros();
        let mut has_position = false;

        for (&channel, &value) in joint.channels.iter().zip(values) {
            if channel.is_position() {
                position[channel.component()] = value;
                has_position = true;
            } else {
                rotation *= math::channel_rotation(channel, value);
            }
        }

        frame.rotations[id] = rotation;
        if has_position {
            frame.positions[id] = Some(position);
        }
    }

    Ok(frame)
}

/// Factor a joint pose into its planar heading and residual local pose.
///
/// The heading frame is placed at the horizontal projection `p` of the
/// position, oriented so its +Z axis follows the up-stripped local forward
/// `f`, +Y is world up, and +X their cross product. The returned global
/// transform is `(p, r)`; the local transform is `r⁻¹` applied to
/// `(position − p, rotation)`, so recomposition
/// `position = r·local_position + p`, `rotation = r·local_rotation`
/// round-trips exactly.
///
/// If the horizontal forward collapses (character looking straight up or
/// down), the up-stripped local +Y axis is substituted, then world +Z;
/// degenerate geometry is compensated here, never propagated.
#[must_use]
pub fn virtual_root_decompose(
    position: &Vector3<f64>,
    rotation: &UnitQuaternion<f64>,
    eps: f64,
) -> VirtualSplit {
    let up = math::up();
    let p = math::horizontal(position);

    let mut f = math::horizontal(&(rotation * math::forward()));
    if f.norm() < eps {
        f = math::horizontal(&(rotation * math::up()));
    }
    if f.norm() < eps {
        f = math::forward();
    }

    let r = math::look_rotation(&f, &up);
    let r_inv = r.inverse();

    VirtualSplit {
        local_position: r_inv * (position - p),
        local_rotation: r_inv * rotation,
        global_position: p,
        global_rotation: r,
    }
}

/// Compose the recomposition of a [`VirtualSplit`] back to a world pose.
#[must_use]
pub fn virtual_root_recompose(split: &VirtualSplit) -> (Vector3<f64>, UnitQuaternion<f64>) {
    (
        split.global_rotation * split.local_position + split.global_position,
        split.global_rotation * split.local_rotation,
    )
}

/// Per-joint 4x4 global transforms for one frame, indexed by joint id.
///
/// Each joint's local transform is `translate(frame position, if carried) ×
/// translate(offset) × rotation`, composed onto the parent's global
/// transform in preorder. End sites carry identity rotation. Pure function
/// of `(skeleton, frame)`; this is the surface a renderer draws from.
#[must_use]
pub fn compute_global_transforms(skeleton: &Skeleton, frame: &MotionFrame) -> Vec<Matrix4<f64>> {
    let mut globals = vec![Matrix4::identity(); skeleton.len()];

    for id in skeleton.preorder() {
        let joint = skeleton.joint(id);
        let mut local = Matrix4::new_translation(&joint.offset);
        if let Some(position) = frame.positions[id] {
            local = Matrix4::new_translation(&position) * local;
        }
        local *= frame.rotations[id].to_homogeneous();

        let global = match joint.parent {
            Some(parent) => globals[parent] * local,
            None => local,
        };
        globals[id] = global;
    }

    globals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    const TWO_JOINT: &str = "HIERARCHY
ROOT Hips
{
  OFFSET 1.0 2.0 3.0
  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation
  JOINT Spine
  {
    OFFSET 0.0 5.0 0.0
    CHANNELS 3 Zrotation Xrotation Yrotation
    End Site
    {
      OFFSET 0.0 5.0 0.0
    }
  }
}
MOTION
Frames: 1
Frame Time: 0.0333
0.0 0.0 0.0 0.0 0.0 0.0 30.0 0.0 0.0
";

    #[test]
    fn test_decode_scenario() {
        let doc = bvh::parse_str(TWO_JOINT).unwrap();
        let frame = decode_frame(&doc.skeleton, &doc.raw.rows[0], 0).unwrap();

        // Root at origin, no rotation.
        assert_eq!(frame.positions[1], Some(Vector3::zeros()));
        assert_relative_eq!(frame.rotations[1].angle(), 0.0, epsilon = 1e-12);

        // Child rotated 30 degrees about its first declared axis (Z).
        let expected = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 30f64.to_radians());
        assert_relative_eq!(frame.rotations[2].angle_to(&expected), 0.0, epsilon = 1e-10);

        // End site decodes to identity.
        assert_relative_eq!(frame.rotations[3].angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_decode_short_row() {
        let doc = bvh::parse_str(TWO_JOINT).unwrap();
        let err = decode_frame(&doc.skeleton, &doc.raw.rows[0][..7], 4).unwrap_err();
        match err {
            MotionError::FrameDataShortfall { frame, needed, got } => {
                assert_eq!(frame, 4);
                assert_eq!(needed, 9);
                assert_eq!(got, 7);
            }
            other => panic!("expected shortfall, got {other}"),
        }
    }

    #[test]
    fn test_rotation_composed_in_declared_order() {
        // Spine channels are Z X Y; 90 about Z then 90 about X differs from
        // the reverse order, so a wrong convention fails this.
        let doc = bvh::parse_str(TWO_JOINT).unwrap();
        let row = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 90.0, 90.0, 0.0];
        let frame = decode_frame(&doc.skeleton, &row, 0).unwrap();

        let expected = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2);
        assert_relative_eq!(frame.rotations[2].angle_to(&expected), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_global_transform_scenario() {
        let doc = bvh::parse_str(TWO_JOINT).unwrap();
        let frame = decode_frame(&doc.skeleton, &doc.raw.rows[0], 0).unwrap();
        let globals = compute_global_transforms(&doc.skeleton, &frame);

        // Child global = translate(root offset) * rotate(30 about Z) applied
        // at the child's own offset; end site adds its offset under the
        // child rotation.
        let root_offset = Vector3::new(1.0, 2.0, 3.0);
        let child_pos = globals[2].fixed_view::<3, 1>(0, 3).into_owned();
        assert_relative_eq!((child_pos - (root_offset + Vector3::new(0.0, 5.0, 0.0))).norm(), 0.0, epsilon = 1e-10);

        let rot30 = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 30f64.to_radians());
        let site_pos = globals[3].fixed_view::<3, 1>(0, 3).into_owned();
        let expected = root_offset + Vector3::new(0.0, 5.0, 0.0) + rot30 * Vector3::new(0.0, 5.0, 0.0);
        assert_relative_eq!((site_pos - expected).norm(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_virtual_root_round_trip() {
        let position = Vector3::new(12.0, 17.0, -4.0);
        let rotation = UnitQuaternion::from_euler_angles(0.4, 1.3, -0.2);
        let split = virtual_root_decompose(&position, &rotation, 1e-6);

        let (rec_pos, rec_rot) = virtual_root_recompose(&split);
        assert_relative_eq!((rec_pos - position).norm(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(rec_rot.angle_to(&rotation), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_virtual_root_planar_and_canonical() {
        let position = Vector3::new(3.0, 9.0, -1.0);
        let rotation = UnitQuaternion::from_euler_angles(0.1, 2.9, 0.05);
        let split = virtual_root_decompose(&position, &rotation, 1e-6);

        // Heading position is horizontal; height stays in the local part.
        assert_relative_eq!(split.global_position.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(split.global_position.x, 3.0, epsilon = 1e-12);
        // Canonical sign invariant.
        assert!(split.global_rotation.scalar() >= 0.0);
        // Heading keeps up pointing up.
        let up = split.global_rotation * math::up();
        assert_relative_eq!(up.y, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_degenerate_forward_recovers() {
        // Looking straight down: local +Z maps to -Y, horizontal part ~0.
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2);
        let position = Vector3::new(1.0, 5.0, 1.0);
        let split = virtual_root_decompose(&position, &rotation, 1e-6);

        assert!(split.global_rotation.scalar() >= 0.0);
        let (rec_pos, rec_rot) = virtual_root_recompose(&split);
        assert_relative_eq!((rec_pos - position).norm(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(rec_rot.angle_to(&rotation), 0.0, epsilon = 1e-9);
    }
}
