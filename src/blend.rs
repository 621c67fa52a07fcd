//! Clip splicing: rigidly align one clip's virtual root onto another's
//! ending pose, then cross-fade joint rotations and positions over a
//! transition window.
//!
//! The splice works purely on virtual-root decomposed frames. Aligning the
//! incoming clip is a single rigid transform of its virtual root track;
//! every other joint is expressed relative to the virtual root and follows
//! for free.

use nalgebra::{UnitQuaternion, Vector3};
use tracing::{debug, warn};

use crate::error::{MotionError, Result};
use crate::math;
use crate::motion::{Motion, MotionFrame};
use crate::skeleton::Skeleton;

/// Rigid transform aligning clip `b`'s starting virtual root onto clip
/// `a`'s ending virtual root.
#[derive(Debug, Clone, Copy)]
struct Alignment {
    rotation: UnitQuaternion<f64>,
    translation: Vector3<f64>,
}

impl Alignment {
    fn between(a_end: &MotionFrame, b_start: &MotionFrame, root: usize) -> Self {
        let r_a = a_end.rotations[root];
        let p_a = a_end.position_or_zero(root);
        let r_b = b_start.rotations[root];
        let p_b = b_start.position_or_zero(root);

        let rotation = r_a * r_b.inverse();
        let translation = p_a - rotation * p_b;
        Self {
            rotation,
            translation,
        }
    }

    fn apply(&self, frame: &mut MotionFrame, root: usize) {
        frame.rotations[root] = math::canonicalize(self.rotation * frame.rotations[root]);
        let p = frame.position_or_zero(root);
        frame.positions[root] = Some(self.rotation * p + self.translation);
    }
}

/// Splice clip `b` onto the end of clip `a`.
///
/// The last `transition_frames` frames of `a` are cross-faded against the
/// first frames of `b` (taken from `start_offset` onward, after rigid
/// alignment), with blend parameter `t = (i + 1) / (k + 1)` so neither
/// endpoint is a pure copy of the other clip. The result has
/// `a.len() - k + b.len() - start_offset` frames and carries no features;
/// rebuild them with [`crate::feature::rebuild_features`].
///
/// A transition window larger than either clip allows, or clips built over
/// structurally different skeletons, degrade leniently: `b` is returned
/// unmodified. Joint-by-joint blending and the output's single skeleton
/// reference are only meaningful when both clips share one hierarchy.
///
/// # Errors
///
/// [`MotionError::FrameTimeMismatch`] when the clips disagree on frame
/// time beyond a small tolerance.
pub fn connect(
    a: &Motion,
    b: &Motion,
    transition_frames: usize,
    start_offset: usize,
) -> Result<Motion> {
    if (a.frame_time() - b.frame_time()).abs() > 1e-6 {
        return Err(MotionError::FrameTimeMismatch {
            left: a.frame_time(),
            right: b.frame_time(),
        });
    }

    if !skeletons_compatible(a.skeleton(), b.skeleton()) {
        warn!(
            a_joints = a.skeleton().len(),
            b_joints = b.skeleton().len(),
            "skeleton mismatch, returning incoming clip"
        );
        return Ok(b.clone());
    }

    let root = a.skeleton().virtual_root();
    let start_offset = start_offset.min(b.len());
    let k = transition_frames;

    if k > a.len() || k > b.len().saturating_sub(start_offset) {
        debug!(
            transition = k,
            a_len = a.len(),
            b_len = b.len(),
            start_offset,
            "transition window exceeds clip length, returning incoming clip"
        );
        return Ok(b.clone());
    }

    let a_end = a.frame(a.len() - 1);
    let b_start = b.frame(start_offset);
    let alignment = Alignment::between(a_end, b_start, root);

    let mut frames = Vec::with_capacity(a.len() - k + b.len() - start_offset);

    // Untouched head of a.
    for i in 0..a.len() - k {
        frames.push(a.frame(i).clone());
    }

    // Blend window: a's last k frames against b's first k aligned frames.
    for i in 0..k {
        let t = (i + 1) as f64 / (k + 1) as f64;
        let from = a.frame(a.len() - k + i);
        let mut into = b.frame(start_offset + i).clone();
        alignment.apply(&mut into, root);
        frames.push(blend_frames(from, &into, t));
    }

    // Aligned tail of b.
    for i in start_offset + k..b.len() {
        let mut frame = b.frame(i).clone();
        alignment.apply(&mut frame, root);
        frames.push(frame);
    }

    Ok(Motion::from_frames(
        a.skeleton().clone(),
        frames,
        a.frame_time(),
    ))
}

/// Whether two hierarchies can be blended joint-by-joint: same joint
/// count, same parent links, same channel layout per joint.
fn skeletons_compatible(a: &Skeleton, b: &Skeleton) -> bool {
    a.len() == b.len()
        && a.joints()
            .iter()
            .zip(b.joints())
            .all(|(x, y)| x.parent == y.parent && x.channels == y.channels)
}

/// Interpolate every joint of two frames at blend parameter `t`.
fn blend_frames(from: &MotionFrame, into: &MotionFrame, t: f64) -> MotionFrame {
    let rotations = from
        .rotations
        .iter()
        .zip(&into.rotations)
        .map(|(a, b)| math::slerp(a, b, t))
        .collect();
    let positions = from
        .positions
        .iter()
        .zip(&into.positions)
        .map(|(a, b)| match (a, b) {
            (Some(pa), Some(pb)) => Some(pa.lerp(pb, t)),
            (Some(pa), None) => Some(*pa),
            (None, Some(pb)) => Some(*pb),
            (None, None) => None,
        })
        .collect();
    MotionFrame {
        rotations,
        positions,
    }
}
