//! Motion clip data model.
//!
//! A [`Motion`] owns the per-frame quaternion/position state decoded from a
//! BVH motion block, the matching feature frames once extracted, and the
//! sample rate. The skeleton is shared behind an [`Arc`] so many clips (and
//! playing characters) reference one read-only hierarchy.

use std::sync::Arc;

use nalgebra::{Matrix4, UnitQuaternion, Vector3};

use crate::bvh::BvhDocument;
use crate::config::MatchingConfig;
use crate::error::Result;
use crate::feature::FeatureFrame;
use crate::kinematics;
use crate::skeleton::Skeleton;

/// Per-frame local pose, indexed by [`crate::skeleton::JointId`].
///
/// Joint ids key the buffers rather than names; BVH does not guarantee
/// name uniqueness, ids are stable per skeleton.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionFrame {
    /// Local rotation per joint.
    pub rotations: Vec<UnitQuaternion<f64>>,
    /// Local position per joint; `None` for joints without position
    /// channels.
    pub positions: Vec<Option<Vector3<f64>>>,
}

impl MotionFrame {
    /// All-identity frame for a skeleton of `joint_count` joints.
    #[must_use]
    pub fn identity(joint_count: usize) -> Self {
        Self {
            rotations: vec![UnitQuaternion::identity(); joint_count],
            positions: vec![None; joint_count],
        }
    }

    /// Position of a joint, zero if it carries none.
    #[must_use]
    pub fn position_or_zero(&self, id: usize) -> Vector3<f64> {
        self.positions[id].unwrap_or_else(Vector3::zeros)
    }
}

/// An ordered sequence of kinematic frames plus derived feature frames.
#[derive(Debug, Clone)]
pub struct Motion {
    skeleton: Arc<Skeleton>,
    frames: Vec<MotionFrame>,
    features: Vec<FeatureFrame>,
    frame_time: f64,
}

impl Motion {
    /// Decode a parsed BVH document into kinematic frames.
    ///
    /// Runs channel validation under the configured policy, then decodes
    /// every raw row. Feature frames are not built here; see
    /// [`crate::feature::build_feature_sequence`].
    ///
    /// # Errors
    ///
    /// Channel validation failures and row shortfalls abort the clip.
    pub fn decode(document: &BvhDocument, config: &MatchingConfig) -> Result<Self> {
        document
            .skeleton
            .validate_channels(config.channel_policy)?;

        let skeleton = Arc::new(document.skeleton.clone());
        let mut frames = Vec::with_capacity(document.raw.rows.len());
        for (idx, row) in document.raw.rows.iter().enumerate() {
            frames.push(kinematics::decode_frame(&skeleton, row, idx)?);
        }

        Ok(Self {
            skeleton,
            frames,
            features: Vec::new(),
            frame_time: document.raw.frame_time,
        })
    }

    /// Build a motion from already-decoded frames (splicing use).
    #[must_use]
    pub fn from_frames(
        skeleton: Arc<Skeleton>,
        frames: Vec<MotionFrame>,
        frame_time: f64,
    ) -> Self {
        Self {
            skeleton,
            frames,
            features: Vec::new(),
            frame_time,
        }
    }

    /// Factor every frame's hip pose into virtual root + residual pose.
    ///
    /// After this pass the virtual root (id 0) carries the planar heading
    /// transform and the hip carries only its residual local pose; the
    /// recomposition of the two reproduces the original hip world pose.
    /// Idempotent input is not expected; call exactly once per decoded clip.
    pub fn apply_virtual(&mut self, config: &MatchingConfig) {
        let Some(hip) = self.skeleton.hip() else {
            return;
        };
        let vr = self.skeleton.virtual_root();

        for frame in &mut self.frames {
            let position = frame.position_or_zero(hip);
            let rotation = frame.rotations[hip];
            let split =
                kinematics::virtual_root_decompose(&position, &rotation, config.degenerate_eps);

            frame.positions[hip] = Some(split.local_position);
            frame.rotations[hip] = split.local_rotation;
            frame.positions[vr] = Some(split.global_position);
            frame.rotations[vr] = split.global_rotation;
        }
    }

    /// Virtual-root pose of a frame.
    #[must_use]
    pub fn virtual_pose(&self, frame: usize) -> (Vector3<f64>, UnitQuaternion<f64>) {
        let vr = self.skeleton.virtual_root();
        (
            self.frames[frame].position_or_zero(vr),
            self.frames[frame].rotations[vr],
        )
    }

    /// Copy a frame range into a new motion sharing no frame state.
    ///
    /// Feature frames are copied along when present for the whole range.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.frames.len());
        let start = start.min(end);
        let features = if self.features.len() == self.frames.len() {
            self.features[start..end].to_vec()
        } else {
            Vec::new()
        };
        Self {
            skeleton: Arc::clone(&self.skeleton),
            frames: self.frames[start..end].to_vec(),
            features,
            frame_time: self.frame_time,
        }
    }

    /// Global 4x4 transforms of one frame, for rendering.
    #[must_use]
    pub fn global_transforms(&self, frame: usize) -> Vec<Matrix4<f64>> {
        kinematics::compute_global_transforms(&self.skeleton, &self.frames[frame])
    }

    /// Shared skeleton.
    #[must_use]
    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    /// Kinematic frames.
    #[must_use]
    pub fn frames(&self) -> &[MotionFrame] {
        &self.frames
    }

    /// One kinematic frame.
    #[must_use]
    pub fn frame(&self, idx: usize) -> &MotionFrame {
        &self.frames[idx]
    }

    /// Derived feature frames (empty until extraction).
    #[must_use]
    pub fn features(&self) -> &[FeatureFrame] {
        &self.features
    }

    pub(crate) fn set_features(&mut self, features: Vec<FeatureFrame>) {
        self.features = features;
    }

    pub(crate) fn features_mut(&mut self) -> &mut Vec<FeatureFrame> {
        &mut self.features
    }

    /// Seconds per frame.
    #[must_use]
    pub const fn frame_time(&self) -> f64 {
        self.frame_time
    }

    /// Frame count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the clip has no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
