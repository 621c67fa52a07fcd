//! Per-frame motion feature extraction.
//!
//! A [`FeatureFrame`] summarizes one kinematic frame for similarity search:
//! heading-relative linear velocities and virtual-root-local positions of
//! the tracked sites, plus a short-horizon future trajectory (relative
//! position and forward direction per lookahead horizon). Expressing
//! everything relative to the heading frame makes the features invariant to
//! which way the character happens to face in world space, which is what
//! lets clips recorded with different starting orientations match.
//!
//! Extraction is strictly sequential: frame `i`'s velocity differentiates
//! against frame `i-1`, and frame 0 is a defined all-zero baseline.

use nalgebra::{UnitQuaternion, Vector3};

use crate::config::{FeatureWeights, FutureBoundaryPolicy, MatchingConfig};
use crate::math;
use crate::motion::Motion;
use crate::skeleton::JointId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Derived per-frame feature data.
///
/// Site slots are ordered hip first, then the tracked end-effector chains
/// in skeleton order; future slots follow the configured horizon order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureFrame {
    /// Linear velocity per tracked site, in the previous frame's heading
    /// frame, units/second.
    pub velocities: Vec<Vector3<f64>>,
    /// Position per tracked site, virtual-root-local.
    pub site_positions: Vec<Vector3<f64>>,
    /// Future relative positions, one per horizon.
    pub future_positions: Vec<Vector3<f64>>,
    /// Future relative forward directions, one per horizon.
    pub future_directions: Vec<Vector3<f64>>,
}

impl FeatureFrame {
    /// All-zero feature frame (the frame-0 baseline).
    #[must_use]
    pub fn zeros(site_count: usize, horizon_count: usize) -> Self {
        Self {
            velocities: vec![Vector3::zeros(); site_count],
            site_positions: vec![Vector3::zeros(); site_count],
            future_positions: vec![Vector3::zeros(); horizon_count],
            future_directions: vec![Vector3::zeros(); horizon_count],
        }
    }
}

/// Fixed flattening order and dimension bookkeeping for feature vectors.
///
/// The layout is a function of the tracked-site count and horizon count
/// alone, so every clip indexed under one configuration produces vectors of
/// identical dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureLayout {
    /// Tracked site count (hip included).
    pub site_count: usize,
    /// Lookahead horizon count.
    pub horizon_count: usize,
}

impl FeatureLayout {
    /// Layout for a configuration (hip chain plus configured sites).
    #[must_use]
    pub fn from_config(config: &MatchingConfig) -> Self {
        Self {
            site_count: config.tracked_sites.len() + 1,
            horizon_count: config.future_horizons.len(),
        }
    }

    /// Total flattened dimensionality.
    #[must_use]
    pub const fn dim(&self) -> usize {
        6 * self.site_count + 6 * self.horizon_count
    }

    /// Flatten a feature frame: velocities, site positions, future
    /// positions, future directions, each component-wise.
    #[must_use]
    pub fn to_vector(&self, frame: &FeatureFrame) -> Vec<f64> {
        let mut vec = Vec::with_capacity(self.dim());
        for v in &frame.velocities {
            vec.extend([v.x, v.y, v.z]);
        }
        for p in &frame.site_positions {
            vec.extend([p.x, p.y, p.z]);
        }
        for p in &frame.future_positions {
            vec.extend([p.x, p.y, p.z]);
        }
        for d in &frame.future_directions {
            vec.extend([d.x, d.y, d.z]);
        }
        vec
    }

    /// Per-dimension weights: hip velocity and future directions
    /// up-weighted, absolute hip position hard-zeroed.
    #[must_use]
    pub fn weight_vector(&self, weights: &FeatureWeights) -> Vec<f64> {
        let mut w = Vec::with_capacity(self.dim());
        for site in 0..self.site_count {
            let value = if site == 0 {
                weights.hip_velocity
            } else {
                weights.site_velocity
            };
            w.extend([value; 3]);
        }
        for site in 0..self.site_count {
            // Hip position is not matchable across clips.
            let value = if site == 0 { 0.0 } else { weights.site_position };
            w.extend([value; 3]);
        }
        for _ in 0..self.horizon_count {
            w.extend([weights.future_position; 3]);
        }
        for _ in 0..self.horizon_count {
            w.extend([weights.future_direction; 3]);
        }
        w
    }
}

/// Virtual-root-local position of each tracked chain for one frame.
///
/// The hip chain is the hip's residual local position plus its offset; the
/// remaining chains compose local offsets and rotations outward from the
/// hip, so the result lives in the heading frame by construction.
fn local_site_positions(motion: &Motion, chains: &[Vec<JointId>], frame: usize) -> Vec<Vector3<f64>> {
    let skeleton = motion.skeleton();
    let data = motion.frame(frame);

    chains
        .iter()
        .enumerate()
        .map(|(chain_idx, chain)| {
            if chain_idx == 0 {
                let hip = chain[0];
                data.position_or_zero(hip) + skeleton.joint(hip).offset
            } else {
                let mut pos = Vector3::zeros();
                let mut rot = UnitQuaternion::identity();
                for &id in chain {
                    pos += rot * skeleton.joint(id).offset;
                    rot *= data.rotations[id];
                }
                pos
            }
        })
        .collect()
}

/// Build velocity and site-position features for every frame of a motion.
///
/// Requires [`Motion::apply_virtual`] to have run; velocities are world
/// deltas rotated into the previous frame's heading frame and scaled by the
/// inverse frame time. Frame 0 is all zeros. Replaces any existing feature
/// sequence; future slots are left zeroed for
/// [`build_future_trajectory`].
pub fn build_feature_sequence(motion: &mut Motion, config: &MatchingConfig) {
    let chains = motion.skeleton().site_chains(&config.tracked_sites);
    let layout = FeatureLayout::from_config(config);
    let frame_time = motion.frame_time();
    let n = motion.len();

    let mut features = Vec::with_capacity(n);
    let mut prev_world: Vec<Vector3<f64>> = Vec::new();

    for idx in 0..n {
        let locals = local_site_positions(motion, &chains, idx);
        let (vr_pos, vr_rot) = motion.virtual_pose(idx);
        let world: Vec<Vector3<f64>> = locals.iter().map(|p| vr_rot * p + vr_pos).collect();

        let mut frame = FeatureFrame::zeros(layout.site_count, layout.horizon_count);
        if idx > 0 {
            let (_, prev_rot) = motion.virtual_pose(idx - 1);
            let prev_heading_inv = prev_rot.inverse();
            for site in 0..locals.len().min(layout.site_count) {
                frame.site_positions[site] = locals[site];
                frame.velocities[site] =
                    prev_heading_inv * (world[site] - prev_world[site]) / frame_time;
            }
        }

        features.push(frame);
        prev_world = world;
    }

    motion.set_features(features);
}

/// Fill in future-trajectory slots for every frame of a motion.
///
/// For a frame with a full lookahead, each horizon's future virtual-root
/// pose is inverse-transformed into the current frame's heading frame and
/// the forward direction sampled as the relative rotation applied to +Z.
/// Frames too close to the clip end follow the configured boundary policy;
/// a clip shorter than the longest horizon always zero-fills.
pub fn build_future_trajectory(motion: &mut Motion, config: &MatchingConfig) {
    let n = motion.len();
    let max_horizon = config.max_horizon();
    let horizons = &config.future_horizons;

    let mut predictions: Vec<(Vec<Vector3<f64>>, Vec<Vector3<f64>>)> = Vec::with_capacity(n);

    for idx in 0..n {
        if idx + max_horizon < n {
            let (cur_pos, cur_rot) = motion.virtual_pose(idx);
            let heading_inv = cur_rot.inverse();

            let mut positions = Vec::with_capacity(horizons.len());
            let mut directions = Vec::with_capacity(horizons.len());
            for &k in horizons {
                let (future_pos, future_rot) = motion.virtual_pose(idx + k);
                let rel_rot = heading_inv * future_rot;
                positions.push(heading_inv * (future_pos - cur_pos));
                directions.push(rel_rot * math::forward());
            }
            predictions.push((positions, directions));
        } else {
            let boundary = match config.future_boundary {
                FutureBoundaryPolicy::FreezeLastValid if n > max_horizon => {
                    // Last frame that had a full lookahead.
                    predictions[n - max_horizon - 1].clone()
                }
                _ => (
                    vec![Vector3::zeros(); horizons.len()],
                    vec![Vector3::zeros(); horizons.len()],
                ),
            };
            predictions.push(boundary);
        }
    }

    for (frame, (positions, directions)) in motion.features_mut().iter_mut().zip(predictions) {
        frame.future_positions = positions;
        frame.future_directions = directions;
    }
}

/// Run the full extraction pipeline on a decoded clip.
///
/// Virtual-root decomposition, then velocity/site features, then future
/// trajectory. This is the order the index builder uses.
pub fn extract_features(motion: &mut Motion, config: &MatchingConfig) {
    motion.apply_virtual(config);
    build_feature_sequence(motion, config);
    build_future_trajectory(motion, config);
}

/// Rebuild features for a motion whose frames already carry virtual-root
/// data (the output of a splice).
pub fn rebuild_features(motion: &mut Motion, config: &MatchingConfig) {
    build_feature_sequence(motion, config);
    build_future_trajectory(motion, config);
}
