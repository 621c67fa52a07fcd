//! Frame-synchronous character controller.
//!
//! Each tick advances the playing clip by one frame, updates a small
//! locomotion model from boolean movement intents, and periodically asks the
//! motion index whether a different clip frame matches the character's
//! current pose and predicted trajectory better than simply continuing. A
//! better match (past a hysteresis penalty) triggers a splice through
//! [`crate::blend::connect`].

use nalgebra::{UnitQuaternion, Vector3};
use tracing::{debug, trace};

use crate::blend;
use crate::config::MatchingConfig;
use crate::error::Result;
use crate::feature::{self, FeatureFrame, FeatureLayout};
use crate::index::MotionIndex;
use crate::math;
use crate::motion::Motion;

/// Boolean movement intents, typically mapped from held keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntentState {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

impl IntentState {
    /// Desired planar movement direction in world space, or zero when the
    /// intents cancel out.
    #[must_use]
    pub fn direction(&self) -> Vector3<f64> {
        let mut dir = Vector3::zeros();
        if self.forward {
            dir += math::forward();
        }
        if self.backward {
            dir -= math::forward();
        }
        if self.right {
            dir += Vector3::x();
        }
        if self.left {
            dir -= Vector3::x();
        }
        if dir.norm() < 1e-12 {
            Vector3::zeros()
        } else {
            dir.normalize()
        }
    }

    /// Whether any movement is requested.
    #[must_use]
    pub fn any(&self) -> bool {
        self.forward || self.backward || self.left || self.right
    }
}

/// Planar velocity and facing state driven by intents.
///
/// Velocity approaches the desired velocity exponentially, with separate
/// acceleration and deceleration rates. Facing tracks the velocity
/// direction and yields an instantaneous turn rate used to predict the
/// future trajectory.
#[derive(Debug, Clone)]
pub struct LocomotionModel {
    velocity: Vector3<f64>,
    facing: Vector3<f64>,
    turn_rate: f64,
}

impl Default for LocomotionModel {
    fn default() -> Self {
        Self {
            velocity: Vector3::zeros(),
            facing: math::forward(),
            turn_rate: 0.0,
        }
    }
}

impl LocomotionModel {
    /// Advance the model by `dt` seconds under the given intents.
    pub fn update(&mut self, intents: &IntentState, config: &MatchingConfig, dt: f64) {
        let desired = intents.direction() * config.max_speed;
        let rate = if desired.norm() > self.velocity.norm() {
            config.accel
        } else {
            config.decel
        };
        let alpha = 1.0 - (-rate * dt).exp();
        self.velocity += (desired - self.velocity) * alpha;

        let prev_facing = self.facing;
        if self.velocity.norm() > 1e-6 {
            let target = self.velocity.normalize();
            self.facing = math::smooth_direction(
                &self.facing,
                &target,
                (config.turn_smoothing * dt).min(1.0),
            );
        }
        self.turn_rate = if dt > 0.0 {
            math::yaw_between(&prev_facing, &self.facing) / dt
        } else {
            0.0
        };
    }

    /// Current planar velocity.
    #[must_use]
    pub fn velocity(&self) -> Vector3<f64> {
        self.velocity
    }

    /// Current facing direction.
    #[must_use]
    pub fn facing(&self) -> Vector3<f64> {
        self.facing
    }

    /// Heading rotation for the current facing.
    #[must_use]
    pub fn heading(&self) -> UnitQuaternion<f64> {
        if math::horizontal(&self.facing).norm() < 1e-9 {
            UnitQuaternion::identity()
        } else {
            math::look_rotation(&self.facing, &math::up())
        }
    }

    /// Predict heading-local position and direction at each horizon.
    ///
    /// Integrates forward at `frame_time` per step, rotating the velocity
    /// by the current turn rate each step, so held turns predict a curved
    /// path instead of a straight ray.
    #[must_use]
    pub fn predict(
        &self,
        horizons: &[usize],
        frame_time: f64,
    ) -> (Vec<Vector3<f64>>, Vec<Vector3<f64>>) {
        let heading_inv = self.heading().inverse();
        let step_yaw =
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.turn_rate * frame_time);

        let max = horizons.iter().copied().max().unwrap_or(0);
        let mut pos = Vector3::zeros();
        let mut vel = self.velocity;
        let mut dir = self.facing;
        let mut at_horizon = Vec::with_capacity(horizons.len());
        let mut positions = Vec::with_capacity(horizons.len());
        let mut directions = Vec::with_capacity(horizons.len());

        for step in 1..=max {
            vel = step_yaw * vel;
            dir = step_yaw * dir;
            pos += vel * frame_time;
            at_horizon.push((step, pos, dir));
        }
        for &h in horizons {
            let (p, d) = at_horizon
                .iter()
                .find(|(s, _, _)| *s == h)
                .map_or((Vector3::zeros(), self.facing), |(_, p, d)| (*p, *d));
            positions.push(heading_inv * p);
            directions.push(heading_inv * d);
        }
        (positions, directions)
    }
}

/// A character playing a clip and re-matching against a motion index.
#[derive(Debug, Clone)]
pub struct CharacterController {
    motion: Motion,
    frame_idx: usize,
    frames_since_search: usize,
    locomotion: LocomotionModel,
    config: MatchingConfig,
    layout: FeatureLayout,
}

impl CharacterController {
    /// Start playing a clip from its first frame.
    ///
    /// The clip must carry features; decode plus
    /// [`crate::feature::extract_features`] produces one, as does taking a
    /// clip out of a built index.
    #[must_use]
    pub fn new(motion: Motion, config: MatchingConfig) -> Self {
        let layout = FeatureLayout::from_config(&config);
        Self {
            motion,
            frame_idx: 0,
            frames_since_search: 0,
            locomotion: LocomotionModel::default(),
            config,
            layout,
        }
    }

    /// Advance one frame.
    ///
    /// Updates the locomotion model, steps the playhead (holding the last
    /// frame at clip end), and every `search_interval` ticks queries the
    /// index. A candidate wins only when
    /// `match.distance + match_penalty < continue_distance`; near the clip
    /// end continuing costs infinity, so a search always splices there.
    ///
    /// # Errors
    ///
    /// Query failures, in practice only [`crate::MotionError::EmptyIndex`].
    pub fn tick(&mut self, intents: &IntentState, index: &MotionIndex, dt: f64) -> Result<()> {
        self.locomotion.update(intents, &self.config, dt);

        if self.frame_idx + 1 < self.motion.len() {
            self.frame_idx += 1;
        }
        self.frames_since_search += 1;

        if self.frames_since_search < self.config.search_interval {
            return Ok(());
        }
        self.frames_since_search = 0;

        let query_raw = self.layout.to_vector(&self.live_query());
        let found = index.query(&query_raw)?;
        let continue_distance = self.continue_distance(index, &found.normalized_query);

        trace!(
            candidate = found.distance,
            continuing = continue_distance,
            source = %found.source,
            frame = found.entry.frame,
            "match search"
        );

        if found.distance + self.config.match_penalty < continue_distance {
            self.splice(index, found.entry.clip, found.entry.frame)?;
        }
        Ok(())
    }

    /// Pose features measured from the playing clip, with the future
    /// trajectory replaced by the locomotion model's prediction.
    fn live_query(&self) -> FeatureFrame {
        let measured = &self.motion.features()[self.frame_idx];
        let (future_positions, future_directions) = self
            .locomotion
            .predict(&self.config.future_horizons, self.motion.frame_time());
        FeatureFrame {
            velocities: measured.velocities.clone(),
            site_positions: measured.site_positions.clone(),
            future_positions,
            future_directions,
        }
    }

    /// Cost of just playing the next frame of the current clip.
    fn continue_distance(&self, index: &MotionIndex, normalized_query: &[f64]) -> f64 {
        let next = self.frame_idx + 1;
        if next + self.config.max_horizon() >= self.motion.len() {
            return f64::INFINITY;
        }
        let raw = self.layout.to_vector(&self.motion.features()[next]);
        let normalized = index.normalize(&raw);
        normalized
            .iter()
            .zip(normalized_query)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    fn splice(&mut self, index: &MotionIndex, clip: usize, frame: usize) -> Result<()> {
        let k = self.config.transition_frames;
        let head = self.motion.slice(0, self.frame_idx + 1);
        let incoming = &index.clip(clip).motion;

        let mut spliced = blend::connect(&head, incoming, k, frame)?;
        feature::rebuild_features(&mut spliced, &self.config);

        let resume = head
            .len()
            .saturating_sub(k)
            .min(spliced.len().saturating_sub(1));
        debug!(
            source = %index.clip(clip).source,
            frame,
            resume,
            frames = spliced.len(),
            "spliced to match"
        );
        self.motion = spliced;
        self.frame_idx = resume;
        Ok(())
    }

    /// Global joint transforms of the current frame.
    #[must_use]
    pub fn global_transforms(&self) -> Vec<nalgebra::Matrix4<f64>> {
        self.motion.global_transforms(self.frame_idx)
    }

    /// Clip currently playing (possibly a spliced composite).
    #[must_use]
    pub fn motion(&self) -> &Motion {
        &self.motion
    }

    /// Current playhead frame.
    #[must_use]
    pub fn frame_idx(&self) -> usize {
        self.frame_idx
    }

    /// Locomotion state, for camera or debug overlays.
    #[must_use]
    pub fn locomotion(&self) -> &LocomotionModel {
        &self.locomotion
    }
}
