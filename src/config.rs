//! Configuration for feature extraction, indexing, and runtime matching.
//!
//! This module provides the [`MatchingConfig`] struct which centralizes all
//! tunable parameters of the pipeline, along with presets for common
//! responsiveness/quality trade-offs.
//!
//! # Example
//!
//! ```
//! use motion_matching::MatchingConfig;
//!
//! // Use default configuration
//! let config = MatchingConfig::default();
//!
//! // Or a preset
//! let responsive = MatchingConfig::responsive();
//! ```

use crate::error::{MotionError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Channel-layout validation policy.
///
/// BVH files in the wild disagree on whether non-root joints may carry
/// position channels; this makes the check configurable instead of
/// silently divergent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChannelPolicy {
    /// Root must have exactly 6 channels (3 position then 3 rotation);
    /// every other joint must have 0 or 3 rotation channels.
    #[default]
    Strict,
    /// Only rotation channels are checked on non-root joints; extra
    /// position channels are tolerated.
    Permissive,
    /// No validation.
    Disabled,
}

/// Boundary policy for future-trajectory samples near the end of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FutureBoundaryPolicy {
    /// Frames past the last full-lookahead frame reuse that frame's
    /// prediction. Clips shorter than the longest horizon zero-fill
    /// regardless (there is no valid frame to freeze).
    #[default]
    FreezeLastValid,
    /// Frames without a full lookahead get all-zero predictions.
    ZeroFill,
}

/// Per-group weights applied to normalized feature dimensions.
///
/// The hip position weight is fixed at zero: absolute hip position is not
/// matchable across clips recorded in different parts of the capture volume;
/// only heading-relative quantities are.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureWeights {
    /// Weight for hip velocity dimensions.
    pub hip_velocity: f64,
    /// Weight for end-effector velocity dimensions.
    pub site_velocity: f64,
    /// Weight for end-effector position dimensions.
    pub site_position: f64,
    /// Weight for future relative-position dimensions.
    pub future_position: f64,
    /// Weight for future forward-direction dimensions.
    pub future_direction: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            hip_velocity: 1.5,
            site_velocity: 1.0,
            site_position: 1.0,
            future_position: 1.0,
            future_direction: 1.25,
        }
    }
}

/// Configuration for the motion matching pipeline.
///
/// Horizons and window sizes are expressed in frames; a horizon of 20 at the
/// common 60 Hz capture rate looks a third of a second ahead.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MatchingConfig {
    /// Future-trajectory lookahead offsets, in frames, ascending.
    pub future_horizons: Vec<usize>,

    /// End-effector joint names whose root-to-leaf chains are tracked.
    /// The hip chain is always tracked in addition.
    pub tracked_sites: Vec<String>,

    /// Blend window length for clip splicing, in frames.
    pub transition_frames: usize,

    /// Ticks between index queries in the runtime controller.
    pub search_interval: usize,

    /// Distance penalty added to a candidate match before comparing it
    /// against continuing the current clip. Larger values mean fewer,
    /// more committed splices.
    pub match_penalty: f64,

    /// Floor applied to per-dimension standard deviation during
    /// normalization, avoiding division by zero on constant dimensions.
    pub std_epsilon: f64,

    /// Threshold below which a horizontal forward vector is considered
    /// degenerate (character looking straight up or down).
    pub degenerate_eps: f64,

    /// Channel-layout validation policy.
    pub channel_policy: ChannelPolicy,

    /// Future-trajectory boundary policy.
    pub future_boundary: FutureBoundaryPolicy,

    /// Feature-space component weights.
    pub weights: FeatureWeights,

    /// Maximum planar speed the locomotion model approaches, units/second.
    pub max_speed: f64,

    /// Exponential acceleration rate toward the desired velocity, 1/second.
    pub accel: f64,

    /// Exponential deceleration rate when intent is released, 1/second.
    pub decel: f64,

    /// Slerp factor per second for facing-direction smoothing.
    pub turn_smoothing: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            future_horizons: vec![20, 40, 60],
            tracked_sites: vec!["LeftFoot".to_string(), "RightFoot".to_string()],
            transition_frames: 20,
            search_interval: 10,
            match_penalty: 0.5,
            std_epsilon: 1e-6,
            degenerate_eps: 1e-6,
            channel_policy: ChannelPolicy::Strict,
            future_boundary: FutureBoundaryPolicy::FreezeLastValid,
            weights: FeatureWeights::default(),
            max_speed: 120.0,
            accel: 4.0,
            decel: 6.0,
            turn_smoothing: 8.0,
        }
    }
}

impl MatchingConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.future_horizons.is_empty() {
            return Err(MotionError::invalid_config(
                "future_horizons must not be empty",
            ));
        }
        if self.future_horizons.windows(2).any(|w| w[0] >= w[1]) {
            return Err(MotionError::invalid_config(
                "future_horizons must be strictly ascending",
            ));
        }
        if self.future_horizons[0] == 0 {
            return Err(MotionError::invalid_config(
                "future_horizons must be positive",
            ));
        }
        if self.transition_frames == 0 {
            return Err(MotionError::invalid_config(
                "transition_frames must be at least 1",
            ));
        }
        if self.search_interval == 0 {
            return Err(MotionError::invalid_config(
                "search_interval must be at least 1",
            ));
        }
        if self.std_epsilon <= 0.0 {
            return Err(MotionError::invalid_config("std_epsilon must be positive"));
        }
        if self.match_penalty < 0.0 {
            return Err(MotionError::invalid_config(
                "match_penalty must be non-negative",
            ));
        }
        if self.max_speed <= 0.0 {
            return Err(MotionError::invalid_config("max_speed must be positive"));
        }
        if self.accel <= 0.0 || self.decel <= 0.0 {
            return Err(MotionError::invalid_config(
                "accel and decel must be positive",
            ));
        }
        Ok(())
    }

    /// Longest lookahead horizon, in frames.
    #[must_use]
    pub fn max_horizon(&self) -> usize {
        self.future_horizons.last().copied().unwrap_or(0)
    }

    /// Preset favoring quick reaction to input: short blend window,
    /// frequent searches, low switching hysteresis.
    #[must_use]
    pub fn responsive() -> Self {
        Self {
            transition_frames: 10,
            search_interval: 5,
            match_penalty: 0.25,
            ..Self::default()
        }
    }

    /// Preset favoring long, committed transitions over reactivity.
    #[must_use]
    pub fn cinematic() -> Self {
        Self {
            transition_frames: 40,
            search_interval: 20,
            match_penalty: 1.0,
            ..Self::default()
        }
    }

    /// Set the future lookahead horizons.
    #[must_use]
    pub fn with_future_horizons(mut self, horizons: Vec<usize>) -> Self {
        self.future_horizons = horizons;
        self
    }

    /// Set the tracked end-effector names.
    #[must_use]
    pub fn with_tracked_sites(mut self, sites: Vec<String>) -> Self {
        self.tracked_sites = sites;
        self
    }

    /// Set the blend window length.
    #[must_use]
    pub const fn with_transition_frames(mut self, frames: usize) -> Self {
        self.transition_frames = frames;
        self
    }

    /// Set the channel validation policy.
    #[must_use]
    pub const fn with_channel_policy(mut self, policy: ChannelPolicy) -> Self {
        self.channel_policy = policy;
        self
    }

    /// Set the future-trajectory boundary policy.
    #[must_use]
    pub const fn with_future_boundary(mut self, policy: FutureBoundaryPolicy) -> Self {
        self.future_boundary = policy;
        self
    }
}
