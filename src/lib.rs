//! Motion Matching Library
//!
//! Motion-matched character animation from BVH clip libraries.
//!
//! This library parses BVH motion capture files, reconstructs skeleton
//! hierarchies and per-frame poses, re-expresses every clip around a planar
//! virtual root, and derives per-frame pose/trajectory features. A
//! normalized, weighted nearest-neighbor index over those features drives a
//! runtime controller that continuously splices the best-matching clip
//! frames into a seamless animation stream.
//!
//! # Features
//!
//! - **Virtual root decomposition**: poses become heading-invariant, so a
//!   clip recorded walking north matches a character walking east
//! - **Normalized feature space**: per-dimension z-scoring plus component
//!   weights make velocities, site positions, and future trajectory commensurable
//! - **Seamless splicing**: rigid virtual-root alignment plus a slerp/lerp
//!   blend window joins any two clips without foot teleports
//! - **Frame-synchronous controller**: boolean intents in, joint transforms out
//!
//! # Quick Start
//!
//! ```
//! use motion_matching::{
//!     bvh, extract_features, MatchingConfig, Motion, MotionIndex,
//! };
//!
//! let mut text = String::from(
//!     "HIERARCHY\nROOT Hips\n{\n  OFFSET 0 0 0\n  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation\n  JOINT LeftFoot\n  {\n    OFFSET 1 -8 0\n    CHANNELS 3 Zrotation Xrotation Yrotation\n    End Site\n    {\n      OFFSET 0 -2 0\n    }\n  }\n  JOINT RightFoot\n  {\n    OFFSET -1 -8 0\n    CHANNELS 3 Zrotation Xrotation Yrotation\n    End Site\n    {\n      OFFSET 0 -2 0\n    }\n  }\n}\nMOTION\nFrames: 12\nFrame Time: 0.1\n",
//! );
//! for i in 0..12 {
//!     text.push_str(&format!("0 9 {}.0 0 0 0 0 0 0 0 0 0\n", i));
//! }
//!
//! let config = MatchingConfig::default().with_future_horizons(vec![2, 4, 6]);
//! let document = bvh::parse_str(&text)?;
//! let mut clip = Motion::decode(&document, &config)?;
//! extract_features(&mut clip, &config);
//!
//! let index = MotionIndex::build(vec![(clip.clone(), "walk".into())], &config)?;
//! let raw = index.layout().to_vector(&clip.features()[5]);
//! let found = index.query(&raw)?;
//! assert!(found.distance < 1e-9);
//! # Ok::<(), motion_matching::MotionError>(())
//! ```
//!
//! # Pipeline
//!
//! | Stage | Entry point |
//! |-------|-------------|
//! | Parse | [`bvh::load`] / [`bvh::parse_str`] |
//! | Decode | [`Motion::decode`] |
//! | Features | [`extract_features`] |
//! | Index | [`MotionIndex::build`] / [`MotionIndex::build_from_dir`] |
//! | Splice | [`connect`] |
//! | Runtime | [`CharacterController::tick`] |

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod blend;
pub mod bvh;
pub mod config;
pub mod controller;
pub mod error;
pub mod feature;
pub mod index;
pub mod kdtree;
pub mod kinematics;
pub mod math;
pub mod motion;
pub mod skeleton;

// Re-exports for convenient access
pub use blend::connect;
pub use bvh::{BvhDocument, RawMotion};
pub use config::{
    ChannelPolicy, FeatureWeights, FutureBoundaryPolicy, MatchingConfig,
};
pub use controller::{CharacterController, IntentState, LocomotionModel};
pub use error::{MotionError, Result};
pub use feature::{extract_features, rebuild_features, FeatureFrame, FeatureLayout};
pub use index::{ClipId, IndexEntry, IndexedClip, MatchResult, MotionIndex};
pub use kinematics::{virtual_root_decompose, virtual_root_recompose, VirtualSplit};
pub use motion::{Motion, MotionFrame};
pub use skeleton::{Channel, Joint, JointId, Skeleton};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_set() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_feature_dimension() {
        // Hip + two tracked sites, three horizons.
        let layout = FeatureLayout::from_config(&MatchingConfig::default());
        assert_eq!(layout.dim(), 36);
    }
}
