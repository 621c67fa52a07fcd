//! End-to-end pipeline tests over synthetic BVH clips.
//!
//! These tests run the full chain: parse BVH text, decode poses, decompose
//! the virtual root, extract features, build an index, query it, splice
//! clips, and drive the runtime controller.

use approx::assert_relative_eq;
use motion_matching::{
    bvh, connect, extract_features, rebuild_features, CharacterController, FeatureLayout,
    IntentState, MatchingConfig, Motion, MotionIndex,
};

// =============================================================================
// CLIP GENERATORS
// =============================================================================

const FRAME_TIME: f64 = 0.1;

fn biped_hierarchy() -> &'static str {
    "HIERARCHY
ROOT Hips
{
  OFFSET 0.0 0.0 0.0
  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation
  JOINT LeftFoot
  {
    OFFSET 1.0 -8.0 0.0
    CHANNELS 3 Zrotation Xrotation Yrotation
    End Site
    {
      OFFSET 0.0 -2.0 0.0
    }
  }
  JOINT RightFoot
  {
    OFFSET -1.0 -8.0 0.0
    CHANNELS 3 Zrotation Xrotation Yrotation
    End Site
    {
      OFFSET 0.0 -2.0 0.0
    }
  }
}
MOTION
"
}

/// Straight constant-speed walk heading `yaw_deg` away from +Z.
fn walk_text(n: usize, speed: f64, yaw_deg: f64) -> String {
    let mut text = String::from(biped_hierarchy());
    text.push_str(&format!("Frames: {n}\nFrame Time: {FRAME_TIME}\n"));
    let yaw = yaw_deg.to_radians();
    for i in 0..n {
        let d = i as f64 * speed * FRAME_TIME;
        let x = d * yaw.sin();
        let z = d * yaw.cos();
        text.push_str(&format!(
            "{x} 9.0 {z} 0.0 0.0 {yaw_deg} 0.0 0.0 0.0 0.0 0.0 0.0\n"
        ));
    }
    text
}

fn walk_clip(n: usize, speed: f64, yaw_deg: f64, config: &MatchingConfig) -> Motion {
    let doc = bvh::parse_str(&walk_text(n, speed, yaw_deg)).unwrap();
    let mut motion = Motion::decode(&doc, config).unwrap();
    extract_features(&mut motion, config);
    motion
}

fn test_config() -> MatchingConfig {
    MatchingConfig::default()
        .with_future_horizons(vec![2, 4, 6])
        .with_transition_frames(5)
}

// =============================================================================
// FULL PIPELINE
// =============================================================================

#[test]
fn test_parse_decode_index_self_query() {
    let config = test_config();
    let clip = walk_clip(40, 5.0, 0.0, &config);
    let probe = clip.features()[12].clone();

    let index = MotionIndex::build(vec![(clip, "walk_n".into())], &config).unwrap();
    assert_eq!(index.len(), 39);

    let raw = index.layout().to_vector(&probe);
    let found = index.query(&raw).unwrap();
    assert_relative_eq!(found.distance, 0.0, epsilon = 1e-9);
    assert_eq!(found.source, "walk_n");
}

#[test]
fn test_heading_invariance_across_clips() {
    // The same walk recorded facing north and facing east produces the
    // same virtual-root-relative features, so a probe from one clip finds
    // a zero-distance match in an index built only from the other.
    let config = test_config();
    let north = walk_clip(40, 5.0, 0.0, &config);
    let east = walk_clip(40, 5.0, 90.0, &config);

    let probe = east.features()[15].clone();
    let index = MotionIndex::build(vec![(north, "north".into())], &config).unwrap();
    // Constant corpus dimensions get an epsilon-floored std, which
    // amplifies float noise under normalization, hence the loose bound.
    let found = index.query(&index.layout().to_vector(&probe)).unwrap();
    assert_relative_eq!(found.distance, 0.0, epsilon = 1e-3);
}

#[test]
fn test_feature_dimension_constant_across_clips() {
    let config = test_config();
    let layout = FeatureLayout::from_config(&config);
    for (n, speed, yaw) in [(10usize, 1.0, 0.0), (40, 5.0, 45.0), (80, 12.0, 180.0)] {
        let clip = walk_clip(n, speed, yaw, &config);
        for frame in clip.features() {
            assert_eq!(layout.to_vector(frame).len(), layout.dim());
        }
    }
}

// =============================================================================
// SPLICING
// =============================================================================

#[test]
fn test_splice_then_reindex() {
    let config = test_config();
    let a = walk_clip(40, 5.0, 0.0, &config);
    let b = walk_clip(40, 5.0, 90.0, &config);
    let k = config.transition_frames;
    let start = 8;

    let mut spliced = connect(&a, &b, k, start).unwrap();
    assert_eq!(spliced.len(), 40 - k + 40 - start);
    assert!(spliced.features().is_empty());

    rebuild_features(&mut spliced, &config);
    assert_eq!(spliced.features().len(), spliced.len());

    // The spliced composite is a valid clip in its own right.
    let index = MotionIndex::build(vec![(spliced, "turn".into())], &config).unwrap();
    assert!(!index.is_empty());
}

#[test]
fn test_splice_virtual_root_continuity() {
    let config = test_config();
    let a = walk_clip(40, 5.0, 0.0, &config);
    let b = walk_clip(40, 5.0, 90.0, &config);
    let out = connect(&a, &b, 5, 0).unwrap();
    let root = out.skeleton().virtual_root();

    // No frame-to-frame jump may exceed the rigid per-frame step by much:
    // the clips move 0.5 units per frame and turn at most 90 degrees
    // spread across the blend window.
    for i in 1..out.len() {
        let prev = out.frame(i - 1);
        let cur = out.frame(i);
        let step = (cur.position_or_zero(root) - prev.position_or_zero(root)).norm();
        let angle = prev.rotations[root].angle_to(&cur.rotations[root]);
        assert!(step < 1.5, "position jump {step} at frame {i}");
        assert!(
            angle < 30f64.to_radians(),
            "rotation jump {angle} at frame {i}"
        );
    }
}

// =============================================================================
// RUNTIME CONTROLLER
// =============================================================================

#[test]
fn test_controller_runs_against_library() {
    let config = test_config();
    let clips = vec![
        (walk_clip(60, 2.0, 0.0, &config), "slow".to_string()),
        (walk_clip(60, 8.0, 0.0, &config), "fast".to_string()),
        (walk_clip(60, 5.0, 90.0, &config), "east".to_string()),
    ];
    let start = clips[0].0.clone();
    let index = MotionIndex::build(clips, &config).unwrap();

    let mut controller = CharacterController::new(start, config.clone());
    let forward = IntentState {
        forward: true,
        ..IntentState::default()
    };

    for step in 0..400 {
        let intents = if step < 200 {
            forward
        } else {
            IntentState::default()
        };
        controller.tick(&intents, &index, FRAME_TIME).unwrap();
        assert!(controller.frame_idx() < controller.motion().len());

        let transforms = controller.global_transforms();
        assert_eq!(transforms.len(), controller.motion().skeleton().len());
        for m in &transforms {
            assert!(m.iter().all(|v| v.is_finite()));
        }
    }
}

#[test]
fn test_controller_empty_index_errors() {
    let config = test_config();
    let clip = walk_clip(40, 5.0, 0.0, &config);
    let empty = MotionIndex::build(Vec::new(), &config).unwrap();
    let mut controller = CharacterController::new(clip, config.clone());

    let mut saw_error = false;
    for _ in 0..config.search_interval + 1 {
        if controller
            .tick(&IntentState::default(), &empty, FRAME_TIME)
            .is_err()
        {
            saw_error = true;
        }
    }
    assert!(saw_error);
}
