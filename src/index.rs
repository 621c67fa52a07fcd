//! Motion library index: normalized, weighted feature space over a corpus
//! of clips with nearest-neighbor query.
//!
//! The normalization statistics (per-dimension mean/std) and the component
//! weight vector are computed once at build time and shared by every query
//! against that corpus; queries take `&self` and can never mutate them.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::bvh;
use crate::config::MatchingConfig;
use crate::error::{MotionError, Result};
use crate::feature::{self, FeatureLayout};
use crate::motion::Motion;

/// Identifier of a clip within a [`MotionIndex`].
pub type ClipId = usize;

/// One indexed clip with its source identifier.
#[derive(Debug, Clone)]
pub struct IndexedClip {
    /// Fully extracted motion (frames + features).
    pub motion: Motion,
    /// Source path or synthetic identifier.
    pub source: String,
}

/// Back-reference from an indexed point to its owning clip and frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Owning clip.
    pub clip: ClipId,
    /// Frame index within that clip.
    pub frame: usize,
}

/// Result of a nearest-neighbor query.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Euclidean distance in normalized, weighted feature space.
    pub distance: f64,
    /// Matched entry.
    pub entry: IndexEntry,
    /// Source identifier of the matched clip.
    pub source: String,
    /// The query vector after normalization and weighting.
    pub normalized_query: Vec<f64>,
}

/// Nearest-neighbor index over a motion corpus.
#[derive(Debug, Clone)]
pub struct MotionIndex {
    clips: Vec<IndexedClip>,
    entries: Vec<IndexEntry>,
    tree: crate::kdtree::KdTree,
    mean: Vec<f64>,
    std: Vec<f64>,
    weight: Vec<f64>,
    layout: FeatureLayout,
}

impl MotionIndex {
    /// Build an index from fully decoded clips.
    ///
    /// Each clip is run through the feature pipeline (virtual-root
    /// decomposition, velocity/site features, future trajectory), then one
    /// vector per frame `i > 0` enters the corpus. Frame 0 is the zero
    /// baseline and is never indexed; frames without a full lookahead
    /// already follow the configured boundary policy.
    ///
    /// # Errors
    ///
    /// Configuration validation failures only; an empty corpus builds an
    /// index whose queries fail with [`MotionError::EmptyIndex`].
    pub fn build(clips: Vec<(Motion, String)>, config: &MatchingConfig) -> Result<Self> {
        config.validate()?;
        let layout = FeatureLayout::from_config(config);

        let mut indexed = Vec::with_capacity(clips.len());
        let mut raw_vectors: Vec<Vec<f64>> = Vec::new();
        let mut entries = Vec::new();

        for (mut motion, source) in clips {
            if motion.features().len() != motion.len() {
                feature::extract_features(&mut motion, config);
            }
            let clip_id = indexed.len();
            for (idx, frame) in motion.features().iter().enumerate().skip(1) {
                raw_vectors.push(layout.to_vector(frame));
                entries.push(IndexEntry {
                    clip: clip_id,
                    frame: idx,
                });
            }
            debug!(source = %source, frames = motion.len(), "indexed clip");
            indexed.push(IndexedClip { motion, source });
        }

        let (mean, std) = corpus_statistics(&raw_vectors, layout.dim(), config.std_epsilon);
        let weight = layout.weight_vector(&config.weights);

        let normalized: Vec<Vec<f64>> = raw_vectors
            .iter()
            .map(|v| normalize_with(v, &mean, &std, &weight))
            .collect();
        let tree = crate::kdtree::KdTree::build(normalized);

        info!(
            clips = indexed.len(),
            points = entries.len(),
            dim = layout.dim(),
            "motion index built"
        );

        Ok(Self {
            clips: indexed,
            entries,
            tree,
            mean,
            std,
            weight,
            layout,
        })
    }

    /// Build an index from every `.bvh` file under a directory (recursive).
    ///
    /// A clip that fails to parse or decode is logged with its path and
    /// skipped; one bad file never corrupts the batch.
    ///
    /// # Errors
    ///
    /// Directory walking failures and configuration errors.
    pub fn build_from_dir(root: impl AsRef<Path>, config: &MatchingConfig) -> Result<Self> {
        let mut paths = Vec::new();
        collect_bvh_files(root.as_ref(), &mut paths)?;
        paths.sort();

        let mut clips = Vec::with_capacity(paths.len());
        for path in paths {
            match load_clip(&path, config) {
                Ok(motion) => clips.push((motion, path.display().to_string())),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping clip");
                }
            }
        }
        Self::build(clips, config)
    }

    /// Normalize a raw feature vector into the corpus's metric space.
    #[must_use]
    pub fn normalize(&self, raw: &[f64]) -> Vec<f64> {
        normalize_with(raw, &self.mean, &self.std, &self.weight)
    }

    /// Nearest-neighbor query with a raw (physical-units) feature vector.
    ///
    /// # Errors
    ///
    /// [`MotionError::EmptyIndex`] if the corpus holds no entries.
    pub fn query(&self, raw: &[f64]) -> Result<MatchResult> {
        let normalized_query = self.normalize(raw);
        let (distance, point_idx) = self
            .tree
            .nearest(&normalized_query)
            .ok_or(MotionError::EmptyIndex)?;
        let entry = self.entries[point_idx];
        Ok(MatchResult {
            distance,
            entry,
            source: self.clips[entry.clip].source.clone(),
            normalized_query,
        })
    }

    /// Normalized stored vector for a specific clip frame, if indexed.
    ///
    /// Corpus introspection: lets callers and tests check what actually
    /// entered the metric space (frame 0 never does). Linear scan over the
    /// entries, not meant for per-tick lookups.
    #[must_use]
    pub fn stored_vector(&self, clip: ClipId, frame: usize) -> Option<&[f64]> {
        let point_idx = self
            .entries
            .iter()
            .position(|e| e.clip == clip && e.frame == frame)?;
        Some(self.tree.point(point_idx))
    }

    /// Indexed clips.
    #[must_use]
    pub fn clips(&self) -> &[IndexedClip] {
        &self.clips
    }

    /// One indexed clip.
    #[must_use]
    pub fn clip(&self, id: ClipId) -> &IndexedClip {
        &self.clips[id]
    }

    /// Number of indexed feature points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Feature layout this index was built with.
    #[must_use]
    pub const fn layout(&self) -> FeatureLayout {
        self.layout
    }
}

fn load_clip(path: &Path, config: &MatchingConfig) -> Result<Motion> {
    let document = bvh::load(path)?;
    let mut motion = Motion::decode(&document, config)?;
    feature::extract_features(&mut motion, config);
    Ok(motion)
}

fn collect_bvh_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_bvh_files(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("bvh"))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Per-dimension mean and epsilon-floored standard deviation.
fn corpus_statistics(vectors: &[Vec<f64>], dim: usize, std_epsilon: f64) -> (Vec<f64>, Vec<f64>) {
    let n = vectors.len();
    if n == 0 {
        return (vec![0.0; dim], vec![1.0; dim]);
    }

    let mut mean = vec![0.0; dim];
    for v in vectors {
        for (m, &x) in mean.iter_mut().zip(v) {
            *m += x;
        }
    }
    for m in &mut mean {
        *m /= n as f64;
    }

    let mut var = vec![0.0; dim];
    for v in vectors {
        for ((s, &x), &m) in var.iter_mut().zip(v).zip(&mean) {
            let d = x - m;
            *s += d * d;
        }
    }
    let std = var
        .into_iter()
        .map(|s| (s / n as f64).sqrt().max(std_epsilon))
        .collect();

    (mean, std)
}

fn normalize_with(raw: &[f64], mean: &[f64], std: &[f64], weight: &[f64]) -> Vec<f64> {
    raw.iter()
        .zip(mean)
        .zip(std)
        .zip(weight)
        .map(|(((&x, &m), &s), &w)| (x - m) / s * w)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh;
    use approx::assert_relative_eq;

    fn walk_clip(n: usize, step: f64, yaw_deg: f64) -> Motion {
        let mut text = String::from(
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
",
        );
        text.push_str(&format!("Frames: {n}\nFrame Time: 0.1\n"));
        for i in 0..n {
            let z = i as f64 * step;
            text.push_str(&format!(
                "0.0 9.0 {z} 0.0 0.0 {yaw_deg} 0.0 0.0 0.0 0.0 0.0 0.0\n"
            ));
        }
        let doc = bvh::parse_str(&text).unwrap();
        Motion::decode(&doc, &MatchingConfig::default()).unwrap()
    }

    fn short_config() -> MatchingConfig {
        MatchingConfig::default().with_future_horizons(vec![2, 4, 6])
    }

    #[test]
    fn test_self_query_distance_zero() {
        let config = short_config();
        let mut clip = walk_clip(20, 0.5, 0.0);
        feature::extract_features(&mut clip, &config);
        let query_frame = clip.features()[7].clone();

        let index = MotionIndex::build(vec![(clip, "walk".to_string())], &config).unwrap();
        let raw = index.layout().to_vector(&query_frame);
        let result = index.query(&raw).unwrap();

        assert_relative_eq!(result.distance, 0.0, epsilon = 1e-9);
        assert_eq!(result.entry.clip, 0);
        // Straight constant-speed walking makes interior frames identical
        // in feature space; the match must be one of them.
        let matched = index.layout().to_vector(&index.clip(0).motion.features()[result.entry.frame]);
        let matched_norm = index.normalize(&matched);
        let d: f64 = matched_norm
            .iter()
            .zip(&result.normalized_query)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        assert_relative_eq!(d, 0.0, epsilon = 1e-9);
        assert_eq!(result.source, "walk");
    }

    #[test]
    fn test_frame_zero_excluded() {
        let config = short_config();
        let clip = walk_clip(20, 0.5, 0.0);
        let index = MotionIndex::build(vec![(clip, "walk".to_string())], &config).unwrap();
        assert_eq!(index.len(), 19);
        assert!(index.stored_vector(0, 0).is_none());
        assert!(index.stored_vector(0, 1).is_some());
    }

    #[test]
    fn test_empty_index_query_fails() {
        let config = short_config();
        let index = MotionIndex::build(Vec::new(), &config).unwrap();
        assert!(index.is_empty());
        let dim = index.layout().dim();
        let err = index.query(&vec![0.0; dim]).unwrap_err();
        assert!(matches!(err, MotionError::EmptyIndex));
    }

    #[test]
    fn test_hip_position_dimensions_ignored() {
        let config = short_config();
        let mut clip = walk_clip(20, 0.5, 0.0);
        feature::extract_features(&mut clip, &config);
        let frame = clip.features()[7].clone();
        let layout = FeatureLayout::from_config(&config);

        let index = MotionIndex::build(vec![(clip, "walk".to_string())], &config).unwrap();

        // Two vectors differing only in absolute hip position normalize to
        // identical points.
        let mut a = frame.clone();
        let mut b = frame;
        b.site_positions[0].z += 1000.0;
        let na = index.normalize(&layout.to_vector(&a));
        let nb = index.normalize(&layout.to_vector(&b));
        let d: f64 = na
            .iter()
            .zip(&nb)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt();
        assert_relative_eq!(d, 0.0, epsilon = 1e-12);

        a.site_positions[0].z -= 500.0;
        let also = index.query(&layout.to_vector(&a)).unwrap();
        assert_relative_eq!(also.distance, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_query_picks_closer_clip() {
        let config = short_config();
        let fast = walk_clip(20, 1.0, 0.0);
        let slow = walk_clip(20, 0.1, 0.0);
        let mut probe = walk_clip(20, 1.0, 0.0);
        feature::extract_features(&mut probe, &config);
        let raw = FeatureLayout::from_config(&config).to_vector(&probe.features()[10]);

        let index = MotionIndex::build(
            vec![(fast, "fast".to_string()), (slow, "slow".to_string())],
            &config,
        )
        .unwrap();
        let result = index.query(&raw).unwrap();
        assert_eq!(result.source, "fast");
    }

    #[test]
    fn test_statistics_epsilon_floor() {
        // Constant dimensions must not divide by zero.
        let (mean, std) = corpus_statistics(&[vec![5.0, 1.0], vec![5.0, 3.0]], 2, 1e-6);
        assert_relative_eq!(mean[0], 5.0);
        assert_relative_eq!(std[0], 1e-6);
        assert!(std[1] > 0.9);
    }

    #[test]
    fn test_build_from_dir_skips_bad_files() {
        let dir = std::env::temp_dir().join("motion_matching_index_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("nested")).unwrap();

        // One good clip, one junk file.
        let mut text = String::from(
            "HIERARCHY
ROOT Hips
{
  OFFSET 0.0 0.0 0.0
  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation
  End Site
  {
    OFFSET 0.0 -8.0 0.0
  }
}
MOTION
Frames: 10
Frame Time: 0.1
",
        );
        for i in 0..10 {
            text.push_str(&format!("0.0 9.0 {}.0 0.0 0.0 0.0\n", i));
        }
        std::fs::write(dir.join("good.bvh"), &text).unwrap();
        std::fs::write(dir.join("nested/bad.bvh"), "HIERARCHY\nROOT Hips\n{").unwrap();
        std::fs::write(dir.join("ignored.txt"), "not a clip").unwrap();

        let config = short_config().with_tracked_sites(vec![]);
        let index = MotionIndex::build_from_dir(&dir, &config).unwrap();
        assert_eq!(index.clips().len(), 1);
        assert_eq!(index.len(), 9);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
