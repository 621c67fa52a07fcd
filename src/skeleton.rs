//! Skeleton hierarchy model.
//!
//! Joints live in an arena ([`Skeleton::joints`]) with index-based
//! parent/child links, so the hierarchy is immutable and cheaply sharable
//! after load while per-frame state lives in parallel buffers keyed by
//! [`JointId`]. Joint names are not guaranteed unique in BVH files; ids are
//! the stable key everywhere.

use nalgebra::Vector3;

use crate::config::ChannelPolicy;
use crate::error::{MotionError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable identifier of a joint within its [`Skeleton`] arena.
pub type JointId = usize;

/// Name of the synthetic root joint inserted above the parsed root.
pub const VIRTUAL_ROOT_NAME: &str = "VirtualRoot";

/// A single BVH motion channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Channel {
    Xposition,
    Yposition,
    Zposition,
    Xrotation,
    Yrotation,
    Zrotation,
}

impl Channel {
    /// Parse a channel tag as it appears in a CHANNELS line.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "Xposition" => Some(Self::Xposition),
            "Yposition" => Some(Self::Yposition),
            "Zposition" => Some(Self::Zposition),
            "Xrotation" => Some(Self::Xrotation),
            "Yrotation" => Some(Self::Yrotation),
            "Zrotation" => Some(Self::Zrotation),
            _ => None,
        }
    }

    /// Whether this is a position channel.
    #[must_use]
    pub const fn is_position(self) -> bool {
        matches!(self, Self::Xposition | Self::Yposition | Self::Zposition)
    }

    /// Whether this is a rotation channel.
    #[must_use]
    pub const fn is_rotation(self) -> bool {
        !self.is_position()
    }

    /// Component index (x=0, y=1, z=2) this channel addresses.
    #[must_use]
    pub const fn component(self) -> usize {
        match self {
            Self::Xposition | Self::Xrotation => 0,
            Self::Yposition | Self::Yrotation => 1,
            Self::Zposition | Self::Zrotation => 2,
        }
    }
}

/// A node in the joint hierarchy.
///
/// Structure only: offsets and channel layout are fixed at parse time, and
/// per-frame rotations/positions live in [`crate::motion::MotionFrame`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Joint {
    /// Joint name as declared in the file (`Site` for end sites).
    pub name: String,
    /// Local offset from the parent joint.
    pub offset: Vector3<f64>,
    /// Ordered channel list; empty for end sites.
    pub channels: Vec<Channel>,
    /// Parent joint id; `None` only for the virtual root.
    pub parent: Option<JointId>,
    /// Child joint ids, in declaration order.
    pub children: Vec<JointId>,
}

impl Joint {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            offset: Vector3::zeros(),
            channels: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Immutable joint hierarchy with a synthetic virtual root at id 0.
///
/// The virtual root carries the canonical 6-channel layout so heading and
/// planar position can be factored out of the first real joint uniformly,
/// but its per-frame transform is derived by decomposition and never decoded
/// from raw channel rows. [`Skeleton::channel_sum`] therefore excludes it.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Skeleton {
    joints: Vec<Joint>,
}

impl Skeleton {
    /// Create a skeleton containing only the virtual root.
    #[must_use]
    pub fn new() -> Self {
        let mut virtual_root = Joint::new(VIRTUAL_ROOT_NAME);
        virtual_root.channels = vec![
            Channel::Xposition,
            Channel::Yposition,
            Channel::Zposition,
            Channel::Zrotation,
            Channel::Yrotation,
            Channel::Xrotation,
        ];
        Self {
            joints: vec![virtual_root],
        }
    }

    /// Id of the virtual root.
    #[must_use]
    pub const fn virtual_root(&self) -> JointId {
        0
    }

    /// Id of the first real joint (the parsed root, typically the hip).
    ///
    /// Returns `None` for a skeleton with no parsed joints.
    #[must_use]
    pub fn hip(&self) -> Option<JointId> {
        self.joints[0].children.first().copied()
    }

    /// Add a joint under `parent`, returning its id.
    pub fn add_joint(&mut self, name: impl Into<String>, parent: JointId) -> JointId {
        let id = self.joints.len();
        let mut joint = Joint::new(name);
        joint.parent = Some(parent);
        self.joints.push(joint);
        self.joints[parent].children.push(id);
        id
    }

    /// Number of joints, virtual root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// Whether the skeleton holds no parsed joints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.joints.len() <= 1
    }

    /// Shared access to a joint.
    #[must_use]
    pub fn joint(&self, id: JointId) -> &Joint {
        &self.joints[id]
    }

    /// Mutable access to a joint (parser use).
    pub(crate) fn joint_mut(&mut self, id: JointId) -> &mut Joint {
        &mut self.joints[id]
    }

    /// All joints in arena order.
    #[must_use]
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// Joint ids in preorder (parent before children), starting at the
    /// virtual root. Iterative, with an explicit stack.
    #[must_use]
    pub fn preorder(&self) -> Vec<JointId> {
        let mut order = Vec::with_capacity(self.joints.len());
        let mut stack = vec![self.virtual_root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            // Push children reversed so the first child is visited first.
            for &child in self.joints[id].children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// Sum of channel counts over all decoded joints (virtual root excluded).
    ///
    /// Every motion row must carry at least this many values.
    #[must_use]
    pub fn channel_sum(&self) -> usize {
        self.preorder()
            .iter()
            .filter(|&&id| id != self.virtual_root())
            .map(|&id| self.joints[id].channels.len())
            .sum()
    }

    /// Validate channel layout against the given policy.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::ChannelMismatch`] describing the first
    /// offending joint, or [`MotionError::Structural`] if the virtual root
    /// has no children.
    pub fn validate_channels(&self, policy: ChannelPolicy) -> Result<()> {
        if self.is_empty() {
            return Err(MotionError::structural("virtual root has no children", 0));
        }
        if policy == ChannelPolicy::Disabled {
            return Ok(());
        }

        for &id in &self.preorder() {
            if id == self.virtual_root() {
                continue;
            }
            let joint = &self.joints[id];
            let is_root = joint.parent == Some(self.virtual_root());

            if is_root {
                if joint.channels.len() != 6 {
                    return Err(MotionError::channel_mismatch(format!(
                        "root joint '{}' must have 6 channels, found {}",
                        joint.name,
                        joint.channels.len()
                    )));
                }
                if joint.channels[..3].iter().any(|c| !c.is_position()) {
                    return Err(MotionError::channel_mismatch(format!(
                        "root joint '{}' first three channels must be position channels",
                        joint.name
                    )));
                }
                if joint.channels[3..].iter().any(|c| !c.is_rotation()) {
                    return Err(MotionError::channel_mismatch(format!(
                        "root joint '{}' last three channels must be rotation channels",
                        joint.name
                    )));
                }
            } else {
                match policy {
                    ChannelPolicy::Strict => {
                        if !joint.channels.is_empty()
                            && (joint.channels.len() != 3
                                || joint.channels.iter().any(|c| !c.is_rotation()))
                        {
                            return Err(MotionError::channel_mismatch(format!(
                                "joint '{}' must have 0 or 3 rotation channels",
                                joint.name
                            )));
                        }
                    }
                    ChannelPolicy::Permissive => {
                        // Only the trailing rotation channels are checked;
                        // leading position channels are tolerated.
                        let tail = joint.channels.len().saturating_sub(3);
                        if joint.channels[tail..].iter().any(|c| !c.is_rotation()) {
                            return Err(MotionError::channel_mismatch(format!(
                                "joint '{}' trailing channels must be rotation channels",
                                joint.name
                            )));
                        }
                    }
                    ChannelPolicy::Disabled => unreachable!(),
                }
            }
        }
        Ok(())
    }

    /// Root-to-leaf joint chains for the tracked sites, hip chain first.
    ///
    /// The hip chain is the virtual root's child alone; each remaining chain
    /// walks from the hip down to a joint whose name appears in
    /// `site_names`, in preorder discovery order.
    #[must_use]
    pub fn site_chains(&self, site_names: &[String]) -> Vec<Vec<JointId>> {
        let Some(hip) = self.hip() else {
            return Vec::new();
        };
        let mut chains = vec![vec![hip]];

        let mut stack = vec![(hip, vec![hip])];
        while let Some((id, path)) = stack.pop() {
            let joint = &self.joints[id];
            if site_names.iter().any(|n| *n == joint.name) {
                chains.push(path);
                continue;
            }
            for &child in joint.children.iter().rev() {
                let mut next = path.clone();
                next.push(child);
                stack.push((child, next));
            }
        }

        // Stack order reverses sibling discovery relative to preorder for
        // the appended chains; restore file order by sorting on leaf id.
        chains[1..].sort_by_key(|chain| *chain.last().unwrap_or(&0));
        chains
    }
}

impl Default for Skeleton {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hip -> {LeftUpLeg -> LeftFoot, RightUpLeg -> RightFoot}, each leg
    /// joint with 3 rotation channels, hip with 6.
    fn biped() -> Skeleton {
        let mut skel = Skeleton::new();
        let hip = skel.add_joint("Hips", skel.virtual_root());
        skel.joint_mut(hip).channels = vec![
            Channel::Xposition,
            Channel::Yposition,
            Channel::Zposition,
            Channel::Zrotation,
            Channel::Xrotation,
            Channel::Yrotation,
        ];
        for side in ["Left", "Right"] {
            let upleg = skel.add_joint(format!("{side}UpLeg"), hip);
            skel.joint_mut(upleg).channels = vec![
                Channel::Zrotation,
                Channel::Xrotation,
                Channel::Yrotation,
            ];
            let foot = skel.add_joint(format!("{side}Foot"), upleg);
            skel.joint_mut(foot).channels = vec![
                Channel::Zrotation,
                Channel::Xrotation,
                Channel::Yrotation,
            ];
            let site = skel.add_joint("Site", foot);
            skel.joint_mut(site).offset = Vector3::new(0.0, 0.0, 10.0);
        }
        skel
    }

    #[test]
    fn test_virtual_root_is_first() {
        let skel = biped();
        assert_eq!(skel.joint(skel.virtual_root()).name, VIRTUAL_ROOT_NAME);
        assert_eq!(skel.joint(skel.virtual_root()).channels.len(), 6);
        assert_eq!(skel.hip(), Some(1));
    }

    #[test]
    fn test_preorder_matches_insertion() {
        let skel = biped();
        // Joints are inserted depth-first in file order, so preorder must
        // equal arena order.
        let order = skel.preorder();
        assert_eq!(order, (0..skel.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_channel_sum_excludes_virtual_root() {
        let skel = biped();
        // 6 (hip) + 4 joints * 3 rotations, end sites contribute nothing.
        assert_eq!(skel.channel_sum(), 18);
    }

    #[test]
    fn test_validate_strict_accepts_biped() {
        let skel = biped();
        assert!(skel.validate_channels(ChannelPolicy::Strict).is_ok());
        assert!(skel.validate_channels(ChannelPolicy::Permissive).is_ok());
    }

    #[test]
    fn test_validate_strict_rejects_short_root() {
        let mut skel = biped();
        let hip = skel.hip().unwrap();
        skel.joint_mut(hip).channels.pop();
        let err = skel.validate_channels(ChannelPolicy::Strict).unwrap_err();
        assert!(err.to_string().contains("6 channels"));
        assert!(skel.validate_channels(ChannelPolicy::Disabled).is_ok());
    }

    #[test]
    fn test_validate_position_on_limb() {
        let mut skel = biped();
        skel.joint_mut(2).channels.insert(0, Channel::Xposition);
        assert!(skel.validate_channels(ChannelPolicy::Strict).is_err());
        // Permissive tolerates a leading position channel.
        assert!(skel.validate_channels(ChannelPolicy::Permissive).is_ok());
    }

    #[test]
    fn test_empty_skeleton_invalid() {
        let skel = Skeleton::new();
        assert!(skel.is_empty());
        assert!(skel.validate_channels(ChannelPolicy::Strict).is_err());
    }

    #[test]
    fn test_site_chains() {
        let skel = biped();
        let chains = skel.site_chains(&["LeftFoot".to_string(), "RightFoot".to_string()]);
        assert_eq!(chains.len(), 3);
        // Hip chain is the hip alone.
        assert_eq!(chains[0], vec![1]);
        // Each foot chain walks hip -> upleg -> foot.
        assert_eq!(chains[1].len(), 3);
        assert_eq!(skel.joint(*chains[1].last().unwrap()).name, "LeftFoot");
        assert_eq!(skel.joint(*chains[2].last().unwrap()).name, "RightFoot");
    }
}
