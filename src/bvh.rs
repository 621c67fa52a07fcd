//! BVH text parsing.
//!
//! Decodes the `HIERARCHY` block into a [`Skeleton`] (with the virtual root
//! inserted at id 0) and the `MOTION` block into a raw per-frame channel
//! table. Rotation-order conventions declared per joint are preserved
//! verbatim in the channel lists; nothing is reordered here.
//!
//! All errors carry 1-based line numbers into the source text.

use std::path::Path;

use crate::error::{MotionError, Result};
use crate::skeleton::{Channel, JointId, Skeleton};

use nalgebra::Vector3;

/// Raw motion block: one row of channel floats per frame.
#[derive(Debug, Clone)]
pub struct RawMotion {
    /// Declared frame count.
    pub frame_count: usize,
    /// Seconds per frame.
    pub frame_time: f64,
    /// Channel rows, one per frame, in file order.
    pub rows: Vec<Vec<f64>>,
}

/// A parsed BVH file: hierarchy plus raw motion table.
#[derive(Debug, Clone)]
pub struct BvhDocument {
    /// Joint hierarchy, virtual root included.
    pub skeleton: Skeleton,
    /// Raw channel rows.
    pub raw: RawMotion,
}

/// Per-open-node bookkeeping used to diagnose malformed hierarchies.
struct OpenNode {
    id: JointId,
    is_end_site: bool,
    has_offset: bool,
    has_channels: bool,
    declared_line: usize,
}

/// Load and parse a BVH file.
///
/// # Errors
///
/// I/O failures and any parse error from [`parse_str`], each wrapped in
/// [`MotionError::File`] so the message names the offending file.
pub fn load(path: impl AsRef<Path>) -> Result<BvhDocument> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|err| MotionError::in_file(path, err.into()))?;
    parse_str(&text).map_err(|err| MotionError::in_file(path, err))
}

/// Parse BVH text into a hierarchy and raw motion table.
///
/// # Errors
///
/// Returns [`MotionError::Structural`] for malformed hierarchies (missing
/// `OFFSET`/`CHANNELS` before a node closes, unbalanced braces) and
/// [`MotionError::Parse`] for malformed numbers or a truncated motion block.
pub fn parse_str(text: &str) -> Result<BvhDocument> {
    let mut skeleton = Skeleton::new();
    let mut stack: Vec<OpenNode> = Vec::new();
    let mut lines = text.lines().enumerate();

    // Hierarchy block.
    let mut motion_line = None;
    for (idx, line) in lines.by_ref() {
        let line_no = idx + 1;
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&head) = parts.first() else {
            continue;
        };

        match head {
            "HIERARCHY" | "{" => {}
            "MOTION" => {
                motion_line = Some(line_no);
                break;
            }
            "ROOT" | "JOINT" | "End" => {
                let name = parts.get(1).copied().ok_or_else(|| {
                    MotionError::structural(format!("{head} declaration without a name"), line_no)
                })?;
                let parent = stack
                    .last()
                    .map_or(skeleton.virtual_root(), |open| open.id);
                let id = skeleton.add_joint(name, parent);
                stack.push(OpenNode {
                    id,
                    is_end_site: head == "End",
                    has_offset: false,
                    has_channels: false,
                    declared_line: line_no,
                });
            }
            "OFFSET" => {
                let open = stack.last_mut().ok_or_else(|| {
                    MotionError::structural("OFFSET outside of a joint block", line_no)
                })?;
                if parts.len() != 4 {
                    return Err(MotionError::parse(
                        "OFFSET requires exactly 3 values",
                        line_no,
                    ));
                }
                let x = parse_f64(parts[1], line_no)?;
                let y = parse_f64(parts[2], line_no)?;
                let z = parse_f64(parts[3], line_no)?;
                skeleton.joint_mut(open.id).offset = Vector3::new(x, y, z);
                open.has_offset = true;
            }
            "CHANNELS" => {
                let open = stack.last_mut().ok_or_else(|| {
                    MotionError::structural("CHANNELS outside of a joint block", line_no)
                })?;
                let count: usize = parts
                    .get(1)
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| MotionError::parse("CHANNELS requires a count", line_no))?;
                let tags = &parts[2..];
                if tags.len() != count {
                    return Err(MotionError::structural(
                        format!("CHANNELS declares {count} but lists {}", tags.len()),
                        line_no,
                    ));
                }
                let mut channels = Vec::with_capacity(count);
                for tag in tags {
                    let channel = Channel::parse(tag).ok_or_else(|| {
                        MotionError::parse(format!("unknown channel tag '{tag}'"), line_no)
                    })?;
                    channels.push(channel);
                }
                skeleton.joint_mut(open.id).channels = channels;
                open.has_channels = true;
            }
            "}" => {
                let open = stack.pop().ok_or_else(|| {
                    MotionError::structural("unbalanced closing brace", line_no)
                })?;
                if !open.has_offset {
                    return Err(MotionError::structural(
                        format!(
                            "joint declared at line {} closes without OFFSET",
                            open.declared_line
                        ),
                        line_no,
                    ));
                }
                if !open.is_end_site && !open.has_channels {
                    return Err(MotionError::structural(
                        format!(
                            "joint declared at line {} closes without CHANNELS",
                            open.declared_line
                        ),
                        line_no,
                    ));
                }
            }
            _ => {
                return Err(MotionError::structural(
                    format!("unexpected token '{head}' in hierarchy"),
                    line_no,
                ));
            }
        }
    }

    let motion_line = motion_line
        .ok_or_else(|| MotionError::structural("file has no MOTION block", text.lines().count()))?;
    if let Some(open) = stack.last() {
        return Err(MotionError::structural(
            format!(
                "joint declared at line {} never closed before MOTION",
                open.declared_line
            ),
            motion_line,
        ));
    }
    if skeleton.is_empty() {
        return Err(MotionError::structural("hierarchy declares no joints", motion_line));
    }

    // Motion block: "Frames: N" then "Frame Time: t" then one row per frame.
    let (frame_count, line_no) = next_field(&mut lines, "Frames:")?;
    let frame_count: usize = frame_count
        .parse()
        .map_err(|_| MotionError::parse("Frames: requires an integer", line_no))?;
    let (frame_time, line_no) = next_field(&mut lines, "Frame")?;
    let frame_time: f64 = frame_time
        .parse()
        .map_err(|_| MotionError::parse("Frame Time: requires a number", line_no))?;

    let mut rows = Vec::with_capacity(frame_count);
    let mut last_line = line_no;
    for (idx, line) in lines {
        let line_no = idx + 1;
        last_line = line_no;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        let mut row = Vec::with_capacity(parts.len());
        for part in parts {
            row.push(parse_f64(part, line_no)?);
        }
        rows.push(row);
        if rows.len() == frame_count {
            break;
        }
    }
    if rows.len() < frame_count {
        return Err(MotionError::parse(
            format!(
                "motion block declares {frame_count} frames, found {}",
                rows.len()
            ),
            last_line,
        ));
    }

    Ok(BvhDocument {
        skeleton,
        raw: RawMotion {
            frame_count,
            frame_time,
            rows,
        },
    })
}

fn parse_f64(token: &str, line_no: usize) -> Result<f64> {
    token
        .parse()
        .map_err(|_| MotionError::parse(format!("invalid number '{token}'"), line_no))
}

/// Pull the next non-empty line, check its leading token, return the last
/// whitespace-separated field ("Frame Time: 0.0333" -> "0.0333").
fn next_field<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
    expected: &str,
) -> Result<(&'a str, usize)> {
    for (idx, line) in lines {
        let line_no = idx + 1;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        if parts[0] != expected {
            return Err(MotionError::structural(
                format!("expected '{expected}', found '{}'", parts[0]),
                line_no,
            ));
        }
        let field = parts.last().copied().unwrap_or("");
        return Ok((field, line_no));
    }
    Err(MotionError::structural(
        format!("motion block ends before '{expected}'"),
        0,
    ))
}
