//! Binary-layout utilities
//!
//! Helpers shared by the on-disk structures: 4-character magic tags,
//! fixed-size NUL-padded name buffers, and path splitting/joining.
//! No state here; everything above builds on these.

use crate::error::{ArchiveError, Result};

/// Fixed capacity of an entry name buffer, including the NUL terminator.
pub const NAME_LEN: usize = 32;

/// Encode a 4-character tag so that a raw hex dump of the archive shows
/// the tag's ASCII characters in order.
pub const fn tag(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// Encode a name into a fixed NUL-padded buffer.
///
/// Names longer than `NAME_LEN - 1` bytes do not fit and are rejected.
pub fn encode_name(name: &str) -> Result<[u8; NAME_LEN]> {
    let bytes = name.as_bytes();
    if bytes.len() >= NAME_LEN {
        return Err(ArchiveError::NameTooLong(name.to_string()));
    }

    let mut buffer = [0u8; NAME_LEN];
    buffer[..bytes.len()].copy_from_slice(bytes);
    Ok(buffer)
}

/// Decode a NUL-padded name buffer back into a string.
pub fn decode_name(buffer: &[u8; NAME_LEN]) -> String {
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
    String::from_utf8_lossy(&buffer[..end]).into_owned()
}

/// Split a path into its non-empty components.
///
/// `"."` and `".."` components are kept; resolution interprets them.
pub fn split_components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// Split a path into the path of its parent directory and the leaf name.
///
/// The parent keeps the absolute/relative character of the input, so it
/// can be resolved against the root or the current directory as usual.
pub fn parent_and_leaf(path: &str) -> Result<(String, String)> {
    let mut components = split_components(path);

    let leaf = match components.pop() {
        Some(leaf) if leaf != "." && leaf != ".." => leaf.to_string(),
        _ => return Err(ArchiveError::InvalidPath(path.to_string())),
    };

    let parent = if path.starts_with('/') {
        format!("/{}", components.join("/"))
    } else if components.is_empty() {
        ".".to_string()
    } else {
        components.join("/")
    };

    Ok((parent, leaf))
}

/// Collapse `.` and `..` components of an absolute path, left to right.
///
/// The result is `/` for the root, otherwise `/a/b/` with a trailing
/// separator. Callers must not pass paths that escape above the root;
/// excess `..` components are dropped.
pub fn normalize_path(path: &str) -> String {
    let mut normalized: Vec<&str> = Vec::new();

    for component in split_components(path) {
        match component {
            "." => {}
            ".." => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    if normalized.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", normalized.join("/"))
    }
}
