//! Path segmentation.
//!
//! All paths in this crate are `/`-separated strings rooted at a
//! filesystem's root, which is represented as the empty string `""`. There is
//! no absolute/relative distinction and no escape sequence for `/` within a
//! name.

use std::fmt;

/// How a filesystem treats a trailing `/` in a path passed to its
/// operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingSlashPolicy {
    /// A trailing slash is stripped before resolution (`"a/b/"` == `"a/b"`).
    #[default]
    Ignore,
    /// A trailing slash is rejected with [`crate::VfsError::ArgumentInvalid`].
    Reject,
}

/// An invalid path was supplied to a path-consuming operation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid path {0:?}: {1}")]
pub struct PathError(pub String, pub &'static str);

/// Split a path into its `/`-separated segments, honoring `policy` for a
/// trailing slash. Empty segments (produced by a leading `/` or doubled
/// `//`) are treated as references to the current directory and are
/// filtered out here rather than at each call site.
///
/// Uses `memchr` to scan for the `/` delimiter rather than a byte-by-byte
/// loop, the way a low-level argument parser scans for a terminator.
pub fn split(path: &str, policy: TrailingSlashPolicy) -> Result<Vec<&str>, PathError> {
    let mut rest = path;
    if rest.ends_with('/') && !rest.is_empty() {
        match policy {
            TrailingSlashPolicy::Ignore => rest = &rest[..rest.len() - 1],
            TrailingSlashPolicy::Reject => {
                return Err(PathError(path.to_string(), "trailing slash is not permitted"));
            }
        }
    }

    let mut segments = Vec::new();
    let bytes = rest.as_bytes();
    let mut start = 0usize;
    loop {
        match memchr::memchr(b'/', &bytes[start..]) {
            Some(offset) => {
                let end = start + offset;
                let segment = &rest[start..end];
                if !segment.is_empty() {
                    segments.push(segment);
                }
                start = end + 1;
            }
            None => {
                let segment = &rest[start..];
                if !segment.is_empty() {
                    segments.push(segment);
                }
                break;
            }
        }
    }
    Ok(segments)
}

/// Join segments back into a normalized `/`-separated path rooted at `""`.
pub fn join<'a, I: IntoIterator<Item = &'a str>>(segments: I) -> String {
    segments.into_iter().collect::<Vec<_>>().join("/")
}

/// Split a normalized path into `(parent, name)`. The root path has no
/// parent.
pub fn split_parent(path: &str) -> Option<(String, &str)> {
    let segments = split(path, TrailingSlashPolicy::Ignore).ok()?;
    let name = *segments.last()?;
    let parent = join(segments[..segments.len() - 1].iter().copied());
    Some((parent, name))
}

/// A normalized, validated path together with the policy it was split
/// under. Cheap to construct; used as the crate's canonical path currency
/// wherever a `String` would otherwise be threaded around untyped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VfsPath(String);

impl VfsPath {
    /// Normalize `raw` under `policy`, rejecting a trailing slash if the
    /// policy demands it.
    pub fn normalize(raw: &str, policy: TrailingSlashPolicy) -> Result<Self, PathError> {
        let segments = split(raw, policy)?;
        Ok(VfsPath(join(segments)))
    }

    /// The root path, `""`.
    #[must_use]
    pub fn root() -> Self {
        VfsPath(String::new())
    }

    /// True if this is the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the normalized string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `/`-separated segments (never contains empty segments).
    #[must_use]
    pub fn segments(&self) -> Vec<&str> {
        if self.0.is_empty() {
            Vec::new()
        } else {
            self.0.split('/').collect()
        }
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<VfsPath> for String {
    fn from(value: VfsPath) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_ignores_leading_and_double_slashes() {
        let segments = split("/a//b/c", TrailingSlashPolicy::Ignore).unwrap();
        assert_eq!(segments, vec!["a", "b", "c"]);
    }

    #[test]
    fn trailing_slash_ignored_by_default() {
        let segments = split("a/b/", TrailingSlashPolicy::Ignore).unwrap();
        assert_eq!(segments, vec!["a", "b"]);
    }

    #[test]
    fn trailing_slash_rejected_when_policy_demands_it() {
        assert!(split("a/b/", TrailingSlashPolicy::Reject).is_err());
        assert!(split("a/b", TrailingSlashPolicy::Reject).is_ok());
    }

    #[test]
    fn root_has_no_parent() {
        assert!(split_parent("").is_none());
    }

    #[test]
    fn split_parent_splits_last_segment() {
        let (parent, name) = split_parent("a/b/c").unwrap();
        assert_eq!(parent, "a/b");
        assert_eq!(name, "c");
    }

    #[test]
    fn vfs_path_root_is_empty() {
        assert!(VfsPath::root().is_root());
        assert_eq!(VfsPath::root().as_str(), "");
    }
}
