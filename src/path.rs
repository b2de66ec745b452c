//! Path resolution: splits a path into components and walks them one
//! directory lookup at a time from a volume's root.
//!
//! Paths may optionally begin with the volume's mount prefix (matched
//! case-insensitively, e.g. `"C:"`), and use either `/` or `\` as the
//! component separator since both appear in the wild on FAT media.

use alloc::vec::Vec;

use crate::dir::{Dir, DirError};
use crate::node::Node;

fn split_components(path: &str) -> Vec<&str> {
    path.split(|c| c == '/' || c == '\\')
        .filter(|c| !c.is_empty())
        .collect()
}

/// Resolves `path` against `root`, stripping a leading mount-prefix
/// component if one matches `root`'s volume. Each intermediate
/// component must itself be a directory; the last one may be either a
/// file or a directory.
pub fn resolve(root: &Node, path: &str) -> Result<Node, DirError> {
    let mut components = split_components(path);
    if let Some(first) = components.first() {
        if first.eq_ignore_ascii_case(root.volume().mount_prefix()) {
            components.remove(0);
        }
    }
    if components.is_empty() {
        return Ok(root.clone());
    }
    let found = root.find(components)?;
    Ok((*found).clone())
}

/// Splits `path` into its parent directory's path and its final
/// component, e.g. `"a/b/c.txt"` -> `("a/b", "c.txt")`. A bare name with
/// no separator has an empty parent path (resolves to `root` itself).
pub fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind(['/', '\\']) {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_either_separator_and_drops_empties() {
        assert_eq!(split_components("a/b\\c"), alloc::vec!["a", "b", "c"]);
        assert_eq!(split_components("/a//b/"), alloc::vec!["a", "b"]);
    }

    #[test]
    fn split_parent_handles_bare_names() {
        assert_eq!(split_parent("file.txt"), ("", "file.txt"));
        assert_eq!(split_parent("a/b/file.txt"), ("a/b", "file.txt"));
    }
}
