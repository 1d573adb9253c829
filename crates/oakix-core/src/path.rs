//! Helpers over `/`-separated absolute store paths.
//!
//! Store paths are absolute (`/oak:index/lucene`), use `/` as the only
//! separator, and never carry a trailing slash except for the root path `/`
//! itself. Segment names may contain namespace prefixes (`oak:index`), which
//! are opaque to these helpers.

/// Returns `true` if `path` is a well-formed absolute store path.
pub fn is_absolute(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    path.starts_with('/')
        && !path.ends_with('/')
        && !path.split('/').skip(1).any(str::is_empty)
}

/// Joins an absolute `root` with a relative remainder.
///
/// An empty remainder yields `root` unchanged.
pub fn join(root: &str, rel: &str) -> String {
    if rel.is_empty() {
        return root.to_string();
    }
    if root == "/" {
        format!("/{rel}")
    } else {
        format!("{root}/{rel}")
    }
}

/// Returns the remainder of `path` relative to `root`, without a leading
/// slash, or `None` if `path` is not `root` or a descendant of it.
pub fn relative<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    if path == root {
        return Some("");
    }
    if root == "/" {
        return path.strip_prefix('/');
    }
    path.strip_prefix(root)?.strip_prefix('/')
}

/// Returns `true` if `path` equals `scope` or is a descendant of it.
pub fn in_scope(scope: &str, path: &str) -> bool {
    relative(scope, path).is_some()
}

/// Returns the last segment of an absolute path (the node name).
///
/// The root path has no name; an empty string is returned for it.
pub fn name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Returns the parent path, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_forms() {
        assert!(is_absolute("/"));
        assert!(is_absolute("/oak:index"));
        assert!(is_absolute("/apps/project/ensure-definitions"));
        assert!(!is_absolute(""));
        assert!(!is_absolute("relative/path"));
        assert!(!is_absolute("/trailing/"));
        assert!(!is_absolute("/double//slash"));
    }

    #[test]
    fn join_handles_root_and_empty() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/oak:index", "lucene"), "/oak:index/lucene");
        assert_eq!(join("/oak:index", "a/b"), "/oak:index/a/b");
        assert_eq!(join("/oak:index", ""), "/oak:index");
    }

    #[test]
    fn relative_requires_segment_boundary() {
        assert_eq!(relative("/a", "/a/b/c"), Some("b/c"));
        assert_eq!(relative("/a", "/a"), Some(""));
        assert_eq!(relative("/a", "/ab"), None);
        assert_eq!(relative("/a", "/b"), None);
        assert_eq!(relative("/", "/a"), Some("a"));
    }

    #[test]
    fn scope_membership() {
        assert!(in_scope("/defs", "/defs"));
        assert!(in_scope("/defs", "/defs/lucene/indexRules"));
        assert!(!in_scope("/defs", "/defsx"));
        assert!(!in_scope("/defs", "/other"));
    }

    #[test]
    fn name_and_parent() {
        assert_eq!(name("/oak:index/lucene"), "lucene");
        assert_eq!(name("/"), "");
        assert_eq!(parent("/oak:index/lucene"), Some("/oak:index"));
        assert_eq!(parent("/oak:index"), Some("/"));
        assert_eq!(parent("/"), None);
    }

    #[test]
    fn join_relative_round_trip() {
        let root = "/apps/defs";
        let path = "/apps/defs/a/b";
        let rel = relative(root, path).unwrap();
        assert_eq!(join(root, rel), path);
    }
}
