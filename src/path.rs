//! Mapping of request paths onto the served tree.
//!
//! Every filesystem access goes through [`resolve_and_verify_path`], which
//! guarantees the resulting path lies inside the root. Escapes are rejected
//! with [`FileServerError::PathTraversal`], never clamped back into the root.

use std::path::{Component, Path, PathBuf};

use tracing::{error, warn};

use crate::error::FileServerError;

/// Percent-decode the path component of a request URI.
pub fn decode_request_path(raw: &str) -> Result<String, FileServerError> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| FileServerError::InvalidPath(raw.to_string()))
}

/// Join a directory-style upload target (`/a/b/`) with an uploaded file name.
pub fn join_upload_target(dir: &str, file_name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), file_name)
}

/// Sanitize a filename by removing dangerous characters and path components.
/// Returns None if the filename is invalid or empty after sanitization.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect();

    // Leading dots would turn "..." into a parent reference or a hidden file.
    let sanitized = sanitized.trim_matches(|c| c == '.' || c == ' ');
    if sanitized.is_empty() {
        return None;
    }

    let upper = sanitized.to_uppercase();
    let stem = upper.split('.').next().unwrap_or_default();
    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if RESERVED.contains(&stem) {
        return None;
    }

    if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        return Some(sanitized[..end].to_string());
    }

    Some(sanitized.to_string())
}

/// Resolve a request-relative path lexically against `root`.
///
/// Leading slashes are stripped, `.` segments skipped. Any `..`, root or
/// prefix component rejects the whole path. No filesystem access happens
/// here.
pub fn resolve_path(root: &Path, relative: &str) -> Result<PathBuf, FileServerError> {
    let relative = relative.trim_start_matches('/');

    if relative.is_empty() || relative == "." {
        return Ok(root.to_path_buf());
    }

    let mut result = root.to_path_buf();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(name) => {
                if name.to_string_lossy().contains('\0') {
                    warn!("Path component contains null byte: {:?}", name);
                    return Err(FileServerError::PathTraversal);
                }
                result.push(name);
            }
            Component::CurDir => continue,
            Component::ParentDir => {
                warn!("Path traversal attempt detected: parent directory (..) in {relative:?}");
                return Err(FileServerError::PathTraversal);
            }
            Component::RootDir | Component::Prefix(_) => {
                warn!("Absolute path component in {relative:?}");
                return Err(FileServerError::PathTraversal);
            }
        }
    }

    if !result.starts_with(root) {
        error!("Path resolution resulted in path outside root: {:?}", result);
        return Err(FileServerError::PathTraversal);
    }

    Ok(result)
}

/// Resolve a path and verify that symlinks do not lead outside `root`.
///
/// Existing targets are canonicalized and checked against the canonical
/// root. For targets that do not exist yet (uploads), the nearest existing
/// ancestor is checked instead and the lexical path is returned.
pub fn resolve_and_verify_path(root: &Path, relative: &str) -> Result<PathBuf, FileServerError> {
    let built_path = resolve_path(root, relative)?;
    let canonical_root = root.canonicalize()?;

    // symlink_metadata so a dangling link is canonicalized (and fails) instead
    // of being written through.
    if built_path.symlink_metadata().is_ok() {
        let canonical_path = built_path.canonicalize()?;
        if !canonical_path.starts_with(&canonical_root) {
            warn!(
                "Symlink escape attempt: {:?} resolved to {:?} which is outside {:?}",
                built_path, canonical_path, canonical_root
            );
            return Err(FileServerError::PathTraversal);
        }
        return Ok(canonical_path);
    }

    if let Some(ancestor) = built_path.ancestors().skip(1).find(|p| p.exists()) {
        let canonical_ancestor = ancestor.canonicalize()?;
        if !canonical_ancestor.starts_with(&canonical_root) {
            warn!(
                "Ancestor escape: {:?} resolved to {:?} outside root",
                built_path, canonical_ancestor
            );
            return Err(FileServerError::PathTraversal);
        }
    }

    Ok(built_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ========================================================================
    // Filename Sanitization Tests
    // ========================================================================

    #[test]
    fn test_sanitize_filename_normal() {
        assert_eq!(sanitize_filename("test.txt"), Some("test.txt".to_string()));
        assert_eq!(sanitize_filename("my-file.pdf"), Some("my-file.pdf".to_string()));
    }

    #[test]
    fn test_sanitize_filename_removes_path_separators() {
        let r = sanitize_filename("../etc/passwd").unwrap();
        assert!(!r.contains('/'));
        assert!(!r.starts_with('.'));

        assert_eq!(
            sanitize_filename("foo/bar/baz.txt"),
            Some("foo_bar_baz.txt".to_string())
        );
    }

    #[test]
    fn test_sanitize_filename_removes_control_chars() {
        assert_eq!(sanitize_filename("test\0.txt"), Some("test.txt".to_string()));
        assert_eq!(sanitize_filename("test\x01\x02.txt"), Some("test.txt".to_string()));
    }

    #[test]
    fn test_sanitize_filename_empty() {
        assert_eq!(sanitize_filename(""), None);
        assert_eq!(sanitize_filename("..."), None);
        assert_eq!(sanitize_filename("   "), None);
    }

    #[test]
    fn test_sanitize_filename_reserved_names() {
        assert_eq!(sanitize_filename("CON"), None);
        assert_eq!(sanitize_filename("con.txt"), None);
        assert_eq!(sanitize_filename("LPT1"), None);
        assert_eq!(sanitize_filename("console.txt"), Some("console.txt".to_string()));
    }

    #[test]
    fn test_sanitize_filename_length_limit() {
        let long_name = "a".repeat(300);
        assert_eq!(sanitize_filename(&long_name).unwrap().len(), 255);
    }

    // ========================================================================
    // Request Path Tests
    // ========================================================================

    #[test]
    fn test_decode_request_path() {
        assert_eq!(decode_request_path("/a%20b.txt").unwrap(), "/a b.txt");
        assert_eq!(decode_request_path("/%2e%2e/x").unwrap(), "/../x");
        assert!(matches!(
            decode_request_path("/%ff"),
            Err(FileServerError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_join_upload_target() {
        assert_eq!(join_upload_target("/c/d/e/", "b.txt"), "/c/d/e/b.txt");
        assert_eq!(join_upload_target("/", "b.txt"), "/b.txt");
    }

    // ========================================================================
    // Path Resolution Tests
    // ========================================================================

    #[test]
    fn test_resolve_path_normal() {
        let root = PathBuf::from("/srv/root");
        assert_eq!(
            resolve_path(&root, "subdir/file.txt").unwrap(),
            root.join("subdir/file.txt")
        );
        assert_eq!(
            resolve_path(&root, "/subdir/./file.txt").unwrap(),
            root.join("subdir/file.txt")
        );
    }

    #[test]
    fn test_resolve_path_root_aliases() {
        let root = PathBuf::from("/srv/root");
        assert_eq!(resolve_path(&root, "").unwrap(), root);
        assert_eq!(resolve_path(&root, "/").unwrap(), root);
        assert_eq!(resolve_path(&root, ".").unwrap(), root);
    }

    #[test]
    fn test_resolve_path_rejects_parent_dir() {
        let root = PathBuf::from("/srv/root");

        for escape in ["..", "../etc/passwd", "/../../etc/passwd", "subdir/../.."] {
            assert!(
                matches!(resolve_path(&root, escape), Err(FileServerError::PathTraversal)),
                "{escape} should be rejected"
            );
        }

        // Rejected even though it would stay inside the root.
        assert!(matches!(
            resolve_path(&root, "a/../b"),
            Err(FileServerError::PathTraversal)
        ));
    }

    #[test]
    fn test_resolve_path_rejects_null_bytes() {
        let root = PathBuf::from("/srv/root");
        assert!(matches!(
            resolve_path(&root, "file\0.txt"),
            Err(FileServerError::PathTraversal)
        ));
    }

    #[test]
    fn test_resolve_and_verify_path_with_real_fs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();

        std::fs::create_dir_all(root.join("subdir")).unwrap();
        std::fs::write(root.join("subdir/test.txt"), "test").unwrap();

        assert_eq!(
            resolve_and_verify_path(&root, "subdir/test.txt").unwrap(),
            root.join("subdir/test.txt")
        );

        // Missing targets resolve so they can be created.
        assert_eq!(
            resolve_and_verify_path(&root, "new/deeper/file.txt").unwrap(),
            root.join("new/deeper/file.txt")
        );

        assert!(matches!(
            resolve_and_verify_path(&root, "../../etc/passwd"),
            Err(FileServerError::PathTraversal)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_and_verify_path_detects_symlink_escape() {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let outside_dir = TempDir::new().unwrap();
        std::fs::write(outside_dir.path().join("secret.txt"), "secret data").unwrap();
        symlink(outside_dir.path(), root.join("escape")).unwrap();

        assert!(matches!(
            resolve_and_verify_path(&root, "escape/secret.txt"),
            Err(FileServerError::PathTraversal)
        ));
        // Not yet existing target below an escaping symlink.
        assert!(matches!(
            resolve_and_verify_path(&root, "escape/new/file.txt"),
            Err(FileServerError::PathTraversal)
        ));

        symlink(outside_dir.path().join("missing.txt"), root.join("dangling")).unwrap();
        assert!(resolve_and_verify_path(&root, "dangling").is_err());
    }
}
