//! Source classification - turns a raw reference into a canonical identifier
//!
//! `http`/`https` references are URLs and identify themselves. Anything else
//! is a local path resolved against the project root; its identifier is the
//! canonical absolute path, so different spellings of one file share an entry.

use std::path::{Path, PathBuf};

use crate::cache::index::SourceType;
use crate::core::error::{ReelError, Result};
use crate::core::util::{hash_bytes, HashAlgorithm};

/// A classified source reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub source_type: SourceType,
    pub identifier: String,
    /// Resolved absolute path for local sources
    pub local_path: Option<PathBuf>,
}

fn is_url(reference: &str) -> bool {
    let lower = reference.to_ascii_lowercase();
    ["http://", "https://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len())
}

/// Classify `raw` relative to `root`
pub fn classify(root: &Path, raw: &str) -> Result<Source> {
    let reference = raw.trim();
    if reference.is_empty() {
        return Err(ReelError::validation("empty source reference"));
    }

    if is_url(reference) {
        return Ok(Source {
            source_type: SourceType::Url,
            identifier: reference.to_string(),
            local_path: None,
        });
    }

    let candidate = {
        let p = Path::new(reference);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            root.join(p)
        }
    };

    let resolved = candidate.canonicalize().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ReelError::NotFound { path: candidate.clone() }
        } else {
            ReelError::Io(e)
        }
    })?;

    Ok(Source {
        source_type: SourceType::Local,
        identifier: resolved.to_string_lossy().to_string(),
        local_path: Some(resolved),
    })
}

/// Fixed-width key derived from an identifier, used for managed filenames and log names
pub fn identifier_key(identifier: &str) -> String {
    hash_bytes(identifier.as_bytes(), HashAlgorithm::Xxh3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_classify_url() {
        let source = classify(Path::new("/project"), "https://example.com/watch?v=abc").unwrap();
        assert_eq!(source.source_type, SourceType::Url);
        assert_eq!(source.identifier, "https://example.com/watch?v=abc");
        assert!(source.local_path.is_none());

        let source = classify(Path::new("/project"), "  HTTP://example.com/x ").unwrap();
        assert_eq!(source.identifier, "HTTP://example.com/x");
    }

    #[test]
    fn test_classify_empty_is_validation_error() {
        let err = classify(Path::new("/project"), "   ").unwrap_err();
        assert!(matches!(err, ReelError::Validation(_)));
    }

    #[test]
    fn test_classify_local_relative_and_absolute_share_identifier() {
        let temp = tempdir().unwrap();
        let root = temp.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("clips")).unwrap();
        std::fs::write(root.join("clips/a.mp4"), "x").unwrap();

        let rel = classify(&root, "clips/a.mp4").unwrap();
        let dotted = classify(&root, "./clips/../clips/a.mp4").unwrap();
        let abs = classify(&root, &root.join("clips/a.mp4").to_string_lossy()).unwrap();

        assert_eq!(rel.source_type, SourceType::Local);
        assert_eq!(rel.identifier, abs.identifier);
        assert_eq!(rel.identifier, dotted.identifier);
        assert!(Path::new(&rel.identifier).is_absolute());
    }

    #[test]
    fn test_classify_missing_local_is_not_found() {
        let temp = tempdir().unwrap();
        let err = classify(temp.path(), "nope.mp4").unwrap_err();
        assert!(matches!(err, ReelError::NotFound { .. }));
    }

    #[test]
    fn test_scheme_without_host_is_local() {
        let temp = tempdir().unwrap();
        let err = classify(temp.path(), "http://").unwrap_err();
        assert!(matches!(err, ReelError::NotFound { .. }));
    }

    #[test]
    fn test_identifier_key_is_stable_and_fixed_width() {
        let a = identifier_key("https://example.com/a");
        assert_eq!(a.len(), 16);
        assert_eq!(a, identifier_key("https://example.com/a"));
        assert_ne!(a, identifier_key("https://example.com/b"));
    }
}
