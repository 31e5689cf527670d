//! Path utilities
//!
//! Cache directory layout, lexical normalization and collision-free naming.

use std::path::{Component, Path, PathBuf};

/// Get the .reel cache directory for a given project root
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(".reel")
}

/// Join `path` onto `base` unless it is already absolute, then fold `.`/`..` lexically
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Check whether `path` lives under `dir`
///
/// Symlinks are resolved when both sides exist; otherwise the comparison is lexical.
pub fn is_within(path: &Path, dir: &Path) -> bool {
    match (path.canonicalize(), dir.canonicalize()) {
        (Ok(p), Ok(d)) => p.starts_with(d),
        _ => path.starts_with(dir),
    }
}

/// First path of the form `stem-N.ext` (N = 1, 2, ...) for which `taken` is false
///
/// Returns `path` unchanged when it is not taken.
pub fn dedup_path(path: &Path, taken: impl Fn(&Path) -> bool) -> PathBuf {
    if !taken(path) {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n: u32 = 1;
    loop {
        let candidate = parent.join(format!("{}-{}{}", stem, n, ext));
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_dir() {
        let root = Path::new("/project");
        assert_eq!(cache_dir(root), PathBuf::from("/project/.reel"));
    }

    #[test]
    fn test_absolutize_relative_and_dots() {
        let base = Path::new("/project/sub");
        assert_eq!(
            absolutize(base, Path::new("../clips/./a.mp4")),
            PathBuf::from("/project/clips/a.mp4")
        );
        assert_eq!(
            absolutize(base, Path::new("/abs/b.mp4")),
            PathBuf::from("/abs/b.mp4")
        );
    }

    #[test]
    fn test_is_within() {
        let temp = tempfile::tempdir().unwrap();
        let sub = temp.path().join("media");
        std::fs::create_dir(&sub).unwrap();
        let file = sub.join("a.mp4");
        std::fs::write(&file, "x").unwrap();

        assert!(is_within(&file, temp.path()));
        assert!(!is_within(&file, &temp.path().join("other")));
        assert!(is_within(Path::new("/lib/media/x.mp4"), Path::new("/lib/media")));
    }

    #[test]
    fn test_dedup_path() {
        let taken = |p: &Path| {
            let name = p.file_name().unwrap().to_string_lossy().to_string();
            name == "video.mp4" || name == "video-1.mp4"
        };
        assert_eq!(
            dedup_path(Path::new("/t/video.mp4"), taken),
            PathBuf::from("/t/video-2.mp4")
        );
        assert_eq!(
            dedup_path(Path::new("/t/other.mp4"), taken),
            PathBuf::from("/t/other.mp4")
        );
    }

    #[test]
    fn test_dedup_path_without_extension() {
        let taken = |p: &Path| p == Path::new("/t/README");
        assert_eq!(
            dedup_path(Path::new("/t/README"), taken),
            PathBuf::from("/t/README-1")
        );
    }
}
