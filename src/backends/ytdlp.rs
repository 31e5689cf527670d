//! yt-dlp integration
//!
//! The downloader writes to `<dest_dir>/<base>.%(ext)s` and reports the final
//! path (after any merge/remux) through a marker file, since the extension is
//! only known once the download finishes. The remote content id, when the
//! extractor exposes one, is reported through a second marker.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::backends::exec::{run_tool, ExecContext, ToolCommand, ToolLog};
use crate::cache::fetch::{Downloader, Fetched};
use crate::core::error::{ReelError, Result};
use crate::core::util::{get_file_size, is_regular_file};

/// Downloader backed by a yt-dlp-compatible executable
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
}

impl YtDlp {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, url: &str, template: &Path, path_marker: &Path, id_marker: &Path) -> ToolCommand {
        ToolCommand::new(&self.program)
            // download() only runs on a miss or a forced refetch; never reuse a file at the template path
            .args(["--no-progress", "--no-playlist", "--no-part", "--force-overwrites"])
            .arg("-o")
            .arg(template.to_string_lossy())
            .arg("--print-to-file")
            .arg("after_move:filepath")
            .arg(path_marker.to_string_lossy())
            .arg("--print-to-file")
            .arg("id")
            .arg(id_marker.to_string_lossy())
            .arg(url)
    }

    fn fail(&self, message: impl Into<String>, log: &ToolLog) -> ReelError {
        let message = message.into();
        log.note(&message);
        ReelError::tool(&self.program, message, Some(log.path().to_path_buf()))
    }
}

/// First non-empty line of a marker file
fn read_marker(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().and_then(|content| {
        content
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
    })
}

impl Downloader for YtDlp {
    fn download(
        &self,
        ctx: &ExecContext,
        url: &str,
        dest_dir: &Path,
        base_name: &str,
        log: &ToolLog,
    ) -> Result<Fetched> {
        fs::create_dir_all(dest_dir)?;

        let template = dest_dir.join(format!("{}.%(ext)s", base_name));
        let path_marker = dest_dir.join(format!(".{}.path", base_name));
        let id_marker = dest_dir.join(format!(".{}.id", base_name));
        for marker in [&path_marker, &id_marker] {
            let _ = fs::remove_file(marker);
        }

        let command = self.command(url, &template, &path_marker, &id_marker);
        let result = run_tool(ctx, "download", &command, Some(log))
            .and_then(|output| output.require_success(&self.program, Some(log)));

        let reported = read_marker(&path_marker);
        let remote_id = read_marker(&id_marker);
        for marker in [&path_marker, &id_marker] {
            let _ = fs::remove_file(marker);
        }
        result?;

        let reported = reported
            .ok_or_else(|| self.fail("downloader did not report an output path", log))?;
        let path = PathBuf::from(&reported);
        let path = if path.is_absolute() { path } else { dest_dir.join(path) };
        if !is_regular_file(&path) {
            return Err(self.fail(
                format!("reported output {} does not exist", path.display()),
                log,
            ));
        }

        let size_bytes = get_file_size(&path)?;
        debug!(url, path = %path.display(), size_bytes, "download complete");

        let mut notes = vec![format!("downloaded with {}", self.program)];
        if let Some(id) = &remote_id {
            notes.push(format!("remote id: {}", id));
        }

        Ok(Fetched {
            path,
            size_bytes,
            remote_id,
            notes,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let script = dir.join("fake-dl");
        fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    // Arguments: 1-4 flags, 5 -o, 6 template, 7 --print-to-file, 8 when, 9 marker,
    // 10 --print-to-file, 11 id, 12 id marker, 13 url
    const FAKE_OK: &str = r#"
out=$(echo "$6" | sed 's/%(ext)s/mp4/')
printf 'video-bytes' > "$out"
echo "$out" > "$9"
echo "abc123" > "${12}"
"#;

    // Behaves like yt-dlp: an existing file is kept unless overwrites are forced
    const FAKE_SKIPS_EXISTING: &str = r#"
out=$(echo "$6" | sed 's/%(ext)s/mp4/')
case " $* " in
  *" --force-overwrites "*) printf 'fresh-bytes' > "$out" ;;
  *) [ -f "$out" ] || printf 'fresh-bytes' > "$out" ;;
esac
echo "$out" > "$9"
"#;

    #[test]
    fn test_download_reads_markers() {
        let temp = tempdir().unwrap();
        let script = write_script(temp.path(), FAKE_OK);
        let media = temp.path().join("media");
        let log = ToolLog::create(&temp.path().join("dl.log"), "row").unwrap();

        let fetched = YtDlp::new(script.to_string_lossy())
            .download(&ExecContext::default(), "https://example.com/v", &media, "k1", &log)
            .unwrap();

        assert_eq!(fetched.path, media.join("k1.mp4"));
        assert_eq!(fetched.size_bytes, 11);
        assert_eq!(fetched.remote_id.as_deref(), Some("abc123"));
        assert!(fetched.notes.iter().any(|n| n.contains("abc123")));
        assert!(!media.join(".k1.path").exists());
    }

    #[test]
    fn test_download_overwrites_existing_file() {
        let temp = tempdir().unwrap();
        let script = write_script(temp.path(), FAKE_SKIPS_EXISTING);
        let media = temp.path().join("media");
        fs::create_dir_all(&media).unwrap();
        fs::write(media.join("k1.mp4"), "old").unwrap();
        let log = ToolLog::create(&temp.path().join("dl.log"), "row").unwrap();

        let fetched = YtDlp::new(script.to_string_lossy())
            .download(&ExecContext::default(), "https://example.com/v", &media, "k1", &log)
            .unwrap();

        assert_eq!(fs::read_to_string(&fetched.path).unwrap(), "fresh-bytes");
        assert_eq!(fetched.size_bytes, 11);
    }

    #[test]
    fn test_download_without_marker_is_tool_error() {
        let temp = tempdir().unwrap();
        let script = write_script(temp.path(), "exit 0");
        let log = ToolLog::create(&temp.path().join("dl.log"), "row").unwrap();

        let err = YtDlp::new(script.to_string_lossy())
            .download(&ExecContext::default(), "https://example.com/v", temp.path(), "k1", &log)
            .unwrap_err();
        assert!(matches!(err, ReelError::ToolExecution { log: Some(_), .. }));
        let content = fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("did not report an output path"));
    }

    #[test]
    fn test_download_non_zero_exit_is_tool_error() {
        let temp = tempdir().unwrap();
        let script = write_script(temp.path(), "echo 'ERROR: unavailable' >&2; exit 1");
        let log = ToolLog::create(&temp.path().join("dl.log"), "row").unwrap();

        let err = YtDlp::new(script.to_string_lossy())
            .download(&ExecContext::default(), "https://example.com/v", temp.path(), "k1", &log)
            .unwrap_err();
        assert!(err.to_string().contains("unavailable"));
    }
}
