//! Directory-backed asset sink.

use blobwire_core::AssetSink;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Writes every completed asset into one directory
pub struct DirectorySink {
    dir: PathBuf,
    written: Mutex<Vec<PathBuf>>,
}

impl DirectorySink {
    /// Create the sink, creating `dir` if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            written: Mutex::new(Vec::new()),
        })
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files written so far, in completion order
    pub fn written(&self) -> Vec<PathBuf> {
        self.written
            .lock()
            .map(|paths| paths.clone())
            .unwrap_or_default()
    }

    fn write(&self, file_name: &str, bytes: &[u8]) {
        let path = self.dir.join(file_name);
        match fs::write(&path, bytes) {
            Ok(()) => {
                tracing::info!(path = %path.display(), bytes = bytes.len(), "asset written");
                if let Ok(mut paths) = self.written.lock() {
                    paths.push(path);
                }
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to write asset");
            }
        }
    }
}

impl AssetSink for DirectorySink {
    fn on_image_ready(&self, asset_key: &str, bytes: Vec<u8>) {
        self.write(&format!("{}.bin", sanitize_key(asset_key)), &bytes);
    }

    fn on_video_ready(&self, asset_key: &str, mime_type: &str, bytes: Vec<u8>) {
        let name = format!("{}.{}", sanitize_key(asset_key), extension_for(mime_type));
        self.write(&name, &bytes);
    }

    fn on_nothing_to_save(&self, recording_id: &str, asset_key: &str) {
        tracing::warn!(recording_id, asset_key, "recording had no complete blobs");
    }
}

/// Reduce an asset key to a safe file name
#[must_use]
pub fn sanitize_key(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "asset".to_string()
    } else {
        trimmed.to_string()
    }
}

/// File extension for a video container MIME type
#[must_use]
pub fn extension_for(mime_type: &str) -> &'static str {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "video/webm" => "webm",
        "video/mp4" => "mp4",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("cam-front_1"), "cam-front_1");
        assert_eq!(sanitize_key("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize_key("a b/c"), "a_b_c");
        assert_eq!(sanitize_key("..."), "asset");
        assert_eq!(sanitize_key(""), "asset");
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("video/webm"), "webm");
        assert_eq!(extension_for("video/webm;codecs=vp9"), "webm");
        assert_eq!(extension_for("VIDEO/MP4"), "mp4");
        assert_eq!(extension_for("video/quicktime"), "bin");
    }

    #[test]
    fn test_writes_assets() {
        let dir = TempDir::new().unwrap();
        let sink = DirectorySink::new(dir.path().join("out")).unwrap();

        sink.on_image_ready("cam/1", vec![1, 2, 3]);
        sink.on_video_ready("rear", "video/webm", vec![9; 10]);
        sink.on_nothing_to_save("rec", "side");

        let written = sink.written();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], sink.dir().join("cam_1.bin"));
        assert_eq!(fs::read(&written[0]).unwrap(), vec![1, 2, 3]);
        assert_eq!(written[1], sink.dir().join("rear.webm"));
        assert_eq!(fs::read(&written[1]).unwrap().len(), 10);
    }
}
