//! Input discovery.

use fishcut_core::{FishcutError, Result, VIDEO_EXTENSIONS};
use std::path::{Path, PathBuf};

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Videos directly inside `dir` (not recursive), sorted by path.
///
/// A path to a single video file returns just that file.
pub fn collect_videos(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if dir.is_file() {
        return if is_video(dir) {
            Ok(vec![dir.to_path_buf()])
        } else {
            Err(FishcutError::InvalidParameter(format!(
                "Not a supported video file: {}",
                dir.display()
            )))
        };
    }
    if !dir.is_dir() {
        return Err(FishcutError::NotFound(format!(
            "Input folder not found: {}",
            dir.display()
        )));
    }

    let mut videos = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_video(&path) {
            videos.push(path);
        }
    }
    videos.sort();
    Ok(videos)
}
