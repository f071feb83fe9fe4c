use crate::utils::title;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Download-state view over the directory the downloader writes games into.
///
/// Games land in folders named by the normalized title slug; a game counts as
/// downloaded when its folder exists.
pub struct Library {
    download_dir: PathBuf,
}

impl Library {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
        }
    }

    pub fn is_downloaded(&self, game_title: &str) -> bool {
        let folder = title::normalize_key(game_title);
        if folder.is_empty() {
            return false;
        }
        self.download_dir.join(folder).is_dir()
    }

    /// Slugs of every game folder currently present, sorted.
    pub fn downloaded_titles(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.download_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(
                    "Download directory {} not readable: {}",
                    self.download_dir.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut titles: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        titles.sort();
        titles
    }
}
