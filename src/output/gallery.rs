use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::output::encoder::MediaGallery;

/// [`MediaGallery`] that files captures under `<root>/<folder>/<name>`.
#[derive(Debug, Clone)]
pub struct DirectoryGallery {
    root: PathBuf,
}

impl DirectoryGallery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn destination(&self, display_name: &str, folder: &str) -> Result<PathBuf> {
        let dir = self.root.join(folder);
        fs::create_dir_all(&dir)?;
        Ok(dir.join(display_name))
    }
}

impl MediaGallery for DirectoryGallery {
    fn insert_video(&self, path: &Path, display_name: &str, folder: &str) -> Result<()> {
        let dest = self.destination(display_name, folder)?;
        let bytes = fs::copy(path, &dest)?;
        info!(dest = %dest.display(), bytes, "Video added to gallery");
        Ok(())
    }

    fn insert_image(&self, bytes: &[u8], display_name: &str, folder: &str) -> Result<()> {
        let dest = self.destination(display_name, folder)?;
        fs::write(&dest, bytes)?;
        info!(dest = %dest.display(), bytes = bytes.len(), "Image added to gallery");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_land_in_folder() {
        let dir = tempfile::tempdir().expect("tempdir should succeed");
        let gallery = DirectoryGallery::new(dir.path().join("gallery"));

        gallery
            .insert_image(b"png", "shot.png", "MixedReality")
            .expect("insert should succeed");

        let source = dir.path().join("clip.y4m");
        fs::write(&source, b"YUV4MPEG2").expect("write should succeed");
        gallery
            .insert_video(&source, "clip.y4m", "MixedReality")
            .expect("insert should succeed");

        let folder = dir.path().join("gallery/MixedReality");
        assert_eq!(fs::read(folder.join("shot.png")).expect("read"), b"png");
        assert_eq!(fs::read(folder.join("clip.y4m")).expect("read"), b"YUV4MPEG2");
    }
}
