//! Directory-of-JSON-files cache backend

use super::traits::{ArtifactCache, OpenCache, StorageResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// One file per entry: `<dir>/<stage>-<fingerprint>.json`.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader never sees a half-written artifact.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, stage: &str, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{}-{}.json", sanitize(stage), sanitize(fingerprint)))
    }
}

/// Keep file names portable.
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl OpenCache for FileCache {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        fs::create_dir_all(path.as_ref())?;
        Ok(Self {
            dir: path.as_ref().to_path_buf(),
        })
    }
}

impl ArtifactCache for FileCache {
    fn name(&self) -> &'static str {
        "files"
    }

    fn load(&self, stage: &str, fingerprint: &str) -> StorageResult<Option<String>> {
        match fs::read_to_string(self.entry_path(stage, fingerprint)) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, stage: &str, fingerprint: &str, payload: &str) -> StorageResult<()> {
        let path = self.entry_path(stage, fingerprint);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn invalidate(&self, stage: &str, fingerprint: &str) -> StorageResult<bool> {
        match fs::remove_file(self.entry_path(stage, fingerprint)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
