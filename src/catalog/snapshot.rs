use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File names of one directory at one point in time, sorted by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirSnapshot {
    root: PathBuf,
    files: Vec<String>,
}

impl DirSnapshot {
    /// List the regular files of `root`. Names that are not valid UTF-8 are skipped.
    pub fn read(root: &Path) -> io::Result<Self> {
        let mut files = Vec::new();

        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                files.push(name.to_string());
            }
        }

        Ok(Self::from_names(root, files))
    }

    pub fn from_names<I, S>(root: impl Into<PathBuf>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut files: Vec<String> = names.into_iter().map(Into::into).collect();
        files.sort();
        DirSnapshot {
            root: root.into(),
            files,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.iter().any(|f| f == name)
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// Replace `path` with `contents` without ever exposing a half-written file.
///
/// The data goes to a hidden sibling first and is renamed into place, so a
/// failure leaves any previous file untouched.
pub fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    if let Err(e) = fs::write(&tmp_path, contents).and_then(|_| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}
