use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub key: String,
}

/// Lists every regular file under `root` in file-name order, together with
/// the object key it is uploaded to.
pub fn scan_dir(root: &Path, prefix: &str) -> Result<Vec<ScannedFile>> {
    if !root.is_dir() {
        bail!("source `{}` is not a directory", root.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk `{}`", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("`{}` escapes the source", entry.path().display()))?;
        files.push(ScannedFile {
            key: object_key(prefix, relative),
            path: entry.into_path(),
        });
    }
    Ok(files)
}

fn object_key(prefix: &str, relative: &Path) -> String {
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    match prefix.trim_matches('/') {
        "" => relative,
        prefix => format!("{prefix}/{relative}"),
    }
}
