//! Code packaging.
//!
//! Zips a script file or project directory with deterministic entry
//! ordering and uploads it to the object store under a fresh key, so
//! every dispatch and every schedule gets its own immutable bundle.

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use skyrun_types::{Error, PackagedArtifact, Result};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::provider::ObjectStore;
use crate::retry::with_transient_retries;

/// Directory names never included in a bundle.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[".git", "target", ".venv", "venv", "__pycache__"];
/// File patterns never included in a bundle.
pub const DEFAULT_EXCLUDED_PATTERNS: &[&str] = &["*.pyc"];

const MAX_UPLOAD_ATTEMPTS: u32 = 3;

/// Packages local code and uploads it.
pub struct CodePackager {
    objects: Arc<dyn ObjectStore>,
}

impl CodePackager {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    /// Build the archive for `path` and upload it under
    /// `{key_prefix}/{uuid}.zip`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when `path` does not exist (checked before
    /// any upload); transient upload failures are retried up to 3
    /// times, then surfaced.
    pub async fn package_and_upload(
        &self,
        path: &Path,
        bucket: &str,
        key_prefix: &str,
        extra_excludes: &[String],
    ) -> Result<PackagedArtifact> {
        let archive = build_archive(path, extra_excludes)?;
        let key = format!("{}/{}.zip", key_prefix.trim_end_matches('/'), Uuid::new_v4());
        let size_bytes = archive.len() as u64;

        tracing::debug!(
            path = %path.display(),
            bucket,
            key = %key,
            size_bytes,
            "uploading code bundle"
        );
        with_transient_retries(MAX_UPLOAD_ATTEMPTS, || {
            self.objects.put_object(bucket, &key, archive.clone())
        })
        .await?;

        Ok(PackagedArtifact {
            local_path: path.to_path_buf(),
            bucket: bucket.to_string(),
            key,
            size_bytes,
        })
    }
}

/// Build the zip archive in memory.
///
/// A file becomes a single-entry archive named after the file. A
/// directory is walked in sorted order so the same tree always yields
/// the same entry sequence.
///
/// # Errors
///
/// [`Error::NotFound`] when `path` does not exist.
pub fn build_archive(path: &Path, extra_excludes: &[String]) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(Error::NotFound(format!("path '{}' does not exist", path.display())));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    if path.is_file() {
        let name = path
            .file_name()
            .ok_or_else(|| Error::Package(format!("path '{}' has no file name", path.display())))?
            .to_string_lossy()
            .into_owned();
        let data = std::fs::read(path)?;
        writer.start_file(name, options).map_err(zip_err)?;
        writer.write_all(&data)?;
    } else {
        let mut entries = Vec::new();
        collect_entries(path, String::new(), extra_excludes, &mut entries)?;
        for (name, source) in entries {
            let data = std::fs::read(&source)?;
            writer.start_file(name, options).map_err(zip_err)?;
            writer.write_all(&data)?;
        }
    }

    Ok(writer.finish().map_err(zip_err)?.into_inner())
}

/// Depth-first sorted walk, skipping excluded names.
fn collect_entries(
    dir: &Path,
    prefix: String,
    extra_excludes: &[String],
    out: &mut Vec<(String, std::path::PathBuf)>,
) -> Result<()> {
    let mut children: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    children.sort_by_key(std::fs::DirEntry::file_name);

    for child in children {
        let name = child.file_name().to_string_lossy().into_owned();
        if is_excluded(&name, extra_excludes) {
            continue;
        }
        let rel = if prefix.is_empty() { name } else { format!("{}/{}", prefix, name) };
        let path = child.path();
        if path.is_dir() {
            collect_entries(&path, rel, extra_excludes, out)?;
        } else {
            out.push((rel, path));
        }
    }
    Ok(())
}

fn is_excluded(name: &str, extra_excludes: &[String]) -> bool {
    if name.starts_with('.') {
        return true;
    }
    if DEFAULT_EXCLUDED_DIRS.contains(&name) {
        return true;
    }
    let matches_pattern = |pattern: &str| {
        pattern
            .strip_prefix('*')
            .map_or(pattern == name, |suffix| name.ends_with(suffix))
    };
    DEFAULT_EXCLUDED_PATTERNS.iter().any(|p| matches_pattern(p))
        || extra_excludes.iter().any(|p| matches_pattern(p))
}

fn zip_err(e: zip::result::ZipError) -> Error {
    Error::Package(e.to_string())
}
