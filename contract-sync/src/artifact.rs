//! Generated client trees: digest, staging cleanup, promotion.
//!
//! ## Promotion protocol
//!
//! 1. Remove any leftover `.<name>.previous`.
//! 2. Rename the live output (if any) to `.<name>.previous`.
//! 3. Rename `.<name>.staging` to the live output path.
//! 4. Delete `.<name>.previous`.
//!
//! If step 3 fails the previous output is renamed back, so the live path
//! always holds one complete tree.

use std::fs::File;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use contract_sync_core::paths;
use contract_sync_core::types::{ArtifactRef, Fingerprint};

use crate::error::{generation_io, GenerationError};

/// Count files and compute the tree digest of `root`.
///
/// The digest covers relative paths (with `/` separators) and file contents,
/// visited in sorted order, so it is independent of directory iteration order.
/// Files are streamed into the hasher one at a time.
pub fn describe(root: &Path) -> Result<ArtifactRef, GenerationError> {
    let mut entries = Vec::new();
    collect(root, root, &mut entries)?;
    entries.sort_by(|a, b| a.relative.cmp(&b.relative));

    let mut h = Sha256::new();
    for entry in &entries {
        h.update(entry.relative.as_bytes());
        h.update([0u8]);
        let len = match &entry.link_target {
            Some(target) => {
                let content = format!("symlink:{}", target.display());
                h.update(content.as_bytes());
                content.len() as u64
            }
            None => {
                let mut file =
                    File::open(&entry.path).map_err(|e| generation_io(&entry.path, e))?;
                io::copy(&mut file, &mut h).map_err(|e| generation_io(&entry.path, e))?
            }
        };
        h.update(len.to_le_bytes());
    }

    Ok(ArtifactRef {
        path: root.to_path_buf(),
        files: entries.len(),
        digest: Fingerprint(hex::encode(h.finalize())),
    })
}

struct TreeEntry {
    relative: String,
    path: PathBuf,
    link_target: Option<PathBuf>,
}

fn collect(root: &Path, path: &Path, out: &mut Vec<TreeEntry>) -> Result<(), GenerationError> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| generation_io(path, e))?;
    let file_type = meta.file_type();

    if file_type.is_dir() {
        for entry in std::fs::read_dir(path).map_err(|e| generation_io(path, e))? {
            let entry = entry.map_err(|e| generation_io(path, e))?;
            collect(root, &entry.path(), out)?;
        }
        return Ok(());
    }

    let relative = path
        .strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");

    let link_target = if file_type.is_symlink() {
        Some(std::fs::read_link(path).map_err(|e| generation_io(path, e))?)
    } else {
        None
    };
    out.push(TreeEntry {
        relative,
        path: path.to_path_buf(),
        link_target,
    });
    Ok(())
}

/// Empty staging location for `output`, creating its parent.
pub(crate) fn prepare_staging(output: &Path) -> Result<PathBuf, GenerationError> {
    let staging = paths::staging_path(output);
    remove_path(&staging).map_err(|e| generation_io(&staging, e))?;
    if let Some(parent) = staging.parent() {
        std::fs::create_dir_all(parent).map_err(|e| generation_io(parent, e))?;
    }
    Ok(staging)
}

/// `true` if `path` exists and, when a directory, has at least one entry.
pub(crate) fn has_content(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::read_dir(path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false),
        Ok(_) => true,
        Err(_) => false,
    }
}

/// Best-effort removal of a staged or aside tree.
pub(crate) fn discard(path: &Path) {
    match remove_path(path) {
        Ok(()) => tracing::debug!("discarded {}", path.display()),
        Err(err) => tracing::warn!("could not discard {}: {err}", path.display()),
    }
}

/// Replace `output` with `staging`.
pub(crate) fn promote(staging: &Path, output: &Path) -> Result<(), GenerationError> {
    let previous = paths::previous_path(output);
    remove_path(&previous).map_err(|e| generation_io(&previous, e))?;

    let had_output = std::fs::symlink_metadata(output).is_ok();
    if had_output {
        std::fs::rename(output, &previous).map_err(|e| generation_io(output, e))?;
    }

    if let Err(err) = std::fs::rename(staging, output) {
        if had_output {
            if let Err(restore) = std::fs::rename(&previous, output) {
                tracing::error!(
                    "could not restore {} from {}: {restore}",
                    output.display(),
                    previous.display()
                );
            }
        }
        return Err(generation_io(output, err));
    }

    if had_output {
        discard(&previous);
    }
    tracing::info!("promoted {} -> {}", staging.display(), output.display());
    Ok(())
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_tree(root: &Path, files: &[(&str, &str)]) {
        for (rel, content) in files {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
    }

    #[test]
    fn digest_ignores_creation_order() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        write_tree(&a, &[("pkg/models.py", "M"), ("pkg/api.py", "A")]);
        write_tree(&b, &[("pkg/api.py", "A"), ("pkg/models.py", "M")]);

        let da = describe(&a).unwrap();
        let db = describe(&b).unwrap();
        assert_eq!(da.files, 2);
        assert_eq!(da.digest, db.digest);
    }

    #[test]
    fn digest_changes_with_content_or_layout() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("base");
        let edited = tmp.path().join("edited");
        let moved = tmp.path().join("moved");
        write_tree(&base, &[("pkg/api.py", "A")]);
        write_tree(&edited, &[("pkg/api.py", "A2")]);
        write_tree(&moved, &[("api.py", "A")]);

        let d = describe(&base).unwrap().digest;
        assert_ne!(d, describe(&edited).unwrap().digest);
        assert_ne!(d, describe(&moved).unwrap().digest);
    }

    #[test]
    fn digest_frames_path_content_and_length() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("api.py", "A")]);

        let mut h = Sha256::new();
        h.update(b"api.py\0A");
        h.update(1u64.to_le_bytes());
        assert_eq!(describe(tmp.path()).unwrap().digest.0, hex::encode(h.finalize()));
    }

    #[test]
    fn large_files_are_hashed_to_the_last_byte() {
        let tmp = TempDir::new().unwrap();
        let mut body = "x".repeat(256 * 1024);
        write_tree(tmp.path(), &[("models.py", &body)]);
        let before = describe(tmp.path()).unwrap().digest;

        body.pop();
        body.push('y');
        write_tree(tmp.path(), &[("models.py", &body)]);
        assert_ne!(before, describe(tmp.path()).unwrap().digest);
    }

    #[test]
    fn promote_replaces_existing_output() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("client");
        write_tree(&output, &[("old.py", "old")]);
        let staging = prepare_staging(&output).unwrap();
        write_tree(&staging, &[("new.py", "new")]);

        promote(&staging, &output).unwrap();

        assert!(output.join("new.py").exists());
        assert!(!output.join("old.py").exists());
        assert!(!staging.exists());
        assert!(!paths::previous_path(&output).exists());
    }

    #[test]
    fn promote_into_fresh_location() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("nested").join("client");
        let staging = prepare_staging(&output).unwrap();
        write_tree(&staging, &[("api.py", "A")]);
        promote(&staging, &output).unwrap();
        assert_eq!(fs::read_to_string(output.join("api.py")).unwrap(), "A");
    }

    #[test]
    fn failed_promotion_restores_previous_output() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("client");
        write_tree(&output, &[("old.py", "old")]);
        let staging = paths::staging_path(&output);

        // Staging was never created, so the swap-in rename fails.
        let err = promote(&staging, &output).unwrap_err();
        assert!(matches!(err, GenerationError::Io { .. }));
        assert_eq!(fs::read_to_string(output.join("old.py")).unwrap(), "old");
    }

    #[test]
    fn prepare_staging_wipes_leftovers() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("client");
        let staging = paths::staging_path(&output);
        write_tree(&staging, &[("half-written.py", "x")]);
        let staging = prepare_staging(&output).unwrap();
        assert!(!staging.exists());
        assert!(!has_content(&staging));
    }
}
