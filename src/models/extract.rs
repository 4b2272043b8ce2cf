//! Archive extractor: bzip2-wrapped tar into a per-language directory.
//!
//! Archives are packed with one redundant top-level directory
//! (`kokoro-en-v0_19/model.onnx`), which is flattened away after unpacking so
//! the language directory holds the model files directly.

use crate::error::{PipelineError, Result};
use std::fs;
use std::io::{self, BufReader};
use std::path::{Component, Path};
use tracing::{debug, info, warn};

/// Unpack `archive` into `destination`, replacing anything already there.
///
/// Steps: remove any existing destination, create it fresh, bzip2-decode the
/// stream, unpack each tar entry (creating intermediate directories), then
/// flatten one level of single-directory nesting.
///
/// On failure the destination directory is removed, so a partially extracted
/// model is never mistaken for a downloaded one.
///
/// # Errors
///
/// Returns [`PipelineError::Extract`] on decompression, container or
/// filesystem errors.
pub fn extract(archive: &Path, destination: &Path) -> Result<()> {
    info!(
        "extracting {} into {}",
        archive.display(),
        destination.display()
    );
    match extract_inner(archive, destination) {
        Ok(entries) => {
            info!(entries, "extraction complete: {}", destination.display());
            Ok(())
        }
        Err(e) => {
            warn!("extraction failed, removing {}: {e}", destination.display());
            if let Err(cleanup) = fs::remove_dir_all(destination)
                && cleanup.kind() != io::ErrorKind::NotFound
            {
                warn!("failed to remove {}: {cleanup}", destination.display());
            }
            Err(e)
        }
    }
}

fn extract_inner(archive: &Path, destination: &Path) -> Result<usize> {
    let extract_err = |what: &str, e: io::Error| PipelineError::Extract(format!("{what}: {e}"));

    if destination.exists() {
        fs::remove_dir_all(destination)
            .map_err(|e| extract_err("cannot clear destination", e))?;
    }
    fs::create_dir_all(destination).map_err(|e| extract_err("cannot create destination", e))?;

    let file = fs::File::open(archive).map_err(|e| extract_err("cannot open archive", e))?;
    let decoder = bzip2::read::BzDecoder::new(BufReader::new(file));
    let mut container = tar::Archive::new(decoder);

    let mut count = 0usize;
    let entries = container
        .entries()
        .map_err(|e| extract_err("corrupt archive", e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| extract_err("corrupt archive entry", e))?;
        let name = entry
            .path()
            .map_err(|e| extract_err("invalid entry path", e))?
            .into_owned();
        if !is_safe_entry_path(&name) {
            return Err(PipelineError::Extract(format!(
                "entry escapes destination: {}",
                name.display()
            )));
        }
        let unpacked = entry
            .unpack_in(destination)
            .map_err(|e| extract_err(&format!("cannot write {}", name.display()), e))?;
        if unpacked {
            count += 1;
        }
    }

    if count == 0 {
        return Err(PipelineError::Extract("archive contained no entries".into()));
    }

    if flatten_single_child(destination)
        .map_err(|e| extract_err("cannot flatten archive layout", e))?
    {
        debug!("flattened nested directory in {}", destination.display());
    }
    Ok(count)
}

/// Reject absolute paths and parent-directory components.
fn is_safe_entry_path(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// If `dir` contains exactly one child and it is a directory, move that
/// child's contents up into `dir` and remove it.
///
/// Only one level is flattened. Returns `true` if the layout changed.
///
/// # Errors
///
/// Returns any I/O error from listing, renaming or removing entries.
pub fn flatten_single_child(dir: &Path) -> io::Result<bool> {
    let mut children = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    if children.len() != 1 {
        return Ok(false);
    }
    let child = children.remove(0);
    if !child.file_type()?.is_dir() {
        return Ok(false);
    }

    // Move the child aside first so an inner entry with the same name as the
    // child (e.g. `dict/dict/`) can be moved up without colliding.
    let staging = dir.join(format!(".flatten-{}", child.file_name().to_string_lossy()));
    fs::rename(child.path(), &staging)?;

    for entry in fs::read_dir(&staging)? {
        let entry = entry?;
        fs::rename(entry.path(), dir.join(entry.file_name()))?;
    }
    fs::remove_dir(&staging)?;
    Ok(true)
}
