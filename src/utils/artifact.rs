//! Artifact handling: glob resolution, archive pack/unpack, and path
//! cleanup shared by build and release steps.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::log_status;

/// Resolve a potentially glob-patterned artifact path to an actual file.
///
/// - If path contains no glob chars (`*`, `?`, `[`, `]`), returns it unchanged after existence check
/// - If path is a glob, expands and returns most recently modified match
/// - Returns error if no files match or path doesn't exist
pub fn resolve_artifact_path(pattern: &str) -> Result<PathBuf> {
    if !contains_glob_chars(pattern) {
        let path = PathBuf::from(pattern);
        if path.exists() {
            return Ok(path);
        }
        return Err(Error::config_invalid_value(
            "artifacts",
            format!("Artifact not found: {pattern}"),
        ));
    }

    let entries: Vec<PathBuf> = glob_matches(pattern)?;
    if entries.is_empty() {
        return Err(Error::config_invalid_value(
            "artifacts",
            format!("No files match pattern: {pattern}"),
        ));
    }

    let newest = entries
        .into_iter()
        .max_by_key(|p| p.metadata().and_then(|m| m.modified()).ok());

    match newest {
        Some(path) => {
            log_status!("Resolved '{}' -> '{}'", pattern, path.display());
            Ok(path)
        }
        None => Err(Error::config_invalid_value(
            "artifacts",
            format!("No files match pattern: {pattern}"),
        )),
    }
}

/// All plain files matching a glob pattern, in glob order.
pub fn glob_matches(pattern: &str) -> Result<Vec<PathBuf>> {
    Ok(glob::glob(pattern)
        .map_err(|e| {
            Error::config_invalid_value(
                "artifacts",
                format!("Invalid glob pattern '{pattern}': {e}"),
            )
        })?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect())
}

fn contains_glob_chars(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[') || s.contains(']')
}

// === Archives ===

/// Pack a directory recursively into a zip archive.
pub fn pack(source_dir: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::create(dest)?;
    let mut writer = zip::ZipWriter::new(file);
    add_dir_entries(&mut writer, source_dir, source_dir)?;
    writer
        .finish()
        .map_err(|e| Error::internal_io(format!("Failed to finish archive: {e}"), None))?;
    Ok(())
}

fn add_dir_entries(
    writer: &mut zip::ZipWriter<fs::File>,
    root: &Path,
    dir: &Path,
) -> Result<()> {
    let options = zip::write::FileOptions::default();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = path
            .strip_prefix(root)
            .map_err(|e| Error::internal_io(format!("Failed to pack {}: {e}", path.display()), None))?
            .to_string_lossy()
            .replace('\\', "/");
        if path.is_dir() {
            writer
                .add_directory(&name, options)
                .map_err(|e| Error::internal_io(format!("Failed to pack {name}: {e}"), None))?;
            add_dir_entries(writer, root, &path)?;
        } else {
            writer
                .start_file(&name, options)
                .map_err(|e| Error::internal_io(format!("Failed to pack {name}: {e}"), None))?;
            let mut source = fs::File::open(&path)?;
            std::io::copy(&mut source, writer)?;
        }
    }
    Ok(())
}

/// Unpack a zip archive into a directory, creating it as needed.
pub fn unpack(archive: &Path, dest_dir: &Path) -> Result<()> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| Error::internal_io(format!("Failed to open archive: {e}"), None))?;
    fs::create_dir_all(dest_dir)?;
    zip.extract(dest_dir)
        .map_err(|e| Error::internal_io(format!("Failed to unpack archive: {e}"), None))?;
    Ok(())
}

// === Paths ===

/// Copy a file into a directory (created as needed), keeping its name.
pub fn copy_into(source: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let name = source.file_name().ok_or_else(|| {
        Error::internal_io(format!("Invalid artifact path: {}", source.display()), None)
    })?;
    fs::create_dir_all(dest_dir)?;
    let dest = dest_dir.join(name);
    fs::copy(source, &dest)?;
    Ok(dest)
}

/// Copy a file or directory tree to an explicit destination path.
pub fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
    if source.is_dir() {
        fs::create_dir_all(dest)?;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else {
        fs::copy(source, dest)?;
    }
    Ok(())
}

/// Remove a file or directory tree; missing paths are fine.
pub fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else if path.is_file() || path.is_symlink() {
        fs::remove_file(path)?;
    }
    Ok(())
}
