//! Indexing fetched GRIB files the way WPS `ungrib` expects them.

use crate::error::FetchError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Number of distinct `GRIBFILE.XYZ` names (26³).
pub const MAX_GRIB_FILES: usize = 26 * 26 * 26;

/// Returns the `index`-th link name: `GRIBFILE.AAA`, `GRIBFILE.AAB`, ...
pub fn grib_link_name(index: usize) -> Option<String> {
    if index >= MAX_GRIB_FILES {
        return None;
    }
    let letter = |n: usize| char::from(b'A' + n as u8);
    Some(format!(
        "GRIBFILE.{}{}{}",
        letter(index / (26 * 26)),
        letter(index / 26 % 26),
        letter(index % 26)
    ))
}

/// Symlinks every file of `src_dir` into `dst_dir` as `GRIBFILE.AAA`,
/// `GRIBFILE.AAB`, ... in file-name order.
///
/// Link names that already exist in `dst_dir` are left untouched. Returns the
/// paths of the links created.
pub fn link_grib(src_dir: &Path, dst_dir: &Path) -> Result<Vec<PathBuf>, FetchError> {
    let mut sources: Vec<PathBuf> = std::fs::read_dir(src_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    sources.sort();

    if sources.len() > MAX_GRIB_FILES {
        return Err(FetchError::TooManyGribFiles {
            found: sources.len(),
            max: MAX_GRIB_FILES,
        });
    }

    std::fs::create_dir_all(dst_dir)?;
    let mut created = Vec::new();
    for (index, source) in sources.iter().enumerate() {
        let Some(name) = grib_link_name(index) else {
            break;
        };
        let link = dst_dir.join(name);
        if link.symlink_metadata().is_ok() {
            debug!("{} already exists, skipping", link.display());
            continue;
        }
        let target = std::fs::canonicalize(source)?;
        symlink(&target, &link)?;
        created.push(link);
    }

    info!(
        "Linked {} of {} GRIB files from {} into {}",
        created.len(),
        sources.len(),
        src_dir.display(),
        dst_dir.display()
    );
    Ok(created)
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
