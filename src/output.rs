use std::fs;
use std::io;
use std::path::Path;

use log::debug;

use crate::Error;

/// Ensures that `path` exists and is an empty directory before the pipeline
/// writes into it.
///
/// An existing, non-empty folder is only deleted and recreated when `force`
/// is set; without it the folder is left untouched and an error is returned.
pub fn prepare_folder(path: &Path, force: bool) -> Result<(), Error> {
    if path.exists() {
        if !is_empty_dir(path)? {
            if !force {
                return Err(Error::OutputFolderNotEmpty(path.to_path_buf()));
            }

            debug!("Removing existing output folder {}", path.display());

            fs::remove_dir_all(path)?;
            fs::create_dir_all(path)?;
        }
    } else {
        fs::create_dir_all(path)?;
    }

    Ok(())
}

fn is_empty_dir(path: &Path) -> io::Result<bool> {
    Ok(path.read_dir()?.next().is_none())
}
