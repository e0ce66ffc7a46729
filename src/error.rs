use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Output folder '{}' is not empty. Use --force to overwrite.", .0.display())]
    OutputFolderNotEmpty(PathBuf),

    #[error("I/O error: {}", _0)]
    IoError(#[from] io::Error),
}
