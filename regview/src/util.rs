//! Methods for reading files

use std::{io, path};

use fs_err as fs;

/// Returns contents of the file at `path`
///
/// The error message names the offending path.
pub(crate) fn read_file(path: &path::Path) -> io::Result<String> {
    fs::read_to_string(path)
}
