//! Path validation for the script-facing external functions (spec §6):
//! any path containing `..` or beginning with `/` is rejected.

use cairn_core::{Error, Result};

pub fn validate_relative_path(path: &str) -> Result<()> {
    if path.starts_with('/') {
        return Err(Error::InvalidPath(format!("path must be relative: {path}")));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(Error::InvalidPath(format!("path must not contain '..': {path}")));
    }
    Ok(())
}
