//! All-or-nothing file output.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, ZimportError};

/// Write `contents` to `target` atomically: write a hidden temp sibling, then rename.
///
/// On failure the temp file is removed and `target` is left untouched, so a
/// half-written file never appears under the final name.
pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let temp = temp_sibling(target)?;

    if let Err(e) = std::fs::write(&temp, contents) {
        let _ = std::fs::remove_file(&temp);
        return Err(ZimportError::io(&temp, e));
    }

    if let Err(e) = std::fs::rename(&temp, target) {
        let _ = std::fs::remove_file(&temp);
        return Err(ZimportError::io(target, e));
    }

    debug!(path = %target.display(), size = contents.len(), "wrote file");
    Ok(())
}

fn temp_sibling(target: &Path) -> Result<PathBuf> {
    let name = target.file_name().ok_or_else(|| {
        ZimportError::io(
            target,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
        )
    })?;
    Ok(target.with_file_name(format!(".{}.tmp", name.to_string_lossy())))
}
