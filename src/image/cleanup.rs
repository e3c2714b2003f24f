use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Best-effort removal of previously written outputs.
///
/// Failures are logged and skipped; the remaining paths are still attempted.
pub fn cleanup_files(paths: &[PathBuf]) {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}
