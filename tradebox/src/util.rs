//! Host-side helpers.

use std::path::PathBuf;

use tradebox_shared::{TradeboxError, TradeboxResult};

/// Find an external tool binary.
///
/// Checks `TRADEBOX_TOOLDIR` first so packaged installs can ship their own
/// e2fsprogs, then falls back to `PATH`.
pub fn find_binary(name: &str) -> TradeboxResult<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(tooldir) = std::env::var("TRADEBOX_TOOLDIR") {
        candidates.push(PathBuf::from(tooldir).join(name));
    }

    if let Ok(path) = std::env::var("PATH") {
        for dir in std::env::split_paths(&path) {
            candidates.push(dir.join(name));
        }
    }

    for candidate in &candidates {
        if candidate.is_file() {
            tracing::debug!(binary = %candidate.display(), "Found binary");
            return Ok(candidate.clone());
        }
    }

    Err(TradeboxError::Storage(format!(
        "binary '{}' not found in TRADEBOX_TOOLDIR or PATH",
        name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_a_binary_on_path() {
        // sh is present on any host this builder can run on
        let found = find_binary("sh").unwrap();
        assert!(found.is_file());
    }

    #[test]
    fn missing_binary_is_an_error() {
        let err = find_binary("tradebox-definitely-not-a-tool").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
