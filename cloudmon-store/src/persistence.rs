//! On-disk locations and JSON persistence.
//!
//! Files written here are owner-only on Unix (0600, directories 0700).

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;

// ============================================================================
// Default Paths
// ============================================================================

/// Returns the default configuration directory.
///
/// - macOS: `~/Library/Application Support/CloudMon`
/// - Linux: `~/.config/cloudmon`
/// - Windows: `%APPDATA%\cloudmon`
pub fn default_config_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .map(|h| h.join("Library").join("Application Support").join("CloudMon"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    #[cfg(not(target_os = "macos"))]
    {
        dirs::config_dir()
            .map(|c| c.join("cloudmon"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Returns the default cache directory.
///
/// - macOS: `~/Library/Caches/CloudMon`
/// - Linux: `~/.cache/cloudmon`
/// - Windows: `%LOCALAPPDATA%\cloudmon`
pub fn default_cache_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .map(|h| h.join("Library").join("Caches").join("CloudMon"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|c| c.join("cloudmon"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.json")
}

/// Returns the default warm-start snapshot path.
pub fn default_snapshot_path() -> PathBuf {
    default_cache_dir().join("cache.db")
}

// ============================================================================
// Permissions
// ============================================================================

const FILE_MODE: u32 = 0o600;
const DIR_MODE: u32 = 0o700;

#[cfg(unix)]
async fn restrict_mode(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    debug!(path = %path.display(), mode = %format_args!("{mode:o}"), "Restricted permissions");
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_mode(_path: &Path, _mode: u32) -> Result<(), StoreError> {
    Ok(())
}

/// Makes a file readable by the owner only (no-op off Unix).
pub(crate) async fn set_restrictive_permissions(path: &Path) -> Result<(), StoreError> {
    restrict_mode(path, FILE_MODE).await
}

// ============================================================================
// File Operations
// ============================================================================

/// Saves data to a JSON file with secure permissions.
///
/// Creates parent directories if they don't exist, writes atomically
/// (via temp file + rename), and sets restrictive permissions on Unix.
///
/// # Errors
///
/// Fails on serialization or I/O errors.
pub async fn save_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(data)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent).await?;
    }

    // Restricted before the rename; the final path is never world-readable.
    let staging = path.with_extension("json.tmp");
    tokio::fs::write(&staging, &json).await?;
    set_restrictive_permissions(&staging).await?;
    tokio::fs::rename(&staging, path).await?;

    debug!(path = %path.display(), bytes = json.len(), "Saved JSON file");
    Ok(())
}

/// Loads data from a JSON file.
///
/// # Errors
///
/// Fails if the file cannot be read or parsed.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = tokio::fs::read(path).await?;
    debug!(path = %path.display(), bytes = bytes.len(), "Loaded JSON file");
    Ok(serde_json::from_slice(&bytes)?)
}

/// Loads a JSON file, falling back to `T::default()`.
///
/// A missing file is silent; an unreadable one is logged.
pub async fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    load_json(path).await.unwrap_or_else(|e: StoreError| {
        if !e.is_not_found() {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable file");
        }
        T::default()
    })
}

/// Ensures a directory exists.
///
/// Only a directory created here is tightened; existing ones keep their mode.
///
/// # Errors
///
/// Fails on I/O errors.
pub async fn ensure_dir(path: &Path) -> Result<(), StoreError> {
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    tokio::fs::create_dir_all(path).await?;
    restrict_mode(path, DIR_MODE).await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        assert!(!default_config_dir().as_os_str().is_empty());
        assert!(!default_cache_dir().as_os_str().is_empty());
        assert!(default_config_path().ends_with("config.json"));
        assert!(default_snapshot_path().ends_with("cache.db"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("config.json");
        save_json(&path, &serde_json::json!({"accounts": []})).await.unwrap();

        let file = tokio::fs::metadata(&path).await.unwrap();
        assert_eq!(file.permissions().mode() & 0o777, 0o600);
        let parent = tokio::fs::metadata(path.parent().unwrap()).await.unwrap();
        assert_eq!(parent.permissions().mode() & 0o777, 0o700);
    }
}
