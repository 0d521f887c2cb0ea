//! Loading [`QueueOptions`] from TOML.
//!
//! ```toml
//! limit = 4                 # 0 = unbounded
//! failure_policy = "drain"  # or "halt" (default)
//! ```

use std::path::{Path, PathBuf};

use pace_types::QueueOptions;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read queue options at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse queue options at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// Parse queue options from TOML text.
pub fn parse_options(text: &str) -> Result<QueueOptions, toml::de::Error> {
    toml::from_str(text)
}

/// Load queue options from `path`.
///
/// A missing file is not an error: it yields `Ok(None)` so callers can fall
/// back to [`QueueOptions::default`].
pub fn load_options(path: &Path) -> Result<Option<QueueOptions>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!("Failed to read queue options at {:?}: {}", path, err);
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: err,
            });
        }
    };

    match parse_options(&content) {
        Ok(options) => {
            tracing::debug!(
                path = %path.display(),
                limit = %options.limit(),
                failure_policy = options.failure_policy().as_str(),
                "loaded queue options"
            );
            Ok(Some(options))
        }
        Err(err) => {
            tracing::warn!("Failed to parse queue options at {:?}: {}", path, err);
            Err(ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use pace_types::{ConcurrencyLimit, FailurePolicy};

    use super::*;

    #[test]
    fn test_empty_text_is_default() {
        let options = parse_options("").unwrap();
        assert_eq!(options, QueueOptions::default());
    }

    #[test]
    fn test_zero_limit_is_unbounded() {
        let options = parse_options("limit = 0").unwrap();
        assert_eq!(options.limit(), ConcurrencyLimit::Unbounded);
    }

    #[test]
    fn test_parse_limit_and_policy() {
        let options = parse_options(
            r#"
limit = 4
failure_policy = "drain"
"#,
        )
        .unwrap();
        assert_eq!(options.limit().get(), 4);
        assert_eq!(options.failure_policy(), FailurePolicy::Drain);
    }

    #[test]
    fn test_negative_limit_rejected() {
        assert!(parse_options("limit = -1").is_err());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(parse_options(r#"failure_policy = "retry""#).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(parse_options("infinity = true").is_err());
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_options(&dir.path().join("queue.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.toml");
        std::fs::write(&path, "limit = 2\n").unwrap();

        let options = load_options(&path).unwrap().unwrap();
        assert_eq!(options.limit().get(), 2);
        assert_eq!(options.failure_policy(), FailurePolicy::Halt);
    }

    #[test]
    fn test_parse_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.toml");
        std::fs::write(&path, "limit = [").unwrap();

        let err = load_options(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.path(), path.as_path());
        assert!(err.to_string().contains("queue.toml"));
    }

    #[test]
    fn test_directory_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_options(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
