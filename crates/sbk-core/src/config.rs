use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SbkError, SbkResult};

/// Top-level configuration (loaded from sbk.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SbkConfig {
    pub cipher: CipherConfig,
    pub io: IoConfig,
    pub log: LogConfig,
}

/// Repository encryption settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CipherConfig {
    /// OpenSSL cipher name (default: aes-256-cbc)
    pub cipher_type: String,
    /// Digest used for key derivation (default: sha1, as `openssl enc` before 1.1.0)
    pub digest: Option<String>,
    /// File holding the passphrase (first line, trailing newline stripped)
    pub pass_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Bytes read per codec call (default: 65536)
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            cipher_type: "aes-256-cbc".into(),
            digest: None,
            pass_file: None,
        }
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self { buffer_size: 64 * 1024 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl SbkConfig {
    /// Load the config file at `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> SbkResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SbkError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no stream could run with.
    pub fn validate(&self) -> SbkResult<()> {
        if self.cipher.cipher_type.trim().is_empty() {
            return Err(SbkError::Config("cipher.cipher_type must not be empty".into()));
        }
        if self.io.buffer_size == 0 {
            return Err(SbkError::Config("io.buffer_size must be greater than 0".into()));
        }
        Ok(())
    }

    /// Read the passphrase from `cipher.pass_file`, if one is configured.
    pub fn read_pass_file(&self) -> SbkResult<Option<String>> {
        let Some(path) = &self.cipher.pass_file else {
            return Ok(None);
        };
        let content = std::fs::read_to_string(path)?;
        let pass = content.lines().next().unwrap_or_default().to_string();
        Ok(Some(pass))
    }
}
