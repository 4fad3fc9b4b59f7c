use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration (loaded from ssi.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SsiConfig {
    pub logging: LoggingConfig,
    pub wallet: WalletConfig,
    pub transfer: TransferConfig,
    pub envelope: EnvelopeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// JSON wallet file holding DID key material
    pub path: Option<PathBuf>,
}

/// File codec limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunk size used when the caller passes none (default: 1 MiB)
    pub default_chunk_size: usize,
    /// Smallest accepted chunk size (default: 1 KiB)
    pub min_chunk_size: usize,
    /// Largest accepted chunk size, also the decoder's memory bound (default: 64 MiB)
    pub max_chunk_size: usize,
    /// Largest accepted SSIFILE2 header (default: 64 KiB)
    pub max_header_len: usize,
    /// Largest input for the single-shot codec (default: 256 MiB)
    pub max_single_shot_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Reject envelopes whose expires_at_ms has passed (default: true)
    pub enforce_expiry: bool,
    /// payload.content_type written by pack
    pub default_content_type: String,
}

impl SsiConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }
}

impl TransferConfig {
    pub fn chunk_size_in_bounds(&self, chunk_size: usize) -> bool {
        chunk_size > 0 && (self.min_chunk_size..=self.max_chunk_size).contains(&chunk_size)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            default_chunk_size: 1 << 20,
            min_chunk_size: 1024,
            max_chunk_size: 64 << 20,
            max_header_len: 64 << 10,
            max_single_shot_bytes: 256 << 20,
        }
    }
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            enforce_expiry: true,
            default_content_type: "application/json".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[logging]
level = "debug"
format = "json"

[wallet]
path = "/var/lib/ssi/wallet.json"

[transfer]
default_chunk_size = 4194304
min_chunk_size = 4096
max_chunk_size = 16777216
max_header_len = 8192
max_single_shot_bytes = 1048576

[envelope]
enforce_expiry = false
default_content_type = "text/plain"
"#;
        let config: SsiConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(
            config.wallet.path,
            Some(PathBuf::from("/var/lib/ssi/wallet.json"))
        );
        assert_eq!(config.transfer.default_chunk_size, 4 << 20);
        assert_eq!(config.transfer.min_chunk_size, 4096);
        assert_eq!(config.transfer.max_header_len, 8192);
        assert_eq!(config.transfer.max_single_shot_bytes, 1 << 20);
        assert!(!config.envelope.enforce_expiry);
        assert_eq!(config.envelope.default_content_type, "text/plain");
    }

    #[test]
    fn test_parse_defaults() {
        let config: SsiConfig = toml::from_str("").unwrap();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert!(config.wallet.path.is_none());
        assert_eq!(config.transfer.default_chunk_size, 1 << 20);
        assert_eq!(config.transfer.max_chunk_size, 64 << 20);
        assert!(config.envelope.enforce_expiry);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[transfer]
default_chunk_size = 65536
"#;
        let config: SsiConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.transfer.default_chunk_size, 65536);
        // Defaults
        assert_eq!(config.transfer.min_chunk_size, 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_chunk_size_bounds() {
        let transfer = TransferConfig::default();
        assert!(transfer.chunk_size_in_bounds(1 << 20));
        assert!(transfer.chunk_size_in_bounds(1024));
        assert!(!transfer.chunk_size_in_bounds(1023));
        assert!(!transfer.chunk_size_in_bounds((64 << 20) + 1));
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SsiConfig::load(&dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(config.transfer.default_chunk_size, 1 << 20);
    }

    #[tokio::test]
    async fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssi.toml");
        std::fs::write(&path, "[transfer\nbroken").unwrap();
        assert!(SsiConfig::load(&path).await.is_err());
    }
}
