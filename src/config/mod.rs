//! Configuration module for the visualization service

use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};
use std::path::PathBuf;

/// Main application settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub assets: AssetSettings,
    pub provider: ProviderSettings,
    pub sweep: SweepSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Filesystem layout: public root, upload scratch space, tile catalog
#[derive(Debug, Clone, Deserialize)]
pub struct AssetSettings {
    /// Project root used to resolve the public directory. The main process
    /// and deployment scripts can disagree on the working directory, so the
    /// public root is always probed against this and the cwd.
    pub server_root: Option<PathBuf>,
    /// Public directory name, relative to the server root
    pub public_dir: String,
    /// Directory where multipart uploads are spooled before staging
    pub upload_dir: PathBuf,
    /// Tile catalog directory name, relative to the public root
    pub tiles_dir: String,
}

/// External transform provider configuration.
///
/// The API token is deliberately absent here: it is read from
/// `REPLICATE_API_TOKEN` at call time and never persisted in config files.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    pub api_base: String,
    pub model: String,
    /// Total attempts per transform call (first try included)
    pub max_attempts: u32,
    /// Fixed pause between transform attempts, seconds
    pub retry_delay_secs: u64,
    /// Wall-clock ceiling for one whole visualization, seconds
    pub request_timeout_secs: u64,
    /// Per-attempt timeout when downloading the generated image, seconds
    pub download_timeout_secs: u64,
    /// Total attempts when downloading the generated image
    pub download_attempts: u32,
    /// Poll cadence while a prediction is still starting/processing, seconds
    pub poll_interval_secs: u64,
    /// Give up polling a single prediction after this long, seconds
    pub poll_timeout_secs: u64,
}

/// Optional age-based sweep of generated artifacts
#[derive(Debug, Clone, Deserialize)]
pub struct SweepSettings {
    pub enabled: bool,
    /// Artifacts older than this are deleted, seconds
    pub max_age_secs: u64,
    /// Time between sweep passes, seconds
    pub interval_secs: u64,
}

impl Settings {
    /// Load configuration from files and environment variables
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Environment variables (prefixed with VIZ_)
    /// 2. config/local.toml (gitignored)
    /// 3. config/default.toml
    /// 4. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3003)?
            // Optional keys (server.workers, assets.server_root) deserialize
            // to None when absent
            .set_default("assets.public_dir", "public")?
            .set_default("assets.upload_dir", "uploads")?
            .set_default("assets.tiles_dir", "tiles")?
            .set_default("provider.api_base", "https://api.replicate.com/v1")?
            .set_default("provider.model", "google/nano-banana")?
            .set_default("provider.max_attempts", 3)?
            .set_default("provider.retry_delay_secs", 2)?
            .set_default("provider.request_timeout_secs", 300)?
            .set_default("provider.download_timeout_secs", 30)?
            .set_default("provider.download_attempts", 3)?
            .set_default("provider.poll_interval_secs", 1)?
            .set_default("provider.poll_timeout_secs", 240)?
            .set_default("sweep.enabled", false)?
            .set_default("sweep.max_age_secs", 3600)?
            .set_default("sweep.interval_secs", 600)?
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local overrides (gitignored)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment variables (VIZ_SERVER__PORT, etc.)
            .add_source(
                Environment::with_prefix("VIZ")
                    .separator("__")
                    .try_parsing(true)
            );

        builder.build()?.try_deserialize()
    }

    /// Candidate public roots, most preferred first.
    ///
    /// The main process and its deployment environment can resolve relative
    /// paths differently, so render lookups and artifact serving probe the
    /// configured server root first and the process working directory second.
    pub fn public_roots(&self) -> Vec<PathBuf> {
        let mut roots = Vec::new();
        if let Some(ref root) = self.assets.server_root {
            roots.push(root.join(&self.assets.public_dir));
        }
        if let Ok(cwd) = std::env::current_dir() {
            let candidate = cwd.join(&self.assets.public_dir);
            if !roots.contains(&candidate) {
                roots.push(candidate);
            }
        }
        if roots.is_empty() {
            roots.push(PathBuf::from(&self.assets.public_dir));
        }
        roots
    }

    /// Primary public root: where generated artifacts are written
    pub fn primary_public_root(&self) -> PathBuf {
        self.public_roots().remove(0)
    }

    /// Directory holding the predefined tile catalog images
    pub fn tiles_root(&self) -> PathBuf {
        self.primary_public_root().join(&self.assets.tiles_dir)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 3003,
                workers: None,
            },
            assets: AssetSettings {
                server_root: None,
                public_dir: "public".to_string(),
                upload_dir: PathBuf::from("uploads"),
                tiles_dir: "tiles".to_string(),
            },
            provider: ProviderSettings {
                api_base: "https://api.replicate.com/v1".to_string(),
                model: "google/nano-banana".to_string(),
                max_attempts: 3,
                retry_delay_secs: 2,
                request_timeout_secs: 300,
                download_timeout_secs: 30,
                download_attempts: 3,
                poll_interval_secs: 1,
                poll_timeout_secs: 240,
            },
            sweep: SweepSettings {
                enabled: false,
                max_age_secs: 3600,
                interval_secs: 600,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_roots_prefers_server_root() {
        let mut settings = Settings::default();
        settings.assets.server_root = Some(PathBuf::from("/srv/viz"));
        let roots = settings.public_roots();
        assert_eq!(roots[0], PathBuf::from("/srv/viz/public"));
        assert!(roots.len() >= 2);
    }

    #[test]
    fn test_tiles_root_under_public() {
        let mut settings = Settings::default();
        settings.assets.server_root = Some(PathBuf::from("/srv/viz"));
        assert_eq!(settings.tiles_root(), PathBuf::from("/srv/viz/public/tiles"));
    }
}
