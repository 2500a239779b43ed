//! Configuration file support
//!
//! Loads server configuration from TOML files.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{EvidenceConfig, PipelineConfig, RendererConfig, ServerConfig};

/// Configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Server settings
    pub server: ServerSettings,
    /// Pipeline settings
    pub pipeline: PipelineSettings,
    /// Renderer settings
    pub renderer: RendererSettings,
    /// Evidence spool settings
    pub evidence: EvidenceSettings,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
    /// Limits settings
    pub limits: Option<LimitsSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Enable CORS
    pub cors_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Capacity of each ring buffer, in frames
    pub ring_buffer_capacity: usize,
    /// Minimum buffered video frames before a segment is seam-ready
    pub min_video_prefeed: usize,
    /// Minimum buffered audio frames before a segment is seam-ready
    pub min_audio_prefeed: usize,
    /// Minimum lead time, in milliseconds, a segment must be primed ahead of its fence tick
    pub min_prefeed_margin_ms: Option<i64>,
    /// Bootstrap gate timeout in milliseconds
    pub bootstrap_gate_timeout_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererSettings {
    /// Freeze window before falling back to pad under underrun, in microseconds
    pub freeze_window_us: Option<i64>,
    /// Target equilibrium buffer depth N
    pub equilibrium_target: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSettings {
    /// Directory the per-session NDJSON spool files live in
    pub spool_dir: String,
    /// Byte cap per session spool file
    pub byte_cap: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSettings {
    /// Maximum concurrent channels
    pub max_concurrent_channels: Option<usize>,
    /// Rate limit requests per second
    pub rate_limit_rps: Option<u32>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        let defaults = ServerConfig::default();
        Self {
            server: ServerSettings {
                host: defaults.host.clone(),
                port: defaults.port,
                cors_enabled: Some(defaults.cors_enabled),
            },
            pipeline: PipelineSettings {
                ring_buffer_capacity: defaults.pipeline.ring_buffer_capacity,
                min_video_prefeed: defaults.pipeline.min_video_prefeed,
                min_audio_prefeed: defaults.pipeline.min_audio_prefeed,
                min_prefeed_margin_ms: Some(defaults.pipeline.min_prefeed_margin_ms),
                bootstrap_gate_timeout_ms: Some(defaults.pipeline.bootstrap_gate_timeout_ms),
            },
            renderer: RendererSettings {
                freeze_window_us: Some(defaults.renderer.freeze_window_us),
                equilibrium_target: Some(defaults.renderer.equilibrium_target),
            },
            evidence: EvidenceSettings {
                spool_dir: defaults.evidence.spool_dir.clone(),
                byte_cap: Some(defaults.evidence.byte_cap),
            },
            logging: Some(LoggingSettings {
                level: defaults.log_level.clone(),
                format: Some("pretty".to_string()),
            }),
            limits: Some(LimitsSettings {
                max_concurrent_channels: defaults.max_concurrent_channels,
                rate_limit_rps: defaults.rate_limit_rps,
            }),
        }
    }

    /// Convert to ServerConfig, applying defaults for any field left
    /// unspecified in the file.
    pub fn into_server_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            host: self.server.host,
            port: self.server.port,
            pipeline: PipelineConfig {
                ring_buffer_capacity: self.pipeline.ring_buffer_capacity,
                min_video_prefeed: self.pipeline.min_video_prefeed,
                min_audio_prefeed: self.pipeline.min_audio_prefeed,
                min_prefeed_margin_ms: self
                    .pipeline
                    .min_prefeed_margin_ms
                    .unwrap_or(defaults.pipeline.min_prefeed_margin_ms),
                bootstrap_gate_timeout_ms: self
                    .pipeline
                    .bootstrap_gate_timeout_ms
                    .unwrap_or(defaults.pipeline.bootstrap_gate_timeout_ms),
            },
            renderer: RendererConfig {
                freeze_window_us: self
                    .renderer
                    .freeze_window_us
                    .unwrap_or(defaults.renderer.freeze_window_us),
                equilibrium_target: self
                    .renderer
                    .equilibrium_target
                    .unwrap_or(defaults.renderer.equilibrium_target),
            },
            evidence: EvidenceConfig {
                spool_dir: self.evidence.spool_dir,
                byte_cap: self.evidence.byte_cap.unwrap_or(defaults.evidence.byte_cap),
            },
            cors_enabled: self.server.cors_enabled.unwrap_or(true),
            log_level: self.logging.map(|l| l.level).unwrap_or_else(|| "info".to_string()),
            max_concurrent_channels: self
                .limits
                .as_ref()
                .and_then(|l| l.max_concurrent_channels)
                .or(defaults.max_concurrent_channels),
            rate_limit_rps: self
                .limits
                .as_ref()
                .and_then(|l| l.rate_limit_rps)
                .or(defaults.rate_limit_rps),
        }
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigFile::default_config();
    config.to_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default_config();
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.pipeline.ring_buffer_capacity, 12);
    }

    #[test]
    fn test_config_file_roundtrip() {
        let config = ConfigFile::default_config();

        let mut temp_file = NamedTempFile::new().unwrap();
        let content = toml::to_string_pretty(&config).unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let loaded = ConfigFile::from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.server.port, config.server.port);
        assert_eq!(loaded.pipeline.ring_buffer_capacity, config.pipeline.ring_buffer_capacity);
    }

    #[test]
    fn test_into_server_config_applies_defaults_for_missing_fields() {
        let mut config_file = ConfigFile::default_config();
        config_file.pipeline.min_prefeed_margin_ms = None;

        let server_config = config_file.into_server_config();
        assert_eq!(server_config.pipeline.min_prefeed_margin_ms, 2000);
    }

    #[test]
    fn test_generate_default_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        generate_default_config(&path).unwrap();

        assert!(path.exists());
        let loaded = ConfigFile::from_file(&path).unwrap();
        assert_eq!(loaded.server.port, 8088);
    }
}
