//! Server configuration

use serde::{Deserialize, Serialize};

/// Ring buffer / prefeed configuration for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Capacity of each ring buffer, in frames.
    pub ring_buffer_capacity: usize,

    /// Minimum buffered video frames before a segment is seam-ready.
    pub min_video_prefeed: usize,

    /// Minimum buffered audio frames before a segment is seam-ready.
    pub min_audio_prefeed: usize,

    /// Minimum lead time, in milliseconds, the next block must be fed
    /// before the current block's fence tick.
    pub min_prefeed_margin_ms: i64,

    /// Bootstrap gate timeout in milliseconds before falling back to
    /// boot-immediate-decodable-output pad.
    pub bootstrap_gate_timeout_ms: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring_buffer_capacity: 12,
            min_video_prefeed: 2,
            min_audio_prefeed: 2,
            min_prefeed_margin_ms: 2000,
            bootstrap_gate_timeout_ms: 500,
        }
    }
}

/// Renderer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Freeze window before falling back to pad under underrun, in
    /// microseconds.
    pub freeze_window_us: i64,

    /// Target equilibrium buffer depth `N`; the healthy band is `[1, 2N]`.
    pub equilibrium_target: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            freeze_window_us: 250_000,
            equilibrium_target: 3,
        }
    }
}

/// Evidence spool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Directory the per-session NDJSON spool files live in.
    pub spool_dir: String,

    /// Byte cap per session spool file.
    pub byte_cap: u64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            spool_dir: "./spool".to_string(),
            byte_cap: 256 * 1024 * 1024,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Pipeline configuration.
    pub pipeline: PipelineConfig,

    /// Renderer configuration.
    pub renderer: RendererConfig,

    /// Evidence spool configuration.
    pub evidence: EvidenceConfig,

    /// Enable CORS.
    pub cors_enabled: bool,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Maximum concurrent channels this process will run.
    pub max_concurrent_channels: Option<usize>,

    /// Rate limit requests per second on the control plane.
    pub rate_limit_rps: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8088,
            pipeline: PipelineConfig::default(),
            renderer: RendererConfig::default(),
            evidence: EvidenceConfig::default(),
            cors_enabled: true,
            log_level: "info".to_string(),
            max_concurrent_channels: Some(16),
            rate_limit_rps: Some(50),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8088);
        assert_eq!(config.pipeline.min_video_prefeed, 2);
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..Default::default()
        };
        assert_eq!(config.socket_addr(), "127.0.0.1:9000");
    }
}
