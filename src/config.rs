use std::{path::Path, sync::LazyLock, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::media::{
    pacing,
    supervisor::SupervisorConfig,
    types::{DrainPolicy, PipelineConfig, StreamEndpoint},
};

/// Relay settings, read from a JSON file. Every field is optional.
///
/// ```json
/// {
///   "endpoint": { "url": "rtmp://127.0.0.1:1935/live/stream", "backend": "flv" },
///   "output_width": 640,
///   "output_height": 480,
///   "target_fps": 15,
///   "jpeg_quality": 90,
///   "reconnect_backoff_ms": 5000,
///   "drain_policy": "latest",
///   "shared_upstream": false
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub endpoint: StreamEndpoint,
    pub output_width: u32,
    pub output_height: u32,
    /// 0 or absent disables pacing
    pub target_fps: Option<f64>,
    pub jpeg_quality: u8,
    pub reconnect_backoff_ms: u64,
    pub drain_policy: DrainPolicy,
    pub shared_upstream: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            endpoint: StreamEndpoint::new("rtmp://127.0.0.1:1935/live/stream"),
            output_width: pipeline.width,
            output_height: pipeline.height,
            target_fps: None,
            jpeg_quality: pipeline.jpeg_quality,
            reconnect_backoff_ms: 5_000,
            drain_policy: DrainPolicy::Next,
            shared_upstream: false,
        }
    }
}

impl RelayConfig {
    /// Defaults, or the JSON file named by the only positional argument.
    pub fn load() -> anyhow::Result<Self> {
        let config = match std::env::args_os().nth(1) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.endpoint.url().trim().is_empty() {
            anyhow::bail!("endpoint url must not be empty");
        }
        if self.output_width == 0 || self.output_height == 0 {
            anyhow::bail!(
                "output resolution {}x{} is invalid",
                self.output_width,
                self.output_height
            );
        }
        if self.output_width > u16::MAX as u32 || self.output_height > u16::MAX as u32 {
            anyhow::bail!("output resolution exceeds the JPEG limit of 65535");
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            anyhow::bail!("jpeg_quality must be within 1..=100, got {}", self.jpeg_quality);
        }
        if let Some(fps) = self.target_fps {
            if !fps.is_finite() || fps < 0.0 {
                anyhow::bail!("target_fps must be a non-negative number, got {}", fps);
            }
            if fps > 0.0 && pacing::interval_for(fps).is_none() {
                anyhow::bail!("target_fps {} is too low to pace", fps);
            }
        }
        Ok(())
    }

    pub fn endpoint(&self) -> &StreamEndpoint {
        &self.endpoint
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            pipeline: PipelineConfig {
                width: self.output_width,
                height: self.output_height,
                jpeg_quality: self.jpeg_quality,
            },
            target_fps: self.target_fps,
            reconnect_backoff: Duration::from_millis(self.reconnect_backoff_ms),
            drain_policy: self.drain_policy,
        }
    }
}

/// HTTP bind address, from `HOST` / `PORT`.
pub struct ServerConfig {
    host: String,
    port: u16,
}

impl ServerConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match lookup("PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("invalid PORT {:?}", port))?,
            None => 8080,
        };
        Ok(Self { host, port })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn server_config() -> anyhow::Result<&'static ServerConfig> {
    static CONFIG: LazyLock<anyhow::Result<ServerConfig>> =
        LazyLock::new(|| ServerConfig::from_lookup(|key| std::env::var(key).ok()));
    CONFIG.as_ref().map_err(|e| anyhow::anyhow!("{:#}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.endpoint.url(), "rtmp://127.0.0.1:1935/live/stream");
        assert_eq!((config.output_width, config.output_height), (640, 480));
        assert_eq!(config.jpeg_quality, 90);
        assert_eq!(config.target_fps, None);
        assert_eq!(config.drain_policy, DrainPolicy::Next);
        assert!(!config.shared_upstream);
        config.validate().unwrap();

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor, SupervisorConfig::default());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RelayConfig::from_json(
            r#"{
                "endpoint": { "url": "rtmp://cam/live/a", "backend": "flv" },
                "target_fps": 12.5,
                "drain_policy": "latest"
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.endpoint,
            StreamEndpoint::new("rtmp://cam/live/a").with_backend("flv")
        );
        assert_eq!(config.endpoint().backend(), Some("flv"));
        assert_eq!(config.target_fps, Some(12.5));
        assert_eq!(config.drain_policy, DrainPolicy::Latest);
        assert_eq!(config.output_width, 640);
        assert_eq!(config.reconnect_backoff_ms, 5_000);

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor.reconnect_backoff, Duration::from_secs(5));
        assert_eq!(supervisor.drain_policy, DrainPolicy::Latest);
    }

    #[test]
    fn test_unknown_drain_policy_rejected() {
        assert!(RelayConfig::from_json(r#"{ "drain_policy": "oldest" }"#).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            RelayConfig {
                endpoint: StreamEndpoint::new(" "),
                ..RelayConfig::default()
            },
            RelayConfig {
                output_width: 0,
                ..RelayConfig::default()
            },
            RelayConfig {
                output_height: 70_000,
                ..RelayConfig::default()
            },
            RelayConfig {
                jpeg_quality: 0,
                ..RelayConfig::default()
            },
            RelayConfig {
                jpeg_quality: 101,
                ..RelayConfig::default()
            },
            RelayConfig {
                target_fps: Some(-1.0),
                ..RelayConfig::default()
            },
            RelayConfig {
                target_fps: Some(1e-20),
                ..RelayConfig::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }

    #[test]
    fn test_zero_fps_is_valid_and_disables_pacing() {
        let config = RelayConfig {
            target_fps: Some(0.0),
            ..RelayConfig::default()
        };
        config.validate().unwrap();
        assert_eq!(config.supervisor_config().target_fps, Some(0.0));
    }

    #[test]
    fn test_from_missing_file_fails() {
        let err = RelayConfig::from_file(Path::new("/nonexistent/relay.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("reading config"));
    }

    #[test]
    fn test_server_config_from_lookup() {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");

        let config = ServerConfig::from_lookup(|key| match key {
            "HOST" => Some("127.0.0.1".to_string()),
            "PORT" => Some("9000".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");

        assert!(ServerConfig::from_lookup(|key| (key == "PORT").then(|| "http".to_string())).is_err());
    }
}
