use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::http::encoding::TextEncoding;

/// Environment variable naming an optional YAML configuration file.
pub const CONFIG_ENV: &str = "SPUD_CONFIG";

const DEFAULT_PORT: u16 = 11311;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Bind to the loopback interface only.
    pub local_only: bool,
    pub encoding: TextEncoding,
    pub max_line_length: usize,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub send_timeout_ms: u64,
    pub receive_timeout_ms: u64,
    /// Upper bound for a single connect attempt inside the retry loop.
    pub connect_timeout_ms: u64,
    /// Pause between failed connect attempts. Zero retries immediately.
    pub reconnect_delay_ms: u64,
    pub encoding: TextEncoding,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerConfig,
    client: ClientConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            local_only: true,
            encoding: TextEncoding::default(),
            max_line_length: 8 * 1024,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            send_timeout_ms: 1000,
            receive_timeout_ms: 1000,
            connect_timeout_ms: 1000,
            reconnect_delay_ms: 0,
            encoding: TextEncoding::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, overlaid by the `server:` section of `$SPUD_CONFIG` (if set)
    /// and then by `SPUD_PORT` / `SPUD_LOCAL_ONLY`.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = load_file()?.server;

        if let Some(port) = env_parse::<u16>("SPUD_PORT")? {
            cfg.port = port;
        }
        if let Some(local_only) = env_parse::<bool>("SPUD_LOCAL_ONLY")? {
            cfg.local_only = local_only;
        }

        Ok(cfg)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn bind_addr(&self) -> SocketAddr {
        let ip = if self.local_only {
            std::net::Ipv4Addr::LOCALHOST
        } else {
            std::net::Ipv4Addr::UNSPECIFIED
        };
        SocketAddr::from((ip, self.port))
    }
}

impl ClientConfig {
    /// Defaults, overlaid by the `client:` section of `$SPUD_CONFIG` (if set)
    /// and then by `SPUD_HOST` / `SPUD_PORT`.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = load_file()?.client;

        if let Ok(host) = std::env::var("SPUD_HOST") {
            cfg.host = host;
        }
        if let Some(port) = env_parse::<u16>("SPUD_PORT")? {
            cfg.port = port;
        }

        Ok(cfg)
    }

    pub fn for_addr(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
            ..Self::default()
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

fn load_file() -> anyhow::Result<ConfigFile> {
    let Ok(path) = std::env::var(CONFIG_ENV) else {
        return Ok(ConfigFile::default());
    };

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config file {path}"))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing config file {path}"))
}

fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(None),
    }
}
