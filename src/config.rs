use std::net::{Ipv4Addr, SocketAddr};

const DEFAULT_PORT: u16 = 3000;

/// Process-level settings read once at startup. Everything has a default, so
/// a bare start listens on 0.0.0.0:3000 with info-level logs and no file
/// output.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub file_logs: Option<FileLogConfig>,
}

/// Daily-rolled file logging, opted into with ENABLE_FILE_LOGS.
#[derive(Debug, Clone)]
pub struct FileLogConfig {
    pub directory: String,
}

impl Config {
    pub fn from_env() -> Self {
        let bind_addr = resolve_bind_addr(
            std::env::var("BIND_ADDR").ok().as_deref(),
            std::env::var("HOST").ok().as_deref(),
            std::env::var("PORT").ok().as_deref(),
        );

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let file_logs = env_flag("ENABLE_FILE_LOGS").then(|| FileLogConfig {
            directory: std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string()),
        });

        Self {
            bind_addr,
            log_level,
            file_logs,
        }
    }
}

/// BIND_ADDR takes the whole socket address; otherwise HOST and PORT are
/// combined, each falling back to its default when absent or unparseable.
fn resolve_bind_addr(bind: Option<&str>, host: Option<&str>, port: Option<&str>) -> SocketAddr {
    if let Some(addr) = bind.and_then(|v| v.parse().ok()) {
        return addr;
    }

    let host = host
        .and_then(|v| v.parse().ok())
        .unwrap_or(std::net::IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let port = port
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    SocketAddr::new(host, port)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let addr = resolve_bind_addr(None, None, None);
        assert_eq!(addr, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_bind_addr_overrides_host_and_port() {
        let addr = resolve_bind_addr(Some("127.0.0.1:8080"), Some("10.0.0.1"), Some("9000"));
        assert_eq!(addr, "127.0.0.1:8080".parse().unwrap());
    }

    #[test]
    fn test_host_and_port_combine() {
        let addr = resolve_bind_addr(None, Some("127.0.0.1"), Some("4100"));
        assert_eq!(addr, "127.0.0.1:4100".parse().unwrap());
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let addr = resolve_bind_addr(Some("not-an-addr"), Some("nowhere"), Some("seventy"));
        assert_eq!(addr, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
    }
}
