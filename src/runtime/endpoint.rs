use crate::config::ConfigError;
use std::env;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Location of the container engine daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEndpoint {
    Unix(PathBuf),
    /// `host:port` reached over plain HTTP
    Tcp(String),
}

impl DaemonEndpoint {
    pub fn parse(addr: &str) -> Result<Self, ConfigError> {
        let addr = addr.trim();
        if let Some(path) = addr.strip_prefix("unix://") {
            if path.starts_with('/') {
                return Ok(DaemonEndpoint::Unix(PathBuf::from(path)));
            }
        } else if let Some(host) = addr
            .strip_prefix("tcp://")
            .or_else(|| addr.strip_prefix("http://"))
        {
            let host = host.trim_end_matches('/');
            if !host.is_empty() {
                return Ok(DaemonEndpoint::Tcp(host.to_string()));
            }
        } else if addr.starts_with('/') {
            return Ok(DaemonEndpoint::Unix(PathBuf::from(addr)));
        }

        Err(ConfigError::InvalidEndpoint(addr.to_string()))
    }

    /// Explicit override first, then `DOCKER_HOST`, then the default socket
    pub fn resolve(explicit: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(addr) = explicit {
            debug!("Using configured daemon endpoint {}", addr);
            return Self::parse(addr);
        }

        match env::var("DOCKER_HOST") {
            Ok(addr) if !addr.trim().is_empty() => {
                debug!("Using DOCKER_HOST daemon endpoint {}", addr);
                Self::parse(&addr)
            }
            _ => Ok(Self::default_unix()),
        }
    }

    pub fn default_unix() -> Self {
        DaemonEndpoint::Unix(PathBuf::from(DEFAULT_DOCKER_SOCKET))
    }

    /// Address in the form the Docker client expects
    pub fn to_client_addr(&self) -> String {
        match self {
            DaemonEndpoint::Unix(path) => format!("unix://{}", path.display()),
            DaemonEndpoint::Tcp(host) => format!("tcp://{}", host),
        }
    }
}

impl fmt::Display for DaemonEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_client_addr())
    }
}
