//! Fixture configuration and the built-in presets

use crate::request::{DEFAULT_MAX_REQUEST_BYTES, MAX_REQUEST_BYTES_LIMIT};
use crate::response::Response;
use crate::transport::{Transport, DEFAULT_BACKLOG};
use crate::{Error, Result};
use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

// These must match the upstream{} blocks in nginx.conf
pub const FUNCTIONAL_TCP_PORT: u16 = 8080;
pub const LISTEN_ONLY_TCP_PORT: u16 = 9074;
pub const Q_SERVER_SOCK: &str = "/var/run/q-server.sock";
pub const PROXY_ANALYSIS_SOCK: &str = "/var/run/nginx-proxy-analysis.sock";

pub const DEFAULT_QUEUE_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// What a fixture does once it is listening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Read the request, write the canned response, close
    Serve,
    /// Accept and hold every connection, never read or write
    AcceptOnly,
    /// Never call accept
    ListenOnly,
}

impl Behavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Behavior::Serve => "serve",
            Behavior::AcceptOnly => "accept-only",
            Behavior::ListenOnly => "listen-only",
        }
    }
}

impl std::fmt::Display for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed fixtures the proxy test matrix expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    FunctionalServerTcp,
    FunctionalServerUnix,
    DysfunctionalAcceptNotReadUnix,
    DysfunctionalListenNotAcceptTcp,
    DysfunctionalListenNotAcceptUnix,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::FunctionalServerTcp,
        Preset::FunctionalServerUnix,
        Preset::DysfunctionalAcceptNotReadUnix,
        Preset::DysfunctionalListenNotAcceptTcp,
        Preset::DysfunctionalListenNotAcceptUnix,
    ];

    /// Executable name of the preset
    pub fn name(&self) -> &'static str {
        match self {
            Preset::FunctionalServerTcp => "functional-server-tcp",
            Preset::FunctionalServerUnix => "functional-server-unix",
            Preset::DysfunctionalAcceptNotReadUnix => "dysfunctional-accept-not-read-unix",
            Preset::DysfunctionalListenNotAcceptTcp => "dysfunctional-listen-not-accept-tcp",
            Preset::DysfunctionalListenNotAcceptUnix => "dysfunctional-listen-not-accept-unix",
        }
    }

    pub fn transport(&self) -> Transport {
        let any = |port: u16| Transport::Tcp(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
        match self {
            Preset::FunctionalServerTcp => any(FUNCTIONAL_TCP_PORT),
            Preset::DysfunctionalListenNotAcceptTcp => any(LISTEN_ONLY_TCP_PORT),
            Preset::FunctionalServerUnix | Preset::DysfunctionalListenNotAcceptUnix => {
                Transport::Unix(PathBuf::from(Q_SERVER_SOCK))
            }
            Preset::DysfunctionalAcceptNotReadUnix => {
                Transport::Unix(PathBuf::from(PROXY_ANALYSIS_SOCK))
            }
        }
    }

    pub fn behavior(&self) -> Behavior {
        match self {
            Preset::FunctionalServerTcp | Preset::FunctionalServerUnix => Behavior::Serve,
            Preset::DysfunctionalAcceptNotReadUnix => Behavior::AcceptOnly,
            Preset::DysfunctionalListenNotAcceptTcp | Preset::DysfunctionalListenNotAcceptUnix => {
                Behavior::ListenOnly
            }
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown preset: {}", s)))
    }
}

/// Everything a fixture needs to start
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub transport: Transport,
    pub behavior: Behavior,
    /// Pre-rendered response bytes, sent as-is by `Serve`
    pub response: Bytes,
    /// Upper bound for the single request read
    pub max_request_bytes: usize,
    /// `None` blocks on read indefinitely
    pub read_timeout: Option<Duration>,
    pub backlog: i32,
    /// How often a TCP listener's accept queue depth is sampled and logged
    pub queue_report_interval: Option<Duration>,
}

impl FixtureConfig {
    pub fn new(transport: Transport, behavior: Behavior) -> Self {
        Self {
            transport,
            behavior,
            response: Response::canned().to_http10_bytes(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            read_timeout: None,
            backlog: DEFAULT_BACKLOG,
            queue_report_interval: Some(DEFAULT_QUEUE_REPORT_INTERVAL),
        }
    }

    pub fn preset(preset: Preset) -> Self {
        Self::new(preset.transport(), preset.behavior())
    }

    pub fn with_response(mut self, response: &Response) -> Self {
        self.response = response.to_http10_bytes();
        self
    }

    pub fn with_max_request_bytes(mut self, max: usize) -> Self {
        self.max_request_bytes = max;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_queue_report_interval(mut self, interval: Option<Duration>) -> Self {
        self.queue_report_interval = interval;
        self
    }

    /// Reject values that cannot produce a working fixture.
    pub fn validate(&self) -> Result<()> {
        if self.max_request_bytes == 0 {
            return Err(Error::InvalidConfig(
                "max_request_bytes must be greater than 0".to_string(),
            ));
        }
        if self.max_request_bytes > MAX_REQUEST_BYTES_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "max_request_bytes must be at most {}, got {}",
                MAX_REQUEST_BYTES_LIMIT, self.max_request_bytes
            )));
        }
        if self.backlog < 0 {
            return Err(Error::InvalidConfig(format!(
                "backlog must not be negative, got {}",
                self.backlog
            )));
        }
        if self.queue_report_interval == Some(Duration::ZERO) {
            return Err(Error::InvalidConfig(
                "queue_report_interval must be greater than 0".to_string(),
            ));
        }
        if let Transport::Unix(path) = &self.transport {
            if path.as_os_str().is_empty() {
                return Err(Error::InvalidConfig("unix socket path is empty".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_matrix() {
        let tcp = FixtureConfig::preset(Preset::FunctionalServerTcp);
        assert_eq!(tcp.transport, Transport::Tcp("0.0.0.0:8080".parse().unwrap()));
        assert_eq!(tcp.behavior, Behavior::Serve);

        let hang = FixtureConfig::preset(Preset::DysfunctionalAcceptNotReadUnix);
        assert_eq!(
            hang.transport,
            Transport::Unix(PathBuf::from("/var/run/nginx-proxy-analysis.sock"))
        );
        assert_eq!(hang.behavior, Behavior::AcceptOnly);

        let full = FixtureConfig::preset(Preset::DysfunctionalListenNotAcceptTcp);
        assert_eq!(full.transport, Transport::Tcp("0.0.0.0:9074".parse().unwrap()));
        assert_eq!(full.behavior, Behavior::ListenOnly);

        // the functional and listen-only unix fixtures share a socket path
        assert_eq!(
            Preset::FunctionalServerUnix.transport(),
            Preset::DysfunctionalListenNotAcceptUnix.transport()
        );
    }

    #[test]
    fn test_preset_names_round_trip() {
        for preset in Preset::ALL {
            assert_eq!(preset.name().parse::<Preset>().unwrap(), preset);
        }
        assert!("functional-server-udp".parse::<Preset>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = FixtureConfig::preset(Preset::FunctionalServerUnix);
        assert_eq!(config.max_request_bytes, 1024);
        assert_eq!(config.backlog, libc::SOMAXCONN);
        assert!(config.read_timeout.is_none());
        assert_eq!(config.response, Response::canned().to_http10_bytes());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_buffer() {
        let config = FixtureConfig::preset(Preset::FunctionalServerTcp).with_max_request_bytes(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = FixtureConfig::preset(Preset::FunctionalServerTcp).with_backlog(-1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unbounded_buffer() {
        let config =
            FixtureConfig::preset(Preset::FunctionalServerTcp).with_max_request_bytes(usize::MAX);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = FixtureConfig::preset(Preset::FunctionalServerTcp)
            .with_max_request_bytes(MAX_REQUEST_BYTES_LIMIT + 1);
        assert!(config.validate().is_err());

        let config = FixtureConfig::preset(Preset::FunctionalServerTcp)
            .with_max_request_bytes(MAX_REQUEST_BYTES_LIMIT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_queue_report_interval() {
        let config = FixtureConfig::preset(Preset::DysfunctionalListenNotAcceptTcp);
        assert_eq!(config.queue_report_interval, Some(DEFAULT_QUEUE_REPORT_INTERVAL));

        assert!(config.clone().with_queue_report_interval(None).validate().is_ok());
        let zero = config.with_queue_report_interval(Some(Duration::ZERO));
        assert!(matches!(zero.validate(), Err(Error::InvalidConfig(_))));
    }
}
