//! Command line surface shared by the fixture executables

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use upstream_core::{Behavior, Error, FixtureConfig, Preset, Response, Result, Transport};

/// Run one of the fixed fixtures and turn the outcome into an exit status.
pub fn run_preset(preset: Preset) -> ExitCode {
    upstream_core::logging::init();
    tracing::debug!(preset = preset.name(), "starting fixture");
    exit_code(upstream_core::run_until_ctrl_c(FixtureConfig::preset(preset)))
}

/// 0 after a clean shutdown, 1 when the fixture could not start
pub fn exit_code(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(fatal = e.is_fatal(), "{}", e);
            // reported even when RUST_LOG silences the subscriber
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PresetArg {
    FunctionalServerTcp,
    FunctionalServerUnix,
    DysfunctionalAcceptNotReadUnix,
    DysfunctionalListenNotAcceptTcp,
    DysfunctionalListenNotAcceptUnix,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::FunctionalServerTcp => Preset::FunctionalServerTcp,
            PresetArg::FunctionalServerUnix => Preset::FunctionalServerUnix,
            PresetArg::DysfunctionalAcceptNotReadUnix => Preset::DysfunctionalAcceptNotReadUnix,
            PresetArg::DysfunctionalListenNotAcceptTcp => Preset::DysfunctionalListenNotAcceptTcp,
            PresetArg::DysfunctionalListenNotAcceptUnix => Preset::DysfunctionalListenNotAcceptUnix,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BehaviorArg {
    Serve,
    AcceptOnly,
    ListenOnly,
}

impl From<BehaviorArg> for Behavior {
    fn from(arg: BehaviorArg) -> Self {
        match arg {
            BehaviorArg::Serve => Behavior::Serve,
            BehaviorArg::AcceptOnly => Behavior::AcceptOnly,
            BehaviorArg::ListenOnly => Behavior::ListenOnly,
        }
    }
}

/// Parameterized upstream fixture for probing reverse proxy behavior
#[derive(Debug, Parser)]
#[command(name = "upstream-fixture", version)]
pub struct Args {
    /// Start from one of the fixed fixtures; other flags override it
    #[arg(long, value_enum)]
    pub preset: Option<PresetArg>,

    /// Listen on a TCP address
    #[arg(long, conflicts_with = "unix")]
    pub tcp: Option<SocketAddr>,

    /// Listen on a Unix socket path (a stale file there is removed)
    #[arg(long)]
    pub unix: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub behavior: Option<BehaviorArg>,

    /// Upper bound for the single request read
    #[arg(long)]
    pub max_request_bytes: Option<usize>,

    /// Give up on a silent client after this many milliseconds
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    /// Listen backlog, defaults to SOMAXCONN
    #[arg(long)]
    pub backlog: Option<i32>,

    /// `Server` header of the canned response
    #[arg(long, default_value = upstream_core::response::DEFAULT_SERVER_NAME)]
    pub server_name: String,

    /// Body of the canned response
    #[arg(long, default_value = upstream_core::response::DEFAULT_BODY)]
    pub body: String,
}

impl Args {
    /// Resolve flags into a fixture configuration.
    pub fn into_config(self) -> Result<FixtureConfig> {
        let base = self.preset.map(|p| FixtureConfig::preset(p.into()));

        let transport = match (self.tcp, self.unix) {
            (Some(addr), _) => Transport::Tcp(addr),
            (None, Some(path)) => Transport::Unix(path),
            (None, None) => match &base {
                Some(config) => config.transport.clone(),
                None => {
                    return Err(Error::InvalidConfig(
                        "one of --preset, --tcp or --unix is required".to_string(),
                    ))
                }
            },
        };
        let behavior = self
            .behavior
            .map(Behavior::from)
            .or(base.as_ref().map(|config| config.behavior))
            .unwrap_or(Behavior::Serve);

        let mut config = FixtureConfig::new(transport, behavior)
            .with_response(&Response::canned_with(&self.server_name, self.body));
        if let Some(max) = self.max_request_bytes {
            config = config.with_max_request_bytes(max);
        }
        if let Some(ms) = self.read_timeout_ms {
            config = config.with_read_timeout(Some(Duration::from_millis(ms)));
        }
        if let Some(backlog) = self.backlog {
            config = config.with_backlog(backlog);
        }

        config.validate()?;
        Ok(config)
    }
}
