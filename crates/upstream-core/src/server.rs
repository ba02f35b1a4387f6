//! Connection acceptor and the three fixture behaviors
//!
//! - `Serve`: read once, write the canned response, close
//! - `AcceptOnly`: accept and hold, never read, write or close
//! - `ListenOnly`: never accept, so the kernel backlog fills
//!
//! Connections are handled one at a time. A slow client stalls the fixture.
//! TCP fixtures also sample their accept queue depth and log it at `debug`.

use crate::backlog;
use crate::config::{Behavior, FixtureConfig};
use crate::request::read_request;
use crate::response::write_response;
use crate::transport::{self, Addr, Connection, Listener};
use crate::{Error, Result};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Lifecycle of a fixture
///
/// `Unbound -> Bound -> Listening -> (Accepting | Idle)`, or `Unbound -> Failed`.
/// `Stopped` is reached only through cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FixtureState {
    Unbound = 0,
    Bound = 1,
    Listening = 2,
    Accepting = 3,
    Idle = 4,
    Failed = 5,
    Stopped = 6,
}

impl FixtureState {
    fn from_u8(code: u8) -> Self {
        match code {
            1 => FixtureState::Bound,
            2 => FixtureState::Listening,
            3 => FixtureState::Accepting,
            4 => FixtureState::Idle,
            5 => FixtureState::Failed,
            6 => FixtureState::Stopped,
            _ => FixtureState::Unbound,
        }
    }
}

/// Counters and state of a running fixture
///
/// Shared with tests and the binaries so they can observe what the fixture did
/// without talking to it over the socket.
#[derive(Debug)]
pub struct FixtureStats {
    state: AtomicU8,
    /// Connections returned by accept
    accepted: AtomicU64,
    /// Connections that received the response
    served: AtomicU64,
    /// Connections abandoned after a per-connection error
    failed: AtomicU64,
    /// Connections currently held open by `AcceptOnly`
    held: AtomicU64,
    /// Accept queue depth at the last sample
    queued: AtomicU64,
}

impl Default for FixtureStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureStats {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(FixtureState::Unbound as u8),
            accepted: AtomicU64::new(0),
            served: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            held: AtomicU64::new(0),
            queued: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn state(&self) -> FixtureState {
        FixtureState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: FixtureState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    #[inline]
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn held(&self) -> u64 {
        self.held.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn queued(&self) -> u64 {
        self.queued.load(Ordering::SeqCst)
    }
}

/// A bound, listening fixture
pub struct Fixture {
    config: FixtureConfig,
    listener: Listener,
    stats: Arc<FixtureStats>,
}

impl Fixture {
    /// Validate the configuration, then create, bind and listen.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(config: FixtureConfig) -> Result<Self> {
        let stats = Arc::new(FixtureStats::new());

        let listener = config
            .validate()
            .and_then(|()| transport::bind(&config.transport, config.backlog))
            .and_then(|l| {
                stats.set_state(FixtureState::Bound);
                l.into_tokio().map_err(Error::Runtime)
            });
        let listener = match listener {
            Ok(l) => l,
            Err(e) => {
                stats.set_state(FixtureState::Failed);
                return Err(e);
            }
        };
        stats.set_state(FixtureState::Listening);

        tracing::info!(
            transport = %config.transport,
            behavior = %config.behavior,
            backlog = config.backlog,
            "server listening for connections"
        );

        Ok(Self {
            config,
            listener,
            stats,
        })
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }

    /// Address the listener is bound to (resolves port 0)
    pub fn local_addr(&self) -> Result<Addr> {
        self.listener.local_addr().map_err(Error::LocalAddr)
    }

    pub fn stats(&self) -> Arc<FixtureStats> {
        self.stats.clone()
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Per-connection failures are logged and never end the loop.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        match self.config.behavior {
            Behavior::ListenOnly => self.idle(shutdown).await,
            Behavior::Serve | Behavior::AcceptOnly => self.accept_loop(shutdown).await,
        }
        Ok(())
    }

    async fn idle(&self, shutdown: CancellationToken) {
        self.stats.set_state(FixtureState::Idle);
        tracing::debug!("not accepting, waiting for shutdown");

        // the listener stays open until self drops
        let mut ticker = self.queue_ticker();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick(&mut ticker) => self.report_queue(),
            }
        }
        self.stats.set_state(FixtureState::Stopped);
    }

    /// Only TCP listeners show up in `/proc/net/tcp`
    fn queue_ticker(&self) -> Option<Interval> {
        let period = self.config.queue_report_interval?;
        if !matches!(self.listener, Listener::Tcp(_)) {
            return None;
        }
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(ticker)
    }

    fn report_queue(&self) {
        let Ok(Addr::Tcp(addr)) = self.local_addr() else {
            return;
        };
        match backlog::accept_queue_depth(addr) {
            Ok(Some(depth)) => {
                self.stats.queued.store(u64::from(depth), Ordering::SeqCst);
                tracing::debug!(queued = depth, backlog = self.config.backlog, "accept queue");
            }
            Ok(None) => tracing::trace!(addr = %addr, "listener not visible in procfs"),
            Err(e) => tracing::debug!(error = %e, "accept queue unavailable"),
        }
    }

    async fn accept_loop(&self, shutdown: CancellationToken) {
        self.stats.set_state(FixtureState::Accepting);

        // AcceptOnly connections live here until the fixture stops
        let mut held: Vec<Connection> = Vec::new();
        let mut ticker = self.queue_ticker();

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick(&mut ticker) => {
                    self.report_queue();
                    continue;
                }
                accepted = self.listener.accept() => accepted,
            };

            let (conn, peer) = match accepted {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!(error = %Error::Accept(e), "accept failed");
                    continue;
                }
            };
            self.stats.accepted.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(peer = %peer, "connection accepted");

            // getsockname on the accepted socket; the result is only logged
            let local = match conn.local_addr() {
                Ok(addr) => addr,
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::SeqCst);
                    tracing::warn!(peer = %peer, error = %Error::LocalAddr(e), "connection abandoned");
                    continue;
                }
            };

            if self.config.behavior == Behavior::AcceptOnly {
                held.push(conn);
                self.stats.held.fetch_add(1, Ordering::SeqCst);
                tracing::trace!(peer = %peer, local = %local, held = held.len(), "holding connection");
                continue;
            }

            tracing::trace!(peer = %peer, local = %local, "serving");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.serve(conn, &peer) => {
                    if let Err(e) = result {
                        self.stats.failed.fetch_add(1, Ordering::SeqCst);
                        tracing::warn!(peer = %peer, error = %e, "connection abandoned");
                    }
                }
            }
        }

        tracing::debug!(held = held.len(), "accept loop stopped");
        self.stats.held.store(0, Ordering::SeqCst);
        self.stats.set_state(FixtureState::Stopped);
    }

    /// Read once, answer with the canned bytes, close.
    async fn serve(&self, mut conn: Connection, peer: &Addr) -> Result<()> {
        match read_request(&mut conn, self.config.max_request_bytes, self.config.read_timeout).await {
            Ok(head) => match &head.line {
                Some(line) => tracing::debug!(
                    peer = %peer,
                    method = %line.method,
                    uri = %line.uri,
                    version = %line.version,
                    known = line.known_method().is_some(),
                    "request"
                ),
                None => tracing::debug!(
                    peer = %peer,
                    bytes = head.raw.len(),
                    closed_without_data = head.is_empty(),
                    "no request line"
                ),
            },
            // the response does not depend on the request
            Err(e @ Error::RequestTooLarge { .. }) => {
                tracing::warn!(peer = %peer, error = %e, "answering anyway")
            }
            Err(e) => return Err(e),
        }

        write_response(&mut conn, &self.config.response).await?;
        self.stats.served.fetch_add(1, Ordering::SeqCst);

        // dropping closes the connection
        drop(conn);
        Ok(())
    }
}

/// Next queue sample, or never when sampling is off
async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Bind `config` and run it on a current-thread runtime until Ctrl-C.
///
/// This is what every fixture binary calls; the caller maps the error to exit status 1.
pub fn run_until_ctrl_c(config: FixtureConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
        .map_err(Error::Runtime)?;

    runtime.block_on(async move {
        let fixture = Fixture::bind(config)?;
        let shutdown = CancellationToken::new();

        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("shutting down");
                    signal_token.cancel();
                }
                // keep running; only an external kill stops the fixture now
                Err(e) => tracing::warn!(error = %e, "cannot listen for ctrl-c"),
            }
        });

        fixture.run(shutdown).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;
    use crate::transport::Transport;

    fn local_tcp(behavior: Behavior) -> FixtureConfig {
        FixtureConfig::new(Transport::Tcp("127.0.0.1:0".parse().unwrap()), behavior)
    }

    #[test]
    fn test_state_codes() {
        for state in [
            FixtureState::Unbound,
            FixtureState::Bound,
            FixtureState::Listening,
            FixtureState::Accepting,
            FixtureState::Idle,
            FixtureState::Failed,
            FixtureState::Stopped,
        ] {
            assert_eq!(FixtureState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_stats_start_empty() {
        let stats = FixtureStats::new();
        assert_eq!(stats.state(), FixtureState::Unbound);
        assert_eq!(stats.accepted(), 0);
        assert_eq!(stats.served(), 0);
        assert_eq!(stats.failed(), 0);
        assert_eq!(stats.held(), 0);
        assert_eq!(stats.queued(), 0);
    }

    #[tokio::test]
    async fn test_bind_sets_listening() {
        let fixture = Fixture::bind(local_tcp(Behavior::Serve)).unwrap();
        assert_eq!(fixture.stats().state(), FixtureState::Listening);
        assert!(matches!(fixture.local_addr().unwrap(), Addr::Tcp(a) if a.port() != 0));
    }

    #[tokio::test]
    async fn test_invalid_config_never_binds() {
        let config = local_tcp(Behavior::Serve).with_max_request_bytes(0);
        let err = Fixture::bind(config).err().unwrap();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_listen_only_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let config = FixtureConfig::new(
            Transport::Unix(dir.path().join("q.sock")),
            Preset::DysfunctionalListenNotAcceptUnix.behavior(),
        );

        let fixture = Fixture::bind(config).unwrap();
        let stats = fixture.stats();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        fixture.run(shutdown).await.unwrap();
        assert_eq!(stats.state(), FixtureState::Stopped);
        assert_eq!(stats.accepted(), 0);
    }

    #[tokio::test]
    async fn test_queue_ticker_tcp_only() {
        let tcp = Fixture::bind(local_tcp(Behavior::ListenOnly)).unwrap();
        assert!(tcp.queue_ticker().is_some());

        let quiet = local_tcp(Behavior::ListenOnly).with_queue_report_interval(None);
        assert!(Fixture::bind(quiet).unwrap().queue_ticker().is_none());

        let dir = tempfile::tempdir().unwrap();
        let unix = FixtureConfig::new(Transport::Unix(dir.path().join("q.sock")), Behavior::ListenOnly);
        assert!(Fixture::bind(unix).unwrap().queue_ticker().is_none());
    }
}
