//! Selection Sync Daemon
//!
//! Startup sequence and the blocking event loop.
//!
//! ```text
//! connect ─> check XFIXES ─> resolve selections + targets ─> watch sources
//!        ─> seed from current owner ─> loop { wait ─> dispatch }
//! ```
//!
//! The loop runs on its own OS thread because the wait blocks without a
//! timeout. [`run`] drives it from async code alongside `SIGINT`/`SIGTERM`
//! handling.

use anyhow::{Context, Result as AnyResult};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::clipboard::{
    ProtocolDispatcher, Result, SelectionRegistry, SelectionService, SyncError, TargetAtoms,
    TransferLimits, CURRENT_TIME,
};
use crate::config::Config;
use crate::x11::X11SelectionService;

/// Extension providing ownership change notifications
const OWNERSHIP_EXTENSION: &str = "XFIXES";

/// The sync engine bound to a selection service
#[derive(Debug)]
pub struct SyncDaemon<S: SelectionService> {
    service: S,
    dispatcher: ProtocolDispatcher,
}

impl<S: SelectionService> SyncDaemon<S> {
    /// Prepare the engine: resolve names, subscribe to ownership changes
    ///
    /// Every failure here is fatal.
    pub fn new(mut service: S, config: &Config) -> Result<Self> {
        let mode = config.sync_mode()?;

        let code = service
            .extension_notification_code(OWNERSHIP_EXTENSION)?
            .ok_or_else(|| {
                SyncError::ConnectionFatal(format!(
                    "display does not support the {OWNERSHIP_EXTENSION} extension"
                ))
            })?;
        debug!("{} notifications start at code {}", OWNERSHIP_EXTENSION, code);

        let registry = SelectionRegistry::resolve(
            &mut service,
            mode,
            &config.selections.a,
            &config.selections.b,
        )?;
        let targets = TargetAtoms::resolve(&mut service).map_err(|e| match e {
            SyncError::ConnectionFatal(_) => e,
            other => SyncError::UnresolvedName(format!("target atoms: {other}")),
        })?;

        for selection in registry.iter().filter(|s| s.watch) {
            service.watch_ownership_changes(selection.id)?;
            info!("Watching {}", selection.name);
        }

        let limits = TransferLimits {
            chunk_size: config.transfer.chunk_size.min(service.max_atomic_write()),
            max_incoming_size: config.transfer.max_size,
        };
        debug!(
            "Transfer limits: {} byte chunks, {} byte payloads",
            limits.chunk_size, limits.max_incoming_size
        );

        info!(
            "Syncing {} and {} ({})",
            config.selections.a, config.selections.b, mode
        );

        let dispatcher = ProtocolDispatcher::new(service.window(), registry, targets, limits);
        Ok(Self {
            service,
            dispatcher,
        })
    }

    /// Request the current content of the source selection
    ///
    /// Without this the buffer would stay empty until the next copy.
    pub fn seed(&mut self) -> Result<()> {
        let Some(source) = self.dispatcher.registry().seed_source() else {
            return Ok(());
        };
        let (id, name) = (source.id, source.name.clone());

        match self.service.current_owner(id)? {
            Some(owner) if owner != self.service.window() => {
                debug!("Seeding from current owner of {}", name);
                self.dispatcher.request_sync(&mut self.service, id, CURRENT_TIME)
            }
            _ => {
                debug!("{} has no foreign owner, nothing to seed", name);
                Ok(())
            }
        }
    }

    /// Wait for one notification and handle it
    pub fn step(&mut self) -> Result<()> {
        let notification = self.service.wait_for_next_notification()?;
        self.dispatcher.dispatch(&mut self.service, notification)
    }

    /// Seed, then handle notifications until a fatal error
    pub fn run(mut self) -> Result<()> {
        self.seed()?;
        info!("Selection sync running");

        loop {
            self.step()?;
        }
    }

    /// The engine state
    pub fn dispatcher(&self) -> &ProtocolDispatcher {
        &self.dispatcher
    }

    /// The underlying service
    pub fn service(&self) -> &S {
        &self.service
    }

    /// The underlying service, mutably
    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }
}

/// Connect to the display and run until a signal or a fatal error
///
/// A signal is a clean shutdown; a lost connection or a startup failure is
/// returned as an error.
pub async fn run(config: Config, display: Option<String>) -> AnyResult<()> {
    let (tx, rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("selection-sync".to_string())
        .spawn(move || {
            let result = X11SelectionService::connect(display.as_deref())
                .and_then(|service| SyncDaemon::new(service, &config))
                .and_then(SyncDaemon::run);
            // Receiver is gone only when a signal already ended main
            let _ = tx.send(result);
        })
        .context("Failed to spawn event loop thread")?;

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = rx => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e).context("Selection sync stopped"),
            Err(_) => anyhow::bail!("Event loop thread exited without a result"),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
            Ok(())
        }
    }
}
