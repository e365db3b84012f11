//! # lamco-selection-sync
//!
//! X11 selection synchronization daemon: keeps `PRIMARY` and `CLIPBOARD`
//! (or any two configured selections) holding the same text.
//!
//! # Architecture
//!
//! ```text
//! lamco-selection-sync
//!   ├─> Config (TOML file + CLI overrides)
//!   ├─> SyncDaemon (startup, seeding, blocking event loop)
//!   │     └─> ProtocolDispatcher
//!   │           ├─> SelectionRegistry (partners, watch flags)
//!   │           ├─> OwnershipCoordinator (claim + verify)
//!   │           ├─> ClipboardBuffer (last synced payload)
//!   │           └─> TransferEngine (INCR in both directions)
//!   └─> X11SelectionService (x11rb + XFixes)
//! ```
//!
//! # Data Flow
//!
//! **Sync Path:** owner change → conversion request → data ready → claim
//! partner → buffer
//!
//! **Serve Path:** peer request → buffer → property write (atomic or INCR) →
//! selection notify

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Selection synchronization engine
pub mod clipboard;

/// Daemon configuration
pub mod config;

/// Startup and event loop
pub mod daemon;

/// Utility functions
pub mod utils;

/// X11 selection service
pub mod x11;

pub use clipboard::{SelectionService, SyncError, SyncMode};
pub use config::Config;
pub use daemon::SyncDaemon;
