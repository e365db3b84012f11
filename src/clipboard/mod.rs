//! Selection Synchronization Module
//!
//! Keeps two selections of a display (by default `PRIMARY` and
//! `CLIPBOARD`) holding the same text, in one or both directions.
//!
//! # Architecture
//!
//! - [`SelectionService`] - the windowing system primitives the engine needs
//! - [`SelectionRegistry`] - the two selections, partner links, watch flags
//! - [`OwnershipCoordinator`] - claim-then-verify ownership of a selection
//! - [`ClipboardBuffer`] - the payload most recently synchronized
//! - [`TransferEngine`] - chunked (`INCR`) transfers in both directions
//! - [`ProtocolDispatcher`] - one handler per [`Notification`]
//!
//! # Data Flow
//!
//! ```text
//! App A                 Display               Daemon                       App B
//! ━━━━━                 ━━━━━━━               ━━━━━━                       ━━━━━
//!
//! select text
//!   └─> SetSelectionOwner(A)
//!                         └─> OwnershipChange ─> request_conversion(A)
//!   <── ConvertSelection ─────┘
//!   └─> property + SelectionNotify ─> DataReady ─> claim(B) ─> buffer
//!
//!                                                     paste
//!                         SelectionRequest(B) <──────────┘
//!                         PeerDataRequest ─> write property ─> notify ─> read
//! ```
//!
//! # Features
//!
//! - **Sync modes**: bidirectional, A to B, B to A
//! - **Text targets**: `UTF8_STRING`, `STRING`, `TEXT`, `text/plain` variants
//! - **Chunked transfers**: `INCR` for payloads above the atomic write limit
//! - **Loop prevention**: the daemon's own ownership changes are ignored

pub mod buffer;
pub mod dispatcher;
pub mod error;
pub mod formats;
pub mod memory;
pub mod ownership;
pub mod registry;
pub mod service;
pub mod sync;
pub mod transfer;

pub use buffer::{calculate_hash, ClipboardBuffer, Payload};
pub use dispatcher::ProtocolDispatcher;
pub use error::{classify_error, recovery_action, ErrorType, RecoveryAction, Result, SyncError};
pub use formats::{TargetAtoms, TargetClass};
pub use memory::MemorySelectionService;
pub use ownership::OwnershipCoordinator;
pub use registry::{ResolvedSelection, Selection, SelectionRegistry};
pub use service::{
    Atom, ElementWidth, Notification, PropertyData, SelectionReply, SelectionRequest,
    SelectionService, Timestamp, Window, CURRENT_TIME,
};
pub use sync::SyncMode;
pub use transfer::{
    IncomingOutcome, IncomingPayload, PendingTransfer, TransferEngine, TransferHandle,
    TransferLimits, TransferOutcome, TransferRequest, TransferState,
};
