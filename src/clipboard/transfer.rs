//! Incremental Transfer Engine
//!
//! Moves payloads that do not fit into a single property write using the
//! ICCCM `INCR` convention:
//!
//! ```text
//! Outbound (daemon owns the selection)
//!
//!   begin      write INCR marker (total size)        STARTED
//!   ack #1     peer deletes property -> chunk 1      CHUNKING
//!   ...
//!   ack #n     chunk n (remaining <= chunk size)     CHUNKING
//!   ack #n+1   zero-length chunk, entry removed      COMPLETE
//!
//! Inbound (daemon converted a selection, owner answered with INCR)
//!
//!   begin_incoming     marker already read and deleted
//!   new value          read + delete chunk, append
//!   new value (empty)  payload complete, entry removed
//! ```
//!
//! An inbound payload that grows past the size limit is not abandoned
//! mid-stream: the owner only moves on once each chunk is deleted, so the
//! remaining chunks are read and dropped until the terminator, which is
//! then reported as `DataSizeExceeded`.
//!
//! Transfers are keyed by `(window, property)`. There is no timeout: a
//! peer that stops acknowledging leaves its entry pending until exit.

use crate::clipboard::error::{Result, SyncError};
use crate::clipboard::service::{Atom, ElementWidth, SelectionService, Timestamp, Window};
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Transfer limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    /// Largest single property write, bytes
    pub chunk_size: usize,

    /// Largest payload accepted from a selection owner, bytes
    pub max_incoming_size: usize,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            chunk_size: 256 * 1024,
            max_incoming_size: 16 * 1024 * 1024,
        }
    }
}

/// Outbound transfer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// INCR marker written, waiting for the first acknowledgement
    Started,
    /// At least one chunk written
    Chunking,
    /// Terminating chunk written
    Complete,
}

/// Identifies what a peer asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    /// Window receiving the data
    pub requestor: Window,
    /// Property on `requestor` the chunks are written to
    pub property: Atom,
    /// Selection being served
    pub selection: Atom,
    /// Timestamp of the request
    pub timestamp: Timestamp,
    /// Type each chunk is labelled with
    pub target: Atom,
    /// Element width of the payload
    pub width: ElementWidth,
}

/// One in-flight outbound transfer
#[derive(Debug, Clone)]
pub struct PendingTransfer {
    request: TransferRequest,
    payload: Bytes,
    offset: usize,
    chunk_size: usize,
    state: TransferState,
}

impl PendingTransfer {
    /// What was requested
    pub fn request(&self) -> &TransferRequest {
        &self.request
    }

    /// Total payload size
    pub fn total_size(&self) -> usize {
        self.payload.len()
    }

    /// Bytes written so far
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Current state
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Transfer progress percentage (0-100)
    pub fn percentage(&self) -> f64 {
        if self.payload.is_empty() {
            return 100.0;
        }
        (self.offset as f64 / self.payload.len() as f64) * 100.0
    }
}

/// Returned by [`TransferEngine::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferHandle {
    /// Requestor window
    pub requestor: Window,
    /// Property on the requestor
    pub property: Atom,
    /// Total payload size
    pub total_size: usize,
    /// Bytes per chunk
    pub chunk_size: usize,
}

/// Result of advancing an outbound transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// A non-empty chunk was written
    Continuing,
    /// The terminating chunk was written and the entry removed
    Completed,
    /// No transfer is pending for this key
    NoSuchTransfer,
}

/// One in-flight inbound transfer
#[derive(Debug)]
pub struct IncomingTransfer {
    selection: Atom,
    timestamp: Timestamp,
    data: BytesMut,
    width: Option<ElementWidth>,
    announced_size: usize,
    /// Bytes seen so far once the payload went over the limit
    discarded: Option<usize>,
}

/// A fully reassembled inbound payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingPayload {
    /// Selection the payload came from
    pub selection: Atom,
    /// Timestamp of the conversion request
    pub timestamp: Timestamp,
    /// Payload bytes
    pub data: Bytes,
    /// Element width (8 if the owner sent no data chunks)
    pub width: ElementWidth,
}

/// Result of feeding an inbound chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingOutcome {
    /// Chunk appended (or nothing to read yet)
    Continuing,
    /// Zero-length chunk received; entry removed
    Completed(IncomingPayload),
    /// No transfer is pending for this key
    NoSuchTransfer,
}

/// Transfer engine owning all in-flight chunked transfers
#[derive(Debug)]
pub struct TransferEngine {
    limits: TransferLimits,
    incr: Atom,
    pending: HashMap<(Window, Atom), PendingTransfer>,
    incoming: HashMap<(Window, Atom), IncomingTransfer>,
}

impl TransferEngine {
    /// Create a new transfer engine; `incr` is the `INCR` type atom
    pub fn new(limits: TransferLimits, incr: Atom) -> Self {
        Self {
            limits: TransferLimits {
                chunk_size: limits.chunk_size.max(4),
                ..limits
            },
            incr,
            pending: HashMap::new(),
            incoming: HashMap::new(),
        }
    }

    /// Limits in effect
    pub fn limits(&self) -> TransferLimits {
        self.limits
    }

    /// Whether `len` bytes need a chunked transfer
    pub fn needs_chunking(&self, len: usize) -> bool {
        len > self.limits.chunk_size
    }

    /// Pending outbound transfer for a key
    pub fn pending(&self, requestor: Window, property: Atom) -> Option<&PendingTransfer> {
        self.pending.get(&(requestor, property))
    }

    /// Number of pending outbound transfers
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether an inbound transfer is in flight for a key
    pub fn is_receiving(&self, window: Window, property: Atom) -> bool {
        self.incoming.contains_key(&(window, property))
    }

    /// Whether an inbound transfer is being drained without being kept
    pub fn is_discarding(&self, window: Window, property: Atom) -> bool {
        self.incoming
            .get(&(window, property))
            .is_some_and(|t| t.discarded.is_some())
    }

    /// Start an outbound transfer by writing the `INCR` marker
    ///
    /// The requestor's window is watched for property deletions while it
    /// has transfers pending. A transfer already pending under the same key
    /// is replaced.
    pub fn begin<S: SelectionService + ?Sized>(
        &mut self,
        service: &mut S,
        request: TransferRequest,
        payload: Bytes,
    ) -> Result<TransferHandle> {
        let key = (request.requestor, request.property);
        let total_size = payload.len();
        let chunk_size = aligned_chunk_size(self.limits.chunk_size, request.width);

        if !self.has_requestor(request.requestor) {
            service.watch_property_changes(request.requestor, true)?;
        }

        // Marker value is the (lower bound of the) total size in bytes
        let announced = u32::try_from(total_size).unwrap_or(u32::MAX);
        if let Err(e) = service.write_property(
            request.requestor,
            request.property,
            self.incr,
            ElementWidth::Bits32,
            &announced.to_ne_bytes(),
        ) {
            self.release_requestor(service, request.requestor);
            return Err(e);
        }

        let transfer = PendingTransfer {
            request,
            payload,
            offset: 0,
            chunk_size,
            state: TransferState::Started,
        };

        if self.pending.insert(key, transfer).is_some() {
            warn!(
                "Replaced pending transfer to window 0x{:x} property {}",
                request.requestor, request.property
            );
        }

        debug!(
            "Started INCR transfer to 0x{:x}: {} bytes in chunks of {}",
            request.requestor, total_size, chunk_size
        );

        Ok(TransferHandle {
            requestor: request.requestor,
            property: request.property,
            total_size,
            chunk_size,
        })
    }

    /// Write the next chunk of the transfer keyed by `(requestor, property)`
    ///
    /// Called once per consumption acknowledgement. A failed write drops
    /// the transfer.
    pub fn advance<S: SelectionService + ?Sized>(
        &mut self,
        service: &mut S,
        requestor: Window,
        property: Atom,
    ) -> Result<TransferOutcome> {
        let key = (requestor, property);
        let Some(transfer) = self.pending.get_mut(&key) else {
            return Ok(TransferOutcome::NoSuchTransfer);
        };

        let start = transfer.offset;
        let end = (start + transfer.chunk_size).min(transfer.payload.len());
        let chunk = transfer.payload.slice(start..end);

        if let Err(e) = service.write_property(
            requestor,
            property,
            transfer.request.target,
            transfer.request.width,
            &chunk,
        ) {
            self.pending.remove(&key);
            self.release_requestor(service, requestor);
            return Err(e);
        }

        if !chunk.is_empty() {
            transfer.offset = end;
            transfer.state = TransferState::Chunking;
            debug!(
                "INCR chunk to 0x{:x}: {} bytes ({:.0}%)",
                requestor,
                chunk.len(),
                transfer.percentage()
            );
            return Ok(TransferOutcome::Continuing);
        }

        transfer.state = TransferState::Complete;
        let total = transfer.payload.len();
        self.pending.remove(&key);
        self.release_requestor(service, requestor);

        debug!("INCR transfer to 0x{:x} complete: {} bytes", requestor, total);
        Ok(TransferOutcome::Completed)
    }

    /// Start reassembling an inbound `INCR` transfer
    ///
    /// The marker property must already have been read (and therefore
    /// deleted), which tells the owner to start sending chunks. A transfer
    /// announced above the size limit is drained without being kept.
    pub fn begin_incoming(
        &mut self,
        window: Window,
        property: Atom,
        selection: Atom,
        timestamp: Timestamp,
        announced_size: usize,
    ) {
        let max = self.limits.max_incoming_size;
        let oversized = announced_size > max;
        if oversized {
            warn!(
                "INCR transfer into property {} announces {} bytes (limit {}), discarding",
                property, announced_size, max
            );
        }

        self.incoming.insert(
            (window, property),
            IncomingTransfer {
                selection,
                timestamp,
                data: BytesMut::with_capacity(if oversized { 0 } else { announced_size }),
                width: None,
                announced_size,
                discarded: oversized.then_some(0),
            },
        );

        debug!(
            "Receiving INCR transfer into property {}: {} bytes announced",
            property, announced_size
        );
    }

    /// Read the next inbound chunk after the owner wrote it
    ///
    /// Every chunk is deleted, including those of a transfer that went over
    /// the size limit. Such a transfer ends with `DataSizeExceeded` once
    /// the terminator arrives.
    pub fn append_incoming<S: SelectionService + ?Sized>(
        &mut self,
        service: &mut S,
        window: Window,
        property: Atom,
    ) -> Result<IncomingOutcome> {
        let key = (window, property);
        let max = self.limits.max_incoming_size;
        let Some(transfer) = self.incoming.get_mut(&key) else {
            return Ok(IncomingOutcome::NoSuchTransfer);
        };

        let remaining = max.saturating_sub(transfer.data.len());
        let chunk = match service.read_property(window, property, remaining) {
            Ok(Some(chunk)) => chunk,
            // Deleted between notification and read; wait for the next value
            Ok(None) => return Ok(IncomingOutcome::Continuing),
            // The service deletes an oversized property without returning it
            Err(SyncError::DataSizeExceeded(len, _)) => {
                let seen = transfer.discarded.unwrap_or(transfer.data.len()) + len;
                if transfer.discarded.is_none() {
                    warn!(
                        "INCR transfer into property {} exceeds {} bytes, discarding",
                        property, max
                    );
                    transfer.data = BytesMut::new();
                }
                transfer.discarded = Some(seen);
                return Ok(IncomingOutcome::Continuing);
            }
            Err(e) => {
                self.incoming.remove(&key);
                return Err(e);
            }
        };

        if let Some(seen) = transfer.discarded.as_mut() {
            if !chunk.data.is_empty() {
                *seen += chunk.data.len();
                return Ok(IncomingOutcome::Continuing);
            }
            let seen = *seen;
            self.incoming.remove(&key);
            return Err(SyncError::DataSizeExceeded(seen, max));
        }

        if chunk.data.is_empty() {
            let Some(transfer) = self.incoming.remove(&key) else {
                return Ok(IncomingOutcome::NoSuchTransfer);
            };
            if transfer.data.len() != transfer.announced_size {
                debug!(
                    "INCR transfer announced {} bytes, received {}",
                    transfer.announced_size,
                    transfer.data.len()
                );
            }
            return Ok(IncomingOutcome::Completed(IncomingPayload {
                selection: transfer.selection,
                timestamp: transfer.timestamp,
                data: transfer.data.freeze(),
                width: transfer.width.unwrap_or(ElementWidth::Bits8),
            }));
        }

        transfer.width.get_or_insert(chunk.width);
        transfer.data.extend_from_slice(&chunk.data);
        Ok(IncomingOutcome::Continuing)
    }

    fn has_requestor(&self, requestor: Window) -> bool {
        self.pending.keys().any(|(window, _)| *window == requestor)
    }

    /// Stop watching a requestor once it has nothing pending
    fn release_requestor<S: SelectionService + ?Sized>(&self, service: &mut S, requestor: Window) {
        if self.has_requestor(requestor) {
            return;
        }
        if let Err(e) = service.watch_property_changes(requestor, false) {
            debug!("Could not unwatch window 0x{:x}: {}", requestor, e);
        }
    }
}

/// Largest multiple of the element size not above `limit`
fn aligned_chunk_size(limit: usize, width: ElementWidth) -> usize {
    let element = width.bytes();
    (limit - limit % element).max(element)
}
