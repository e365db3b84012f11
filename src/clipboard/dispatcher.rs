//! Protocol Dispatcher
//!
//! Routes each [`Notification`] to its handler and ties the registry,
//! buffer, ownership coordinator and transfer engine together.
//!
//! # Sync cycle
//!
//! ```text
//! OwnershipChange(A, owner)   A watched, owner is someone else
//!         |
//!         v
//! request_conversion(A, UTF8_STRING, LAMCO_SELSYNC_A)
//!         |
//!         v
//! DataReady(A)  --INCR-->  PropertyNewValue ... (empty chunk)
//!         |                            |
//!         v                            v
//!    claim(partner(A)) --ok--> buffer.replace(payload)
//!
//! PeerDataRequest(B)  ->  serve from buffer (atomic or INCR)  ->  notify_peer
//! ```
//!
//! Handler errors are returned from [`ProtocolDispatcher::handle`];
//! [`ProtocolDispatcher::dispatch`] logs and swallows every error that is
//! not fatal.

use crate::clipboard::buffer::ClipboardBuffer;
use crate::clipboard::error::{classify_error, ErrorType, Result, SyncError};
use crate::clipboard::formats::{TargetAtoms, TargetClass};
use crate::clipboard::ownership::OwnershipCoordinator;
use crate::clipboard::registry::SelectionRegistry;
use crate::clipboard::service::{
    Atom, ElementWidth, Notification, SelectionReply, SelectionRequest, SelectionService,
    Timestamp, Window, CURRENT_TIME,
};
use crate::clipboard::transfer::{
    IncomingOutcome, TransferEngine, TransferLimits, TransferOutcome, TransferRequest,
};
use bytes::Bytes;
use tracing::{debug, error, info, trace, warn};

/// Event handler for the sync engine
#[derive(Debug)]
pub struct ProtocolDispatcher {
    window: Window,
    registry: SelectionRegistry,
    targets: TargetAtoms,
    buffer: ClipboardBuffer,
    ownership: OwnershipCoordinator,
    transfers: TransferEngine,
}

impl ProtocolDispatcher {
    /// Create a dispatcher acting for `window`
    pub fn new(
        window: Window,
        registry: SelectionRegistry,
        targets: TargetAtoms,
        limits: TransferLimits,
    ) -> Self {
        Self {
            window,
            registry,
            targets,
            buffer: ClipboardBuffer::new(),
            ownership: OwnershipCoordinator::new(window),
            transfers: TransferEngine::new(limits, targets.incr),
        }
    }

    /// The daemon's window
    pub fn window(&self) -> Window {
        self.window
    }

    /// Managed selections
    pub fn registry(&self) -> &SelectionRegistry {
        &self.registry
    }

    /// Synchronized payload
    pub fn buffer(&self) -> &ClipboardBuffer {
        &self.buffer
    }

    /// In-flight chunked transfers
    pub fn transfers(&self) -> &TransferEngine {
        &self.transfers
    }

    /// Resolved target atoms
    pub fn targets(&self) -> &TargetAtoms {
        &self.targets
    }

    /// Handle one notification, swallowing non-fatal errors
    pub fn dispatch<S: SelectionService + ?Sized>(
        &mut self,
        service: &mut S,
        notification: Notification,
    ) -> Result<()> {
        match self.handle(service, notification) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => {
                error!("Fatal error: {}", e);
                Err(e)
            }
            Err(e) => {
                match classify_error(&e) {
                    ErrorType::Data => debug!("Sync skipped: {}", e),
                    _ => warn!("{}", e),
                }
                Ok(())
            }
        }
    }

    /// Handle one notification
    pub fn handle<S: SelectionService + ?Sized>(
        &mut self,
        service: &mut S,
        notification: Notification,
    ) -> Result<()> {
        trace!("Notification: {:?}", notification);

        match notification {
            Notification::OwnershipChange {
                selection,
                owner,
                timestamp,
            } => self.on_ownership_change(service, selection, owner, timestamp),
            Notification::DataReady {
                requestor,
                property,
                selection,
                target,
                timestamp,
            } => self.on_data_ready(service, requestor, property, selection, target, timestamp),
            Notification::PeerDataRequest(request) => self.on_peer_data_request(service, request),
            Notification::SelectionClear {
                selection,
                timestamp,
            } => {
                self.on_selection_clear(selection, timestamp);
                Ok(())
            }
            Notification::PropertyConsumed { window, property } => {
                self.on_property_consumed(service, window, property)
            }
            Notification::PropertyNewValue { window, property } => {
                self.on_property_new_value(service, window, property)
            }
            Notification::ServiceError(description) => Err(SyncError::Service(description)),
            Notification::Unrecognized { code } => {
                debug!("Ignoring notification with code {}", code);
                Ok(())
            }
        }
    }

    /// Ask the owner of a watched selection for its content
    ///
    /// Used for ownership changes and for seeding the buffer at startup.
    pub fn request_sync<S: SelectionService + ?Sized>(
        &self,
        service: &mut S,
        selection: Atom,
        timestamp: Timestamp,
    ) -> Result<()> {
        let Some(entry) = self.registry.lookup_by_id(selection) else {
            return Ok(());
        };

        debug!("Requesting {} as UTF8_STRING", entry.name);
        service.request_conversion(
            selection,
            self.targets.utf8_string,
            entry.conversion_property,
            timestamp,
        )
    }

    fn on_ownership_change<S: SelectionService + ?Sized>(
        &mut self,
        service: &mut S,
        selection: Atom,
        owner: Option<Window>,
        timestamp: Timestamp,
    ) -> Result<()> {
        let Some(entry) = self.registry.lookup_by_id(selection) else {
            debug!("Ownership change on unmanaged selection 0x{:x}", selection);
            return Ok(());
        };
        if !entry.watch {
            debug!("{} is not watched, ignoring ownership change", entry.name);
            return Ok(());
        }

        match owner {
            None => {
                debug!("{} is no longer owned", entry.name);
                self.registry.record_owner(selection, None, None);
                Ok(())
            }
            // Our own claim on a partner selection
            Some(owner) if owner == self.window => Ok(()),
            Some(owner) => {
                debug!("{} now owned by 0x{:x}", entry.name, owner);
                self.registry.record_owner(selection, Some(owner), None);
                self.request_sync(service, selection, timestamp)
            }
        }
    }

    fn on_data_ready<S: SelectionService + ?Sized>(
        &mut self,
        service: &mut S,
        requestor: Window,
        property: Option<Atom>,
        selection: Atom,
        target: Atom,
        timestamp: Timestamp,
    ) -> Result<()> {
        let Some(entry) = self.registry.lookup_by_id(selection) else {
            return Err(SyncError::ProtocolViolation(format!(
                "conversion result for unmanaged selection 0x{selection:x}"
            )));
        };
        let foreign_property = property.is_some_and(|p| {
            self.registry.by_conversion_property(p).map(|s| s.id) != Some(selection)
        });
        if requestor != self.window || foreign_property {
            return Err(SyncError::ProtocolViolation(format!(
                "conversion result for {} delivered to window 0x{:x} property {:?}",
                entry.name, requestor, property
            )));
        }
        if self.registry.partner_of(selection).is_none() {
            debug!("{} has no sync partner, ignoring conversion result", entry.name);
            return Ok(());
        }

        let name = entry.name.clone();
        let Some(property) = property else {
            return Err(SyncError::DataUnavailable(format!("{name} (conversion refused)")));
        };

        let max = self.transfers.limits().max_incoming_size;
        let Some(data) = service.read_property(self.window, property, max)? else {
            return Err(SyncError::DataUnavailable(format!("{name} (property missing)")));
        };

        if data.type_ == self.targets.incr {
            let announced = data
                .data
                .get(..4)
                .and_then(|b| <[u8; 4]>::try_from(b).ok())
                .map(u32::from_ne_bytes)
                .ok_or_else(|| {
                    SyncError::ProtocolViolation(format!("malformed INCR marker from {name}"))
                })?;
            debug!("{} is sending {} bytes incrementally", name, announced);
            self.transfers.begin_incoming(
                self.window,
                property,
                selection,
                timestamp,
                announced as usize,
            );
            return Ok(());
        }

        if target != self.targets.utf8_string {
            debug!("{} answered target {} instead of UTF8_STRING", name, target);
        }

        self.complete_sync(service, selection, data.data, data.width, timestamp)
    }

    /// Claim the partner of `origin` and store the payload
    fn complete_sync<S: SelectionService + ?Sized>(
        &mut self,
        service: &mut S,
        origin: Atom,
        data: Bytes,
        width: ElementWidth,
        timestamp: Timestamp,
    ) -> Result<()> {
        let name = self
            .registry
            .lookup_by_id(origin)
            .map(|s| s.name.clone())
            .unwrap_or_default();

        if data.is_empty() {
            return Err(SyncError::DataUnavailable(format!("{name} (empty)")));
        }
        let max = self.transfers.limits().max_incoming_size;
        if data.len() > max {
            return Err(SyncError::DataSizeExceeded(data.len(), max));
        }

        let Some((partner, partner_name)) = self
            .registry
            .partner_of(origin)
            .map(|s| (s.id, s.name.clone()))
        else {
            return Ok(());
        };

        self.ownership
            .claim(service, &mut self.registry, partner, timestamp)?;

        let len = data.len();
        if self.buffer.replace(data, width, origin) {
            info!("Synced {} bytes from {} to {}", len, name, partner_name);
        } else {
            debug!("Re-synced unchanged content from {} to {}", name, partner_name);
        }
        Ok(())
    }

    fn on_peer_data_request<S: SelectionService + ?Sized>(
        &mut self,
        service: &mut S,
        request: SelectionRequest,
    ) -> Result<()> {
        // Obsolete clients leave the property unset
        let property = request.property.unwrap_or(request.target);

        let reply = match self.serve(service, &request, property) {
            Ok(true) => SelectionReply::granted(&request, property),
            Ok(false) => SelectionReply::refused(&request),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                service.notify_peer(&SelectionReply::refused(&request))?;
                return Err(e);
            }
        };

        service.notify_peer(&reply)
    }

    /// Write the requested data; `false` means the request is refused
    fn serve<S: SelectionService + ?Sized>(
        &mut self,
        service: &mut S,
        request: &SelectionRequest,
        property: Atom,
    ) -> Result<bool> {
        let Some(entry) = self.registry.lookup_by_id(request.selection) else {
            debug!("Refusing request for unmanaged selection 0x{:x}", request.selection);
            return Ok(false);
        };
        if !self.registry.is_sync_target(request.selection) {
            debug!("Refusing request for {}: not a sync target", entry.name);
            return Ok(false);
        }
        if let Some(since) = entry.owned_since {
            let stale = request.timestamp != CURRENT_TIME && request.timestamp < since;
            if stale && since != CURRENT_TIME {
                debug!(
                    "Refusing request for {} from before ownership ({} < {})",
                    entry.name, request.timestamp, since
                );
                return Ok(false);
            }
        }

        match self.targets.classify(request.target) {
            TargetClass::Targets => {
                service.write_property(
                    request.requestor,
                    property,
                    self.targets.atom,
                    ElementWidth::Bits32,
                    &self.targets.targets_reply(),
                )?;
                Ok(true)
            }
            TargetClass::Multiple => {
                debug!("Refusing MULTIPLE request from 0x{:x}", request.requestor);
                Ok(false)
            }
            TargetClass::Unsupported => {
                debug!(
                    "Refusing unsupported target {} from 0x{:x}",
                    request.target, request.requestor
                );
                Ok(false)
            }
            TargetClass::Text => {
                let Some(payload) = self.buffer.payload() else {
                    debug!("Refusing request for {}: nothing synced yet", entry.name);
                    return Ok(false);
                };
                let data = self.targets.encode(request.target, &payload.data);
                let width = payload.width;
                let type_ = self.targets.reply_type(request.target);

                if self.transfers.needs_chunking(data.len()) {
                    let transfer = TransferRequest {
                        requestor: request.requestor,
                        property,
                        selection: request.selection,
                        timestamp: request.timestamp,
                        target: type_,
                        width,
                    };
                    self.transfers.begin(service, transfer, data)?;
                } else {
                    service.write_property(request.requestor, property, type_, width, &data)?;
                    debug!("Served {} bytes to 0x{:x}", data.len(), request.requestor);
                }
                Ok(true)
            }
        }
    }

    fn on_selection_clear(&mut self, selection: Atom, timestamp: Timestamp) {
        if let Some(entry) = self.registry.lookup_by_id(selection) {
            info!("Lost ownership of {} at {}", entry.name, timestamp);
        }
        self.registry.record_owner(selection, None, None);
    }

    fn on_property_consumed<S: SelectionService + ?Sized>(
        &mut self,
        service: &mut S,
        window: Window,
        property: Atom,
    ) -> Result<()> {
        // Our own reads delete properties on our window
        if window == self.window {
            return Ok(());
        }

        match self.transfers.advance(service, window, property)? {
            TransferOutcome::Completed => debug!("Transfer to 0x{:x} finished", window),
            TransferOutcome::Continuing | TransferOutcome::NoSuchTransfer => {}
        }
        Ok(())
    }

    fn on_property_new_value<S: SelectionService + ?Sized>(
        &mut self,
        service: &mut S,
        window: Window,
        property: Atom,
    ) -> Result<()> {
        // Chunks we write on requestor windows echo back here
        if window != self.window {
            return Ok(());
        }

        match self.transfers.append_incoming(service, window, property)? {
            IncomingOutcome::Completed(payload) => self.complete_sync(
                service,
                payload.selection,
                payload.data,
                payload.width,
                payload.timestamp,
            ),
            IncomingOutcome::Continuing | IncomingOutcome::NoSuchTransfer => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::memory::{MemorySelectionService, DAEMON_WINDOW};
    use crate::clipboard::sync::SyncMode;

    const EDITOR: Window = 0x0040_0001;
    const TERMINAL: Window = 0x0050_0001;

    struct Harness {
        service: MemorySelectionService,
        dispatcher: ProtocolDispatcher,
        primary: Atom,
        clipboard: Atom,
    }

    impl Harness {
        fn new(mode: SyncMode) -> Self {
            Self::with_limits(
                mode,
                TransferLimits {
                    chunk_size: 1024,
                    max_incoming_size: 4096,
                },
            )
        }

        fn with_limits(mode: SyncMode, limits: TransferLimits) -> Self {
            let mut service = MemorySelectionService::new();
            let registry =
                SelectionRegistry::resolve(&mut service, mode, "PRIMARY", "CLIPBOARD").unwrap();
            let targets = TargetAtoms::resolve(&mut service).unwrap();
            for selection in registry.iter().filter(|s| s.watch) {
                service.watch_ownership_changes(selection.id).unwrap();
            }

            let primary = service.atom("PRIMARY");
            let clipboard = service.atom("CLIPBOARD");
            let dispatcher = ProtocolDispatcher::new(DAEMON_WINDOW, registry, targets, limits);

            Self {
                service,
                dispatcher,
                primary,
                clipboard,
            }
        }

        /// Deliver queued notifications until the queue is empty
        fn pump(&mut self) {
            while self.service.queued() > 0 {
                let notification = self.service.wait_for_next_notification().unwrap();
                self.dispatcher
                    .dispatch(&mut self.service, notification)
                    .unwrap();
            }
        }

        /// A peer copies `text` into `selection` and the daemon syncs it
        fn copy(&mut self, selection: Atom, owner: Window, text: &[u8], timestamp: Timestamp) {
            self.service.peer_set_owner(selection, owner, timestamp);
            self.pump();
            self.service.answer_conversion(Some(text));
            self.pump();
        }

        /// A peer asks the daemon for `selection` as `target`
        fn request(&mut self, selection: Atom, target: Atom, timestamp: Timestamp) -> SelectionReply {
            let property = self.service.atom("PEER_DATA");
            self.service
                .push(Notification::PeerDataRequest(SelectionRequest {
                    requestor: TERMINAL,
                    property: Some(property),
                    selection,
                    target,
                    timestamp,
                }));
            self.pump();
            *self.service.replies().last().unwrap()
        }

        fn utf8(&self) -> Atom {
            self.dispatcher.targets().utf8_string
        }
    }

    #[test]
    fn test_hello_world_a_to_b() {
        let mut h = Harness::new(SyncMode::AToB);
        let (primary, clipboard, utf8) = (h.primary, h.clipboard, h.utf8());

        h.service.peer_set_owner(primary, EDITOR, 100);
        h.pump();

        let conversion = *h.service.pending_conversions().next().unwrap();
        assert_eq!(conversion.selection, primary);
        assert_eq!(conversion.target, utf8);

        h.service.answer_conversion(Some(b"hello world"));
        h.pump();

        assert_eq!(h.service.owner(clipboard), Some(DAEMON_WINDOW));
        assert_eq!(h.dispatcher.buffer().current().unwrap().0, b"hello world");
        assert_eq!(h.service.owner(primary), Some(EDITOR));

        let reply = h.request(clipboard, utf8, 200);
        let property = reply.property.unwrap();
        let written = h.service.property(TERMINAL, property).unwrap();
        assert_eq!(written.data.as_ref(), b"hello world");
        assert_eq!(written.type_, utf8);
        assert_eq!(written.width, ElementWidth::Bits8);
    }

    #[test]
    fn test_directional_enforcement() {
        let mut h = Harness::new(SyncMode::AToB);
        let (primary, clipboard) = (h.primary, h.clipboard);

        // Not watched in a-to-b, so no notification even reaches the daemon
        h.service.peer_set_owner(clipboard, EDITOR, 100);
        assert_eq!(h.service.queued(), 0);

        // Delivered anyway: still ignored
        h.service.push(Notification::OwnershipChange {
            selection: clipboard,
            owner: Some(EDITOR),
            timestamp: 100,
        });
        h.pump();

        assert_eq!(h.service.pending_conversions().count(), 0);
        assert_eq!(h.service.owner(primary), None);
        assert!(h.dispatcher.buffer().is_empty());
    }

    #[test]
    fn test_b_to_a_syncs_clipboard_into_primary() {
        let mut h = Harness::new(SyncMode::BToA);
        let (primary, clipboard) = (h.primary, h.clipboard);

        h.copy(clipboard, EDITOR, b"copied", 10);

        assert_eq!(h.service.owner(primary), Some(DAEMON_WINDOW));
        assert_eq!(h.service.owner(clipboard), Some(EDITOR));
        assert_eq!(h.dispatcher.buffer().payload().unwrap().origin, clipboard);
    }

    #[test]
    fn test_bidirectional_does_not_loop() {
        let mut h = Harness::new(SyncMode::Bidirectional);
        let (primary, clipboard) = (h.primary, h.clipboard);

        h.copy(primary, EDITOR, b"selected", 10);
        assert_eq!(h.service.owner(clipboard), Some(DAEMON_WINDOW));
        // The daemon's own claim on CLIPBOARD must not trigger a conversion
        assert_eq!(h.service.pending_conversions().count(), 0);

        h.copy(clipboard, TERMINAL, b"copied", 20);
        assert_eq!(h.service.owner(primary), Some(DAEMON_WINDOW));
        assert_eq!(h.dispatcher.buffer().current().unwrap().0, b"copied");
        assert_eq!(h.service.pending_conversions().count(), 0);
    }

    #[test]
    fn test_idempotent_resync() {
        let mut h = Harness::new(SyncMode::AToB);
        let (primary, clipboard) = (h.primary, h.clipboard);

        h.copy(primary, EDITOR, b"same text", 10);
        assert_eq!(h.service.claim_count(), 1);
        h.copy(primary, TERMINAL, b"same text", 20);

        // At most one redundant claim for unchanged content
        assert_eq!(h.service.claim_count(), 2);
        assert_eq!(h.service.owner(clipboard), Some(DAEMON_WINDOW));
        assert_eq!(h.dispatcher.buffer().current().unwrap().0, b"same text");
        assert_eq!(
            h.dispatcher.registry().lookup_by_id(clipboard).unwrap().owned_since,
            Some(20)
        );
    }

    #[test]
    fn test_empty_and_refused_conversions_leave_state_alone() {
        let mut h = Harness::new(SyncMode::AToB);
        let (primary, clipboard) = (h.primary, h.clipboard);

        h.copy(primary, EDITOR, b"", 10);
        assert_eq!(h.service.owner(clipboard), None);
        assert!(h.dispatcher.buffer().is_empty());

        h.service.peer_set_owner(primary, EDITOR, 20);
        h.pump();
        h.service.answer_conversion(None);
        h.pump();
        assert_eq!(h.service.owner(clipboard), None);
        assert!(h.dispatcher.buffer().is_empty());

        h.copy(primary, EDITOR, b"kept", 30);
        h.copy(primary, EDITOR, b"", 40);
        assert_eq!(h.dispatcher.buffer().current().unwrap().0, b"kept");
    }

    #[test]
    fn test_self_and_vanished_owners_are_ignored() {
        let mut h = Harness::new(SyncMode::Bidirectional);
        let primary = h.primary;

        h.service.push(Notification::OwnershipChange {
            selection: primary,
            owner: Some(DAEMON_WINDOW),
            timestamp: 1,
        });
        h.service.push(Notification::OwnershipChange {
            selection: primary,
            owner: None,
            timestamp: 2,
        });
        h.pump();

        assert_eq!(h.service.pending_conversions().count(), 0);
    }

    #[test]
    fn test_lost_claim_keeps_buffer() {
        let mut h = Harness::new(SyncMode::AToB);
        let (primary, clipboard) = (h.primary, h.clipboard);

        h.copy(primary, EDITOR, b"first", 10);

        h.service.set_contender(Some(TERMINAL));
        h.copy(primary, EDITOR, b"second", 20);

        assert_eq!(h.service.owner(clipboard), Some(TERMINAL));
        assert_eq!(h.dispatcher.buffer().current().unwrap().0, b"first");
    }

    #[test]
    fn test_refusals_are_always_answered() {
        let mut h = Harness::new(SyncMode::AToB);
        let (primary, clipboard, utf8) = (h.primary, h.clipboard, h.utf8());

        // Nothing synced yet
        assert_eq!(h.request(clipboard, utf8, 0).property, None);

        h.copy(primary, EDITOR, b"text", 10);

        // PRIMARY is a source, never served
        assert_eq!(h.request(primary, utf8, 0).property, None);

        let multiple = h.dispatcher.targets().multiple;
        assert_eq!(h.request(clipboard, multiple, 0).property, None);

        let image = h.service.atom("image/png");
        assert_eq!(h.request(clipboard, image, 0).property, None);

        // From before the daemon owned CLIPBOARD
        assert_eq!(h.request(clipboard, utf8, 5).property, None);

        assert_eq!(h.service.replies().len(), 5);
        let peer_data = h.service.atom("PEER_DATA");
        assert!(h.service.property(TERMINAL, peer_data).is_none());
    }

    #[test]
    fn test_targets_request() {
        let mut h = Harness::new(SyncMode::AToB);
        let (primary, clipboard) = (h.primary, h.clipboard);
        h.copy(primary, EDITOR, b"text", 10);

        let targets = *h.dispatcher.targets();
        let reply = h.request(clipboard, targets.targets, 0);
        let written = h.service.property(TERMINAL, reply.property.unwrap()).unwrap();

        assert_eq!(written.type_, targets.atom);
        assert_eq!(written.width, ElementWidth::Bits32);
        assert_eq!(written.data.as_ref(), targets.targets_reply().as_slice());
    }

    #[test]
    fn test_text_target_is_served_as_utf8() {
        let mut h = Harness::new(SyncMode::AToB);
        let (primary, clipboard) = (h.primary, h.clipboard);
        h.copy(primary, EDITOR, b"text", 10);

        let targets = *h.dispatcher.targets();
        let reply = h.request(clipboard, targets.text, 0);
        let written = h.service.property(TERMINAL, reply.property.unwrap()).unwrap();
        assert_eq!(written.type_, targets.utf8_string);
    }

    #[test]
    fn test_obsolete_requestor_gets_target_as_property() {
        let mut h = Harness::new(SyncMode::AToB);
        let (primary, clipboard, utf8) = (h.primary, h.clipboard, h.utf8());
        h.copy(primary, EDITOR, b"legacy", 10);

        h.service.push(Notification::PeerDataRequest(SelectionRequest {
            requestor: TERMINAL,
            property: None,
            selection: clipboard,
            target: utf8,
            timestamp: 0,
        }));
        h.pump();

        assert_eq!(h.service.replies()[0].property, Some(utf8));
        assert_eq!(
            h.service.property(TERMINAL, utf8).unwrap().data.as_ref(),
            b"legacy"
        );
    }

    #[test]
    fn test_foreign_data_ready_is_a_protocol_violation() {
        let mut h = Harness::new(SyncMode::AToB);
        let primary = h.primary;
        let utf8 = h.utf8();

        let result = h.dispatcher.handle(
            &mut h.service,
            Notification::DataReady {
                requestor: TERMINAL,
                property: Some(999),
                selection: primary,
                target: utf8,
                timestamp: 0,
            },
        );
        assert!(matches!(result, Err(SyncError::ProtocolViolation(_))));

        // Our window, but the property CLIPBOARD is converted into
        let clipboard_property = h
            .dispatcher
            .registry()
            .lookup_by_id(h.clipboard)
            .unwrap()
            .conversion_property;
        let result = h.dispatcher.handle(
            &mut h.service,
            Notification::DataReady {
                requestor: DAEMON_WINDOW,
                property: Some(clipboard_property),
                selection: primary,
                target: utf8,
                timestamp: 0,
            },
        );
        assert!(matches!(result, Err(SyncError::ProtocolViolation(_))));

        let result = h.dispatcher.dispatch(
            &mut h.service,
            Notification::DataReady {
                requestor: TERMINAL,
                property: Some(999),
                selection: primary,
                target: utf8,
                timestamp: 0,
            },
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_non_fatal_notifications_are_swallowed() {
        let mut h = Harness::new(SyncMode::AToB);
        let clipboard = h.clipboard;

        h.service
            .push(Notification::ServiceError("BadWindow".to_string()));
        h.service.push(Notification::Unrecognized { code: 200 });
        h.service.push(Notification::SelectionClear {
            selection: clipboard,
            timestamp: 5,
        });
        h.service.push(Notification::PropertyConsumed {
            window: TERMINAL,
            property: 400,
        });
        h.service.push(Notification::PropertyNewValue {
            window: DAEMON_WINDOW,
            property: 400,
        });
        h.pump();

        assert!(h.dispatcher.buffer().is_empty());
    }

    #[test]
    fn test_outbound_incremental_transfer() {
        let mut h = Harness::with_limits(
            SyncMode::AToB,
            TransferLimits {
                chunk_size: 4,
                max_incoming_size: 4096,
            },
        );
        let (primary, clipboard, utf8) = (h.primary, h.clipboard, h.utf8());
        let incr = h.dispatcher.targets().incr;

        h.copy(primary, EDITOR, b"abcdefghij", 10);

        let reply = h.request(clipboard, utf8, 0);
        let property = reply.property.unwrap();
        assert!(h.service.is_watching_window(TERMINAL));

        let marker = h.service.peer_take_property(TERMINAL, property).unwrap();
        assert_eq!(marker.type_, incr);
        assert_eq!(marker.data.as_ref(), &10u32.to_ne_bytes());
        h.pump();

        let mut received = Vec::new();
        let mut chunks = 0;
        loop {
            let chunk = h.service.peer_take_property(TERMINAL, property).unwrap();
            assert_eq!(chunk.type_, utf8);
            chunks += 1;
            h.pump();
            if chunk.data.is_empty() {
                break;
            }
            received.extend_from_slice(&chunk.data);
        }

        assert_eq!(received, b"abcdefghij");
        assert_eq!(chunks, 4);
        assert_eq!(h.dispatcher.transfers().pending_count(), 0);
        assert!(!h.service.is_watching_window(TERMINAL));
    }

    #[test]
    fn test_inbound_incremental_transfer() {
        let mut h = Harness::new(SyncMode::AToB);
        let (primary, clipboard, utf8) = (h.primary, h.clipboard, h.utf8());

        h.service.peer_set_owner(primary, EDITOR, 10);
        h.pump();
        let conversion = h.service.answer_conversion_incremental(9).unwrap();
        h.pump();
        assert!(h
            .dispatcher
            .transfers()
            .is_receiving(DAEMON_WINDOW, conversion.property));

        for chunk in [&b"incre"[..], b"ment", b""] {
            h.service.peer_write_property(
                DAEMON_WINDOW,
                conversion.property,
                utf8,
                ElementWidth::Bits8,
                chunk,
            );
            h.pump();
        }

        assert_eq!(h.dispatcher.buffer().current().unwrap().0, b"increment");
        assert_eq!(h.service.owner(clipboard), Some(DAEMON_WINDOW));
    }

    #[test]
    fn test_payload_at_chunk_size_is_written_atomically() {
        let mut h = Harness::with_limits(
            SyncMode::AToB,
            TransferLimits {
                chunk_size: 4,
                max_incoming_size: 4096,
            },
        );
        let (primary, clipboard, utf8) = (h.primary, h.clipboard, h.utf8());

        h.copy(primary, EDITOR, b"abcd", 10);
        let reply = h.request(clipboard, utf8, 0);
        let property = reply.property.unwrap();

        let written = h.service.peer_take_property(TERMINAL, property).unwrap();
        assert_eq!(written.type_, utf8);
        assert_eq!(written.data.as_ref(), b"abcd");
        h.pump();

        assert_eq!(h.dispatcher.transfers().pending_count(), 0);
        assert!(!h.service.is_watching_window(TERMINAL));
        assert!(h.service.property(TERMINAL, property).is_none());
    }

    #[test]
    fn test_payload_one_over_chunk_size_is_incremental() {
        let mut h = Harness::with_limits(
            SyncMode::AToB,
            TransferLimits {
                chunk_size: 4,
                max_incoming_size: 4096,
            },
        );
        let (primary, clipboard, utf8) = (h.primary, h.clipboard, h.utf8());
        let incr = h.dispatcher.targets().incr;

        h.copy(primary, EDITOR, b"abcde", 10);
        let property = h.request(clipboard, utf8, 0).property.unwrap();

        let marker = h.service.peer_take_property(TERMINAL, property).unwrap();
        assert_eq!(marker.type_, incr);
        h.pump();

        let mut chunks = Vec::new();
        loop {
            let chunk = h.service.peer_take_property(TERMINAL, property).unwrap();
            h.pump();
            let done = chunk.data.is_empty();
            chunks.push(chunk.data);
            if done {
                break;
            }
        }

        let chunks: Vec<&[u8]> = chunks.iter().map(|c| c.as_ref()).collect();
        assert_eq!(chunks, vec![&b"abcd"[..], b"e", b""]);
        assert_eq!(h.dispatcher.transfers().pending_count(), 0);
    }

    #[test]
    fn test_string_request_is_latin1() {
        let mut h = Harness::new(SyncMode::AToB);
        let (primary, clipboard) = (h.primary, h.clipboard);
        h.copy(primary, EDITOR, "naïve".as_bytes(), 10);

        let string = h.dispatcher.targets().string;
        let reply = h.request(clipboard, string, 0);
        let written = h.service.property(TERMINAL, reply.property.unwrap()).unwrap();

        assert_eq!(written.type_, string);
        assert_eq!(written.data.as_ref(), b"na\xefve");
    }

    #[test]
    fn test_oversized_incremental_transfer_is_drained() {
        let mut h = Harness::with_limits(
            SyncMode::AToB,
            TransferLimits {
                chunk_size: 1024,
                max_incoming_size: 8,
            },
        );
        let (primary, clipboard, utf8) = (h.primary, h.clipboard, h.utf8());

        h.service.peer_set_owner(primary, EDITOR, 10);
        h.pump();
        let conversion = h.service.answer_conversion_incremental(6).unwrap();
        h.pump();

        // Every chunk is deleted so the owner can keep going
        for chunk in [&b"abcdef"[..], b"ghijkl", b"mno"] {
            h.service.peer_write_property(
                DAEMON_WINDOW,
                conversion.property,
                utf8,
                ElementWidth::Bits8,
                chunk,
            );
            h.pump();
            assert!(h.service.property(DAEMON_WINDOW, conversion.property).is_none());
            assert!(h
                .dispatcher
                .transfers()
                .is_receiving(DAEMON_WINDOW, conversion.property));
        }

        h.service.peer_write_property(
            DAEMON_WINDOW,
            conversion.property,
            utf8,
            ElementWidth::Bits8,
            b"",
        );
        h.pump();

        assert!(!h
            .dispatcher
            .transfers()
            .is_receiving(DAEMON_WINDOW, conversion.property));
        assert!(h.dispatcher.buffer().is_empty());
        assert_eq!(h.service.owner(clipboard), None);
    }

    #[test]
    fn test_oversized_payload_is_dropped() {
        let mut h = Harness::with_limits(
            SyncMode::AToB,
            TransferLimits {
                chunk_size: 1024,
                max_incoming_size: 8,
            },
        );
        let (primary, clipboard) = (h.primary, h.clipboard);

        h.copy(primary, EDITOR, b"far too long for the limit", 10);

        assert!(h.dispatcher.buffer().is_empty());
        assert_eq!(h.service.owner(clipboard), None);
    }
}
