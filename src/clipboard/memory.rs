//! In-Memory Selection Service
//!
//! A self-contained [`SelectionService`] that models a display server with
//! selection owners, window properties and a notification queue. It drives
//! the sync engine without an X server: integration tests play the part of
//! other clients through the `peer_*` and `answer_*` helpers.
//!
//! Notifications are generated the way a display server would generate
//! them for the daemon: ownership changes on watched selections, selection
//! clears when the daemon loses a selection, and property notifications on
//! the daemon's window and on windows it watches. The daemon's own property
//! deletions and writes on its own window are not echoed back.

use crate::clipboard::error::{Result, SyncError};
use crate::clipboard::service::{
    Atom, ElementWidth, Notification, PropertyData, SelectionReply, SelectionService, Timestamp,
    Window,
};
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};

/// Window id of the daemon's representative window
pub const DAEMON_WINDOW: Window = 0x0020_0001;

/// Notification code reported for the `XFIXES` extension
pub const XFIXES_FIRST_EVENT: u8 = 87;

/// A conversion the daemon asked a selection owner for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionRequest {
    /// Selection to convert
    pub selection: Atom,
    /// Requested target
    pub target: Atom,
    /// Property on the daemon window to write into
    pub property: Atom,
    /// Request timestamp
    pub timestamp: Timestamp,
}

/// In-memory display model
#[derive(Debug)]
pub struct MemorySelectionService {
    window: Window,
    atoms: HashMap<String, Atom>,
    next_atom: Atom,
    unresolvable: HashSet<String>,
    owners: HashMap<Atom, Window>,
    properties: HashMap<(Window, Atom), PropertyData>,
    watched_selections: HashSet<Atom>,
    watched_windows: HashSet<Window>,
    conversions: VecDeque<ConversionRequest>,
    replies: Vec<SelectionReply>,
    notifications: VecDeque<Notification>,
    contender: Option<Window>,
    claims: usize,
    extensions: HashMap<&'static str, u8>,
    max_atomic_write: usize,
}

impl Default for MemorySelectionService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySelectionService {
    /// Empty display with the predefined atoms and `XFIXES` available
    pub fn new() -> Self {
        let atoms = [("PRIMARY", 1), ("SECONDARY", 2), ("ATOM", 4), ("STRING", 31)]
            .into_iter()
            .map(|(name, atom)| (name.to_string(), atom))
            .collect();

        Self {
            window: DAEMON_WINDOW,
            atoms,
            next_atom: 100,
            unresolvable: HashSet::new(),
            owners: HashMap::new(),
            properties: HashMap::new(),
            watched_selections: HashSet::new(),
            watched_windows: HashSet::new(),
            conversions: VecDeque::new(),
            replies: Vec::new(),
            notifications: VecDeque::new(),
            contender: None,
            claims: 0,
            extensions: HashMap::from([("XFIXES", XFIXES_FIRST_EVENT)]),
            max_atomic_write: 256 * 1024,
        }
    }

    /// Limit single property writes to `bytes`
    pub fn with_max_atomic_write(mut self, bytes: usize) -> Self {
        self.max_atomic_write = bytes;
        self
    }

    /// Pretend an extension is missing
    pub fn without_extension(mut self, extension: &str) -> Self {
        self.extensions.remove(extension);
        self
    }

    /// Make `name` fail to resolve
    pub fn reject_name(&mut self, name: &str) {
        self.unresolvable.insert(name.to_string());
    }

    /// Identifier for a name, interning it if needed
    pub fn atom(&mut self, name: &str) -> Atom {
        if let Some(atom) = self.atoms.get(name) {
            return *atom;
        }
        let atom = self.next_atom;
        self.next_atom += 1;
        self.atoms.insert(name.to_string(), atom);
        atom
    }

    /// Current owner of a selection
    pub fn owner(&self, selection: Atom) -> Option<Window> {
        self.owners.get(&selection).copied()
    }

    /// Whether ownership changes on `selection` are being reported
    pub fn is_watching_selection(&self, selection: Atom) -> bool {
        self.watched_selections.contains(&selection)
    }

    /// Whether property changes on `window` are being reported
    pub fn is_watching_window(&self, window: Window) -> bool {
        self.watched_windows.contains(&window)
    }

    /// Property value, without consuming it
    pub fn property(&self, window: Window, property: Atom) -> Option<&PropertyData> {
        self.properties.get(&(window, property))
    }

    /// Conversions requested and not yet answered, oldest first
    pub fn pending_conversions(&self) -> impl Iterator<Item = &ConversionRequest> {
        self.conversions.iter()
    }

    /// Replies the daemon has sent, oldest first
    pub fn replies(&self) -> &[SelectionReply] {
        &self.replies
    }

    /// Ownership claims the daemon has made
    pub fn claim_count(&self) -> usize {
        self.claims
    }

    /// Number of notifications waiting to be delivered
    pub fn queued(&self) -> usize {
        self.notifications.len()
    }

    /// Queue a notification for the daemon
    pub fn push(&mut self, notification: Notification) {
        self.notifications.push_back(notification);
    }

    /// Let `window` win the next claim the daemon makes
    pub fn set_contender(&mut self, window: Option<Window>) {
        self.contender = window;
    }

    /// Another client takes ownership of `selection`
    pub fn peer_set_owner(&mut self, selection: Atom, owner: Window, timestamp: Timestamp) {
        self.change_owner(selection, Some(owner), timestamp);
    }

    /// The owner of `selection` goes away
    pub fn peer_clear_owner(&mut self, selection: Atom, timestamp: Timestamp) {
        self.change_owner(selection, None, timestamp);
    }

    /// Another client writes a property
    pub fn peer_write_property(
        &mut self,
        window: Window,
        property: Atom,
        type_: Atom,
        width: ElementWidth,
        data: &[u8],
    ) {
        self.properties.insert(
            (window, property),
            PropertyData {
                type_,
                width,
                data: Bytes::copy_from_slice(data),
            },
        );
        if self.reports_properties_of(window) {
            self.push(Notification::PropertyNewValue { window, property });
        }
    }

    /// Another client reads and deletes a property
    pub fn peer_take_property(&mut self, window: Window, property: Atom) -> Option<PropertyData> {
        let value = self.properties.remove(&(window, property));
        if value.is_some() && self.reports_properties_of(window) {
            self.push(Notification::PropertyConsumed { window, property });
        }
        value
    }

    /// The owner answers the oldest pending conversion
    ///
    /// `None` refuses it. Returns the request that was answered.
    pub fn answer_conversion(&mut self, data: Option<&[u8]>) -> Option<ConversionRequest> {
        let request = self.conversions.pop_front()?;

        let property = data.map(|data| {
            self.properties.insert(
                (self.window, request.property),
                PropertyData {
                    type_: request.target,
                    width: ElementWidth::Bits8,
                    data: Bytes::copy_from_slice(data),
                },
            );
            request.property
        });
        self.push_data_ready(&request, property);

        Some(request)
    }

    /// The owner answers the oldest pending conversion with an `INCR`
    /// marker announcing `total` bytes
    pub fn answer_conversion_incremental(&mut self, total: u32) -> Option<ConversionRequest> {
        let request = self.conversions.pop_front()?;
        let incr = self.atom("INCR");

        self.properties.insert(
            (self.window, request.property),
            PropertyData {
                type_: incr,
                width: ElementWidth::Bits32,
                data: Bytes::copy_from_slice(&total.to_ne_bytes()),
            },
        );
        self.push_data_ready(&request, Some(request.property));

        Some(request)
    }

    fn push_data_ready(&mut self, request: &ConversionRequest, property: Option<Atom>) {
        self.push(Notification::DataReady {
            requestor: self.window,
            property,
            selection: request.selection,
            target: request.target,
            timestamp: request.timestamp,
        });
    }

    fn reports_properties_of(&self, window: Window) -> bool {
        window == self.window || self.watched_windows.contains(&window)
    }

    fn change_owner(&mut self, selection: Atom, owner: Option<Window>, timestamp: Timestamp) {
        let previous = match owner {
            Some(owner) => self.owners.insert(selection, owner),
            None => self.owners.remove(&selection),
        };

        if previous == Some(self.window) && owner != Some(self.window) {
            self.push(Notification::SelectionClear {
                selection,
                timestamp,
            });
        }
        if self.watched_selections.contains(&selection) {
            self.push(Notification::OwnershipChange {
                selection,
                owner,
                timestamp,
            });
        }
    }
}

impl SelectionService for MemorySelectionService {
    fn window(&self) -> Window {
        self.window
    }

    fn resolve_name(&mut self, name: &str) -> Result<Atom> {
        if self.unresolvable.contains(name) {
            return Err(SyncError::Service(format!("BadAlloc interning {name}")));
        }
        Ok(self.atom(name))
    }

    fn watch_ownership_changes(&mut self, selection: Atom) -> Result<()> {
        self.watched_selections.insert(selection);
        Ok(())
    }

    fn watch_property_changes(&mut self, window: Window, enabled: bool) -> Result<()> {
        if enabled {
            self.watched_windows.insert(window);
        } else {
            self.watched_windows.remove(&window);
        }
        Ok(())
    }

    fn request_conversion(
        &mut self,
        selection: Atom,
        target: Atom,
        property: Atom,
        timestamp: Timestamp,
    ) -> Result<()> {
        let request = ConversionRequest {
            selection,
            target,
            property,
            timestamp,
        };

        // Unowned selections are refused straight away
        if self.owners.contains_key(&selection) {
            self.conversions.push_back(request);
        } else {
            self.push_data_ready(&request, None);
        }
        Ok(())
    }

    fn read_property(
        &mut self,
        window: Window,
        property: Atom,
        max_len: usize,
    ) -> Result<Option<PropertyData>> {
        let value = self.properties.remove(&(window, property));
        if window != self.window && value.is_some() && self.watched_windows.contains(&window) {
            self.push(Notification::PropertyConsumed { window, property });
        }

        match value {
            Some(value) if value.data.len() > max_len => {
                Err(SyncError::DataSizeExceeded(value.data.len(), max_len))
            }
            other => Ok(other),
        }
    }

    fn claim_owner(&mut self, selection: Atom, timestamp: Timestamp) -> Result<()> {
        self.claims += 1;
        let window = self.window;
        self.change_owner(selection, Some(window), timestamp);

        if let Some(contender) = self.contender {
            self.change_owner(selection, Some(contender), timestamp);
        }
        Ok(())
    }

    fn current_owner(&mut self, selection: Atom) -> Result<Option<Window>> {
        Ok(self.owner(selection))
    }

    fn write_property(
        &mut self,
        window: Window,
        property: Atom,
        type_: Atom,
        width: ElementWidth,
        data: &[u8],
    ) -> Result<()> {
        if data.len() > self.max_atomic_write {
            return Err(SyncError::Service(format!(
                "BadLength: {} byte write exceeds {}",
                data.len(),
                self.max_atomic_write
            )));
        }

        self.properties.insert(
            (window, property),
            PropertyData {
                type_,
                width,
                data: Bytes::copy_from_slice(data),
            },
        );
        Ok(())
    }

    fn notify_peer(&mut self, reply: &SelectionReply) -> Result<()> {
        self.replies.push(*reply);
        Ok(())
    }

    fn wait_for_next_notification(&mut self) -> Result<Notification> {
        self.notifications
            .pop_front()
            .ok_or_else(|| SyncError::ConnectionFatal("display connection closed".to_string()))
    }

    fn extension_notification_code(&mut self, extension: &'static str) -> Result<Option<u8>> {
        Ok(self.extensions.get(extension).copied())
    }

    fn max_atomic_write(&self) -> usize {
        self.max_atomic_write
    }
}
