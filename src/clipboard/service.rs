//! Selection Service Boundary
//!
//! The capability surface the sync engine consumes from the windowing
//! system: name resolution, ownership, conversion requests, property
//! reads/writes and blocking notification delivery. The X11 implementation
//! lives in [`crate::x11`]; tests drive the engine through in-memory fakes.

use crate::clipboard::error::Result;
use bytes::Bytes;

/// Service-assigned identifier for a name (selection, type or property)
pub type Atom = u32;

/// Window handle
pub type Window = u32;

/// Protocol timestamp
pub type Timestamp = u32;

/// "Now" as understood by the service
pub const CURRENT_TIME: Timestamp = 0;

/// Size of one element of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementWidth {
    /// 8-bit elements
    Bits8,
    /// 16-bit elements
    Bits16,
    /// 32-bit elements
    Bits32,
}

impl ElementWidth {
    /// Map a property format (8/16/32) to a width
    pub fn from_format(format: u8) -> Option<Self> {
        match format {
            8 => Some(Self::Bits8),
            16 => Some(Self::Bits16),
            32 => Some(Self::Bits32),
            _ => None,
        }
    }

    /// Property format value
    pub fn format(self) -> u8 {
        match self {
            Self::Bits8 => 8,
            Self::Bits16 => 16,
            Self::Bits32 => 32,
        }
    }

    /// Bytes per element
    pub fn bytes(self) -> usize {
        usize::from(self.format() / 8)
    }
}

/// Contents of a property, as read back from the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyData {
    /// Type atom the value was stored with
    pub type_: Atom,
    /// Element width
    pub width: ElementWidth,
    /// Raw value bytes
    pub data: Bytes,
}

/// A peer asking the daemon for the contents of a selection it owns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRequest {
    /// Window that wants the data
    pub requestor: Window,
    /// Property to write into (`None` from obsolete clients)
    pub property: Option<Atom>,
    /// Requested selection
    pub selection: Atom,
    /// Requested target type
    pub target: Atom,
    /// Timestamp of the request
    pub timestamp: Timestamp,
}

/// Reply sent to a requestor once its property is ready (or refused)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionReply {
    /// Window that asked
    pub requestor: Window,
    /// Selection that was asked for
    pub selection: Atom,
    /// Target that was asked for
    pub target: Atom,
    /// Property holding the data, `None` on refusal
    pub property: Option<Atom>,
    /// Timestamp copied from the request
    pub timestamp: Timestamp,
}

impl SelectionReply {
    /// Reply announcing that `property` holds the data
    pub fn granted(request: &SelectionRequest, property: Atom) -> Self {
        Self {
            requestor: request.requestor,
            selection: request.selection,
            target: request.target,
            property: Some(property),
            timestamp: request.timestamp,
        }
    }

    /// Reply refusing the request; the peer observes no data
    pub fn refused(request: &SelectionRequest) -> Self {
        Self {
            property: None,
            ..Self::granted(request, 0)
        }
    }
}

/// Notifications delivered by the service, one per event loop iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A selection changed owner
    OwnershipChange {
        /// Selection whose owner changed
        selection: Atom,
        /// New owner, `None` if the selection is now unowned
        owner: Option<Window>,
        /// Time at which ownership changed
        timestamp: Timestamp,
    },

    /// A conversion requested by the daemon has finished
    DataReady {
        /// Window the data was delivered to
        requestor: Window,
        /// Property holding the data, `None` if the owner refused
        property: Option<Atom>,
        /// Selection that was converted
        selection: Atom,
        /// Target the data was converted to
        target: Atom,
        /// Timestamp of the conversion request
        timestamp: Timestamp,
    },

    /// A peer requests the contents of a selection the daemon owns
    PeerDataRequest(SelectionRequest),

    /// The daemon lost ownership of a selection
    SelectionClear {
        /// Selection that was lost
        selection: Atom,
        /// Time of the ownership change
        timestamp: Timestamp,
    },

    /// A property was deleted (the peer consumed a chunk)
    PropertyConsumed {
        /// Window owning the property
        window: Window,
        /// Property that was deleted
        property: Atom,
    },

    /// A property received a new value (an owner delivered a chunk)
    PropertyNewValue {
        /// Window owning the property
        window: Window,
        /// Property that changed
        property: Atom,
    },

    /// Recoverable protocol error reported by the service
    ServiceError(String),

    /// Anything the dispatcher has no handler for
    Unrecognized {
        /// Raw notification code
        code: u8,
    },
}

/// Selection/ownership/property primitives of the windowing system
///
/// All operations act on behalf of the daemon's representative window,
/// which is created when the service is constructed and lives as long as
/// the service does.
#[cfg_attr(test, mockall::automock)]
pub trait SelectionService {
    /// The daemon's representative window
    fn window(&self) -> Window;

    /// Resolve a name to its identifier
    fn resolve_name(&mut self, name: &str) -> Result<Atom>;

    /// Subscribe to ownership changes on a selection
    fn watch_ownership_changes(&mut self, selection: Atom) -> Result<()>;

    /// Subscribe to (or stop receiving) property changes on a foreign window
    fn watch_property_changes(&mut self, window: Window, enabled: bool) -> Result<()>;

    /// Ask the owner of `selection` to convert it into `property` on the
    /// daemon's window; the result arrives later as
    /// [`Notification::DataReady`]
    fn request_conversion(
        &mut self,
        selection: Atom,
        target: Atom,
        property: Atom,
        timestamp: Timestamp,
    ) -> Result<()>;

    /// Read a property and delete it afterwards
    ///
    /// Returns `Ok(None)` if the property does not exist. Reads longer than
    /// `max_len` bytes fail with [`crate::clipboard::SyncError::DataSizeExceeded`]
    /// (the property is deleted regardless).
    fn read_property(
        &mut self,
        window: Window,
        property: Atom,
        max_len: usize,
    ) -> Result<Option<PropertyData>>;

    /// Make the daemon's window the owner of `selection`
    fn claim_owner(&mut self, selection: Atom, timestamp: Timestamp) -> Result<()>;

    /// Current owner of `selection`, `None` if unowned
    fn current_owner(&mut self, selection: Atom) -> Result<Option<Window>>;

    /// Replace a property on `window`
    fn write_property(
        &mut self,
        window: Window,
        property: Atom,
        type_: Atom,
        width: ElementWidth,
        data: &[u8],
    ) -> Result<()>;

    /// Send a selection reply to a requestor
    fn notify_peer(&mut self, reply: &SelectionReply) -> Result<()>;

    /// Block until the next notification arrives
    ///
    /// Fails only with [`crate::clipboard::SyncError::ConnectionFatal`].
    fn wait_for_next_notification(&mut self) -> Result<Notification>;

    /// First notification code of an extension, `None` if unsupported
    fn extension_notification_code(&mut self, extension: &'static str) -> Result<Option<u8>>;

    /// Largest property write, in bytes, that can be done in one request
    fn max_atomic_write(&self) -> usize;
}
