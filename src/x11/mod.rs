//! X11 Selection Service
//!
//! [`SelectionService`] over an `x11rb` connection. Ownership changes come
//! from the XFixes extension (`SetSelectionOwner` notifications); all other
//! selection traffic is core protocol.
//!
//! The daemon's representative window is a 1x1 override-redirect window
//! that is never mapped. It selects `PropertyChange` so that inbound `INCR`
//! chunks are noticed.
//!
//! Connection errors are fatal. X protocol errors raised by unchecked
//! requests arrive as events and are handed to the dispatcher as
//! [`Notification::ServiceError`]; property writes are checked so a vanished
//! requestor fails the write that targeted it.

use crate::clipboard::error::{Result, SyncError};
use crate::clipboard::service::{
    Atom, ElementWidth, Notification, PropertyData, SelectionReply, SelectionRequest,
    SelectionService, Timestamp, Window,
};
use bytes::Bytes;
use tracing::{debug, info, trace};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::xfixes::{self, ConnectionExt as _, SelectionEventMask};
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ConnectionExt as _, CreateWindowAux, EventMask, PropMode,
    Property, SelectionNotifyEvent, WindowClass, SELECTION_NOTIFY_EVENT,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

/// XFixes version the selection notifications were introduced in
const XFIXES_VERSION: (u32, u32) = (5, 0);

impl From<ConnectError> for SyncError {
    fn from(e: ConnectError) -> Self {
        SyncError::ConnectionFatal(format!("cannot open display: {e}"))
    }
}

impl From<ConnectionError> for SyncError {
    fn from(e: ConnectionError) -> Self {
        SyncError::ConnectionFatal(e.to_string())
    }
}

impl From<ReplyError> for SyncError {
    fn from(e: ReplyError) -> Self {
        match e {
            ReplyError::ConnectionError(e) => e.into(),
            ReplyError::X11Error(e) => SyncError::Service(format!(
                "{:?} (value 0x{:x}, request {})",
                e.error_kind, e.bad_value, e.major_opcode
            )),
        }
    }
}

impl From<ReplyOrIdError> for SyncError {
    fn from(e: ReplyOrIdError) -> Self {
        match e {
            ReplyOrIdError::ConnectionError(e) => e.into(),
            ReplyOrIdError::X11Error(e) => ReplyError::X11Error(e).into(),
            ReplyOrIdError::IdsExhausted => {
                SyncError::ConnectionFatal("X11 resource ids exhausted".to_string())
            }
        }
    }
}

/// Selection service backed by an X11 display connection
pub struct X11SelectionService {
    conn: RustConnection,
    window: Window,
    max_request_bytes: usize,
}

impl std::fmt::Debug for X11SelectionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X11SelectionService")
            .field("window", &format_args!("0x{:x}", self.window))
            .field("max_request_bytes", &self.max_request_bytes)
            .finish()
    }
}

impl X11SelectionService {
    /// Connect to `display` (or `$DISPLAY`) and create the daemon window
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(display)?;
        let screen = conn.setup().roots.get(screen_num).ok_or_else(|| {
            SyncError::ConnectionFatal(format!("display has no screen {screen_num}"))
        })?;
        let (root, root_visual) = (screen.root, screen.root_visual);

        let window = conn.generate_id()?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            window,
            root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            root_visual,
            &CreateWindowAux::new()
                .override_redirect(1)
                .event_mask(EventMask::PROPERTY_CHANGE),
        )?
        .check()?;

        if conn.extension_information(xfixes::X11_EXTENSION_NAME)?.is_some() {
            let version = conn
                .xfixes_query_version(XFIXES_VERSION.0, XFIXES_VERSION.1)?
                .reply()?;
            debug!(
                "XFIXES {}.{} available",
                version.major_version, version.minor_version
            );
        }

        let max_request_bytes = conn.maximum_request_bytes();
        let display_name = display.unwrap_or("$DISPLAY");
        info!(
            "Connected to X display {} (screen {}), window 0x{:x}",
            display_name,
            screen_num,
            window
        );

        Ok(Self {
            conn,
            window,
            max_request_bytes,
        })
    }

    fn translate(&self, event: Event) -> Notification {
        match event {
            Event::XfixesSelectionNotify(ev) => Notification::OwnershipChange {
                selection: ev.selection,
                owner: non_none(ev.owner),
                timestamp: ev.selection_timestamp,
            },
            Event::SelectionNotify(ev) => Notification::DataReady {
                requestor: ev.requestor,
                property: non_none(ev.property),
                selection: ev.selection,
                target: ev.target,
                timestamp: ev.time,
            },
            Event::SelectionRequest(ev) => Notification::PeerDataRequest(SelectionRequest {
                requestor: ev.requestor,
                property: non_none(ev.property),
                selection: ev.selection,
                target: ev.target,
                timestamp: ev.time,
            }),
            Event::SelectionClear(ev) => Notification::SelectionClear {
                selection: ev.selection,
                timestamp: ev.time,
            },
            Event::PropertyNotify(ev) if ev.state == Property::DELETE => {
                Notification::PropertyConsumed {
                    window: ev.window,
                    property: ev.atom,
                }
            }
            Event::PropertyNotify(ev) => Notification::PropertyNewValue {
                window: ev.window,
                property: ev.atom,
            },
            Event::Error(e) => Notification::ServiceError(format!(
                "{:?} (value 0x{:x}, request {})",
                e.error_kind, e.bad_value, e.major_opcode
            )),
            other => Notification::Unrecognized {
                code: other.response_type(),
            },
        }
    }
}

/// `None` (0) as used on the wire becomes `Option::None`
fn non_none(id: u32) -> Option<u32> {
    (id != x11rb::NONE).then_some(id)
}

impl SelectionService for X11SelectionService {
    fn window(&self) -> Window {
        self.window
    }

    fn resolve_name(&mut self, name: &str) -> Result<Atom> {
        let atom = self.conn.intern_atom(false, name.as_bytes())?.reply()?.atom;
        trace!("Atom {} = {}", name, atom);
        Ok(atom)
    }

    fn watch_ownership_changes(&mut self, selection: Atom) -> Result<()> {
        self.conn
            .xfixes_select_selection_input(
                self.window,
                selection,
                SelectionEventMask::SET_SELECTION_OWNER,
            )?
            .check()?;
        Ok(())
    }

    fn watch_property_changes(&mut self, window: Window, enabled: bool) -> Result<()> {
        let mask = if enabled {
            EventMask::PROPERTY_CHANGE
        } else {
            EventMask::NO_EVENT
        };
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(mask),
        )?;
        Ok(())
    }

    fn request_conversion(
        &mut self,
        selection: Atom,
        target: Atom,
        property: Atom,
        timestamp: Timestamp,
    ) -> Result<()> {
        self.conn
            .convert_selection(self.window, selection, target, property, timestamp)?;
        Ok(())
    }

    fn read_property(
        &mut self,
        window: Window,
        property: Atom,
        max_len: usize,
    ) -> Result<Option<PropertyData>> {
        // Zero-length read to learn type and size
        let header = self
            .conn
            .get_property(false, window, property, AtomEnum::ANY, 0, 0)?
            .reply()?;
        if header.type_ == x11rb::NONE {
            return Ok(None);
        }

        let len = header.bytes_after as usize;
        if len > max_len {
            self.conn.delete_property(window, property)?;
            return Err(SyncError::DataSizeExceeded(len, max_len));
        }

        let reply = self
            .conn
            .get_property(
                true,
                window,
                property,
                AtomEnum::ANY,
                0,
                header.bytes_after.div_ceil(4),
            )?
            .reply()?;

        let width = ElementWidth::from_format(reply.format).ok_or_else(|| {
            SyncError::ProtocolViolation(format!("property has format {}", reply.format))
        });
        let width = match (width, reply.value.is_empty()) {
            (Ok(width), _) => width,
            // Zero-length properties may report format 0
            (Err(_), true) => ElementWidth::Bits8,
            (Err(e), false) => return Err(e),
        };

        Ok(Some(PropertyData {
            type_: reply.type_,
            width,
            data: Bytes::from(reply.value),
        }))
    }

    fn claim_owner(&mut self, selection: Atom, timestamp: Timestamp) -> Result<()> {
        self.conn
            .set_selection_owner(self.window, selection, timestamp)?;
        Ok(())
    }

    fn current_owner(&mut self, selection: Atom) -> Result<Option<Window>> {
        let owner = self.conn.get_selection_owner(selection)?.reply()?.owner;
        Ok(non_none(owner))
    }

    fn write_property(
        &mut self,
        window: Window,
        property: Atom,
        type_: Atom,
        width: ElementWidth,
        data: &[u8],
    ) -> Result<()> {
        let elements = u32::try_from(data.len() / width.bytes())
            .map_err(|_| SyncError::DataSizeExceeded(data.len(), u32::MAX as usize))?;

        self.conn
            .change_property(
                PropMode::REPLACE,
                window,
                property,
                type_,
                width.format(),
                elements,
                data,
            )?
            .check()?;
        Ok(())
    }

    fn notify_peer(&mut self, reply: &SelectionReply) -> Result<()> {
        let event = SelectionNotifyEvent {
            response_type: SELECTION_NOTIFY_EVENT,
            sequence: 0,
            time: reply.timestamp,
            requestor: reply.requestor,
            selection: reply.selection,
            target: reply.target,
            property: reply.property.unwrap_or(x11rb::NONE),
        };

        self.conn
            .send_event(false, reply.requestor, EventMask::NO_EVENT, event)?;
        self.conn.flush()?;
        Ok(())
    }

    fn wait_for_next_notification(&mut self) -> Result<Notification> {
        self.conn.flush()?;
        let event = self.conn.wait_for_event()?;
        Ok(self.translate(event))
    }

    fn extension_notification_code(&mut self, extension: &'static str) -> Result<Option<u8>> {
        Ok(self
            .conn
            .extension_information(extension)?
            .map(|info| info.first_event))
    }

    fn max_atomic_write(&self) -> usize {
        self.max_request_bytes / 4
    }
}
