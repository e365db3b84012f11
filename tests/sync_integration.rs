//! End-to-end sync scenarios against the in-memory selection service

use lamco_selection_sync::clipboard::memory::DAEMON_WINDOW;
use lamco_selection_sync::clipboard::{
    ElementWidth, MemorySelectionService, Notification, SelectionRequest,
};
use lamco_selection_sync::{Config, SyncDaemon, SyncError};

const EDITOR: u32 = 0x0040_0001;
const TERMINAL: u32 = 0x0050_0001;

fn daemon(mode: &str, service: MemorySelectionService) -> SyncDaemon<MemorySelectionService> {
    let mut config = Config::default_config();
    config.sync.mode = mode.to_string();
    SyncDaemon::new(service, &config).unwrap()
}

/// Handle everything queued
fn drain(daemon: &mut SyncDaemon<MemorySelectionService>) {
    while daemon.service().queued() > 0 {
        daemon.step().unwrap();
    }
}

#[test]
fn test_copy_in_primary_pastes_from_clipboard() {
    let mut daemon = daemon("a-to-b", MemorySelectionService::new());
    let service = daemon.service_mut();
    let primary = service.atom("PRIMARY");
    let clipboard = service.atom("CLIPBOARD");
    let utf8 = service.atom("UTF8_STRING");
    let paste = service.atom("XSEL_DATA");

    daemon.service_mut().peer_set_owner(primary, EDITOR, 100);
    drain(&mut daemon);
    daemon.service_mut().answer_conversion(Some(b"hello world"));
    drain(&mut daemon);

    assert_eq!(daemon.service().owner(clipboard), Some(DAEMON_WINDOW));

    daemon
        .service_mut()
        .push(Notification::PeerDataRequest(SelectionRequest {
            requestor: TERMINAL,
            property: Some(paste),
            selection: clipboard,
            target: utf8,
            timestamp: 200,
        }));
    drain(&mut daemon);

    let reply = daemon.service().replies()[0];
    assert_eq!(reply.property, Some(paste));
    assert_eq!(
        daemon.service().property(TERMINAL, paste).unwrap().data.as_ref(),
        b"hello world"
    );
}

#[test]
fn test_large_paste_is_sent_incrementally() {
    let service = MemorySelectionService::new().with_max_atomic_write(4);
    let mut daemon = daemon("a-to-b", service);
    let service = daemon.service_mut();
    let primary = service.atom("PRIMARY");
    let clipboard = service.atom("CLIPBOARD");
    let utf8 = service.atom("UTF8_STRING");
    let incr = service.atom("INCR");
    let paste = service.atom("XSEL_DATA");

    daemon.service_mut().peer_set_owner(primary, EDITOR, 1);
    drain(&mut daemon);
    daemon.service_mut().answer_conversion(Some(b"abcdefghij"));
    drain(&mut daemon);

    daemon
        .service_mut()
        .push(Notification::PeerDataRequest(SelectionRequest {
            requestor: TERMINAL,
            property: Some(paste),
            selection: clipboard,
            target: utf8,
            timestamp: 0,
        }));
    drain(&mut daemon);

    let marker = daemon.service_mut().peer_take_property(TERMINAL, paste).unwrap();
    assert_eq!(marker.type_, incr);
    assert_eq!(marker.width, ElementWidth::Bits32);
    drain(&mut daemon);

    let mut chunks = Vec::new();
    loop {
        let chunk = daemon.service_mut().peer_take_property(TERMINAL, paste).unwrap();
        drain(&mut daemon);
        if chunk.data.is_empty() {
            break;
        }
        chunks.push(chunk.data);
    }

    let chunks: Vec<&[u8]> = chunks.iter().map(|c| c.as_ref()).collect();
    assert_eq!(chunks, vec![&b"abcd"[..], b"efgh", b"ij"]);
    assert_eq!(daemon.dispatcher().transfers().pending_count(), 0);
}

#[test]
fn test_one_way_sync_ignores_the_other_direction() {
    let mut daemon = daemon("a-to-b", MemorySelectionService::new());
    let service = daemon.service_mut();
    let primary = service.atom("PRIMARY");
    let clipboard = service.atom("CLIPBOARD");

    daemon.service_mut().peer_set_owner(clipboard, EDITOR, 5);
    drain(&mut daemon);

    assert_eq!(daemon.service().pending_conversions().count(), 0);
    assert_eq!(daemon.service().owner(primary), None);
}

#[test]
fn test_startup_seeds_and_run_ends_on_disconnect() {
    let mut service = MemorySelectionService::new();
    let primary = service.atom("PRIMARY");
    service.peer_set_owner(primary, EDITOR, 1);

    let mut daemon = daemon("bidirectional", service);
    daemon.seed().unwrap();
    daemon.service_mut().answer_conversion(Some(b"seeded"));
    drain(&mut daemon);

    assert_eq!(daemon.dispatcher().buffer().current().unwrap().0, b"seeded");

    let error = daemon.run().unwrap_err();
    assert!(matches!(error, SyncError::ConnectionFatal(_)));
}
