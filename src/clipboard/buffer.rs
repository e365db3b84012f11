//! Clipboard Buffer
//!
//! The single payload most recently synchronized. Replacing it drops the
//! previous payload; pending outbound transfers hold their own reference
//! to the bytes they are sending, so replacement never invalidates them.

use crate::clipboard::service::{Atom, ElementWidth};
use bytes::Bytes;
use sha2::{Digest, Sha256};

/// One synchronized payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Raw bytes
    pub data: Bytes,
    /// Element width reported by the owner
    pub width: ElementWidth,
    /// Selection the payload was fetched from
    pub origin: Atom,
    /// SHA-256 of `data`, hex encoded
    pub digest: String,
}

/// The daemon's clipboard buffer
#[derive(Debug, Default)]
pub struct ClipboardBuffer {
    current: Option<Payload>,
}

impl ClipboardBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the payload wholesale
    ///
    /// Returns `true` if the new content differs from what was held before.
    pub fn replace(&mut self, data: Bytes, width: ElementWidth, origin: Atom) -> bool {
        let digest = calculate_hash(&data);
        let changed = self.current.as_ref().map_or(true, |p| p.digest != digest);

        self.current = Some(Payload {
            data,
            width,
            origin,
            digest,
        });

        changed
    }

    /// Current bytes and element width
    pub fn current(&self) -> Option<(&[u8], ElementWidth)> {
        self.current.as_ref().map(|p| (p.data.as_ref(), p.width))
    }

    /// Current payload
    pub fn payload(&self) -> Option<&Payload> {
        self.current.as_ref()
    }

    /// True until the first payload is stored
    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

/// Calculate hash of data
pub fn calculate_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_empty() {
        let buffer = ClipboardBuffer::new();
        assert!(buffer.is_empty());
        assert!(buffer.current().is_none());
    }

    #[test]
    fn test_zero_length_payload_is_not_empty_state() {
        let mut buffer = ClipboardBuffer::new();
        buffer.replace(Bytes::new(), ElementWidth::Bits8, 1);

        assert!(!buffer.is_empty());
        assert_eq!(buffer.current(), Some((&b""[..], ElementWidth::Bits8)));
    }

    #[test]
    fn test_replace_reports_content_change() {
        let mut buffer = ClipboardBuffer::new();

        assert!(buffer.replace(Bytes::from_static(b"hello"), ElementWidth::Bits8, 1));
        assert!(!buffer.replace(Bytes::from_static(b"hello"), ElementWidth::Bits8, 2));
        assert!(buffer.replace(Bytes::from_static(b"world"), ElementWidth::Bits8, 1));

        assert_eq!(buffer.current().unwrap().0, b"world");
    }

    #[test]
    fn test_replace_updates_origin_even_when_unchanged() {
        let mut buffer = ClipboardBuffer::new();
        buffer.replace(Bytes::from_static(b"same"), ElementWidth::Bits8, 1);
        buffer.replace(Bytes::from_static(b"same"), ElementWidth::Bits8, 2);

        assert_eq!(buffer.payload().unwrap().origin, 2);
    }

    #[test]
    fn test_outstanding_handles_survive_replacement() {
        let mut buffer = ClipboardBuffer::new();
        buffer.replace(Bytes::from_static(b"first"), ElementWidth::Bits8, 1);

        let held = buffer.payload().unwrap().data.clone();
        buffer.replace(Bytes::from_static(b"second"), ElementWidth::Bits8, 1);

        assert_eq!(held.as_ref(), b"first");
        assert_eq!(buffer.current().unwrap().0, b"second");
    }

    #[test]
    fn test_calculate_hash() {
        assert_eq!(
            calculate_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
