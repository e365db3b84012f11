//! Selection Target Classification
//!
//! Maps requested target atoms onto what the daemon can serve. Only plain
//! text is ever synchronized, so every text-like target is answered from the
//! same buffer (re-encoded to Latin-1 for `STRING`); `TARGETS` lists them and
//! everything else is refused.

use crate::clipboard::error::Result;
use crate::clipboard::service::{Atom, SelectionService};
use bytes::Bytes;

/// Well-known target and type names
pub mod target_name {
    /// UTF-8 encoded text
    pub const UTF8_STRING: &str = "UTF8_STRING";
    /// Latin-1 text
    pub const STRING: &str = "STRING";
    /// Text in an encoding of the owner's choice
    pub const TEXT: &str = "TEXT";
    /// MIME plain text
    pub const TEXT_PLAIN: &str = "text/plain";
    /// MIME plain text, UTF-8
    pub const TEXT_PLAIN_UTF8: &str = "text/plain;charset=utf-8";
    /// List of supported targets
    pub const TARGETS: &str = "TARGETS";
    /// Batched multi-target request
    pub const MULTIPLE: &str = "MULTIPLE";
    /// Incremental transfer marker type
    pub const INCR: &str = "INCR";
    /// Atom list type
    pub const ATOM: &str = "ATOM";
}

use target_name::{
    ATOM, INCR, MULTIPLE, STRING, TARGETS, TEXT, TEXT_PLAIN, TEXT_PLAIN_UTF8, UTF8_STRING,
};

/// How a requested target is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetClass {
    /// Served from the clipboard buffer
    Text,
    /// Answered with the list of supported targets
    Targets,
    /// Batched request; not supported
    Multiple,
    /// Refused
    Unsupported,
}

/// Resolved atoms for every target and type the engine uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetAtoms {
    /// `UTF8_STRING`
    pub utf8_string: Atom,
    /// `STRING`
    pub string: Atom,
    /// `TEXT`
    pub text: Atom,
    /// `text/plain`
    pub text_plain: Atom,
    /// `text/plain;charset=utf-8`
    pub text_plain_utf8: Atom,
    /// `TARGETS`
    pub targets: Atom,
    /// `MULTIPLE`
    pub multiple: Atom,
    /// `INCR`
    pub incr: Atom,
    /// `ATOM`
    pub atom: Atom,
}

impl TargetAtoms {
    /// Resolve all names through the service
    pub fn resolve<S: SelectionService + ?Sized>(service: &mut S) -> Result<Self> {
        Ok(Self {
            utf8_string: service.resolve_name(UTF8_STRING)?,
            string: service.resolve_name(STRING)?,
            text: service.resolve_name(TEXT)?,
            text_plain: service.resolve_name(TEXT_PLAIN)?,
            text_plain_utf8: service.resolve_name(TEXT_PLAIN_UTF8)?,
            targets: service.resolve_name(TARGETS)?,
            multiple: service.resolve_name(MULTIPLE)?,
            incr: service.resolve_name(INCR)?,
            atom: service.resolve_name(ATOM)?,
        })
    }

    /// Text targets, preferred first
    pub fn text_targets(&self) -> [Atom; 5] {
        [
            self.utf8_string,
            self.text_plain_utf8,
            self.text_plain,
            self.text,
            self.string,
        ]
    }

    /// Classify a requested target
    pub fn classify(&self, target: Atom) -> TargetClass {
        if target == self.targets {
            TargetClass::Targets
        } else if target == self.multiple {
            TargetClass::Multiple
        } else if self.text_targets().contains(&target) {
            TargetClass::Text
        } else {
            TargetClass::Unsupported
        }
    }

    /// Type the data is labelled with when served as `target`
    ///
    /// `TEXT` lets the owner choose an encoding; the daemon answers UTF-8.
    pub fn reply_type(&self, target: Atom) -> Atom {
        if target == self.text {
            self.utf8_string
        } else {
            target
        }
    }

    /// Buffer content encoded for `target`
    pub fn encode(&self, target: Atom, data: &Bytes) -> Bytes {
        if target == self.string {
            Bytes::from(to_latin1(data))
        } else {
            data.clone()
        }
    }

    /// `TARGETS` reply body: 32-bit atoms in native byte order
    pub fn targets_reply(&self) -> Vec<u8> {
        std::iter::once(self.targets)
            .chain(self.text_targets())
            .flat_map(Atom::to_ne_bytes)
            .collect()
    }
}

/// UTF-8 text as ISO 8859-1; characters outside Latin-1 become `?`
fn to_latin1(data: &[u8]) -> Vec<u8> {
    String::from_utf8_lossy(data)
        .chars()
        .map(|c| u8::try_from(c).unwrap_or(b'?'))
        .collect()
}
