//! Selection Registry
//!
//! The two selections the daemon manages, with their partner links and
//! watch flags derived from the [`SyncMode`].

use crate::clipboard::error::{Result, SyncError};
use crate::clipboard::service::{Atom, SelectionService, Timestamp, Window};
use crate::clipboard::sync::SyncMode;
use tracing::debug;

/// Prefix of the per-selection property the daemon converts into
const CONVERSION_PROPERTY_PREFIX: &str = "LAMCO_SELSYNC_";

/// One managed selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Selection atom
    pub id: Atom,
    /// Selection name ("PRIMARY", "CLIPBOARD", ...)
    pub name: String,
    /// Selection this one syncs into
    pub partner: Option<Atom>,
    /// Whether ownership changes on this selection trigger a sync
    pub watch: bool,
    /// Last known owner
    pub owner: Option<Window>,
    /// Time the daemon last won ownership of this selection
    pub owned_since: Option<Timestamp>,
    /// Property on the daemon window this selection is converted into
    pub conversion_property: Atom,
}

/// A configured selection name with its resolved atoms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelection {
    /// Selection name
    pub name: String,
    /// Selection atom
    pub id: Atom,
    /// Conversion property atom
    pub conversion_property: Atom,
}

impl ResolvedSelection {
    /// Resolve a selection name and its conversion property
    pub fn resolve<S: SelectionService + ?Sized>(service: &mut S, name: &str) -> Result<Self> {
        let id = resolve(service, name)?;
        let conversion_property = resolve(service, &format!("{CONVERSION_PROPERTY_PREFIX}{name}"))?;

        Ok(Self {
            name: name.to_string(),
            id,
            conversion_property,
        })
    }
}

fn resolve<S: SelectionService + ?Sized>(service: &mut S, name: &str) -> Result<Atom> {
    service.resolve_name(name).map_err(|e| match e {
        SyncError::ConnectionFatal(_) => e,
        other => SyncError::UnresolvedName(format!("{name}: {other}")),
    })
}

/// The set of managed selections
#[derive(Debug, Clone)]
pub struct SelectionRegistry {
    mode: SyncMode,
    /// Always exactly two entries: A then B
    selections: Vec<Selection>,
}

impl SelectionRegistry {
    /// Build the registry from the sync mode and the two resolved selections
    pub fn new(mode: SyncMode, a: ResolvedSelection, b: ResolvedSelection) -> Result<Self> {
        if a.id == b.id {
            return Err(SyncError::InvalidConfig(format!(
                "selections '{}' and '{}' are the same selection",
                a.name, b.name
            )));
        }

        let link = |from: &ResolvedSelection, to: &ResolvedSelection, enabled: bool| Selection {
            id: from.id,
            name: from.name.clone(),
            partner: enabled.then_some(to.id),
            watch: enabled,
            owner: None,
            owned_since: None,
            conversion_property: from.conversion_property,
        };

        let selections = vec![
            link(&a, &b, mode.syncs_a_to_b()),
            link(&b, &a, mode.syncs_b_to_a()),
        ];

        for selection in &selections {
            debug!(
                "Selection {} (0x{:x}): watch={}, partner={:?}",
                selection.name, selection.id, selection.watch, selection.partner
            );
        }

        Ok(Self { mode, selections })
    }

    /// Resolve both names through the service and build the registry
    ///
    /// Any name the service cannot resolve is fatal to startup.
    pub fn resolve<S: SelectionService + ?Sized>(
        service: &mut S,
        mode: SyncMode,
        name_a: &str,
        name_b: &str,
    ) -> Result<Self> {
        let a = ResolvedSelection::resolve(service, name_a)?;
        let b = ResolvedSelection::resolve(service, name_b)?;
        Self::new(mode, a, b)
    }

    /// Configured sync mode
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Look up a selection by atom
    pub fn lookup_by_id(&self, id: Atom) -> Option<&Selection> {
        self.selections.iter().find(|s| s.id == id)
    }

    /// The selection `id` syncs into, if any
    pub fn partner_of(&self, id: Atom) -> Option<&Selection> {
        self.lookup_by_id(id)
            .and_then(|s| s.partner)
            .and_then(|partner| self.lookup_by_id(partner))
    }

    /// Whether some other selection syncs into `id`
    ///
    /// Only these selections are ever claimed, so only these are served.
    pub fn is_sync_target(&self, id: Atom) -> bool {
        self.selections.iter().any(|s| s.partner == Some(id))
    }

    /// The selection converted into `property`, if any
    pub fn by_conversion_property(&self, property: Atom) -> Option<&Selection> {
        self.selections
            .iter()
            .find(|s| s.conversion_property == property)
    }

    /// The selection whose content seeds the buffer at startup
    pub fn seed_source(&self) -> Option<&Selection> {
        self.selections.iter().find(|s| s.watch)
    }

    /// All managed selections, A first
    pub fn iter(&self) -> impl Iterator<Item = &Selection> {
        self.selections.iter()
    }

    /// Record the owner of a selection; `owned_since` is set only when the
    /// owner is the daemon itself
    pub fn record_owner(&mut self, id: Atom, owner: Option<Window>, owned_since: Option<Timestamp>) {
        if let Some(selection) = self.selections.iter_mut().find(|s| s.id == id) {
            selection.owner = owner;
            selection.owned_since = owned_since;
        }
    }
}
