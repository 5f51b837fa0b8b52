use crate::hal::Pin;
use crate::manager::ResourceManager;

/// One row of a board's pin map: a pin pair served by the controller at
/// `master`.
///
/// Several rows may name the same controller when its signals can be muxed
/// onto more than one pin pair.
pub struct BusMapEntry {
    pub sda: Pin,
    pub scl: Pin,
    pub master: usize,
}

/// A board's static routing table: pin pairs to controller indices, and the
/// registry of resource managers those indices select.
pub struct BusMap {
    entries: &'static [BusMapEntry],
    masters: &'static [&'static dyn ResourceManager],
}

impl BusMap {
    pub const fn new(
        entries: &'static [BusMapEntry],
        masters: &'static [&'static dyn ResourceManager],
    ) -> Self {
        Self { entries, masters }
    }

    /// Resolve a pin pair to its controller index and manager, or `None`
    /// when no controller serves the pair.
    pub fn resolve(
        &self,
        sda: Pin,
        scl: Pin,
    ) -> Option<(usize, &'static dyn ResourceManager)> {
        self.entries
            .iter()
            .find(|e| e.sda == sda && e.scl == scl)
            .and_then(|e| self.masters.get(e.master).copied().map(|m| (e.master, m)))
    }
}
