//! Tablet Identity Map
//!
//! Tracks which table each compact tablet id refers to, learned from the
//! definition records seen so far in a log stream.

use std::collections::HashMap;

use crate::wal::TableExtent;

/// Maps tablet ids to the table identity most recently bound to them.
///
/// Tablet ids are reused compactly within a log, so a later definition for
/// the same id is authoritative. Entries are never evicted; the map lives for
/// the duration of one scan session.
#[derive(Debug, Default)]
pub struct TabletMap {
    tablets: HashMap<u32, TableExtent>,
}

impl TabletMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a tablet id to an extent, overwriting any prior binding
    pub fn bind(&mut self, tablet_id: u32, extent: TableExtent) {
        self.tablets.insert(tablet_id, extent);
    }

    /// Look up the extent currently bound to a tablet id
    pub fn resolve(&self, tablet_id: u32) -> Option<&TableExtent> {
        self.tablets.get(&tablet_id)
    }

    pub fn len(&self) -> usize {
        self.tablets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tablets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_resolve() {
        let mut map = TabletMap::new();
        assert!(map.resolve(1).is_none());

        map.bind(1, TableExtent::full_range("5"));
        assert_eq!(map.resolve(1).unwrap().table_id, "5");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_last_binding_wins() {
        let mut map = TabletMap::new();
        map.bind(1, TableExtent::full_range("5"));
        map.bind(1, TableExtent::full_range("6"));

        assert_eq!(map.resolve(1).unwrap().table_id, "6");
        assert_eq!(map.len(), 1);
    }
}
