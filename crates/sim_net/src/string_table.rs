//! Message-name string table.
//!
//! Message names are mapped to small integer ids so a frame only carries a
//! varint. The server's table is authoritative: it sends the full table to
//! every new channel and the client replaces its own on receipt. Id 0 is
//! reserved for [`MsgStringTable`] itself so the table can always be read.

use std::collections::{BTreeMap, HashMap};

use crate::messages::{MsgStringTable, NetMessage};

/// Bidirectional id ↔ name table.
#[derive(Debug, Clone)]
pub struct StringTable {
    strings: BTreeMap<u32, String>,
    ids: HashMap<String, u32>,
    registered: Vec<String>,
    next_id: u32,
    synced: bool,
}

impl StringTable {
    /// Create a table holding only the reserved entry.
    #[must_use]
    pub fn new() -> Self {
        let mut table = Self {
            strings: BTreeMap::new(),
            ids: HashMap::new(),
            registered: Vec::new(),
            next_id: 0,
            synced: false,
        };
        table.insert_next(MsgStringTable::NAME);
        table
    }

    fn insert_next(&mut self, name: &str) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.strings.insert(id, name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Add a name, returning its id. Adding an existing name returns the
    /// existing id.
    pub fn add_string(&mut self, name: &str) -> u32 {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        self.registered.push(name.to_string());
        self.insert_next(name)
    }

    /// The name for an id.
    #[must_use]
    pub fn try_get_string(&self, id: u32) -> Option<&str> {
        self.strings.get(&id).map(String::as_str)
    }

    /// The id for a name.
    #[must_use]
    pub fn try_find_id(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    /// The full table as a message.
    #[must_use]
    pub fn to_message(&self) -> MsgStringTable {
        MsgStringTable {
            entries: self
                .strings
                .iter()
                .map(|(id, name)| (*id, name.clone()))
                .collect(),
        }
    }

    /// Replace the table with one received from the server.
    pub fn apply(&mut self, message: &MsgStringTable) {
        self.strings.clear();
        self.ids.clear();
        for (id, name) in &message.entries {
            self.strings.insert(*id, name.clone());
            self.ids.insert(name.clone(), *id);
        }
        self.next_id = self.strings.keys().next_back().map_or(0, |id| id + 1);
        if !self.ids.contains_key(MsgStringTable::NAME) {
            self.strings.insert(0, MsgStringTable::NAME.to_string());
            self.ids.insert(MsgStringTable::NAME.to_string(), 0);
        }
        self.synced = true;
    }

    /// Whether a server table has been applied since the last reset.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Drop any received table and restore the locally registered names.
    pub fn reset(&mut self) {
        let registered = std::mem::take(&mut self.registered);
        *self = Self::new();
        for name in &registered {
            self.add_string(name);
        }
    }

    /// Number of entries, the reserved one included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Always `false`: the reserved entry is never removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_entry() {
        let table = StringTable::new();
        assert_eq!(table.try_get_string(0), Some(MsgStringTable::NAME));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut table = StringTable::new();
        let a = table.add_string("MsgState");
        let b = table.add_string("MsgStateAck");
        assert_eq!(table.add_string("MsgState"), a);
        assert_ne!(a, b);
        assert_eq!(table.try_find_id("MsgStateAck"), Some(b));
    }

    #[test]
    fn test_apply_replaces_local_ids() {
        let mut server = StringTable::new();
        server.add_string("A");
        server.add_string("B");

        let mut client = StringTable::new();
        client.add_string("B");
        client.add_string("A");
        assert!(!client.is_synced());

        client.apply(&server.to_message());
        assert!(client.is_synced());
        assert_eq!(client.try_find_id("A"), server.try_find_id("A"));
        assert_eq!(client.try_find_id("B"), server.try_find_id("B"));
    }

    #[test]
    fn test_reset_restores_registered_names() {
        let mut server = StringTable::new();
        server.add_string("X");

        let mut client = StringTable::new();
        client.add_string("A");
        client.apply(&server.to_message());
        assert!(client.try_find_id("A").is_none());

        client.reset();
        assert!(!client.is_synced());
        assert_eq!(client.try_find_id("A"), Some(1));
        assert!(client.try_find_id("X").is_none());
    }
}
