//! Static, validated set of routes. Loaded once from configuration and
//! immutable thereafter — no locks needed for reads.

use std::collections::HashMap;

use crate::error::BridgeError;
use crate::types::{Direction, MappingEntry, Side};

/// Validated, load-time-frozen collection of mapping entries.
///
/// Duplicate source or destination addresses are warned about, not
/// rejected — the registry keeps every entry and `lookup` returns all
/// matches, matching the observed "last mapping does not silently
/// overwrite" behavior.
#[derive(Debug, Clone)]
pub struct MappingRegistry {
    entries: Vec<MappingEntry>,
    by_id: HashMap<String, usize>,
}

impl MappingRegistry {
    /// Validates and indexes `entries`. Fails fast on an unknown
    /// data_type, direction, or priority (those are parsed upstream in
    /// config deserialization, so this mainly guards against duplicate
    /// `mapping_id`s within the same load, which would make `by_id`
    /// ambiguous).
    pub fn load(entries: Vec<MappingEntry>) -> Result<Self, BridgeError> {
        let mut by_id = HashMap::with_capacity(entries.len());
        let mut seen_source: HashMap<(Side, &str), usize> = HashMap::new();
        let mut seen_dest: HashMap<(Side, &str), usize> = HashMap::new();

        for (idx, entry) in entries.iter().enumerate() {
            if by_id.insert(entry.mapping_id.clone(), idx).is_some() {
                return Err(BridgeError::Config(format!(
                    "duplicate mapping_id: {}",
                    entry.mapping_id
                )));
            }

            let source_key = (entry.source_side, entry.source_address.as_str());
            if let Some(prev) = seen_source.insert(source_key, idx) {
                tracing::warn!(
                    mapping_id = %entry.mapping_id,
                    previous_index = prev,
                    "duplicate source address in mapping registry; keeping both entries"
                );
            }

            let dest_key = (entry.destination_side, entry.destination_address.as_str());
            if let Some(prev) = seen_dest.insert(dest_key, idx) {
                tracing::warn!(
                    mapping_id = %entry.mapping_id,
                    previous_index = prev,
                    "duplicate destination address in mapping registry; keeping both entries"
                );
            }
        }

        Ok(Self { entries, by_id })
    }

    /// All mappings whose source side/address match, regardless of
    /// direction filtering (callers filter by direction as needed).
    pub fn lookup(&self, side: Side, address: &str) -> Vec<&MappingEntry> {
        self.entries
            .iter()
            .filter(|m| {
                (m.source_side == side && m.source_address == address)
                    || (m.destination_side == side && m.destination_address == address)
            })
            .collect()
    }

    pub fn by_id(&self, mapping_id: &str) -> Option<&MappingEntry> {
        self.by_id.get(mapping_id).map(|&idx| &self.entries[idx])
    }

    /// Mappings allowing a flow from `source` to `destination` for the
    /// given source-side address, per the ingress adapter contract.
    pub fn matching_ingress(&self, source: Side, source_address: &str) -> Vec<&MappingEntry> {
        self.entries
            .iter()
            .filter(|m| {
                let forward = m.source_side == source && m.source_address == source_address;
                let reverse = m.destination_side == source && m.destination_address == source_address;
                if forward {
                    matches!(m.direction, Direction::AToB | Direction::Bidirectional)
                } else if reverse {
                    matches!(m.direction, Direction::BToA | Direction::Bidirectional)
                } else {
                    false
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Priority};

    fn entry(id: &str, src: &str, dst: &str) -> MappingEntry {
        MappingEntry {
            mapping_id: id.to_string(),
            source_side: Side::Pubsub,
            source_address: src.to_string(),
            destination_side: Side::Variable,
            destination_address: dst.to_string(),
            data_type: DataType::Float,
            direction: Direction::AToB,
            priority: Priority::Normal,
            transform_ref: None,
            description: None,
        }
    }

    #[test]
    fn load_rejects_duplicate_mapping_id() {
        let entries = vec![entry("m1", "a", "x"), entry("m1", "b", "y")];
        let err = MappingRegistry::load(entries).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn duplicate_addresses_are_kept_not_overwritten() {
        let entries = vec![entry("m1", "a", "x"), entry("m2", "a", "y")];
        let registry = MappingRegistry::load(entries).unwrap();
        let matches = registry.lookup(Side::Pubsub, "a");
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn by_id_finds_loaded_entry() {
        let entries = vec![entry("m1", "a", "x")];
        let registry = MappingRegistry::load(entries).unwrap();
        assert!(registry.by_id("m1").is_some());
        assert!(registry.by_id("missing").is_none());
    }
}
