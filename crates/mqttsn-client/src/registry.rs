//! Topic id to topic name registry.

use std::collections::HashMap;

use log::{debug, warn};
use mqttsn_core::TopicType;

/// Maps gateway-assigned topic ids to topic names.
///
/// Entries live until the registry is dropped.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: HashMap<u16, String>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `topic_id` with `topic_name`, replacing any earlier name.
    ///
    /// Reserved ids (0x0000, 0xFFFF) and empty names are logged and ignored.
    pub fn register(&mut self, topic_id: u16, topic_name: &str) {
        if topic_id == 0x0000 || topic_id == 0xFFFF {
            warn!("Attempted to register invalid topic id: 0x{:04X}", topic_id);
            return;
        }
        if topic_name.is_empty() {
            warn!("Attempted to register empty topic name for id 0x{:04X}", topic_id);
            return;
        }

        debug!("Registering topic 0x{:04X}: {}", topic_id, topic_name);
        self.topics.insert(topic_id, topic_name.to_string());
    }

    pub fn lookup(&self, topic_id: u16) -> Option<&str> {
        let name = self.topics.get(&topic_id).map(String::as_str);
        if name.is_none() {
            warn!("Failed to lookup topic id: 0x{:04X}", topic_id);
        }
        name
    }

    /// Printable label for a topic: the registered name (or the numeric id)
    /// for normal topics, four hex digits for predefined ids, the two
    /// characters for short topics.
    pub fn label(&self, topic_type: TopicType, topic_id: u16) -> String {
        match topic_type {
            TopicType::Normal => match self.lookup(topic_id) {
                Some(name) => name.to_string(),
                None => topic_id.to_string(),
            },
            TopicType::Predefined => format!("{:04x}", topic_id),
            TopicType::Short => String::from_utf8_lossy(&topic_id.to_be_bytes()).into_owned(),
        }
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = TopicRegistry::new();
        registry.register(0x0042, "sensors/temp");
        assert_eq!(registry.lookup(0x0042), Some("sensors/temp"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_overwrite() {
        let mut registry = TopicRegistry::new();
        registry.register(7, "old");
        registry.register(7, "new");
        assert_eq!(registry.lookup(7), Some("new"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reserved_ids_ignored() {
        let mut registry = TopicRegistry::new();
        registry.register(0x0000, "zero");
        registry.register(0xFFFF, "max");
        assert_eq!(registry.lookup(0x0000), None);
        assert_eq!(registry.lookup(0xFFFF), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_empty_name_ignored() {
        let mut registry = TopicRegistry::new();
        registry.register(5, "");
        assert_eq!(registry.lookup(5), None);
    }

    #[test]
    fn test_labels() {
        let mut registry = TopicRegistry::new();
        registry.register(0x0005, "test");
        assert_eq!(registry.label(TopicType::Normal, 0x0005), "test");
        assert_eq!(registry.label(TopicType::Normal, 0x0006), "6");
        assert_eq!(registry.label(TopicType::Predefined, 0x0011), "0011");
        assert_eq!(registry.label(TopicType::Short, 0x5454), "TT");
    }

    #[test]
    fn test_unknown_id() {
        let registry = TopicRegistry::new();
        assert_eq!(registry.lookup(1234), None);
    }
}
