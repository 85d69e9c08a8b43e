use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

fn start_delimiter_default() -> char { return '(' }
fn end_delimiter_default() -> char { return ')' }

/// A reading we want to pick out of every telegram.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MetricDefinition {
    /// Published identifier, the last segment of the MQTT topic
    pub name: String,
    /// OBIS code the line has to start with
    pub code: String,
    #[serde(default="start_delimiter_default")]
    pub start_delimiter: char,
    #[serde(default="end_delimiter_default")]
    pub end_delimiter: char,
}

impl MetricDefinition {
    pub fn new(name: &str, code: &str) -> Self {
        Self {
            name: name.to_string(),
            code: code.to_string(),
            start_delimiter: start_delimiter_default(),
            end_delimiter: end_delimiter_default(),
        }
    }

    /// Value followed by a unit, e.g. `(000992.992*kWh)`. Stored as milli-units.
    pub fn with_unit(name: &str, code: &str) -> Self {
        Self {
            end_delimiter: '*',
            ..Self::new(name, code)
        }
    }

    /// Delimiters as bytes, only valid after registration checked them for ASCII.
    pub(crate) fn delimiter_bytes(&self) -> (u8, u8) {
        (self.start_delimiter as u8, self.end_delimiter as u8)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricState {
    pub value: i64,
    pub dirty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(usize);

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("OBIS code {0} is already registered")]
    DuplicateCode(String),
    #[error("Metric name {0} is already registered")]
    DuplicateName(String),
    #[error("Metric {0} has an empty OBIS code")]
    EmptyCode(String),
    #[error("Metric {0} uses a non ASCII delimiter")]
    NonAsciiDelimiter(String),
}

struct Slot {
    definition: MetricDefinition,
    state: MetricState,
}

/// Ordered table of the metrics we know.
///
/// Lines are matched against the codes in registration order and the first
/// prefix match wins, so when one code is a prefix of another the one
/// registered first takes the line.
#[derive(Default)]
pub struct MetricRegistry {
    slots: Vec<Slot>,
    by_code: HashMap<String, MetricId>,
    by_name: HashMap<String, MetricId>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions<I>(definitions: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = MetricDefinition>,
    {
        let mut registry = Self::new();
        for definition in definitions {
            registry.register(definition)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, definition: MetricDefinition) -> Result<MetricId, RegistryError> {
        if definition.code.is_empty() {
            return Err(RegistryError::EmptyCode(definition.name));
        }
        if !definition.start_delimiter.is_ascii() || !definition.end_delimiter.is_ascii() {
            return Err(RegistryError::NonAsciiDelimiter(definition.name));
        }
        if self.by_code.contains_key(&definition.code) {
            return Err(RegistryError::DuplicateCode(definition.code));
        }
        if self.by_name.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateName(definition.name));
        }

        let id = MetricId(self.slots.len());
        debug!("Registering metric {} for OBIS code {}", definition.name, definition.code);

        self.by_code.insert(definition.code.clone(), id);
        self.by_name.insert(definition.name.clone(), id);
        self.slots.push(Slot { definition, state: MetricState::default() });
        Ok(id)
    }

    /// First registered metric whose code starts the line.
    pub fn match_line(&self, line: &[u8]) -> Option<MetricId> {
        self.slots.iter()
            .position(|slot| line.starts_with(slot.definition.code.as_bytes()))
            .map(MetricId)
    }

    pub fn get(&self, id: MetricId) -> Option<&MetricState> {
        self.slots.get(id.0).map(|slot| &slot.state)
    }

    pub fn definition(&self, id: MetricId) -> Option<&MetricDefinition> {
        self.slots.get(id.0).map(|slot| &slot.definition)
    }

    pub fn find_by_code(&self, code: &str) -> Option<MetricId> {
        self.by_code.get(code).copied()
    }

    /// Stores a new value. Only a real change marks the metric dirty,
    /// returns whether it did.
    pub fn set(&mut self, id: MetricId, value: i64) -> bool {
        let Some(slot) = self.slots.get_mut(id.0) else {
            return false;
        };

        if slot.state.value == value {
            return false;
        }

        slot.state.value = value;
        slot.state.dirty = true;
        true
    }

    pub fn mark_all_dirty(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.state.dirty = true;
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&MetricDefinition, &MetricState)> {
        self.slots.iter().map(|slot| (&slot.definition, &slot.state))
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = (&MetricDefinition, &mut MetricState)> {
        self.slots.iter_mut().map(|slot| (&slot.definition, &mut slot.state))
    }

    pub fn dirty_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.state.dirty).count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MetricRegistry {
        MetricRegistry::from_definitions(vec![
            MetricDefinition::with_unit("consumption_tarif_1", "1-0:1.8.1"),
            MetricDefinition::with_unit("received_tarif_1", "1-0:2.8.1"),
            MetricDefinition::new("actual_tarif_group", "0-0:96.14.0"),
        ]).unwrap()
    }

    #[test]
    fn test_duplicate_code_is_rejected() {
        let mut registry = registry();
        let result = registry.register(MetricDefinition::with_unit("other", "1-0:1.8.1"));
        assert_eq!(result, Err(RegistryError::DuplicateCode("1-0:1.8.1".to_string())));

        // the first definition is still in place
        let id = registry.find_by_code("1-0:1.8.1").unwrap();
        assert_eq!(registry.definition(id).unwrap().name, "consumption_tarif_1");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_name_and_bad_definitions_are_rejected() {
        let mut registry = registry();
        assert_eq!(
            registry.register(MetricDefinition::new("received_tarif_1", "1-0:2.8.2")),
            Err(RegistryError::DuplicateName("received_tarif_1".to_string()))
        );
        assert_eq!(
            registry.register(MetricDefinition::new("empty", "")),
            Err(RegistryError::EmptyCode("empty".to_string()))
        );

        let mut fancy = MetricDefinition::new("fancy", "1-0:99.99.0");
        fancy.end_delimiter = '¤';
        assert_eq!(registry.register(fancy), Err(RegistryError::NonAsciiDelimiter("fancy".to_string())));
    }

    #[test]
    fn test_match_line() {
        let registry = registry();
        let id = registry.match_line(b"1-0:2.8.1(000000.000*kWh)\r\n").unwrap();
        assert_eq!(registry.definition(id).unwrap().name, "received_tarif_1");
        assert!(registry.match_line(b"1-0:2.8.2(000000.000*kWh)\r\n").is_none());
        assert!(registry.match_line(b"1-0").is_none());
    }

    #[test]
    fn test_first_registered_prefix_wins() {
        let registry = MetricRegistry::from_definitions(vec![
            MetricDefinition::new("short", "1-0:1.8"),
            MetricDefinition::new("long", "1-0:1.8.1"),
        ]).unwrap();

        let id = registry.match_line(b"1-0:1.8.1(000992.992*kWh)").unwrap();
        assert_eq!(registry.definition(id).unwrap().name, "short");
    }

    #[test]
    fn test_set_marks_dirty_only_on_change() {
        let mut registry = registry();
        let id = registry.find_by_code("1-0:1.8.1").unwrap();

        assert!(!registry.set(id, 0));
        assert!(!registry.get(id).unwrap().dirty);

        assert!(registry.set(id, 992992));
        assert_eq!(registry.get(id).unwrap(), &MetricState { value: 992992, dirty: true });

        for (_, state) in registry.entries_mut() {
            state.dirty = false;
        }
        assert!(!registry.set(id, 992992));
        assert!(!registry.get(id).unwrap().dirty);
    }

    #[test]
    fn test_mark_all_dirty_keeps_values() {
        let mut registry = registry();
        let id = registry.find_by_code("0-0:96.14.0").unwrap();
        registry.set(id, 2);

        registry.mark_all_dirty();
        assert_eq!(registry.dirty_count(), 3);
        assert_eq!(registry.get(id).unwrap().value, 2);
    }

    #[test]
    fn test_definition_from_yaml() {
        let yaml = "name: gas_meter_m3\ncode: \"0-1:24.2.3\"\nend_delimiter: \"*\"\n";
        let definition: MetricDefinition = serde_yml::from_str(yaml).unwrap();
        assert_eq!(definition, MetricDefinition::with_unit("gas_meter_m3", "0-1:24.2.3"));
    }
}
