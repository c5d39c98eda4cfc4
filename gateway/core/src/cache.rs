use fbus::PropertyId;
use flint::time::timestamp_secs;
use flint::value::Value;
use hashbrown::HashMap;

/// Last known state of one channel property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRecord {
    pub value: Option<Value>,
    pub previous: Option<Value>,
    pub updated_at: u64,
}

/// In-memory cache of channel property values, fed by the connector event
/// queue and queried by the publish path and the exchanges.
pub struct PropertyCache {
    properties: HashMap<PropertyId, PropertyRecord>,
}

impl PropertyCache {
    pub fn new() -> PropertyCache {
        PropertyCache {
            properties: HashMap::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn get(&self, property_id: PropertyId) -> Option<&PropertyRecord> {
        self.properties.get(&property_id)
    }

    /// Applies a value change coming off the upstream queue.
    pub fn apply(&mut self, property_id: PropertyId, actual: Option<Value>, previous: Option<Value>) {
        self.properties.insert(
            property_id,
            PropertyRecord {
                value: actual,
                previous,
                updated_at: timestamp_secs(),
            },
        );
    }

    pub fn remove(&mut self, property_id: PropertyId) {
        self.properties.remove(&property_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbus::Id;

    #[test]
    fn test_apply_and_get() {
        let mut cache = PropertyCache::new();
        let property_id = Id::generate();

        cache.apply(property_id, Some(Value::Float(1.5)), None);

        let record = cache.get(property_id).unwrap();
        assert_eq!(record.value, Some(Value::Float(1.5)));
        assert_eq!(record.previous, None);
        assert!(record.updated_at > 0);

        cache.apply(property_id, Some(Value::Float(2.0)), Some(Value::Float(1.5)));
        assert_eq!(cache.get(property_id).unwrap().previous, Some(Value::Float(1.5)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut cache = PropertyCache::new();
        let property_id = Id::generate();

        cache.apply(property_id, Some(Value::Bool(true)), None);
        cache.remove(property_id);

        assert!(cache.get(property_id).is_none());
        assert_eq!(cache.len(), 0);
    }
}
