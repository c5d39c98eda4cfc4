use fbus::PropertyId;
use flint::value::Value;
use hashbrown::HashMap;

/// Backend for last known property values. The container consumer forwards
/// every stored value change here.
pub trait Storage: Send {
    fn store(&mut self, property_id: PropertyId, actual: Option<Value>, previous: Option<Value>);

    fn load(&self, property_id: PropertyId) -> Option<Value>;
}

/// Keeps everything in process memory; the default backend and the one the
/// tests run against.
pub struct MemoryStorage {
    values: HashMap<PropertyId, Option<Value>>,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage {
            values: HashMap::new(),
        }
    }
}

impl Storage for MemoryStorage {
    fn store(&mut self, property_id: PropertyId, actual: Option<Value>, _previous: Option<Value>) {
        self.values.insert(property_id, actual);
    }

    fn load(&self, property_id: PropertyId) -> Option<Value> {
        self.values.get(&property_id).copied().flatten()
    }
}
