use crate::cache::PropertyCache;
use crate::storage::Storage;
use fbus::device::DeviceState;
use fbus::upstream::UpstreamEvent;
use fbus::{ChannelId, DeviceId, PropertyId, SettingId};
use flint::logging;
use flint::value::ValueKind;
use crossbeam_channel::Receiver;
use hashbrown::HashMap;
use std::thread;

/// Device table row, the container's view of what a connector announced.
#[derive(Debug, Clone)]
pub struct DeviceRow {
    pub identifier: String,
    pub state: DeviceState,
    pub connector_params: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ChannelPropertyRow {
    pub device_id: DeviceId,
    pub channel_id: ChannelId,
    pub channel_identifier: String,
    pub property_identifier: String,
    pub key: String,
    pub settable: bool,
    pub queryable: bool,
    pub data_type: Option<ValueKind>,
}

#[derive(Debug, Clone)]
pub struct ConfigurationRow {
    pub device_id: DeviceId,
    pub channel_id: Option<ChannelId>,
    pub identifier: String,
    pub data_type: Option<ValueKind>,
}

/// Consumes the connector event queue and maintains the gateway-side device,
/// property and configuration tables, the property cache and the storage
/// backend.
pub struct Container {
    devices: HashMap<DeviceId, DeviceRow>,
    properties: HashMap<PropertyId, ChannelPropertyRow>,
    configurations: HashMap<SettingId, ConfigurationRow>,
    cache: PropertyCache,
    storage: Box<dyn Storage>,
    log: logging::Logger,
}

impl Container {
    pub fn new(storage: Box<dyn Storage>, log: &logging::Logger) -> Container {
        Container {
            devices: HashMap::new(),
            properties: HashMap::new(),
            configurations: HashMap::new(),
            cache: PropertyCache::new(),
            storage,
            log: log.new(logging::o!()),
        }
    }

    #[inline]
    pub fn cache(&self) -> &PropertyCache {
        &self.cache
    }

    #[inline]
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn device(&self, device_id: DeviceId) -> Option<&DeviceRow> {
        self.devices.get(&device_id)
    }

    pub fn property(&self, property_id: PropertyId) -> Option<&ChannelPropertyRow> {
        self.properties.get(&property_id)
    }

    pub fn configuration(&self, configuration_id: SettingId) -> Option<&ConfigurationRow> {
        self.configurations.get(&configuration_id)
    }

    /// Applies one event off the connector queue.
    pub fn apply(&mut self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::DeviceUpserted {
                device_id,
                identifier,
                state,
                description,
                ..
            } => {
                let connector_params = description
                    .as_ref()
                    .map(|description| description.connector_params())
                    .or_else(|| {
                        self.devices
                            .get(&device_id)
                            .and_then(|row| row.connector_params.clone())
                    });

                logging::debug!(self.log, "device record updated";
                                "context" => "container",
                                "identifier" => identifier.as_str(),
                                "state" => ?state);

                self.devices.insert(
                    device_id,
                    DeviceRow {
                        identifier,
                        state,
                        connector_params,
                    },
                );
            }
            UpstreamEvent::ChannelPropertyUpserted {
                device_id,
                channel_id,
                channel_identifier,
                property_id,
                property_identifier,
                key,
                settable,
                queryable,
                data_type,
            } => {
                self.properties.insert(
                    property_id,
                    ChannelPropertyRow {
                        device_id,
                        channel_id,
                        channel_identifier,
                        property_identifier,
                        key,
                        settable,
                        queryable,
                        data_type,
                    },
                );
            }
            UpstreamEvent::ChannelPropertyDeleted { property_id } => {
                self.properties.remove(&property_id);
                self.cache.remove(property_id);
            }
            UpstreamEvent::DeviceConfigurationUpserted {
                device_id,
                configuration_id,
                identifier,
                data_type,
            } => {
                self.configurations.insert(
                    configuration_id,
                    ConfigurationRow {
                        device_id,
                        channel_id: None,
                        identifier,
                        data_type,
                    },
                );
            }
            UpstreamEvent::ChannelConfigurationUpserted {
                device_id,
                channel_id,
                configuration_id,
                identifier,
                data_type,
            } => {
                self.configurations.insert(
                    configuration_id,
                    ConfigurationRow {
                        device_id,
                        channel_id: Some(channel_id),
                        identifier,
                        data_type,
                    },
                );
            }
            UpstreamEvent::DeviceConfigurationDeleted { configuration_id }
            | UpstreamEvent::ChannelConfigurationDeleted { configuration_id } => {
                self.configurations.remove(&configuration_id);
            }
            UpstreamEvent::PropertyValueStored {
                property_id,
                actual,
                previous,
            } => {
                self.cache.apply(property_id, actual, previous);
                self.storage.store(property_id, actual, previous);
            }
        }
    }

    /// Consumes the queue on a worker thread until every sender is gone,
    /// then hands the container back.
    pub fn spawn(mut self, receiver: Receiver<UpstreamEvent>) -> thread::JoinHandle<Container> {
        thread::Builder::new()
            .name("gateway container".to_string())
            .spawn(move || {
                for event in receiver.iter() {
                    self.apply(event);
                }

                self
            })
            .expect("Container thread spawn failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use fbus::upstream::Upstream;
    use fbus::Id;
    use flint::value::Value;

    fn container() -> Container {
        Container::new(Box::new(MemoryStorage::new()), &flint::logging::discard())
    }

    #[test]
    fn test_value_event_updates_cache_and_storage() {
        let mut container = container();
        let property_id = Id::generate();

        container.apply(UpstreamEvent::PropertyValueStored {
            property_id,
            actual: Some(Value::Float(3.5)),
            previous: None,
        });

        assert_eq!(
            container.cache().get(property_id).unwrap().value,
            Some(Value::Float(3.5))
        );
        assert_eq!(container.storage().load(property_id), Some(Value::Float(3.5)));
    }

    #[test]
    fn test_state_only_update_keeps_connector_params() {
        let mut container = container();
        let device_id = Id::generate();

        container.apply(UpstreamEvent::DeviceUpserted {
            connector_id: Id::generate(),
            device_id,
            identifier: "AABBCC".to_string(),
            state: DeviceState::Running,
            description: None,
        });

        assert!(container.device(device_id).unwrap().connector_params.is_none());
    }

    #[test]
    fn test_property_delete_clears_cache() {
        let mut container = container();
        let property_id = Id::generate();

        container.apply(UpstreamEvent::PropertyValueStored {
            property_id,
            actual: Some(Value::Bool(true)),
            previous: None,
        });
        container.apply(UpstreamEvent::ChannelPropertyDeleted { property_id });

        assert!(container.cache().get(property_id).is_none());
        assert!(container.property(property_id).is_none());
    }

    #[test]
    fn test_spawn_consumes_until_disconnect() {
        let log = flint::logging::discard();
        let (upstream, receiver) = Upstream::channel(&log);

        let handle = container().spawn(receiver);

        let property_id = Id::generate();
        upstream.send_channel_property_to_storage(property_id, Some(Value::Unsigned(7)), None);

        drop(upstream);

        let container = handle.join().unwrap();
        assert_eq!(container.storage().load(property_id), Some(Value::Unsigned(7)));
    }
}
