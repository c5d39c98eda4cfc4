use crate::device::{Device, DeviceState};
use crate::{ChannelId, ConnectorId, DeviceId, PropertyId, SettingId};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use flint::logging;
use flint::value::{Value, ValueKind};
use serde_json::json;

/// Capacity of the connector → container event queue. Overflow is advisory:
/// the newest event is logged and discarded rather than blocking the bus loop.
pub const QUEUE_CAPACITY: usize = 1000;

/// Descriptive attributes announced together with a full device structure.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescription {
    pub address: u8,
    pub max_packet_length: usize,
    pub description_support: bool,
    pub settings_support: bool,
    pub pub_sub_support: bool,
    pub hardware_manufacturer: String,
    pub hardware_model: String,
    pub hardware_version: Option<String>,
    pub firmware_manufacturer: String,
    pub firmware_version: Option<String>,
}

impl DeviceDescription {
    pub fn from_device(device: &Device) -> DeviceDescription {
        DeviceDescription {
            address: device.address(),
            max_packet_length: device.max_packet_length(),
            description_support: device.description_support(),
            settings_support: device.settings_support(),
            pub_sub_support: device.pub_sub_support(),
            hardware_manufacturer: device.hw_manufacturer().to_string(),
            hardware_model: device.hw_model().to_string(),
            hardware_version: device.hw_version().map(str::to_string),
            firmware_manufacturer: device.fw_manufacturer().to_string(),
            firmware_version: device.fw_version().map(str::to_string),
        }
    }

    /// The connector parameter blob persisted with the device record.
    pub fn connector_params(&self) -> serde_json::Value {
        json!({
            "address": self.address,
            "max_packet_length": self.max_packet_length,
            "description_support": self.description_support,
            "settings_support": self.settings_support,
            "pub_sub_support": self.pub_sub_support,
        })
    }
}

/// Registry mutation events ferried from the connector loop to the gateway
/// container over the bounded queue.
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    DeviceUpserted {
        connector_id: ConnectorId,
        device_id: DeviceId,
        identifier: String,
        state: DeviceState,
        description: Option<DeviceDescription>,
    },
    ChannelPropertyUpserted {
        device_id: DeviceId,
        channel_id: ChannelId,
        channel_identifier: String,
        property_id: PropertyId,
        property_identifier: String,
        key: String,
        settable: bool,
        queryable: bool,
        data_type: Option<ValueKind>,
    },
    ChannelPropertyDeleted {
        property_id: PropertyId,
    },
    DeviceConfigurationUpserted {
        device_id: DeviceId,
        configuration_id: SettingId,
        identifier: String,
        data_type: Option<ValueKind>,
    },
    DeviceConfigurationDeleted {
        configuration_id: SettingId,
    },
    ChannelConfigurationUpserted {
        device_id: DeviceId,
        channel_id: ChannelId,
        configuration_id: SettingId,
        identifier: String,
        data_type: Option<ValueKind>,
    },
    ChannelConfigurationDeleted {
        configuration_id: SettingId,
    },
    PropertyValueStored {
        property_id: PropertyId,
        actual: Option<Value>,
        previous: Option<Value>,
    },
}

impl UpstreamEvent {
    fn name(&self) -> &'static str {
        match self {
            UpstreamEvent::DeviceUpserted { .. } => "device-upserted",
            UpstreamEvent::ChannelPropertyUpserted { .. } => "channel-property-upserted",
            UpstreamEvent::ChannelPropertyDeleted { .. } => "channel-property-deleted",
            UpstreamEvent::DeviceConfigurationUpserted { .. } => "device-configuration-upserted",
            UpstreamEvent::DeviceConfigurationDeleted { .. } => "device-configuration-deleted",
            UpstreamEvent::ChannelConfigurationUpserted { .. } => "channel-configuration-upserted",
            UpstreamEvent::ChannelConfigurationDeleted { .. } => "channel-configuration-deleted",
            UpstreamEvent::PropertyValueStored { .. } => "property-value-stored",
        }
    }
}

/// Sending half of the upstream queue, exposing the outbound gateway API
/// the handlers call into.
pub struct Upstream {
    sender: Sender<UpstreamEvent>,
    log: logging::Logger,
}

impl Upstream {
    pub fn new(sender: Sender<UpstreamEvent>, log: &logging::Logger) -> Upstream {
        Upstream {
            sender,
            log: log.new(logging::o!()),
        }
    }

    /// Creates the bounded connector → container queue.
    pub fn channel(log: &logging::Logger) -> (Upstream, Receiver<UpstreamEvent>) {
        let (sender, receiver) = bounded(QUEUE_CAPACITY);

        (Upstream::new(sender, log), receiver)
    }

    fn emit(&self, event: UpstreamEvent) {
        match self.sender.try_send(event) {
            Ok(()) => (),
            Err(TrySendError::Full(event)) => {
                logging::warn!(self.log, "upstream queue is full, event discarded";
                               "context" => "upstream",
                               "event" => event.name());
            }
            Err(TrySendError::Disconnected(event)) => {
                logging::warn!(self.log, "upstream queue is closed, event discarded";
                               "context" => "upstream",
                               "event" => event.name());
            }
        }
    }

    pub fn add_or_edit_device(
        &self,
        connector_id: ConnectorId,
        device_id: DeviceId,
        identifier: String,
        state: DeviceState,
        description: Option<DeviceDescription>,
    ) {
        self.emit(UpstreamEvent::DeviceUpserted {
            connector_id,
            device_id,
            identifier,
            state,
            description,
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_or_edit_channel_property(
        &self,
        device_id: DeviceId,
        channel_id: ChannelId,
        channel_identifier: String,
        property_id: PropertyId,
        property_identifier: String,
        key: String,
        settable: bool,
        queryable: bool,
        data_type: Option<ValueKind>,
    ) {
        self.emit(UpstreamEvent::ChannelPropertyUpserted {
            device_id,
            channel_id,
            channel_identifier,
            property_id,
            property_identifier,
            key,
            settable,
            queryable,
            data_type,
        });
    }

    pub fn delete_channel_property(&self, property_id: PropertyId) {
        self.emit(UpstreamEvent::ChannelPropertyDeleted { property_id });
    }

    pub fn add_or_edit_device_configuration(
        &self,
        device_id: DeviceId,
        configuration_id: SettingId,
        identifier: String,
        data_type: Option<ValueKind>,
    ) {
        self.emit(UpstreamEvent::DeviceConfigurationUpserted {
            device_id,
            configuration_id,
            identifier,
            data_type,
        });
    }

    pub fn delete_device_configuration(&self, configuration_id: SettingId) {
        self.emit(UpstreamEvent::DeviceConfigurationDeleted { configuration_id });
    }

    pub fn add_or_edit_channel_configuration(
        &self,
        device_id: DeviceId,
        channel_id: ChannelId,
        configuration_id: SettingId,
        identifier: String,
        data_type: Option<ValueKind>,
    ) {
        self.emit(UpstreamEvent::ChannelConfigurationUpserted {
            device_id,
            channel_id,
            configuration_id,
            identifier,
            data_type,
        });
    }

    pub fn delete_channel_configuration(&self, configuration_id: SettingId) {
        self.emit(UpstreamEvent::ChannelConfigurationDeleted { configuration_id });
    }

    pub fn send_channel_property_to_storage(
        &self,
        property_id: PropertyId,
        actual: Option<Value>,
        previous: Option<Value>,
    ) {
        self.emit(UpstreamEvent::PropertyValueStored {
            property_id,
            actual,
            previous,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Id;

    #[test]
    fn test_overflow_drops_newest() {
        let (sender, receiver) = bounded(2);
        let upstream = Upstream::new(sender, &flint::logging::discard());

        for _ in 0..3 {
            upstream.delete_channel_property(Id::from_raw(1));
        }

        // Two events fit, the third was discarded
        assert_eq!(receiver.len(), 2);
    }

    #[test]
    fn test_disconnected_receiver_is_tolerated() {
        let (sender, receiver) = bounded(1);
        let upstream = Upstream::new(sender, &flint::logging::discard());

        drop(receiver);

        // Must not panic or block
        upstream.send_channel_property_to_storage(Id::from_raw(1), None, None);
    }

    #[test]
    fn test_connector_params_blob() {
        let device = Device::new(Id::generate(), 7, "AABBCC".to_string(), 50);
        let description = DeviceDescription::from_device(&device);
        let params = description.connector_params();

        assert_eq!(params["address"], 7);
        assert_eq!(params["max_packet_length"], 50);
        assert_eq!(params["settings_support"], false);
    }
}
