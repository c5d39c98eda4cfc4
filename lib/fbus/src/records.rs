use crate::{ChannelId, DeviceId, PropertyId, SettingId};
use flint::value::{Value, ValueKind};
use serde_derive::{Deserialize, Serialize};

/// Persisted shape of one configured device, as handed to the connector by
/// the gateway container at startup. The connector parameter blob carries
/// `{address, max_packet_length, description_support, settings_support,
/// pub_sub_support}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    /// Serial number of the device.
    pub identifier: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub channels: Vec<ChannelRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub channel_id: ChannelId,
    #[serde(default)]
    pub properties: Vec<PropertyRecord>,
    #[serde(default)]
    pub configurations: Vec<ConfigurationRecord>,
}

/// One channel property, mapped back onto a register. The identifier is in
/// `prefix-N` form, N being the one-based register address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub property_id: PropertyId,
    pub identifier: String,
    pub key: String,
    pub settable: bool,
    pub data_type: ValueKind,
}

/// One channel configuration, mapped back onto a register setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationRecord {
    pub configuration_id: SettingId,
    pub identifier: String,
    pub data_type: ValueKind,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Splits a `prefix-N` identifier into its prefix and one-based address.
/// Returns `None` when the identifier is not in the expected form.
pub fn split_identifier(identifier: &str) -> Option<(&str, u16)> {
    let mut parts = identifier.split('-');
    let prefix = parts.next()?;
    let address: u16 = parts.next()?.parse().ok()?;

    if parts.next().is_some() || address == 0 {
        return None;
    }

    Some((prefix, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_identifier() {
        assert_eq!(split_identifier("register-01"), Some(("register", 1)));
        assert_eq!(split_identifier("do-12"), Some(("do", 12)));
    }

    #[test]
    fn test_split_identifier_rejects_malformed() {
        assert_eq!(split_identifier("register"), None);
        assert_eq!(split_identifier("register-zero"), None);
        assert_eq!(split_identifier("register-0"), None);
        assert_eq!(split_identifier("a-b-c"), None);
        assert_eq!(split_identifier(""), None);
    }
}
