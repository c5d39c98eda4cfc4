use crate::types::{DataType, RegisterType, SettingKind};
use crate::{ChannelId, DeviceId, RegisterId, SettingId};
use flint::value::Value;

/// An addressable one-value slot on a device. Registers are announced
/// upstream as channel properties, keyed by their id.
#[derive(Debug, Clone)]
pub struct Register {
    id: RegisterId,
    key: String,
    channel_id: ChannelId,
    device_id: DeviceId,
    address: u16,
    register_type: RegisterType,
    data_type: DataType,
    value: Option<Value>,
}

impl Register {
    pub fn new(
        id: RegisterId,
        key: String,
        channel_id: ChannelId,
        device_id: DeviceId,
        address: u16,
        register_type: RegisterType,
        data_type: DataType,
    ) -> Register {
        Register {
            id,
            key,
            channel_id,
            device_id,
            address,
            register_type,
            data_type,
            value: None,
        }
    }

    #[inline]
    pub fn id(&self) -> RegisterId {
        self.id
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    #[inline]
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    #[inline]
    pub fn address(&self) -> u16 {
        self.address
    }

    #[inline]
    pub fn register_type(&self) -> RegisterType {
        self.register_type
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    pub fn set_data_type(&mut self, data_type: DataType) {
        self.data_type = data_type;
    }

    /// Value size in bytes, derived from the data type.
    #[inline]
    pub fn size(&self) -> usize {
        self.data_type.size()
    }

    /// Only outputs accept writes; every register is queryable.
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.register_type.is_writable()
    }

    #[inline]
    pub fn value(&self) -> Option<Value> {
        self.value
    }

    #[inline]
    pub(crate) fn set_value(&mut self, value: Option<Value>) {
        self.value = value;
    }
}

/// A persistent configuration slot, either device scoped or tied to one
/// specific register. The kind decides the upstream announcement target
/// (device configuration vs channel configuration) and the on-wire
/// descriptor layout.
#[derive(Debug, Clone)]
pub struct Setting {
    id: SettingId,
    device_id: DeviceId,
    address: u16,
    kind: SettingKind,
    name: Option<String>,
    data_type: DataType,
    value: Option<Value>,
    register: Option<(u16, RegisterType)>,
}

impl Setting {
    pub fn new(id: SettingId, device_id: DeviceId, address: u16, kind: SettingKind) -> Setting {
        Setting {
            id,
            device_id,
            address,
            kind,
            name: None,
            data_type: DataType::Unknown,
            value: None,
            register: None,
        }
    }

    #[inline]
    pub fn id(&self) -> SettingId {
        self.id
    }

    #[inline]
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    #[inline]
    pub fn address(&self) -> u16 {
        self.address
    }

    #[inline]
    pub fn kind(&self) -> SettingKind {
        self.kind
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    pub fn set_data_type(&mut self, data_type: DataType) {
        self.data_type = data_type;
    }

    #[inline]
    pub fn value(&self) -> Option<Value> {
        self.value
    }

    #[inline]
    pub fn set_value(&mut self, value: Option<Value>) {
        self.value = value;
    }

    /// The register a register-scoped setting configures.
    #[inline]
    pub fn register(&self) -> Option<(u16, RegisterType)> {
        self.register
    }

    #[inline]
    pub fn set_register(&mut self, address: u16, register_type: RegisterType) {
        self.register = Some((address, register_type));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Id;

    #[test]
    fn test_register_writability() {
        let writable = [RegisterType::DigitalOutput, RegisterType::AnalogOutput];
        let read_only = [RegisterType::DigitalInput, RegisterType::AnalogInput];

        for &register_type in writable.iter() {
            let register = Register::new(
                Id::generate(),
                "key".to_string(),
                Id::generate(),
                Id::generate(),
                0,
                register_type,
                DataType::Bool,
            );
            assert!(register.is_writable());
        }

        for &register_type in read_only.iter() {
            let register = Register::new(
                Id::generate(),
                "key".to_string(),
                Id::generate(),
                Id::generate(),
                0,
                register_type,
                DataType::Bool,
            );
            assert!(!register.is_writable());
        }
    }

    #[test]
    fn test_register_size_follows_data_type() {
        let mut register = Register::new(
            Id::generate(),
            "key".to_string(),
            Id::generate(),
            Id::generate(),
            3,
            RegisterType::AnalogInput,
            DataType::Unknown,
        );

        assert_eq!(register.size(), 0);

        register.set_data_type(DataType::Float32);
        assert_eq!(register.size(), 4);

        register.set_data_type(DataType::Int16);
        assert_eq!(register.size(), 2);
    }

    #[test]
    fn test_setting_defaults() {
        let setting = Setting::new(Id::generate(), Id::generate(), 0, SettingKind::Device);

        assert_eq!(setting.data_type(), DataType::Unknown);
        assert_eq!(setting.name(), None);
        assert_eq!(setting.register(), None);
    }
}
