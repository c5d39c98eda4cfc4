use crate::device::{Device, DeviceState};
use crate::register::{Register, Setting};
use crate::types::{DataType, RegisterType, SettingKind, MAX_DEVICE_ADDRESS, UNASSIGNED_ADDRESS};
use crate::upstream::Upstream;
use crate::{DeviceId, Id, RegisterId, SettingId};
use flint::ident::short_key;
use flint::value::Value;
use hashbrown::HashMap;
use indexmap::IndexMap;
use std::fmt;
use std::time::Instant;

#[derive(Debug, Eq, PartialEq)]
pub enum RegistryError {
    /// Every address in 1..=253 is taken.
    NoAddressAvailable,
    /// A second device claimed an already registered serial number.
    DuplicateSerialNumber,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegistryError::NoAddressAvailable => write!(f, "no free bus address available"),
            RegistryError::DuplicateSerialNumber => write!(f, "serial number is not unique"),
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// In-memory model of every device on the bus together with its registers
/// and settings. The connector loop is the only mutator; handlers reach the
/// registry through the scheduler context.
pub struct Registry {
    devices: IndexMap<DeviceId, Device>,
    registers: IndexMap<RegisterId, Register>,
    settings: IndexMap<SettingId, Setting>,

    // Reverse indices, kept in sync by the mutators below
    by_address: HashMap<u8, DeviceId>,
    by_serial: HashMap<String, DeviceId>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            devices: IndexMap::new(),
            registers: IndexMap::new(),
            settings: IndexMap::new(),
            by_address: HashMap::new(),
            by_serial: HashMap::new(),
        }
    }

    #[inline]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Device ids in insertion order, the round-robin order of the scheduler.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.devices.keys().copied().collect()
    }

    #[inline]
    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    #[inline]
    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(&id)
    }

    pub fn device_by_address(&self, address: u8) -> Option<&Device> {
        self.by_address.get(&address).and_then(|id| self.devices.get(id))
    }

    pub fn device_id_by_address(&self, address: u8) -> Option<DeviceId> {
        self.by_address.get(&address).copied()
    }

    pub fn device_by_serial_number(&self, serial_number: &str) -> Option<&Device> {
        self.by_serial
            .get(serial_number)
            .and_then(|id| self.devices.get(id))
    }

    pub fn device_id_by_serial_number(&self, serial_number: &str) -> Option<DeviceId> {
        self.by_serial.get(serial_number).copied()
    }

    /// Creates a device at the lowest free bus address. Used by pairing when
    /// an unknown serial number answers the search broadcast.
    pub fn create_device(
        &mut self,
        serial_number: &str,
        max_packet_length: usize,
        now: Instant,
    ) -> RegistryResult<DeviceId> {
        if self.by_serial.contains_key(serial_number) {
            return Err(RegistryError::DuplicateSerialNumber);
        }

        let address = (1..=MAX_DEVICE_ADDRESS)
            .find(|candidate| !self.by_address.contains_key(candidate))
            .ok_or(RegistryError::NoAddressAvailable)?;

        let id = Id::generate();
        let mut device = Device::new(id, address, serial_number.to_string(), max_packet_length);
        device.set_state(DeviceState::Connected, now);

        self.insert_device(device);

        Ok(id)
    }

    /// Inserts a fully formed device, e.g. one loaded from persisted records.
    pub fn insert_device(&mut self, device: Device) {
        if device.address() != UNASSIGNED_ADDRESS {
            self.by_address.insert(device.address(), device.id());
        }

        self.by_serial.insert(device.serial_number().to_string(), device.id());
        self.devices.insert(device.id(), device);
    }

    /// Moves a device to a new bus address, keeping the reverse index in sync.
    pub fn set_device_address(&mut self, id: DeviceId, address: u8) {
        if let Some(device) = self.devices.get_mut(&id) {
            if device.address() != UNASSIGNED_ADDRESS {
                self.by_address.remove(&device.address());
            }

            device.set_address(address);

            if address != UNASSIGNED_ADDRESS {
                self.by_address.insert(address, id);
            }
        }
    }

    #[inline]
    pub fn register(&self, id: RegisterId) -> Option<&Register> {
        self.registers.get(&id)
    }

    #[inline]
    pub fn register_mut(&mut self, id: RegisterId) -> Option<&mut Register> {
        self.registers.get_mut(&id)
    }

    /// All registers of one device and type, in no particular order.
    pub fn registers_of(
        &self,
        device_id: DeviceId,
        register_type: RegisterType,
    ) -> impl Iterator<Item = &Register> {
        self.registers.values().filter(move |register| {
            register.device_id() == device_id && register.register_type() == register_type
        })
    }

    pub fn register_count(&self, device_id: DeviceId, register_type: RegisterType) -> usize {
        self.registers_of(device_id, register_type).count()
    }

    pub fn register_at(
        &self,
        device_id: DeviceId,
        register_type: RegisterType,
        address: u16,
    ) -> Option<&Register> {
        self.registers.values().find(|register| {
            register.device_id() == device_id
                && register.register_type() == register_type
                && register.address() == address
        })
    }

    pub fn register_id_at(
        &self,
        device_id: DeviceId,
        register_type: RegisterType,
        address: u16,
    ) -> Option<RegisterId> {
        self.register_at(device_id, register_type, address)
            .map(Register::id)
    }

    pub fn create_register(
        &mut self,
        device_id: DeviceId,
        address: u16,
        register_type: RegisterType,
        data_type: DataType,
    ) -> RegisterId {
        let id = Id::generate();
        let register = Register::new(
            id,
            short_key(),
            Id::generate(),
            device_id,
            address,
            register_type,
            data_type,
        );

        self.registers.insert(id, register);

        id
    }

    /// Inserts a register loaded from persisted records, keeping its ids.
    pub fn insert_register(&mut self, register: Register) {
        self.registers.insert(register.id(), register);
    }

    /// Removes a register and announces the deletion upstream.
    pub fn delete_register(&mut self, id: RegisterId, upstream: &Upstream) {
        if self.registers.shift_remove(&id).is_some() {
            upstream.delete_channel_property(id);
        }
    }

    /// Stores a freshly read or echoed value and forwards the change to the
    /// storage pipeline.
    pub fn update_register_value(&mut self, id: RegisterId, value: Value, upstream: &Upstream) {
        if let Some(register) = self.registers.get_mut(&id) {
            let previous = register.value();

            register.set_value(Some(value));

            upstream.send_channel_property_to_storage(id, Some(value), previous);
        }
    }

    #[inline]
    pub fn setting(&self, id: SettingId) -> Option<&Setting> {
        self.settings.get(&id)
    }

    #[inline]
    pub fn setting_mut(&mut self, id: SettingId) -> Option<&mut Setting> {
        self.settings.get_mut(&id)
    }

    pub fn settings_of(
        &self,
        device_id: DeviceId,
        kind: SettingKind,
    ) -> impl Iterator<Item = &Setting> {
        self.settings
            .values()
            .filter(move |setting| setting.device_id() == device_id && setting.kind() == kind)
    }

    pub fn setting_count(&self, device_id: DeviceId, kind: SettingKind) -> usize {
        self.settings_of(device_id, kind).count()
    }

    pub fn setting_at(
        &self,
        device_id: DeviceId,
        kind: SettingKind,
        address: u16,
    ) -> Option<&Setting> {
        self.settings.values().find(|setting| {
            setting.device_id() == device_id && setting.kind() == kind && setting.address() == address
        })
    }

    pub fn setting_id_at(
        &self,
        device_id: DeviceId,
        kind: SettingKind,
        address: u16,
    ) -> Option<SettingId> {
        self.setting_at(device_id, kind, address).map(Setting::id)
    }

    pub fn create_setting(&mut self, device_id: DeviceId, address: u16, kind: SettingKind) -> SettingId {
        let id = Id::generate();

        self.settings.insert(id, Setting::new(id, device_id, address, kind));

        id
    }

    pub fn insert_setting(&mut self, setting: Setting) {
        self.settings.insert(setting.id(), setting);
    }

    /// Removes a setting and announces the matching configuration deletion.
    pub fn delete_setting(&mut self, id: SettingId, upstream: &Upstream) {
        if let Some(setting) = self.settings.shift_remove(&id) {
            match setting.kind() {
                SettingKind::Device => upstream.delete_device_configuration(id),
                SettingKind::Register => upstream.delete_channel_configuration(id),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::UpstreamEvent;
    use crossbeam_channel::Receiver;

    fn upstream() -> (Upstream, Receiver<UpstreamEvent>) {
        Upstream::channel(&flint::logging::discard())
    }

    #[test]
    fn test_create_device_lowest_free_address() {
        let now = Instant::now();
        let mut registry = Registry::new();

        let first = registry.create_device("AAA", 50, now).unwrap();
        let second = registry.create_device("BBB", 50, now).unwrap();

        assert_eq!(registry.device(first).unwrap().address(), 1);
        assert_eq!(registry.device(second).unwrap().address(), 2);

        // Freeing the lower address makes it the next allocation again
        registry.set_device_address(first, UNASSIGNED_ADDRESS);
        let third = registry.create_device("CCC", 50, now).unwrap();
        assert_eq!(registry.device(third).unwrap().address(), 1);
    }

    #[test]
    fn test_create_device_exhausted() {
        let now = Instant::now();
        let mut registry = Registry::new();

        for address in 1..=MAX_DEVICE_ADDRESS {
            registry.create_device(&format!("SN{}", address), 50, now).unwrap();
        }

        assert_eq!(
            registry.create_device("OVERFLOW", 50, now),
            Err(RegistryError::NoAddressAvailable)
        );
    }

    #[test]
    fn test_duplicate_serial_rejected() {
        let now = Instant::now();
        let mut registry = Registry::new();

        registry.create_device("AAA", 50, now).unwrap();

        assert_eq!(
            registry.create_device("AAA", 50, now),
            Err(RegistryError::DuplicateSerialNumber)
        );
    }

    #[test]
    fn test_lookups() {
        let now = Instant::now();
        let mut registry = Registry::new();

        let id = registry.create_device("AAA", 50, now).unwrap();

        assert_eq!(registry.device_by_address(1).unwrap().id(), id);
        assert_eq!(registry.device_by_serial_number("AAA").unwrap().id(), id);
        assert!(registry.device_by_address(2).is_none());
        assert!(registry.device_by_serial_number("BBB").is_none());
    }

    #[test]
    fn test_set_device_address_reindexes() {
        let now = Instant::now();
        let mut registry = Registry::new();

        let id = registry.create_device("AAA", 50, now).unwrap();
        registry.set_device_address(id, 17);

        assert!(registry.device_by_address(1).is_none());
        assert_eq!(registry.device_by_address(17).unwrap().id(), id);
    }

    #[test]
    fn test_register_filtered_lookups() {
        let now = Instant::now();
        let mut registry = Registry::new();
        let device_id = registry.create_device("AAA", 50, now).unwrap();

        for address in 0..4 {
            registry.create_register(device_id, address, RegisterType::DigitalInput, DataType::Bool);
        }
        registry.create_register(device_id, 0, RegisterType::AnalogOutput, DataType::Float32);

        assert_eq!(registry.register_count(device_id, RegisterType::DigitalInput), 4);
        assert_eq!(registry.register_count(device_id, RegisterType::AnalogOutput), 1);
        assert_eq!(registry.register_count(device_id, RegisterType::AnalogInput), 0);

        let register = registry
            .register_at(device_id, RegisterType::DigitalInput, 2)
            .unwrap();
        assert_eq!(register.address(), 2);
        assert!(registry.register_at(device_id, RegisterType::DigitalInput, 9).is_none());
    }

    #[test]
    fn test_delete_register_announces_upstream() {
        let now = Instant::now();
        let (upstream, receiver) = upstream();
        let mut registry = Registry::new();
        let device_id = registry.create_device("AAA", 50, now).unwrap();

        let register_id =
            registry.create_register(device_id, 0, RegisterType::DigitalInput, DataType::Bool);
        registry.delete_register(register_id, &upstream);

        assert!(registry.register(register_id).is_none());

        match receiver.try_recv().unwrap() {
            UpstreamEvent::ChannelPropertyDeleted { property_id } => {
                assert_eq!(property_id, register_id)
            }
            event => panic!("Unexpected event {:?}", event),
        }
    }

    #[test]
    fn test_update_register_value_forwards_to_storage() {
        let now = Instant::now();
        let (upstream, receiver) = upstream();
        let mut registry = Registry::new();
        let device_id = registry.create_device("AAA", 50, now).unwrap();

        let register_id =
            registry.create_register(device_id, 0, RegisterType::AnalogInput, DataType::Float32);

        registry.update_register_value(register_id, Value::Float(1.5), &upstream);
        registry.update_register_value(register_id, Value::Float(2.5), &upstream);

        match receiver.try_recv().unwrap() {
            UpstreamEvent::PropertyValueStored { actual, previous, .. } => {
                assert_eq!(actual, Some(Value::Float(1.5)));
                assert_eq!(previous, None);
            }
            event => panic!("Unexpected event {:?}", event),
        }

        match receiver.try_recv().unwrap() {
            UpstreamEvent::PropertyValueStored { actual, previous, .. } => {
                assert_eq!(actual, Some(Value::Float(2.5)));
                assert_eq!(previous, Some(Value::Float(1.5)));
            }
            event => panic!("Unexpected event {:?}", event),
        }
    }

    #[test]
    fn test_delete_setting_announces_matching_kind() {
        let now = Instant::now();
        let (upstream, receiver) = upstream();
        let mut registry = Registry::new();
        let device_id = registry.create_device("AAA", 50, now).unwrap();

        let device_setting = registry.create_setting(device_id, 0, SettingKind::Device);
        let register_setting = registry.create_setting(device_id, 0, SettingKind::Register);

        registry.delete_setting(device_setting, &upstream);
        registry.delete_setting(register_setting, &upstream);

        match receiver.try_recv().unwrap() {
            UpstreamEvent::DeviceConfigurationDeleted { configuration_id } => {
                assert_eq!(configuration_id, device_setting)
            }
            event => panic!("Unexpected event {:?}", event),
        }

        match receiver.try_recv().unwrap() {
            UpstreamEvent::ChannelConfigurationDeleted { configuration_id } => {
                assert_eq!(configuration_id, register_setting)
            }
            event => panic!("Unexpected event {:?}", event),
        }
    }
}
