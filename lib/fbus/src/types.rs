use flint::value::ValueKind;

/// Address of the bus master (the gateway itself).
pub const MASTER_ADDRESS: u8 = 254;
/// Sentinel address of a device that has not been assigned one yet.
pub const UNASSIGNED_ADDRESS: u8 = 255;
/// Link layer broadcast recipient.
pub const BROADCAST_ADDRESS: u8 = 0;
/// Highest address assignable to a device; 254 and 255 are reserved.
pub const MAX_DEVICE_ADDRESS: u8 = 253;

/// Every frame ends with this byte.
pub const TERMINATOR: u8 = 0x00;
/// Separator between variable length text fields inside one payload.
pub const DATA_SPACE: u8 = 0x20;

/// Packet identifiers, the first byte of every application payload.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Packet {
    PairDevice = 0x01,
    ReadSingleRegister = 0x03,
    ReadMultipleRegisters = 0x05,
    WriteSingleRegister = 0x07,
    WriteMultipleRegisters = 0x09,
    ReportSingleRegister = 0x0B,
    ReadOneConfiguration = 0x0D,
    WriteOneConfiguration = 0x0F,
    ReportOneConfiguration = 0x11,
    Ping = 0x13,
    Pong = 0x15,
    Hello = 0x17,
    GetState = 0x19,
    SetState = 0x1B,
    ReportState = 0x1D,
    ControlDevice = 0x1F,
    PubSubBroadcast = 0x21,
    PubSubSubscribe = 0x23,
    PubSubUnsubscribe = 0x25,
    Exception = 0x63,
}

impl Packet {
    pub fn from_byte(byte: u8) -> Option<Packet> {
        Some(match byte {
            0x01 => Packet::PairDevice,
            0x03 => Packet::ReadSingleRegister,
            0x05 => Packet::ReadMultipleRegisters,
            0x07 => Packet::WriteSingleRegister,
            0x09 => Packet::WriteMultipleRegisters,
            0x0B => Packet::ReportSingleRegister,
            0x0D => Packet::ReadOneConfiguration,
            0x0F => Packet::WriteOneConfiguration,
            0x11 => Packet::ReportOneConfiguration,
            0x13 => Packet::Ping,
            0x15 => Packet::Pong,
            0x17 => Packet::Hello,
            0x19 => Packet::GetState,
            0x1B => Packet::SetState,
            0x1D => Packet::ReportState,
            0x1F => Packet::ControlDevice,
            0x21 => Packet::PubSubBroadcast,
            0x23 => Packet::PubSubSubscribe,
            0x25 => Packet::PubSubUnsubscribe,
            0x63 => Packet::Exception,
            _ => return None,
        })
    }

    /// Human readable packet name for log records.
    pub fn name(self) -> &'static str {
        match self {
            Packet::PairDevice => "pair-device",
            Packet::ReadSingleRegister => "read-single-register",
            Packet::ReadMultipleRegisters => "read-multiple-registers",
            Packet::WriteSingleRegister => "write-single-register",
            Packet::WriteMultipleRegisters => "write-multiple-registers",
            Packet::ReportSingleRegister => "report-single-register",
            Packet::ReadOneConfiguration => "read-one-configuration",
            Packet::WriteOneConfiguration => "write-one-configuration",
            Packet::ReportOneConfiguration => "report-one-configuration",
            Packet::Ping => "ping",
            Packet::Pong => "pong",
            Packet::Hello => "hello",
            Packet::GetState => "get-state",
            Packet::SetState => "set-state",
            Packet::ReportState => "report-state",
            Packet::ControlDevice => "control-device",
            Packet::PubSubBroadcast => "pubsub-broadcast",
            Packet::PubSubSubscribe => "pubsub-subscribe",
            Packet::PubSubUnsubscribe => "pubsub-unsubscribe",
            Packet::Exception => "exception",
        }
    }
}

impl From<Packet> for u8 {
    #[inline]
    fn from(packet: Packet) -> Self {
        packet as u8
    }
}

/// Pairing subcommands issued by the master.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PairingCommand {
    ProvideAddress = 0x01,
    SetAddress = 0x02,
    ProvideAboutInfo = 0x03,
    ProvideDeviceModel = 0x04,
    ProvideDeviceManufacturer = 0x05,
    ProvideDeviceVersion = 0x06,
    ProvideFirmwareManufacturer = 0x07,
    ProvideFirmwareVersion = 0x08,
    ProvideRegistersSize = 0x09,
    ProvideRegistersStructure = 0x0A,
    ProvideSettingsSize = 0x0B,
    ProvideSettingsStructure = 0x0C,
    Finished = 0x0D,
}

impl From<PairingCommand> for u8 {
    #[inline]
    fn from(command: PairingCommand) -> Self {
        command as u8
    }
}

/// Pairing responses mirror the commands, offset into the 0x51..0x5D range.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PairingResponse {
    DeviceAddress = 0x51,
    AddressAccepted = 0x52,
    AboutInfo = 0x53,
    DeviceModel = 0x54,
    DeviceManufacturer = 0x55,
    DeviceVersion = 0x56,
    FirmwareManufacturer = 0x57,
    FirmwareVersion = 0x58,
    RegistersSize = 0x59,
    RegistersStructure = 0x5A,
    SettingsSize = 0x5B,
    SettingsStructure = 0x5C,
    Finished = 0x5D,
}

impl PairingResponse {
    pub fn from_byte(byte: u8) -> Option<PairingResponse> {
        Some(match byte {
            0x51 => PairingResponse::DeviceAddress,
            0x52 => PairingResponse::AddressAccepted,
            0x53 => PairingResponse::AboutInfo,
            0x54 => PairingResponse::DeviceModel,
            0x55 => PairingResponse::DeviceManufacturer,
            0x56 => PairingResponse::DeviceVersion,
            0x57 => PairingResponse::FirmwareManufacturer,
            0x58 => PairingResponse::FirmwareVersion,
            0x59 => PairingResponse::RegistersSize,
            0x5A => PairingResponse::RegistersStructure,
            0x5B => PairingResponse::SettingsSize,
            0x5C => PairingResponse::SettingsStructure,
            0x5D => PairingResponse::Finished,
            _ => return None,
        })
    }
}

/// Register classes. Digital registers carry booleans, analog ones carry
/// numeric values; inputs are read only, outputs are writable.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RegisterType {
    DigitalInput = 0x01,
    DigitalOutput = 0x02,
    AnalogInput = 0x03,
    AnalogOutput = 0x04,
}

impl RegisterType {
    pub fn from_byte(byte: u8) -> Option<RegisterType> {
        Some(match byte {
            0x01 => RegisterType::DigitalInput,
            0x02 => RegisterType::DigitalOutput,
            0x03 => RegisterType::AnalogInput,
            0x04 => RegisterType::AnalogOutput,
            _ => return None,
        })
    }

    #[inline]
    pub fn is_digital(self) -> bool {
        match self {
            RegisterType::DigitalInput | RegisterType::DigitalOutput => true,
            _ => false,
        }
    }

    #[inline]
    pub fn is_writable(self) -> bool {
        match self {
            RegisterType::DigitalOutput | RegisterType::AnalogOutput => true,
            _ => false,
        }
    }

    /// Channel identifier prefix used when announcing registers upstream.
    pub fn channel_prefix(self) -> &'static str {
        match self {
            RegisterType::DigitalInput => "di",
            RegisterType::DigitalOutput => "do",
            RegisterType::AnalogInput => "ai",
            RegisterType::AnalogOutput => "ao",
        }
    }

    /// Scanning order of the reading cursor.
    pub const SCAN_ORDER: [RegisterType; 4] = [
        RegisterType::DigitalInput,
        RegisterType::DigitalOutput,
        RegisterType::AnalogInput,
        RegisterType::AnalogOutput,
    ];
}

impl From<RegisterType> for u8 {
    #[inline]
    fn from(register_type: RegisterType) -> Self {
        register_type as u8
    }
}

/// Settings either configure the device as a whole or one of its registers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SettingKind {
    Device = 0x01,
    Register = 0x02,
}

impl SettingKind {
    pub fn from_byte(byte: u8) -> Option<SettingKind> {
        Some(match byte {
            0x01 => SettingKind::Device,
            0x02 => SettingKind::Register,
            _ => return None,
        })
    }

    /// On-wire size of one settings structure descriptor.
    #[inline]
    pub fn descriptor_size(self) -> usize {
        match self {
            SettingKind::Device => 12,
            SettingKind::Register => 15,
        }
    }
}

impl From<SettingKind> for u8 {
    #[inline]
    fn from(kind: SettingKind) -> Self {
        kind as u8
    }
}

/// Wire data types of register and setting values.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DataType {
    UInt8 = 0x01,
    UInt16 = 0x02,
    UInt32 = 0x03,
    Int8 = 0x04,
    Int16 = 0x05,
    Int32 = 0x06,
    Float32 = 0x07,
    Bool = 0x08,
    Time = 0x09,
    Date = 0x0A,
    DateTime = 0x0B,
    Unknown = 0xFF,
}

impl DataType {
    pub fn from_byte(byte: u8) -> Option<DataType> {
        Some(match byte {
            0x01 => DataType::UInt8,
            0x02 => DataType::UInt16,
            0x03 => DataType::UInt32,
            0x04 => DataType::Int8,
            0x05 => DataType::Int16,
            0x06 => DataType::Int32,
            0x07 => DataType::Float32,
            0x08 => DataType::Bool,
            0x09 => DataType::Time,
            0x0A => DataType::Date,
            0x0B => DataType::DateTime,
            0xFF => DataType::Unknown,
            _ => return None,
        })
    }

    /// Size of the value in bytes. Unknown and the calendar types carry no
    /// decodable value.
    pub fn size(self) -> usize {
        match self {
            DataType::UInt8 | DataType::Int8 | DataType::Bool => 1,
            DataType::UInt16 | DataType::Int16 => 2,
            DataType::UInt32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::Time | DataType::Date | DataType::DateTime | DataType::Unknown => 0,
        }
    }

    /// Maps the wire data type onto the gateway-side value kind. Returns
    /// `None` for types the gateway cannot represent.
    pub fn value_kind(self) -> Option<ValueKind> {
        Some(match self {
            DataType::Bool => ValueKind::Boolean,
            DataType::Int8 => ValueKind::Char,
            DataType::UInt8 => ValueKind::UChar,
            DataType::Int16 => ValueKind::Short,
            DataType::UInt16 => ValueKind::UShort,
            DataType::Int32 => ValueKind::Int,
            DataType::UInt32 => ValueKind::UInt,
            DataType::Float32 => ValueKind::Float,
            _ => return None,
        })
    }

    /// Reverse of `value_kind`, used when persisted properties are mapped
    /// back onto bus registers.
    pub fn from_value_kind(kind: ValueKind) -> DataType {
        match kind {
            ValueKind::Boolean => DataType::Bool,
            ValueKind::Char => DataType::Int8,
            ValueKind::UChar => DataType::UInt8,
            ValueKind::Short => DataType::Int16,
            ValueKind::UShort => DataType::UInt16,
            ValueKind::Int => DataType::Int32,
            ValueKind::UInt => DataType::UInt32,
            ValueKind::Float => DataType::Float32,
        }
    }
}

impl From<DataType> for u8 {
    #[inline]
    fn from(data_type: DataType) -> Self {
        data_type as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_byte_roundtrip() {
        for &packet in [
            Packet::PairDevice,
            Packet::ReadMultipleRegisters,
            Packet::WriteSingleRegister,
            Packet::ReportSingleRegister,
            Packet::Ping,
            Packet::Pong,
            Packet::GetState,
            Packet::ReportState,
            Packet::Exception,
        ]
        .iter()
        {
            assert_eq!(Packet::from_byte(packet.into()), Some(packet));
        }

        assert_eq!(Packet::from_byte(0x02), None);
        assert_eq!(Packet::from_byte(0x64), None);
    }

    #[test]
    fn test_pairing_response_range() {
        assert_eq!(PairingResponse::from_byte(0x51), Some(PairingResponse::DeviceAddress));
        assert_eq!(PairingResponse::from_byte(0x5D), Some(PairingResponse::Finished));
        assert_eq!(PairingResponse::from_byte(0x50), None);
        assert_eq!(PairingResponse::from_byte(0x5E), None);
    }

    #[test]
    fn test_register_type_predicates() {
        assert!(RegisterType::DigitalInput.is_digital());
        assert!(!RegisterType::DigitalInput.is_writable());
        assert!(RegisterType::DigitalOutput.is_writable());
        assert!(!RegisterType::AnalogInput.is_writable());
        assert!(RegisterType::AnalogOutput.is_writable());
        assert!(!RegisterType::AnalogOutput.is_digital());
    }

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(DataType::UInt8.size(), 1);
        assert_eq!(DataType::Int8.size(), 1);
        assert_eq!(DataType::Bool.size(), 1);
        assert_eq!(DataType::UInt16.size(), 2);
        assert_eq!(DataType::Int16.size(), 2);
        assert_eq!(DataType::UInt32.size(), 4);
        assert_eq!(DataType::Int32.size(), 4);
        assert_eq!(DataType::Float32.size(), 4);
        assert_eq!(DataType::Unknown.size(), 0);
    }

    #[test]
    fn test_value_kind_roundtrip() {
        for &data_type in [
            DataType::UInt8,
            DataType::UInt16,
            DataType::UInt32,
            DataType::Int8,
            DataType::Int16,
            DataType::Int32,
            DataType::Float32,
            DataType::Bool,
        ]
        .iter()
        {
            let kind = data_type.value_kind().unwrap();
            assert_eq!(DataType::from_value_kind(kind), data_type);
        }

        assert_eq!(DataType::Unknown.value_kind(), None);
        assert_eq!(DataType::Time.value_kind(), None);
    }
}
