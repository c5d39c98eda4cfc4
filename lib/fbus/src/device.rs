use crate::types::{PairingCommand, Packet, RegisterType, SettingKind};
use crate::DeviceId;
use std::time::{Duration, Instant};

/// Packet payload limit assumed for devices that have not reported their own
/// maximum yet.
pub const DEFAULT_MAX_PACKET_LENGTH: usize = 50;

/// Minimum wall-clock interval between two full read cycles of a device.
pub const DEFAULT_SAMPLING_TIME: Duration = Duration::from_secs(10);

/// Gateway-side lifecycle of a device.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DeviceState {
    Unknown,
    Connected,
    Init,
    Running,
    Stopped,
    Lost,
    Disconnected,
}

/// State byte as reported by device firmware.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReportedState {
    Running = 0x01,
    Stopped = 0x02,
    Pairing = 0x03,
    Error = 0x04,
}

impl ReportedState {
    pub fn from_byte(byte: u8) -> Option<ReportedState> {
        Some(match byte {
            0x01 => ReportedState::Running,
            0x02 => ReportedState::Stopped,
            0x03 => ReportedState::Pairing,
            0x04 => ReportedState::Error,
            _ => return None,
        })
    }
}

/// Maps a reported state byte onto the gateway lifecycle. Anything the
/// gateway cannot act on collapses to `Unknown` so state acquisition restarts.
pub fn state_from_byte(byte: u8) -> DeviceState {
    match ReportedState::from_byte(byte) {
        Some(ReportedState::Running) => DeviceState::Running,
        Some(ReportedState::Stopped) => DeviceState::Stopped,
        _ => DeviceState::Unknown,
    }
}

/// A microcontroller peripheral on the bus, together with the transient
/// communication state the scheduler needs: the expected-reply latch, the
/// retransmit counter and the pairing/reading cursors.
#[derive(Debug, Clone)]
pub struct Device {
    id: DeviceId,
    serial_number: String,
    address: u8,
    state: DeviceState,

    max_packet_length: usize,
    description_support: bool,
    settings_support: bool,
    pub_sub_support: bool,

    hw_model: String,
    hw_manufacturer: String,
    hw_version: Option<String>,
    fw_manufacturer: String,
    fw_version: Option<String>,

    sampling_time: Duration,

    expected_reply: Option<Packet>,
    attempts: u32,
    last_send: Option<Instant>,
    lost_since: Option<Instant>,

    pairing_command: Option<PairingCommand>,

    last_read_cycle: Option<Instant>,
    reading_cursor: Option<(u16, RegisterType)>,
    setting_cursor: Option<(u16, SettingKind)>,
}

impl Device {
    pub fn new(id: DeviceId, address: u8, serial_number: String, max_packet_length: usize) -> Device {
        Device {
            id,
            serial_number,
            address,
            state: DeviceState::Unknown,
            max_packet_length,
            description_support: false,
            settings_support: false,
            pub_sub_support: false,
            hw_model: "custom".to_string(),
            hw_manufacturer: "generic".to_string(),
            hw_version: None,
            fw_manufacturer: "generic".to_string(),
            fw_version: None,
            sampling_time: DEFAULT_SAMPLING_TIME,
            expected_reply: None,
            attempts: 0,
            last_send: None,
            lost_since: None,
            pairing_command: None,
            last_read_cycle: None,
            reading_cursor: None,
            setting_cursor: None,
        }
    }

    #[inline]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    #[inline]
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    #[inline]
    pub fn address(&self) -> u8 {
        self.address
    }

    #[inline]
    pub(crate) fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    #[inline]
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Applies a lifecycle transition. Entering `Lost` stamps the lost-since
    /// time and clears the transient communication state.
    pub fn set_state(&mut self, state: DeviceState, now: Instant) {
        self.state = state;

        if state == DeviceState::Lost {
            self.lost_since = Some(now);
            self.reset_communication();
            self.last_send = None;
        }
    }

    /// A device is ready for regular polling once it runs.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == DeviceState::Running
    }

    #[inline]
    pub fn is_lost(&self) -> bool {
        self.state == DeviceState::Lost
    }

    /// Brings the device back after a successful ping: state acquisition
    /// restarts from `Unknown` with a clean communication slate.
    pub fn mark_alive(&mut self, now: Instant) {
        self.set_state(DeviceState::Unknown, now);
        self.reset_communication();
        self.lost_since = None;
    }

    #[inline]
    pub fn max_packet_length(&self) -> usize {
        self.max_packet_length
    }

    #[inline]
    pub fn set_max_packet_length(&mut self, max_packet_length: usize) {
        self.max_packet_length = max_packet_length;
    }

    #[inline]
    pub fn description_support(&self) -> bool {
        self.description_support
    }

    #[inline]
    pub fn set_description_support(&mut self, support: bool) {
        self.description_support = support;
    }

    #[inline]
    pub fn settings_support(&self) -> bool {
        self.settings_support
    }

    #[inline]
    pub fn set_settings_support(&mut self, support: bool) {
        self.settings_support = support;
    }

    #[inline]
    pub fn pub_sub_support(&self) -> bool {
        self.pub_sub_support
    }

    #[inline]
    pub fn set_pub_sub_support(&mut self, support: bool) {
        self.pub_sub_support = support;
    }

    #[inline]
    pub fn hw_model(&self) -> &str {
        &self.hw_model
    }

    #[inline]
    pub fn set_hw_model(&mut self, model: String) {
        self.hw_model = model;
    }

    #[inline]
    pub fn hw_manufacturer(&self) -> &str {
        &self.hw_manufacturer
    }

    #[inline]
    pub fn set_hw_manufacturer(&mut self, manufacturer: String) {
        self.hw_manufacturer = manufacturer;
    }

    #[inline]
    pub fn hw_version(&self) -> Option<&str> {
        self.hw_version.as_deref()
    }

    #[inline]
    pub fn set_hw_version(&mut self, version: String) {
        self.hw_version = Some(version);
    }

    #[inline]
    pub fn fw_manufacturer(&self) -> &str {
        &self.fw_manufacturer
    }

    #[inline]
    pub fn set_fw_manufacturer(&mut self, manufacturer: String) {
        self.fw_manufacturer = manufacturer;
    }

    #[inline]
    pub fn fw_version(&self) -> Option<&str> {
        self.fw_version.as_deref()
    }

    #[inline]
    pub fn set_fw_version(&mut self, version: String) {
        self.fw_version = Some(version);
    }

    #[inline]
    pub fn sampling_time(&self) -> Duration {
        self.sampling_time
    }

    #[inline]
    pub fn expected_reply(&self) -> Option<Packet> {
        self.expected_reply
    }

    /// Latches the packet the device is expected to answer with; acts as a
    /// per-device mutex on outgoing traffic.
    #[inline]
    pub fn expect_reply(&mut self, packet: Packet) {
        self.expected_reply = Some(packet);
    }

    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[inline]
    pub fn increment_attempts(&mut self) {
        self.attempts += 1;
    }

    #[inline]
    pub fn last_send(&self) -> Option<Instant> {
        self.last_send
    }

    #[inline]
    pub fn stamp_send(&mut self, now: Instant) {
        self.last_send = Some(now);
    }

    #[inline]
    pub fn lost_since(&self) -> Option<Instant> {
        self.lost_since
    }

    /// Clears the expected-reply latch and the retransmit counter.
    #[inline]
    pub fn reset_communication(&mut self) {
        self.expected_reply = None;
        self.attempts = 0;
    }

    #[inline]
    pub fn pairing_command(&self) -> Option<PairingCommand> {
        self.pairing_command
    }

    #[inline]
    pub fn set_pairing_command(&mut self, command: Option<PairingCommand>) {
        self.pairing_command = command;
    }

    #[inline]
    pub fn last_read_cycle(&self) -> Option<Instant> {
        self.last_read_cycle
    }

    #[inline]
    pub fn reading_cursor(&self) -> Option<(u16, RegisterType)> {
        self.reading_cursor
    }

    #[inline]
    pub fn set_reading_cursor(&mut self, address: u16, register_type: RegisterType) {
        self.reading_cursor = Some((address, register_type));
    }

    /// Clears the register cursor; a full read cycle just completed, so the
    /// sampling clock is stamped.
    #[inline]
    pub fn finish_read_cycle(&mut self, now: Instant) {
        self.reading_cursor = None;
        self.last_read_cycle = Some(now);
    }

    #[inline]
    pub fn setting_cursor(&self) -> Option<(u16, SettingKind)> {
        self.setting_cursor
    }

    #[inline]
    pub fn set_setting_cursor(&mut self, address: u16, kind: SettingKind) {
        self.setting_cursor = Some((address, kind));
    }

    #[inline]
    pub fn clear_setting_cursor(&mut self) {
        self.setting_cursor = None;
    }
}
