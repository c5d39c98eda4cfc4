use crate::codec::{extract_text, find_space, push_u16_be, read_u16_be, DIGITAL_TRUE};
use crate::device::{state_from_byte, DeviceState, DEFAULT_MAX_PACKET_LENGTH};
use crate::handlers::{propagate_device, Ctx};
use crate::types::{
    DataType, Packet, PairingCommand, PairingResponse, RegisterType, SettingKind, TERMINATOR,
    UNASSIGNED_ADDRESS,
};
use crate::DeviceId;
use flint::logging;
use std::time::{Duration, Instant};

/// Address assignment and progressive device interrogation. While pairing is
/// enabled the scheduler hands the whole bus to this state machine: first a
/// search broadcast, then a per-device walk through address assignment,
/// about info, description strings, register layout and settings layout.
pub struct Pairing {
    enabled: bool,
    subject: Option<DeviceId>,
    attempts: u32,
    last_broadcast: Option<Instant>,
}

impl Pairing {
    /// Search broadcasts before pairing auto-disables.
    pub const MAX_SEARCHING_ATTEMPTS: u32 = 5;
    /// Per-device retransmit budget during the interrogation walk.
    pub const MAX_TRANSMIT_ATTEMPTS: u32 = 5;
    /// Pause between two search broadcasts.
    pub const SEARCHING_DELAY: Duration = Duration::from_secs(6);
    /// Acknowledge window granted to pairing traffic.
    pub const RESPONSE_DELAY: Duration = Duration::from_secs(2);

    pub fn new() -> Pairing {
        Pairing {
            enabled: false,
            subject: None,
            attempts: 0,
            last_broadcast: None,
        }
    }

    pub fn enable(&mut self, log: &logging::Logger) {
        self.enabled = true;

        logging::debug!(log, "pairing mode is activated"; "context" => "pairing");
    }

    pub fn disable(&mut self, log: &logging::Logger) {
        self.enabled = false;

        logging::debug!(log, "pairing mode is deactivated"; "context" => "pairing");
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn handle(&mut self, ctx: &mut Ctx, now: Instant) {
        if !self.enabled {
            return;
        }

        let subject = match self.subject {
            Some(subject) => subject,
            None => {
                self.search(ctx, now);

                return;
            }
        };

        let (attempts, state, pairing_command, address) = match ctx.registry.device(subject) {
            Some(device) => (
                device.attempts(),
                device.state(),
                device.pairing_command(),
                device.address(),
            ),
            None => {
                logging::warn!(ctx.log, "device for pairing could not be loaded from registry";
                               "context" => "pairing");

                self.subject = None;
                self.disable(ctx.log);

                return;
            }
        };

        if attempts >= Self::MAX_TRANSMIT_ATTEMPTS {
            logging::debug!(ctx.log, "pairing could not be finished, device is lost";
                            "context" => "pairing",
                            "address" => address);

            if let Some(device) = ctx.registry.device_mut(subject) {
                device.set_state(DeviceState::Lost, now);
            }

            self.subject = None;
            self.disable(ctx.log);

            return;
        }

        match pairing_command {
            Some(PairingCommand::SetAddress) => {
                if state != DeviceState::Connected {
                    logging::debug!(ctx.log, "device is in invalid state, pairing could not be finished";
                                    "context" => "pairing",
                                    "address" => address);

                    self.subject = None;
                    self.disable(ctx.log);

                    return;
                }

                self.send_set_address(ctx, subject, now);
            }
            Some(command) => {
                if state != DeviceState::Init {
                    logging::debug!(ctx.log, "device is in invalid state, pairing could not be finished";
                                    "context" => "pairing",
                                    "address" => address);

                    self.subject = None;

                    return;
                }

                match command {
                    PairingCommand::ProvideRegistersStructure => {
                        self.send_provide_registers_structure(ctx, subject, now)
                    }
                    PairingCommand::ProvideSettingsStructure => {
                        self.send_provide_settings_structure(ctx, subject, now)
                    }
                    command => self.send_command(ctx, subject, command, now),
                }
            }
            None => (),
        }
    }

    pub fn receive(&mut self, ctx: &mut Ctx, packet: Packet, sender: u8, payload: &[u8], now: Instant) {
        if packet != Packet::PairDevice {
            return;
        }

        let response = match payload.get(1).copied().and_then(PairingResponse::from_byte) {
            Some(response) => response,
            None => {
                logging::warn!(ctx.log, "received unknown pairing response";
                               "context" => "pairing",
                               "address" => sender);

                return;
            }
        };

        match response {
            PairingResponse::DeviceAddress => self.device_address_receiver(ctx, sender, payload, now),
            PairingResponse::AddressAccepted => {
                self.address_accepted_receiver(ctx, sender, payload, now)
            }
            PairingResponse::AboutInfo => self.about_info_receiver(ctx, sender, payload),
            PairingResponse::DeviceModel
            | PairingResponse::DeviceManufacturer
            | PairingResponse::DeviceVersion
            | PairingResponse::FirmwareManufacturer
            | PairingResponse::FirmwareVersion => {
                self.description_receiver(ctx, response, sender, payload)
            }
            PairingResponse::RegistersSize => self.registers_size_receiver(ctx, sender, payload),
            PairingResponse::RegistersStructure => {
                self.registers_structure_receiver(ctx, sender, payload)
            }
            PairingResponse::SettingsSize => self.settings_size_receiver(ctx, sender, payload),
            PairingResponse::SettingsStructure => {
                self.settings_structure_receiver(ctx, sender, payload)
            }
            PairingResponse::Finished => self.finished_receiver(ctx, sender, payload, now),
        }
    }

    /// Broadcast phase: no device latched yet.
    fn search(&mut self, ctx: &mut Ctx, now: Instant) {
        if self.attempts >= Self::MAX_SEARCHING_ATTEMPTS {
            self.disable(ctx.log);

            self.attempts = 0;
            self.last_broadcast = None;

            return;
        }

        let broadcast_due = self
            .last_broadcast
            .map_or(true, |stamp| now.duration_since(stamp) >= Self::SEARCHING_DELAY);

        if broadcast_due {
            ctx.transport.broadcast_packet(
                &[
                    Packet::PairDevice.into(),
                    PairingCommand::ProvideAddress.into(),
                    TERMINATOR,
                ],
                Some(Self::RESPONSE_DELAY),
            );

            self.attempts += 1;
            self.last_broadcast = Some(now);
        }
    }

    /// Stamps the expected-reply latch and ships one pairing frame with the
    /// standard acknowledge window.
    fn send_to_device(&self, ctx: &mut Ctx, device_id: DeviceId, frame: &[u8], now: Instant) {
        let address = match ctx.registry.device_mut(device_id) {
            Some(device) => {
                device.increment_attempts();
                device.expect_reply(Packet::PairDevice);
                device.stamp_send(now);

                device.address()
            }
            None => return,
        };

        let delivered = ctx
            .transport
            .send_packet(address, frame, Some(Self::RESPONSE_DELAY));

        if !delivered {
            if let Some(device) = ctx.registry.device_mut(device_id) {
                device.reset_communication();
            }
        }
    }

    fn send_command(&self, ctx: &mut Ctx, device_id: DeviceId, command: PairingCommand, now: Instant) {
        self.send_to_device(
            ctx,
            device_id,
            &[Packet::PairDevice.into(), command.into(), TERMINATOR],
            now,
        );
    }

    fn send_set_address(&self, ctx: &mut Ctx, device_id: DeviceId, now: Instant) {
        let (address, serial_number) = match ctx.registry.device(device_id) {
            Some(device) => (device.address(), device.serial_number().to_string()),
            None => return,
        };

        let mut frame = vec![
            Packet::PairDevice.into(),
            PairingCommand::SetAddress.into(),
            address,
        ];
        frame.extend_from_slice(serial_number.as_bytes());
        frame.push(TERMINATOR);

        self.send_to_device(ctx, device_id, &frame, now);
    }

    fn send_provide_registers_structure(&self, ctx: &mut Ctx, device_id: DeviceId, now: Instant) {
        let (start_address, register_type, max_packet_length) =
            match ctx.registry.device(device_id) {
                Some(device) => match device.reading_cursor() {
                    Some((address, register_type)) => {
                        (address, register_type, device.max_packet_length())
                    }
                    None => return,
                },
                None => return,
            };

        let register_size = ctx.registry.register_count(device_id, register_type) as u16;

        // One descriptor byte per register
        let per_frame = max_packet_length.saturating_sub(5).max(1) as u16;
        let last_readable = start_address + per_frame - 1;

        let read_length = if last_readable + 1 >= register_size {
            register_size.saturating_sub(start_address)
        } else {
            per_frame
        };

        let mut frame = vec![
            Packet::PairDevice.into(),
            PairingCommand::ProvideRegistersStructure.into(),
            register_type.into(),
        ];
        push_u16_be(&mut frame, start_address);
        push_u16_be(&mut frame, read_length);
        frame.push(TERMINATOR);

        self.send_to_device(ctx, device_id, &frame, now);
    }

    fn send_provide_settings_structure(&self, ctx: &mut Ctx, device_id: DeviceId, now: Instant) {
        let (start_address, kind, max_packet_length) = match ctx.registry.device(device_id) {
            Some(device) => match device.setting_cursor() {
                Some((address, kind)) => (address, kind, device.max_packet_length()),
                None => return,
            },
            None => return,
        };

        let settings_size = ctx.registry.setting_count(device_id, kind) as u16;

        // At least one descriptor per request so tiny packet lengths still
        // make progress
        let per_frame = (max_packet_length.saturating_sub(5) / kind.descriptor_size()).max(1) as u16;
        let last_readable = start_address + per_frame - 1;

        let read_length = if last_readable + 1 >= settings_size {
            settings_size.saturating_sub(start_address)
        } else {
            per_frame
        };

        let mut frame = vec![
            Packet::PairDevice.into(),
            PairingCommand::ProvideSettingsStructure.into(),
            kind.into(),
        ];
        push_u16_be(&mut frame, start_address);
        push_u16_be(&mut frame, read_length);
        frame.push(TERMINATOR);

        self.send_to_device(ctx, device_id, &frame, now);
    }

    /// An unassigned (or re-announcing) device answered the search broadcast
    /// with its current address and serial number.
    fn device_address_receiver(&mut self, ctx: &mut Ctx, sender: u8, payload: &[u8], now: Instant) {
        if payload.len() < 4 {
            logging::warn!(ctx.log, "packet structure is invalid, length is not as expected";
                           "context" => "pairing");

            return;
        }

        let reported_address = payload[2];

        if reported_address != sender {
            logging::warn!(ctx.log, "received packet with address mismatch";
                           "context" => "pairing",
                           "sender" => sender,
                           "reported" => reported_address);

            return;
        }

        let serial_number = extract_text(payload, 3);

        let device_id = match ctx.registry.device_id_by_serial_number(&serial_number) {
            None => {
                // A brand new device gets the lowest free address
                match ctx
                    .registry
                    .create_device(&serial_number, DEFAULT_MAX_PACKET_LENGTH, now)
                {
                    Ok(device_id) => {
                        let address = ctx
                            .registry
                            .device(device_id)
                            .map(|device| device.address())
                            .unwrap_or(UNASSIGNED_ADDRESS);

                        logging::debug!(ctx.log, "new device was added to registry";
                                        "context" => "pairing",
                                        "serial_number" => serial_number.as_str(),
                                        "address" => address);

                        device_id
                    }
                    Err(err) => {
                        logging::warn!(ctx.log, "new device could not be created";
                                       "context" => "pairing",
                                       "serial_number" => serial_number.as_str(),
                                       "error" => %err);

                        return;
                    }
                }
            }
            Some(device_id) => {
                let known_address = match ctx.registry.device(device_id) {
                    Some(device) => device.address(),
                    None => return,
                };

                if reported_address != known_address && reported_address != UNASSIGNED_ADDRESS {
                    if known_address == UNASSIGNED_ADDRESS {
                        // A loaded device without an address adopts the one
                        // it reports, unless another device already owns it
                        let conflict = ctx
                            .registry
                            .device_id_by_address(reported_address)
                            .map_or(false, |other| other != device_id);

                        if conflict {
                            logging::warn!(ctx.log, "received serial number is not unique";
                                           "context" => "pairing",
                                           "serial_number" => serial_number.as_str());

                            return;
                        }

                        ctx.registry.set_device_address(device_id, reported_address);
                    } else {
                        logging::warn!(ctx.log, "received serial number is not unique";
                                       "context" => "pairing",
                                       "serial_number" => serial_number.as_str());

                        return;
                    }
                }

                device_id
            }
        };

        if let Some(device) = ctx.registry.device_mut(device_id) {
            if reported_address == UNASSIGNED_ADDRESS {
                // No address yet, assignment comes first
                device.set_state(DeviceState::Connected, now);
                device.set_pairing_command(Some(PairingCommand::SetAddress));
            } else {
                // Address is settled, continue with interrogation
                device.set_state(DeviceState::Init, now);
                device.set_pairing_command(Some(PairingCommand::ProvideAboutInfo));
            }

            device.reset_communication();
        }

        self.subject = Some(device_id);
        self.attempts = 0;
        self.last_broadcast = None;
    }

    fn address_accepted_receiver(&mut self, ctx: &mut Ctx, sender: u8, payload: &[u8], now: Instant) {
        let device_id = match ctx.registry.device_id_by_address(sender) {
            Some(device_id) => device_id,
            None => return,
        };

        let serial_number = extract_text(payload, 2);

        let matches = ctx
            .registry
            .device(device_id)
            .map_or(false, |device| device.serial_number() == serial_number);

        if !matches {
            logging::warn!(ctx.log, "device confirmed address assign with serial number mismatch";
                           "context" => "pairing",
                           "address" => sender);

            return;
        }

        if let Some(device) = ctx.registry.device_mut(device_id) {
            device.set_state(DeviceState::Init, now);
            device.set_pairing_command(Some(PairingCommand::ProvideAboutInfo));
            device.reset_communication();
        }
    }

    fn about_info_receiver(&mut self, ctx: &mut Ctx, sender: u8, payload: &[u8]) {
        let device_id = match ctx.registry.device_id_by_address(sender) {
            Some(device_id) => device_id,
            None => return,
        };

        if payload.len() < 11 {
            logging::warn!(ctx.log, "packet structure is invalid, length is not as expected";
                           "context" => "pairing",
                           "address" => sender);

            return;
        }

        let max_packet_length = read_u16_be(payload, 2) as usize;
        let description_support = read_u16_be(payload, 4) == DIGITAL_TRUE;
        let settings_support = read_u16_be(payload, 6) == DIGITAL_TRUE;
        let pub_sub_support = read_u16_be(payload, 8) == DIGITAL_TRUE;

        if let Some(device) = ctx.registry.device_mut(device_id) {
            device.set_max_packet_length(max_packet_length);
            device.set_description_support(description_support);
            device.set_settings_support(settings_support);
            device.set_pub_sub_support(pub_sub_support);

            if description_support {
                device.set_pairing_command(Some(PairingCommand::ProvideDeviceModel));
            } else {
                device.set_pairing_command(Some(PairingCommand::ProvideRegistersSize));
            }

            device.reset_communication();
        }
    }

    fn description_receiver(
        &mut self,
        ctx: &mut Ctx,
        response: PairingResponse,
        sender: u8,
        payload: &[u8],
    ) {
        let device_id = match ctx.registry.device_id_by_address(sender) {
            Some(device_id) => device_id,
            None => return,
        };

        let content = extract_text(payload, 2);

        if let Some(device) = ctx.registry.device_mut(device_id) {
            let next = match response {
                PairingResponse::DeviceModel => {
                    device.set_hw_model(content);

                    PairingCommand::ProvideDeviceManufacturer
                }
                PairingResponse::DeviceManufacturer => {
                    device.set_hw_manufacturer(content);

                    PairingCommand::ProvideDeviceVersion
                }
                PairingResponse::DeviceVersion => {
                    device.set_hw_version(content);

                    PairingCommand::ProvideFirmwareManufacturer
                }
                PairingResponse::FirmwareManufacturer => {
                    device.set_fw_manufacturer(content);

                    PairingCommand::ProvideFirmwareVersion
                }
                PairingResponse::FirmwareVersion => {
                    device.set_fw_version(content);

                    PairingCommand::ProvideRegistersSize
                }
                _ => return,
            };

            device.set_pairing_command(Some(next));
            device.reset_communication();
        }
    }

    /// Resizes the registry to the reported register counts, then directs
    /// the walk to analog structure discovery or onwards to settings.
    fn registers_size_receiver(&mut self, ctx: &mut Ctx, sender: u8, payload: &[u8]) {
        let device_id = match ctx.registry.device_id_by_address(sender) {
            Some(device_id) => device_id,
            None => return,
        };

        if payload.len() < 7 {
            logging::warn!(ctx.log, "packet structure is invalid, length is not as expected";
                           "context" => "pairing",
                           "address" => sender);

            return;
        }

        self.configure_registers(ctx, device_id, payload[2] as u16, RegisterType::DigitalInput);
        self.configure_registers(ctx, device_id, payload[3] as u16, RegisterType::DigitalOutput);
        self.configure_registers(ctx, device_id, payload[4] as u16, RegisterType::AnalogInput);
        self.configure_registers(ctx, device_id, payload[5] as u16, RegisterType::AnalogOutput);

        logging::debug!(ctx.log, "configured device registers";
                        "context" => "pairing",
                        "address" => sender,
                        "di" => ctx.registry.register_count(device_id, RegisterType::DigitalInput),
                        "do" => ctx.registry.register_count(device_id, RegisterType::DigitalOutput),
                        "ai" => ctx.registry.register_count(device_id, RegisterType::AnalogInput),
                        "ao" => ctx.registry.register_count(device_id, RegisterType::AnalogOutput));

        let analog_input = ctx.registry.register_count(device_id, RegisterType::AnalogInput) > 0;
        let analog_output = ctx.registry.register_count(device_id, RegisterType::AnalogOutput) > 0;

        if let Some(device) = ctx.registry.device_mut(device_id) {
            if analog_input {
                device.set_reading_cursor(0, RegisterType::AnalogInput);
                device.set_pairing_command(Some(PairingCommand::ProvideRegistersStructure));
            } else if analog_output {
                device.set_reading_cursor(0, RegisterType::AnalogOutput);
                device.set_pairing_command(Some(PairingCommand::ProvideRegistersStructure));
            } else if device.settings_support() {
                device.set_pairing_command(Some(PairingCommand::ProvideSettingsSize));
            } else {
                device.set_pairing_command(Some(PairingCommand::Finished));
            }

            device.reset_communication();
        }
    }

    /// Grows or shrinks one register bank to the reported size. Digital
    /// registers default to booleans, analog ones stay unknown until the
    /// structure pass reports their data type.
    fn configure_registers(
        &self,
        ctx: &mut Ctx,
        device_id: DeviceId,
        size: u16,
        register_type: RegisterType,
    ) {
        let default_data_type = if register_type.is_digital() {
            DataType::Bool
        } else {
            DataType::Unknown
        };

        for address in 0..size {
            match ctx.registry.register_id_at(device_id, register_type, address) {
                Some(register_id) => {
                    if let Some(register) = ctx.registry.register_mut(register_id) {
                        register.set_data_type(default_data_type);
                    }
                }
                None => {
                    ctx.registry
                        .create_register(device_id, address, register_type, default_data_type);
                }
            }
        }

        let current = ctx.registry.register_count(device_id, register_type) as u16;

        for address in size..current {
            if let Some(register_id) = ctx.registry.register_id_at(device_id, register_type, address)
            {
                ctx.registry.delete_register(register_id, ctx.upstream);
            }
        }
    }

    /// Overwrites the data types of one page of analog registers and pages
    /// the cursor forward.
    fn registers_structure_receiver(&mut self, ctx: &mut Ctx, sender: u8, payload: &[u8]) {
        let device_id = match ctx.registry.device_id_by_address(sender) {
            Some(device_id) => device_id,
            None => return,
        };

        if payload.len() < 8 {
            logging::warn!(ctx.log, "packet structure is invalid, length is not as expected";
                           "context" => "pairing",
                           "address" => sender);

            return;
        }

        let register_type = match RegisterType::from_byte(payload[2]) {
            Some(register_type) => register_type,
            None => return,
        };

        let start_address = read_u16_be(payload, 3);
        let length = read_u16_be(payload, 5);

        let register_count = ctx.registry.register_count(device_id, register_type) as u16;

        if register_count == 0 {
            return;
        }

        let mut pointer = 7;

        for index in 0..length {
            if pointer >= payload.len() - 1 {
                break;
            }

            let address = start_address + index;

            match DataType::from_byte(payload[pointer]) {
                Some(data_type) => {
                    if let Some(register_id) =
                        ctx.registry.register_id_at(device_id, register_type, address)
                    {
                        if let Some(register) = ctx.registry.register_mut(register_id) {
                            register.set_data_type(data_type);
                        }
                    }
                }
                None => {
                    logging::error!(ctx.log, "received register data type is not valid";
                                    "context" => "pairing",
                                    "address" => sender);
                }
            }

            pointer += 1;
        }

        let analog_output = ctx.registry.register_count(device_id, RegisterType::AnalogOutput) > 0;

        if let Some(device) = ctx.registry.device_mut(device_id) {
            device.reset_communication();

            if register_count > start_address + length {
                // More pages of this bank
                device.set_reading_cursor(start_address + length, register_type);
            } else if register_type == RegisterType::AnalogInput && analog_output {
                device.set_reading_cursor(0, RegisterType::AnalogOutput);
            } else if device.settings_support() {
                device.set_pairing_command(Some(PairingCommand::ProvideSettingsSize));
            } else {
                device.set_pairing_command(Some(PairingCommand::Finished));
            }
        }
    }

    fn settings_size_receiver(&mut self, ctx: &mut Ctx, sender: u8, payload: &[u8]) {
        let device_id = match ctx.registry.device_id_by_address(sender) {
            Some(device_id) => device_id,
            None => return,
        };

        if payload.len() < 5 {
            logging::warn!(ctx.log, "packet structure is invalid, length is not as expected";
                           "context" => "pairing",
                           "address" => sender);

            return;
        }

        self.configure_settings(ctx, device_id, payload[2] as u16, SettingKind::Device);
        self.configure_settings(ctx, device_id, payload[3] as u16, SettingKind::Register);

        logging::debug!(ctx.log, "configured device settings";
                        "context" => "pairing",
                        "address" => sender,
                        "device" => ctx.registry.setting_count(device_id, SettingKind::Device),
                        "register" => ctx.registry.setting_count(device_id, SettingKind::Register));

        let device_settings = ctx.registry.setting_count(device_id, SettingKind::Device) > 0;
        let register_settings = ctx.registry.setting_count(device_id, SettingKind::Register) > 0;

        if let Some(device) = ctx.registry.device_mut(device_id) {
            if device_settings {
                device.set_setting_cursor(0, SettingKind::Device);
                device.set_pairing_command(Some(PairingCommand::ProvideSettingsStructure));
            } else if register_settings {
                device.set_setting_cursor(0, SettingKind::Register);
                device.set_pairing_command(Some(PairingCommand::ProvideSettingsStructure));
            } else {
                device.set_pairing_command(Some(PairingCommand::Finished));
            }

            device.reset_communication();
        }
    }

    fn configure_settings(&self, ctx: &mut Ctx, device_id: DeviceId, size: u16, kind: SettingKind) {
        for address in 0..size {
            if ctx.registry.setting_id_at(device_id, kind, address).is_none() {
                ctx.registry.create_setting(device_id, address, kind);
            }
        }

        let current = ctx.registry.setting_count(device_id, kind) as u16;

        for address in size..current {
            if let Some(setting_id) = ctx.registry.setting_id_at(device_id, kind, address) {
                ctx.registry.delete_setting(setting_id, ctx.upstream);
            }
        }
    }

    /// Applies one page of settings descriptors. Device descriptors carry a
    /// data type and a name; register descriptors additionally name the
    /// register they configure.
    fn settings_structure_receiver(&mut self, ctx: &mut Ctx, sender: u8, payload: &[u8]) {
        let device_id = match ctx.registry.device_id_by_address(sender) {
            Some(device_id) => device_id,
            None => return,
        };

        if payload.len() < 8 {
            logging::warn!(ctx.log, "packet structure is invalid, length is not as expected";
                           "context" => "pairing",
                           "address" => sender);

            return;
        }

        let kind = match SettingKind::from_byte(payload[2]) {
            Some(kind) => kind,
            None => return,
        };

        let start_address = read_u16_be(payload, 3);
        let length = read_u16_be(payload, 5);

        let settings_count = ctx.registry.setting_count(device_id, kind) as u16;

        if settings_count == 0 {
            return;
        }

        let mut pointer = 7;
        let mut processed: u16 = 0;

        for index in 0..length {
            if pointer >= payload.len() - 1 {
                break;
            }

            let address = start_address + index;

            match kind {
                SettingKind::Device => {
                    self.apply_device_setting_descriptor(ctx, device_id, address, payload, pointer);
                }
                SettingKind::Register => {
                    self.apply_register_setting_descriptor(ctx, device_id, address, payload, pointer);
                }
            }

            processed += 1;

            if processed == length {
                break;
            }

            pointer = match find_space(payload, pointer) {
                Some(space) => space + 1,
                None => break,
            };
        }

        let register_settings = ctx.registry.setting_count(device_id, SettingKind::Register) > 0;

        if let Some(device) = ctx.registry.device_mut(device_id) {
            device.reset_communication();

            if settings_count > start_address + processed {
                device.set_setting_cursor(start_address + processed, kind);
            } else if kind == SettingKind::Device && register_settings {
                device.set_setting_cursor(0, SettingKind::Register);
            } else {
                device.set_pairing_command(Some(PairingCommand::Finished));
            }
        }
    }

    fn apply_device_setting_descriptor(
        &self,
        ctx: &mut Ctx,
        device_id: DeviceId,
        address: u16,
        payload: &[u8],
        pointer: usize,
    ) {
        let setting_id = match ctx.registry.setting_id_at(device_id, SettingKind::Device, address) {
            Some(setting_id) => setting_id,
            None => return,
        };

        match payload.get(pointer).copied().and_then(DataType::from_byte) {
            Some(data_type) => {
                let name = extract_text(payload, pointer + 1);

                if let Some(setting) = ctx.registry.setting_mut(setting_id) {
                    setting.set_data_type(data_type);
                    setting.set_name(name);
                }
            }
            None => {
                logging::warn!(ctx.log, "received device setting with unknown data type";
                               "context" => "pairing");
            }
        }
    }

    fn apply_register_setting_descriptor(
        &self,
        ctx: &mut Ctx,
        device_id: DeviceId,
        address: u16,
        payload: &[u8],
        pointer: usize,
    ) {
        let setting_id = match ctx.registry.setting_id_at(device_id, SettingKind::Register, address)
        {
            Some(setting_id) => setting_id,
            None => return,
        };

        if pointer + 4 >= payload.len() {
            logging::warn!(ctx.log, "register setting descriptor is truncated";
                           "context" => "pairing");

            return;
        }

        let register_type = match RegisterType::from_byte(payload[pointer + 2]) {
            Some(register_type) => register_type,
            None => {
                logging::warn!(ctx.log, "received register setting for unknown register type";
                               "context" => "pairing");

                return;
            }
        };

        let register_address = read_u16_be(payload, pointer);

        let register_exists = ctx
            .registry
            .register_at(device_id, register_type, register_address)
            .is_some();

        if !register_exists {
            logging::warn!(ctx.log, "received register setting for unknown register";
                           "context" => "pairing");

            return;
        }

        match DataType::from_byte(payload[pointer + 3]) {
            Some(data_type) => {
                let name = extract_text(payload, pointer + 4);

                if let Some(setting) = ctx.registry.setting_mut(setting_id) {
                    setting.set_register(register_address, register_type);
                    setting.set_data_type(data_type);
                    setting.set_name(name);
                }
            }
            None => {
                logging::warn!(ctx.log, "received register setting with unknown data type";
                               "context" => "pairing");
            }
        }
    }

    /// The device reported the walk complete: unlatch, leave pairing mode
    /// and announce the discovered structure upstream.
    fn finished_receiver(&mut self, ctx: &mut Ctx, sender: u8, payload: &[u8], now: Instant) {
        let device_id = match ctx.registry.device_id_by_address(sender) {
            Some(device_id) => device_id,
            None => return,
        };

        if payload.len() < 4 {
            logging::warn!(ctx.log, "packet structure is invalid, length is not as expected";
                           "context" => "pairing",
                           "address" => sender);

            return;
        }

        self.subject = None;
        self.disable(ctx.log);

        if let Some(device) = ctx.registry.device_mut(device_id) {
            device.set_state(state_from_byte(payload[2]), now);
            device.set_pairing_command(None);
            device.clear_setting_cursor();
        }

        propagate_device(ctx.registry, ctx.upstream, ctx.connector_id, device_id);
    }
}
