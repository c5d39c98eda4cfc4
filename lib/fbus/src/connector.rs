use crate::device::{Device, DeviceState, DEFAULT_MAX_PACKET_LENGTH};
use crate::handlers::checking::CheckingHandler;
use crate::handlers::reading::ReadingHandler;
use crate::handlers::reporting::ReportingHandler;
use crate::handlers::writing::WritingHandler;
use crate::handlers::{propagate_device_state, Ctx};
use crate::pairing::Pairing;
use crate::records::{split_identifier, DeviceRecord};
use crate::register::{Register, Setting};
use crate::registry::Registry;
use crate::transport::{Incoming, Transport};
use crate::types::{DataType, Packet, RegisterType, SettingKind, UNASSIGNED_ADDRESS};
use crate::upstream::Upstream;
use crate::{ConnectorId, PropertyId};
use flint::logging;
use flint::value::{Command, ValueKind};
use indexmap::IndexSet;
use std::time::Instant;

/// Top level protocol engine for one bus. Owns the registry and the
/// transport and multiplexes the single serial channel across pairing,
/// liveness checking, register polling and commanded writes, one cooperative
/// tick at a time.
pub struct Connector {
    id: ConnectorId,
    registry: Registry,
    transport: Transport,
    upstream: Upstream,

    pairing: Pairing,
    checking: CheckingHandler,
    reading: ReadingHandler,
    reporting: ReportingHandler,
    writing: WritingHandler,

    processed: IndexSet<crate::DeviceId>,
    pending_tx: usize,

    log: logging::Logger,
}

impl Connector {
    pub fn new(
        id: ConnectorId,
        transport: Transport,
        upstream: Upstream,
        log: &logging::Logger,
    ) -> Connector {
        Connector {
            id,
            registry: Registry::new(),
            transport,
            upstream,
            pairing: Pairing::new(),
            checking: CheckingHandler,
            reading: ReadingHandler,
            reporting: ReportingHandler,
            writing: WritingHandler,
            processed: IndexSet::new(),
            pending_tx: 0,
            log: log.new(logging::o!()),
        }
    }

    #[inline]
    pub fn id(&self) -> ConnectorId {
        self.id
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Maps persisted device records into the registry. Malformed channel
    /// identifiers are skipped with a warning; the remaining structure still
    /// loads.
    pub fn load(&mut self, records: &[DeviceRecord]) {
        for record in records {
            self.load_device(record);
        }
    }

    fn load_device(&mut self, record: &DeviceRecord) {
        let params = &record.params;

        let address = params
            .get("address")
            .and_then(serde_json::Value::as_u64)
            .map(|value| value as u8)
            .unwrap_or(UNASSIGNED_ADDRESS);
        let max_packet_length = params
            .get("max_packet_length")
            .and_then(serde_json::Value::as_u64)
            .map(|value| value as usize)
            .unwrap_or(DEFAULT_MAX_PACKET_LENGTH);

        let flag = |name: &str| {
            params
                .get(name)
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false)
        };

        let mut device = Device::new(
            record.device_id,
            address,
            record.identifier.clone(),
            max_packet_length,
        );
        device.set_description_support(flag("description_support"));
        device.set_settings_support(flag("settings_support"));
        device.set_pub_sub_support(flag("pub_sub_support"));

        self.registry.insert_device(device);

        for channel in &record.channels {
            for property in &channel.properties {
                let (_, one_based) = match split_identifier(&property.identifier) {
                    Some(parts) => parts,
                    None => {
                        logging::warn!(self.log, "channel property name is not in expected format";
                                       "context" => "loader",
                                       "identifier" => property.identifier.as_str());

                        continue;
                    }
                };

                let register_type = match (property.data_type == ValueKind::Boolean, property.settable)
                {
                    (true, true) => RegisterType::DigitalOutput,
                    (true, false) => RegisterType::DigitalInput,
                    (false, true) => RegisterType::AnalogOutput,
                    (false, false) => RegisterType::AnalogInput,
                };

                self.registry.insert_register(Register::new(
                    property.property_id,
                    property.key.clone(),
                    channel.channel_id,
                    record.device_id,
                    one_based - 1,
                    register_type,
                    DataType::from_value_kind(property.data_type),
                ));
            }

            for configuration in &channel.configurations {
                let (prefix, one_based) = match split_identifier(&configuration.identifier) {
                    Some(parts) => parts,
                    None => {
                        logging::warn!(self.log, "channel setting name is not in expected format";
                                       "context" => "loader",
                                       "identifier" => configuration.identifier.as_str());

                        continue;
                    }
                };

                let mut setting = Setting::new(
                    configuration.configuration_id,
                    record.device_id,
                    one_based - 1,
                    SettingKind::Register,
                );
                setting.set_name(prefix.to_string());
                setting.set_data_type(DataType::from_value_kind(configuration.data_type));
                setting.set_value(configuration.value);

                self.registry.insert_setting(setting);
            }
        }

        logging::debug!(self.log, "device loaded from records";
                        "context" => "loader",
                        "serial_number" => record.identifier.as_str(),
                        "address" => address);
    }

    pub fn enable_searching(&mut self) {
        self.pairing.enable(&self.log);
    }

    pub fn disable_searching(&mut self) {
        self.pairing.disable(&self.log);
    }

    #[inline]
    pub fn searching_enabled(&self) -> bool {
        self.pairing.is_enabled()
    }

    /// Routes an upstream set-point command to the writing handler.
    pub fn publish(&mut self, property_id: PropertyId, command: Command, now: Instant) {
        let Connector {
            id,
            registry,
            transport,
            upstream,
            writing,
            log,
            ..
        } = self;

        let mut ctx = Ctx {
            connector_id: *id,
            registry,
            transport,
            upstream,
            log,
        };

        if ctx.registry.register(property_id).is_none() {
            logging::debug!(ctx.log, "published property is not a known register";
                            "context" => "connector",
                            "property" => %property_id);

            return;
        }

        writing.write(&mut ctx, property_id, command, now);
    }

    /// One pass of the cooperative scheduler: pairing has the bus to itself
    /// while enabled; otherwise the next unvisited device gets its checking
    /// and reading turn once the transmit queue has drained. The transport
    /// advances exactly one step and its inbound frames are dispatched.
    pub fn tick(&mut self, now: Instant) {
        let Connector {
            id,
            registry,
            transport,
            upstream,
            pairing,
            checking,
            reading,
            reporting,
            writing,
            processed,
            pending_tx,
            log,
        } = self;

        let mut ctx = Ctx {
            connector_id: *id,
            registry,
            transport,
            upstream,
            log,
        };

        if pairing.is_enabled() {
            pairing.handle(&mut ctx, now);
        } else if *pending_tx == 0 {
            if processed.len() == ctx.registry.device_count() {
                processed.clear();
            }

            let next = ctx
                .registry
                .device_ids()
                .into_iter()
                .find(|device_id| !processed.contains(device_id));

            if let Some(device_id) = next {
                checking.handle(&mut ctx, device_id, now);
                reading.handle(&mut ctx, device_id, now);

                processed.insert(device_id);
            }
        }

        *pending_tx = ctx.transport.run_once();

        let frames: Vec<Incoming> = ctx.transport.incoming().collect();

        for frame in frames {
            Self::dispatch(
                &mut ctx, pairing, checking, reading, reporting, writing, frame, now,
            );
        }
    }

    /// Routes one inbound frame to the pairing helper and, outside pairing
    /// mode, to every handler.
    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        ctx: &mut Ctx,
        pairing: &mut Pairing,
        checking: &CheckingHandler,
        reading: &ReadingHandler,
        reporting: &ReportingHandler,
        writing: &WritingHandler,
        frame: Incoming,
        now: Instant,
    ) {
        let Incoming { sender, payload } = frame;

        let packet = match payload.first().copied().and_then(Packet::from_byte) {
            Some(packet) => packet,
            None => {
                logging::warn!(ctx.log, "received unknown packet";
                               "context" => "connector",
                               "sender" => sender);

                return;
            }
        };

        if sender != UNASSIGNED_ADDRESS
            && !pairing.is_enabled()
            && ctx.registry.device_by_address(sender).is_none()
        {
            logging::warn!(ctx.log, "received packet for unknown device";
                           "context" => "connector",
                           "sender" => sender);

            return;
        }

        logging::debug!(ctx.log, "received packet";
                        "context" => "connector",
                        "packet" => packet.name(),
                        "sender" => sender);

        pairing.receive(ctx, packet, sender, &payload, now);

        // In pairing mode only pairing traffic is processed
        if !pairing.is_enabled() {
            checking.receive(ctx, packet, sender, &payload, now);
            reading.receive(ctx, packet, sender, &payload, now);
            reporting.receive(ctx, packet, sender, &payload, now);
            writing.receive(ctx, packet, sender, &payload, now);
        }
    }

    /// Marks every device disconnected and propagates the state; called once
    /// when the connector shuts down.
    pub fn close(&mut self, now: Instant) {
        for device_id in self.registry.device_ids() {
            if let Some(device) = self.registry.device_mut(device_id) {
                device.set_state(DeviceState::Disconnected, now);
            }
        }

        for device_id in self.registry.device_ids() {
            if let Some(device) = self.registry.device(device_id) {
                propagate_device_state(&self.upstream, self.id, device);
            }
        }
    }
}
