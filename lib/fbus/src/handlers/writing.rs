use crate::codec::{decode_value, encode_value, push_u16_be, read_u16_be, DIGITAL_TRUE};
use crate::handlers::Ctx;
use crate::types::{Packet, RegisterType, TERMINATOR};
use crate::RegisterId;
use flint::logging;
use flint::value::{Command, Value};
use std::time::{Duration, Instant};

/// Turns upstream set-point commands into single-register writes.
pub struct WritingHandler;

impl WritingHandler {
    /// Acknowledge window granted to a write before the loop moves on.
    pub const RESPONSE_DELAY: Duration = Duration::from_millis(100);

    pub fn write(&self, ctx: &mut Ctx, register_id: RegisterId, command: Command, now: Instant) {
        let (device_id, register_type, register_address, data_type, current) =
            match ctx.registry.register(register_id) {
                Some(register) => (
                    register.device_id(),
                    register.register_type(),
                    register.address(),
                    register.data_type(),
                    register.value(),
                ),
                None => return,
            };

        let address = match ctx.registry.device(device_id) {
            // Writes only reach devices that are up and running
            Some(device) if device.is_ready() => device.address(),
            _ => return,
        };

        let value = match command {
            Command::Set(value) => value,
            Command::Toggle => {
                if register_type != RegisterType::DigitalOutput {
                    logging::warn!(ctx.log, "toggle is only defined for digital outputs";
                                   "context" => "writing",
                                   "register" => %register_id);

                    return;
                }

                let current = current.and_then(Value::as_bool).unwrap_or(false);

                Value::Bool(!current)
            }
        };

        let mut frame = vec![Packet::WriteSingleRegister.into(), register_type.into()];
        push_u16_be(&mut frame, register_address);

        match register_type {
            RegisterType::DigitalOutput => {
                let flag = match value.as_bool() {
                    Some(flag) => flag,
                    None => {
                        logging::warn!(ctx.log, "digital output expects a boolean value";
                                       "context" => "writing",
                                       "register" => %register_id);

                        return;
                    }
                };

                push_u16_be(&mut frame, if flag { DIGITAL_TRUE } else { 0x0000 });
            }
            RegisterType::AnalogOutput => match encode_value(data_type, value) {
                Some(block) => frame.extend_from_slice(&block),
                None => {
                    logging::warn!(ctx.log, "value could not be encoded for the register data type";
                                   "context" => "writing",
                                   "register" => %register_id);

                    return;
                }
            },
            // Inputs never accept writes
            _ => {
                logging::warn!(ctx.log, "write to a read-only register dropped";
                               "context" => "writing",
                               "register" => %register_id);

                return;
            }
        }

        frame.push(TERMINATOR);

        if let Some(device) = ctx.registry.device_mut(device_id) {
            device.increment_attempts();
            device.expect_reply(Packet::WriteSingleRegister);
            device.stamp_send(now);
        }

        let delivered = ctx
            .transport
            .send_packet(address, &frame, Some(Self::RESPONSE_DELAY));

        if !delivered {
            // Clear the latch so the next pass may retry
            if let Some(device) = ctx.registry.device_mut(device_id) {
                device.reset_communication();
            }
        }
    }

    pub fn receive(&self, ctx: &mut Ctx, packet: Packet, sender: u8, payload: &[u8], _now: Instant) {
        if packet != Packet::WriteSingleRegister {
            return;
        }

        let device_id = match ctx.registry.device_id_by_address(sender) {
            Some(device_id) => device_id,
            None => return,
        };

        let register_type = match payload.get(1).copied().and_then(RegisterType::from_byte) {
            Some(register_type) => register_type,
            None => {
                logging::warn!(ctx.log, "received register type is not valid";
                               "context" => "writing",
                               "address" => sender);

                return;
            }
        };

        if payload.len() >= 4 {
            let register_address = read_u16_be(payload, 2);

            match register_type {
                RegisterType::DigitalOutput if payload.len() >= 6 => {
                    if let Some(register_id) =
                        ctx.registry.register_id_at(device_id, register_type, register_address)
                    {
                        let value = read_u16_be(payload, 4) == DIGITAL_TRUE;

                        ctx.registry
                            .update_register_value(register_id, Value::Bool(value), ctx.upstream);
                    }
                }
                RegisterType::AnalogOutput if payload.len() >= 8 => {
                    if let Some(register) =
                        ctx.registry.register_at(device_id, register_type, register_address)
                    {
                        let register_id = register.id();

                        if let Some(value) = decode_value(register.data_type(), &payload[4..8]) {
                            ctx.registry.update_register_value(register_id, value, ctx.upstream);
                        }
                    }
                }
                _ => (),
            }
        }

        if let Some(device) = ctx.registry.device_mut(device_id) {
            device.reset_communication();
        }
    }
}
