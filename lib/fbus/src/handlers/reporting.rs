use crate::codec::{decode_value, read_u16_be, DIGITAL_TRUE};
use crate::handlers::Ctx;
use crate::types::{Packet, RegisterType};
use flint::logging;
use flint::value::Value;
use std::time::Instant;

/// Handles unsolicited single-register reports pushed by devices outside the
/// polling cadence. Reports never touch the expected-reply latch.
pub struct ReportingHandler;

impl ReportingHandler {
    pub fn receive(&self, ctx: &mut Ctx, packet: Packet, sender: u8, payload: &[u8], _now: Instant) {
        if packet != Packet::ReportSingleRegister {
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
                               "context" => "reporting",
                               "address" => sender);

                return;
            }
        };

        if payload.len() < 4 {
            logging::warn!(ctx.log, "packet structure is invalid, length is not as expected";
                           "context" => "reporting",
                           "address" => sender);

            return;
        }

        let register_address = read_u16_be(payload, 2);

        match register_type {
            RegisterType::DigitalInput => {
                if payload.len() < 6 {
                    logging::warn!(ctx.log, "packet structure is invalid, length is not as expected";
                                   "context" => "reporting",
                                   "address" => sender);

                    return;
                }

                if let Some(register_id) =
                    ctx.registry.register_id_at(device_id, register_type, register_address)
                {
                    let value = read_u16_be(payload, 4) == DIGITAL_TRUE;

                    ctx.registry
                        .update_register_value(register_id, Value::Bool(value), ctx.upstream);
                }
            }
            RegisterType::AnalogInput => {
                if payload.len() < 8 {
                    logging::warn!(ctx.log, "packet structure is invalid, length is not as expected";
                                   "context" => "reporting",
                                   "address" => sender);

                    return;
                }

                if let Some(register) =
                    ctx.registry.register_at(device_id, register_type, register_address)
                {
                    let register_id = register.id();

                    if let Some(value) = decode_value(register.data_type(), &payload[4..8]) {
                        ctx.registry.update_register_value(register_id, value, ctx.upstream);
                    }
                }
            }
            _ => {
                logging::debug!(ctx.log, "report for an output register ignored";
                                "context" => "reporting",
                                "address" => sender);
            }
        }
    }
}
