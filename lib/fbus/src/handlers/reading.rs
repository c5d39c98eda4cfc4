use crate::codec::{decode_value, push_u16_be, read_u16_be};
use crate::handlers::Ctx;
use crate::types::{Packet, RegisterType, TERMINATOR};
use crate::DeviceId;
use flint::logging;
use flint::value::Value;
use std::time::{Duration, Instant};

/// Round-robin multi-register polling at the device's sampling cadence. The
/// reading cursor walks the register types in scan order, one request frame
/// at a time.
pub struct ReadingHandler;

impl ReadingHandler {
    /// Grace period before a new read may overtake an unanswered request.
    pub const READING_DELAY: Duration = Duration::from_millis(500);

    pub fn handle(&self, ctx: &mut Ctx, device_id: DeviceId, now: Instant) {
        let due = match ctx.registry.device(device_id) {
            Some(device) => {
                if !device.is_ready() {
                    return;
                }

                let gate_open = match device.expected_reply() {
                    None => true,
                    Some(_) => device
                        .last_send()
                        .map_or(true, |stamp| now.duration_since(stamp) >= Self::READING_DELAY),
                };

                let sampling_due = device
                    .last_read_cycle()
                    .map_or(true, |stamp| now.duration_since(stamp) >= device.sampling_time());

                gate_open && sampling_due
            }
            None => return,
        };

        if due {
            self.read(ctx, device_id, now);
        }
    }

    pub fn receive(&self, ctx: &mut Ctx, packet: Packet, sender: u8, payload: &[u8], now: Instant) {
        match packet {
            Packet::ReadMultipleRegisters => self.read_multiple_receiver(ctx, sender, payload, now),
            Packet::ReadSingleRegister => (),
            _ => (),
        }
    }

    /// Starts or continues the scan at the cursor: the first populated
    /// register type matching the cursor (or the first populated one at all)
    /// gets the next request.
    fn read(&self, ctx: &mut Ctx, device_id: DeviceId, now: Instant) {
        let cursor = match ctx.registry.device(device_id) {
            Some(device) => device.reading_cursor(),
            None => return,
        };

        for &register_type in RegisterType::SCAN_ORDER.iter() {
            let cursor_matches = match cursor {
                Some((_, cursor_type)) => cursor_type == register_type,
                None => true,
            };

            if cursor_matches && ctx.registry.register_count(device_id, register_type) > 0 {
                let start = cursor.map_or(0, |(address, _)| address);

                self.read_multiple(ctx, device_id, register_type, start, now);

                return;
            }
        }
    }

    fn read_multiple(
        &self,
        ctx: &mut Ctx,
        device_id: DeviceId,
        register_type: RegisterType,
        start_address: u16,
        now: Instant,
    ) {
        let register_size = ctx.registry.register_count(device_id, register_type) as u16;

        let (address, max_packet_length) = match ctx.registry.device(device_id) {
            Some(device) => (device.address(), device.max_packet_length()),
            None => return,
        };

        // Digital registers pack one bit each, analog ones four bytes
        let per_frame = if register_type.is_digital() {
            max_packet_length.saturating_sub(7) * 8
        } else {
            max_packet_length.saturating_sub(7) / 4
        } as u16;

        if per_frame == 0 {
            return;
        }

        let last_readable = start_address + per_frame - 1;

        let read_length = if last_readable + 1 >= register_size {
            register_size.saturating_sub(start_address)
        } else {
            per_frame
        };

        if read_length == 0 {
            return;
        }

        let mut frame = vec![Packet::ReadMultipleRegisters.into(), register_type.into()];
        push_u16_be(&mut frame, start_address);
        push_u16_be(&mut frame, read_length);
        frame.push(TERMINATOR);

        let next_address = start_address + read_length;

        if ctx.transport.send_packet(address, &frame, None) {
            if let Some(device) = ctx.registry.device_mut(device_id) {
                device.expect_reply(Packet::ReadMultipleRegisters);
                device.stamp_send(now);
                device.increment_attempts();
                device.set_reading_cursor(next_address, register_type);
            }

            if next_address + 1 > register_size {
                self.advance_cursor(ctx, device_id, register_type, now);
            }
        } else if let Some(device) = ctx.registry.device_mut(device_id) {
            device.reset_communication();
        }
    }

    /// Rolls the cursor over to the next populated register type; once all
    /// types are exhausted the cycle ends and the sampling clock is stamped.
    fn advance_cursor(
        &self,
        ctx: &mut Ctx,
        device_id: DeviceId,
        current: RegisterType,
        now: Instant,
    ) {
        let position = RegisterType::SCAN_ORDER
            .iter()
            .position(|&register_type| register_type == current)
            .unwrap_or(RegisterType::SCAN_ORDER.len());

        for &register_type in RegisterType::SCAN_ORDER.iter().skip(position + 1) {
            if ctx.registry.register_count(device_id, register_type) > 0 {
                if let Some(device) = ctx.registry.device_mut(device_id) {
                    device.set_reading_cursor(0, register_type);
                }

                return;
            }
        }

        if let Some(device) = ctx.registry.device_mut(device_id) {
            device.finish_read_cycle(now);
        }
    }

    fn read_multiple_receiver(&self, ctx: &mut Ctx, sender: u8, payload: &[u8], _now: Instant) {
        let device_id = match ctx.registry.device_id_by_address(sender) {
            Some(device_id) => device_id,
            None => return,
        };

        if payload.len() < 6 {
            logging::warn!(ctx.log, "packet structure is invalid, length is not as expected";
                           "context" => "reading",
                           "address" => sender);

            return;
        }

        let register_type = match RegisterType::from_byte(payload[1]) {
            Some(register_type) => register_type,
            None => {
                logging::warn!(ctx.log, "received register type is not valid";
                               "context" => "reading",
                               "type" => payload[1]);

                return;
            }
        };

        let start_address = read_u16_be(payload, 2);
        let declared = payload[4] as usize;

        // The declared byte count is informational; the actual payload is
        // authoritative
        if declared != payload.len().saturating_sub(6) {
            logging::debug!(ctx.log, "declared byte count differs from payload";
                            "context" => "reading",
                            "declared" => declared,
                            "actual" => payload.len().saturating_sub(6));
        }

        if register_type.is_digital() {
            self.store_digital(ctx, device_id, register_type, start_address, payload);
        } else {
            self.store_analog(ctx, device_id, register_type, start_address, payload);
        }

        if let Some(device) = ctx.registry.device_mut(device_id) {
            device.reset_communication();
        }
    }

    /// One bit per register, LSB first within each payload byte.
    fn store_digital(
        &self,
        ctx: &mut Ctx,
        device_id: DeviceId,
        register_type: RegisterType,
        start_address: u16,
        payload: &[u8],
    ) {
        let register_count = ctx.registry.register_count(device_id, register_type) as u16;
        let mut register_address = start_address;
        let mut position = 5;

        while position < payload.len() - 1 {
            let byte = payload[position];

            for bit in 0..8 {
                if let Some(register_id) =
                    ctx.registry.register_id_at(device_id, register_type, register_address)
                {
                    let value = byte & (1 << bit) != 0;

                    ctx.registry
                        .update_register_value(register_id, Value::Bool(value), ctx.upstream);
                }

                register_address += 1;

                if register_address >= register_count {
                    break;
                }
            }

            position += 1;
        }
    }

    /// Four little-endian bytes per register, decoded per its data type.
    fn store_analog(
        &self,
        ctx: &mut Ctx,
        device_id: DeviceId,
        register_type: RegisterType,
        start_address: u16,
        payload: &[u8],
    ) {
        let mut register_address = start_address;
        let mut position = 5;

        while position + 3 < payload.len() - 1 {
            if let Some(register) = ctx.registry.register_at(device_id, register_type, register_address)
            {
                let register_id = register.id();

                if let Some(value) = decode_value(register.data_type(), &payload[position..position + 4])
                {
                    ctx.registry.update_register_value(register_id, value, ctx.upstream);
                }
            }

            position += 4;
            register_address += 1;
        }
    }
}
