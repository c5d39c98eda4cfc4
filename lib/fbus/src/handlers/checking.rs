use crate::device::{state_from_byte, DeviceState};
use crate::handlers::{propagate_device_state, Ctx};
use crate::types::{Packet, TERMINATOR};
use crate::DeviceId;
use flint::logging;
use std::time::{Duration, Instant};

enum Probe {
    Ping,
    GetState,
}

/// Liveness probing and initial state acquisition. Promotes devices to
/// `Lost` after the retransmit budget runs out and pings them back to life.
pub struct CheckingHandler;

impl CheckingHandler {
    /// Consecutive expected-reply timeouts before a device is declared lost.
    pub const MAX_TRANSMIT_ATTEMPTS: u32 = 5;
    /// Back-off between pings to a lost device.
    pub const PING_DELAY: Duration = Duration::from_secs(15);

    pub fn handle(&self, ctx: &mut Ctx, device_id: DeviceId, now: Instant) {
        let attempts = match ctx.registry.device(device_id) {
            Some(device) => device.attempts(),
            None => return,
        };

        if attempts >= Self::MAX_TRANSMIT_ATTEMPTS {
            if let Some(device) = ctx.registry.device_mut(device_id) {
                if device.lost_since().is_some() {
                    logging::debug!(ctx.log, "device is still lost";
                                    "context" => "checking",
                                    "address" => device.address());
                } else {
                    logging::debug!(ctx.log, "device is lost";
                                    "context" => "checking",
                                    "address" => device.address());
                }

                device.set_state(DeviceState::Lost, now);
            }

            if let Some(device) = ctx.registry.device(device_id) {
                propagate_device_state(ctx.upstream, ctx.connector_id, device);
            }
        }

        let probe = match ctx.registry.device(device_id) {
            Some(device) => {
                let ping_due = |stamp: Option<Instant>| {
                    stamp.map_or(true, |stamp| now.duration_since(stamp) >= Self::PING_DELAY)
                };

                if device.is_lost() && ping_due(device.lost_since()) && ping_due(device.last_send()) {
                    Some(Probe::Ping)
                } else if device.state() == DeviceState::Unknown {
                    Some(Probe::GetState)
                } else {
                    None
                }
            }
            None => return,
        };

        match probe {
            Some(Probe::Ping) => self.send_ping(ctx, device_id, now),
            Some(Probe::GetState) => self.send_get_state(ctx, device_id, now),
            None => (),
        }
    }

    pub fn receive(&self, ctx: &mut Ctx, packet: Packet, sender: u8, payload: &[u8], now: Instant) {
        match packet {
            Packet::Pong => self.pong_receiver(ctx, sender, now),
            Packet::GetState => self.state_receiver(ctx, sender, payload, now),
            // The device answers a state assignment with a separate report;
            // only the packet shape is validated here
            Packet::SetState => {
                if payload.len() != 3 {
                    logging::warn!(ctx.log, "packet structure is invalid, length is not as expected";
                                   "context" => "checking",
                                   "address" => sender);
                }
            }
            Packet::ReportState => self.state_receiver(ctx, sender, payload, now),
            _ => (),
        }
    }

    fn send_ping(&self, ctx: &mut Ctx, device_id: DeviceId, now: Instant) {
        let address = match ctx.registry.device(device_id) {
            Some(device) => device.address(),
            None => return,
        };

        ctx.transport
            .send_packet(address, &[Packet::Ping.into(), TERMINATOR], None);

        if let Some(device) = ctx.registry.device_mut(device_id) {
            device.expect_reply(Packet::Pong);
            device.stamp_send(now);
            device.increment_attempts();
        }
    }

    fn send_get_state(&self, ctx: &mut Ctx, device_id: DeviceId, now: Instant) {
        let address = match ctx.registry.device_mut(device_id) {
            Some(device) => {
                device.increment_attempts();
                device.expect_reply(Packet::GetState);
                device.stamp_send(now);

                device.address()
            }
            None => return,
        };

        let delivered = ctx.transport.send_packet(
            address,
            &[Packet::GetState.into(), TERMINATOR],
            Some(Duration::from_secs(1)),
        );

        if !delivered {
            if let Some(device) = ctx.registry.device_mut(device_id) {
                device.reset_communication();
            }
        }
    }

    fn pong_receiver(&self, ctx: &mut Ctx, sender: u8, now: Instant) {
        let device_id = match ctx.registry.device_id_by_address(sender) {
            Some(device_id) => device_id,
            None => return,
        };

        if let Some(device) = ctx.registry.device_mut(device_id) {
            device.mark_alive(now);
        }

        if let Some(device) = ctx.registry.device(device_id) {
            propagate_device_state(ctx.upstream, ctx.connector_id, device);
        }
    }

    fn state_receiver(&self, ctx: &mut Ctx, sender: u8, payload: &[u8], now: Instant) {
        let device_id = match ctx.registry.device_id_by_address(sender) {
            Some(device_id) => device_id,
            None => return,
        };

        if payload.len() != 3 {
            logging::warn!(ctx.log, "packet structure is invalid, length is not as expected";
                           "context" => "checking",
                           "address" => sender);

            return;
        }

        if let Some(device) = ctx.registry.device_mut(device_id) {
            device.set_state(state_from_byte(payload[1]), now);
        }

        if let Some(device) = ctx.registry.device(device_id) {
            propagate_device_state(ctx.upstream, ctx.connector_id, device);
        }
    }
}
