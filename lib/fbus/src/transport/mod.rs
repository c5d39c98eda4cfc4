pub mod link;

use crate::types::{Packet, BROADCAST_ADDRESS};
use flint::logging;
use link::{Link, LinkError, LinkEvent};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// An application payload received off the bus.
#[derive(Debug, Eq, PartialEq)]
pub struct Incoming {
    pub sender: u8,
    pub payload: Vec<u8>,
}

/// Half duplex bus transport. Owns the serial link, queues outgoing frames,
/// counts opportunistic acknowledges and surfaces inbound frames for the
/// connector loop to drain.
pub struct Transport {
    link: Link,
    queue: VecDeque<(u8, Vec<u8>)>,
    inbound: Vec<Incoming>,
    acks: usize,
    log: logging::Logger,
}

impl Transport {
    pub fn new(link: Link, log: &logging::Logger) -> Transport {
        Transport {
            link,
            queue: VecDeque::new(),
            inbound: Vec::new(),
            acks: 0,
            log: log.new(logging::o!()),
        }
    }

    /// Queues a payload for the given address. With a wait window the call
    /// busy-polls the link until an acknowledge arrives or the window lapses;
    /// without one, handing the frame off counts as success. The protocol
    /// above maintains its own retransmit budget either way.
    pub fn send_packet(&mut self, address: u8, payload: &[u8], wait: Option<Duration>) -> bool {
        self.queue.push_back((address, payload.to_vec()));

        if let Some(name) = payload.first().and_then(|&byte| Packet::from_byte(byte)) {
            if address == BROADCAST_ADDRESS {
                logging::debug!(self.log, "broadcasting packet";
                                "context" => "transport",
                                "packet" => name.name());
            } else {
                logging::debug!(self.log, "sending packet";
                                "context" => "transport",
                                "packet" => name.name(),
                                "address" => address);
            }
        }

        match wait {
            Some(window) if window > Duration::from_secs(0) => {
                let started = Instant::now();

                while started.elapsed() <= window {
                    self.step();

                    if self.acks > 0 {
                        self.acks -= 1;

                        return true;
                    }
                }

                false
            }
            _ => true,
        }
    }

    /// `send_packet` to the reserved broadcast address.
    pub fn broadcast_packet(&mut self, payload: &[u8], wait: Option<Duration>) -> bool {
        self.send_packet(BROADCAST_ADDRESS, payload, wait)
    }

    /// One cooperative pass: dispatch at most one queued frame, then drain
    /// the wire. Returns the number of frames still queued so the scheduler
    /// can pause regular traffic until the queue is empty.
    pub fn run_once(&mut self) -> usize {
        self.step();

        self.queue.len()
    }

    /// Number of frames waiting for transmission.
    #[inline]
    pub fn pending_tx(&self) -> usize {
        self.queue.len()
    }

    /// Drains the frames received since the last call.
    #[inline]
    pub fn incoming(&mut self) -> impl Iterator<Item = Incoming> + '_ {
        self.inbound.drain(..)
    }

    fn step(&mut self) {
        if let Some((recipient, payload)) = self.queue.pop_front() {
            match self.link.write_frame(recipient, &payload) {
                Ok(()) => (),
                // Transient link errors; the per-device attempt budget
                // handles the retransmit
                Err(LinkError::FrameTooLong) => {
                    logging::warn!(self.log, "frame dropped, content too long";
                                   "context" => "transport",
                                   "address" => recipient,
                                   "length" => payload.len());
                }
                Err(LinkError::Io(kind)) => {
                    logging::warn!(self.log, "frame transmission failed";
                                   "context" => "transport",
                                   "address" => recipient,
                                   "error" => ?kind);
                }
            }
        }

        let mut events = Vec::new();

        if let Err(err) = self.link.poll(&mut events) {
            logging::warn!(self.log, "connection with the bus was lost";
                           "context" => "transport",
                           "error" => ?err);
        }

        for event in events {
            match event {
                LinkEvent::Ack => self.acks += 1,
                LinkEvent::Frame { sender, payload } => {
                    self.inbound.push(Incoming { sender, payload })
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::link::crc8;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Shared {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
    }

    /// In-memory wire the tests script: bytes injected through the handle
    /// appear on the read side, everything written is captured for
    /// inspection. Cloning shares the same buffers.
    #[derive(Clone)]
    pub struct ScriptedWire {
        shared: Arc<Mutex<Shared>>,
    }

    impl ScriptedWire {
        pub fn new() -> (ScriptedWire, ScriptedWire) {
            let wire = ScriptedWire {
                shared: Arc::new(Mutex::new(Shared::default())),
            };

            (wire.clone(), wire)
        }

        /// Raw bytes of a well-formed link frame.
        pub fn frame(recipient: u8, sender: u8, payload: &[u8]) -> Vec<u8> {
            let mut raw = vec![0x95, recipient, sender, payload.len() as u8];
            raw.extend_from_slice(payload);
            raw.push(crc8(&raw[1..]));
            raw.push(0xEA);

            raw
        }

        pub fn inject(&self, bytes: &[u8]) {
            self.shared.lock().unwrap().rx.extend(bytes.iter().copied());
        }

        pub fn inject_frame(&self, recipient: u8, sender: u8, payload: &[u8]) {
            self.inject(&Self::frame(recipient, sender, payload));
        }

        pub fn inject_ack(&self) {
            self.inject(&[0x06]);
        }

        /// Drains and returns everything written to the wire so far.
        pub fn sent(&self) -> Vec<u8> {
            std::mem::replace(&mut self.shared.lock().unwrap().tx, Vec::new())
        }
    }

    impl io::Read for ScriptedWire {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut shared = self.shared.lock().unwrap();

            if shared.rx.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }

            let mut count = 0;
            while count < buf.len() {
                match shared.rx.pop_front() {
                    Some(byte) => {
                        buf[count] = byte;
                        count += 1;
                    }
                    None => break,
                }
            }

            Ok(count)
        }
    }

    impl io::Write for ScriptedWire {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.shared.lock().unwrap().tx.extend_from_slice(buf);

            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedWire;
    use super::*;
    use crate::types::MASTER_ADDRESS;
    use std::time::Duration;

    fn transport() -> (Transport, ScriptedWire) {
        let (wire, handle) = ScriptedWire::new();
        let log = flint::logging::discard();
        let link = Link::new(Box::new(wire), MASTER_ADDRESS, &log);

        (Transport::new(link, &log), handle)
    }

    #[test]
    fn test_send_without_wait_is_fire_and_forget() {
        let (mut transport, handle) = transport();

        assert!(transport.send_packet(7, &[0x13, 0x00], None));
        assert_eq!(transport.pending_tx(), 1);

        assert_eq!(transport.run_once(), 0);
        assert!(!handle.sent().is_empty());
    }

    #[test]
    fn test_send_with_wait_consumes_ack() {
        let (mut transport, handle) = transport();

        handle.inject_ack();

        assert!(transport.send_packet(7, &[0x13, 0x00], Some(Duration::from_millis(100))));
        // The frame was flushed while polling for the acknowledge
        assert_eq!(transport.pending_tx(), 0);
    }

    #[test]
    fn test_send_with_wait_times_out() {
        let (mut transport, _handle) = transport();

        assert!(!transport.send_packet(7, &[0x13, 0x00], Some(Duration::from_millis(10))));
    }

    #[test]
    fn test_incoming_frames_are_drained() {
        let (mut transport, handle) = transport();

        handle.inject_frame(MASTER_ADDRESS, 9, &[0x15, 0x00]);
        transport.run_once();

        let frames: Vec<Incoming> = transport.incoming().collect();
        assert_eq!(
            frames,
            vec![Incoming {
                sender: 9,
                payload: vec![0x15, 0x00],
            }]
        );

        // A second drain yields nothing
        assert_eq!(transport.incoming().count(), 0);
    }

    #[test]
    fn test_run_once_reports_queue_depth() {
        let (mut transport, _handle) = transport();

        transport.send_packet(7, &[0x13, 0x00], None);
        transport.send_packet(8, &[0x13, 0x00], None);
        transport.send_packet(9, &[0x13, 0x00], None);

        // One frame leaves the queue per pass
        assert_eq!(transport.run_once(), 2);
        assert_eq!(transport.run_once(), 1);
        assert_eq!(transport.run_once(), 0);
    }
}
