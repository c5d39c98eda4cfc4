use crossbeam_channel::{bounded, Receiver, Sender};
use fbus::connector::Connector;
use fbus::PropertyId;
use flint::logging;
use flint::value::Command;
use std::thread;
use std::time::{Duration, Instant};

/// Control messages other gateway threads send into a connector loop. The
/// loop owns its registry and transport exclusively; nothing else touches
/// them.
#[derive(Debug)]
pub enum ControlMessage {
    Publish {
        property_id: PropertyId,
        command: Command,
    },
    EnableSearching,
    DisableSearching,
    Stop,
}

/// Handle to one running connector loop. Owns the command channel and the
/// worker thread; dropping the handle without `close` leaves the loop
/// running detached.
pub struct Service {
    commands: Sender<ControlMessage>,
    done: Receiver<()>,
    handle: Option<thread::JoinHandle<()>>,
    log: logging::Logger,
}

impl Service {
    /// Longest the gateway waits for a connector loop to exit on close.
    pub const SHUTDOWN_WAITING_DELAY: Duration = Duration::from_secs(3);
    /// Yield between scheduler passes so the loop does not spin hot.
    pub const TICK_YIELD: Duration = Duration::from_millis(1);
    /// Command queue depth; commands are rare, the bound is generous.
    pub const COMMAND_QUEUE_CAPACITY: usize = 64;

    /// Spawns the connector loop on its own worker thread.
    pub fn open(mut connector: Connector, log: &logging::Logger) -> Service {
        let (commands, command_receiver) = bounded(Self::COMMAND_QUEUE_CAPACITY);
        let (done_sender, done) = bounded(1);
        let service_log = log.new(logging::o!());

        let handle = thread::Builder::new()
            .name("fb-bus connector".to_string())
            .spawn(move || {
                loop {
                    let mut stop = false;

                    while let Ok(message) = command_receiver.try_recv() {
                        match message {
                            ControlMessage::Publish {
                                property_id,
                                command,
                            } => connector.publish(property_id, command, Instant::now()),
                            ControlMessage::EnableSearching => connector.enable_searching(),
                            ControlMessage::DisableSearching => connector.disable_searching(),
                            ControlMessage::Stop => {
                                stop = true;

                                break;
                            }
                        }
                    }

                    if stop {
                        connector.close(Instant::now());

                        break;
                    }

                    connector.tick(Instant::now());

                    thread::sleep(Self::TICK_YIELD);
                }

                drop(done_sender.send(()));
            })
            .expect("Connector thread spawn failed");

        Service {
            commands,
            done,
            handle: Some(handle),
            log: service_log,
        }
    }

    /// Routes a set-point command to the connector loop.
    pub fn publish(&self, property_id: PropertyId, command: Command) {
        self.send(ControlMessage::Publish {
            property_id,
            command,
        });
    }

    pub fn enable_searching(&self) {
        self.send(ControlMessage::EnableSearching);
    }

    pub fn disable_searching(&self) {
        self.send(ControlMessage::DisableSearching);
    }

    fn send(&self, message: ControlMessage) {
        if self.commands.send(message).is_err() {
            logging::warn!(self.log, "connector loop is gone, command dropped";
                           "context" => "service");
        }
    }

    /// Signals the loop to stop and waits for it to wind down. A loop that
    /// does not exit within the shutdown window is left detached.
    pub fn close(mut self) {
        if self.commands.send(ControlMessage::Stop).is_err() {
            logging::warn!(self.log, "connector loop already stopped";
                           "context" => "service");
        }

        match self.done.recv_timeout(Self::SHUTDOWN_WAITING_DELAY) {
            Ok(()) => {
                if let Some(handle) = self.handle.take() {
                    drop(handle.join());
                }
            }
            Err(_) => {
                logging::warn!(self.log, "connector loop did not stop within the shutdown window";
                               "context" => "service");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbus::device::DeviceState;
    use fbus::records::DeviceRecord;
    use fbus::transport::link::Link;
    use fbus::transport::Transport;
    use fbus::types::MASTER_ADDRESS;
    use fbus::upstream::{Upstream, UpstreamEvent};
    use fbus::Id;
    use crossbeam_channel::Receiver as EventReceiver;
    use serde_json::json;
    use std::io;

    /// A wire with nobody on the other end.
    struct IdleWire;

    impl io::Read for IdleWire {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
        }
    }

    impl io::Write for IdleWire {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn connector_with_device() -> (Connector, EventReceiver<UpstreamEvent>) {
        let log = flint::logging::discard();
        let link = Link::new(Box::new(IdleWire), MASTER_ADDRESS, &log);
        let transport = Transport::new(link, &log);
        let (upstream, events) = Upstream::channel(&log);

        let mut connector = Connector::new(Id::generate(), transport, upstream, &log);

        connector.load(&[DeviceRecord {
            device_id: Id::generate(),
            identifier: "AABBCC".to_string(),
            params: json!({ "address": 5, "max_packet_length": 50 }),
            channels: vec![],
        }]);

        (connector, events)
    }

    #[test]
    fn test_open_close_lifecycle() {
        let (connector, events) = connector_with_device();

        let service = Service::open(connector, &flint::logging::discard());

        // Give the loop a moment to run a few ticks
        thread::sleep(Duration::from_millis(20));

        service.close();

        // Shutdown marked the device disconnected and propagated the state
        let disconnected = events.try_iter().any(|event| match event {
            UpstreamEvent::DeviceUpserted { state, .. } => state == DeviceState::Disconnected,
            _ => false,
        });
        assert!(disconnected);
    }

    #[test]
    fn test_commands_reach_the_loop() {
        let (connector, _events) = connector_with_device();

        let service = Service::open(connector, &flint::logging::discard());

        // Unknown property publishes and searching toggles must not wedge
        // the loop
        service.publish(Id::generate(), Command::Toggle);
        service.enable_searching();
        service.disable_searching();

        thread::sleep(Duration::from_millis(20));

        service.close();
    }
}
