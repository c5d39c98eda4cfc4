use crate::types::BROADCAST_ADDRESS;
use flint::logging;
use std::io;

/// Largest application payload one link frame can carry.
pub const MAX_PAYLOAD: usize = 50;

const START_OF_FRAME: u8 = 0x95;
const END_OF_FRAME: u8 = 0xEA;
const ACK_BYTE: u8 = 0x06;

/// Byte stream the link runs on. Satisfied by a configured serial port and
/// by the in-memory wires the tests script.
pub trait Wire: io::Read + io::Write + Send {}

impl<T: io::Read + io::Write + Send + ?Sized> Wire for T {}

/// Adapts an opened serial port into a boxed `Wire`.
pub fn serial_wire(port: Box<dyn serialport::SerialPort>) -> Box<dyn Wire> {
    struct SerialWire(Box<dyn serialport::SerialPort>);

    impl io::Read for SerialWire {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl io::Write for SerialWire {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.0.flush()
        }
    }

    Box::new(SerialWire(port))
}

#[derive(Debug, Eq, PartialEq)]
pub enum LinkError {
    /// The payload does not fit a single link frame.
    FrameTooLong,
    Io(io::ErrorKind),
}

impl From<io::Error> for LinkError {
    fn from(io_error: io::Error) -> Self {
        LinkError::Io(io_error.kind())
    }
}

pub type LinkResult<T> = Result<T, LinkError>;

/// Inbound activity surfaced by one poll pass.
#[derive(Debug, Eq, PartialEq)]
pub enum LinkEvent {
    /// A complete frame addressed to this node (or broadcast).
    Frame { sender: u8, payload: Vec<u8> },
    /// A bare acknowledge byte from the last unicast recipient.
    Ack,
}

/// CRC-8 over the addressed part of a frame, polynomial 0x97.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;

    for &byte in data {
        crc ^= byte;

        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x97 } else { crc << 1 };
        }
    }

    crc
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ParserState {
    Idle,
    Recipient,
    Sender,
    Length,
    Payload,
    Crc,
    Eof,
}

/// Resynchronising frame parser. Garbage before the start byte is dropped;
/// CRC or terminator mismatch discards the frame and hunts for the next
/// start byte.
struct Parser {
    state: ParserState,
    recipient: u8,
    sender: u8,
    length: usize,
    payload: Vec<u8>,
    crc: u8,
}

enum Parsed {
    Nothing,
    Ack,
    Frame { recipient: u8, sender: u8, payload: Vec<u8> },
    Discarded(&'static str),
}

impl Parser {
    fn new() -> Parser {
        Parser {
            state: ParserState::Idle,
            recipient: 0,
            sender: 0,
            length: 0,
            payload: Vec::new(),
            crc: 0,
        }
    }

    fn reset(&mut self) {
        self.state = ParserState::Idle;
        self.payload.clear();
    }

    fn push(&mut self, byte: u8) -> Parsed {
        match self.state {
            ParserState::Idle => match byte {
                START_OF_FRAME => {
                    self.payload.clear();
                    self.state = ParserState::Recipient;
                }
                ACK_BYTE => return Parsed::Ack,
                _ => (),
            },
            ParserState::Recipient => {
                self.recipient = byte;
                self.state = ParserState::Sender;
            }
            ParserState::Sender => {
                self.sender = byte;
                self.state = ParserState::Length;
            }
            ParserState::Length => {
                self.length = byte as usize;

                if self.length > MAX_PAYLOAD {
                    self.reset();
                    return Parsed::Discarded("length out of range");
                }

                self.state = if self.length == 0 {
                    ParserState::Crc
                } else {
                    ParserState::Payload
                };
            }
            ParserState::Payload => {
                self.payload.push(byte);

                if self.payload.len() == self.length {
                    self.state = ParserState::Crc;
                }
            }
            ParserState::Crc => {
                self.crc = byte;
                self.state = ParserState::Eof;
            }
            ParserState::Eof => {
                let expected = self.checksum();
                let crc = self.crc;

                self.state = ParserState::Idle;

                if byte != END_OF_FRAME {
                    self.reset();
                    return Parsed::Discarded("missing end of frame");
                }

                if crc != expected {
                    self.reset();
                    return Parsed::Discarded("crc mismatch");
                }

                return Parsed::Frame {
                    recipient: self.recipient,
                    sender: self.sender,
                    payload: std::mem::replace(&mut self.payload, Vec::new()),
                };
            }
        }

        Parsed::Nothing
    }

    fn checksum(&self) -> u8 {
        let mut header = vec![self.recipient, self.sender, self.length as u8];
        header.extend_from_slice(&self.payload);

        crc8(&header)
    }
}

/// Half duplex serial link. Owns the byte stream exclusively; everything the
/// bus sees goes through `write_frame` and `poll`.
pub struct Link {
    wire: Box<dyn Wire>,
    local_address: u8,
    parser: Parser,
    log: logging::Logger,
}

impl Link {
    pub fn new(wire: Box<dyn Wire>, local_address: u8, log: &logging::Logger) -> Link {
        Link {
            wire,
            local_address,
            parser: Parser::new(),
            log: log.new(logging::o!()),
        }
    }

    #[inline]
    pub fn local_address(&self) -> u8 {
        self.local_address
    }

    /// Frames and transmits one payload to the recipient address.
    pub fn write_frame(&mut self, recipient: u8, payload: &[u8]) -> LinkResult<()> {
        if payload.len() > MAX_PAYLOAD {
            return Err(LinkError::FrameTooLong);
        }

        let mut frame = Vec::with_capacity(payload.len() + 6);
        frame.push(START_OF_FRAME);
        frame.push(recipient);
        frame.push(self.local_address);
        frame.push(payload.len() as u8);
        frame.extend_from_slice(payload);
        frame.push(crc8(&frame[1..]));
        frame.push(END_OF_FRAME);

        self.wire.write_all(&frame)?;
        self.wire.flush()?;

        Ok(())
    }

    /// Drains the wire, appending complete frames and acknowledge bytes to
    /// `events`. Unicast frames addressed to this node are acknowledged on
    /// the spot; traffic between other nodes is skipped.
    pub fn poll(&mut self, events: &mut Vec<LinkEvent>) -> LinkResult<()> {
        let mut chunk = [0u8; 256];

        loop {
            let count = match self.wire.read(&mut chunk) {
                Ok(0) => break,
                Ok(count) => count,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref err) if err.kind() == io::ErrorKind::TimedOut => break,
                Err(err) => return Err(err.into()),
            };

            for &byte in chunk[..count].iter() {
                match self.parser.push(byte) {
                    Parsed::Nothing => (),
                    Parsed::Ack => events.push(LinkEvent::Ack),
                    Parsed::Discarded(reason) => {
                        logging::warn!(self.log, "inbound frame discarded";
                                       "context" => "link",
                                       "reason" => reason);
                    }
                    Parsed::Frame {
                        recipient,
                        sender,
                        payload,
                    } => {
                        if recipient == self.local_address {
                            // Opportunistic acknowledge; failure to deliver it
                            // is the sender's retransmit problem
                            if self.wire.write_all(&[ACK_BYTE]).is_err() {
                                logging::warn!(self.log, "failed to acknowledge frame";
                                               "context" => "link",
                                               "sender" => sender);
                            }

                            events.push(LinkEvent::Frame { sender, payload });
                        } else if recipient == BROADCAST_ADDRESS {
                            events.push(LinkEvent::Frame { sender, payload });
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::ScriptedWire;
    use crate::types::MASTER_ADDRESS;

    fn link() -> (Link, ScriptedWire) {
        let (wire, handle) = ScriptedWire::new();

        (
            Link::new(Box::new(wire), MASTER_ADDRESS, &flint::logging::discard()),
            handle,
        )
    }

    #[test]
    fn test_write_frame_layout() {
        let (mut link, handle) = link();

        link.write_frame(7, &[0x13, 0x00]).unwrap();

        let sent = handle.sent();
        assert_eq!(sent[0], START_OF_FRAME);
        assert_eq!(sent[1], 7);
        assert_eq!(sent[2], MASTER_ADDRESS);
        assert_eq!(sent[3], 2);
        assert_eq!(&sent[4..6], &[0x13, 0x00]);
        assert_eq!(sent[6], crc8(&sent[1..6]));
        assert_eq!(sent[7], END_OF_FRAME);
    }

    #[test]
    fn test_write_frame_too_long() {
        let (mut link, _handle) = link();

        let oversized = vec![0u8; MAX_PAYLOAD + 1];
        assert_eq!(link.write_frame(7, &oversized), Err(LinkError::FrameTooLong));
    }

    #[test]
    fn test_roundtrip_unicast_frame() {
        let (mut link, handle) = link();

        handle.inject_frame(MASTER_ADDRESS, 9, &[0x15, 0x00]);

        let mut events = Vec::new();
        link.poll(&mut events).unwrap();

        assert_eq!(
            events,
            vec![LinkEvent::Frame {
                sender: 9,
                payload: vec![0x15, 0x00],
            }]
        );

        // The unicast frame was acknowledged
        assert_eq!(handle.sent(), vec![ACK_BYTE]);
    }

    #[test]
    fn test_frame_for_other_node_skipped() {
        let (mut link, handle) = link();

        handle.inject_frame(12, 9, &[0x15, 0x00]);

        let mut events = Vec::new();
        link.poll(&mut events).unwrap();

        assert!(events.is_empty());
        assert!(handle.sent().is_empty());
    }

    #[test]
    fn test_broadcast_frame_not_acknowledged() {
        let (mut link, handle) = link();

        handle.inject_frame(BROADCAST_ADDRESS, 255, &[0x01, 0x51, 0x00]);

        let mut events = Vec::new();
        link.poll(&mut events).unwrap();

        assert_eq!(
            events,
            vec![LinkEvent::Frame {
                sender: 255,
                payload: vec![0x01, 0x51, 0x00],
            }]
        );
        assert!(handle.sent().is_empty());
    }

    #[test]
    fn test_crc_corruption_drops_frame() {
        let (mut link, handle) = link();

        let mut raw = ScriptedWire::frame(MASTER_ADDRESS, 9, &[0x15, 0x00]);
        let crc_index = raw.len() - 2;
        raw[crc_index] ^= 0xFF;
        handle.inject(&raw);

        let mut events = Vec::new();
        link.poll(&mut events).unwrap();

        assert!(events.is_empty());
    }

    #[test]
    fn test_parser_resynchronises_after_garbage() {
        let (mut link, handle) = link();

        handle.inject(&[0x00, 0x42, 0x99]);
        handle.inject_frame(MASTER_ADDRESS, 3, &[0x13, 0x00]);

        let mut events = Vec::new();
        link.poll(&mut events).unwrap();

        assert_eq!(
            events,
            vec![LinkEvent::Frame {
                sender: 3,
                payload: vec![0x13, 0x00],
            }]
        );
    }

    #[test]
    fn test_ack_byte_between_frames() {
        let (mut link, handle) = link();

        handle.inject(&[ACK_BYTE]);
        handle.inject_frame(MASTER_ADDRESS, 3, &[0x13, 0x00]);

        let mut events = Vec::new();
        link.poll(&mut events).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], LinkEvent::Ack);
    }
}
