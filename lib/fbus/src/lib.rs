#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

//! Protocol engine for the FB-Bus half duplex serial bus. The connector owns
//! a device registry and a serial transport and multiplexes the single bus
//! across device pairing, liveness checking, periodic register reads and
//! commanded writes from the gateway.

pub use flint::ident::Id;

pub type ConnectorId = Id;
pub type DeviceId = Id;
pub type RegisterId = Id;
pub type SettingId = Id;
pub type PropertyId = Id;
pub type ChannelId = Id;

pub mod codec;
pub mod connector;
pub mod device;
pub mod handlers;
pub mod pairing;
pub mod records;
pub mod register;
pub mod registry;
pub mod transport;
pub mod types;
pub mod upstream;
