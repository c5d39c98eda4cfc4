pub mod checking;
pub mod reading;
pub mod reporting;
pub mod writing;

use crate::device::Device;
use crate::register::{Register, Setting};
use crate::registry::Registry;
use crate::transport::Transport;
use crate::types::{RegisterType, SettingKind};
use crate::upstream::{DeviceDescription, Upstream};
use crate::{ConnectorId, DeviceId};
use flint::logging;

/// Everything a handler needs for one scheduler pass: borrowed access to the
/// registry and transport, the upstream event sender and the connector
/// logger. Handlers never reach outside this context.
pub struct Ctx<'a> {
    pub connector_id: ConnectorId,
    pub registry: &'a mut Registry,
    pub transport: &'a mut Transport,
    pub upstream: &'a Upstream,
    pub log: &'a logging::Logger,
}

/// Announces a state-only device update upstream.
pub fn propagate_device_state(upstream: &Upstream, connector_id: ConnectorId, device: &Device) {
    upstream.add_or_edit_device(
        connector_id,
        device.id(),
        device.serial_number().to_string(),
        device.state(),
        None,
    );
}

/// Announces the full device structure upstream: the device with its
/// connector parameters, every register as a channel property and every
/// setting as a configuration.
pub fn propagate_device(
    registry: &Registry,
    upstream: &Upstream,
    connector_id: ConnectorId,
    device_id: DeviceId,
) {
    let device = match registry.device(device_id) {
        Some(device) => device,
        None => return,
    };

    upstream.add_or_edit_device(
        connector_id,
        device.id(),
        device.serial_number().to_string(),
        device.state(),
        Some(DeviceDescription::from_device(device)),
    );

    for &register_type in RegisterType::SCAN_ORDER.iter() {
        for register in registry.registers_of(device_id, register_type) {
            propagate_register(upstream, register);
        }
    }

    for &kind in [SettingKind::Device, SettingKind::Register].iter() {
        for setting in registry.settings_of(device_id, kind) {
            propagate_setting(registry, upstream, setting);
        }
    }
}

/// Announces one register as a channel property.
pub fn propagate_register(upstream: &Upstream, register: &Register) {
    let channel_identifier = format!(
        "{}-{:02}",
        register.register_type().channel_prefix(),
        register.address() + 1
    );

    upstream.add_or_edit_channel_property(
        register.device_id(),
        register.channel_id(),
        channel_identifier,
        register.id(),
        format!("register-{:02}", register.address() + 1),
        register.key().to_string(),
        register.is_writable(),
        true,
        register.data_type().value_kind(),
    );
}

/// Announces one setting as a device or channel configuration.
pub fn propagate_setting(registry: &Registry, upstream: &Upstream, setting: &Setting) {
    let identifier = format!(
        "{}-{}",
        setting.name().unwrap_or("setting"),
        setting.address() + 1
    );

    match setting.kind() {
        SettingKind::Device => {
            upstream.add_or_edit_device_configuration(
                setting.device_id(),
                setting.id(),
                identifier,
                setting.data_type().value_kind(),
            );
        }
        SettingKind::Register => {
            let (address, register_type) = match setting.register() {
                Some(register) => register,
                None => return,
            };

            let register = match registry.register_at(setting.device_id(), register_type, address) {
                Some(register) => register,
                None => return,
            };

            upstream.add_or_edit_channel_configuration(
                setting.device_id(),
                register.channel_id(),
                setting.id(),
                identifier,
                setting.data_type().value_kind(),
            );
        }
    }
}
