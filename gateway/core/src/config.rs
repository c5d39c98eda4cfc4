use serde_derive::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

pub const DEFAULT_MASTER_ADDRESS: u8 = 254;
pub const DEFAULT_SERIAL_INTERFACE: &str = "/dev/ttyAMA0";
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Gateway configuration file. Only the connector sub-tree is consumed here;
/// other sections belong to their own subsystems.
#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub connectors: Vec<ConnectorConfig>,
}

/// One connector descriptor: the connector type tag plus its bus parameters.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectorConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: ConnectorParams,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectorParams {
    #[serde(default = "default_address")]
    pub address: u8,
    #[serde(default = "default_serial_interface")]
    pub serial_interface: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_address() -> u8 {
    DEFAULT_MASTER_ADDRESS
}

fn default_serial_interface() -> String {
    DEFAULT_SERIAL_INTERFACE.to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl Default for ConnectorParams {
    fn default() -> ConnectorParams {
        ConnectorParams {
            address: default_address(),
            serial_interface: default_serial_interface(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> GatewayConfig {
        GatewayConfig {
            connectors: vec![ConnectorConfig {
                kind: "fb-bus".to_string(),
                params: ConnectorParams::default(),
            }],
        }
    }
}

impl GatewayConfig {
    /// Loads the YAML configuration file. A missing file falls back to the
    /// defaults; a malformed one is fatal for the gateway.
    pub fn load<P: AsRef<Path>>(path: P) -> GatewayConfig {
        match File::open(path) {
            Ok(file) => {
                serde_yaml::from_reader(file).expect("Error loading gateway configuration file")
            }
            Err(_) => GatewayConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = ConnectorParams::default();

        assert_eq!(params.address, 254);
        assert_eq!(params.serial_interface, "/dev/ttyAMA0");
        assert_eq!(params.baud_rate, 38400);
    }

    #[test]
    fn test_parse_connector_tree() {
        let config: GatewayConfig = serde_yaml::from_str(
            r#"
connectors:
  - type: fb-bus
    params:
      address: 250
      serial_interface: /dev/ttyUSB0
      baud_rate: 19200
  - type: fb-bus
"#,
        )
        .unwrap();

        assert_eq!(config.connectors.len(), 2);
        assert_eq!(config.connectors[0].kind, "fb-bus");
        assert_eq!(config.connectors[0].params.address, 250);
        assert_eq!(config.connectors[0].params.serial_interface, "/dev/ttyUSB0");
        assert_eq!(config.connectors[0].params.baud_rate, 19200);

        // Missing params fall back to the defaults
        assert_eq!(config.connectors[1].params.address, 254);
        assert_eq!(config.connectors[1].params.baud_rate, 38400);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = GatewayConfig::load("/nonexistent/gateway.yaml");

        assert_eq!(config.connectors.len(), 1);
        assert_eq!(config.connectors[0].kind, "fb-bus");
    }
}
