use std::collections::BTreeMap;

use serde::Serialize;

pub const DISCOVERY_TOPIC: &str = "homeassistant/device/glass/config";

/// Device block of the discovery document, using the abbreviated keys Home
/// Assistant accepts for device based discovery.
#[derive(Serialize, Clone, Debug)]
pub struct DeviceConfig {
    ids: String,
    name: String,
    mf: String,
    mdl: String,
    sw: String,
    hw: String,
    sn: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ids: "glass_0001".to_string(),
            name: "glass".to_string(),
            mf: "Vital Energi".to_string(),
            mdl: String::new(),
            sw: String::new(),
            hw: String::new(),
            sn: "1234".to_string(),
        }
    }
}

/// The application supplying the discovered entities.
#[derive(Serialize, Clone, Debug)]
pub struct OriginConfig {
    name: String,
    sw: String,
    url: String,
}

/// One sensor of the device.
///
/// More information about the MQTT discovery protocol can be found here:
/// https://www.home-assistant.io/integrations/mqtt/#mqtt-discovery
#[derive(Serialize, Clone, Debug)]
pub struct ComponentConfig {
    p: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<String>,
    state_class: String,
    unit_of_measurement: String,
    value_template: String,
    unique_id: String,
}

impl ComponentConfig {
    fn sensor(
        name: &str,
        key: &str,
        device_class: Option<&str>,
        unit_of_measurement: &str,
        unique_id: &str,
    ) -> Self {
        Self {
            p: "sensor".to_string(),
            name: name.to_string(),
            device_class: device_class.map(str::to_string),
            state_class: "TOTAL_INCREASING".to_string(),
            unit_of_measurement: unit_of_measurement.to_string(),
            value_template: format!("{{{{ value_json.{key} | float }}}}"),
            unique_id: unique_id.to_string(),
        }
    }

    pub fn energy(name: &str, key: &str, unique_id: &str) -> Self {
        Self::sensor(name, key, Some("energy"), "kWh", unique_id)
    }

    pub fn cost(name: &str, key: &str, unique_id: &str) -> Self {
        Self::sensor(name, key, None, "GBP", unique_id)
    }
}

/// Complete device discovery message. Constant for a given state topic, so
/// republishing it is harmless.
#[derive(Serialize, Clone, Debug)]
pub struct DiscoveryDocument {
    dev: DeviceConfig,
    o: OriginConfig,
    cmps: BTreeMap<String, ComponentConfig>,
    state_topic: String,
    qos: u8,
}

impl DiscoveryDocument {
    pub fn new(state_topic: &str, vendor_url: &str) -> Self {
        let cmps = BTreeMap::from([
            (
                "kWh".to_string(),
                ComponentConfig::energy("kWh", "kwh", "glass_kwh"),
            ),
            (
                "cost today".to_string(),
                ComponentConfig::cost("Cost Today", "cost_today", "glass_cost_today"),
            ),
            (
                "usage today".to_string(),
                ComponentConfig::energy("kWh_today", "kwh_today", "glass_kwh_today"),
            ),
        ]);
        Self {
            dev: DeviceConfig::default(),
            o: OriginConfig {
                name: "Vital Energi".to_string(),
                // Rust compiler sets the CARGO_PKG_VERSION environment from the Cargo.toml .
                sw: env!("CARGO_PKG_VERSION").to_string(),
                url: vendor_url.to_string(),
            },
            cmps,
            state_topic: state_topic.to_string(),
            qos: 2,
        }
    }
}
