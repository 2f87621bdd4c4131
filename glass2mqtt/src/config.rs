use std::{env, fs, path::PathBuf};

use log::{info, warn};
use serde_derive::Deserialize;

use crate::{mqtt_config::MqttConfig, vendor_config::VendorConfig};

const CONFIG_FILE: &str = "config.toml";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub glass: VendorConfig,
    pub mqtt: MqttConfig,
}

impl Config {
    pub fn is_valid(&self) -> bool {
        self.glass.has_credentials() && self.mqtt.is_valid()
    }

    /// Reads `config.toml` from the working directory, or next to the
    /// executable, and applies environment overrides on top.
    pub fn load() -> Config {
        let contents = match config_path() {
            Some(path) => {
                info!("loading configuration from {}", path.display());
                fs::read_to_string(&path).unwrap_or_else(|e| {
                    warn!("Could not read {}: {e}", path.display());
                    String::new()
                })
            }
            None => {
                info!("no {CONFIG_FILE} found, using defaults and environment");
                String::new()
            }
        };
        Self::from_sources(&contents, |key| env::var(key).ok())
    }

    /// Parses `contents` as TOML and applies overrides looked up through `var`.
    pub fn from_sources(contents: &str, var: impl Fn(&str) -> Option<String>) -> Config {
        let mut config = match toml::from_str::<Config>(contents) {
            Ok(config) => config,
            Err(e) => {
                warn!("toml config unparsable: {e}");
                Config::default()
            }
        };

        // $BROKER, $BROKER_PORT, $BROKER_USERNAME, $BROKER_PASSWORD, $BROKER_TLS
        if let Some(host) = var("BROKER") {
            config.mqtt.host = host;
        }
        if let Some(port) = var("BROKER_PORT") {
            match port.parse() {
                Ok(port) => config.mqtt.port = Some(port),
                Err(e) => warn!("ignoring BROKER_PORT={port}: {e}"),
            }
        }
        if let Some(username) = var("BROKER_USERNAME") {
            config.mqtt.username = Some(username);
        }
        if let Some(password) = var("BROKER_PASSWORD") {
            config.mqtt.password = Some(password);
        }
        if let Some(tls) = var("BROKER_TLS") {
            config.mqtt.tls = Some(matches!(tls.as_str(), "1" | "true" | "yes"));
        }
        if let Some(topic) = var("MQTT_TOPIC") {
            config.mqtt.base_topic = topic;
        }
        // $GLASS_USERNAME, $GLASS_PASSWORD
        if let Some(username) = var("GLASS_USERNAME") {
            config.glass.username = username;
        }
        if let Some(password) = var("GLASS_PASSWORD") {
            config.glass.password = password;
        }
        config
    }
}

fn config_path() -> Option<PathBuf> {
    let mut path = env::current_dir().ok()?;
    path.push(CONFIG_FILE);
    if path.exists() {
        return Some(path);
    }
    let mut path = env::current_exe().ok()?;
    path.pop();
    path.push(CONFIG_FILE);
    path.exists().then_some(path)
}
