use serde_derive::Deserialize;

pub const DEFAULT_BROKER_HOST: &str = "mqtt";
pub const DEFAULT_BASE_TOPIC: &str = "glass/mqtt";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub tls: Option<bool>,
    /// Prefix for the state and ping topics.
    pub base_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.to_string(),
            port: None,
            username: None,
            password: None,
            client_id: None,
            tls: None,
            base_topic: DEFAULT_BASE_TOPIC.to_string(),
        }
    }
}

impl MqttConfig {
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && !self.base_topic.is_empty()
    }

    pub fn use_tls(&self) -> bool {
        self.tls.is_some_and(|tls| tls)
    }

    pub fn port_or_default(&self) -> u16 {
        self.port
            .unwrap_or_else(|| if self.use_tls() { 8883 } else { 1883 })
    }

    pub fn state_topic(&self) -> String {
        format!("{}/state", self.base_topic)
    }

    pub fn ping_topic(&self) -> String {
        format!("{}/ping", self.base_topic)
    }
}
