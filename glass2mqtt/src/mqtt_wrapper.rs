use crate::mqtt_config::MqttConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

pub trait MqttWrapper {
    // This trait decouples library code from the MQTT client implementation.
    // The binary wraps its client in a new type implementing this trait; tests
    // substitute an in-memory recorder.

    /// Hands one message to the transport. `Ok` means the transport accepted
    /// it; a single call never retries.
    fn publish<S, V>(&mut self, topic: S, qos: QoS, retain: bool, payload: V) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>;

    fn new(config: &MqttConfig, suffix: &str) -> Self;
}
