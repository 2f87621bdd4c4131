use std::{thread, time::Duration};

use chrono::{DateTime, Local, SecondsFormat};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::json;

use crate::{
    error::PublishError,
    home_assistant_config::{DiscoveryDocument, DISCOVERY_TOPIC},
    mqtt_config::MqttConfig,
    mqtt_wrapper::{MqttWrapper, QoS},
    readings::Reading,
};

pub const PUBLISH_ATTEMPTS: u32 = 4;
const RETRY_PAUSE: Duration = Duration::from_millis(100);

/// Outbound state payload. Only exists when every reading is valid.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct StateMessage {
    pub kwh: f64,
    pub kwh_today: f64,
    pub cost_today: f64,
}

impl StateMessage {
    /// Combines the three readings of a cycle. `cost` is in minor currency
    /// units and ends up in major units.
    pub fn from_readings(kwh: &Reading, kwh_today: &Reading, cost: &Reading) -> Option<Self> {
        Some(Self {
            kwh: kwh.published_value()?,
            kwh_today: kwh_today.published_value()?,
            cost_today: cost.published_value()?,
        })
    }
}

/// Publishes discovery, state and heartbeat messages for the Glass device.
pub struct Publisher<MQTT: MqttWrapper> {
    client: MQTT,
    state_topic: String,
    ping_topic: String,
    discovery: DiscoveryDocument,
    retry_pause: Duration,
}

impl<MQTT: MqttWrapper> Publisher<MQTT> {
    pub fn new(config: &MqttConfig, vendor_url: &str) -> Self {
        let client = MQTT::new(config, "-ha");
        Self::with_client(client, config, vendor_url)
    }

    pub fn with_client(client: MQTT, config: &MqttConfig, vendor_url: &str) -> Self {
        let state_topic = config.state_topic();
        Self {
            client,
            discovery: DiscoveryDocument::new(&state_topic, vendor_url),
            ping_topic: config.ping_topic(),
            state_topic,
            retry_pause: RETRY_PAUSE,
        }
    }

    /// Pause between two attempts of the same message.
    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    pub fn client(&self) -> &MQTT {
        &self.client
    }

    /// Hands `payload` to the transport, trying up to [`PUBLISH_ATTEMPTS`]
    /// times in total.
    pub fn publish(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: &str,
    ) -> Result<(), PublishError> {
        for attempt in 1..=PUBLISH_ATTEMPTS {
            match self.client.publish(topic, qos, retain, payload) {
                Ok(()) => {
                    debug!("Published {payload} to {topic}");
                    return Ok(());
                }
                Err(e) => {
                    warn!("Attempt {attempt}: Failed to send message to topic {topic}: {e}");
                    if attempt < PUBLISH_ATTEMPTS && !self.retry_pause.is_zero() {
                        thread::sleep(self.retry_pause);
                    }
                }
            }
        }
        Err(PublishError::Exhausted {
            topic: topic.to_string(),
            attempts: PUBLISH_ATTEMPTS,
        })
    }

    fn publish_json<T: Serialize>(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: &T,
    ) -> Result<(), PublishError> {
        let payload = serde_json::to_string(payload).map_err(|e| PublishError::Encode {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
        self.publish(topic, qos, retain, &payload)
    }

    /// Lets Home Assistant know which sensors exist and where to find them.
    pub fn announce_discovery(&mut self) -> Result<(), PublishError> {
        let discovery = self.discovery.clone();
        self.publish_json(DISCOVERY_TOPIC, QoS::AtMostOnce, true, &discovery)
    }

    pub fn publish_state(&mut self, state: &StateMessage) -> Result<(), PublishError> {
        let topic = self.state_topic.clone();
        self.publish_json(&topic, QoS::ExactlyOnce, true, state)?;
        info!("Published {state:?} to {topic}");
        Ok(())
    }

    pub fn publish_ping(&mut self, now: DateTime<Local>) -> Result<(), PublishError> {
        let topic = self.ping_topic.clone();
        let payload = json!({ "ping": now.to_rfc3339_opts(SecondsFormat::Micros, false) });
        self.publish_json(&topic, QoS::AtMostOnce, false, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readings::ReadingKind;
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::{cell::RefCell, sync::Once};

    thread_local! {
        static LOG_LINES: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
    }

    /// Collects log lines per test thread.
    struct LogRecorder;

    impl Log for LogRecorder {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            LOG_LINES.with(|lines| {
                lines
                    .borrow_mut()
                    .push((record.level(), record.args().to_string()))
            });
        }

        fn flush(&self) {}
    }

    static RECORDER: LogRecorder = LogRecorder;
    static INSTALL_RECORDER: Once = Once::new();

    fn record_logs() {
        INSTALL_RECORDER.call_once(|| {
            log::set_logger(&RECORDER).unwrap();
            log::set_max_level(LevelFilter::Trace);
        });
        LOG_LINES.with(|lines| lines.borrow_mut().clear());
    }

    fn logged(level: Level) -> Vec<String> {
        LOG_LINES.with(|lines| {
            lines
                .borrow()
                .iter()
                .filter(|(l, _)| *l == level)
                .map(|(_, line)| line.clone())
                .collect()
        })
    }

    /// Records what it is given and fails the first `failures` calls.
    struct FlakyClient {
        failures: u32,
        attempts: u32,
        delivered: Vec<(String, QoS, bool, String)>,
    }

    impl MqttWrapper for FlakyClient {
        fn publish<S, V>(&mut self, topic: S, qos: QoS, retain: bool, payload: V) -> anyhow::Result<()>
        where
            S: Clone + Into<String>,
            V: Clone + Into<Vec<u8>>,
        {
            self.attempts += 1;
            if self.failures > 0 {
                self.failures -= 1;
                anyhow::bail!("request queue full");
            }
            let payload = String::from_utf8(payload.into())?;
            self.delivered.push((topic.into(), qos, retain, payload));
            Ok(())
        }

        fn new(_config: &MqttConfig, _suffix: &str) -> Self {
            Self {
                failures: 0,
                attempts: 0,
                delivered: Vec::new(),
            }
        }
    }

    fn publisher(failures: u32) -> Publisher<FlakyClient> {
        let config = MqttConfig::default();
        let mut client = FlakyClient::new(&config, "-test");
        client.failures = failures;
        Publisher::with_client(client, &config, "https://glass.test")
            .with_retry_pause(Duration::ZERO)
    }

    fn reading(kind: ReadingKind, value: Option<f64>) -> Reading {
        Reading {
            value,
            ..Reading::unavailable(kind)
        }
    }

    #[test]
    fn retries_until_accepted() {
        record_logs();
        let mut publisher = publisher(3);
        assert!(publisher.publish("t", QoS::AtMostOnce, false, "x").is_ok());
        assert_eq!(publisher.client().attempts, 4);
        assert_eq!(publisher.client().delivered.len(), 1);

        let failures = logged(Level::Warn);
        assert_eq!(failures.len(), 3);
        for (attempt, line) in (1..).zip(&failures) {
            assert!(line.starts_with(&format!("Attempt {attempt}: Failed to send message to topic t")));
        }
        assert_eq!(logged(Level::Debug), ["Published x to t"]);
    }

    #[test]
    fn gives_up_after_four_attempts() {
        let mut publisher = publisher(u32::MAX);
        assert_eq!(
            publisher.publish("t", QoS::AtMostOnce, false, "x"),
            Err(PublishError::Exhausted {
                topic: "t".into(),
                attempts: 4
            })
        );
        assert_eq!(publisher.client().attempts, 4);
        assert!(publisher.client().delivered.is_empty());
    }

    #[test]
    fn every_failed_attempt_is_logged() {
        record_logs();
        let mut publisher = publisher(u32::MAX);
        assert!(publisher.publish("t", QoS::AtMostOnce, false, "x").is_err());

        let failures = logged(Level::Warn);
        assert_eq!(failures.len(), 4);
        assert!(failures[3].starts_with("Attempt 4:"));
        assert!(failures.iter().all(|line| line.ends_with("request queue full")));
        assert!(logged(Level::Debug).is_empty());
    }

    #[test]
    fn first_try_success_makes_one_attempt() {
        let mut publisher = publisher(0);
        publisher.publish_ping(Local::now()).unwrap();
        assert_eq!(publisher.client().attempts, 1);
        let (topic, qos, retain, payload) = &publisher.client().delivered[0];
        assert_eq!(topic, "glass/mqtt/ping");
        assert_eq!(*qos, QoS::AtMostOnce);
        assert!(!*retain);
        let json: serde_json::Value = serde_json::from_str(payload).unwrap();
        assert!(DateTime::parse_from_rfc3339(json["ping"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn state_goes_to_state_topic_exactly_once() {
        let mut publisher = publisher(0);
        let state = StateMessage {
            kwh: 10.0,
            kwh_today: 2.0,
            cost_today: 5.0,
        };
        publisher.publish_state(&state).unwrap();
        let (topic, qos, retain, payload) = &publisher.client().delivered[0];
        assert_eq!(topic, "glass/mqtt/state");
        assert_eq!(*qos, QoS::ExactlyOnce);
        assert!(*retain);
        assert_eq!(payload, r#"{"kwh":10.0,"kwh_today":2.0,"cost_today":5.0}"#);
    }

    #[test]
    fn discovery_is_retained_on_well_known_topic() {
        let mut publisher = publisher(0);
        publisher.announce_discovery().unwrap();
        publisher.announce_discovery().unwrap();
        let delivered = &publisher.client().delivered;
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].0, DISCOVERY_TOPIC);
        assert!(delivered[0].2);
        assert_eq!(delivered[0].3, delivered[1].3);
    }

    #[test]
    fn state_scales_cost_once() {
        let state = StateMessage::from_readings(
            &reading(ReadingKind::CumulativeKwh, Some(10.0)),
            &reading(ReadingKind::TodayKwh, Some(2.0)),
            &reading(ReadingKind::TodayCost, Some(500.0)),
        )
        .unwrap();
        assert_eq!(
            state,
            StateMessage {
                kwh: 10.0,
                kwh_today: 2.0,
                cost_today: 5.0
            }
        );
    }

    #[test]
    fn state_requires_every_reading() {
        let valid = |kind| reading(kind, Some(1.0));
        let cases = [
            (reading(ReadingKind::CumulativeKwh, None), valid(ReadingKind::TodayKwh), valid(ReadingKind::TodayCost)),
            (valid(ReadingKind::CumulativeKwh), reading(ReadingKind::TodayKwh, Some(-1.0)), valid(ReadingKind::TodayCost)),
            (valid(ReadingKind::CumulativeKwh), valid(ReadingKind::TodayKwh), reading(ReadingKind::TodayCost, Some(-1.0))),
        ];
        for (kwh, today, cost) in cases {
            assert_eq!(StateMessage::from_readings(&kwh, &today, &cost), None);
        }
    }

    #[test]
    fn cost_is_logged_in_major_units() {
        let cost = reading(ReadingKind::TodayCost, Some(500.0));
        assert_eq!(cost.to_string(), "Cost: 5");
        assert_eq!(cost.published_value(), Some(5.0));
        let kwh = reading(ReadingKind::TodayKwh, Some(2.5));
        assert_eq!(kwh.to_string(), "kWh today: 2.5");
    }

    #[test]
    fn zero_is_a_valid_reading() {
        let zero = |kind| reading(kind, Some(0.0));
        assert!(StateMessage::from_readings(
            &zero(ReadingKind::CumulativeKwh),
            &zero(ReadingKind::TodayKwh),
            &zero(ReadingKind::TodayCost),
        )
        .is_some());
    }
}
