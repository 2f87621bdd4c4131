use std::{
    sync::mpsc::{self, Sender},
    thread,
    time::Duration,
};

use glass2mqtt::{
    backoff::Backoff,
    link_supervisor::{self, LinkEvent},
    mqtt_config::MqttConfig,
    mqtt_wrapper::{self},
};
use log::{info, warn};
use rumqttc::{
    tokio_rustls::{self, rustls::ClientConfig},
    Client, Event, MqttOptions, Packet, Transport,
};

pub struct RumqttcWrapper {
    client: Client,
    shutdown: Option<Sender<()>>,
}

fn match_qos(qos: mqtt_wrapper::QoS) -> rumqttc::QoS {
    match qos {
        mqtt_wrapper::QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        mqtt_wrapper::QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        mqtt_wrapper::QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn tls_transport() -> Transport {
    // Use rustls-native-certs to load root certificates from the operating system.
    let mut roots = tokio_rustls::rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!("could not load platform certificate: {e}");
    }
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            warn!("skipping platform certificate: {e}");
        }
    }

    let client_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Transport::tls_with_config(client_config.into())
}

impl mqtt_wrapper::MqttWrapper for RumqttcWrapper {
    fn publish<S, V>(
        &mut self,
        topic: S,
        qos: mqtt_wrapper::QoS,
        retain: bool,
        payload: V,
    ) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>,
    {
        // never block the poll loop on a full request queue
        Ok(self
            .client
            .try_publish(topic, match_qos(qos), retain, payload)?)
    }

    fn new(config: &MqttConfig, suffix: &str) -> Self {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| "glass-mqtt-publisher".to_string() + suffix);

        let mut mqttoptions =
            MqttOptions::new(client_id, &config.host, config.port_or_default());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        if config.use_tls() {
            mqttoptions.set_transport(tls_transport());
        }

        //parse the mqtt authentication options
        if let Some((username, password)) = match (&config.username, &config.password) {
            (None, None) => None,
            (None, Some(_)) => None,
            (Some(username), None) => Some((username.clone(), "".into())),
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
        } {
            mqttoptions.set_credentials(username, password);
        }

        let (client, mut connection) = Client::new(mqttoptions, 512);
        let (shutdown, shutdown_rx) = mpsc::channel();

        thread::spawn(move || {
            // keep polling the event loop to make sure outgoing messages get sent;
            // after an error the next poll reconnects, paced by the backoff
            let events = connection.iter().map(|event| {
                event.map(|event| match event {
                    Event::Incoming(Packet::ConnAck(_)) => LinkEvent::Connected,
                    _ => LinkEvent::Traffic,
                })
            });
            let exit = link_supervisor::supervise(events, &shutdown_rx, Backoff::default());
            info!("mqtt connection supervisor stopped: {exit:?}");
        });

        Self {
            client,
            shutdown: Some(shutdown),
        }
    }
}

impl Drop for RumqttcWrapper {
    fn drop(&mut self) {
        // dropping the sender cancels the supervisor, even mid backoff
        self.shutdown.take();
        if let Err(e) = self.client.disconnect() {
            warn!("mqtt disconnect failed: {e}");
        }
    }
}
