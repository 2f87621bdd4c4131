mod logging;
mod rumqttc_wrapper;

use std::sync::mpsc;

use glass2mqtt::config::Config;
use glass2mqtt::poller::Poller;
use glass2mqtt::publisher::Publisher;
use glass2mqtt::session::Session;
use rumqttc_wrapper::RumqttcWrapper;

use log::{error, info, warn};

fn main() -> anyhow::Result<()> {
    logging::init_logger();
    info!("Running revision: {}", env!("GIT_HASH"));
    if std::env::args().len() > 1 {
        error!("Arguments passed. Tool is configured by config.toml and environment variables");
    }

    let config = Config::load();
    if !config.is_valid() {
        if !config.glass.has_credentials() {
            warn!("GLASS_USERNAME or GLASS_PASSWORD not set, logging in to glass will fail");
        }
        if !config.mqtt.is_valid() {
            warn!("mqtt host or base topic is empty, publishing will fail");
        }
    }
    info!("glass api: {}", config.glass.base_url);
    info!(
        "mqtt broker: {}:{} (tls: {})",
        config.mqtt.host,
        config.mqtt.port_or_default(),
        config.mqtt.use_tls()
    );
    info!("publishing state to {}", config.mqtt.state_topic());

    let session = Session::new(&config.glass)?;
    let publisher = Publisher::<RumqttcWrapper>::new(&config.mqtt, &config.glass.base_url);

    // held for the lifetime of the process; dropping it stops the poll loop
    let (_shutdown, shutdown_rx) = mpsc::channel();
    let mut poller = Poller::new(session, publisher);
    poller.run(&shutdown_rx);
    Ok(())
}
