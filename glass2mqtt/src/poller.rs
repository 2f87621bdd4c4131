use std::{
    sync::mpsc::{Receiver, RecvTimeoutError},
    time::Duration,
};

use chrono::Local;
use log::{info, warn};

use crate::{
    mqtt_wrapper::MqttWrapper,
    publisher::{Publisher, StateMessage},
    readings::{self, Reading},
    session::Session,
};

/// Pause after publishing state, before the heartbeat.
pub const SETTLE_DELAY: Duration = Duration::from_secs(295);
/// Pause after the heartbeat, before the next cycle.
pub const PING_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug)]
pub struct Schedule {
    pub settle: Duration,
    pub after_ping: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            settle: SETTLE_DELAY,
            after_ping: PING_DELAY,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    Published(StateMessage),
    /// At least one reading was unavailable, or the state could not be sent.
    Incomplete,
}

pub struct Poller<MQTT: MqttWrapper> {
    session: Session,
    publisher: Publisher<MQTT>,
    schedule: Schedule,
}

impl<MQTT: MqttWrapper> Poller<MQTT> {
    pub fn new(session: Session, publisher: Publisher<MQTT>) -> Self {
        Self {
            session,
            publisher,
            schedule: Schedule::default(),
        }
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn publisher(&self) -> &Publisher<MQTT> {
        &self.publisher
    }

    /// One fetch and publish pass. Failures are logged, never propagated.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        if let Err(e) = self.publisher.announce_discovery() {
            warn!("{e}");
        }

        self.session.refresh();
        let resources = readings::list_resources(&self.session);

        let kwh = readings::read_cumulative(&resources, &self.session);
        info!("{kwh}");
        let kwh_today = readings::read_today_kwh(&resources, &self.session);
        info!("{kwh_today}");
        let cost = readings::read_today_cost(&resources, &self.session);
        info!("{cost}");

        self.publish_if_complete(&kwh, &kwh_today, &cost)
    }

    fn publish_if_complete(
        &mut self,
        kwh: &Reading,
        kwh_today: &Reading,
        cost: &Reading,
    ) -> CycleOutcome {
        let Some(state) = StateMessage::from_readings(kwh, kwh_today, cost) else {
            info!("not all readings available, skipping state update");
            return CycleOutcome::Incomplete;
        };
        match self.publisher.publish_state(&state) {
            Ok(()) => CycleOutcome::Published(state),
            Err(e) => {
                warn!("{e}");
                CycleOutcome::Incomplete
            }
        }
    }

    pub fn heartbeat(&mut self) {
        if let Err(e) = self.publisher.publish_ping(Local::now()) {
            warn!("{e}");
        }
    }

    /// Polls forever on the configured schedule. Returns once `shutdown`
    /// receives a message or its sender is dropped.
    pub fn run(&mut self, shutdown: &Receiver<()>) {
        info!(
            "polling every {}s",
            (self.schedule.settle + self.schedule.after_ping).as_secs()
        );
        loop {
            self.run_cycle();
            if !wait(shutdown, self.schedule.settle) {
                break;
            }
            self.heartbeat();
            if !wait(shutdown, self.schedule.after_ping) {
                break;
            }
        }
        info!("poll loop stopped");
    }
}

/// Sleeps for `delay` unless shutdown is requested first. Returns whether to
/// keep going.
fn wait(shutdown: &Receiver<()>, delay: Duration) -> bool {
    matches!(
        shutdown.recv_timeout(delay),
        Err(RecvTimeoutError::Timeout)
    )
}
