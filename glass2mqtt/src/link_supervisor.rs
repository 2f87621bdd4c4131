//! Keeps an MQTT connection alive in the background.
//!
//! The transport reconnects by itself the next time its event stream is
//! polled after an error. The supervisor only decides how long to wait in
//! between and when to stop.

use std::{
    fmt::Display,
    sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError},
};

use log::{debug, info, warn};

use crate::backoff::Backoff;

/// What the transport reported, reduced to what the supervisor cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Traffic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Shutdown was requested, or the requesting side went away.
    Cancelled,
    /// The transport stopped producing events.
    Closed,
}

/// Drives `events` until cancelled.
///
/// Every error is followed by a pause taken from `backoff`; a successful
/// connect resets it. Any message on `shutdown`, or dropping its sender,
/// ends the loop, including in the middle of a pause.
pub fn supervise<I, E>(events: I, shutdown: &Receiver<()>, mut backoff: Backoff) -> SupervisorExit
where
    I: IntoIterator<Item = Result<LinkEvent, E>>,
    E: Display,
{
    let mut connected_once = false;
    for event in events {
        match shutdown.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return SupervisorExit::Cancelled,
            Err(TryRecvError::Empty) => {}
        }

        match event {
            Ok(LinkEvent::Connected) => {
                if connected_once {
                    info!("Reconnected successfully after {} attempts", backoff.attempts());
                } else {
                    info!("Connected to MQTT Broker!");
                    connected_once = true;
                }
                backoff.reset();
            }
            Ok(LinkEvent::Traffic) => {}
            Err(e) => {
                if backoff.attempts() == 0 {
                    warn!("Disconnected: {e}");
                } else {
                    warn!("Reconnect attempt {} failed: {e}", backoff.attempts());
                }
                let delay = backoff.next_delay();
                info!("Reconnecting in {} seconds...", delay.as_secs_f32());
                match shutdown.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        return SupervisorExit::Cancelled
                    }
                }
            }
        }
    }
    debug!("mqtt event stream ended");
    SupervisorExit::Closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::mpsc::{channel, Sender},
        time::{Duration, Instant},
    };

    fn quick_backoff() -> Backoff {
        Backoff::new(Duration::from_millis(1), 2, Duration::from_millis(4))
    }

    fn events(seq: &[Option<LinkEvent>]) -> Vec<Result<LinkEvent, String>> {
        seq.iter()
            .map(|event| event.ok_or_else(|| "connection refused".to_string()))
            .collect()
    }

    #[test]
    fn runs_until_stream_ends() {
        let (_tx, rx): (Sender<()>, _) = channel();
        let stream = events(&[
            Some(LinkEvent::Connected),
            Some(LinkEvent::Traffic),
            None,
            None,
            Some(LinkEvent::Connected),
            Some(LinkEvent::Traffic),
        ]);
        assert_eq!(supervise(stream, &rx, quick_backoff()), SupervisorExit::Closed);
    }

    #[test]
    fn never_gives_up_on_repeated_errors() {
        let (_tx, rx): (Sender<()>, _) = channel();
        let stream = events(&[None; 50]);
        assert_eq!(supervise(stream, &rx, quick_backoff()), SupervisorExit::Closed);
    }

    #[test]
    fn shutdown_message_stops_loop() {
        let (tx, rx) = channel();
        tx.send(()).unwrap();
        let endless = std::iter::repeat(Ok::<_, String>(LinkEvent::Traffic));
        assert_eq!(
            supervise(endless, &rx, quick_backoff()),
            SupervisorExit::Cancelled
        );
    }

    #[test]
    fn dropped_sender_stops_loop() {
        let (tx, rx) = channel::<()>();
        drop(tx);
        let endless = std::iter::repeat(Err::<LinkEvent, _>("down"));
        assert_eq!(
            supervise(endless, &rx, quick_backoff()),
            SupervisorExit::Cancelled
        );
    }

    #[test]
    fn shutdown_interrupts_backoff_pause() {
        let (tx, rx) = channel();
        let slow = Backoff::new(Duration::from_secs(30), 2, Duration::from_secs(60));
        let handle = std::thread::spawn(move || {
            let endless = std::iter::repeat(Err::<LinkEvent, _>("down"));
            supervise(endless, &rx, slow)
        });
        let started = Instant::now();
        std::thread::sleep(Duration::from_millis(50));
        tx.send(()).unwrap();
        assert_eq!(handle.join().unwrap(), SupervisorExit::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
