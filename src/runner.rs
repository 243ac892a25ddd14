//! Event loop
//!
//! Blocks on the event channel until an event arrives or the expire timer
//! runs out, drains everything already queued, then resolves once. Each
//! pass through the loop is one batch.

use log::{debug, info};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Instant;

use crate::engine::{Control, Engine};
use crate::notification::NotificationServer;
use crate::player::{Player, PlayerEvent};

/// Run until the player shuts down or the event source goes away.
pub fn run_event_loop<P: Player, S: NotificationServer>(
    engine: &mut Engine<P, S>,
    events: &Receiver<PlayerEvent>,
) {
    'outer: loop {
        let mut disconnected = false;

        // wait for the first event of a batch
        let first = match engine.timer_deadline() {
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(Instant::now());
                match events.recv_timeout(timeout) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match events.recv() {
                Ok(event) => Some(event),
                Err(_) => break,
            },
        };

        if let Some(event) = first {
            if engine.handle_event(event) == Control::Shutdown {
                break;
            }
            loop {
                match events.try_recv() {
                    Ok(event) => {
                        if engine.handle_event(event) == Control::Shutdown {
                            break 'outer;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }

        let now = Instant::now();
        engine.poll_timer(now);
        engine.resolve(now);

        if disconnected {
            break;
        }
    }

    debug!("event loop finished");
    info!("player went away, shutting down");
    engine.shutdown();
}
