//! Device communication engine.
//!
//! One task per [`Charger`](crate::Charger) runs the connection supervisor,
//! which creates a fresh [`Session`](session::Session) for every connection
//! attempt. A session connects, settles, runs the bind/hardware-info
//! handshake and then polls until it is interrupted. Host commands arrive on
//! an mpsc queue and are serviced at every suspension point of the session,
//! so a stalled device never blocks the host.

pub(crate) mod aggregator;
pub(crate) mod handshake;
pub(crate) mod poller;
pub(crate) mod session;
pub(crate) mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::error::Error;
use crate::protocol::Request;

/// Capacity of the host command queue.
pub(crate) const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Command sent from the host handle to the engine task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EngineCommand {
    /// Change the poll interval (already validated).
    SetPollInterval(Duration),
    /// Enable or disable the alarm tone.
    SetAlarmTone(bool),
    /// Drop the current session and connect again immediately.
    Reconnect,
    /// Stop the engine.
    Shutdown,
}

/// Why a session was stopped on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    Shutdown,
    Reconnect,
}

/// Anything that ends a session early.
#[derive(Debug)]
pub(crate) enum Interrupt {
    /// The host asked for it.
    Stop(StopReason),
    /// The session failed.
    Failed(Error),
}

impl From<Error> for Interrupt {
    fn from(err: Error) -> Self {
        Self::Failed(err)
    }
}

/// Result of an engine step.
pub(crate) type Flow<T> = std::result::Result<T, Interrupt>;

/// Host-side state the engine carries across sessions.
pub(crate) struct Control {
    commands: mpsc::Receiver<EngineCommand>,
    /// Host writes waiting for a gap between poll commands.
    pub(crate) pending_writes: VecDeque<Request>,
    /// Current poll interval.
    pub(crate) poll_interval: Duration,
}

impl Control {
    pub(crate) fn new(commands: mpsc::Receiver<EngineCommand>, poll_interval: Duration) -> Self {
        Self {
            commands,
            pending_writes: VecDeque::new(),
            poll_interval,
        }
    }

    /// Receive the next host command; `None` once the handle is gone.
    pub(crate) async fn recv(&mut self) -> Option<EngineCommand> {
        self.commands.recv().await
    }

    /// Apply a host command. Stop requests and a dropped handle interrupt.
    pub(crate) fn dispatch(&mut self, command: Option<EngineCommand>) -> Flow<()> {
        match command {
            None => {
                debug!("Charger handle dropped, stopping engine");
                Err(Interrupt::Stop(StopReason::Shutdown))
            }
            Some(EngineCommand::Shutdown) => Err(Interrupt::Stop(StopReason::Shutdown)),
            Some(EngineCommand::Reconnect) => Err(Interrupt::Stop(StopReason::Reconnect)),
            Some(EngineCommand::SetPollInterval(interval)) => {
                debug!("Poll interval set to {:?}", interval);
                self.poll_interval = interval;
                Ok(())
            }
            Some(EngineCommand::SetAlarmTone(enabled)) => {
                self.pending_writes
                    .push_back(Request::SetAlarmTone(enabled));
                Ok(())
            }
        }
    }

    /// Drive `fut` to completion while still servicing host commands.
    pub(crate) async fn guard<T, F>(&mut self, fut: F) -> Flow<T>
    where
        F: Future<Output = crate::error::Result<T>>,
    {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                result = &mut fut => return result.map_err(Interrupt::from),
                command = self.commands.recv() => self.dispatch(command)?,
            }
        }
    }

    /// Sleep until `deadline` while servicing host commands.
    pub(crate) async fn sleep_until(&mut self, deadline: Instant) -> Flow<()> {
        self.guard(async {
            tokio::time::sleep_until(deadline).await;
            Ok(())
        })
        .await
    }
}
