//! Poll cycle scheduling.
//!
//! Each tick writes the 19-command cycle at a fixed spacing. Only one
//! command is outstanding at a time: a command's response window closes
//! when the next command is due, and a response that misses its window is
//! treated as missing for that cycle. Host writes (alarm tone changes) are
//! slotted in between commands and during the idle time between cycles.

use std::convert::Infallible;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::ble::uuids::POLL_CHARACTERISTIC_UUID;
use crate::engine::aggregator::{Record, StateAggregator};
use crate::engine::session::{Session, Wake};
use crate::engine::{Control, Flow};
use crate::protocol::{cycle_plan, Request, Response, ResponseKey, CYCLE_LENGTH};

/// A written command waiting for its response.
#[derive(Debug, Clone, Copy)]
struct PendingCommand {
    key: ResponseKey,
    deadline: Instant,
    answered: bool,
}

/// Poll until interrupted.
pub(crate) async fn run(
    session: &mut Session<'_>,
    control: &mut Control,
    state: &mut StateAggregator,
) -> Flow<Infallible> {
    let plan = cycle_plan();

    loop {
        let started = Instant::now();
        let records = run_cycle(session, control, state, &plan).await?;
        state.apply_cycle(records);

        loop {
            let next = started + control.poll_interval;
            flush_host_writes(session, control, state).await?;
            match session
                .wait(control, Some(POLL_CHARACTERISTIC_UUID), next)
                .await?
            {
                Wake::Deadline => break,
                Wake::Frame(data) => log_unsolicited(&data),
                Wake::Command => {}
            }
        }
    }
}

/// Run one cycle and return the responses that arrived in their windows.
///
/// Nothing is applied here; if the session is interrupted mid-cycle the
/// collected records are dropped with the future.
async fn run_cycle(
    session: &mut Session<'_>,
    control: &mut Control,
    state: &mut StateAggregator,
    plan: &[Request; CYCLE_LENGTH],
) -> Flow<Vec<Record>> {
    let spacing = session.config().command_spacing;
    let mut records = Vec::with_capacity(CYCLE_LENGTH);

    for request in plan {
        flush_host_writes(session, control, state).await?;

        session.write(POLL_CHARACTERISTIC_UUID, request).await?;
        let mut pending = PendingCommand {
            key: request.response_key(),
            deadline: Instant::now() + spacing,
            answered: false,
        };

        loop {
            match session
                .wait(control, Some(POLL_CHARACTERISTIC_UUID), pending.deadline)
                .await?
            {
                Wake::Deadline => break,
                Wake::Command => {}
                Wake::Frame(data) => match Response::decode(&data) {
                    Ok(response) if !pending.answered && response.key() == pending.key => {
                        pending.answered = true;
                        records.push(Record::new(response));
                    }
                    Ok(Response::AlarmToneSet { success }) => log_alarm_ack(success),
                    Ok(response) => {
                        debug!("Discarding out-of-window response {:?}", response.key())
                    }
                    Err(e) => debug!("Dropping frame: {}", e),
                },
            }
        }

        if !pending.answered {
            trace!("No response to {:?}", request);
        }
    }

    Ok(records)
}

/// Write queued host requests, each followed by the command spacing.
async fn flush_host_writes(
    session: &mut Session<'_>,
    control: &mut Control,
    state: &mut StateAggregator,
) -> Flow<()> {
    while let Some(request) = control.pending_writes.pop_front() {
        session.write(POLL_CHARACTERISTIC_UUID, &request).await?;
        if let Request::SetAlarmTone(enabled) = request {
            info!("Alarm tone set to {}", if enabled { "on" } else { "off" });
            state.set_alarm_tone(enabled);
        }

        let deadline = Instant::now() + session.config().command_spacing;
        loop {
            match session
                .wait(control, Some(POLL_CHARACTERISTIC_UUID), deadline)
                .await?
            {
                Wake::Deadline => break,
                Wake::Frame(data) => log_unsolicited(&data),
                Wake::Command => {}
            }
        }
    }
    Ok(())
}

fn log_unsolicited(data: &[u8]) {
    match Response::decode(data) {
        Ok(Response::AlarmToneSet { success }) => log_alarm_ack(success),
        Ok(response) => debug!("Discarding out-of-window response {:?}", response.key()),
        Err(e) => debug!("Dropping frame: {}", e),
    }
}

fn log_alarm_ack(success: bool) {
    if success {
        debug!("Alarm tone change acknowledged");
    } else {
        warn!("Charger rejected alarm tone change");
    }
}
