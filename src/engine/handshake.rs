//! Bind and hardware-info exchanges on the handshake characteristic.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ble::uuids::HANDSHAKE_CHARACTERISTIC_UUID;
use crate::engine::aggregator::StateAggregator;
use crate::engine::session::{Session, Wake};
use crate::engine::{Control, Flow};
use crate::error::{Error, Result};
use crate::protocol::{decode_hardware_info, BindResponse, Request};

/// Bind the session, then fetch hardware info if still needed.
///
/// A bind timeout or rejection fails the session. A hardware info timeout
/// does not; the session continues with hardware info unset.
pub(crate) async fn run(
    session: &mut Session<'_>,
    control: &mut Control,
    state: &mut StateAggregator,
) -> Flow<()> {
    let bind = Request::Bind {
        client_id: session.client_id(),
    };
    let response = exchange(session, control, bind, BindResponse::decode)
        .await?
        .ok_or(Error::Timeout { operation: "bind" })?;
    if !response.is_accepted() {
        warn!("Bind rejected with status {}", response.status);
        return Err(Error::BindRejected {
            status: response.status,
        }
        .into());
    }
    info!("Bind accepted");

    if state.hardware_info().is_some() && !session.config().requery_hardware_info {
        debug!("Hardware info already captured, skipping query");
        return Ok(());
    }

    match exchange(session, control, Request::HardwareInfo, decode_hardware_info).await? {
        Some(info) => state.set_hardware_info(info),
        None => warn!("Timed out waiting for hardware info, continuing without it"),
    }

    Ok(())
}

/// Write `request` to the handshake characteristic and wait for a frame
/// `decode` accepts. `None` on timeout.
async fn exchange<T>(
    session: &mut Session<'_>,
    control: &mut Control,
    request: Request,
    decode: fn(&[u8]) -> Result<T>,
) -> Flow<Option<T>> {
    session
        .transport()
        .subscribe(HANDSHAKE_CHARACTERISTIC_UUID)
        .await?;
    let ready = Instant::now() + session.config().subscribe_delay;
    session.sleep_until(control, ready).await?;

    session.write(HANDSHAKE_CHARACTERISTIC_UUID, &request).await?;

    let deadline = Instant::now() + session.config().handshake_timeout;
    let result = loop {
        match session
            .wait(control, Some(HANDSHAKE_CHARACTERISTIC_UUID), deadline)
            .await?
        {
            Wake::Frame(data) => match decode(&data) {
                Ok(value) => break Some(value),
                Err(e) => debug!("Ignoring handshake frame: {}", e),
            },
            Wake::Command => {}
            Wake::Deadline => break None,
        }
    };

    if let Err(e) = session
        .transport()
        .unsubscribe(HANDSHAKE_CHARACTERISTIC_UUID)
        .await
    {
        debug!("Failed to unsubscribe from handshake characteristic: {}", e);
    }

    Ok(result)
}
