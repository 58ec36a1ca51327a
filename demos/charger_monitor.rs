//! Monitor an ISDT charger
//!
//! Discovers the first ISDT charger in range, connects, and prints a line per
//! slot each time a poll cycle completes.
//!
//! Run with: cargo run --example charger_monitor
//!
//! Options:
//!   --interval <seconds>   poll interval (10-300)
//!   --alarm <on|off>       set the alarm tone once connected

use isdt_air_ble::{
    BleScanner, Charger, ChargerConfig, ChargerSnapshot, ConnectionPhase, Error, Result,
};
use std::time::Duration;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("isdt_air_ble=info".parse().unwrap()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let arg = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    let mut config = ChargerConfig::default();
    if let Some(secs) = arg("--interval").and_then(|s| s.parse::<u64>().ok()) {
        config = config.with_poll_interval(Duration::from_secs(secs))?;
    }
    let alarm = arg("--alarm").map(|s| s == "on");

    println!("Scanning for ISDT chargers...\n");

    let scanner = BleScanner::new().await?;
    let mut discoveries = scanner.subscribe();
    scanner.start().await?;

    let found = tokio::time::timeout(Duration::from_secs(30), discoveries.recv())
        .await
        .map_err(|_| Error::Timeout {
            operation: "discovery",
        })?
        .map_err(|_| Error::BluetoothUnavailable)?;
    scanner.stop().await?;

    println!(
        "Found {} ({}), RSSI {:?} dBm\n",
        found.model, found.identifier, found.rssi
    );

    let charger = Charger::connect_peripheral(scanner.adapter().clone(), found.peripheral, config)?;

    let _connection = charger.on_connection_changed(|event| {
        println!("[{}] -> [{}]", event.previous, event.phase);
    });

    let mut snapshots = charger.subscribe();
    let mut alarm_pending = alarm;

    loop {
        tokio::select! {
            received = snapshots.recv() => match received {
                Ok(snapshot) => {
                    if let Some(enabled) = alarm_pending {
                        if snapshot.phase == ConnectionPhase::Polling {
                            charger.set_alarm_tone(enabled).await?;
                            alarm_pending = None;
                        }
                    }
                    print_snapshot(&snapshot);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    charger.shutdown().await?;
    Ok(())
}

fn print_snapshot(snapshot: &ChargerSnapshot) {
    if snapshot.cycles_completed == 0 {
        return;
    }

    println!("=== Cycle {} ===", snapshot.cycles_completed);
    if let Some(info) = snapshot.hardware_info {
        println!(
            "HW {} / FW {} / SN {}",
            info.hardware_version(),
            info.firmware_version(),
            info.serial_number()
        );
    }
    if let Some(alarm) = snapshot.alarm_tone {
        println!("Alarm tone: {}", if alarm { "on" } else { "off" });
    }

    for channel in &snapshot.channels {
        print!(
            "  Slot {}: {:<10} {:>3}% {:>6.3} V {:>6.3} A {}",
            channel.slot_number(),
            channel.work_state.to_string(),
            channel.capacity_percent,
            channel.output_voltage(),
            channel.charging_current(),
            channel.work_period_string(),
        );
        if let Some(ir) = channel.primary_internal_resistance() {
            print!("  IR {:.1} mΩ", ir);
        }
        println!();
    }

    println!(
        "Total charging current: {:.3} A\n",
        snapshot.total_charging_current()
    );
}
