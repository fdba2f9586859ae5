use chrono::{DateTime, Utc};
use console::style;

use crate::config::ConnectionConfig;
use crate::driver::state::MachineState;
use crate::error::Result;
use crate::state::MachineStore;

fn done(verb: &str, name: &str) {
    println!(
        "  {} {} {}",
        style("✓").green().bold(),
        verb,
        style(name).white().bold()
    );
}

pub async fn start(connection: &ConnectionConfig, name: &str) -> Result<()> {
    let record = MachineStore::open()?.load(name)?;
    super::driver(connection)?.start(&record).await?;
    done("Started", name);
    Ok(())
}

pub async fn stop(connection: &ConnectionConfig, name: &str) -> Result<()> {
    let record = MachineStore::open()?.load(name)?;
    super::driver(connection)?.stop(&record).await?;
    done("Stopped", name);
    Ok(())
}

pub async fn restart(connection: &ConnectionConfig, name: &str) -> Result<()> {
    let record = MachineStore::open()?.load(name)?;
    super::driver(connection)?.restart(&record).await?;
    done("Restarted", name);
    Ok(())
}

pub async fn kill(connection: &ConnectionConfig, name: &str) -> Result<()> {
    let record = MachineStore::open()?.load(name)?;
    super::driver(connection)?.kill(&record).await?;
    done("Killed", name);
    Ok(())
}

// The printers below write bare values so their output can be scripted.

/// Saved address of a machine; no API call and no credentials needed
fn stored_ip(store: &MachineStore, name: &str) -> Result<String> {
    Ok(store.load(name)?.ip()?.to_string())
}

pub fn ip(name: &str) -> Result<()> {
    println!("{}", stored_ip(&MachineStore::open()?, name)?);
    Ok(())
}

/// The SSH hostname is the machine's IP address
pub fn ssh_hostname(name: &str) -> Result<()> {
    println!("{}", stored_ip(&MachineStore::open()?, name)?);
    Ok(())
}

pub async fn url(connection: &ConnectionConfig, name: &str) -> Result<()> {
    let record = MachineStore::open()?.load(name)?;
    println!("{}", super::driver(connection)?.get_url(&record).await?);
    Ok(())
}

pub async fn state(connection: &ConnectionConfig, name: &str) -> Result<()> {
    let record = MachineStore::open()?.load(name)?;
    let state = super::driver(connection)?.get_state(&record).await?;
    println!("{}", state_label(state));
    Ok(())
}

/// Machines with a saved record; no API calls are made.
pub fn list() -> Result<()> {
    let store = MachineStore::open()?;
    let names = store.list()?;

    if names.is_empty() {
        println!("  {}", style("No machines.").dim());
        return Ok(());
    }

    for name in names {
        let record = match store.load(&name) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", name, e);
                continue;
            }
        };

        let ip = if record.ip_address.is_empty() {
            "-".to_string()
        } else {
            record.ip_address.clone()
        };
        println!(
            "  {} {:<24} {:<16} {}",
            style("●").green().bold(),
            style(&record.name).white().bold(),
            ip,
            style(record.created_at.map(format_age).unwrap_or_default()).dim()
        );
    }
    Ok(())
}

fn state_label(state: MachineState) -> String {
    let label = state.to_string();
    match state {
        MachineState::Running => style(label).green().to_string(),
        MachineState::Stopped | MachineState::Paused => style(label).yellow().to_string(),
        MachineState::Error => style(label).red().to_string(),
        MachineState::None => label,
    }
}

fn format_age(since: DateTime<Utc>) -> String {
    let age = Utc::now() - since;
    let days = age.num_days();
    let hours = age.num_hours() % 24;
    let minutes = age.num_minutes() % 60;

    match (days, hours) {
        (0, 0) => format!("{}m", minutes),
        (0, _) => format!("{}h {}m", hours, minutes),
        _ => format!("{}d {}h", days, hours),
    }
}
