use console::style;

use crate::config::{ConnectionConfig, DriverConfig};
use crate::driver::machine::{MachineRecord, MachineSpec, NatIntent, ServerKind};
use crate::driver::Driver;
use crate::error::{DriverError, Result};
use crate::provider::CloudApi;
use crate::state::MachineStore;

/// Run the pre-create checks and show what would be used.
pub async fn check(connection: &ConnectionConfig, name: &str, config: &DriverConfig) -> Result<()> {
    connection.validate()?;
    config.validate()?;

    let store = MachineStore::open()?;
    let spec = config.machine_spec(name, &store.key_path(name)?)?;
    let spec = super::driver(connection)?.pre_create_check(spec).await?;

    println!(
        "  {} {} {}",
        style("✓").green().bold(),
        style(&spec.name).white().bold(),
        style("passed pre-create checks").dim()
    );
    println!();
    print_spec(&spec);
    Ok(())
}

pub async fn execute(connection: &ConnectionConfig, name: &str, config: &DriverConfig) -> Result<()> {
    connection.validate()?;
    config.validate()?;

    let store = MachineStore::open()?;
    if store.exists(name) {
        return Err(DriverError::Machine(format!(
            "Machine '{}' already exists",
            name
        )));
    }

    let driver = super::driver(connection)?;
    let spec = config.machine_spec(name, &store.key_path(name)?)?;
    let spec = driver.pre_create_check(spec).await?;

    println!(
        "  {} Creating {} in {}",
        style("→").cyan().bold(),
        style(&spec.name).white().bold(),
        style(&spec.location).cyan()
    );
    println!();

    let record = provision(&driver, &store, &spec).await?;

    println!(
        "  {} {} is ready",
        style("✓").green().bold(),
        style(&record.name).white().bold()
    );
    println!();
    super::print_machine(&record);
    println!(
        "  {}",
        style(format!(
            "ssh -i {} {}@{}",
            record.ssh_key_path, record.ssh_user, record.ip_address
        ))
        .dim()
    );
    Ok(())
}

/// Create the machine and save its record.
///
/// A failed create removes whatever it had already built; the record is kept
/// on disk only when that cleanup fails too, so `remove` can retry it.
pub(crate) async fn provision<C: CloudApi>(
    driver: &Driver<C>,
    store: &MachineStore,
    spec: &MachineSpec,
) -> Result<MachineRecord> {
    let mut record = MachineRecord::new(spec);

    match driver.create(spec, &mut record).await {
        Ok(()) => {
            store.save(&record)?;
            Ok(record)
        }
        Err(e) => {
            tracing::warn!("Error creating machine. Rolling back...");
            match driver.remove(&record).await {
                Ok(()) => {
                    store.remove(&record.name)?;
                    Err(e)
                }
                Err(rollback) => {
                    store.save(&record)?;
                    Err(DriverError::Rollback {
                        source: Box::new(e),
                        rollback: Box::new(rollback),
                    })
                }
            }
        }
    }
}

fn print_spec(spec: &MachineSpec) {
    let datacenter = spec
        .datacenter_id
        .clone()
        .unwrap_or_else(|| format!("new \"{}\"", spec.datacenter_name));
    let lan = spec
        .lan_id
        .clone()
        .unwrap_or_else(|| format!("new \"{}\"", spec.lan_name));
    let server = match &spec.server {
        ServerKind::Enterprise { cores, ram, .. } => {
            format!("ENTERPRISE, {} cores, {} MB", cores, ram)
        }
        ServerKind::Cube { template } => format!("CUBE, {}", template),
    };
    let nat = match &spec.nat {
        NatIntent::None => "none".to_string(),
        NatIntent::Create(settings) => format!("new \"{}\"", settings.name),
        NatIntent::Attach { nat_id, .. } => nat_id.clone(),
    };

    println!("  {}    {}", style("Location").dim(), spec.location);
    println!("  {}  {}", style("Datacenter").dim(), datacenter);
    println!(
        "  {}         {}{}",
        style("LAN").dim(),
        lan,
        if spec.private_lan { " (private)" } else { "" }
    );
    println!("  {}       {}", style("Image").dim(), spec.image);
    println!("  {}      {}", style("Server").dim(), server);
    println!(
        "  {}        {} GB {}",
        style("Disk").dim(),
        spec.disk.size,
        spec.disk.disk_type
    );
    println!("  {}         {}", style("NAT").dim(), nat);
    println!();
}
