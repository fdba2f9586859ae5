pub mod create;
pub mod lifecycle;
pub mod remove;

use console::style;

use crate::config::ConnectionConfig;
use crate::driver::machine::MachineRecord;
use crate::driver::Driver;
use crate::error::Result;
use crate::provider::IonosClient;

pub(crate) fn driver(connection: &ConnectionConfig) -> Result<Driver<IonosClient>> {
    Ok(Driver::new(connection.client()?))
}

/// Info card shown before destructive or long-running commands
pub(crate) fn print_machine(record: &MachineRecord) {
    let ip = if record.ip_address.is_empty() {
        "no ip".to_string()
    } else {
        record.ip_address.clone()
    };

    println!(
        "  {} {} {}",
        style("●").green().bold(),
        style(&record.name).white().bold(),
        style(format!("({})", ip)).dim()
    );
    println!();
    println!("  {}  {}", style("Datacenter").dim(), or_dash(&record.datacenter_id));
    println!(
        "  {}         {}{}",
        style("LAN").dim(),
        or_dash(&record.lan_id),
        if record.lan_private { " (private)" } else { "" }
    );
    println!("  {}      {}", style("Server").dim(), or_dash(&record.server_id));
    if !record.nat_id.is_empty() {
        println!("  {}         {}", style("NAT").dim(), record.nat_id);
    }
    if !record.ip_block_id.is_empty() {
        println!("  {}    {}", style("IP block").dim(), record.ip_block_id);
    }
    println!();
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
