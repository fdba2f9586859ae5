use console::style;
use dialoguer::Confirm;

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::state::MachineStore;

pub async fn execute(connection: &ConnectionConfig, name: &str, force: bool) -> Result<()> {
    let store = MachineStore::open()?;
    let record = store.load(name)?;

    super::print_machine(&record);

    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "  {} Remove this machine and its resources?",
                style("?").cyan().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!();
            println!("  {}", style("Cancelled.").dim());
            return Ok(());
        }
    }

    let driver = super::driver(connection)?;
    // Keep the record on failure so the removal can be retried
    driver.remove(&record).await?;
    store.remove(name)?;

    println!();
    println!(
        "  {} {} removed",
        style("✓").green().bold(),
        style(name).white().bold()
    );
    Ok(())
}
