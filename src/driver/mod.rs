//! Machine lifecycle on top of a [`CloudApi`].
//!
//! [`Driver`] holds no machine state of its own: every operation takes the
//! [`MachineSpec`](machine::MachineSpec) and/or the
//! [`MachineRecord`](machine::MachineRecord) it works on, and the caller
//! persists the record between calls.

mod create;
pub mod image;
pub mod machine;
pub mod network;
mod precheck;
mod remove;
pub mod state;

#[cfg(test)]
pub mod fake;

use std::time::Duration;

use crate::error::{DriverError, Result};
use crate::provider::CloudApi;

use machine::MachineRecord;
use state::MachineState;

/// Interval between NIC polls while waiting for an IP change
pub const NIC_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Pause between creating LANs for a NAT gateway and submitting the gateway
pub const NAT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Port the docker daemon listens on
pub const DOCKER_PORT: u16 = 2376;

pub struct Driver<C> {
    client: C,
    nic_poll_interval: Duration,
    nat_settle_delay: Duration,
}

impl<C: CloudApi> Driver<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            nic_poll_interval: NIC_POLL_INTERVAL,
            nat_settle_delay: NAT_SETTLE_DELAY,
        }
    }

    /// Override the NIC poll interval and the NAT settle delay
    pub fn with_delays(mut self, nic_poll_interval: Duration, nat_settle_delay: Duration) -> Self {
        self.nic_poll_interval = nic_poll_interval;
        self.nat_settle_delay = nat_settle_delay;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub async fn get_state(&self, record: &MachineRecord) -> Result<MachineState> {
        let server = self
            .client
            .get_server(&record.datacenter_id, &record.server_id)
            .await?;

        let remote = server
            .state()
            .ok_or_else(|| DriverError::ServerState("no state reported".to_string()))?;
        MachineState::from_remote(remote)
    }

    pub async fn start(&self, record: &MachineRecord) -> Result<()> {
        if self.get_state(record).await? == MachineState::Running {
            tracing::info!("Host is already running or starting");
            return Ok(());
        }

        self.client
            .start_server(&record.datacenter_id, &record.server_id)
            .await?;
        tracing::info!("Starting {}", record.name);
        Ok(())
    }

    pub async fn stop(&self, record: &MachineRecord) -> Result<()> {
        if self.get_state(record).await? == MachineState::Stopped {
            tracing::info!("Host is already stopped");
            return Ok(());
        }

        self.client
            .stop_server(&record.datacenter_id, &record.server_id)
            .await?;
        tracing::info!("Stopping {}", record.name);
        Ok(())
    }

    pub async fn restart(&self, record: &MachineRecord) -> Result<()> {
        self.client
            .reboot_server(&record.datacenter_id, &record.server_id)
            .await?;
        tracing::info!("Restarting {}", record.name);
        Ok(())
    }

    /// Hard stop without looking at the current state
    pub async fn kill(&self, record: &MachineRecord) -> Result<()> {
        self.client
            .stop_server(&record.datacenter_id, &record.server_id)
            .await?;
        Ok(())
    }

    pub fn get_ip(&self, record: &MachineRecord) -> Result<String> {
        record.ip().map(String::from)
    }

    pub fn get_ssh_hostname(&self, record: &MachineRecord) -> Result<String> {
        self.get_ip(record)
    }

    /// Docker daemon URL; only available while the machine runs
    pub async fn get_url(&self, record: &MachineRecord) -> Result<String> {
        let state = self.get_state(record).await?;
        if state != MachineState::Running {
            return Err(DriverError::Machine(format!(
                "Host is not running (state: {})",
                state
            )));
        }

        let ip = self.get_ip(record)?;
        Ok(format!("tcp://{}:{}", ip, DOCKER_PORT))
    }
}
