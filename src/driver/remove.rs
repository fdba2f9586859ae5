use crate::error::{Result, TeardownErrors};
use crate::provider::CloudApi;

use super::machine::MachineRecord;
use super::Driver;

impl<C: CloudApi> Driver<C> {
    /// Delete everything the record owns, dependents first.
    ///
    /// Every step runs even when an earlier one failed; the failures are
    /// reported together at the end. Ids that were never recorded are
    /// skipped, as are the datacenter and LAN when they were not created for
    /// this machine.
    pub async fn remove(&self, record: &MachineRecord) -> Result<()> {
        tracing::warn!(
            "NOTICE: Please check IONOS Cloud Console/CLI to ensure there are no leftover resources."
        );

        let mut errors = TeardownErrors::new();
        let dc = record.datacenter_id.as_str();
        let server = record.server_id.as_str();

        if !dc.is_empty() && !server.is_empty() {
            if !record.nic_id.is_empty() {
                tracing::info!("Deleting NIC {}", record.nic_id);
                errors.record(
                    "deleting NIC",
                    self.client
                        .delete_nic(dc, server, &record.nic_id)
                        .await
                        .map_err(Into::into),
                );
            }

            for nic_id in &record.additional_nic_ids {
                tracing::info!("Deleting additional NIC {}", nic_id);
                errors.record(
                    "deleting additional NIC",
                    self.client
                        .delete_nic(dc, server, nic_id)
                        .await
                        .map_err(Into::into),
                );
            }
        }

        if !dc.is_empty() && !record.volume_id.is_empty() {
            tracing::info!("Deleting volume {}", record.volume_id);
            errors.record(
                "removing volume",
                self.client
                    .delete_volume(dc, &record.volume_id)
                    .await
                    .map_err(Into::into),
            );
        }

        if !dc.is_empty() && !server.is_empty() {
            tracing::info!("Deleting server {}", server);
            errors.record(
                "deleting server",
                self.client
                    .delete_server(dc, server)
                    .await
                    .map_err(Into::into),
            );
        }

        if !dc.is_empty() && record.nat_created && !record.nat_id.is_empty() {
            tracing::info!("Deleting NAT gateway {}", record.nat_id);
            errors.record(
                "deleting NAT",
                self.client
                    .delete_nat_gateway(dc, &record.nat_id)
                    .await
                    .map_err(Into::into),
            );
        }

        if !dc.is_empty() {
            for lan_id in &record.nat_lan_ids {
                tracing::info!("Deleting NAT LAN {}", lan_id);
                errors.record(
                    "deleting NAT LAN",
                    self.client
                        .delete_lan(dc, lan_id)
                        .await
                        .map_err(Into::into),
                );
            }
        }

        if !dc.is_empty() && !record.lan_preexisting && !record.lan_id.is_empty() {
            tracing::info!("Deleting LAN {}", record.lan_id);
            errors.record(
                "deleting LAN",
                self.client
                    .delete_lan(dc, &record.lan_id)
                    .await
                    .map_err(Into::into),
            );
        }

        if !dc.is_empty() && !record.datacenter_preexisting {
            tracing::info!("Deleting datacenter {}", dc);
            errors.record(
                "deleting datacenter",
                self.client.delete_datacenter(dc).await.map_err(Into::into),
            );
        }

        if !record.ip_block_id.is_empty() {
            tracing::info!("Deleting IP block {}", record.ip_block_id);
            errors.record(
                "deleting ipblock",
                self.client
                    .delete_ip_block(&record.ip_block_id)
                    .await
                    .map_err(Into::into),
            );
        }

        errors.into_result()
    }
}
