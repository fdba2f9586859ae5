use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{DriverError, Result, StepContext};
use crate::provider::models::{Collection, NatGatewayEntities, NatGatewayLan};
use crate::provider::nat::build_rules;
use crate::provider::{CloudApi, NatGateway, NatGatewayProperties};

use super::machine::{LanGateways, MachineRecord, MachineSpec, NatIntent, NatSettings};
use super::Driver;

/// Name of LANs created on the fly for a NAT gateway
pub const NAT_LAN_NAME: &str = "Docker Machine LAN (NAT)";

/// LAN map used when none is configured
pub fn default_lan_gateways() -> LanGateways {
    LanGateways::from([(1, vec!["10.0.0.1".to_string()])])
}

/// The /24 network an address lives in, e.g. `10.7.0.12` -> `10.7.0.0/24`.
pub fn source_subnet(ip: &str) -> Result<String> {
    let addr: Ipv4Addr = ip
        .parse()
        .map_err(|_| DriverError::Machine(format!("'{}' is not an IPv4 address", ip)))?;
    let [a, b, c, _] = addr.octets();
    Ok(format!("{}.{}.{}.0/24", a, b, c))
}

pub(super) fn parse_lan_id(lan_id: &str) -> Result<i32> {
    lan_id
        .parse()
        .map_err(|_| DriverError::Config(format!("invalid LAN id '{}'", lan_id)))
}

impl<C: CloudApi> Driver<C> {
    /// Block until the primary NIC reports a different IP list than it had
    /// when the wait started.
    pub(super) async fn wait_for_nic_ip_change(
        &self,
        record: &MachineRecord,
        timeout: Duration,
    ) -> Result<()> {
        let initial = self
            .client
            .get_nic(&record.datacenter_id, &record.server_id, &record.nic_id)
            .await?
            .properties
            .ips
            .unwrap_or_default();

        let deadline = Instant::now() + timeout;
        loop {
            tokio::time::sleep(self.nic_poll_interval).await;

            let current = self
                .client
                .get_nic(&record.datacenter_id, &record.server_id, &record.nic_id)
                .await?
                .properties
                .ips
                .unwrap_or_default();

            if current != initial {
                tracing::info!("NIC IPs changed from {:?} to {:?}", initial, current);
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(DriverError::Timeout("NIC IP change".to_string()));
            }
        }
    }

    /// Work out the machine's public address, creating or extending a NAT
    /// gateway when asked to.
    pub(super) async fn resolve_public_ip(
        &self,
        spec: &MachineSpec,
        record: &mut MachineRecord,
    ) -> Result<()> {
        let nic = self
            .client
            .get_nic(&record.datacenter_id, &record.server_id, &record.nic_id)
            .await
            .step("getting NIC")?;
        let nic_ip = nic.first_ip().map(String::from);

        match &spec.nat {
            NatIntent::Create(settings) => {
                let nic_ip = nic_ip.ok_or_else(|| {
                    DriverError::Machine("primary NIC has no IP to derive the NAT subnet from".to_string())
                })?;
                self.create_nat(settings, record, &nic_ip)
                    .await
                    .step("creating NAT")?;
            }
            NatIntent::Attach { nat_id, .. } => {
                self.attach_to_nat(nat_id, record)
                    .await
                    .step("attaching LAN to NAT")?;
            }
            NatIntent::None => {
                if let Some(ip) = nic_ip {
                    record.ip_address = ip;
                }
            }
        }

        tracing::debug!("Machine IP address: {}", record.ip_address);
        Ok(())
    }

    async fn create_nat(
        &self,
        settings: &NatSettings,
        record: &mut MachineRecord,
        nic_ip: &str,
    ) -> Result<()> {
        let public_ips = if settings.public_ips.is_empty() {
            record.reserved_ips.clone()
        } else {
            settings.public_ips.clone()
        };
        let public_ip = public_ips
            .first()
            .cloned()
            .ok_or_else(|| DriverError::Config("no public IP available for the NAT gateway".to_string()))?;

        let subnet = source_subnet(nic_ip)?;
        let lans = settings
            .lans_to_gateways
            .clone()
            .unwrap_or_else(default_lan_gateways);

        self.ensure_lans(
            &record.datacenter_id,
            lans.keys().copied(),
            &mut record.nat_lan_ids,
        )
        .await?;
        tokio::time::sleep(self.nat_settle_delay).await;

        let rules = build_rules(&public_ip, &subnet, settings.skip_default_rules, &settings.rules);
        tracing::debug!("NAT gateway gets {} rules for {}", rules.len(), subnet);

        let mut gateway = NatGateway::new(NatGatewayProperties {
            name: Some(settings.name.clone()),
            public_ips,
            lans: lans
                .into_iter()
                .map(|(id, ips)| NatGatewayLan {
                    id,
                    gateway_ips: (!ips.is_empty()).then_some(ips),
                })
                .collect(),
        });
        gateway.entities = Some(NatGatewayEntities {
            rules: Collection::from(rules.iter().map(|rule| rule.to_model()).collect::<Vec<_>>()),
            flowlogs: Collection::from(
                settings
                    .flowlogs
                    .iter()
                    .map(|flowlog| flowlog.to_model())
                    .collect::<Vec<_>>(),
            ),
        });

        let created = self
            .client
            .create_nat_gateway(&record.datacenter_id, &gateway)
            .await?;

        record.nat_id = created.id;
        record.nat_created = true;
        record.ip_address = public_ip;
        tracing::debug!("NAT gateway id: {}", record.nat_id);
        Ok(())
    }

    /// Create any of `lan_ids` that does not exist yet as a private LAN,
    /// recording the ids of the created ones in `created`.
    async fn ensure_lans(
        &self,
        datacenter_id: &str,
        lan_ids: impl IntoIterator<Item = i32>,
        created: &mut Vec<String>,
    ) -> Result<()> {
        for lan_id in lan_ids {
            match self.client.get_lan(datacenter_id, &lan_id.to_string()).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    tracing::info!("Creating LAN {} for NAT", lan_id);
                    let lan = self
                        .client
                        .create_lan(datacenter_id, NAT_LAN_NAME, false)
                        .await?;
                    created.push(lan.id);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn attach_to_nat(&self, nat_id: &str, record: &mut MachineRecord) -> Result<()> {
        let gateway = self
            .client
            .get_nat_gateway(&record.datacenter_id, nat_id)
            .await?;
        let lan = parse_lan_id(&record.lan_id)?;

        if !gateway.properties.lans.iter().any(|l| l.id == lan) {
            let mut properties = gateway.properties.clone();
            properties.lans.push(NatGatewayLan {
                id: lan,
                gateway_ips: None,
            });
            self.client
                .patch_nat_gateway(&record.datacenter_id, nat_id, &properties)
                .await?;
            tracing::info!("Attached LAN {} to NAT gateway {}", lan, nat_id);
        }

        record.nat_id = nat_id.to_string();
        record.ip_address = gateway
            .properties
            .public_ips
            .first()
            .cloned()
            .ok_or_else(|| DriverError::Machine(format!("NAT gateway {} has no public IP", nat_id)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_subnet() {
        assert_eq!(source_subnet("10.7.0.12").unwrap(), "10.7.0.0/24");
        assert_eq!(source_subnet("192.168.1.1").unwrap(), "192.168.1.0/24");
        assert!(source_subnet("fe80::1").is_err());
        assert!(source_subnet("").is_err());
    }

    #[test]
    fn test_default_lan_gateways() {
        let lans = default_lan_gateways();
        assert_eq!(lans.len(), 1);
        assert_eq!(lans[&1], vec!["10.0.0.1"]);
    }
}
