use crate::error::{DriverError, Result, StepContext};
use crate::provider::{CloudApi, Lan};

use super::machine::{MachineSpec, NatIntent};
use super::Driver;

/// Pick the id of the only item named `name`; several matches are an error.
fn unique_id<'a>(
    named: impl Iterator<Item = (&'a str, Option<&'a str>)>,
    name: &str,
    kind: &str,
) -> Result<Option<String>> {
    let mut found = None;
    for (id, item_name) in named {
        if item_name != Some(name) {
            continue;
        }
        if found.is_some() {
            return Err(DriverError::Config(format!(
                "multiple {} with name {} found",
                kind, name
            )));
        }
        found = Some(id.to_string());
    }
    Ok(found)
}

/// Turn additional LAN names into ids; names with no matching LAN are skipped.
fn resolve_additional_lans(spec: &mut MachineSpec, lans: &[Lan]) {
    for name in std::mem::take(&mut spec.additional_lan_names) {
        let id = lans
            .iter()
            .find(|lan| lan.properties.name.as_deref() == Some(name.as_str()))
            .and_then(|lan| lan.id.parse::<i32>().ok());
        match id {
            Some(id) if !spec.additional_lans.contains(&id) => spec.additional_lans.push(id),
            Some(_) => {}
            None => tracing::warn!("No LAN named {} found, skipping it", name),
        }
    }
}

impl<C: CloudApi> Driver<C> {
    /// Validate a machine against the cloud before anything is created.
    ///
    /// Existing datacenters and LANs are adopted by name, the LAN's real
    /// visibility and the datacenter's location replace the configured
    /// ones, and the image must resolve. Returns the adjusted spec.
    pub async fn pre_create_check(&self, mut spec: MachineSpec) -> Result<MachineSpec> {
        if spec.datacenter_id.is_none() {
            let datacenters = self
                .client
                .list_datacenters()
                .await
                .step("listing datacenters")?;
            spec.datacenter_id = unique_id(
                datacenters
                    .iter()
                    .map(|dc| (dc.id.as_str(), dc.properties.name.as_deref())),
                &spec.datacenter_name,
                "Data Centers",
            )?;
        }

        if let Some(dc) = spec.datacenter_id.clone() {
            let lans = if spec.lan_id.is_none() || !spec.additional_lan_names.is_empty() {
                self.client.list_lans(&dc).await.step("listing LANs")?
            } else {
                Vec::new()
            };
            if spec.lan_id.is_none() {
                spec.lan_id = unique_id(
                    lans.iter()
                        .map(|lan| (lan.id.as_str(), lan.properties.name.as_deref())),
                    &spec.lan_name,
                    "LANs",
                )?;
            }
            resolve_additional_lans(&mut spec, &lans);

            if let Some(lan_id) = &spec.lan_id {
                let lan = self.client.get_lan(&dc, lan_id).await.step("getting LAN")?;
                spec.private_lan = !lan.properties.public;
            }

            let datacenter = self
                .client
                .get_datacenter(&dc)
                .await
                .step("getting datacenter")?;
            tracing::info!(
                "Using datacenter {}",
                datacenter.properties.name.as_deref().unwrap_or(&dc)
            );
            if let Some(location) = datacenter.properties.location {
                spec.location = location;
            }

            if let NatIntent::Create(settings) = &spec.nat {
                let nats = self
                    .client
                    .list_nat_gateways(&dc)
                    .await
                    .step("listing NAT gateways")?;
                let existing = unique_id(
                    nats.iter()
                        .map(|nat| (nat.id.as_str(), nat.properties.name.as_deref())),
                    &settings.name,
                    "Nat Gateways",
                )?;
                if existing.is_some() {
                    return Err(DriverError::Config(
                        "trying to create a NAT while also found an existing NAT. Please set only one of: (--nat-id | --create-nat), or try a different NAT name".to_string(),
                    ));
                }
            }
        }

        // A datacenter that does not exist yet has no LANs to look up
        resolve_additional_lans(&mut spec, &[]);

        self.resolve_image(&spec.image, &spec.location, &spec.disk.disk_type)
            .await
            .step("resolving image")?;

        if spec.uses_nat() && !spec.private_lan {
            return Err(DriverError::Config(
                "using a NAT Gateway requires usage of a private LAN. Please enable --private-lan or provide a private LAN id with --lan-id".to_string(),
            ));
        }

        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::DriverConfig;
    use crate::driver::fake::FakeCloud;

    fn spec(config: DriverConfig) -> MachineSpec {
        config
            .machine_spec("m1", &PathBuf::from("/tmp/id_ed25519"))
            .unwrap()
    }

    fn cloud() -> FakeCloud {
        let cloud = FakeCloud::new();
        cloud.add_alias("ubuntu:20.04");
        cloud
    }

    #[tokio::test]
    async fn test_fresh_machine_passes() {
        let driver = Driver::new(cloud());
        let checked = driver
            .pre_create_check(spec(DriverConfig::default()))
            .await
            .unwrap();
        assert_eq!(checked.datacenter_id, None);
        assert_eq!(checked.lan_id, None);
    }

    #[tokio::test]
    async fn test_adopts_datacenter_and_lan_by_name() {
        let cloud = cloud();
        let dc = cloud.add_datacenter("docker-machine-data-center", "de/fra");
        let lan = cloud.add_lan(&dc, "docker-machine-lan", false);
        cloud.add_datacenter("other", "us/las");

        let driver = Driver::new(cloud);
        let checked = driver
            .pre_create_check(spec(DriverConfig::default()))
            .await
            .unwrap();

        assert_eq!(checked.datacenter_id, Some(dc));
        assert_eq!(checked.lan_id, Some(lan));
        assert!(checked.private_lan);
        assert_eq!(checked.location, "de/fra");
    }

    #[tokio::test]
    async fn test_resolves_additional_lans_by_name() {
        let cloud = cloud();
        let dc = cloud.add_datacenter("docker-machine-data-center", "us/las");
        cloud.add_lan(&dc, "docker-machine-lan", true);
        let backend = cloud.add_lan(&dc, "backend", false);

        let config = DriverConfig {
            additional_lans: vec![
                "7".to_string(),
                "backend".to_string(),
                "wrong_value".to_string(),
            ],
            ..Default::default()
        };
        let checked = Driver::new(cloud)
            .pre_create_check(spec(config))
            .await
            .unwrap();

        assert_eq!(checked.additional_lans, vec![7, backend.parse::<i32>().unwrap()]);
        assert!(checked.additional_lan_names.is_empty());
    }

    #[tokio::test]
    async fn test_additional_lan_names_without_datacenter() {
        let config = DriverConfig {
            additional_lans: vec!["backend".to_string(), "4".to_string()],
            ..Default::default()
        };
        let driver = Driver::new(cloud());
        let checked = driver.pre_create_check(spec(config)).await.unwrap();

        assert_eq!(checked.additional_lans, vec![4]);
        assert!(checked.additional_lan_names.is_empty());
        assert!(!driver.client().calls().contains(&"list_lans".to_string()));
    }

    #[tokio::test]
    async fn test_duplicate_datacenter_names() {
        let cloud = cloud();
        cloud.add_datacenter("docker-machine-data-center", "us/las");
        cloud.add_datacenter("docker-machine-data-center", "us/las");

        let err = Driver::new(cloud)
            .pre_create_check(spec(DriverConfig::default()))
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("multiple Data Centers with name docker-machine-data-center found"));
    }

    #[tokio::test]
    async fn test_nat_requires_private_lan() {
        let config = DriverConfig {
            create_nat: true,
            ..Default::default()
        };
        let err = Driver::new(cloud())
            .pre_create_check(spec(config))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires usage of a private LAN"));
    }

    #[tokio::test]
    async fn test_existing_nat_with_same_name() {
        let cloud = cloud();
        let dc = cloud.add_datacenter("docker-machine-data-center", "us/las");
        cloud.add_nat(&dc, "docker-machine-nat", &["198.51.100.7"], &[1]);

        let config = DriverConfig {
            private_lan: true,
            create_nat: true,
            ..Default::default()
        };
        let err = Driver::new(cloud)
            .pre_create_check(spec(config))
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("trying to create a NAT while also found an existing NAT"));
    }

    #[tokio::test]
    async fn test_unresolvable_image() {
        let config = DriverConfig {
            image: "no-such-image".to_string(),
            ..Default::default()
        };
        let err = Driver::new(cloud())
            .pre_create_check(spec(config))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("error resolving image: "));
    }
}
