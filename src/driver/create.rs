use base64::Engine;

use crate::environment::cloud_init::build_user_data;
use crate::error::{DriverError, Result, StepContext};
use crate::provider::models::{
    NicProperties, ServerEntities, ServerProperties, Volume, VolumeProperties,
};
use crate::provider::{CloudApi, Nic, Server};
use crate::ssh::keys::ensure_key_pair;

use super::image::ImageRef;
use super::machine::{MachineRecord, MachineSpec, ServerKind};
use super::network::parse_lan_id;
use super::Driver;

/// Volume type CUBE servers boot from
const CUBE_VOLUME_TYPE: &str = "DAS";

impl<C: CloudApi> Driver<C> {
    /// Provision everything a machine needs.
    ///
    /// Steps run strictly in order and the first failure aborts the rest.
    /// `record` is filled as each step succeeds, so after a failure it holds
    /// exactly the resources that have to be removed.
    pub async fn create(&self, spec: &MachineSpec, record: &mut MachineRecord) -> Result<()> {
        let public_key = ensure_key_pair(&spec.ssh_key_path).step("creating SSH key")?;

        self.resolve_datacenter(spec, record).await?;
        self.resolve_lan(spec, record).await?;

        if spec.needs_ip_block(record.lan_private) {
            let block = self
                .client
                .create_ip_block(1, &spec.location)
                .await
                .step("reserving IP block")?;
            record.ip_block_id = block.id;
            tracing::debug!("IP block id: {}", record.ip_block_id);
            if block.properties.ips.is_empty() {
                return Err(DriverError::Machine(format!(
                    "IP block {} has no IPs",
                    record.ip_block_id
                )))
                .step("reserving IP block");
            }
            record.reserved_ips = block.properties.ips;
        }

        let image = self
            .resolve_image(&spec.image, &spec.location, &spec.disk.disk_type)
            .await
            .step("resolving image")?;
        record.using_image_alias = image.is_alias();

        let request = self.server_request(spec, record, &image, &public_key).await?;
        let created = self
            .client
            .create_server(&record.datacenter_id, &request)
            .await
            .step("creating server")?;
        record.server_id = created.id;
        tracing::debug!("Server id: {}", record.server_id);

        let server = self
            .client
            .get_server(&record.datacenter_id, &record.server_id)
            .await
            .step("getting server")?;
        classify_attachments(spec, &server, record)?;

        if let Some(timeout) = spec.ip_change_timeout {
            self.wait_for_nic_ip_change(record, timeout)
                .await
                .step("waiting for NIC IP change")?;
        }

        self.resolve_public_ip(spec, record).await?;
        tracing::info!("Machine {} created with IP {}", spec.name, record.ip_address);
        Ok(())
    }

    async fn resolve_datacenter(&self, spec: &MachineSpec, record: &mut MachineRecord) -> Result<()> {
        match &spec.datacenter_id {
            Some(id) => {
                let datacenter = self
                    .client
                    .get_datacenter(id)
                    .await
                    .step("getting datacenter")?;
                tracing::info!(
                    "Using existing datacenter {}",
                    datacenter.properties.name.as_deref().unwrap_or(id)
                );
                record.datacenter_id = datacenter.id;
                record.datacenter_preexisting = true;
            }
            None => {
                let datacenter = self
                    .client
                    .create_datacenter(&spec.datacenter_name, &spec.location)
                    .await
                    .step("creating datacenter")?;
                record.datacenter_id = datacenter.id;
            }
        }

        tracing::debug!("Datacenter id: {}", record.datacenter_id);
        Ok(())
    }

    async fn resolve_lan(&self, spec: &MachineSpec, record: &mut MachineRecord) -> Result<()> {
        match &spec.lan_id {
            Some(id) => {
                record.lan_id = id.clone();
                record.lan_preexisting = true;
            }
            None => {
                let lan = self
                    .client
                    .create_lan(&record.datacenter_id, &spec.lan_name, !spec.private_lan)
                    .await
                    .step("creating LAN")?;
                record.lan_id = lan.id;
            }
        }

        let lan = self
            .client
            .get_lan(&record.datacenter_id, &record.lan_id)
            .await
            .step("getting LAN")?;
        record.lan_private = !lan.properties.public;

        tracing::debug!("LAN id: {} (private: {})", record.lan_id, record.lan_private);
        Ok(())
    }

    /// Server creation body with the boot volume and all NICs nested in it.
    async fn server_request(
        &self,
        spec: &MachineSpec,
        record: &MachineRecord,
        image: &ImageRef,
        public_key: &str,
    ) -> Result<Server> {
        let user_data = build_user_data(
            &spec.user_data,
            &spec.ssh_user,
            public_key,
            spec.ssh_in_cloud_init,
            &spec.name,
        )
        .step("building user data")?;

        let mut volume = VolumeProperties {
            name: Some(spec.name.clone()),
            image_password: spec.image_password.clone(),
            ssh_keys: (!spec.ssh_in_cloud_init).then(|| vec![public_key.to_string()]),
            user_data: Some(base64::engine::general_purpose::STANDARD.encode(user_data)),
            ..Default::default()
        };
        match image {
            ImageRef::Alias(alias) => volume.image_alias = Some(alias.clone()),
            ImageRef::Id(id) => volume.image = Some(id.clone()),
        }

        let mut properties = ServerProperties {
            name: Some(spec.name.clone()),
            server_type: Some(spec.server.as_str().to_string()),
            ..Default::default()
        };

        match &spec.server {
            ServerKind::Enterprise {
                cores,
                ram,
                cpu_family,
                availability_zone,
            } => {
                properties.cores = Some(*cores);
                properties.ram = Some(*ram);
                properties.cpu_family = Some(cpu_family.clone());
                properties.availability_zone = Some(availability_zone.clone());

                volume.volume_type = Some(spec.disk.disk_type.clone());
                volume.size = Some(spec.disk.size as f32);
                volume.availability_zone = Some(spec.disk.availability_zone.clone());
            }
            ServerKind::Cube { template } => {
                properties.template_uuid = Some(
                    self.template_id(template)
                        .await
                        .step("resolving template")?,
                );
                volume.volume_type = Some(CUBE_VOLUME_TYPE.to_string());
            }
        }

        let lan = parse_lan_id(&record.lan_id)?;
        let primary_ips = if !spec.nic_ips.is_empty() {
            Some(spec.nic_ips.clone())
        } else if record.lan_private || record.reserved_ips.is_empty() {
            None
        } else {
            Some(record.reserved_ips.clone())
        };

        let mut nics = vec![Nic::new(NicProperties {
            name: Some(spec.name.clone()),
            lan,
            ips: primary_ips,
            dhcp: Some(spec.nic_dhcp),
        })];
        nics.extend(spec.additional_lans.iter().map(|&lan| {
            Nic::new(NicProperties {
                name: Some(format!("{} {}", spec.name, lan)),
                lan,
                ips: None,
                dhcp: Some(true),
            })
        }));

        let mut server = Server::new(properties);
        server.entities = Some(ServerEntities {
            volumes: vec![Volume::new(volume)].into(),
            nics: nics.into(),
        });
        Ok(server)
    }

    async fn template_id(&self, name: &str) -> Result<String> {
        self.client
            .list_templates()
            .await?
            .into_iter()
            .find(|template| template.properties.name.as_deref() == Some(name))
            .map(|template| template.id)
            .ok_or_else(|| DriverError::Config(format!("no CUBE template named '{}'", name)))
    }
}

/// Record the boot volume and sort NICs into primary and additional ones.
fn classify_attachments(spec: &MachineSpec, server: &Server, record: &mut MachineRecord) -> Result<()> {
    let entities = server
        .entities
        .as_ref()
        .ok_or_else(|| DriverError::Machine("server has no volumes or NICs attached".to_string()))?;

    record.volume_id = entities
        .volumes
        .items
        .first()
        .map(|volume| volume.id.clone())
        .ok_or_else(|| DriverError::Machine("server has no volume attached".to_string()))?;

    record.additional_nic_ids.clear();
    for nic in &entities.nics.items {
        if nic.properties.name.as_deref() == Some(spec.name.as_str()) {
            record.nic_id = nic.id.clone();
        } else {
            record.additional_nic_ids.push(nic.id.clone());
        }
    }

    if record.nic_id.is_empty() {
        return Err(DriverError::Machine(format!(
            "server has no NIC named '{}'",
            spec.name
        )));
    }

    tracing::debug!(
        "Volume id: {}, NIC id: {}, additional NICs: {:?}",
        record.volume_id,
        record.nic_id,
        record.additional_nic_ids
    );
    Ok(())
}
