//! In-memory cloud used by the orchestrator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::provider::models::{
    DatacenterProperties, ImageProperties, IpBlockProperties, LanProperties, LocationProperties,
    NatGatewayLan, Resource, ResourceMetadata, TemplateProperties,
};
use crate::provider::{
    ApiError, ApiResult, CloudApi, Datacenter, Image, IpBlock, Lan, Location, NatGateway,
    NatGatewayProperties, Nic, Server, Template,
};

#[derive(Default)]
struct State {
    calls: Vec<String>,
    failures: HashMap<String, (u16, String)>,
    next_id: u32,
    datacenters: Vec<Datacenter>,
    lans: Vec<(String, Lan)>,
    servers: Vec<(String, Server)>,
    nats: Vec<(String, NatGateway)>,
    ip_blocks: Vec<IpBlock>,
    aliases: Vec<String>,
    images: Vec<Image>,
    templates: Vec<Template>,
    nic_ips: VecDeque<Vec<String>>,
    empty_ip_blocks: bool,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn server_mut(&mut self, datacenter_id: &str, server_id: &str) -> ApiResult<&mut Server> {
        self.servers
            .iter_mut()
            .find(|(dc, server)| dc == datacenter_id && server.id == server_id)
            .map(|(_, server)| server)
            .ok_or_else(|| missing("server", server_id))
    }
}

fn missing(kind: &str, id: &str) -> ApiError {
    ApiError::status(404, format!("resource is missing: {} {} not found", kind, id))
}

fn with_state<P, E>(mut resource: Resource<P, E>, state: &str) -> Resource<P, E> {
    resource.metadata = Some(ResourceMetadata {
        state: Some(state.to_string()),
    });
    resource
}

/// Cloud double that keeps resources in memory, records every call by
/// method name and fails selected methods on demand.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<State>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Record a call and return the state, or the injected failure.
    fn call(&self, op: &str) -> ApiResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(op.to_string());
        if let Some((status, message)) = state.failures.get(op) {
            return Err(ApiError::status(*status, message.clone()));
        }
        Ok(state)
    }

    /// Make every call to `op` fail with the given status
    pub fn fail(&self, op: &str, status: u16, message: &str) {
        self.lock()
            .failures
            .insert(op.to_string(), (status, message.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn add_alias(&self, alias: &str) {
        self.lock().aliases.push(alias.to_string());
    }

    pub fn add_image(&self, id: &str, name: &str, image_type: &str, location: &str) {
        let mut image = Image::new(ImageProperties {
            name: Some(name.to_string()),
            image_type: Some(image_type.to_string()),
            location: Some(location.to_string()),
        });
        image.id = id.to_string();
        self.lock().images.push(image);
    }

    pub fn add_template(&self, id: &str, name: &str) {
        let mut template = Template::new(TemplateProperties {
            name: Some(name.to_string()),
        });
        template.id = id.to_string();
        self.lock().templates.push(template);
    }

    pub fn add_datacenter(&self, name: &str, location: &str) -> String {
        let mut state = self.lock();
        let mut datacenter = Datacenter::new(DatacenterProperties {
            name: Some(name.to_string()),
            location: Some(location.to_string()),
            description: None,
        });
        datacenter.id = state.id("dc");
        state.datacenters.push(datacenter.clone());
        datacenter.id
    }

    pub fn add_lan(&self, datacenter_id: &str, name: &str, public: bool) -> String {
        insert_lan(&mut self.lock(), datacenter_id, name, public).id
    }

    pub fn add_nat(&self, datacenter_id: &str, name: &str, public_ips: &[&str], lans: &[i32]) -> String {
        let mut state = self.lock();
        let mut nat = NatGateway::new(NatGatewayProperties {
            name: Some(name.to_string()),
            public_ips: public_ips.iter().map(|ip| ip.to_string()).collect(),
            lans: lans
                .iter()
                .map(|&id| NatGatewayLan {
                    id,
                    gateway_ips: None,
                })
                .collect(),
        });
        nat.id = state.id("nat");
        state.nats.push((datacenter_id.to_string(), nat.clone()));
        nat.id
    }

    /// Successive `get_nic` calls report these IP lists, in order
    pub fn script_nic_ips(&self, script: Vec<Vec<&str>>) {
        self.lock().nic_ips = script
            .into_iter()
            .map(|ips| ips.into_iter().map(String::from).collect())
            .collect();
    }

    /// Reserved IP blocks come back without any addresses
    pub fn reserve_empty_ip_blocks(&self) {
        self.lock().empty_ip_blocks = true;
    }

    pub fn set_server_state(&self, server_id: &str, remote_state: &str) {
        let mut state = self.lock();
        if let Some((_, server)) = state.servers.iter_mut().find(|(_, s)| s.id == server_id) {
            server.metadata = Some(ResourceMetadata {
                state: Some(remote_state.to_string()),
            });
        }
    }

    pub fn datacenters(&self) -> Vec<Datacenter> {
        self.lock().datacenters.clone()
    }

    pub fn lans(&self, datacenter_id: &str) -> Vec<Lan> {
        self.lock()
            .lans
            .iter()
            .filter(|(dc, _)| dc == datacenter_id)
            .map(|(_, lan)| lan.clone())
            .collect()
    }

    pub fn servers(&self) -> Vec<Server> {
        self.lock().servers.iter().map(|(_, s)| s.clone()).collect()
    }

    pub fn nats(&self) -> Vec<NatGateway> {
        self.lock().nats.iter().map(|(_, n)| n.clone()).collect()
    }

    pub fn ip_blocks(&self) -> Vec<IpBlock> {
        self.lock().ip_blocks.clone()
    }
}

fn insert_lan(state: &mut State, datacenter_id: &str, name: &str, public: bool) -> Lan {
    let next = state.lans.iter().filter(|(dc, _)| dc == datacenter_id).count() + 1;
    let mut lan = with_state(
        Lan::new(LanProperties {
            name: Some(name.to_string()),
            public,
        }),
        "AVAILABLE",
    );
    lan.id = next.to_string();
    state.lans.push((datacenter_id.to_string(), lan.clone()));
    lan
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn create_ip_block(&self, size: u32, location: &str) -> ApiResult<IpBlock> {
        let mut state = self.call("create_ip_block")?;
        let offset = state.ip_blocks.len() as u32 * 10;
        let ips = if state.empty_ip_blocks {
            Vec::new()
        } else {
            (0..size)
                .map(|i| format!("203.0.113.{}", 10 + offset + i))
                .collect()
        };
        let mut block = IpBlock::new(IpBlockProperties {
            location: Some(location.to_string()),
            size,
            ips,
        });
        block.id = state.id("ipb");
        state.ip_blocks.push(block.clone());
        Ok(block)
    }

    async fn delete_ip_block(&self, ip_block_id: &str) -> ApiResult<()> {
        let mut state = self.call("delete_ip_block")?;
        let before = state.ip_blocks.len();
        state.ip_blocks.retain(|b| b.id != ip_block_id);
        if state.ip_blocks.len() == before {
            return Err(missing("ipblock", ip_block_id));
        }
        Ok(())
    }

    async fn list_datacenters(&self) -> ApiResult<Vec<Datacenter>> {
        Ok(self.call("list_datacenters")?.datacenters.clone())
    }

    async fn create_datacenter(&self, name: &str, location: &str) -> ApiResult<Datacenter> {
        let mut state = self.call("create_datacenter")?;
        let mut datacenter = with_state(
            Datacenter::new(DatacenterProperties {
                name: Some(name.to_string()),
                location: Some(location.to_string()),
                description: None,
            }),
            "AVAILABLE",
        );
        datacenter.id = state.id("dc");
        state.datacenters.push(datacenter.clone());
        Ok(datacenter)
    }

    async fn get_datacenter(&self, datacenter_id: &str) -> ApiResult<Datacenter> {
        self.call("get_datacenter")?
            .datacenters
            .iter()
            .find(|dc| dc.id == datacenter_id)
            .cloned()
            .ok_or_else(|| missing("datacenter", datacenter_id))
    }

    async fn delete_datacenter(&self, datacenter_id: &str) -> ApiResult<()> {
        let mut state = self.call("delete_datacenter")?;
        let before = state.datacenters.len();
        state.datacenters.retain(|dc| dc.id != datacenter_id);
        if state.datacenters.len() == before {
            return Err(missing("datacenter", datacenter_id));
        }
        Ok(())
    }

    async fn list_lans(&self, datacenter_id: &str) -> ApiResult<Vec<Lan>> {
        let state = self.call("list_lans")?;
        Ok(state
            .lans
            .iter()
            .filter(|(dc, _)| dc == datacenter_id)
            .map(|(_, lan)| lan.clone())
            .collect())
    }

    async fn create_lan(&self, datacenter_id: &str, name: &str, public: bool) -> ApiResult<Lan> {
        let mut state = self.call("create_lan")?;
        Ok(insert_lan(&mut state, datacenter_id, name, public))
    }

    async fn get_lan(&self, datacenter_id: &str, lan_id: &str) -> ApiResult<Lan> {
        self.call("get_lan")?
            .lans
            .iter()
            .find(|(dc, lan)| dc == datacenter_id && lan.id == lan_id)
            .map(|(_, lan)| lan.clone())
            .ok_or_else(|| missing("lan", lan_id))
    }

    async fn delete_lan(&self, datacenter_id: &str, lan_id: &str) -> ApiResult<()> {
        let mut state = self.call("delete_lan")?;
        let before = state.lans.len();
        state
            .lans
            .retain(|(dc, lan)| !(dc == datacenter_id && lan.id == lan_id));
        if state.lans.len() == before {
            return Err(missing("lan", lan_id));
        }
        Ok(())
    }

    async fn create_server(&self, datacenter_id: &str, server: &Server) -> ApiResult<Server> {
        let mut state = self.call("create_server")?;
        let mut created = with_state(server.clone(), "AVAILABLE");
        created.id = state.id("srv");

        if let Some(entities) = created.entities.as_mut() {
            for volume in entities.volumes.items.iter_mut() {
                volume.id = state.id("vol");
            }
            for nic in entities.nics.items.iter_mut() {
                nic.id = state.id("nic");
                if nic.properties.ips.is_none() {
                    nic.properties.ips = Some(vec![format!("10.7.0.{}", state.next_id)]);
                }
            }
        }

        state
            .servers
            .push((datacenter_id.to_string(), created.clone()));
        Ok(created)
    }

    async fn get_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Server> {
        let mut state = self.call("get_server")?;
        let server = state.server_mut(datacenter_id, server_id)?.clone();
        Ok(server)
    }

    async fn delete_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<()> {
        let mut state = self.call("delete_server")?;
        let before = state.servers.len();
        state
            .servers
            .retain(|(dc, s)| !(dc == datacenter_id && s.id == server_id));
        if state.servers.len() == before {
            return Err(missing("server", server_id));
        }
        Ok(())
    }

    async fn start_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<()> {
        let mut state = self.call("start_server")?;
        let server = state.server_mut(datacenter_id, server_id)?;
        *server = with_state(server.clone(), "AVAILABLE");
        Ok(())
    }

    async fn stop_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<()> {
        let mut state = self.call("stop_server")?;
        let server = state.server_mut(datacenter_id, server_id)?;
        *server = with_state(server.clone(), "SHUTOFF");
        Ok(())
    }

    async fn reboot_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<()> {
        let mut state = self.call("reboot_server")?;
        state.server_mut(datacenter_id, server_id)?;
        Ok(())
    }

    async fn delete_volume(&self, datacenter_id: &str, volume_id: &str) -> ApiResult<()> {
        let mut state = self.call("delete_volume")?;
        for (dc, server) in state.servers.iter_mut() {
            if dc != datacenter_id {
                continue;
            }
            if let Some(entities) = server.entities.as_mut() {
                let volumes = &mut entities.volumes.items;
                if let Some(pos) = volumes.iter().position(|v| v.id == volume_id) {
                    volumes.remove(pos);
                    return Ok(());
                }
            }
        }
        Err(missing("volume", volume_id))
    }

    async fn get_nic(&self, datacenter_id: &str, server_id: &str, nic_id: &str) -> ApiResult<Nic> {
        let mut state = self.call("get_nic")?;
        let scripted = state.nic_ips.pop_front();
        let server = state.server_mut(datacenter_id, server_id)?;
        let nic = server
            .entities
            .as_mut()
            .and_then(|e| e.nics.items.iter_mut().find(|n| n.id == nic_id))
            .ok_or_else(|| missing("nic", nic_id))?;

        if let Some(ips) = scripted {
            nic.properties.ips = Some(ips);
        }
        Ok(nic.clone())
    }

    async fn delete_nic(&self, datacenter_id: &str, server_id: &str, nic_id: &str) -> ApiResult<()> {
        let mut state = self.call("delete_nic")?;
        let server = state.server_mut(datacenter_id, server_id)?;
        let nics = server
            .entities
            .as_mut()
            .map(|e| &mut e.nics.items)
            .ok_or_else(|| missing("nic", nic_id))?;
        let pos = nics
            .iter()
            .position(|n| n.id == nic_id)
            .ok_or_else(|| missing("nic", nic_id))?;
        nics.remove(pos);
        Ok(())
    }

    async fn list_nat_gateways(&self, datacenter_id: &str) -> ApiResult<Vec<NatGateway>> {
        let state = self.call("list_nat_gateways")?;
        Ok(state
            .nats
            .iter()
            .filter(|(dc, _)| dc == datacenter_id)
            .map(|(_, nat)| nat.clone())
            .collect())
    }

    async fn create_nat_gateway(&self, datacenter_id: &str, nat: &NatGateway) -> ApiResult<NatGateway> {
        let mut state = self.call("create_nat_gateway")?;
        let mut created = with_state(nat.clone(), "AVAILABLE");
        created.id = state.id("nat");
        state.nats.push((datacenter_id.to_string(), created.clone()));
        Ok(created)
    }

    async fn get_nat_gateway(&self, datacenter_id: &str, nat_id: &str) -> ApiResult<NatGateway> {
        self.call("get_nat_gateway")?
            .nats
            .iter()
            .find(|(dc, nat)| dc == datacenter_id && nat.id == nat_id)
            .map(|(_, nat)| nat.clone())
            .ok_or_else(|| missing("nat", nat_id))
    }

    async fn patch_nat_gateway(
        &self,
        datacenter_id: &str,
        nat_id: &str,
        properties: &NatGatewayProperties,
    ) -> ApiResult<NatGateway> {
        let mut state = self.call("patch_nat_gateway")?;
        let (_, nat) = state
            .nats
            .iter_mut()
            .find(|(dc, nat)| dc == datacenter_id && nat.id == nat_id)
            .ok_or_else(|| missing("nat", nat_id))?;
        nat.properties = properties.clone();
        Ok(nat.clone())
    }

    async fn delete_nat_gateway(&self, datacenter_id: &str, nat_id: &str) -> ApiResult<()> {
        let mut state = self.call("delete_nat_gateway")?;
        let before = state.nats.len();
        state
            .nats
            .retain(|(dc, nat)| !(dc == datacenter_id && nat.id == nat_id));
        if state.nats.len() == before {
            return Err(missing("nat", nat_id));
        }
        Ok(())
    }

    async fn get_location(&self, region: &str, location: &str) -> ApiResult<Location> {
        let state = self.call("get_location")?;
        let mut found = Location::new(LocationProperties {
            name: Some(location.to_string()),
            image_aliases: state.aliases.clone(),
        });
        found.id = format!("{}/{}", region, location);
        Ok(found)
    }

    async fn list_images(&self) -> ApiResult<Vec<Image>> {
        Ok(self.call("list_images")?.images.clone())
    }

    async fn get_image(&self, image_id: &str) -> ApiResult<Image> {
        self.call("get_image")?
            .images
            .iter()
            .find(|image| image.id == image_id)
            .cloned()
            .ok_or_else(|| missing("image", image_id))
    }

    async fn list_templates(&self) -> ApiResult<Vec<Template>> {
        Ok(self.call("list_templates")?.templates.clone())
    }
}
