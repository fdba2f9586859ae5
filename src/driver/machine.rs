use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};
use crate::provider::nat::{FlowLog, NatRuleSpec};

/// LAN id to gateway IPs. An empty list lets the API pick the gateway address.
pub type LanGateways = BTreeMap<i32, Vec<String>>;

#[derive(Debug, Clone, PartialEq)]
pub enum ServerKind {
    Enterprise {
        cores: u32,
        ram: u32,
        cpu_family: String,
        availability_zone: String,
    },
    /// Fixed-size server picked by template name
    Cube { template: String },
}

impl ServerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Enterprise { .. } => "ENTERPRISE",
            ServerKind::Cube { .. } => "CUBE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskSpec {
    /// Size in GB
    pub size: u32,
    pub disk_type: String,
    pub availability_zone: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NatSettings {
    pub name: String,
    /// Empty means "use the reserved IP block"
    pub public_ips: Vec<String>,
    pub lans_to_gateways: Option<LanGateways>,
    pub rules: Vec<NatRuleSpec>,
    pub flowlogs: Vec<FlowLog>,
    pub skip_default_rules: bool,
}

/// What to do about a NAT gateway for this machine.
#[derive(Debug, Clone, PartialEq)]
pub enum NatIntent {
    None,
    Create(NatSettings),
    /// Attach the machine's LAN to an existing gateway
    Attach { nat_id: String, name: String },
}

/// Immutable description of the machine to provision.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineSpec {
    pub name: String,
    /// `region/location`, e.g. `us/las`
    pub location: String,
    pub datacenter_id: Option<String>,
    pub datacenter_name: String,
    pub lan_id: Option<String>,
    pub lan_name: String,
    pub private_lan: bool,
    pub image: String,
    pub image_password: Option<String>,
    pub disk: DiskSpec,
    pub server: ServerKind,
    /// Raw cloud-init document, possibly empty
    pub user_data: String,
    pub ssh_user: String,
    pub ssh_key_path: PathBuf,
    pub ssh_in_cloud_init: bool,
    pub nic_ips: Vec<String>,
    pub nic_dhcp: bool,
    pub additional_lans: Vec<i32>,
    /// Additional LANs given by name; the pre-create check turns them into ids
    pub additional_lan_names: Vec<String>,
    /// Wait for the primary NIC's IP to change, at most this long
    pub ip_change_timeout: Option<Duration>,
    pub nat: NatIntent,
}

impl MachineSpec {
    /// Whether a public IP block has to be reserved before the server is built.
    pub fn needs_ip_block(&self, lan_private: bool) -> bool {
        let for_nic = !lan_private && self.nic_ips.is_empty();
        let for_nat = matches!(&self.nat, NatIntent::Create(nat) if nat.public_ips.is_empty());
        for_nic || for_nat
    }

    pub fn uses_nat(&self) -> bool {
        !matches!(self.nat, NatIntent::None)
    }
}

/// Everything the driver created or adopted for one machine.
///
/// Filled step by step during creation and persisted between invocations;
/// teardown only needs the ids recorded here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineRecord {
    pub name: String,
    pub ssh_user: String,
    pub ssh_key_path: String,
    pub created_at: Option<DateTime<Utc>>,

    pub datacenter_id: String,
    pub lan_id: String,
    pub lan_private: bool,
    pub server_id: String,
    pub volume_id: String,
    pub nic_id: String,
    pub additional_nic_ids: Vec<String>,
    pub ip_block_id: String,
    pub reserved_ips: Vec<String>,
    pub nat_id: String,
    /// The NAT gateway was created for this machine and is removed with it
    pub nat_created: bool,
    /// LANs that did not exist and were created for the NAT gateway
    pub nat_lan_ids: Vec<String>,
    pub ip_address: String,

    /// Looked up rather than created; teardown leaves it alone
    pub datacenter_preexisting: bool,
    pub lan_preexisting: bool,
    pub using_image_alias: bool,
}

impl MachineRecord {
    pub fn new(spec: &MachineSpec) -> Self {
        Self {
            name: spec.name.clone(),
            ssh_user: spec.ssh_user.clone(),
            ssh_key_path: spec.ssh_key_path.display().to_string(),
            created_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Address the machine is reachable at, known once creation finished
    pub fn ip(&self) -> Result<&str> {
        if self.ip_address.is_empty() {
            return Err(DriverError::Machine("IP address is not set".to_string()));
        }
        Ok(&self.ip_address)
    }
}
