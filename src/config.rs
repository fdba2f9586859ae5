use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use clap::{ArgAction, Args};
use serde::{Deserialize, Serialize};

use crate::driver::machine::{DiskSpec, LanGateways, MachineSpec, NatIntent, NatSettings, ServerKind};
use crate::error::{DriverError, Result};
use crate::provider::ionos::DEFAULT_API_BASE;
use crate::provider::nat::{FlowLog, NatRuleSpec};
use crate::provider::{Credentials, IonosClient};

pub const DEFAULT_LOCATION: &str = "us/las";
pub const DEFAULT_IMAGE: &str = "ubuntu:20.04";
pub const DEFAULT_CORES: u32 = 4;
pub const DEFAULT_RAM: u32 = 2048;
pub const DEFAULT_DISK_SIZE: u32 = 50;
pub const DEFAULT_DISK_TYPE: &str = "HDD";
pub const DEFAULT_SERVER_TYPE: &str = "ENTERPRISE";
pub const DEFAULT_TEMPLATE: &str = "CUBES XS";
pub const DEFAULT_CPU_FAMILY: &str = "AMD_OPTERON";
pub const DEFAULT_AVAILABILITY_ZONE: &str = "AUTO";
pub const DEFAULT_SSH_USER: &str = "root";
pub const DEFAULT_DATACENTER_NAME: &str = "docker-machine-data-center";
pub const DEFAULT_LAN_NAME: &str = "docker-machine-lan";
pub const DEFAULT_NAT_NAME: &str = "docker-machine-nat";
pub const DEFAULT_IP_CHANGE_TIMEOUT_SECS: u64 = 600;

/// API endpoint and credentials.
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionConfig {
    /// IONOS Cloud API endpoint
    #[arg(long, env = "IONOSCLOUD_ENDPOINT", default_value = DEFAULT_API_BASE, global = true)]
    pub endpoint: String,

    /// IONOS Cloud username
    #[arg(long, env = "IONOSCLOUD_USERNAME", global = true)]
    pub username: Option<String>,

    /// IONOS Cloud password
    #[arg(long, env = "IONOSCLOUD_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// IONOS Cloud token (takes precedence over username/password)
    #[arg(long, env = "IONOSCLOUD_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,
}

impl ConnectionConfig {
    /// Pick the credentials to authenticate with.
    pub fn credentials(&self) -> Result<Credentials> {
        if let Some(token) = non_empty(&self.token) {
            return Ok(Credentials::Token(token.to_string()));
        }

        match (non_empty(&self.username), non_empty(&self.password)) {
            (Some(username), Some(password)) => Ok(Credentials::Basic {
                username: username.to_string(),
                password: password.to_string(),
            }),
            (None, None) => Err(DriverError::Config(
                "please provide username($IONOSCLOUD_USERNAME) and password($IONOSCLOUD_PASSWORD) or token($IONOSCLOUD_TOKEN) to authenticate".to_string(),
            )),
            (None, Some(_)) => Err(DriverError::Config(
                "please provide username as parameter --username or as environment variable $IONOSCLOUD_USERNAME".to_string(),
            )),
            (Some(_), None) => Err(DriverError::Config(
                "please provide password as parameter --password or as environment variable $IONOSCLOUD_PASSWORD".to_string(),
            )),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.credentials().map(|_| ())
    }

    /// Build an API client from this configuration
    pub fn client(&self) -> Result<IonosClient> {
        let endpoint = if self.endpoint.is_empty() {
            DEFAULT_API_BASE
        } else {
            self.endpoint.as_str()
        };
        Ok(IonosClient::with_base_url(self.credentials()?, endpoint)?)
    }
}

/// Everything that shapes the machine to create.
///
/// Compact string encodings (NAT rules, flow logs, LAN gateway map) are kept
/// as strings here and parsed by [`DriverConfig::machine_spec`].
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Location as region/location, e.g. us/las or de/fra
    #[arg(long, env = "IONOSCLOUD_LOCATION", default_value = DEFAULT_LOCATION)]
    pub location: String,

    /// Existing datacenter id to create the machine in
    #[arg(long, env = "IONOSCLOUD_DATACENTER_ID")]
    pub datacenter_id: Option<String>,

    /// Name of the datacenter to create or look up
    #[arg(long, env = "IONOSCLOUD_DATACENTER_NAME", default_value = DEFAULT_DATACENTER_NAME)]
    pub datacenter_name: String,

    /// Existing LAN id to attach the machine to
    #[arg(long, env = "IONOSCLOUD_LAN_ID")]
    pub lan_id: Option<String>,

    /// Name of the LAN to create or look up
    #[arg(long, env = "IONOSCLOUD_LAN_NAME", default_value = DEFAULT_LAN_NAME)]
    pub lan_name: String,

    /// Create the LAN as private (ignored when a LAN id is given)
    #[arg(long, env = "IONOSCLOUD_PRIVATE_LAN")]
    pub private_lan: bool,

    /// Image id, alias or name fragment
    #[arg(long, env = "IONOSCLOUD_IMAGE", default_value = DEFAULT_IMAGE)]
    pub image: String,

    /// Image password for console access
    #[arg(long, env = "IONOSCLOUD_IMAGE_PASSWORD", hide_env_values = true)]
    pub image_password: Option<String>,

    /// Server type: ENTERPRISE or CUBE
    #[arg(long, env = "IONOSCLOUD_SERVER_TYPE", default_value = DEFAULT_SERVER_TYPE)]
    pub server_type: String,

    /// CUBE template name
    #[arg(long, env = "IONOSCLOUD_TEMPLATE", default_value = DEFAULT_TEMPLATE)]
    pub template: String,

    #[arg(long, env = "IONOSCLOUD_CORES", default_value_t = DEFAULT_CORES)]
    pub cores: u32,

    /// RAM in MB
    #[arg(long, env = "IONOSCLOUD_RAM", default_value_t = DEFAULT_RAM)]
    pub ram: u32,

    #[arg(long, env = "IONOSCLOUD_CPU_FAMILY", default_value = DEFAULT_CPU_FAMILY)]
    pub cpu_family: String,

    #[arg(long, env = "IONOSCLOUD_SERVER_AVAILABILITY_ZONE", default_value = DEFAULT_AVAILABILITY_ZONE)]
    pub server_availability_zone: String,

    /// Disk size in GB
    #[arg(long, env = "IONOSCLOUD_DISK_SIZE", default_value_t = DEFAULT_DISK_SIZE)]
    pub disk_size: u32,

    /// Disk type: HDD or SSD
    #[arg(long, env = "IONOSCLOUD_DISK_TYPE", default_value = DEFAULT_DISK_TYPE)]
    pub disk_type: String,

    #[arg(long, env = "IONOSCLOUD_VOLUME_AVAILABILITY_ZONE", default_value = DEFAULT_AVAILABILITY_ZONE)]
    pub volume_availability_zone: String,

    /// Cloud-init document
    #[arg(long, env = "IONOSCLOUD_USER_DATA")]
    pub user_data: Option<String>,

    /// Base64 encoded cloud-init document, wins over --user-data
    #[arg(long, env = "IONOSCLOUD_USER_DATA_B64")]
    pub user_data_b64: Option<String>,

    #[arg(long, env = "IONOSCLOUD_SSH_USER", default_value = DEFAULT_SSH_USER)]
    pub ssh_user: String,

    /// Private key to use; generated when missing
    #[arg(long, env = "IONOSCLOUD_SSH_KEY_PATH")]
    pub ssh_key_path: Option<String>,

    /// Deliver the SSH key through cloud-init instead of the volume
    #[arg(long, env = "IONOSCLOUD_SSH_IN_CLOUD_INIT")]
    pub ssh_in_cloud_init: bool,

    /// Static IPs for the primary NIC
    #[arg(long, env = "IONOSCLOUD_NIC_IPS", value_delimiter = ',')]
    pub nic_ips: Vec<String>,

    #[arg(long, env = "IONOSCLOUD_NIC_DHCP", default_value_t = true, action = ArgAction::Set)]
    pub nic_dhcp: bool,

    /// Extra LANs, by id or name, to attach a DHCP NIC to
    #[arg(long, env = "IONOSCLOUD_ADDITIONAL_LANS", value_delimiter = ',')]
    pub additional_lans: Vec<String>,

    /// Wait until the primary NIC's IP changed after creation
    #[arg(long, env = "IONOSCLOUD_WAIT_FOR_IP_CHANGE")]
    pub wait_for_ip_change: bool,

    /// Seconds to wait for the IP change
    #[arg(long, env = "IONOSCLOUD_WAIT_FOR_IP_CHANGE_TIMEOUT", default_value_t = DEFAULT_IP_CHANGE_TIMEOUT_SECS)]
    pub wait_for_ip_change_timeout: u64,

    /// Create a NAT gateway for the machine (requires a private LAN)
    #[arg(long, env = "IONOSCLOUD_CREATE_NAT")]
    pub create_nat: bool,

    /// Existing NAT gateway to attach the machine's LAN to
    #[arg(long, env = "IONOSCLOUD_NAT_ID")]
    pub nat_id: Option<String>,

    #[arg(long, env = "IONOSCLOUD_NAT_NAME", default_value = DEFAULT_NAT_NAME)]
    pub nat_name: String,

    #[arg(long, env = "IONOSCLOUD_NAT_PUBLIC_IPS", value_delimiter = ',')]
    pub nat_public_ips: Vec<String>,

    /// LANs and their gateway IPs, e.g. "1=10.0.0.1,10.0.0.2:2=10.0.0.10"
    #[arg(long, env = "IONOSCLOUD_NAT_LANS_TO_GATEWAYS")]
    pub nat_lans_to_gateways: Option<String>,

    /// Custom rule name:type:protocol:publicIp:sourceSubnet:targetSubnet:portStart:portEnd
    #[arg(long = "nat-rule", env = "IONOSCLOUD_NAT_RULES", value_delimiter = ',')]
    pub nat_rules: Vec<String>,

    /// Flow log name:action:direction:bucket
    #[arg(long = "nat-flowlog", env = "IONOSCLOUD_NAT_FLOWLOGS", value_delimiter = ',')]
    pub nat_flowlogs: Vec<String>,

    #[arg(long, env = "IONOSCLOUD_SKIP_DEFAULT_NAT_RULES")]
    pub skip_default_nat_rules: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            location: DEFAULT_LOCATION.to_string(),
            datacenter_id: None,
            datacenter_name: DEFAULT_DATACENTER_NAME.to_string(),
            lan_id: None,
            lan_name: DEFAULT_LAN_NAME.to_string(),
            private_lan: false,
            image: DEFAULT_IMAGE.to_string(),
            image_password: None,
            server_type: DEFAULT_SERVER_TYPE.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
            cores: DEFAULT_CORES,
            ram: DEFAULT_RAM,
            cpu_family: DEFAULT_CPU_FAMILY.to_string(),
            server_availability_zone: DEFAULT_AVAILABILITY_ZONE.to_string(),
            disk_size: DEFAULT_DISK_SIZE,
            disk_type: DEFAULT_DISK_TYPE.to_string(),
            volume_availability_zone: DEFAULT_AVAILABILITY_ZONE.to_string(),
            user_data: None,
            user_data_b64: None,
            ssh_user: DEFAULT_SSH_USER.to_string(),
            ssh_key_path: None,
            ssh_in_cloud_init: false,
            nic_ips: Vec::new(),
            nic_dhcp: true,
            additional_lans: Vec::new(),
            wait_for_ip_change: false,
            wait_for_ip_change_timeout: DEFAULT_IP_CHANGE_TIMEOUT_SECS,
            create_nat: false,
            nat_id: None,
            nat_name: DEFAULT_NAT_NAME.to_string(),
            nat_public_ips: Vec::new(),
            nat_lans_to_gateways: None,
            nat_rules: Vec::new(),
            nat_flowlogs: Vec::new(),
            skip_default_nat_rules: false,
        }
    }
}

impl DriverConfig {
    /// Load a machine configuration from a YAML file; missing keys take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DriverError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        serde_yaml::from_str(&content)
            .map_err(|e| DriverError::Config(format!("Invalid config: {}", e)))
    }

    /// Offline checks that need no API access.
    pub fn validate(&self) -> Result<()> {
        if self.create_nat && non_empty(&self.nat_id).is_some() {
            return Err(DriverError::Config(
                "trying to create a NAT while also using an existing NAT. Please set only one of: (--nat-id | --create-nat), or try a different NAT name".to_string(),
            ));
        }

        if self.location.split('/').count() != 2 {
            return Err(DriverError::Config(format!(
                "location '{}' must have the form region/location",
                self.location
            )));
        }

        Ok(())
    }

    /// Resolve the user data, preferring the base64 variant when it decodes to text.
    pub fn resolved_user_data(&self) -> String {
        if let Some(encoded) = non_empty(&self.user_data_b64) {
            match base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
                Ok(bytes) => {
                    let decoded = String::from_utf8_lossy(&bytes).into_owned();
                    if !decoded.is_empty() {
                        return decoded;
                    }
                }
                Err(e) => tracing::warn!("Ignoring undecodable base64 user data: {}", e),
            }
        }

        self.user_data.clone().unwrap_or_default()
    }

    /// Build the immutable description of one machine.
    pub fn machine_spec(&self, name: &str, default_key_path: &Path) -> Result<MachineSpec> {
        self.validate()?;

        let server = match self.server_type.to_uppercase().as_str() {
            "ENTERPRISE" => ServerKind::Enterprise {
                cores: self.cores,
                ram: self.ram,
                cpu_family: self.cpu_family.clone(),
                availability_zone: self.server_availability_zone.clone(),
            },
            "CUBE" => ServerKind::Cube {
                template: self.template.clone(),
            },
            other => {
                return Err(DriverError::Config(format!(
                    "unknown server type '{}', expected ENTERPRISE or CUBE",
                    other
                )))
            }
        };

        let nat = if self.create_nat {
            NatIntent::Create(NatSettings {
                name: self.nat_name.clone(),
                public_ips: self.nat_public_ips.clone(),
                lans_to_gateways: self
                    .nat_lans_to_gateways
                    .as_deref()
                    .map(parse_lan_gateways)
                    .transpose()?
                    .flatten(),
                rules: self
                    .nat_rules
                    .iter()
                    .map(|rule| rule.parse::<NatRuleSpec>())
                    .collect::<std::result::Result<_, _>>()?,
                flowlogs: self
                    .nat_flowlogs
                    .iter()
                    .map(|flowlog| flowlog.parse::<FlowLog>())
                    .collect::<std::result::Result<_, _>>()?,
                skip_default_rules: self.skip_default_nat_rules,
            })
        } else if let Some(nat_id) = non_empty(&self.nat_id) {
            NatIntent::Attach {
                nat_id: nat_id.to_string(),
                name: self.nat_name.clone(),
            }
        } else {
            NatIntent::None
        };

        let (additional_lans, additional_lan_names) = split_lan_refs(&self.additional_lans);

        let ssh_key_path = match non_empty(&self.ssh_key_path) {
            Some(path) => PathBuf::from(shellexpand::tilde(path).as_ref()),
            None => default_key_path.to_path_buf(),
        };

        Ok(MachineSpec {
            name: name.to_string(),
            location: self.location.clone(),
            datacenter_id: non_empty(&self.datacenter_id).map(String::from),
            datacenter_name: self.datacenter_name.clone(),
            lan_id: non_empty(&self.lan_id).map(String::from),
            lan_name: self.lan_name.clone(),
            private_lan: self.private_lan,
            image: self.image.clone(),
            image_password: non_empty(&self.image_password).map(String::from),
            disk: DiskSpec {
                size: self.disk_size,
                disk_type: self.disk_type.clone(),
                availability_zone: self.volume_availability_zone.clone(),
            },
            server,
            user_data: self.resolved_user_data(),
            ssh_user: self.ssh_user.clone(),
            ssh_key_path,
            ssh_in_cloud_init: self.ssh_in_cloud_init,
            nic_ips: self.nic_ips.clone(),
            nic_dhcp: self.nic_dhcp,
            additional_lans,
            additional_lan_names,
            ip_change_timeout: self
                .wait_for_ip_change
                .then(|| Duration::from_secs(self.wait_for_ip_change_timeout)),
            nat,
        })
    }
}

/// Numeric entries are LAN ids, anything else is a LAN name.
fn split_lan_refs(refs: &[String]) -> (Vec<i32>, Vec<String>) {
    let mut ids = Vec::new();
    let mut names = Vec::new();
    for lan in refs.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
        match lan.parse::<i32>() {
            Ok(id) => ids.push(id),
            Err(_) => names.push(lan.to_string()),
        }
    }
    (ids, names)
}

/// Parse `"1=10.0.0.1,10.0.0.2:2=10.0.0.10"` into a LAN to gateway IP map.
///
/// A LAN without `=` maps to no gateway IPs, letting the API pick one.
/// Entries with more than one `=` are skipped. An empty string means no map.
pub fn parse_lan_gateways(value: &str) -> Result<Option<LanGateways>> {
    if value.is_empty() {
        return Ok(None);
    }

    let mut lans = BTreeMap::new();
    for entry in value.split(':') {
        let parts: Vec<&str> = entry.split('=').collect();
        let (lan, ips) = match parts[..] {
            [lan] => (lan, Vec::new()),
            [lan, ips] => (
                lan,
                ips.split(',')
                    .filter(|ip| !ip.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            _ => {
                tracing::warn!("Skipping malformed NAT LAN entry '{}'", entry);
                continue;
            }
        };

        let lan_id: i32 = lan.trim().parse().map_err(|_| {
            DriverError::Config(format!("invalid LAN id '{}' in NAT LAN map", lan))
        })?;
        lans.insert(lan_id, ips);
    }

    Ok(Some(lans))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
