//! Request and response models for the cloud REST API.
//!
//! Every resource shares the same envelope: an `id`, server-side `metadata`,
//! user `properties` and optional nested `entities`.

use serde::{Deserialize, Serialize};

/// Generic resource envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource<P, E = NoEntities> {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing)]
    pub metadata: Option<ResourceMetadata>,

    #[serde(default)]
    pub properties: P,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<E>,
}

impl<P, E> Resource<P, E> {
    /// Wrap properties for a create request
    pub fn new(properties: P) -> Self {
        Self {
            id: String::new(),
            metadata: None,
            properties,
            entities: None,
        }
    }

    /// Lifecycle state reported by the API (`AVAILABLE`, `SHUTOFF`, ...)
    pub fn state(&self) -> Option<&str> {
        self.metadata.as_ref()?.state.as_deref()
    }
}

/// Placeholder for resources without nested entities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoEntities {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    #[serde(default)]
    pub state: Option<String>,
}

/// List response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Collection<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> From<Vec<T>> for Collection<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

// Datacenters

pub type Datacenter = Resource<DatacenterProperties>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatacenterProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// LANs

pub type Lan = Resource<LanProperties>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub public: bool,
}

// IP blocks

pub type IpBlock = Resource<IpBlockProperties>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpBlockProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub size: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<String>,
}

// Servers

pub type Server = Resource<ServerProperties, ServerEntities>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub server_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_uuid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEntities {
    #[serde(default)]
    pub volumes: Collection<Volume>,
    #[serde(default)]
    pub nics: Collection<Nic>,
}

// Volumes

pub type Volume = Resource<VolumeProperties>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
}

// NICs

pub type Nic = Resource<NicProperties>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NicProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub lan: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ips: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp: Option<bool>,
}

impl Nic {
    /// First address attached to the NIC, if any
    pub fn first_ip(&self) -> Option<&str> {
        self.properties
            .ips
            .as_ref()
            .and_then(|ips| ips.first())
            .map(String::as_str)
    }
}

// NAT gateways

pub type NatGateway = Resource<NatGatewayProperties, NatGatewayEntities>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NatGatewayProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub public_ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lans: Vec<NatGatewayLan>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NatGatewayLan {
    pub id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_ips: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NatGatewayEntities {
    #[serde(default, skip_serializing_if = "Collection::is_empty")]
    pub rules: Collection<Resource<NatGatewayRuleProperties>>,
    #[serde(default, skip_serializing_if = "Collection::is_empty")]
    pub flowlogs: Collection<Resource<FlowLogProperties>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NatGatewayRuleProperties {
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub protocol: String,
    pub source_subnet: String,
    pub public_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_subnet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port_range: Option<TargetPortRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPortRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowLogProperties {
    pub name: String,
    pub action: String,
    pub direction: String,
    pub bucket: String,
}

// Locations, images and templates

pub type Location = Resource<LocationProperties>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationProperties {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_aliases: Vec<String>,
}

pub type Image = Resource<ImageProperties>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProperties {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_type: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

pub type Template = Resource<TemplateProperties>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateProperties {
    #[serde(default)]
    pub name: Option<String>,
}

// Request status

/// Terminal and intermediate states of an async request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestState {
    Queued,
    Running,
    Done,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStatus {
    pub metadata: RequestMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub status: RequestState,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_depth_two_deserializes() {
        let body = json!({
            "id": "srv-1",
            "metadata": {"state": "AVAILABLE"},
            "properties": {"name": "m1", "cores": 2, "ram": 2048, "vmState": "RUNNING", "type": "ENTERPRISE"},
            "entities": {
                "volumes": {"items": [{"id": "vol-1", "properties": {"name": "m1", "size": 50.0}}]},
                "nics": {"items": [
                    {"id": "nic-1", "properties": {"name": "m1", "lan": 1, "ips": ["1.2.3.4"], "dhcp": true}},
                    {"id": "nic-2", "properties": {"name": "m1 2", "lan": 2}}
                ]}
            }
        });

        let server: Server = serde_json::from_value(body).unwrap();
        let entities = server.entities.as_ref().unwrap();

        assert_eq!(server.id, "srv-1");
        assert_eq!(server.state(), Some("AVAILABLE"));
        assert_eq!(entities.volumes.items[0].id, "vol-1");
        assert_eq!(entities.nics.items.len(), 2);
        assert_eq!(entities.nics.items[0].first_ip(), Some("1.2.3.4"));
        assert_eq!(entities.nics.items[1].first_ip(), None);
    }

    #[test]
    fn test_create_body_skips_empty_fields() {
        let lan = Lan::new(LanProperties {
            name: Some("docker-machine-lan".to_string()),
            public: true,
        });

        let body = serde_json::to_value(&lan).unwrap();
        assert_eq!(
            body,
            json!({"properties": {"name": "docker-machine-lan", "public": true}})
        );
    }

    #[test]
    fn test_volume_serializes_camel_case() {
        let volume = Volume::new(VolumeProperties {
            volume_type: Some("HDD".to_string()),
            image_alias: Some("ubuntu:20.04".to_string()),
            user_data: Some("I2Nsb3VkLWNvbmZpZw==".to_string()),
            ..Default::default()
        });

        let body = serde_json::to_value(&volume).unwrap();
        assert_eq!(body["properties"]["type"], "HDD");
        assert_eq!(body["properties"]["imageAlias"], "ubuntu:20.04");
        assert_eq!(body["properties"]["userData"], "I2Nsb3VkLWNvbmZpZw==");
        assert!(body["properties"].get("imagePassword").is_none());
    }

    #[test]
    fn test_nat_rules_wrapped_in_items() {
        let nat = NatGateway {
            id: String::new(),
            metadata: None,
            properties: NatGatewayProperties {
                name: Some("docker-machine-nat".to_string()),
                public_ips: vec!["1.2.3.4".to_string()],
                lans: vec![NatGatewayLan {
                    id: 1,
                    gateway_ips: None,
                }],
            },
            entities: Some(NatGatewayEntities {
                rules: vec![Resource::new(NatGatewayRuleProperties {
                    name: "ALL: Docker Machine NAT Rule".to_string(),
                    rule_type: "SNAT".to_string(),
                    protocol: "ALL".to_string(),
                    source_subnet: "10.0.0.0/24".to_string(),
                    public_ip: "1.2.3.4".to_string(),
                    target_subnet: None,
                    target_port_range: None,
                })]
                .into(),
                flowlogs: Collection::default(),
            }),
        };

        let body = serde_json::to_value(&nat).unwrap();
        assert_eq!(
            body["entities"]["rules"]["items"][0]["properties"]["type"],
            "SNAT"
        );
        assert!(body["entities"].get("flowlogs").is_none());
        assert_eq!(body["properties"]["lans"][0], json!({"id": 1}));
    }

    #[test]
    fn test_request_status_unknown_state() {
        let status: RequestStatus =
            serde_json::from_value(json!({"metadata": {"status": "PAUSED"}})).unwrap();
        assert_eq!(status.metadata.status, RequestState::Unknown);

        let status: RequestStatus = serde_json::from_value(
            json!({"metadata": {"status": "FAILED", "message": "no capacity"}}),
        )
        .unwrap();
        assert_eq!(status.metadata.status, RequestState::Failed);
        assert_eq!(status.metadata.message.as_deref(), Some("no capacity"));
    }
}
