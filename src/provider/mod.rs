//! Cloud resource client layer.
//!
//! The orchestrators in [`crate::driver`] only ever talk to the cloud through
//! the [`CloudApi`] capability trait. [`ionos::IonosClient`] implements it on
//! top of the REST API; tests substitute an in-memory fake.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │     Driver      │  ← Provisioning / teardown orchestrators
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  dyn CloudApi   │  ← One method per resource operation
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐      ┌──────────────┐
//! │   IonosClient   │ ───▶ │    waiter    │  ← Polls request status
//! └─────────────────┘      └──────────────┘
//! ```
//!
//! Every create and delete call returns only after the remote request
//! reached `DONE`, so callers can treat them as synchronous.

pub mod error;
pub mod ionos;
pub mod models;
pub mod nat;
pub mod status;
pub mod waiter;

use async_trait::async_trait;

pub use error::{ApiError, ApiResult};
pub use ionos::{Credentials, IonosClient};
pub use models::{
    Datacenter, Image, IpBlock, Lan, Location, NatGateway, NatGatewayProperties, Nic, Server,
    Template,
};

/// Capability set of the cloud API used by the driver.
///
/// Implementations must sanitize status codes into [`ApiError`] and must not
/// return from a create or delete call before the remote operation completed.
#[async_trait]
pub trait CloudApi: Send + Sync {
    // IP blocks

    /// Reserve `size` public addresses in `location`
    async fn create_ip_block(&self, size: u32, location: &str) -> ApiResult<IpBlock>;

    async fn delete_ip_block(&self, ip_block_id: &str) -> ApiResult<()>;

    // Datacenters

    async fn list_datacenters(&self) -> ApiResult<Vec<Datacenter>>;

    async fn create_datacenter(&self, name: &str, location: &str) -> ApiResult<Datacenter>;

    async fn get_datacenter(&self, datacenter_id: &str) -> ApiResult<Datacenter>;

    async fn delete_datacenter(&self, datacenter_id: &str) -> ApiResult<()>;

    // LANs

    async fn list_lans(&self, datacenter_id: &str) -> ApiResult<Vec<Lan>>;

    async fn create_lan(&self, datacenter_id: &str, name: &str, public: bool) -> ApiResult<Lan>;

    async fn get_lan(&self, datacenter_id: &str, lan_id: &str) -> ApiResult<Lan>;

    async fn delete_lan(&self, datacenter_id: &str, lan_id: &str) -> ApiResult<()>;

    // Servers

    /// Create a server together with its nested volumes and NICs
    async fn create_server(&self, datacenter_id: &str, server: &Server) -> ApiResult<Server>;

    /// Fetch a server including its volumes and NICs
    async fn get_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Server>;

    async fn delete_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<()>;

    async fn start_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<()>;

    async fn stop_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<()>;

    async fn reboot_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<()>;

    // Volumes and NICs

    async fn delete_volume(&self, datacenter_id: &str, volume_id: &str) -> ApiResult<()>;

    async fn get_nic(&self, datacenter_id: &str, server_id: &str, nic_id: &str) -> ApiResult<Nic>;

    async fn delete_nic(&self, datacenter_id: &str, server_id: &str, nic_id: &str)
        -> ApiResult<()>;

    // NAT gateways

    async fn list_nat_gateways(&self, datacenter_id: &str) -> ApiResult<Vec<NatGateway>>;

    async fn create_nat_gateway(
        &self,
        datacenter_id: &str,
        nat: &NatGateway,
    ) -> ApiResult<NatGateway>;

    async fn get_nat_gateway(&self, datacenter_id: &str, nat_id: &str) -> ApiResult<NatGateway>;

    /// Replace name, public IPs and LANs of an existing gateway
    async fn patch_nat_gateway(
        &self,
        datacenter_id: &str,
        nat_id: &str,
        properties: &NatGatewayProperties,
    ) -> ApiResult<NatGateway>;

    async fn delete_nat_gateway(&self, datacenter_id: &str, nat_id: &str) -> ApiResult<()>;

    // Catalogue

    /// Location by `region` and `location` ids, e.g. `us` and `las`
    async fn get_location(&self, region: &str, location: &str) -> ApiResult<Location>;

    async fn list_images(&self) -> ApiResult<Vec<Image>>;

    async fn get_image(&self, image_id: &str) -> ApiResult<Image>;

    async fn list_templates(&self) -> ApiResult<Vec<Template>>;
}
