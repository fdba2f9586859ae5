use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::ApiResult;
use super::models::{
    Collection, Datacenter, DatacenterProperties, Image, IpBlock, IpBlockProperties, Lan,
    LanProperties, Location, NatGateway, NatGatewayProperties, Nic, RequestStatus, Server,
    Template,
};
use super::status::{sanitize_response, shorten_error_body, status_error, StatusMessages};
use super::waiter::{await_completion, RequestStatusSource, WaitPolicy};
use super::CloudApi;

pub const DEFAULT_API_BASE: &str = "https://api.ionos.com/cloudapi/v6";

const USER_AGENT: &str = concat!("ionoscloud-machine/", env!("CARGO_PKG_VERSION"));

/// How requests authenticate against the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Token(String),
    Basic { username: String, password: String },
}

/// REST client for the IONOS Cloud API.
#[derive(Debug)]
pub struct IonosClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    wait: WaitPolicy,
}

impl IonosClient {
    pub fn new(credentials: Credentials) -> ApiResult<Self> {
        Self::with_base_url(credentials, DEFAULT_API_BASE)
    }

    pub fn with_base_url(credentials: Credentials, base_url: &str) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            wait: WaitPolicy::default(),
        })
    }

    /// Override how long create and delete calls wait for completion
    pub fn with_wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    fn auth_header(&self) -> String {
        match &self.credentials {
            Credentials::Token(token) => format!("Bearer {}", token),
            Credentials::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                format!("Basic {}", encoded)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", self.auth_header())
    }

    /// Send a request and turn failure status codes into [`ApiError::Status`].
    async fn send(&self, request: RequestBuilder, messages: &StatusMessages) -> ApiResult<Response> {
        let response = request.send().await?;
        let status = response.status().as_u16();

        if status < 300 {
            sanitize_response(status, "", messages)?;
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &shorten_error_body(&body), messages))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        depth: Option<u8>,
        messages: &StatusMessages,
    ) -> ApiResult<T> {
        let mut request = self.request(Method::GET, path);
        if let Some(depth) = depth {
            request = request.query(&[("depth", depth)]);
        }

        let response = self.send(request, messages).await?;
        Ok(response.json().await?)
    }

    async fn list<T: DeserializeOwned>(&self, path: &str) -> ApiResult<Vec<T>> {
        let collection: Collection<T> = self
            .get_json(path, Some(1), &StatusMessages::default())
            .await?;
        Ok(collection.items)
    }

    /// Submit a mutating request whose response carries a body, then wait for it.
    async fn mutate<B, T>(&self, method: Method, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self.request(method, path).json(body);
        let response = self.send(request, &StatusMessages::default()).await?;
        let location = location_header(&response);
        let created: T = response.json().await?;

        await_completion(self, &location, self.wait).await?;
        Ok(created)
    }

    /// Delete a resource and wait until the removal completed.
    async fn remove(&self, path: &str, messages: &StatusMessages) -> ApiResult<()> {
        let response = self.send(self.request(Method::DELETE, path), messages).await?;
        let location = location_header(&response);

        await_completion(self, &location, self.wait).await
    }

    /// Fire a server action; these are not awaited.
    async fn action(&self, datacenter_id: &str, server_id: &str, action: &str) -> ApiResult<()> {
        let path = format!(
            "/datacenters/{}/servers/{}/{}",
            datacenter_id, server_id, action
        );
        self.send(self.request(Method::POST, &path), &StatusMessages::default())
            .await?;
        Ok(())
    }
}

fn location_header(response: &Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn datacenter_messages() -> StatusMessages {
    StatusMessages::default().with(404, "provided UUID does not match any datacenter")
}

fn datacenter_delete_messages() -> StatusMessages {
    StatusMessages::default().with(405, "please delete the datacenter manually")
}

#[async_trait]
impl RequestStatusSource for IonosClient {
    async fn request_status(&self, request_id: &str) -> ApiResult<RequestStatus> {
        self.get_json(
            &format!("/requests/{}/status", request_id),
            None,
            &StatusMessages::default(),
        )
        .await
    }
}

#[async_trait]
impl CloudApi for IonosClient {
    async fn create_ip_block(&self, size: u32, location: &str) -> ApiResult<IpBlock> {
        let body = IpBlock::new(IpBlockProperties {
            location: Some(location.to_string()),
            size,
            ips: Vec::new(),
        });
        let ip_block: IpBlock = self.mutate(Method::POST, "/ipblocks", &body).await?;
        tracing::info!("IP block reserved");
        Ok(ip_block)
    }

    async fn delete_ip_block(&self, ip_block_id: &str) -> ApiResult<()> {
        self.remove(
            &format!("/ipblocks/{}", ip_block_id),
            &StatusMessages::default(),
        )
        .await?;
        tracing::info!("IP block deleted");
        Ok(())
    }

    async fn list_datacenters(&self) -> ApiResult<Vec<Datacenter>> {
        self.list("/datacenters").await
    }

    async fn create_datacenter(&self, name: &str, location: &str) -> ApiResult<Datacenter> {
        let body = Datacenter::new(DatacenterProperties {
            name: Some(name.to_string()),
            location: Some(location.to_string()),
            description: None,
        });
        let datacenter: Datacenter = self.mutate(Method::POST, "/datacenters", &body).await?;
        tracing::info!("Datacenter created");
        Ok(datacenter)
    }

    async fn get_datacenter(&self, datacenter_id: &str) -> ApiResult<Datacenter> {
        self.get_json(
            &format!("/datacenters/{}", datacenter_id),
            None,
            &datacenter_messages(),
        )
        .await
    }

    async fn delete_datacenter(&self, datacenter_id: &str) -> ApiResult<()> {
        self.remove(
            &format!("/datacenters/{}", datacenter_id),
            &datacenter_delete_messages(),
        )
        .await?;
        tracing::info!("Datacenter deleted");
        Ok(())
    }

    async fn list_lans(&self, datacenter_id: &str) -> ApiResult<Vec<Lan>> {
        self.list(&format!("/datacenters/{}/lans", datacenter_id))
            .await
    }

    async fn create_lan(&self, datacenter_id: &str, name: &str, public: bool) -> ApiResult<Lan> {
        let body = Lan::new(LanProperties {
            name: Some(name.to_string()),
            public,
        });
        let lan: Lan = self
            .mutate(
                Method::POST,
                &format!("/datacenters/{}/lans", datacenter_id),
                &body,
            )
            .await?;
        tracing::info!("LAN created");
        Ok(lan)
    }

    async fn get_lan(&self, datacenter_id: &str, lan_id: &str) -> ApiResult<Lan> {
        self.get_json(
            &format!("/datacenters/{}/lans/{}", datacenter_id, lan_id),
            None,
            &StatusMessages::default(),
        )
        .await
    }

    async fn delete_lan(&self, datacenter_id: &str, lan_id: &str) -> ApiResult<()> {
        self.remove(
            &format!("/datacenters/{}/lans/{}", datacenter_id, lan_id),
            &StatusMessages::default(),
        )
        .await?;
        tracing::info!("LAN deleted");
        Ok(())
    }

    async fn create_server(&self, datacenter_id: &str, server: &Server) -> ApiResult<Server> {
        let created: Server = self
            .mutate(
                Method::POST,
                &format!("/datacenters/{}/servers", datacenter_id),
                server,
            )
            .await?;
        tracing::info!("Server created");
        Ok(created)
    }

    async fn get_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Server> {
        self.get_json(
            &format!("/datacenters/{}/servers/{}", datacenter_id, server_id),
            Some(2),
            &StatusMessages::default(),
        )
        .await
    }

    async fn delete_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<()> {
        self.remove(
            &format!("/datacenters/{}/servers/{}", datacenter_id, server_id),
            &StatusMessages::default(),
        )
        .await?;
        tracing::info!("Server deleted");
        Ok(())
    }

    async fn start_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<()> {
        self.action(datacenter_id, server_id, "start").await
    }

    async fn stop_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<()> {
        self.action(datacenter_id, server_id, "stop").await
    }

    async fn reboot_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<()> {
        self.action(datacenter_id, server_id, "reboot").await
    }

    async fn delete_volume(&self, datacenter_id: &str, volume_id: &str) -> ApiResult<()> {
        self.remove(
            &format!("/datacenters/{}/volumes/{}", datacenter_id, volume_id),
            &StatusMessages::default(),
        )
        .await?;
        tracing::info!("Volume deleted");
        Ok(())
    }

    async fn get_nic(&self, datacenter_id: &str, server_id: &str, nic_id: &str) -> ApiResult<Nic> {
        self.get_json(
            &format!(
                "/datacenters/{}/servers/{}/nics/{}",
                datacenter_id, server_id, nic_id
            ),
            None,
            &StatusMessages::default(),
        )
        .await
    }

    async fn delete_nic(
        &self,
        datacenter_id: &str,
        server_id: &str,
        nic_id: &str,
    ) -> ApiResult<()> {
        self.remove(
            &format!(
                "/datacenters/{}/servers/{}/nics/{}",
                datacenter_id, server_id, nic_id
            ),
            &StatusMessages::default(),
        )
        .await?;
        tracing::info!("NIC deleted");
        Ok(())
    }

    async fn list_nat_gateways(&self, datacenter_id: &str) -> ApiResult<Vec<NatGateway>> {
        self.list(&format!("/datacenters/{}/natgateways", datacenter_id))
            .await
    }

    async fn create_nat_gateway(
        &self,
        datacenter_id: &str,
        nat: &NatGateway,
    ) -> ApiResult<NatGateway> {
        let created: NatGateway = self
            .mutate(
                Method::POST,
                &format!("/datacenters/{}/natgateways", datacenter_id),
                nat,
            )
            .await?;
        tracing::info!("NAT gateway created");
        Ok(created)
    }

    async fn get_nat_gateway(&self, datacenter_id: &str, nat_id: &str) -> ApiResult<NatGateway> {
        self.get_json(
            &format!("/datacenters/{}/natgateways/{}", datacenter_id, nat_id),
            None,
            &StatusMessages::default(),
        )
        .await
    }

    async fn patch_nat_gateway(
        &self,
        datacenter_id: &str,
        nat_id: &str,
        properties: &NatGatewayProperties,
    ) -> ApiResult<NatGateway> {
        let patched: NatGateway = self
            .mutate(
                Method::PATCH,
                &format!("/datacenters/{}/natgateways/{}", datacenter_id, nat_id),
                properties,
            )
            .await?;
        tracing::info!("NAT gateway updated");
        Ok(patched)
    }

    async fn delete_nat_gateway(&self, datacenter_id: &str, nat_id: &str) -> ApiResult<()> {
        self.remove(
            &format!("/datacenters/{}/natgateways/{}", datacenter_id, nat_id),
            &StatusMessages::default(),
        )
        .await?;
        tracing::info!("NAT gateway deleted");
        Ok(())
    }

    async fn get_location(&self, region: &str, location: &str) -> ApiResult<Location> {
        self.get_json(
            &format!("/locations/{}/{}", region, location),
            None,
            &StatusMessages::default(),
        )
        .await
    }

    async fn list_images(&self) -> ApiResult<Vec<Image>> {
        self.list("/images").await
    }

    async fn get_image(&self, image_id: &str) -> ApiResult<Image> {
        self.get_json(
            &format!("/images/{}", image_id),
            None,
            &StatusMessages::default(),
        )
        .await
    }

    async fn list_templates(&self) -> ApiResult<Vec<Template>> {
        self.list("/templates").await
    }
}
