//! REST implementation of [`PrimaryNode`].

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use eddy_types::{ClusterMember, MemberId, RemoteTarget, ReplicationSlot};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ClusterError;
use crate::node::{PrimaryNode, RebalanceStatus};
use crate::shell::{RemoteShell, ServiceCommands};

const SETTINGS_URI: &str = "/settings/web";
const REBALANCE_URI: &str = "/controller/rebalance";
const ADD_NODE_URI: &str = "/controller/addNode";
const EJECT_NODE_URI: &str = "/controller/ejectNode";
const FAILOVER_URI: &str = "/controller/failOver";
const REBALANCE_PROGRESS_URI: &str = "/pools/default/rebalanceProgress";
const REPLICATION_URI: &str = "/controller/createReplication";
const BUCKETS_URI: &str = "/pools/default/buckets";
const REMOTE_CLUSTERS_URI: &str = "/pools/default/remoteClusters";

/// Default connection timeout for control-plane requests.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default request timeout for control-plane requests.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-handle client settings. Every handle builds its own client from these.
#[derive(Debug, Clone)]
pub struct RestOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub service: ServiceCommands,
}

impl RestOptions {
    pub fn primary() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            service: ServiceCommands::primary_default(),
        }
    }

    pub fn index() -> Self {
        Self {
            service: ServiceCommands::index_default(),
            ..Self::primary()
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub(crate) fn build_client(&self) -> Result<Client, ClusterError> {
        Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .user_agent(format!("eddy/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClusterError::Client)
    }
}

#[derive(Debug, Deserialize)]
struct RebalanceProgressResponse {
    status: String,
}

/// One primary-cluster member reached over its REST API.
pub struct RestPrimaryNode {
    member: ClusterMember,
    base_url: String,
    client: Client,
    shell: Option<RemoteShell>,
    service: ServiceCommands,
    /// Collections with an open data-plane handle.
    connected: Mutex<HashSet<String>>,
}

impl RestPrimaryNode {
    pub fn new(member: ClusterMember, options: &RestOptions) -> Result<Self, ClusterError> {
        let client = options.build_client()?;
        Ok(Self {
            base_url: format!("http://{}:{}", member.id.host, member.id.port),
            shell: RemoteShell::for_member(&member),
            service: options.service.clone(),
            member,
            client,
            connected: Mutex::new(HashSet::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn id(&self) -> &MemberId {
        &self.member.id
    }

    /// POST a form and require one of the `accepted` statuses.
    async fn post_form(
        &self,
        op: &'static str,
        path: &str,
        form: &[(&str, String)],
        accepted: &[StatusCode],
    ) -> Result<Response, ClusterError> {
        debug!(member = %self.id(), op, path, "control-plane request");
        let resp = self
            .client
            .post(self.url(path))
            .basic_auth(
                &self.member.credentials.username,
                Some(&self.member.credentials.password),
            )
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|source| self.http_error(op, source))?;
        self.check_status(op, resp, accepted).await
    }

    async fn check_status(
        &self,
        op: &'static str,
        resp: Response,
        accepted: &[StatusCode],
    ) -> Result<Response, ClusterError> {
        let status = resp.status();
        if accepted.contains(&status) {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ClusterError::Status {
            member: self.id().clone(),
            op,
            status: status.as_u16(),
            body,
        })
    }

    fn http_error(&self, op: &'static str, source: reqwest::Error) -> ClusterError {
        ClusterError::Http {
            member: self.id().clone(),
            op,
            source,
        }
    }

    fn shell(&self) -> Result<&RemoteShell, ClusterError> {
        self.shell
            .as_ref()
            .ok_or_else(|| ClusterError::NoShell(self.id().clone()))
    }
}

/// Comma-joined cluster-internal names, as the rebalance endpoint expects.
fn otp_list<'a>(ids: impl IntoIterator<Item = &'a MemberId>) -> String {
    ids.into_iter()
        .map(MemberId::otp_name)
        .collect::<Vec<_>>()
        .join(",")
}

const OK: &[StatusCode] = &[StatusCode::OK];
const OK_OR_ACCEPTED: &[StatusCode] = &[StatusCode::OK, StatusCode::ACCEPTED];

#[async_trait::async_trait]
impl PrimaryNode for RestPrimaryNode {
    fn member(&self) -> &ClusterMember {
        &self.member
    }

    async fn init(&self) -> Result<(), ClusterError> {
        let form = [
            ("username", self.member.credentials.username.clone()),
            ("password", self.member.credentials.password.clone()),
            ("port", self.member.id.port.to_string()),
        ];
        self.post_form("init", SETTINGS_URI, &form, OK_OR_ACCEPTED).await?;
        info!(member = %self.id(), "primary member initialized");
        Ok(())
    }

    async fn add_member(&self, member: &ClusterMember) -> Result<(), ClusterError> {
        let form = [
            ("hostname", member.id.host.clone()),
            ("user", member.credentials.username.clone()),
            ("password", member.credentials.password.clone()),
        ];
        self.post_form("add_member", ADD_NODE_URI, &form, OK).await?;
        Ok(())
    }

    async fn eject_member(&self, member: &MemberId) -> Result<(), ClusterError> {
        let form = [("otpNode", member.otp_name())];
        self.post_form("eject_member", EJECT_NODE_URI, &form, OK).await?;
        Ok(())
    }

    async fn failover_member(&self, member: &MemberId) -> Result<(), ClusterError> {
        let form = [("otpNode", member.otp_name())];
        self.post_form("failover_member", FAILOVER_URI, &form, OK).await?;
        Ok(())
    }

    async fn rebalance(&self, known: &[MemberId], eject: &[MemberId]) -> Result<(), ClusterError> {
        // The endpoint wants every current node in knownNodes, ejected ones included.
        let form = [
            ("knownNodes", otp_list(known.iter().chain(eject))),
            ("ejectedNodes", otp_list(eject)),
        ];
        self.post_form("rebalance", REBALANCE_URI, &form, OK).await?;
        Ok(())
    }

    async fn rebalance_progress(&self) -> Result<RebalanceStatus, ClusterError> {
        let op = "rebalance_progress";
        let resp = self
            .client
            .get(self.url(REBALANCE_PROGRESS_URI))
            .basic_auth(
                &self.member.credentials.username,
                Some(&self.member.credentials.password),
            )
            .send()
            .await
            .map_err(|source| self.http_error(op, source))?;
        let resp = self.check_status(op, resp, OK).await?;
        let body: RebalanceProgressResponse =
            resp.json().await.map_err(|e| ClusterError::Decode {
                member: self.id().clone(),
                op,
                reason: e.to_string(),
            })?;
        Ok(RebalanceStatus::from_status(&body.status))
    }

    async fn create_collection(
        &self,
        name: &str,
        slot: &ReplicationSlot,
    ) -> Result<(), ClusterError> {
        let form = [
            ("name", name.to_string()),
            ("bucketType", slot.bucket_type.as_str().to_string()),
            ("ramQuotaMB", slot.quota_mb.to_string()),
            ("authType", "none".to_string()),
            ("replicaNumber", slot.replica_count.to_string()),
        ];
        self.post_form("create_collection", BUCKETS_URI, &form, OK_OR_ACCEPTED).await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), ClusterError> {
        let op = "delete_collection";
        let resp = self
            .client
            .delete(self.url(&format!("{BUCKETS_URI}/{name}")))
            .basic_auth(
                &self.member.credentials.username,
                Some(&self.member.credentials.password),
            )
            .send()
            .await
            .map_err(|source| self.http_error(op, source))?;
        self.check_status(op, resp, OK).await?;
        if let Ok(mut connected) = self.connected.lock() {
            connected.remove(name);
        }
        Ok(())
    }

    async fn connect_collection(&self, name: &str) -> Result<(), ClusterError> {
        let op = "connect_collection";
        let resp = self
            .client
            .get(self.url(&format!("{BUCKETS_URI}/{name}")))
            .basic_auth(
                &self.member.credentials.username,
                Some(&self.member.credentials.password),
            )
            .send()
            .await
            .map_err(|source| self.http_error(op, source))?;
        self.check_status(op, resp, OK).await?;
        if let Ok(mut connected) = self.connected.lock() {
            connected.insert(name.to_string());
        }
        debug!(member = %self.id(), collection = name, "collection connected");
        Ok(())
    }

    async fn create_remote_reference(&self, target: &RemoteTarget) -> Result<(), ClusterError> {
        let form = [
            ("name", target.name.clone()),
            ("hostname", target.hostname.clone()),
            ("username", target.credentials.username.clone()),
            ("password", target.credentials.password.clone()),
        ];
        self.post_form(
            "create_remote_reference",
            REMOTE_CLUSTERS_URI,
            &form,
            OK_OR_ACCEPTED,
        )
        .await?;
        Ok(())
    }

    async fn delete_remote_reference(&self, name: &str) -> Result<(), ClusterError> {
        let op = "delete_remote_reference";
        let resp = self
            .client
            .delete(self.url(&format!("{REMOTE_CLUSTERS_URI}/{name}")))
            .basic_auth(
                &self.member.credentials.username,
                Some(&self.member.credentials.password),
            )
            .send()
            .await
            .map_err(|source| self.http_error(op, source))?;
        self.check_status(op, resp, OK).await?;
        Ok(())
    }

    async fn create_replication_stream(
        &self,
        source: &str,
        target: &str,
        remote: &str,
    ) -> Result<(), ClusterError> {
        let form = [
            ("fromBucket", source.to_string()),
            ("toBucket", target.to_string()),
            ("toCluster", remote.to_string()),
            ("replicationType", "continuous".to_string()),
            ("type", "capi".to_string()),
        ];
        self.post_form(
            "create_replication_stream",
            REPLICATION_URI,
            &form,
            OK_OR_ACCEPTED,
        )
        .await?;
        Ok(())
    }

    async fn write(&self, collection: &str, key: &str, value: Bytes) -> Result<(), ClusterError> {
        let is_connected = self
            .connected
            .lock()
            .map(|connected| connected.contains(collection))
            .unwrap_or(false);
        if !is_connected {
            return Err(ClusterError::NotConnected {
                member: self.id().clone(),
                collection: collection.to_string(),
            });
        }
        let form = [("value", String::from_utf8_lossy(&value).into_owned())];
        let path = format!("{BUCKETS_URI}/{collection}/docs/{key}");
        self.post_form("write", &path, &form, OK).await?;
        Ok(())
    }

    async fn start_service(&self) -> Result<(), ClusterError> {
        self.shell()?.run(&self.service.start).await?;
        info!(member = %self.id(), "primary service started");
        Ok(())
    }

    async fn stop_service(&self) -> Result<(), ClusterError> {
        self.shell()?.run(&self.service.stop).await?;
        info!(member = %self.id(), "primary service stopped");
        Ok(())
    }
}
