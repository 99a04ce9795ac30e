//! REST implementation of [`IndexNode`].

use eddy_types::{ClusterMember, MemberId};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ClusterError;
use crate::node::IndexNode;
use crate::primary_rest::RestOptions;
use crate::shell::{RemoteShell, ServiceCommands};

/// Query restricting counts to documents written by replication.
const REPLICATED_DOCUMENT_QUERY: &str = "_type:couchbaseDocument";

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

/// One index-cluster member reached over its REST API.
pub struct RestIndexNode {
    member: ClusterMember,
    base_url: String,
    client: Client,
    shell: Option<RemoteShell>,
    service: ServiceCommands,
}

impl RestIndexNode {
    pub fn new(member: ClusterMember, options: &RestOptions) -> Result<Self, ClusterError> {
        let client = options.build_client()?;
        Ok(Self {
            base_url: format!("http://{}:{}", member.id.host, member.id.port),
            shell: RemoteShell::for_member(&member),
            service: options.service.clone(),
            member,
            client,
        })
    }

    fn id(&self) -> &MemberId {
        &self.member.id
    }

    fn index_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    async fn send(
        &self,
        op: &'static str,
        req: RequestBuilder,
        accepted: &[StatusCode],
    ) -> Result<Response, ClusterError> {
        debug!(member = %self.id(), op, "index request");
        let resp = req
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| ClusterError::Http {
                member: self.id().clone(),
                op,
                source,
            })?;
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

    fn shell(&self) -> Result<&RemoteShell, ClusterError> {
        self.shell
            .as_ref()
            .ok_or_else(|| ClusterError::NoShell(self.id().clone()))
    }
}

#[async_trait::async_trait]
impl IndexNode for RestIndexNode {
    fn member(&self) -> &ClusterMember {
        &self.member
    }

    async fn init(&self) -> Result<(), ClusterError> {
        let req = self.client.get(&self.base_url);
        self.send("init", req, &[StatusCode::OK]).await?;
        info!(member = %self.id(), "index member reachable");
        Ok(())
    }

    async fn create_index(&self, name: &str) -> Result<(), ClusterError> {
        let req = self.client.put(self.index_url(name));
        self.send(
            "create_index",
            req,
            &[StatusCode::OK, StatusCode::CREATED, StatusCode::ACCEPTED],
        )
        .await?;
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<(), ClusterError> {
        let req = self.client.delete(self.index_url(name));
        self.send("delete_index", req, &[StatusCode::OK]).await?;
        Ok(())
    }

    async fn count(&self, name: &str) -> Result<u64, ClusterError> {
        let op = "count";
        let req = self
            .client
            .get(format!("{}/_count", self.index_url(name)))
            .query(&[("q", REPLICATED_DOCUMENT_QUERY)]);
        let resp = self.send(op, req, &[StatusCode::OK]).await?;
        let body: CountResponse = resp.json().await.map_err(|e| ClusterError::Decode {
            member: self.id().clone(),
            op,
            reason: e.to_string(),
        })?;
        Ok(body.count)
    }

    async fn start_service(&self) -> Result<(), ClusterError> {
        self.shell()?.run(&self.service.start).await?;
        info!(member = %self.id(), "index service started");
        Ok(())
    }

    async fn stop_service(&self) -> Result<(), ClusterError> {
        self.shell()?.run(&self.service.stop).await?;
        info!(member = %self.id(), "index service stopped");
        Ok(())
    }
}
