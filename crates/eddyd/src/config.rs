//! TOML configuration for the scenario driver.
//!
//! One file names both clusters, the replication slots and the catalogs of
//! situations and data actions; `scenario` and `action` select one entry of
//! each catalog (case-insensitively).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use eddy_cluster::{RestOptions, ServiceCommands};
use eddy_scenario::Timing;
use eddy_types::{
    BucketType, ClusterMember, Credentials, MemberId, ReplicationSlot, ScenarioDefinition,
    ScenarioKind, WorkloadSpec,
};
use serde::Deserialize;

/// Default control port of a primary member.
const PRIMARY_PORT: u16 = 8091;

/// Default HTTP port of an index member.
const INDEX_PORT: u16 = 9200;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Selected situation id (see `[[situations]]`).
    pub scenario: String,
    /// Selected data-manipulation action id (see `[[actions]]`).
    pub action: String,
    /// Logging configuration.
    pub log: LogSection,
    /// Fixed waits and the verification budget.
    pub timing: TimingSection,
    /// Remote service control.
    pub services: ServicesSection,
    /// Primary-cluster members; the first is the entry point.
    pub primary: Vec<MemberSection>,
    /// Index-cluster members; the first is the entry point.
    pub index: Vec<MemberSection>,
    /// One entry per source collection / target index pair.
    pub replication: Vec<ReplicationSection>,
    /// Situation catalog.
    pub situations: Vec<SituationSection>,
    /// Data-manipulation action catalog.
    pub actions: Vec<ActionSection>,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `[timing]` section. Unset values fall back to [`Timing::default`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub perturbation_settle_secs: Option<u64>,
    pub verify_budget_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub workload_grace_ms: Option<u64>,
    pub collection_settle_ms: Option<u64>,
    pub setup_settle_secs: Option<u64>,
    /// Per-request timeout of every control-plane call.
    pub http_timeout_secs: Option<u64>,
}

/// `[services]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServicesSection {
    /// Start every member's service before setup and stop index services on
    /// teardown.
    pub manage: bool,
    pub primary_start: Option<String>,
    pub primary_stop: Option<String>,
    pub index_start: Option<String>,
    pub index_stop: Option<String>,
}

/// One `[[primary]]` or `[[index]]` table.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MemberSection {
    pub host: String,
    /// Control port. Defaults to 8091 for primary and 9200 for index members.
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    /// Remote-shell user; service control is unavailable without it.
    pub ssh_user: Option<String>,
    /// Remote-shell password; key-based auth is used when unset.
    pub ssh_password: Option<String>,
    /// Replication connector port (index members only).
    pub connector_port: Option<u16>,
}

impl Default for MemberSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            username: "Administrator".to_string(),
            password: String::new(),
            ssh_user: None,
            ssh_password: None,
            connector_port: None,
        }
    }
}

impl MemberSection {
    fn to_member(&self, default_port: u16) -> ClusterMember {
        let id = MemberId::new(self.host.clone(), self.port.unwrap_or(default_port));
        let mut member = ClusterMember::new(
            id,
            Credentials::new(self.username.clone(), self.password.clone()),
        );
        if let Some(user) = &self.ssh_user {
            let password = self.ssh_password.clone().unwrap_or_default();
            member = member.with_shell(Credentials::new(user.clone(), password));
        }
        if let Some(port) = self.connector_port {
            member = member.with_connector_port(port);
        }
        member
    }
}

/// One `[[replication]]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReplicationSection {
    pub bucket_type: BucketType,
    /// Writes the workload stops after. Unset or 0 means "until stopped".
    pub item_count: Option<u64>,
    /// Value size in bytes.
    pub item_size: Option<usize>,
    /// Source collection memory quota in megabytes.
    pub quota_mb: Option<u32>,
}

/// One `[[situations]]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SituationSection {
    pub id: String,
    /// Scenario kind tag. Defaults to parsing `id`.
    pub kind: Option<String>,
    pub description: String,
    pub node_count: usize,
    pub replica_count: Option<u32>,
    pub failover_count: usize,
    pub add_count: usize,
    pub remove_count: usize,
}

impl SituationSection {
    pub fn kind(&self) -> Result<ScenarioKind> {
        let tag = self.kind.as_deref().unwrap_or(&self.id);
        tag.parse::<ScenarioKind>()
            .with_context(|| format!("situation {:?} has no scenario kind", self.id))
    }
}

/// One `[[actions]]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ActionSection {
    pub id: String,
    pub description: String,
}

impl CliConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// The `[[situations]]` entry named by `scenario`.
    pub fn situation(&self) -> Result<&SituationSection> {
        self.situations
            .iter()
            .find(|s| s.id.eq_ignore_ascii_case(self.scenario.trim()))
            .with_context(|| {
                let known: Vec<&str> = self.situations.iter().map(|s| s.id.as_str()).collect();
                format!(
                    "scenario {:?} matches no situation (known: {})",
                    self.scenario,
                    known.join(", ")
                )
            })
    }

    /// The `[[actions]]` entry named by `action`.
    pub fn data_action(&self) -> Result<&ActionSection> {
        self.actions
            .iter()
            .find(|a| a.id.eq_ignore_ascii_case(self.action.trim()))
            .with_context(|| {
                let known: Vec<&str> = self.actions.iter().map(|a| a.id.as_str()).collect();
                format!(
                    "action {:?} matches no data action (known: {})",
                    self.action,
                    known.join(", ")
                )
            })
    }

    /// Resolve the selected situation and action into a scenario definition.
    pub fn definition(&self) -> Result<ScenarioDefinition> {
        if self.primary.is_empty() {
            bail!("no [[primary]] members configured");
        }
        if self.index.is_empty() {
            bail!("no [[index]] members configured");
        }
        if self.replication.is_empty() {
            bail!("no [[replication]] slots configured");
        }

        let situation = self.situation()?;
        let action = self.data_action()?;
        let replica_count = situation.replica_count.unwrap_or(1);

        let mut definition = ScenarioDefinition::new(situation.kind()?);
        definition.description = situation.description.clone();
        definition.action = action.id.clone();
        definition.node_count = situation.node_count;
        definition.replica_count = replica_count;
        definition.failover_count = situation.failover_count;
        definition.add_count = situation.add_count;
        definition.remove_count = situation.remove_count;
        definition.replications = self
            .replication
            .iter()
            .map(|r| {
                let defaults = ReplicationSlot::default();
                ReplicationSlot {
                    bucket_type: r.bucket_type,
                    quota_mb: r.quota_mb.unwrap_or(defaults.quota_mb),
                    replica_count,
                }
            })
            .collect();

        // The workload drives the first pair.
        let first = &self.replication[0];
        definition.workload = WorkloadSpec {
            item_count: first.item_count.filter(|n| *n > 0),
            item_size: first
                .item_size
                .unwrap_or(WorkloadSpec::default().item_size),
        };
        Ok(definition)
    }

    pub fn primary_members(&self) -> Vec<ClusterMember> {
        self.primary.iter().map(|m| m.to_member(PRIMARY_PORT)).collect()
    }

    pub fn index_members(&self) -> Vec<ClusterMember> {
        self.index.iter().map(|m| m.to_member(INDEX_PORT)).collect()
    }

    /// Effective timing, with unset values taken from [`Timing::default`].
    pub fn timing(&self) -> Timing {
        let defaults = Timing::default();
        let t = &self.timing;
        Timing {
            perturbation_settle: t
                .perturbation_settle_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.perturbation_settle),
            verify_budget: t
                .verify_budget_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.verify_budget),
            poll_interval: t
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            workload_grace: t
                .workload_grace_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.workload_grace),
            collection_settle: t
                .collection_settle_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.collection_settle),
            setup_settle: t
                .setup_settle_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.setup_settle),
        }
    }

    /// Effective per-request HTTP timeout (30 s default).
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.http_timeout_secs.unwrap_or(30))
    }

    /// Client and service settings for primary handles.
    pub fn primary_options(&self) -> RestOptions {
        let mut options = RestOptions::primary().with_request_timeout(self.http_timeout());
        options.service = overridden(
            options.service,
            &self.services.primary_start,
            &self.services.primary_stop,
        );
        options
    }

    /// Client and service settings for index handles.
    pub fn index_options(&self) -> RestOptions {
        let mut options = RestOptions::index().with_request_timeout(self.http_timeout());
        options.service = overridden(
            options.service,
            &self.services.index_start,
            &self.services.index_stop,
        );
        options
    }
}

fn overridden(
    mut commands: ServiceCommands,
    start: &Option<String>,
    stop: &Option<String>,
) -> ServiceCommands {
    if let Some(start) = start {
        commands.start = start.clone();
    }
    if let Some(stop) = stop {
        commands.stop = stop.clone();
    }
    commands
}
