//! Control-plane handles for the primary data cluster and the downstream
//! index cluster.
//!
//! This crate provides:
//!
//! - [`PrimaryNode`] / [`IndexNode`] — capability traits for one member of
//!   each cluster. The scenario executor only talks to these traits.
//! - [`RestPrimaryNode`] / [`RestIndexNode`] — HTTP implementations, each
//!   owning its own `reqwest` client.
//! - [`RemoteShell`] — starts and stops service processes over `ssh`.
//! - [`Membership`] — the KnownSet/EjectSet bookkeeping behind rebalance
//!   calls.
//! - [`PrimaryCluster`] — the entry-point handle plus its membership, with
//!   add/eject/failover-then-rebalance operations.

mod error;
pub mod index_rest;
pub mod membership;
pub mod node;
pub mod primary;
pub mod primary_rest;
pub mod shell;


pub use error::ClusterError;
pub use index_rest::RestIndexNode;
pub use membership::Membership;
pub use node::{IndexNode, PrimaryNode, RebalanceStatus, remote_target};
pub use primary::PrimaryCluster;
pub use primary_rest::{RestOptions, RestPrimaryNode};
pub use shell::{RemoteShell, ServiceCommands};
