//! Error types for the cluster crate.

use eddy_types::MemberId;

/// Errors produced by control-plane calls against either cluster.
///
/// Every variant names the member and, where relevant, the operation so a
/// failure can be diagnosed from the log line alone.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request never got a response.
    #[error("{op} on {member}: request failed: {source}")]
    Http {
        member: MemberId,
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The member answered with a non-success status.
    #[error("{op} on {member}: bad status {status}: {body}")]
    Status {
        member: MemberId,
        op: &'static str,
        status: u16,
        body: String,
    },

    /// The response body could not be interpreted.
    #[error("{op} on {member}: malformed response: {reason}")]
    Decode {
        member: MemberId,
        op: &'static str,
        reason: String,
    },

    /// A data-plane write targeted a collection that was never connected.
    #[error("collection {collection} is not connected on {member}")]
    NotConnected { member: MemberId, collection: String },

    /// Service control was requested for a member without shell credentials.
    #[error("member {0} has no shell credentials")]
    NoShell(MemberId),

    /// A remote shell command exited unsuccessfully or could not be spawned.
    #[error("remote command `{command}` on {member} failed: {reason}")]
    Remote {
        member: MemberId,
        command: String,
        reason: String,
    },

    /// A membership change referenced a member outside the KnownSet.
    #[error("member {0} is not a known member of the cluster")]
    UnknownMember(MemberId),

    /// The entry point cannot be ejected or failed over through itself.
    #[error("member {0} is the cluster entry point")]
    EntryPoint(MemberId),

    /// The member refused the operation.
    #[error("{op} on {member}: {reason}")]
    Rejected {
        member: MemberId,
        op: &'static str,
        reason: String,
    },
}
