//! Raft type configuration for the meta log.

use std::io::Cursor;

use openraft::TokioRuntime;

/// Client write request replicated through the meta log.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum MetaRequest {
    /// A serialized `MetaIncrement` to apply on commit.
    Write { data: Vec<u8> },
    /// Heartbeat-only entry; applied but not forwarded.
    Noop,
}

/// Response returned once a request is applied to the state machine.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum MetaResponse {
    Ok,
    Noop,
}

openraft::declare_raft_types!(
    /// Meta-log Raft type configuration.
    pub TypeConfig:
        D = MetaRequest,
        R = MetaResponse,
        NodeId = u64,
        Node = openraft::BasicNode,
        Entry = openraft::Entry<TypeConfig>,
        SnapshotData = Cursor<Vec<u8>>,
        AsyncRuntime = TokioRuntime,
);

/// Convenience alias for the Raft instance.
pub type MetaRaft = openraft::Raft<TypeConfig>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_roundtrip() {
        let req = MetaRequest::Write {
            data: vec![1, 2, 3],
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: MetaRequest = serde_json::from_str(&json).unwrap();
        match back {
            MetaRequest::Write { data } => assert_eq!(data, vec![1, 2, 3]),
            MetaRequest::Noop => panic!("wrong variant"),
        }
    }
}
