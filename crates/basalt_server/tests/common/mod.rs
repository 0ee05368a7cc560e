#![allow(dead_code, unused_imports)]

pub use std::sync::Arc;

pub use basalt_common::meta::{
    ColumnDefinition, ColumnType, PartitionRule, TableDefinition,
};
pub use basalt_common::types::{Range, SchemaId, TableId, ROOT_SCHEMA};
pub use basalt_server::{
    LocalCluster, MetaRequest, MetaResponsePayload, StatusCode, TxnRequest,
};

/// A cluster with one raw-KV region covering the whole `w`-tagged space.
pub fn cluster_with_raw_region(store_count: u64) -> LocalCluster {
    let cluster = LocalCluster::new(store_count);
    cluster
        .coordinator
        .create_region(
            "Benchmark_1".to_string(),
            3,
            Range::new(b"w".to_vec(), b"x".to_vec()),
        )
        .unwrap();
    cluster
}

pub fn table_definition(name: &str) -> TableDefinition {
    TableDefinition {
        name: name.into(),
        columns: vec![
            ColumnDefinition {
                name: "id".into(),
                column_type: ColumnType::Int64,
                nullable: false,
                is_primary_key: true,
                auto_increment: false,
            },
            ColumnDefinition {
                name: "payload".into(),
                column_type: ColumnType::Bytes,
                nullable: true,
                is_primary_key: false,
                auto_increment: false,
            },
        ],
        replica: 3,
        partition: PartitionRule::Range(vec![
            Range::new(b"wa".to_vec(), b"wm".to_vec()),
            Range::new(b"wm".to_vec(), b"wz".to_vec()),
        ]),
        auto_increment: 0,
    }
}
