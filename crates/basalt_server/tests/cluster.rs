mod common;
use common::*;

use basalt_common::types::IsolationLevel;
use basalt_engine::mvcc::Mutation;

#[test]
fn hello_reports_version() {
    let cluster = LocalCluster::new(1);
    let response = cluster.meta_service.handle(MetaRequest::Hello);
    assert!(response.status.is_ok());
    match response.payload {
        MetaResponsePayload::Hello(hello) => {
            assert_eq!(hello.package, "basalt");
            assert!(!hello.version.is_empty());
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn table_lifecycle_through_the_meta_service() {
    let cluster = LocalCluster::new(3);

    let response = cluster.meta_service.handle(MetaRequest::CreateSchema {
        parent_schema_id: ROOT_SCHEMA,
        schema_name: "app".into(),
    });
    assert!(response.status.is_ok());
    let schema_id = match response.payload {
        MetaResponsePayload::SchemaId(id) => id,
        other => panic!("unexpected payload: {other:?}"),
    };
    assert_eq!(schema_id, SchemaId(100));

    let response = cluster.meta_service.handle(MetaRequest::CreateTable {
        schema_id,
        definition: table_definition("events"),
        table_id: None,
    });
    assert!(response.status.is_ok());
    let table_id = match response.payload {
        MetaResponsePayload::TableId(id) => id,
        other => panic!("unexpected payload: {other:?}"),
    };

    let response = cluster.meta_service.handle(MetaRequest::GetTableRange {
        schema_id,
        table_id,
    });
    match response.payload {
        MetaResponsePayload::TableRange(table_range) => {
            assert_eq!(table_range.range_distribution.len(), 2);
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    let response = cluster.meta_service.handle(MetaRequest::GetTableByName {
        schema_id,
        table_name: "events".into(),
    });
    assert!(response.status.is_ok());

    let response = cluster
        .meta_service
        .handle(MetaRequest::DropTable { schema_id, table_id });
    assert!(response.status.is_ok());

    let response = cluster
        .meta_service
        .handle(MetaRequest::GetTable { schema_id, table_id });
    assert_eq!(response.status.code, StatusCode::TableNotFound);

    // The schema is empty again, so it can be dropped.
    let response = cluster.meta_service.handle(MetaRequest::DropSchema {
        parent_schema_id: ROOT_SCHEMA,
        schema_id,
    });
    assert!(response.status.is_ok());
}

#[test]
fn duplicate_names_surface_exists_codes() {
    let cluster = LocalCluster::new(3);
    let ok = cluster.meta_service.handle(MetaRequest::CreateSchema {
        parent_schema_id: ROOT_SCHEMA,
        schema_name: "dup".into(),
    });
    assert!(ok.status.is_ok());

    let dup = cluster.meta_service.handle(MetaRequest::CreateSchema {
        parent_schema_id: ROOT_SCHEMA,
        schema_name: "dup".into(),
    });
    assert_eq!(dup.status.code, StatusCode::SchemaExists);
}

#[test]
fn raw_kv_roundtrip_over_the_router() {
    let cluster = cluster_with_raw_region(3);

    cluster.raw_put(b"alpha", b"1").unwrap();
    cluster.raw_put(b"beta", b"2").unwrap();

    assert_eq!(cluster.raw_get(b"alpha").unwrap(), Some(b"1".to_vec()));
    assert_eq!(cluster.raw_get(b"missing").unwrap(), None);

    let kvs = cluster
        .raw_batch_get(&[b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec()])
        .unwrap();
    assert_eq!(kvs.len(), 2);
    assert!(kvs.contains(&(b"alpha".to_vec(), b"1".to_vec())));
    assert!(kvs.contains(&(b"beta".to_vec(), b"2".to_vec())));

    // Overwrite is visible at a later snapshot.
    cluster.raw_put(b"alpha", b"10").unwrap();
    assert_eq!(cluster.raw_get(b"alpha").unwrap(), Some(b"10".to_vec()));
}

#[test]
fn batches_split_across_regions() {
    let cluster = LocalCluster::new(3);
    cluster
        .coordinator
        .create_region(
            "left".to_string(),
            3,
            Range::new(b"w".to_vec(), b"wm".to_vec()),
        )
        .unwrap();
    cluster
        .coordinator
        .create_region(
            "right".to_string(),
            3,
            Range::new(b"wm".to_vec(), b"x".to_vec()),
        )
        .unwrap();

    let pairs: Vec<(Vec<u8>, Vec<u8>)> = [b"a", b"l", b"m", b"z"]
        .iter()
        .enumerate()
        .map(|(i, k)| (k.to_vec(), format!("v{i}").into_bytes()))
        .collect();
    cluster.raw_batch_put(&pairs).unwrap();

    let keys: Vec<Vec<u8>> = pairs.iter().map(|(k, _)| k.clone()).collect();
    let kvs = cluster.raw_batch_get(&keys).unwrap();
    assert_eq!(kvs.len(), 4);

    // The router grouped the batch into the two regions.
    assert_eq!(cluster.router.len(), 2);
}

#[test]
fn scan_pages_through_a_region() {
    let cluster = cluster_with_raw_region(3);
    for i in 0..10u32 {
        cluster
            .raw_put(format!("k{i:02}").as_bytes(), b"v")
            .unwrap();
    }

    let first = cluster
        .raw_scan(Range::new(b"w".to_vec(), b"x".to_vec()), 4)
        .unwrap();
    assert_eq!(first.kvs.len(), 4);
    assert!(first.has_more);

    let rest = cluster
        .raw_scan(Range::new(first.end_key.clone(), b"x".to_vec()), 0)
        .unwrap();
    assert_eq!(rest.kvs.len(), 6);
    assert!(!rest.has_more);
}

#[test]
fn locked_keys_surface_in_txn_result() {
    let cluster = cluster_with_raw_region(3);
    cluster.raw_put(b"k", b"v").unwrap();

    // Leave a lock behind by prewriting without committing.
    let start_ts = cluster.next_ts();
    let encoded = basalt_engine::codec::encode_raw_key(b"k");
    let route = cluster.router.lookup_region_by_key(&encoded).unwrap();
    let store = cluster.leader_store(&route).unwrap();
    let response = store.service.handle(TxnRequest::TxnPrewrite {
        mutations: vec![Mutation::Put {
            key: encoded.clone(),
            value: b"v2".to_vec(),
        }],
        primary_lock: encoded.clone(),
        start_ts,
        lock_ttl: 3000,
    });
    assert!(response.status.is_ok());

    let read_ts = cluster.next_ts();
    let response = store.service.handle(TxnRequest::TxnBatchGet {
        isolation: IsolationLevel::SnapshotIsolation,
        start_ts: read_ts,
        keys: vec![encoded.clone()],
    });
    assert!(response.status.is_ok());
    assert_eq!(response.txn_result.locked.len(), 1);
    assert_eq!(response.txn_result.locked[0].lock_ts, start_ts);

    // Lock inventory sees it too.
    let response = store.service.handle(TxnRequest::TxnScanLock {
        min_lock_ts: 0,
        max_lock_ts: u64::MAX,
        range: Range::new(Vec::new(), Vec::new()),
        limit: 0,
    });
    assert_eq!(response.locks.len(), 1);

    // Roll the transaction back; the key reads cleanly again.
    let response = store.service.handle(TxnRequest::TxnRollback {
        start_ts,
        keys: vec![encoded.clone()],
    });
    assert!(response.status.is_ok());

    assert_eq!(cluster.raw_get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn requests_roundtrip_through_serde() {
    let request = MetaRequest::CreateSchema {
        parent_schema_id: ROOT_SCHEMA,
        schema_name: "wire".into(),
    };
    let json = serde_json::to_string(&request).unwrap();
    let back: MetaRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(back.name(), "CreateSchema");

    let request = TxnRequest::TxnCommit {
        start_ts: 1,
        commit_ts: 2,
        keys: vec![b"k".to_vec()],
    };
    let json = serde_json::to_string(&request).unwrap();
    let back: TxnRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(back.name(), "TxnCommit");
}
