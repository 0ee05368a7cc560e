use std::sync::Arc;

use basalt_common::error::MetaError;
use basalt_common::meta::{
    ColumnDefinition, ColumnType, IndexDefinition, IndexParameter, MetricType, PartitionRule,
    ScalarIndexType, TableDefinition, VectorIndexParameter,
};
use basalt_common::types::{
    Location, Range, RegionMetrics, RegionType, SchemaId, Store, StoreId, StoreState, ROOT_SCHEMA,
};

use crate::id_epoch::IdEpochKind;
use crate::sequence::{MemSequenceService, SequenceService};
use crate::validate::validate_index_definition;
use crate::Coordinator;

fn coordinator_with_stores(count: u64) -> (Coordinator, Arc<MemSequenceService>) {
    let sequences = Arc::new(MemSequenceService::new());
    let coordinator = Coordinator::new(sequences.clone());
    for i in 0..count {
        coordinator
            .register_store(Store {
                id: StoreId(i + 1),
                server_location: Location {
                    host: "127.0.0.1".into(),
                    port: 20160 + i as u16,
                },
                state: StoreState::Active,
            })
            .unwrap();
    }
    (coordinator, sequences)
}

fn plain_columns() -> Vec<ColumnDefinition> {
    vec![
        ColumnDefinition {
            name: "id".into(),
            column_type: ColumnType::Int64,
            nullable: false,
            is_primary_key: true,
            auto_increment: false,
        },
        ColumnDefinition {
            name: "value".into(),
            column_type: ColumnType::Varchar,
            nullable: true,
            is_primary_key: false,
            auto_increment: false,
        },
    ]
}

fn two_part_definition(name: &str) -> TableDefinition {
    TableDefinition {
        name: name.into(),
        columns: plain_columns(),
        replica: 3,
        partition: PartitionRule::Range(vec![
            Range::new(b"a".to_vec(), b"m".to_vec()),
            Range::new(b"m".to_vec(), b"z".to_vec()),
        ]),
        auto_increment: 0,
    }
}

fn hnsw_parameter() -> VectorIndexParameter {
    VectorIndexParameter::Hnsw {
        dimension: 128,
        metric_type: MetricType::L2,
        efconstruction: 200,
        max_elements: 100_000,
        nlinks: 32,
    }
}

fn vector_index_definition(name: &str, parameter: VectorIndexParameter) -> IndexDefinition {
    IndexDefinition {
        name: name.into(),
        replica: 3,
        partition: PartitionRule::Range(vec![
            Range::new(b"a".to_vec(), b"m".to_vec()),
            Range::new(b"m".to_vec(), b"z".to_vec()),
        ]),
        index_parameter: IndexParameter::Vector(parameter),
        with_auto_increment: false,
        auto_increment: 0,
    }
}

#[test]
fn create_and_drop_schema() {
    let (coordinator, _) = coordinator_with_stores(3);

    let id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();
    assert_eq!(id, SchemaId(100));

    let err = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap_err();
    assert!(matches!(err, MetaError::SchemaExists(_)));

    coordinator.drop_schema(ROOT_SCHEMA, id).unwrap();
    assert!(matches!(
        coordinator.control().get_schema(id),
        Err(MetaError::SchemaNotFound(_))
    ));
    assert!(matches!(
        coordinator.control().get_schema_by_name("s1"),
        Err(MetaError::SchemaNotFound(_))
    ));
}

#[test]
fn schema_guard_rails() {
    let (coordinator, _) = coordinator_with_stores(3);

    // Non-root parents cannot hold sub-schemas.
    assert!(matches!(
        coordinator.create_schema(SchemaId(2), "s"),
        Err(MetaError::IllegalParameters(_))
    ));
    assert!(matches!(
        coordinator.create_schema(ROOT_SCHEMA, ""),
        Err(MetaError::IllegalParameters(_))
    ));
    // Reserved schemas can never be dropped.
    assert!(matches!(
        coordinator.drop_schema(ROOT_SCHEMA, SchemaId(2)),
        Err(MetaError::IllegalParameters(_))
    ));
    // Reserved names are taken from the start.
    assert!(matches!(
        coordinator.create_schema(ROOT_SCHEMA, "mysql"),
        Err(MetaError::SchemaExists(_))
    ));
}

#[test]
fn drop_non_empty_schema_is_refused() {
    let (coordinator, _) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();
    coordinator
        .create_table(schema_id, two_part_definition("t"), None)
        .unwrap();

    assert!(matches!(
        coordinator.drop_schema(ROOT_SCHEMA, schema_id),
        Err(MetaError::SchemaNotEmpty(_))
    ));
}

#[test]
fn table_with_two_partitions() {
    let (coordinator, _) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();
    assert_eq!(schema_id, SchemaId(100));

    let table_id = coordinator
        .create_table(schema_id, two_part_definition("t"), None)
        .unwrap();

    let table = coordinator.control().get_table(schema_id, table_id).unwrap();
    assert_eq!(table.partitions.len(), 2);

    for (i, region_id) in table.partitions.iter().enumerate() {
        let region = coordinator.control().get_region(*region_id).unwrap();
        assert_eq!(region.name, format!("T_100_t_part_{i}"));
        assert_eq!(region.region_type, RegionType::Store);
        assert_eq!(region.table_id, table_id);
        assert_eq!(region.peers.len(), 3);
        assert!(region
            .peers
            .iter()
            .any(|p| p.store_id == region.leader_store_id));
    }

    let table_range = coordinator
        .control()
        .get_table_range(schema_id, table_id)
        .unwrap();
    assert_eq!(table_range.range_distribution.len(), 2);
    assert_eq!(
        table_range.range_distribution[0].range,
        Range::new(b"a".to_vec(), b"m".to_vec())
    );
    assert_eq!(
        table_range.range_distribution[1].range,
        Range::new(b"m".to_vec(), b"z".to_vec())
    );
    assert!(table_range.range_distribution[0].regionmap_epoch > 0);
    assert!(!table_range.range_distribution[0].leader.host.is_empty());

    coordinator.drop_table(schema_id, table_id).unwrap();
    for region_id in &table.partitions {
        assert!(coordinator.control().get_region(*region_id).is_err());
    }
    assert!(matches!(
        coordinator.control().get_table_by_name(schema_id, "t"),
        Err(MetaError::TableNotFound(_))
    ));
}

#[test]
fn range_coverage_matches_supplied_partitions() {
    let (coordinator, _) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();
    let supplied = vec![
        Range::new(b"a".to_vec(), b"g".to_vec()),
        Range::new(b"g".to_vec(), b"p".to_vec()),
        Range::new(b"p".to_vec(), b"z".to_vec()),
    ];
    let definition = TableDefinition {
        partition: PartitionRule::Range(supplied.clone()),
        ..two_part_definition("t")
    };
    let table_id = coordinator.create_table(schema_id, definition, None).unwrap();

    let table = coordinator.control().get_table(schema_id, table_id).unwrap();
    let mut region_ranges: Vec<Range> = table
        .partitions
        .iter()
        .map(|id| coordinator.control().get_region(*id).unwrap().range)
        .collect();
    region_ranges.sort_by(|a, b| a.start_key.cmp(&b.start_key));
    assert_eq!(region_ranges, supplied);
    // Disjoint and contiguous.
    for pair in region_ranges.windows(2) {
        assert_eq!(pair[0].end_key, pair[1].start_key);
    }
}

#[test]
fn partial_region_failure_rolls_back_creation() {
    let (coordinator, _) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();
    let epoch_before = coordinator.control().get_present_id(IdEpochKind::EpochTable);
    let log_before = coordinator.log_len();

    // First region succeeds, second is made to fail.
    coordinator.control().fail_region_create_after(1);
    let err = coordinator
        .create_table(schema_id, two_part_definition("t"), None)
        .unwrap_err();
    assert!(matches!(err, MetaError::TableRegionCreateFailed(_)));

    assert!(matches!(
        coordinator.control().get_table_by_name(schema_id, "t"),
        Err(MetaError::TableNotFound(_))
    ));
    assert!(coordinator.control().get_regions().is_empty());
    assert_eq!(
        coordinator.control().get_present_id(IdEpochKind::EpochTable),
        epoch_before
    );
    assert_eq!(coordinator.log_len(), log_before);

    // The staging name was released: the same name can be created now.
    coordinator
        .create_table(schema_id, two_part_definition("t"), None)
        .unwrap();
}

#[test]
fn duplicate_table_names_lose_exactly_once() {
    let (coordinator, _) = coordinator_with_stores(3);
    let coordinator = Arc::new(coordinator);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = coordinator.clone();
            std::thread::spawn(move || {
                coordinator.create_table(schema_id, two_part_definition("contended"), None)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in &results {
        if let Err(e) = result {
            assert!(matches!(e, MetaError::TableExists(_)), "unexpected: {e}");
        }
    }

    // The winner's id is resolvable through the authoritative maps.
    let table = coordinator
        .control()
        .get_table_by_name(schema_id, "contended")
        .unwrap();
    assert_eq!(
        table.id,
        *results.iter().flatten().next().expect("one winner")
    );
}

#[test]
fn tables_and_indexes_share_one_id_counter() {
    let (coordinator, _) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();

    let table_id = coordinator.create_table_id(schema_id).unwrap();
    let index_id = coordinator.create_index_id(schema_id).unwrap();
    assert_eq!(index_id.0, table_id.0 + 1);

    let table_id2 = coordinator
        .create_table(schema_id, two_part_definition("t"), None)
        .unwrap();
    assert_eq!(table_id2.0, index_id.0 + 1);
}

#[test]
fn preset_table_id_is_honored() {
    let (coordinator, _) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();
    let preset = coordinator.create_table_id(schema_id).unwrap();
    let created = coordinator
        .create_table(schema_id, two_part_definition("t"), Some(preset))
        .unwrap();
    assert_eq!(created, preset);
}

#[test]
fn hash_partitioning_is_refused() {
    let (coordinator, _) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();
    let definition = TableDefinition {
        partition: PartitionRule::Hash(16),
        ..two_part_definition("t")
    };
    assert!(matches!(
        coordinator.create_table(schema_id, definition, None),
        Err(MetaError::TableDefinitionIllegal(_))
    ));

    let empty = TableDefinition {
        partition: PartitionRule::Range(vec![]),
        ..two_part_definition("t2")
    };
    assert!(matches!(
        coordinator.create_table(schema_id, empty, None),
        Err(MetaError::TableDefinitionIllegal(_))
    ));
}

#[test]
fn insufficient_stores_fail_region_creation() {
    let (coordinator, _) = coordinator_with_stores(1);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();
    let err = coordinator
        .create_table(schema_id, two_part_definition("t"), None)
        .unwrap_err();
    assert!(matches!(err, MetaError::TableRegionCreateFailed(_)));
}

#[test]
fn zero_replica_defaults_to_three() {
    let (coordinator, _) = coordinator_with_stores(4);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();
    let definition = TableDefinition {
        replica: 0,
        ..two_part_definition("t")
    };
    let table_id = coordinator.create_table(schema_id, definition, None).unwrap();
    let table = coordinator.control().get_table(schema_id, table_id).unwrap();
    let region = coordinator
        .control()
        .get_region(table.partitions[0])
        .unwrap();
    assert_eq!(region.replica_num, 3);
    assert_eq!(region.peers.len(), 3);
}

#[test]
fn auto_increment_lifecycle() {
    let (coordinator, sequences) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();

    let mut definition = two_part_definition("serial");
    definition.columns[0].auto_increment = true;
    definition.auto_increment = 1000;

    let table_id = coordinator
        .create_table(schema_id, definition.clone(), None)
        .unwrap();
    assert!(sequences.exists(table_id));
    assert_eq!(sequences.generate(table_id, 1).unwrap(), 1000);

    coordinator.drop_table(schema_id, table_id).unwrap();
    assert!(!sequences.exists(table_id));
}

#[test]
fn auto_increment_failure_aborts_creation_cleanly() {
    let (coordinator, sequences) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();

    let mut definition = two_part_definition("serial");
    definition.columns[0].auto_increment = true;

    sequences.fail_next_create();
    let err = coordinator
        .create_table(schema_id, definition.clone(), None)
        .unwrap_err();
    assert!(matches!(err, MetaError::AutoIncrementWhileCreatingTable(_)));
    assert!(coordinator.control().get_regions().is_empty());

    // Nothing was reserved; the same definition goes through afterwards.
    coordinator.create_table(schema_id, definition, None).unwrap();
}

#[test]
fn index_mirror_create_get_drop() {
    let (coordinator, _) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();

    let index_id = coordinator
        .create_index(schema_id, vector_index_definition("embeddings", hnsw_parameter()), None)
        .unwrap();

    let index = coordinator.control().get_index(schema_id, index_id).unwrap();
    assert_eq!(index.partitions.len(), 2);
    for (i, region_id) in index.partitions.iter().enumerate() {
        let region = coordinator.control().get_region(*region_id).unwrap();
        assert_eq!(region.name, format!("I_100_embeddings_part_{i}"));
        assert_eq!(region.region_type, RegionType::Index);
        assert_eq!(region.index_id, index_id);
        assert!(region.index_parameter.is_some());
    }

    let by_name = coordinator
        .control()
        .get_index_by_name(schema_id, "embeddings")
        .unwrap();
    assert_eq!(by_name.id, index_id);

    let range = coordinator
        .control()
        .get_index_range(schema_id, index_id)
        .unwrap();
    assert_eq!(range.range_distribution.len(), 2);

    assert_eq!(coordinator.control().get_indexes_count(schema_id).unwrap(), 1);

    coordinator.drop_index(schema_id, index_id).unwrap();
    assert!(coordinator.control().get_index(schema_id, index_id).is_err());
    assert!(coordinator.control().get_regions().is_empty());
}

#[test]
fn validator_totality_over_vector_parameters() {
    let metric = MetricType::Cosine;
    let broken: Vec<VectorIndexParameter> = vec![
        VectorIndexParameter::Hnsw { dimension: 0, metric_type: metric, efconstruction: 200, max_elements: 100, nlinks: 16 },
        VectorIndexParameter::Hnsw { dimension: 8, metric_type: MetricType::None, efconstruction: 200, max_elements: 100, nlinks: 16 },
        VectorIndexParameter::Hnsw { dimension: 8, metric_type: metric, efconstruction: 0, max_elements: 100, nlinks: 16 },
        VectorIndexParameter::Hnsw { dimension: 8, metric_type: metric, efconstruction: 200, max_elements: 0, nlinks: 16 },
        VectorIndexParameter::Hnsw { dimension: 8, metric_type: metric, efconstruction: 200, max_elements: 100, nlinks: 0 },
        VectorIndexParameter::Flat { dimension: 0, metric_type: metric },
        VectorIndexParameter::Flat { dimension: 8, metric_type: MetricType::None },
        VectorIndexParameter::IvfFlat { dimension: 0, metric_type: metric, ncentroids: 8 },
        VectorIndexParameter::IvfFlat { dimension: 8, metric_type: MetricType::None, ncentroids: 8 },
        VectorIndexParameter::IvfFlat { dimension: 8, metric_type: metric, ncentroids: 0 },
        VectorIndexParameter::IvfPq { dimension: 0, metric_type: metric, ncentroids: 8, nsubvector: 4, bucket_init_size: 64, bucket_max_size: 256 },
        VectorIndexParameter::IvfPq { dimension: 8, metric_type: MetricType::None, ncentroids: 8, nsubvector: 4, bucket_init_size: 64, bucket_max_size: 256 },
        VectorIndexParameter::IvfPq { dimension: 8, metric_type: metric, ncentroids: 0, nsubvector: 4, bucket_init_size: 64, bucket_max_size: 256 },
        VectorIndexParameter::IvfPq { dimension: 8, metric_type: metric, ncentroids: 8, nsubvector: 0, bucket_init_size: 64, bucket_max_size: 256 },
        VectorIndexParameter::IvfPq { dimension: 8, metric_type: metric, ncentroids: 8, nsubvector: 4, bucket_init_size: 0, bucket_max_size: 256 },
        VectorIndexParameter::IvfPq { dimension: 8, metric_type: metric, ncentroids: 8, nsubvector: 4, bucket_init_size: 64, bucket_max_size: 0 },
        VectorIndexParameter::Diskann { dimension: 0, metric_type: metric, num_trees: 8, num_neighbors: 32, num_threads: 4 },
        VectorIndexParameter::Diskann { dimension: 8, metric_type: MetricType::None, num_trees: 8, num_neighbors: 32, num_threads: 4 },
        VectorIndexParameter::Diskann { dimension: 8, metric_type: metric, num_trees: 0, num_neighbors: 32, num_threads: 4 },
        VectorIndexParameter::Diskann { dimension: 8, metric_type: metric, num_trees: 8, num_neighbors: 0, num_threads: 4 },
        VectorIndexParameter::Diskann { dimension: 8, metric_type: metric, num_trees: 8, num_neighbors: 32, num_threads: 0 },
    ];

    for parameter in broken {
        let label = format!("{parameter:?}");
        let definition = vector_index_definition("v", parameter);
        assert!(
            matches!(
                validate_index_definition(&definition),
                Err(MetaError::IndexDefinitionIllegal(_))
            ),
            "accepted: {label}"
        );
    }

    // Sanity: every algorithm has a valid configuration.
    for parameter in [
        hnsw_parameter(),
        VectorIndexParameter::Flat { dimension: 8, metric_type: metric },
        VectorIndexParameter::IvfFlat { dimension: 8, metric_type: metric, ncentroids: 8 },
        VectorIndexParameter::IvfPq { dimension: 8, metric_type: metric, ncentroids: 8, nsubvector: 4, bucket_init_size: 64, bucket_max_size: 256 },
        VectorIndexParameter::Diskann { dimension: 8, metric_type: metric, num_trees: 8, num_neighbors: 32, num_threads: 4 },
    ] {
        validate_index_definition(&vector_index_definition("v", parameter)).unwrap();
    }
}

#[test]
fn scalar_and_none_index_parameters() {
    let mut definition = vector_index_definition("v", hnsw_parameter());
    definition.index_parameter = IndexParameter::None;
    assert!(matches!(
        validate_index_definition(&definition),
        Err(MetaError::IndexDefinitionIllegal(_))
    ));

    definition.index_parameter = IndexParameter::Scalar {
        scalar_index_type: ScalarIndexType::None,
    };
    assert!(matches!(
        validate_index_definition(&definition),
        Err(MetaError::IndexDefinitionIllegal(_))
    ));

    definition.index_parameter = IndexParameter::Scalar {
        scalar_index_type: ScalarIndexType::Lsm,
    };
    validate_index_definition(&definition).unwrap();

    definition.name = String::new();
    assert!(matches!(
        validate_index_definition(&definition),
        Err(MetaError::IllegalParameters(_))
    ));
}

#[test]
fn metrics_aggregate_and_refresh() {
    let (coordinator, _) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();
    let table_id = coordinator
        .create_table(schema_id, two_part_definition("t"), None)
        .unwrap();
    let table = coordinator.control().get_table(schema_id, table_id).unwrap();

    coordinator
        .control()
        .update_region_metrics(
            table.partitions[0],
            RegionMetrics {
                row_count: 40,
                min_key: b"\x00".to_vec(),
                max_key: b"lion".to_vec(),
            },
        )
        .unwrap();
    coordinator
        .control()
        .update_region_metrics(
            table.partitions[1],
            RegionMetrics {
                row_count: 2,
                min_key: b"mouse".to_vec(),
                max_key: vec![0xFF; 11],
            },
        )
        .unwrap();

    let metrics = coordinator
        .control()
        .get_table_metrics(schema_id, table_id)
        .unwrap();
    assert_eq!(metrics.rows_count, 42);
    assert_eq!(metrics.part_count, 2);
    // A one-byte zero key undercuts the ten-byte zero sentinel.
    assert_eq!(metrics.min_key, b"\x00".to_vec());
    // Eleven 0xFF bytes exceed the ten-byte sentinel.
    assert_eq!(metrics.max_key, vec![0xFF; 11]);

    // Memoized: a newer report is not visible until the refresh pass.
    coordinator
        .control()
        .update_region_metrics(
            table.partitions[1],
            RegionMetrics {
                row_count: 10,
                min_key: b"mouse".to_vec(),
                max_key: vec![0xFF; 11],
            },
        )
        .unwrap();
    let stale = coordinator
        .control()
        .get_table_metrics(schema_id, table_id)
        .unwrap();
    assert_eq!(stale.rows_count, 42);

    coordinator.control().calculate_table_metrics();
    let fresh = coordinator
        .control()
        .get_table_metrics(schema_id, table_id)
        .unwrap();
    assert_eq!(fresh.rows_count, 50);
}

#[test]
fn metrics_skip_unreported_regions_and_keep_sentinels() {
    let (coordinator, _) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();
    let table_id = coordinator
        .create_table(schema_id, two_part_definition("t"), None)
        .unwrap();

    // No region has reported yet: counts are zero and the sentinels stand.
    let metrics = coordinator
        .control()
        .get_table_metrics(schema_id, table_id)
        .unwrap();
    assert_eq!(metrics.rows_count, 0);
    assert_eq!(metrics.min_key, vec![0x00; 10]);
    assert_eq!(metrics.max_key, vec![0xFF; 10]);
    assert_eq!(metrics.part_count, 2);
}

#[test]
fn dropping_a_table_evicts_its_memoized_metrics() {
    let (coordinator, _) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();
    let table_id = coordinator
        .create_table(schema_id, two_part_definition("t"), None)
        .unwrap();
    coordinator
        .control()
        .get_table_metrics(schema_id, table_id)
        .unwrap();

    coordinator.drop_table(schema_id, table_id).unwrap();
    assert!(matches!(
        coordinator.control().get_table_metrics(schema_id, table_id),
        Err(MetaError::TableNotFound(_))
    ));
    // The refresh pass finds nothing left to evict or refresh.
    coordinator.control().calculate_table_metrics();
}

#[test]
fn snapshot_restores_state_and_counters_stay_monotonic() {
    let (coordinator, _) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();
    let table_id = coordinator
        .create_table(schema_id, two_part_definition("t"), None)
        .unwrap();

    let snapshot = coordinator.control().snapshot();
    let payload = serde_json::to_vec(&snapshot).unwrap();
    let decoded: crate::MetaSnapshot = serde_json::from_slice(&payload).unwrap();

    let (replica, _) = coordinator_with_stores(0);
    replica.control().restore_snapshot(&decoded);

    let table = replica.control().get_table(schema_id, table_id).unwrap();
    assert_eq!(table.definition.name, "t");
    assert_eq!(
        replica.control().get_table_by_name(schema_id, "t").unwrap().id,
        table_id
    );
    for kind in [
        IdEpochKind::IdNextSchema,
        IdEpochKind::IdNextTable,
        IdEpochKind::IdNextRegion,
        IdEpochKind::EpochTable,
        IdEpochKind::EpochRegion,
    ] {
        assert_eq!(
            replica.control().get_present_id(kind),
            coordinator.control().get_present_id(kind),
            "{kind:?} diverged"
        );
    }

    // Ids allocated after restore continue above everything handed out
    // before the snapshot.
    let next_schema = replica.create_schema(ROOT_SCHEMA, "s2").unwrap();
    assert!(next_schema.0 > schema_id.0);
}

#[test]
fn get_schemas_lists_reserved_and_created() {
    let (coordinator, _) = coordinator_with_stores(3);
    coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();

    let schemas = coordinator.control().get_schemas(ROOT_SCHEMA).unwrap();
    assert!(schemas.len() >= 6);
    assert!(schemas.iter().any(|s| s.name == "root"));
    assert!(schemas.iter().any(|s| s.name == "s1"));

    assert!(matches!(
        coordinator.control().get_schemas(SchemaId(2)),
        Err(MetaError::IllegalParameters(_))
    ));
}

#[test]
fn query_region_by_key_finds_covering_region() {
    let (coordinator, _) = coordinator_with_stores(3);
    let schema_id = coordinator.create_schema(ROOT_SCHEMA, "s1").unwrap();
    let table_id = coordinator
        .create_table(schema_id, two_part_definition("t"), None)
        .unwrap();
    let table = coordinator.control().get_table(schema_id, table_id).unwrap();

    let region = coordinator.control().query_region_by_key(b"b").unwrap();
    assert_eq!(region.id, table.partitions[0]);
    let region = coordinator.control().query_region_by_key(b"n").unwrap();
    assert_eq!(region.id, table.partitions[1]);
    assert!(coordinator.control().query_region_by_key(b"zz").is_none());
}
