//! Definition validators.
//!
//! Index parameter rules: every listed per-algorithm field must be strictly
//! positive and the metric type must be set. A failed field yields
//! `IndexDefinitionIllegal` naming the field, so callers can surface the
//! exact parameter to the user.

use basalt_common::error::MetaError;
use basalt_common::meta::{
    IndexDefinition, IndexParameter, MetricType, ScalarIndexType, TableDefinition,
    VectorIndexParameter,
};

fn illegal(field: &str, value: impl std::fmt::Display) -> MetaError {
    MetaError::IndexDefinitionIllegal(format!("{field} is illegal: {value}"))
}

fn require_positive(field: &str, value: u64) -> Result<(), MetaError> {
    if value == 0 {
        return Err(illegal(field, value));
    }
    Ok(())
}

fn require_metric(field: &str, metric: MetricType) -> Result<(), MetaError> {
    if metric == MetricType::None {
        return Err(illegal(field, "METRIC_TYPE_NONE"));
    }
    Ok(())
}

/// Validate an index definition's name and parameter block.
pub fn validate_index_definition(definition: &IndexDefinition) -> Result<(), MetaError> {
    if definition.name.is_empty() {
        return Err(MetaError::IllegalParameters("index name is empty".into()));
    }

    match &definition.index_parameter {
        IndexParameter::None => Err(MetaError::IndexDefinitionIllegal(
            "index type is NONE".into(),
        )),
        IndexParameter::Vector(vector) => validate_vector_parameter(vector),
        IndexParameter::Scalar { scalar_index_type } => {
            if *scalar_index_type == ScalarIndexType::None {
                return Err(MetaError::IndexDefinitionIllegal(
                    "scalar_index_type is NONE".into(),
                ));
            }
            Ok(())
        }
    }
}

fn validate_vector_parameter(parameter: &VectorIndexParameter) -> Result<(), MetaError> {
    match *parameter {
        VectorIndexParameter::Hnsw {
            dimension,
            metric_type,
            efconstruction,
            max_elements,
            nlinks,
        } => {
            require_positive("hnsw.dimension", dimension as u64)?;
            require_metric("hnsw.metric_type", metric_type)?;
            require_positive("hnsw.efconstruction", efconstruction as u64)?;
            require_positive("hnsw.max_elements", max_elements)?;
            require_positive("hnsw.nlinks", nlinks as u64)
        }
        VectorIndexParameter::Flat {
            dimension,
            metric_type,
        } => {
            require_positive("flat.dimension", dimension as u64)?;
            require_metric("flat.metric_type", metric_type)
        }
        VectorIndexParameter::IvfFlat {
            dimension,
            metric_type,
            ncentroids,
        } => {
            require_positive("ivf_flat.dimension", dimension as u64)?;
            require_metric("ivf_flat.metric_type", metric_type)?;
            require_positive("ivf_flat.ncentroids", ncentroids as u64)
        }
        VectorIndexParameter::IvfPq {
            dimension,
            metric_type,
            ncentroids,
            nsubvector,
            bucket_init_size,
            bucket_max_size,
        } => {
            require_positive("ivf_pq.dimension", dimension as u64)?;
            require_metric("ivf_pq.metric_type", metric_type)?;
            require_positive("ivf_pq.ncentroids", ncentroids as u64)?;
            require_positive("ivf_pq.nsubvector", nsubvector as u64)?;
            require_positive("ivf_pq.bucket_init_size", bucket_init_size as u64)?;
            require_positive("ivf_pq.bucket_max_size", bucket_max_size as u64)
        }
        VectorIndexParameter::Diskann {
            dimension,
            metric_type,
            num_trees,
            num_neighbors,
            num_threads,
        } => {
            require_positive("diskann.dimension", dimension as u64)?;
            require_metric("diskann.metric_type", metric_type)?;
            require_positive("diskann.num_trees", num_trees as u64)?;
            require_positive("diskann.num_neighbors", num_neighbors as u64)?;
            require_positive("diskann.num_threads", num_threads as u64)
        }
    }
}

/// Validate the auto-increment declaration of a table definition: at most
/// one auto-increment column, and it must be an integer primary-key-capable
/// column.
pub fn check_auto_increment(definition: &TableDefinition) -> Result<bool, MetaError> {
    let auto_columns: Vec<_> = definition.columns.iter().filter(|c| c.auto_increment).collect();
    match auto_columns.as_slice() {
        [] => Ok(false),
        [column] => {
            if column.column_type != basalt_common::meta::ColumnType::Int64 {
                return Err(MetaError::TableDefinitionIllegal(format!(
                    "auto-increment column {} must be Int64",
                    column.name
                )));
            }
            Ok(true)
        }
        _ => Err(MetaError::TableDefinitionIllegal(
            "more than one auto-increment column".into(),
        )),
    }
}
