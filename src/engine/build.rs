//! Pipeline construction from a [`PipelineConfig`]

use super::{FileTarget, Pipeline, PipelineSettings, WarehouseTarget};
use crate::assemble::BatchAssembler;
use crate::coerce::TypeResolver;
use crate::config::{PipelineConfig, SourceConfig};
use crate::error::Result;
use crate::flatten::Flattener;
use crate::http::HttpClientConfig;
use crate::output::ObjectStoreFileSink;
use crate::secrets::SecretResolver;
use crate::source::{DataApiSource, DocumentSource, JsonlSource};
use crate::template::{self, TemplateContext};
use crate::warehouse::{ConnectionPool, DuckDbConnector, WarehouseSink};
use std::sync::Arc;
use std::time::Duration;

impl Pipeline {
    /// Build the source, sinks and stages a config describes
    ///
    /// Secrets are resolved and the warehouse is opened here, so a bad
    /// credential or path fails before any collection starts.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let secrets = SecretResolver::new(config.secrets_dir.clone());
        let source = build_source(config, &secrets)?;

        let mut pipeline = Pipeline::new(source)
            .with_settings(settings(config))
            .with_assembler(assembler(config))
            .with_retry(config.retry.clone());

        let env = TemplateContext::new();
        if let Some(file_sink) = &config.file_sink {
            let base = template::render(&file_sink.base, &env)?;
            let sink = ObjectStoreFileSink::from_url(&base)?
                .with_parquet_config(file_sink.parquet.clone());
            pipeline = pipeline.with_file_target(
                FileTarget::new(Arc::new(sink))
                    .with_path(file_sink.path.clone())
                    .with_run_suffix(file_sink.run_suffix)
                    .with_options(file_sink.options),
            );
        }

        if let Some(warehouse) = &config.warehouse {
            let path = template::render(&warehouse.path, &env)?;
            let connector = Arc::new(DuckDbConnector::open(&path)?);
            let pool = Arc::new(ConnectionPool::new(connector, warehouse.pool_size));
            let sink = WarehouseSink::new(pool)
                .with_retry(config.retry.clone())
                .with_generic_type(warehouse.generic_type.clone());
            pipeline = pipeline.with_warehouse_target(
                WarehouseTarget::new(Arc::new(sink), warehouse.schema.clone())
                    .with_table(warehouse.table.clone()),
            );
        }

        Ok(pipeline)
    }
}

fn build_source(config: &PipelineConfig, secrets: &SecretResolver) -> Result<Arc<dyn DocumentSource>> {
    match &config.source {
        SourceConfig::DataApi {
            url,
            data_source,
            database,
            api_key,
            timeout_secs,
            rate_limit,
            records_path,
        } => {
            let key = secrets.require(api_key)?;
            let mut http = HttpClientConfig::builder()
                .timeout(Duration::from_secs(*timeout_secs))
                .retry(config.retry.clone());
            if let Some(rate_limit) = rate_limit {
                http = http.rate_limit(*rate_limit);
            }
            let source = DataApiSource::connect(url, &key, data_source, database, http.build())?
                .with_records_path(records_path.clone());
            Ok(Arc::new(source))
        }
        SourceConfig::Jsonl { dir } => Ok(Arc::new(JsonlSource::new(dir.clone()))),
    }
}

fn settings(config: &PipelineConfig) -> PipelineSettings {
    PipelineSettings::new()
        .with_batch_size(config.batch_size)
        .with_worker_concurrency(config.worker_concurrency)
        .with_collection_concurrency(config.collection_concurrency)
        .with_sort_key(config.sort_key.clone())
        .with_record_cap(config.record_cap())
}

fn assembler(config: &PipelineConfig) -> BatchAssembler {
    BatchAssembler::new()
        .with_flattener(Flattener::new().with_max_depth(config.flatten.max_depth))
        .with_resolver(
            TypeResolver::new()
                .with_rules(config.coerce.rules.clone())
                .with_sniff_strings(config.coerce.sniff_strings),
        )
        .with_id_columns(config.dedup.id_columns.clone())
        .with_metadata(config.metadata.clone())
}
