//! Context - the store, runner and config an encoding session works with.
//!
//! Nothing here is global: a caller builds one context per session (tests
//! build one per case) and passes it down.

use std::path::Path;
use std::sync::Arc;

use crate::config::EncoderConfig;
use crate::encoding::encoder::TargetEncoder;
use crate::error::Result;
use crate::frame::builder::TableBuilder;
use crate::frame::planner::SegmentPlanner;
use crate::frame::table::Table;
use crate::store::{KeyedStore, Scope};
use crate::task::{ResourceManager, TaskMetrics, TaskRunner, TuningProfile};

pub struct Context {
    store: KeyedStore,
    runner: TaskRunner,
    config: EncoderConfig,
    tuning: TuningProfile,
}

impl Context {
    /// Context tuned from the detected system, with `config` overrides.
    pub fn new(config: EncoderConfig) -> Result<Self> {
        Self::with_profile(config, ResourceManager::auto_tune())
    }

    /// Context tuned from an explicit profile, with `config` overrides.
    pub fn with_profile(config: EncoderConfig, profile: TuningProfile) -> Result<Self> {
        config.validate()?;
        let tuning = config.tuning(profile);
        let runner = TaskRunner::with_metrics(tuning.worker_threads, Arc::new(TaskMetrics::new()))?;
        tracing::debug!(
            worker_threads = tuning.worker_threads,
            rows_per_segment = tuning.rows_per_segment,
            memory_pressure = tuning.memory_pressure,
            "context created"
        );
        Ok(Self {
            store: KeyedStore::new(),
            runner,
            config,
            tuning,
        })
    }

    /// Context configured from `dir/encoder_config.json`, defaults if absent.
    pub fn open(dir: &Path) -> Result<Self> {
        let config = EncoderConfig::read_from(dir)?.unwrap_or_default();
        Self::new(config)
    }

    pub fn store(&self) -> &KeyedStore {
        &self.store
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn tuning(&self) -> &TuningProfile {
        &self.tuning
    }

    /// Table builder partitioning with this context's segment size.
    pub fn table_builder(&self) -> TableBuilder {
        TableBuilder::new().with_planner(SegmentPlanner::new(self.tuning.rows_per_segment))
    }

    /// Build `builder` and bind the result in this context's store.
    /// The caller owns the binding and removes it when done.
    pub fn build_table(&self, builder: TableBuilder) -> Result<Arc<Table>> {
        let table = Arc::new(builder.build()?);
        self.store.put_table(Arc::clone(&table));
        tracing::debug!(key = %table.key(), rows = table.num_rows(), "table bound");
        Ok(table)
    }

    pub fn encoder(&self) -> TargetEncoder<'_> {
        TargetEncoder::from_config(&self.runner, &self.config)
    }

    pub fn scope(&self) -> Scope<'_> {
        Scope::enter(&self.store)
    }
}
