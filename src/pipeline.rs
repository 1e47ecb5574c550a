//! Staged sync: one collect-normalize-upsert pass per entity kind.
//!
//! Stages always run in [`EntityKind::ALL`] order. The opponent stages read
//! the team table to decide which opponents to fetch, so they declare a
//! dependency on the team stage and are blocked when that stage fails in the
//! same run. When the team stage is not part of the run, the opponent stages
//! read whatever an earlier run left in the table.

use std::collections::HashMap;

use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::orchestrator::{Collection, EntityKind, Orchestrator, PeriodReport};
use crate::record::Record;
use crate::source::GameLogSource;
use crate::store::Store;
use crate::upsert::{dedup_by_key, upsert};

#[derive(Debug, Clone, PartialEq)]
pub enum StageStatus {
    Synced,
    NothingToWrite,
    Blocked { on: EntityKind },
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub kind: EntityKind,
    pub table: &'static str,
    pub status: StageStatus,
    pub periods: Vec<PeriodReport>,
    pub records_collected: usize,
    pub rows_upserted: usize,
}

impl StageReport {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            table: kind.table().name,
            status: StageStatus::NothingToWrite,
            periods: Vec::new(),
            records_collected: 0,
            rows_upserted: 0,
        }
    }

    pub fn periods_succeeded(&self) -> usize {
        self.periods.iter().filter(|p| p.succeeded()).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub stages: Vec<StageReport>,
}

impl SyncSummary {
    pub fn stage(&self, kind: EntityKind) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    pub fn rows_upserted(&self) -> usize {
        self.stages.iter().map(|s| s.rows_upserted).sum()
    }

    pub fn failed_stages(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| matches!(s.status, StageStatus::Failed(_) | StageStatus::Blocked { .. }))
            .count()
    }
}

pub struct SyncPipeline<S, D> {
    orchestrator: Orchestrator<S, D>,
    stages: Vec<EntityKind>,
}

impl<S: GameLogSource, D: Store> SyncPipeline<S, D> {
    pub fn new(orchestrator: Orchestrator<S, D>) -> Self {
        Self {
            orchestrator,
            stages: EntityKind::ALL.to_vec(),
        }
    }

    /// Restrict the run to `kinds`. Declared stage order is kept regardless of
    /// the order given.
    pub fn with_stages(mut self, kinds: &[EntityKind]) -> Self {
        self.stages = EntityKind::ALL
            .into_iter()
            .filter(|k| kinds.contains(k))
            .collect();
        self
    }

    pub fn stages(&self) -> &[EntityKind] {
        &self.stages
    }

    pub fn orchestrator(&self) -> &Orchestrator<S, D> {
        &self.orchestrator
    }

    /// Run every stage over `periods`. Only an unreachable store stops the run.
    pub fn run(&self, periods: &[i32]) -> Result<SyncSummary, StoreError> {
        let mut summary = SyncSummary::default();
        let mut status_of: HashMap<EntityKind, StageStatus> = HashMap::new();

        for &kind in &self.stages {
            let mut report = StageReport::new(kind);

            if let Some(dep) = kind.depends_on()
                && matches!(status_of.get(&dep), Some(StageStatus::Failed(_) | StageStatus::Blocked { .. }))
            {
                warn!(stage = kind.label(), on = dep.label(), "stage blocked by failed dependency");
                report.status = StageStatus::Blocked { on: dep };
                status_of.insert(kind, report.status.clone());
                summary.stages.push(report);
                continue;
            }

            match self.run_stage(kind, periods, &mut report) {
                Ok(status) => report.status = status,
                Err(err) if err.is_fatal() => {
                    error!(stage = kind.label(), error = %err, "store unavailable, aborting run");
                    return Err(err);
                }
                Err(err) => {
                    error!(stage = kind.label(), error = %err, "stage failed");
                    report.status = StageStatus::Failed(err.to_string());
                }
            }
            status_of.insert(kind, report.status.clone());
            summary.stages.push(report);
        }

        Ok(summary)
    }

    fn run_stage(
        &self,
        kind: EntityKind,
        periods: &[i32],
        report: &mut StageReport,
    ) -> Result<StageStatus, StoreError> {
        let Collection { records, periods } = self.orchestrator.collect(kind, periods)?;
        report.periods = periods;
        report.records_collected = records.len();

        let table = kind.table();
        let columns = self.orchestrator.store().table_columns(table.name)?;
        if columns.is_empty() {
            return Err(StoreError::schema_mismatch(table.name, "table does not exist"));
        }
        let key = table.unique_key();

        let batch = records
            .iter()
            .map(|r| r.reindex(&columns))
            .collect::<Vec<Record>>();
        let batch = dedup_by_key(batch, &key);
        if batch.is_empty() {
            info!(stage = kind.label(), "nothing to write");
            return Ok(StageStatus::NothingToWrite);
        }

        let written = upsert(self.orchestrator.store(), &batch, table.name, &key)?;
        report.rows_upserted = written;
        info!(stage = kind.label(), table = table.name, rows = written, "stage upserted");
        Ok(StageStatus::Synced)
    }
}
