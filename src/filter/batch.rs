//! Batched inserts with a commit per batch.

use tracing::{debug, error};

use crate::error::{FilterError, Result};
use crate::filter::StageContext;
use crate::store::{Row, TabularStore};

/// Buffers rows for one output table and writes them a batch at a time,
/// each batch in its own transaction.
pub(crate) struct BatchInserter<'a> {
    store: &'a mut dyn TabularStore,
    stage: &'static str,
    table: String,
    ctx: &'a StageContext,
    pending: Vec<Row>,
    written: usize,
}

impl<'a> BatchInserter<'a> {
    pub(crate) fn new(
        store: &'a mut dyn TabularStore,
        stage: &'static str,
        table: &str,
        ctx: &'a StageContext,
    ) -> Self {
        Self {
            store,
            stage,
            table: table.to_string(),
            ctx,
            pending: Vec::with_capacity(ctx.batch_size().min(65_536)),
            written: 0,
        }
    }

    pub(crate) fn push(&mut self, row: Row) -> Result<()> {
        self.pending.push(row);
        if self.pending.len() >= self.ctx.batch_size() {
            self.flush()?;
        }
        Ok(())
    }

    pub(crate) fn extend(&mut self, rows: impl IntoIterator<Item = Row>) -> Result<()> {
        for row in rows {
            self.push(row)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if self.ctx.cancel().is_cancelled() {
            return Err(FilterError::Cancelled(self.stage.to_string()));
        }
        let rows = std::mem::take(&mut self.pending);
        let count = rows.len();
        self.store.begin_transaction()?;
        if let Err(err) = self.store.insert_rows(&self.table, rows) {
            error!(stage = self.stage, table = %self.table, %err, "batch insert failed");
            self.store.rollback()?;
            return Err(err.into());
        }
        self.store.commit()?;
        self.written += count;
        debug!(stage = self.stage, table = %self.table, rows = count, total = self.written, "committed batch");
        Ok(())
    }

    /// Flush the remainder and return the number of rows written.
    pub(crate) fn finish(mut self) -> Result<usize> {
        self.flush()?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::CancellationToken;
    use crate::store::{ColumnSpec, ColumnType, MemoryStore, Schema, Value};

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .create_table("out", &Schema::new(vec![ColumnSpec::new("n", ColumnType::Int)]))
            .unwrap();
        store
    }

    #[test]
    fn commits_every_batch() {
        let mut store = store();
        let ctx = StageContext::with_batch_size(2);
        let mut inserter = BatchInserter::new(&mut store, "test", "out", &ctx);
        inserter.extend((0..5).map(|n| vec![Value::Int(n)])).unwrap();
        assert_eq!(inserter.finish().unwrap(), 5);
        assert!(!store.in_transaction());
        assert_eq!(store.row_count("out").unwrap(), 5);
    }

    #[test]
    fn cancellation_stops_between_batches() {
        let mut store = store();
        let token = CancellationToken::new();
        let ctx = StageContext::with_batch_size(2).with_cancellation(token.clone());
        let mut inserter = BatchInserter::new(&mut store, "test", "out", &ctx);
        inserter.push(vec![Value::Int(1)]).unwrap();
        inserter.push(vec![Value::Int(2)]).unwrap();
        token.cancel();
        inserter.push(vec![Value::Int(3)]).unwrap();
        let err = inserter.push(vec![Value::Int(4)]).unwrap_err();
        assert!(matches!(err, FilterError::Cancelled(_)));
        assert_eq!(store.row_count("out").unwrap(), 2);
    }

    #[test]
    fn failed_batch_is_rolled_back() {
        let mut store = store();
        let ctx = StageContext::with_batch_size(10);
        let mut inserter = BatchInserter::new(&mut store, "test", "out", &ctx);
        inserter.push(vec![Value::Int(1)]).unwrap();
        inserter.push(vec![Value::from("bad")]).unwrap();
        assert!(inserter.finish().is_err());
        assert!(!store.in_transaction());
        assert_eq!(store.row_count("out").unwrap(), 0);
    }
}
