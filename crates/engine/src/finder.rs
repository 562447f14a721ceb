use std::sync::Arc;

use rowforge_core::query::{build_columns, build_limit, build_offset, build_order, build_where};
use rowforge_core::{Criterion, EntityType, Record, Row, Value};
use rowforge_storage::Database;

use crate::{Engine, EngineError};

/// A read over one entity's table.
#[derive(Debug, Clone, Default)]
pub struct Query {
    filters: Vec<(String, Criterion)>,
    ranges: Vec<(String, [Value; 2])>,
    columns: Vec<String>,
    sort: Vec<(String, String)>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, column: &str, criterion: Criterion) -> Self {
        self.filters.push((column.to_string(), criterion));
        self
    }

    pub fn between(mut self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.ranges.push((column.to_string(), [low.into(), high.into()]));
        self
    }

    /// Restricts the selected columns. Selecting nothing selects every column.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by(mut self, column: &str, direction: &str) -> Self {
        self.sort.push((column.to_string(), direction.to_string()));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl<D: Database> Engine<D> {
    /// The first stored record matching `filters`, loaded with every
    /// persisted column.
    pub fn find_by(
        &self,
        entity: &Arc<EntityType>,
        filters: &[(String, Criterion)],
    ) -> Result<Option<Record>, EngineError> {
        match self.first_row(entity, filters)? {
            Some(row) => Ok(Some(Record::from_row(entity, &row)?)),
            None => Ok(None),
        }
    }

    pub fn find_all(&self, entity: &Arc<EntityType>, query: &Query) -> Result<Vec<Record>, EngineError> {
        for (column, _) in &query.filters {
            entity.require_persisted(column)?;
        }
        for (column, _) in &query.ranges {
            entity.require_persisted(column)?;
        }

        let filter = build_where(&query.filters, &query.ranges);
        let mut clauses = vec![
            format!("SELECT {}", build_columns(entity, &query.columns)?),
            format!("FROM {}", entity.table()),
            filter.sql().to_string(),
            build_order(entity, &query.sort),
        ];
        match (query.limit, query.offset) {
            (Some(limit), offset) => {
                clauses.push(build_limit(limit));
                clauses.extend(offset.map(build_offset));
            }
            (None, Some(offset)) => {
                clauses.push("LIMIT -1".to_string());
                clauses.push(build_offset(offset));
            }
            (None, None) => {}
        }
        clauses.retain(|clause| !clause.is_empty());

        let rows = self.storage().fetch_all(&clauses.join(" "), filter.params())?;
        rows.iter()
            .map(|row| Record::from_row(entity, row).map_err(EngineError::from))
            .collect()
    }

    pub(crate) fn first_row(
        &self,
        entity: &EntityType,
        filters: &[(String, Criterion)],
    ) -> Result<Option<Row>, EngineError> {
        for (column, _) in filters {
            entity.require_persisted(column)?;
        }
        let columns: Vec<&str> = entity.persisted_columns().collect();
        let filter = build_where(filters, &[]);
        let sql = format!(
            "SELECT {} FROM {} {} LIMIT 1",
            build_columns(entity, &columns)?,
            entity.table(),
            filter.sql()
        );
        Ok(self.storage().fetch_one(&sql, filter.params())?)
    }
}
