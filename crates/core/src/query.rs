//! SQL fragment builders.
//!
//! Every value is bound through a named placeholder of the form
//! `:{prefix}_{column}_{index}`. Each builder owns a prefix, so fragments
//! produced by different builders can be joined into one statement.

use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::schema::{is_identifier, EntityType};
use crate::value::{Criterion, Value};

/// Placeholder name (including the leading `:`) to bound value.
pub type Params = BTreeMap<String, Value>;

/// An immutable SQL text and its bound parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    sql: String,
    params: Params,
}

impl Fragment {
    pub fn new(sql: impl Into<String>, params: Params) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Params::new())
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn into_parts(self) -> (String, Params) {
        (self.sql, self.params)
    }

    /// Concatenates two fragments with a single space. Fails if both bind
    /// the same placeholder name.
    pub fn join(mut self, other: Fragment) -> Result<Fragment, CoreError> {
        for name in other.params.keys() {
            if self.params.contains_key(name) {
                return Err(CoreError::PlaceholderCollision(name.clone()));
            }
        }
        if !other.sql.is_empty() {
            if !self.sql.is_empty() {
                self.sql.push(' ');
            }
            self.sql.push_str(&other.sql);
        }
        self.params.extend(other.params);
        Ok(self)
    }
}

struct Binder<'p> {
    prefix: &'static str,
    next: usize,
    params: &'p mut Params,
}

impl<'p> Binder<'p> {
    fn new(prefix: &'static str, params: &'p mut Params) -> Self {
        Self {
            prefix,
            next: 0,
            params,
        }
    }

    fn bind(&mut self, column: &str, value: Value) -> String {
        let name = format!(":{}_{}_{}", self.prefix, column, self.next);
        self.next += 1;
        self.params.insert(name.clone(), value);
        name
    }
}

/// Builds a `WHERE` clause. Filters are AND-combined in order; each range
/// entry becomes `BETWEEN`. No usable entries yields an empty fragment,
/// which callers must treat as matching every row.
pub fn build_where(filters: &[(String, Criterion)], range: &[(String, [Value; 2])]) -> Fragment {
    let mut params = Params::new();
    let mut binder = Binder::new("w", &mut params);
    let mut conditions = Vec::new();

    for (column, criterion) in filters {
        if !is_identifier(column) {
            continue;
        }
        conditions.push(condition(&mut binder, column, criterion));
    }
    for (column, [low, high]) in range {
        if !is_identifier(column) {
            continue;
        }
        let low = binder.bind(column, low.clone());
        let high = binder.bind(column, high.clone());
        conditions.push(format!("{column} BETWEEN {low} AND {high}"));
    }

    if conditions.is_empty() {
        return Fragment::default();
    }
    Fragment::new(format!("WHERE {}", conditions.join(" AND ")), params)
}

fn condition(binder: &mut Binder<'_>, column: &str, criterion: &Criterion) -> String {
    match criterion {
        Criterion::Is(Value::Null) => format!("{column} IS NULL"),
        Criterion::Is(value) => format!("{column} = {}", binder.bind(column, value.clone())),
        Criterion::NotNull => format!("{column} IS NOT NULL"),
        Criterion::AnyOf(members) => {
            let mut placeholders = Vec::new();
            let mut null = false;
            let mut not_null = false;
            for member in members {
                match member {
                    Criterion::Is(Value::Null) => null = true,
                    Criterion::Is(value) => placeholders.push(binder.bind(column, value.clone())),
                    Criterion::NotNull => not_null = true,
                    Criterion::AnyOf(_) => {}
                }
            }
            let mut branches = Vec::new();
            if !placeholders.is_empty() {
                branches.push(format!("{column} IN ({})", placeholders.join(", ")));
            }
            if not_null {
                branches.push(format!("{column} IS NOT NULL"));
            }
            if null {
                branches.push(format!("{column} IS NULL"));
            }
            match branches.len() {
                0 => "1 = 0".to_string(),
                1 => branches.remove(0),
                _ => format!("({})", branches.join(" OR ")),
            }
        }
    }
}

/// `SET a = :s_a_0, ...`. Keys that are not plain identifiers are skipped.
pub fn build_set(assignments: &[(String, Value)]) -> Fragment {
    let mut params = Params::new();
    let mut binder = Binder::new("s", &mut params);
    let parts: Vec<String> = assignments
        .iter()
        .filter(|(column, _)| is_identifier(column))
        .map(|(column, value)| format!("{column} = {}", binder.bind(column, value.clone())))
        .collect();
    if parts.is_empty() {
        return Fragment::default();
    }
    Fragment::new(format!("SET {}", parts.join(", ")), params)
}

/// `(a, b) VALUES (:v_a_0, :v_b_1)`, same skip rule as `build_set`.
pub fn build_values(assignments: &[(String, Value)]) -> Fragment {
    let mut params = Params::new();
    let mut binder = Binder::new("v", &mut params);
    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    for (column, value) in assignments {
        if !is_identifier(column) {
            continue;
        }
        columns.push(column.as_str());
        placeholders.push(binder.bind(column, value.clone()));
    }
    if columns.is_empty() {
        return Fragment::default();
    }
    Fragment::new(
        format!("({}) VALUES ({})", columns.join(", "), placeholders.join(", ")),
        params,
    )
}

/// Multi-row `VALUES` for a batch insert. The column list is taken from the
/// first row; every other row must supply the same columns.
pub fn build_values_batch(rows: &[Vec<(String, Value)>]) -> Result<(Fragment, Vec<String>), CoreError> {
    let Some(first) = rows.first() else {
        return Ok((Fragment::default(), Vec::new()));
    };
    let columns: Vec<String> = first
        .iter()
        .map(|(column, _)| column.clone())
        .filter(|column| is_identifier(column))
        .collect();
    if columns.is_empty() {
        return Err(CoreError::NoValidColumns);
    }

    let mut params = Params::new();
    let mut tuples = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let mut placeholders = Vec::with_capacity(columns.len());
        for column in &columns {
            let value = lookup(row, column).ok_or_else(|| {
                CoreError::InvalidData(format!("row {index} is missing column {column}"))
            })?;
            let name = format!(":v_{column}_{index}");
            params.insert(name.clone(), value.clone());
            placeholders.push(name);
        }
        tuples.push(format!("({})", placeholders.join(", ")));
    }

    let sql = format!("({}) VALUES {}", columns.join(", "), tuples.join(", "));
    Ok((Fragment::new(sql, params), columns))
}

/// `*` for no columns, otherwise the declared persisted columns among
/// `columns`.
pub fn build_columns<S: AsRef<str>>(entity: &EntityType, columns: &[S]) -> Result<String, CoreError> {
    if columns.is_empty() {
        return Ok("*".to_string());
    }
    let valid: Vec<&str> = columns
        .iter()
        .map(AsRef::as_ref)
        .filter(|column| entity.is_persisted(column))
        .collect();
    if valid.is_empty() {
        return Err(CoreError::NoValidColumns);
    }
    Ok(valid.join(", "))
}

/// `ORDER BY` over declared columns; undeclared keys are dropped. Only
/// `desc` (any case) sorts descending.
pub fn build_order<S: AsRef<str>, D: AsRef<str>>(entity: &EntityType, sort: &[(S, D)]) -> String {
    let parts: Vec<String> = sort
        .iter()
        .filter(|(column, _)| entity.is_persisted(column.as_ref()))
        .map(|(column, direction)| {
            let direction = if direction.as_ref().eq_ignore_ascii_case("desc") {
                "DESC"
            } else {
                "ASC"
            };
            format!("{} {direction}", column.as_ref())
        })
        .collect();
    if parts.is_empty() {
        return String::new();
    }
    format!("ORDER BY {}", parts.join(", "))
}

pub fn build_limit(limit: i64) -> String {
    format!("LIMIT {}", limit.max(1))
}

pub fn build_offset(offset: i64) -> String {
    format!("OFFSET {}", offset.max(0))
}

/// Result of `build_batch_set`: the `SET` fragment and the distinct key
/// tuples it touches, in first-appearance order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSet {
    pub fragment: Fragment,
    pub keys: Vec<Vec<(String, Value)>>,
}

/// One `col = CASE WHEN k1 = .. AND k2 = .. THEN .. ELSE col END` per
/// non-key column. A row that omits a column leaves it untouched.
pub fn build_batch_set(rows: &[Vec<(String, Value)>], keys: &[String]) -> Result<BatchSet, CoreError> {
    let mut tuples: Vec<Vec<(String, Value)>> = Vec::new();
    for row in rows {
        let mut tuple = Vec::with_capacity(keys.len());
        for key in keys {
            match lookup(row, key) {
                Some(value) if !value.is_null() => tuple.push((key.clone(), value.clone())),
                _ => return Err(CoreError::MissingKeyColumn { column: key.clone() }),
            }
        }
        if !tuples.contains(&tuple) {
            tuples.push(tuple);
        }
    }

    let mut fields: Vec<&str> = Vec::new();
    for row in rows {
        for (column, _) in row {
            if !keys.contains(column) && is_identifier(column) && !fields.contains(&column.as_str()) {
                fields.push(column);
            }
        }
    }

    let mut params = Params::new();
    let mut expressions = Vec::new();
    for field in fields {
        let mut whens = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let Some(value) = lookup(row, field) else {
                continue;
            };
            let mut matches = Vec::with_capacity(keys.len());
            for key in keys {
                let name = format!(":bk_{key}_{index}");
                if let Some(key_value) = lookup(row, key) {
                    params.insert(name.clone(), key_value.clone());
                }
                matches.push(format!("{key} = {name}"));
            }
            let then = format!(":bs_{field}_{index}");
            params.insert(then.clone(), value.clone());
            whens.push(format!("WHEN {} THEN {then}", matches.join(" AND ")));
        }
        if !whens.is_empty() {
            expressions.push(format!("{field} = CASE {} ELSE {field} END", whens.join(" ")));
        }
    }

    if expressions.is_empty() {
        return Ok(BatchSet {
            fragment: Fragment::default(),
            keys: tuples,
        });
    }
    Ok(BatchSet {
        fragment: Fragment::new(format!("SET {}", expressions.join(", ")), params),
        keys: tuples,
    })
}

/// Restricts a batch statement to exactly the given key tuples. A single
/// key column renders a plain `IN`; several render a row-value `IN`.
pub fn build_batch_where(tuples: &[Vec<(String, Value)>]) -> Result<Fragment, CoreError> {
    let Some(first) = tuples.first() else {
        return Ok(Fragment::default());
    };
    let keys: Vec<&str> = first.iter().map(|(key, _)| key.as_str()).collect();
    if keys.is_empty() || keys.iter().any(|key| !is_identifier(key)) {
        return Err(CoreError::NoValidColumns);
    }

    let mut params = Params::new();
    let mut rendered = Vec::with_capacity(tuples.len());
    for (index, tuple) in tuples.iter().enumerate() {
        let mut placeholders = Vec::with_capacity(keys.len());
        for key in &keys {
            let value = lookup(tuple, key)
                .ok_or_else(|| CoreError::MissingKeyColumn { column: key.to_string() })?;
            let name = format!(":bw_{key}_{index}");
            params.insert(name.clone(), value.clone());
            placeholders.push(name);
        }
        rendered.push(placeholders.join(", "));
    }

    let sql = if keys.len() == 1 {
        format!("WHERE {} IN ({})", keys[0], rendered.join(", "))
    } else {
        let rows: Vec<String> = rendered.iter().map(|r| format!("({r})")).collect();
        format!("WHERE ({}) IN (VALUES {})", keys.join(", "), rows.join(", "))
    };
    Ok(Fragment::new(sql, params))
}

fn lookup<'a>(row: &'a [(String, Value)], column: &str) -> Option<&'a Value> {
    row.iter().find(|(name, _)| name == column).map(|(_, value)| value)
}
