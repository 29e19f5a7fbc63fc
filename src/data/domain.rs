//! Core dataset definitions and contracts.

use std::collections::BTreeSet;
use std::fmt;

use crate::common::error::ClientResult;

/// Column names a ratings table must carry, in no particular order.
pub const REQUIRED_COLUMNS: [&str; 3] = ["user", "item", "rating"];

/// User or item identifier as it appeared in the input.
///
/// Cells that read as integers are held as numbers, so `7` and `07` name the
/// same entity. Anything else is kept verbatim (after trimming).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum EntityId {
    Num(i64),
    Text(String),
}

impl EntityId {
    pub fn parse(cell: &str) -> Self {
        let cell = cell.trim();
        match cell.parse::<i64>() {
            Ok(n) => Self::Num(n),
            Err(_) => Self::Text(cell.to_string()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i32> for EntityId {
    fn from(value: i32) -> Self {
        Self::Num(value.into())
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self::Num(value)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(n) => Self::Num(n),
            Err(_) => Self::Text(value.to_string()),
        }
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

/// One observed rating.
#[derive(Clone, Debug, PartialEq)]
pub struct RatingRecord {
    pub user: EntityId,
    pub item: EntityId,
    pub rating: f64,
}

impl RatingRecord {
    pub fn new(user: impl Into<EntityId>, item: impl Into<EntityId>, rating: f64) -> Self {
        Self {
            user: user.into(),
            item: item.into(),
            rating,
        }
    }
}

/// Unvalidated tabular input: a header plus string cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<S: ToString>(&mut self, cells: impl IntoIterator<Item = S>) {
        self.rows.push(cells.into_iter().map(|c| c.to_string()).collect());
    }

    /// Build a well-formed `user,item,rating` table from records.
    pub fn from_records(records: &[RatingRecord]) -> Self {
        let mut table = Self::new(REQUIRED_COLUMNS);
        for r in records {
            table.push_row([r.user.to_string(), r.item.to_string(), r.rating.to_string()]);
        }
        table
    }
}

/// Validated, ordered ratings. New datasets are derived, never edited in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    records: Vec<RatingRecord>,
}

impl Dataset {
    pub fn new(records: Vec<RatingRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[RatingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ratings(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.rating).collect()
    }

    /// Distinct users in order of first appearance.
    pub fn users(&self) -> Vec<EntityId> {
        let mut seen = BTreeSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(&r.user))
            .map(|r| r.user.clone())
            .collect()
    }

    pub fn item_count(&self) -> usize {
        self.records.iter().map(|r| &r.item).collect::<BTreeSet<_>>().len()
    }

    pub fn into_records(self) -> Vec<RatingRecord> {
        self.records
    }
}

impl From<Vec<RatingRecord>> for Dataset {
    fn from(records: Vec<RatingRecord>) -> Self {
        Self::new(records)
    }
}

/// Per-user partition of a dataset. Predictions are aligned with `test` rows.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainTestSplit {
    pub train: Dataset,
    pub test: Dataset,
}

/// Repository contract for ratings files.
pub trait DataRepo {
    fn load_table(&self, name: &str) -> ClientResult<RawTable>;
    fn save_dataset(&self, name: &str, dataset: &Dataset) -> ClientResult<()>;
}
