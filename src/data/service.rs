//! Preprocessing: schema validation, deduplication and popularity pruning.
//!
//! Preprocessing is pure. Fingerprinting and registry traffic happen in the
//! evaluation session so this step stays testable without a network.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::common::config::PrunePolicy;
use crate::common::error::{ClientError, ClientResult};

use super::domain::{Dataset, EntityId, RatingRecord, RawTable, REQUIRED_COLUMNS};

/// Validate `raw` and apply the pruning policy, producing a cleaned dataset.
pub fn preprocess(raw: &RawTable, policy: &PrunePolicy) -> ClientResult<Dataset> {
    let records = parse_records(raw)?;
    let input_rows = records.len();

    let records = if policy.enabled {
        let deduped = drop_duplicates_keep_last(records);
        prune_window(deduped, policy)
    } else {
        records
    };

    info!(
        input_rows,
        kept_rows = records.len(),
        pruned = policy.enabled,
        "preprocessed dataset"
    );
    Ok(Dataset::new(records))
}

/// Map the three named columns to records, in any column order. Ids are
/// opaque; only the rating cell has to parse.
pub fn parse_records(raw: &RawTable) -> ClientResult<Vec<RatingRecord>> {
    if raw.columns.len() != REQUIRED_COLUMNS.len() {
        return Err(ClientError::schema(format!(
            "data needs to have exactly three columns, found {}",
            raw.columns.len()
        )));
    }

    let position = |name: &str| raw.columns.iter().position(|c| c.trim() == name);
    let (Some(user_col), Some(item_col), Some(rating_col)) =
        (position("user"), position("item"), position("rating"))
    else {
        return Err(ClientError::schema(
            "data needs to have the columns: user, item, rating",
        ));
    };

    raw.rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            if row.len() != REQUIRED_COLUMNS.len() {
                return Err(ClientError::schema(format!(
                    "row {idx} has {} cells, expected 3",
                    row.len()
                )));
            }
            let user = EntityId::parse(&row[user_col]);
            let item = EntityId::parse(&row[item_col]);
            let rating: f64 = row[rating_col].trim().parse().map_err(|_| {
                ClientError::schema(format!("row {idx}: rating {:?} is not a number", row[rating_col]))
            })?;
            if !rating.is_finite() {
                return Err(ClientError::schema(format!("row {idx}: rating must be finite")));
            }
            Ok(RatingRecord::new(user, item, rating))
        })
        .collect()
}

/// Drop rows repeating a (user, item) pair, keeping the later occurrence in place.
pub fn drop_duplicates_keep_last(records: Vec<RatingRecord>) -> Vec<RatingRecord> {
    let mut keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(records.len());
        records
            .iter()
            .rev()
            .map(|r| seen.insert((&r.user, &r.item)))
            .collect()
    };
    keep.reverse();
    records
        .into_iter()
        .zip(keep)
        .filter_map(|(r, last)| last.then_some(r))
        .collect()
}

/// Keep users (and, when configured, items) whose counts lie inside the policy window.
///
/// Both counts are taken on the deduplicated rows before either filter runs.
pub fn prune_window(records: Vec<RatingRecord>, policy: &PrunePolicy) -> Vec<RatingRecord> {
    let mut user_counts: HashMap<EntityId, usize> = HashMap::new();
    let mut item_counts: HashMap<EntityId, usize> = HashMap::new();
    for r in &records {
        *user_counts.entry(r.user.clone()).or_default() += 1;
        *item_counts.entry(r.item.clone()).or_default() += 1;
    }

    let in_window = |count: usize, lo: usize, hi: usize| count >= lo && count <= hi;
    let before = records.len();
    let kept: Vec<RatingRecord> = records
        .into_iter()
        .filter(|r| {
            in_window(
                user_counts[&r.user],
                policy.min_user_ratings,
                policy.max_user_ratings,
            )
        })
        .filter(|r| match policy.item_window {
            Some((lo, hi)) => in_window(item_counts[&r.item], lo, hi),
            None => true,
        })
        .collect();

    debug!(dropped = before - kept.len(), "applied popularity window");
    kept
}
