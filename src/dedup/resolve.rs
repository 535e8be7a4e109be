//! Collapse duplicate features that fall inside a group's ordinal window.
//!
//! A row's ordinal within a group is the earliest position among the group's
//! samples in which the row is detected. Rows that share a feature key and are
//! members of a windowed group form a partition; when at least one of them
//! lies inside the window, the in-window row with the highest frequency for
//! that group wins and the others lose.

use crate::data::{is_detected, FeatureTable, GroupMembership, Metric};
use crate::dedup::window::{Window, WindowSpec};
use crate::error::{BolflowError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How losses in several groups combine into a discard decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AmbiguityPolicy {
    /// Discard a row only if it loses in every windowed group it is a member of.
    #[default]
    LoseEverywhere,
    /// Discard a row as soon as it loses in any windowed group.
    LoseAnywhere,
}

/// Summary of a duplicate removal pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupResult {
    /// Number of features before removal.
    pub n_before: usize,
    /// Number of features after removal.
    pub n_after: usize,
    /// Number of features removed.
    pub n_removed: usize,
    /// Number of resolved duplicate sets across all groups.
    pub n_sets: usize,
}

impl std::fmt::Display for DedupResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Duplicate Removal Result")?;
        writeln!(f, "  Before:         {} features", self.n_before)?;
        writeln!(f, "  After:          {} features", self.n_after)?;
        writeln!(f, "  Removed:        {} features", self.n_removed)?;
        writeln!(f, "  Duplicate sets: {}", self.n_sets)?;
        Ok(())
    }
}

/// Remove duplicates with the default [`AmbiguityPolicy`].
pub fn remove_duplicates<M: GroupMembership + ?Sized>(
    table: &FeatureTable,
    membership: &M,
    windows: &WindowSpec,
) -> Result<FeatureTable> {
    remove_duplicates_with(table, membership, windows, AmbiguityPolicy::default())
}

/// Remove duplicate features according to per-group windows.
///
/// Rows whose key has no duplicates pass through unchanged and row order is
/// preserved. The table must carry frequency metrics for every windowed group.
///
/// # Errors
/// * `InvalidWindowSpec` if a window is malformed or names a group without
///   samples in the table.
/// * `MissingMetrics` if a windowed group has no metrics.
pub fn remove_duplicates_with<M: GroupMembership + ?Sized>(
    table: &FeatureTable,
    membership: &M,
    windows: &WindowSpec,
    policy: AmbiguityPolicy,
) -> Result<FeatureTable> {
    remove_duplicates_with_stats(table, membership, windows, policy).map(|(t, _)| t)
}

/// Remove duplicates and report what was removed.
pub fn remove_duplicates_with_stats<M: GroupMembership + ?Sized>(
    table: &FeatureTable,
    membership: &M,
    windows: &WindowSpec,
    policy: AmbiguityPolicy,
) -> Result<(FeatureTable, DedupResult)> {
    windows.validate()?;

    let n_rows = table.n_features();
    let mut n_member = vec![0usize; n_rows];
    let mut n_lost = vec![0usize; n_rows];
    let mut n_sets = 0;

    for (group, window) in windows.iter() {
        let positioned = positioned_columns(table, membership, group)?;
        let frequency = table
            .metrics(group)
            .ok_or_else(|| BolflowError::MissingMetrics(group.to_string()))?;

        // Partition member rows by feature key, keeping first-seen order
        let mut key_order: Vec<&str> = Vec::new();
        let mut partitions: HashMap<&str, Vec<(usize, f64)>> = HashMap::new();
        for row in 0..n_rows {
            if let Some(position) = group_position(table, row, &positioned) {
                n_member[row] += 1;
                let key = table.feature_ids()[row].as_str();
                partitions
                    .entry(key)
                    .or_insert_with(|| {
                        key_order.push(key);
                        Vec::new()
                    })
                    .push((row, position));
            }
        }

        let mut group_sets = 0;
        for key in &key_order {
            let rows = &partitions[key];
            if rows.len() < 2 {
                continue;
            }
            let Some(winner) = pick_winner(rows, window, |row| frequency[row].frequency) else {
                continue;
            };
            group_sets += 1;
            for &(row, _) in rows {
                if row != winner {
                    n_lost[row] += 1;
                }
            }
        }
        debug!(
            "Group '{}' window [{}, {}]: {} duplicate set(s)",
            group, window.min, window.max, group_sets
        );
        n_sets += group_sets;
    }

    let keep: Vec<usize> = (0..n_rows)
        .filter(|&row| {
            let discard = match policy {
                AmbiguityPolicy::LoseEverywhere => n_lost[row] > 0 && n_lost[row] == n_member[row],
                AmbiguityPolicy::LoseAnywhere => n_lost[row] > 0,
            };
            !discard
        })
        .collect();

    let result = table.subset_features(&keep)?;
    let stats = DedupResult {
        n_before: n_rows,
        n_after: result.n_features(),
        n_removed: n_rows - result.n_features(),
        n_sets,
    };
    info!(
        "Removed {} duplicate feature(s) from {} duplicate set(s); {} features remain",
        stats.n_removed, stats.n_sets, stats.n_after
    );
    Ok((result, stats))
}

/// Columns of a group that carry an ordinal, as (column, position).
fn positioned_columns<M: GroupMembership + ?Sized>(
    table: &FeatureTable,
    membership: &M,
    group: &str,
) -> Result<Vec<(usize, f64)>> {
    let members: Vec<(usize, Option<f64>)> = table
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(col, column)| {
            membership
                .membership(&column.id)
                .filter(|m| m.in_group(group))
                .map(|m| (col, m.position))
        })
        .collect();

    if members.is_empty() {
        return Err(BolflowError::InvalidWindowSpec(format!(
            "group '{}' has no samples in the table",
            group
        )));
    }
    Ok(members
        .into_iter()
        .filter_map(|(col, position)| position.map(|p| (col, p)))
        .collect())
}

/// Earliest position at which a row is detected among the given columns.
fn group_position(table: &FeatureTable, row: usize, positioned: &[(usize, f64)]) -> Option<f64> {
    positioned
        .iter()
        .filter(|&&(col, _)| is_detected(table.get(row, col)))
        .map(|&(_, position)| position)
        .reduce(f64::min)
}

/// In-window row with the highest frequency; first one wins ties.
/// `None` when no row of the partition lies inside the window.
fn pick_winner<F>(rows: &[(usize, f64)], window: &Window, frequency: F) -> Option<usize>
where
    F: Fn(usize) -> Metric,
{
    let rank = |row: usize| match frequency(row) {
        Metric::Defined(v) => v,
        Metric::Undefined => f64::NEG_INFINITY,
    };

    let mut best: Option<(usize, f64)> = None;
    for &(row, position) in rows {
        if !window.contains(position) {
            continue;
        }
        let score = rank(row);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((row, score)),
        }
    }
    best.map(|(row, _)| row)
}
