//! Outer join of feature tables on the feature key.

use crate::data::{FeatureTable, GroupMembership, SampleColumn};
use crate::error::{BolflowError, Result};
use log::{debug, info};
use std::collections::HashMap;

/// Merge one or more tables into a single feature-by-sample table.
///
/// Rows are aligned by feature key. A key that occurs several times in an
/// input (a duplicate feature) is aligned by occurrence: the k-th row with
/// that key in one table meets the k-th row with that key in another. Rows
/// appear in order of first appearance across the inputs, sample columns in
/// input order.
///
/// Annotation columns are unioned by name, keeping the first non-empty value.
/// Unclassified numeric columns (descriptors such as `mz` or `rt`) are merged
/// the same way, keeping the first present value.
/// Derived metric columns are dropped, and every sample column is classified
/// with `membership`.
///
/// # Errors
/// * `EmptyData` if `tables` is empty.
/// * `DuplicateSample` if a classified sample column appears in more than one
///   input.
pub fn join_tables<M: GroupMembership + ?Sized>(
    tables: &[FeatureTable],
    membership: &M,
) -> Result<FeatureTable> {
    let first = tables
        .first()
        .ok_or_else(|| BolflowError::EmptyData("No tables to join".to_string()))?;

    // Sample columns, in input order. Unclassified numeric columns shared by
    // several inputs (mz, rt, ...) are merged by name.
    let mut column_index: HashMap<String, usize> = HashMap::new();
    let mut columns: Vec<SampleColumn> = Vec::new();
    let mut col_maps: Vec<Vec<usize>> = Vec::with_capacity(tables.len());
    for table in tables {
        let mut map = Vec::with_capacity(table.n_samples());
        for column in table.columns() {
            let classified = membership.membership(&column.id).is_some();
            let dst = match column_index.get(&column.id).copied() {
                Some(dst) if !classified => dst,
                Some(_) => return Err(BolflowError::DuplicateSample(column.id.clone())),
                None => {
                    columns.push(SampleColumn::classified(&column.id, membership));
                    column_index.insert(column.id.clone(), columns.len() - 1);
                    columns.len() - 1
                }
            };
            map.push(dst);
        }
        col_maps.push(map);
    }

    // Annotation columns, unioned by name
    let mut annotation_names: Vec<String> = Vec::new();
    for table in tables {
        for name in table.annotation_names() {
            if !annotation_names.contains(name) {
                annotation_names.push(name.clone());
            }
        }
    }

    // Align rows by (key, occurrence)
    let mut row_index: HashMap<(String, usize), usize> = HashMap::new();
    let mut feature_ids: Vec<String> = Vec::new();
    let mut row_maps: Vec<Vec<usize>> = Vec::with_capacity(tables.len());
    for table in tables {
        let mut occurrences: HashMap<&str, usize> = HashMap::new();
        let mut map = Vec::with_capacity(table.n_features());
        for key in table.feature_ids() {
            let occurrence = occurrences.entry(key.as_str()).or_insert(0);
            let slot = (key.clone(), *occurrence);
            *occurrence += 1;
            let idx = *row_index.entry(slot).or_insert_with(|| {
                feature_ids.push(key.clone());
                feature_ids.len() - 1
            });
            map.push(idx);
        }
        row_maps.push(map);
    }

    let n_rows = feature_ids.len();
    let mut rows: Vec<Vec<Option<f64>>> = vec![vec![None; columns.len()]; n_rows];
    let mut annotations: Vec<Vec<String>> = vec![vec![String::new(); annotation_names.len()]; n_rows];

    for (t, table) in tables.iter().enumerate() {
        let col_map = &col_maps[t];
        let name_map: Vec<(usize, usize)> = table
            .annotation_names()
            .iter()
            .enumerate()
            .filter_map(|(src, name)| {
                annotation_names
                    .iter()
                    .position(|n| n == name)
                    .map(|dst| (src, dst))
            })
            .collect();

        for (src_row, &dst_row) in row_maps[t].iter().enumerate() {
            for (col, &dst_col) in col_map.iter().enumerate() {
                let cell = &mut rows[dst_row][dst_col];
                if cell.is_none() {
                    *cell = table.get(src_row, col);
                }
            }
            for &(src_idx, dst_idx) in &name_map {
                let value = &table.annotation_row(src_row)[src_idx];
                if annotations[dst_row][dst_idx].is_empty() && !value.is_empty() {
                    annotations[dst_row][dst_idx] = value.clone();
                }
            }
        }
        debug!(
            "Joined table {} ({} features x {} samples)",
            t + 1,
            table.n_features(),
            table.n_samples()
        );
    }

    let joined = FeatureTable::from_rows(feature_ids, columns, &rows)?
        .with_annotations(annotation_names, annotations)?
        .with_key_header(first.key_header());

    info!(
        "Joined {} table(s) into {} features x {} samples",
        tables.len(),
        joined.n_features(),
        joined.n_samples()
    );
    Ok(joined)
}
