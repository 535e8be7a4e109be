//! Feature-by-sample measurement table.
//!
//! Rows are features (compounds), columns are samples. Besides the numeric
//! sample values a row carries free-text annotation columns (name, m/z, ...)
//! and, once group statistics have run, one [`MetricSet`] per group.

use crate::data::classification::GroupMembership;
use crate::data::metric::{is_missing_marker, Metric, MetricKind, MetricSet, MISSING};
use crate::error::{BolflowError, Result};
use nalgebra::DMatrix;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Default header of the feature key column.
pub const DEFAULT_KEY_HEADER: &str = "feature";

/// Pick the field delimiter from a file extension: tab for `.tsv`/`.txt`/`.tab`,
/// comma otherwise.
pub fn delimiter_for(path: &Path) -> u8 {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("tsv") | Some("txt") | Some("tab") => b'\t',
        _ => b',',
    }
}

/// Whether a value counts as a detection: present and non-zero.
#[inline]
pub fn is_detected(value: Option<f64>) -> bool {
    matches!(value, Some(v) if v != 0.0)
}

/// A sample column with its classification.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleColumn {
    /// Sample identifier (column header).
    pub id: String,
    /// Group labels of the sample; empty when unclassified.
    pub groups: BTreeSet<String>,
    /// Ordinal position of the sample, if known.
    pub position: Option<f64>,
}

impl SampleColumn {
    /// A column with no group memberships.
    pub fn unclassified(id: &str) -> Self {
        Self {
            id: id.to_string(),
            groups: BTreeSet::new(),
            position: None,
        }
    }

    /// A column classified by a membership lookup.
    pub fn classified<M: GroupMembership + ?Sized>(id: &str, membership: &M) -> Self {
        match membership.membership(id) {
            Some(m) => Self {
                id: id.to_string(),
                groups: m.groups.clone(),
                position: m.position,
            },
            None => Self::unclassified(id),
        }
    }

    /// Check if the column belongs to a group.
    pub fn in_group(&self, label: &str) -> bool {
        self.groups.contains(label)
    }

    /// Check if the column has any group membership.
    pub fn is_classified(&self) -> bool {
        !self.groups.is_empty()
    }
}

/// Feature table: feature rows × sample columns plus annotations and metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    /// Header of the feature key column.
    key_header: String,
    /// Feature keys (row names). Not necessarily unique before duplicate removal.
    feature_ids: Vec<String>,
    /// Annotation column names.
    annotation_names: Vec<String>,
    /// Annotation values, row-major.
    annotations: Vec<Vec<String>>,
    /// Sample columns.
    columns: Vec<SampleColumn>,
    /// Values (features × samples); `None` is missing.
    values: DMatrix<Option<f64>>,
    /// Derived metrics per group label, one entry per row.
    metrics: BTreeMap<String, Vec<MetricSet>>,
}

/// Role of a column while reading a table file.
enum ColumnRole {
    Annotation,
    Sample,
    Metric(MetricKind, String),
}

impl FeatureTable {
    /// Create a table from feature keys, sample columns and values.
    pub fn new(
        feature_ids: Vec<String>,
        columns: Vec<SampleColumn>,
        values: DMatrix<Option<f64>>,
    ) -> Result<Self> {
        if values.nrows() != feature_ids.len() {
            return Err(BolflowError::DimensionMismatch {
                expected: values.nrows(),
                actual: feature_ids.len(),
            });
        }
        if values.ncols() != columns.len() {
            return Err(BolflowError::DimensionMismatch {
                expected: values.ncols(),
                actual: columns.len(),
            });
        }
        check_unique_samples(&columns)?;
        let annotations = vec![Vec::new(); feature_ids.len()];
        Ok(Self {
            key_header: DEFAULT_KEY_HEADER.to_string(),
            feature_ids,
            annotation_names: Vec::new(),
            annotations,
            columns,
            values,
            metrics: BTreeMap::new(),
        })
    }

    /// Create a table from row-major values.
    pub fn from_rows(
        feature_ids: Vec<String>,
        columns: Vec<SampleColumn>,
        rows: &[Vec<Option<f64>>],
    ) -> Result<Self> {
        if rows.len() != feature_ids.len() {
            return Err(BolflowError::DimensionMismatch {
                expected: feature_ids.len(),
                actual: rows.len(),
            });
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(BolflowError::DimensionMismatch {
                expected: columns.len(),
                actual: bad.len(),
            });
        }
        let values = DMatrix::from_fn(rows.len(), columns.len(), |r, c| rows[r][c]);
        Self::new(feature_ids, columns, values)
    }

    /// Attach annotation columns (row-major values).
    pub fn with_annotations(mut self, names: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if rows.len() != self.n_features() {
            return Err(BolflowError::DimensionMismatch {
                expected: self.n_features(),
                actual: rows.len(),
            });
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != names.len()) {
            return Err(BolflowError::DimensionMismatch {
                expected: names.len(),
                actual: bad.len(),
            });
        }
        self.annotation_names = names;
        self.annotations = rows;
        Ok(self)
    }

    /// Set the header of the feature key column.
    pub fn with_key_header(mut self, header: &str) -> Self {
        self.key_header = header.to_string();
        self
    }

    /// Replace the metrics of a group.
    pub fn with_metrics(mut self, group: &str, metrics: Vec<MetricSet>) -> Result<Self> {
        if metrics.len() != self.n_features() {
            return Err(BolflowError::DimensionMismatch {
                expected: self.n_features(),
                actual: metrics.len(),
            });
        }
        self.metrics.insert(group.to_string(), metrics);
        Ok(self)
    }

    /// Drop every derived metric column.
    pub fn without_metrics(mut self) -> Self {
        self.metrics.clear();
        self
    }

    /// Re-attach group memberships to every sample column.
    pub fn classify<M: GroupMembership + ?Sized>(mut self, membership: &M) -> Self {
        for column in &mut self.columns {
            *column = SampleColumn::classified(&column.id, membership);
        }
        self
    }

    /// Load a table from a CSV or TSV file, classifying its columns.
    pub fn from_path<P, M>(path: P, membership: &M) -> Result<Self>
    where
        P: AsRef<Path>,
        M: GroupMembership + ?Sized,
    {
        let path = path.as_ref();
        let delimiter = delimiter_for(path);
        let file = File::open(path)?;
        Self::from_reader(file, delimiter, membership)
    }

    /// Load a table from any reader.
    ///
    /// The first column is the feature key. Headers `freq_G`/`cv_G`/`max_G` for
    /// a known group `G` are metric columns, classified samples are sample
    /// columns, and the remaining columns are sample columns when every cell is
    /// numeric or missing, annotation columns otherwise.
    pub fn from_reader<R, M>(reader: R, delimiter: u8, membership: &M) -> Result<Self>
    where
        R: Read,
        M: GroupMembership + ?Sized,
    {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(String::from).collect();
        if headers.is_empty() {
            return Err(BolflowError::EmptyData("table has no header".to_string()));
        }
        let records: Vec<csv::StringRecord> = rdr.records().collect::<std::result::Result<_, _>>()?;
        let cell = |row: usize, col: usize| records[row].get(col).unwrap_or("");

        let known_groups = membership.groups();
        let roles: Vec<ColumnRole> = (1..headers.len())
            .map(|col| {
                let header = headers[col].as_str();
                if let Some((kind, group)) = MetricKind::parse_column(header) {
                    if known_groups.contains(group) {
                        return ColumnRole::Metric(kind, group.to_string());
                    }
                }
                let numeric = (0..records.len()).all(|row| {
                    let raw = cell(row, col);
                    is_missing_marker(raw) || raw.parse::<f64>().is_ok()
                });
                if membership.membership(header).is_some() || numeric {
                    ColumnRole::Sample
                } else {
                    ColumnRole::Annotation
                }
            })
            .collect();

        let n_rows = records.len();
        let mut feature_ids = Vec::with_capacity(n_rows);
        let mut annotation_names = Vec::new();
        let mut columns = Vec::new();
        let mut sample_cols = Vec::new();
        let mut annotation_cols = Vec::new();
        for (offset, role) in roles.iter().enumerate() {
            let col = offset + 1;
            match role {
                ColumnRole::Sample => {
                    columns.push(SampleColumn::classified(&headers[col], membership));
                    sample_cols.push(col);
                }
                ColumnRole::Annotation => {
                    annotation_names.push(headers[col].clone());
                    annotation_cols.push(col);
                }
                ColumnRole::Metric(..) => {}
            }
        }
        check_unique_samples(&columns)?;

        let mut parsed: Vec<Option<f64>> = Vec::with_capacity(n_rows * sample_cols.len());
        let mut annotations = Vec::with_capacity(n_rows);
        let mut metrics: BTreeMap<String, Vec<MetricSet>> = BTreeMap::new();
        for row in 0..n_rows {
            feature_ids.push(cell(row, 0).to_string());
            annotations.push(
                annotation_cols
                    .iter()
                    .map(|&col| cell(row, col).to_string())
                    .collect(),
            );
            for &col in &sample_cols {
                parsed.push(parse_value(cell(row, col), row, col)?);
            }
        }
        for (offset, role) in roles.iter().enumerate() {
            if let ColumnRole::Metric(kind, group) = role {
                let col = offset + 1;
                let sets = metrics
                    .entry(group.clone())
                    .or_insert_with(|| vec![MetricSet::undefined(); n_rows]);
                for (row, set) in sets.iter_mut().enumerate() {
                    let raw = cell(row, col);
                    let value = Metric::parse(raw).ok_or_else(|| BolflowError::InvalidValue {
                        value: raw.to_string(),
                        row,
                        col,
                    })?;
                    set.set(*kind, value);
                }
            }
        }

        let n_cols = sample_cols.len();
        let values = DMatrix::from_fn(n_rows, n_cols, |r, c| parsed[r * n_cols + c]);

        Ok(Self {
            key_header: headers[0].clone(),
            feature_ids,
            annotation_names,
            annotations,
            columns,
            values,
            metrics,
        })
    }

    /// Write the table to a CSV or TSV file.
    pub fn to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)?;
        self.to_writer(BufWriter::new(file), delimiter_for(path))
    }

    /// Write the table to any writer.
    pub fn to_writer<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);

        let mut header: Vec<String> = Vec::with_capacity(1 + self.annotation_names.len() + self.n_samples());
        header.push(self.key_header.clone());
        header.extend(self.annotation_names.iter().cloned());
        header.extend(self.columns.iter().map(|c| c.id.clone()));
        for group in self.metrics.keys() {
            header.extend(MetricKind::ALL.iter().map(|k| k.column_name(group)));
        }
        wtr.write_record(&header)?;

        for row in 0..self.n_features() {
            let mut record: Vec<String> = Vec::with_capacity(header.len());
            record.push(self.feature_ids[row].clone());
            record.extend(self.annotations[row].iter().cloned());
            record.extend((0..self.n_samples()).map(|col| match self.get(row, col) {
                Some(v) => v.to_string(),
                None => MISSING.to_string(),
            }));
            for sets in self.metrics.values() {
                record.extend(MetricKind::ALL.iter().map(|k| sets[row].get(*k).to_string()));
            }
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Value at (row, col); `None` when missing.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.values[(row, col)]
    }

    /// Number of features (rows).
    #[inline]
    pub fn n_features(&self) -> usize {
        self.feature_ids.len()
    }

    /// Number of sample columns.
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.columns.len()
    }

    /// Header of the feature key column.
    pub fn key_header(&self) -> &str {
        &self.key_header
    }

    /// Feature keys.
    #[inline]
    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    /// Sample columns.
    #[inline]
    pub fn columns(&self) -> &[SampleColumn] {
        &self.columns
    }

    /// Sample identifiers.
    pub fn sample_ids(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.id.as_str()).collect()
    }

    /// Annotation column names.
    pub fn annotation_names(&self) -> &[String] {
        &self.annotation_names
    }

    /// Annotation values of a row.
    pub fn annotation_row(&self, row: usize) -> &[String] {
        &self.annotations[row]
    }

    /// Annotation value of a row by column name.
    pub fn annotation(&self, row: usize, name: &str) -> Option<&str> {
        let idx = self.annotation_names.iter().position(|n| n == name)?;
        self.annotations[row].get(idx).map(String::as_str)
    }

    /// Values of a row.
    pub fn row_values(&self, row: usize) -> Vec<Option<f64>> {
        self.values.row(row).iter().copied().collect()
    }

    /// Underlying value matrix.
    #[inline]
    pub fn values(&self) -> &DMatrix<Option<f64>> {
        &self.values
    }

    /// Indices of the sample columns belonging to a group.
    pub fn group_columns(&self, label: &str) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.in_group(label))
            .map(|(i, _)| i)
            .collect()
    }

    /// Metrics of a group, one entry per row.
    pub fn metrics(&self, group: &str) -> Option<&[MetricSet]> {
        self.metrics.get(group).map(Vec::as_slice)
    }

    /// Groups that carry metrics, sorted.
    pub fn metric_groups(&self) -> impl Iterator<Item = &str> + '_ {
        self.metrics.keys().map(String::as_str)
    }

    /// Subset the table to the given rows, in the given order.
    pub fn subset_features(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_features()) {
            return Err(BolflowError::InvalidParameter(format!(
                "Feature index {} out of bounds",
                bad
            )));
        }
        let values = DMatrix::from_fn(indices.len(), self.n_samples(), |r, c| {
            self.values[(indices[r], c)]
        });
        let metrics = self
            .metrics
            .iter()
            .map(|(group, sets)| (group.clone(), indices.iter().map(|&i| sets[i]).collect()))
            .collect();

        Ok(Self {
            key_header: self.key_header.clone(),
            feature_ids: indices.iter().map(|&i| self.feature_ids[i].clone()).collect(),
            annotation_names: self.annotation_names.clone(),
            annotations: indices.iter().map(|&i| self.annotations[i].clone()).collect(),
            columns: self.columns.clone(),
            values,
            metrics,
        })
    }
}

fn parse_value(raw: &str, row: usize, col: usize) -> Result<Option<f64>> {
    if is_missing_marker(raw) {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| BolflowError::InvalidValue {
            value: raw.to_string(),
            row,
            col,
        })
}

fn check_unique_samples(columns: &[SampleColumn]) -> Result<()> {
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.id.as_str()) {
            return Err(BolflowError::DuplicateSample(column.id.clone()));
        }
    }
    Ok(())
}
