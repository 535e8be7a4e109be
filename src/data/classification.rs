//! Sample classification: which groups each sample belongs to.
//!
//! A classification table has one row per sample. One column holds the sample
//! identifier, an optional numeric column holds the sample's ordinal position
//! (acquisition time or injection order), and every other column holds group
//! labels. A label cell may list several labels separated by `;` or `,`.
//!
//! Every label becomes a group: it gets its own `freq_/cv_/max_` columns and
//! is a valid filter group. Descriptor columns such as `comment`, `batch` or
//! `file` (see [`IGNORED_COLUMNS`]) and headers starting with `#` are skipped.
//!
//! ```text
//! sample  type  group  order
//! QC1     QC           1
//! S1      S     C      2
//! S2      S     D      3
//! ```

use crate::data::metric::is_missing_marker;
use crate::data::table::delimiter_for;
use crate::error::{BolflowError, Result};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Accepted headers for the sample identifier column (case-insensitive).
const ID_COLUMNS: &[&str] = &["sample", "sample_id", "sampleid", "id", "name"];

/// Accepted headers for the ordinal position column (case-insensitive).
const POSITION_COLUMNS: &[&str] = &[
    "order",
    "time",
    "position",
    "ordinal",
    "injection_order",
    "run_order",
];

/// Headers of descriptor columns that never hold group labels (case-insensitive).
pub const IGNORED_COLUMNS: &[&str] = &[
    "comment",
    "comments",
    "note",
    "notes",
    "description",
    "remark",
    "remarks",
    "batch",
    "file",
    "filename",
    "path",
];

/// Group labels and optional ordinal of a single sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Membership {
    /// Group labels this sample belongs to.
    pub groups: BTreeSet<String>,
    /// Ordinal position (acquisition time/order) of the sample.
    pub position: Option<f64>,
}

impl Membership {
    /// Check if the sample belongs to a group.
    pub fn in_group(&self, label: &str) -> bool {
        self.groups.contains(label)
    }
}

/// Lookup of sample group memberships.
///
/// Statistics, duplicate resolution and filtering only depend on this trait,
/// so classification sources can vary without touching them.
pub trait GroupMembership {
    /// Membership of a sample, or `None` if the sample is unclassified.
    fn membership(&self, sample_id: &str) -> Option<&Membership>;

    /// All group labels known to the classification, sorted.
    fn groups(&self) -> BTreeSet<String>;

    /// Check if a group label is known.
    fn has_group(&self, label: &str) -> bool {
        self.groups().contains(label)
    }
}

/// Sample classification loaded from a table.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Sample IDs in file order.
    sample_ids: Vec<String>,
    /// sample_id -> membership.
    members: HashMap<String, Membership>,
    /// Every label seen.
    groups: BTreeSet<String>,
}

impl Classification {
    /// Create an empty classification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample. Fails if the sample was already classified.
    pub fn insert<I, S>(&mut self, sample_id: &str, groups: I, position: Option<f64>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.members.contains_key(sample_id) {
            return Err(BolflowError::MalformedClassification(format!(
                "sample '{}' is listed more than once",
                sample_id
            )));
        }
        let groups: BTreeSet<String> = groups.into_iter().map(Into::into).collect();
        self.groups.extend(groups.iter().cloned());
        self.sample_ids.push(sample_id.to_string());
        self.members
            .insert(sample_id.to_string(), Membership { groups, position });
        Ok(())
    }

    /// Builder-style variant of [`Classification::insert`].
    pub fn with_sample<I, S>(mut self, sample_id: &str, groups: I, position: Option<f64>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(sample_id, groups, position)?;
        Ok(self)
    }

    /// Load a classification table from a CSV or TSV file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let delimiter = delimiter_for(path);
        let file = File::open(path)?;
        Self::from_reader(file, delimiter)
    }

    /// Load a classification table from any reader.
    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(String::from).collect();
        let id_idx = find_column(&headers, ID_COLUMNS).ok_or_else(|| {
            BolflowError::MalformedClassification(format!(
                "no sample identifier column (expected one of: {})",
                ID_COLUMNS.join(", ")
            ))
        })?;
        let position_idx = find_column(&headers, POSITION_COLUMNS);
        let label_idx: Vec<usize> = (0..headers.len())
            .filter(|&i| i != id_idx && Some(i) != position_idx && !is_ignored(&headers[i]))
            .collect();

        let mut classification = Self::new();
        for (row_idx, record) in rdr.records().enumerate() {
            let record = record?;
            let sample_id = record.get(id_idx).unwrap_or("");
            if sample_id.is_empty() {
                if record.iter().all(str::is_empty) {
                    continue;
                }
                return Err(BolflowError::MalformedClassification(format!(
                    "row {} has no sample identifier",
                    row_idx + 1
                )));
            }

            let position = match position_idx.and_then(|i| record.get(i)) {
                Some(raw) if !is_missing_marker(raw) => {
                    Some(raw.parse::<f64>().map_err(|_| {
                        BolflowError::MalformedClassification(format!(
                            "ordinal '{}' of sample '{}' is not numeric",
                            raw, sample_id
                        ))
                    })?)
                }
                _ => None,
            };

            let groups: Vec<String> = label_idx
                .iter()
                .filter_map(|&i| record.get(i))
                .flat_map(split_labels)
                .collect();

            classification.insert(sample_id, groups, position)?;
        }

        Ok(classification)
    }

    /// Sample IDs in order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Number of classified samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Check if a sample is classified.
    pub fn has_sample(&self, sample_id: &str) -> bool {
        self.members.contains_key(sample_id)
    }

    /// Sample IDs belonging to a group, in file order.
    pub fn members_of(&self, label: &str) -> Vec<&str> {
        self.sample_ids
            .iter()
            .filter(|sid| self.members.get(*sid).is_some_and(|m| m.in_group(label)))
            .map(String::as_str)
            .collect()
    }
}

impl GroupMembership for Classification {
    fn membership(&self, sample_id: &str) -> Option<&Membership> {
        self.members.get(sample_id)
    }

    fn groups(&self) -> BTreeSet<String> {
        self.groups.clone()
    }

    fn has_group(&self, label: &str) -> bool {
        self.groups.contains(label)
    }
}

fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| candidates.iter().any(|c| h.eq_ignore_ascii_case(c)))
}

fn is_ignored(header: &str) -> bool {
    header.starts_with('#') || IGNORED_COLUMNS.iter().any(|c| header.eq_ignore_ascii_case(c))
}

fn split_labels(cell: &str) -> Vec<String> {
    cell.split([';', ','])
        .map(str::trim)
        .filter(|label| !is_missing_marker(label))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Classification> {
        Classification::from_reader(text.as_bytes(), b',')
    }

    #[test]
    fn test_load_classification() {
        let cls = parse("sample,type,group,order\nQC1,QC,,1\nS1,S,C,2\nS2,S,D,3\n").unwrap();

        assert_eq!(cls.n_samples(), 3);
        assert_eq!(cls.sample_ids(), &["QC1", "S1", "S2"]);
        let groups: Vec<String> = cls.groups().into_iter().collect();
        assert_eq!(groups, vec!["C", "D", "QC", "S"]);

        let s1 = cls.membership("S1").unwrap();
        assert!(s1.in_group("S"));
        assert!(s1.in_group("C"));
        assert!(!s1.in_group("QC"));
        assert_eq!(s1.position, Some(2.0));
    }

    #[test]
    fn test_multiple_labels_in_cell() {
        let cls = parse("Sample_ID,groups\nX1,A;QC\nX2,\"B, QC\"\n").unwrap();

        assert_eq!(cls.members_of("QC"), vec!["X1", "X2"]);
        assert_eq!(cls.members_of("A"), vec!["X1"]);
        assert_eq!(cls.membership("X1").unwrap().position, None);
    }

    #[test]
    fn test_descriptor_columns_are_not_labels() {
        let cls = parse(
            "sample,type,Comment,batch,#operator,order\n\
             QC1,QC,re-injected,b1,ann,1\n\
             S1,S,,b2,bob,2\n",
        )
        .unwrap();

        let groups: Vec<String> = cls.groups().into_iter().collect();
        assert_eq!(groups, vec!["QC", "S"]);
        assert!(!cls.has_group("b1"));
        assert_eq!(cls.membership("S1").unwrap().position, Some(2.0));
    }

    #[test]
    fn test_missing_identifier_column() {
        let err = parse("type,order\nQC,1\n").unwrap_err();
        assert!(matches!(err, BolflowError::MalformedClassification(_)));
    }

    #[test]
    fn test_duplicate_sample() {
        let err = parse("sample,type\nS1,QC\nS1,S\n").unwrap_err();
        assert!(matches!(err, BolflowError::MalformedClassification(_)));
    }

    #[test]
    fn test_non_numeric_position() {
        let err = parse("sample,type,time\nS1,QC,early\n").unwrap_err();
        assert!(matches!(err, BolflowError::MalformedClassification(_)));
    }

    #[test]
    fn test_unclassified_sample_is_not_an_error() {
        let cls = parse("sample,type\nS1,QC\n").unwrap();
        assert!(cls.membership("S9").is_none());
        assert!(!cls.has_sample("S9"));
    }

    #[test]
    fn test_tsv_file() {
        use std::io::Write;
        use tempfile::Builder;

        let mut file = Builder::new().suffix(".tsv").tempfile().unwrap();
        writeln!(file, "id\ttype\trun_order").unwrap();
        writeln!(file, "QC1\tQC\t4").unwrap();
        writeln!(file, "QC2\tQC\tNA").unwrap();
        file.flush().unwrap();

        let cls = Classification::from_path(file.path()).unwrap();
        assert_eq!(cls.members_of("QC"), vec!["QC1", "QC2"]);
        assert_eq!(cls.membership("QC1").unwrap().position, Some(4.0));
        assert_eq!(cls.membership("QC2").unwrap().position, None);
    }

    #[test]
    fn test_builder() {
        let cls = Classification::new()
            .with_sample("a", ["QC"], Some(1.0))
            .unwrap()
            .with_sample("b", ["S", "C"], None)
            .unwrap();
        assert!(cls.has_group("C"));
        assert!(cls.with_sample("a", ["QC"], None).is_err());
    }
}
