//! Integration tests for the full join / statistics / dedup / filter workflow.

use bolflow::prelude::*;
use std::io::Write;
use std::path::Path;
use tempfile::{Builder, NamedTempFile};

/// Write `contents` to a temporary file with the given suffix.
fn write_temp(contents: &str, suffix: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    write!(file, "{}", contents).unwrap();
    file.flush().unwrap();
    file
}

/// Three QC injections interleaved with four biological samples (C and D).
fn create_classification() -> (NamedTempFile, Classification) {
    let file = write_temp(
        "sample,type,group,order\n\
         QC1,QC,,1\n\
         S1,S,C,2\n\
         S2,S,D,3\n\
         QC2,QC,,4\n\
         S3,S,C,5\n\
         S4,S,D,6\n\
         QC3,QC,,7\n",
        ".csv",
    );
    let classification = Classification::from_path(file.path()).unwrap();
    (file, classification)
}

/// Two acquisition batches. M2 is reported twice in the first batch: an
/// early peak seen only in QC1 and the regular one.
fn create_batches(classification: &Classification) -> Vec<FeatureTable> {
    let batch1 = write_temp(
        "feature,name,QC1,S1,S2,QC2\n\
         M1,alanine,10,5,0,10\n\
         M2,serine,0,3,4,2\n\
         M2,serine,9,0,0,0\n\
         M3,glycine,0,0,0,0\n",
        ".csv",
    );
    let batch2 = write_temp(
        "feature\tname\tS3\tS4\tQC3\n\
         M1\talanine\t6\t0\t10\n\
         M2\tserine\t3\t3\t4\n\
         M4\tlysine\t1\tNA\t0\n",
        ".tsv",
    );
    vec![
        FeatureTable::from_path(batch1.path(), classification).unwrap(),
        FeatureTable::from_path(batch2.path(), classification).unwrap(),
    ]
}

fn windows() -> WindowSpec {
    WindowSpec::from_json(r#"{"QC":[0,5], "S":[0,10]}"#).unwrap()
}

#[test]
fn test_classification_loaded() {
    let (_file, cls) = create_classification();

    assert_eq!(cls.n_samples(), 7);
    let groups: Vec<String> = cls.groups().into_iter().collect();
    assert_eq!(groups, vec!["C", "D", "QC", "S"]);
    assert_eq!(cls.members_of("QC"), vec!["QC1", "QC2", "QC3"]);
    assert_eq!(cls.membership("S3").unwrap().position, Some(5.0));
}

#[test]
fn test_step_by_step_workflow() {
    let (_file, cls) = create_classification();
    let tables = create_batches(&cls);

    // 1. join
    let joined = join_tables(&tables, &cls).unwrap();
    assert_eq!(joined.feature_ids(), &["M1", "M2", "M2", "M3", "M4"]);
    assert_eq!(
        joined.sample_ids(),
        vec!["QC1", "S1", "S2", "QC2", "S3", "S4", "QC3"]
    );
    assert_eq!(joined.annotation(4, "name"), Some("lysine"));
    assert_eq!(joined.get(2, 4), None);

    // 2. group statistics
    let computed = compute_group_metrics(&joined, &cls).unwrap();
    let qc = computed.metrics("QC").unwrap();
    assert_eq!(qc[0].frequency, Metric::Defined(1.0));
    assert!((qc[0].cv.value().unwrap() - 0.0).abs() < 1e-10);
    assert_eq!(qc[0].max_value, Metric::Defined(10.0));
    assert!((qc[1].frequency.value().unwrap() - 2.0 / 3.0).abs() < 1e-10);
    assert!((qc[2].frequency.value().unwrap() - 1.0 / 3.0).abs() < 1e-10);
    assert_eq!(qc[3].cv, Metric::Undefined);

    // 3. both M2 rows fall inside the QC window; the more frequent one stays
    let deduped = remove_duplicates(&computed, &cls, &windows()).unwrap();
    assert_eq!(deduped.feature_ids(), &["M1", "M2", "M3", "M4"]);
    assert_eq!(deduped.row_values(1)[0], Some(0.0));

    // 4. frequency filter
    let filtered = filter_by_threshold(&deduped, &cls, &FilterSpec::new("QC", 50.0)).unwrap();
    assert_eq!(filtered.feature_ids(), &["M1", "M2"]);

    let cv_filtered =
        filter_by_threshold(&deduped, &cls, &FilterSpec::new("QC", 50.0).with_cv(0.30)).unwrap();
    assert_eq!(cv_filtered.feature_ids(), &["M1"]);
}

#[test]
fn test_narrow_window_keeps_early_peak() {
    let (_file, cls) = create_classification();
    let tables = create_batches(&cls);
    let computed = compute_group_metrics(&join_tables(&tables, &cls).unwrap(), &cls).unwrap();

    // only the early M2 (first seen in QC1) is inside [0, 3]
    let narrow = WindowSpec::new().with_window("QC", 0.0, 3.0);
    let deduped = remove_duplicates(&computed, &cls, &narrow).unwrap();

    assert_eq!(deduped.n_features(), 4);
    assert_eq!(deduped.row_values(1)[0], Some(9.0));
}

#[test]
fn test_run_workflow_matches_steps() {
    let (_file, cls) = create_classification();
    let tables = create_batches(&cls);
    let spec = FilterSpec::new("QC", 50.0);

    let result = run_workflow(&tables, &cls, &windows(), &spec).unwrap();

    let joined = join_tables(&tables, &cls).unwrap();
    let computed = compute_group_metrics(&joined, &cls).unwrap();
    let deduped = remove_duplicates(&computed, &cls, &windows()).unwrap();
    let expected = filter_by_threshold(&deduped, &cls, &spec).unwrap();

    assert_eq!(result, expected);
}

#[test]
fn test_yaml_pipeline() {
    let (_file, cls) = create_classification();
    let tables = create_batches(&cls);

    let yaml = Pipeline::new()
        .name("qc-50")
        .compute_metrics(Dispersion::Sample)
        .remove_duplicates(windows())
        .filter_threshold(FilterSpec::new("QC", 50.0))
        .to_config(Some("QC frequency filter"))
        .to_yaml()
        .unwrap();

    let config = PipelineConfig::from_yaml(&yaml).unwrap();
    let result = Pipeline::from_config(&config)
        .run_tables(&tables, &cls)
        .unwrap();

    assert_eq!(result.feature_ids(), &["M1", "M2"]);
}

fn reload(table: &FeatureTable, dir: &Path, name: &str, cls: &Classification) -> FeatureTable {
    let path = dir.join(name);
    table.to_path(&path).unwrap();
    FeatureTable::from_path(&path, cls).unwrap()
}

#[test]
fn test_stages_through_files() {
    let (_file, cls) = create_classification();
    let tables = create_batches(&cls);
    let dir = tempfile::tempdir().unwrap();

    let joined = reload(&join_tables(&tables, &cls).unwrap(), dir.path(), "out.join.csv", &cls);
    let computed = reload(
        &compute_group_metrics(&joined, &cls).unwrap(),
        dir.path(),
        "out.f-cv.csv",
        &cls,
    );
    assert!(computed.metrics("QC").is_some());
    assert_eq!(computed.annotation_names(), &["name"]);

    let deduped = reload(
        &remove_duplicates(&computed, &cls, &windows()).unwrap(),
        dir.path(),
        "out.rem.csv",
        &cls,
    );
    let filtered = filter_by_threshold(&deduped, &cls, &FilterSpec::new("QC", 50.0)).unwrap();

    assert_eq!(filtered.feature_ids(), &["M1", "M2"]);
    assert_eq!(filtered.annotation(1, "name"), Some("serine"));
    assert_eq!(filtered.metrics("QC").unwrap()[0].max_value, Metric::Defined(10.0));
}

#[test]
fn test_errors_surface_through_pipeline() {
    let (_file, cls) = create_classification();
    let tables = create_batches(&cls);

    let result = Pipeline::new()
        .compute_metrics(Dispersion::Sample)
        .filter_threshold(FilterSpec::new("blank", 50.0))
        .run_tables(&tables, &cls);

    let err = result.unwrap_err();
    assert!(err.to_string().starts_with("Step 2"));
    assert!(matches!(err, BolflowError::Step { index: 2, .. }));
    assert!(matches!(err.root_cause(), BolflowError::UnknownGroupType(g) if g == "blank"));
}
