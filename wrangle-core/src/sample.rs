//! Stratified reduction of the full dataset.
//!
//! The reduced file keeps exactly `ceil(fraction * n)` rows. Each label class
//! gets the floor of its exact share, and the rows left over go to the classes
//! with the largest fractional remainders (ties broken by the seeded RNG), so
//! every class count is within one row of its exact share.
//!
//! Reducing a file never loads it: one pass reads the label column, a second
//! streams the picked records into the output.

use crate::config::SampleConfig;
use crate::error::{Result, SampleError, WrangleError};
use crate::persistence::atomic_write_with;
use crate::pipeline::StepOutcome;
use crate::table::Table;
use crate::table::codec::{csv_error, open_csv, parse_index, write_header};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::path::Path;

/// Pick the row positions of a stratified sample of `labels`.
///
/// Returned positions are sorted, so the sample keeps source order.
pub fn stratified_indices(
    labels: &[String],
    fraction: f64,
    seed: u64,
) -> std::result::Result<Vec<usize>, SampleError> {
    let mut classes: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (row, label) in labels.iter().enumerate() {
        classes.entry(label.as_str()).or_default().push(row);
    }
    stratify(classes, labels.len(), fraction, seed)
}

/// Sample `total` rows grouped by class. Classes are visited in key order.
fn stratify<K: AsRef<str> + Ord>(
    classes: BTreeMap<K, Vec<usize>>,
    total: usize,
    fraction: f64,
    seed: u64,
) -> std::result::Result<Vec<usize>, SampleError> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(SampleError::InvalidFraction { fraction });
    }
    if total == 0 {
        return Err(SampleError::EmptyTable);
    }
    if let Some((class, members)) = classes.iter().min_by_key(|(_, members)| members.len()) {
        if members.len() < 2 {
            return Err(SampleError::ClassTooSmall {
                class: class.as_ref().to_string(),
                count: members.len(),
            });
        }
    }

    let sample_size = ((fraction * total as f64).ceil() as usize).min(total);
    let remainder_size = total - sample_size;
    for (side, size) in [("Sample", sample_size), ("Remainder", remainder_size)] {
        if size < classes.len() {
            return Err(SampleError::TooFewRows {
                side,
                size,
                classes: classes.len(),
            });
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let counts: Vec<usize> = classes.values().map(Vec::len).collect();
    let allocation = allocate(&counts, sample_size, &mut rng);

    let mut picked = Vec::with_capacity(sample_size);
    for (mut members, take) in classes.into_values().zip(allocation) {
        members.shuffle(&mut rng);
        picked.extend_from_slice(&members[..take]);
    }
    picked.sort_unstable();
    Ok(picked)
}

/// Split `draws` across classes proportionally to `counts`.
fn allocate(counts: &[usize], draws: usize, rng: &mut StdRng) -> Vec<usize> {
    let total: u128 = counts.iter().map(|&c| c as u128).sum();
    let exact = |c: usize| (c as u128 * draws as u128 / total, c as u128 * draws as u128 % total);

    let mut allocation: Vec<usize> = counts.iter().map(|&c| exact(c).0 as usize).collect();
    let mut missing = draws - allocation.iter().sum::<usize>();

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.shuffle(rng);
    // stable sort: equal remainders keep their shuffled order
    order.sort_by_key(|&class| std::cmp::Reverse(exact(counts[class]).1));
    for class in order {
        if missing == 0 {
            break;
        }
        allocation[class] += 1;
        missing -= 1;
    }
    allocation
}

/// Stratified sample of `table` over the `target` column.
pub fn stratified_sample(table: &Table, target: &str, fraction: f64, seed: u64) -> Result<Table> {
    let column = table
        .column(target)
        .ok_or_else(|| WrangleError::MissingColumn {
            column: target.to_string(),
            available: table.column_names(),
        })?;
    let labels: Vec<String> = (0..column.len())
        .map(|row| column.data.format_cell(row).unwrap_or_default())
        .collect();
    let rows = stratified_indices(&labels, fraction, seed)?;
    Ok(table.take(&rows))
}

/// Write a stratified reduction of `full` to `output` unless `output` exists.
///
/// `full` must already be present; fetching it is the caller's job.
pub fn create_raw_short(full: &Path, output: &Path, config: &SampleConfig) -> Result<StepOutcome> {
    if output.exists() {
        tracing::info!(path = %output.display(), "reduced dataset exists, skipping");
        return Ok(StepOutcome::Skipped {
            path: output.to_path_buf(),
        });
    }
    if !full.exists() {
        return Err(WrangleError::NotFound {
            path: full.to_path_buf(),
        });
    }

    tracing::info!(
        source = %full.display(),
        output = %output.display(),
        fraction = config.reduction_percent,
        target = %config.target_variable,
        "creating reduced dataset"
    );
    let (classes, total) = read_classes(full, &config.target_variable)?;
    let rows = stratify(classes, total, config.reduction_percent, config.seed)?;
    copy_rows(full, output, &rows)?;

    tracing::info!(
        path = %output.display(),
        rows = rows.len(),
        source_rows = total,
        "reduced dataset written"
    );
    Ok(StepOutcome::Created {
        path: output.to_path_buf(),
        rows: Some(rows.len()),
    })
}

/// Group the row positions of the CSV at `path` by their `target` value.
fn read_classes(path: &Path, target: &str) -> Result<(BTreeMap<String, Vec<usize>>, usize)> {
    let (mut reader, layout) = open_csv(path)?;
    let Some(column) = layout.names.iter().position(|name| name == target) else {
        return Err(WrangleError::MissingColumn {
            column: target.to_string(),
            available: layout.names,
        });
    };
    let field = column + usize::from(layout.has_index);

    let mut classes: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut total = 0;
    let mut record = csv::StringRecord::new();
    while reader
        .read_record(&mut record)
        .map_err(|e| csv_error(path, e))?
    {
        if layout.has_index {
            parse_index(record.get(0).unwrap_or_default(), &record)?;
        }
        let label = record.get(field).unwrap_or_default();
        match classes.get_mut(label) {
            Some(rows) => rows.push(total),
            None => {
                classes.insert(label.to_string(), vec![total]);
            }
        }
        total += 1;
    }
    Ok((classes, total))
}

/// Stream the records at the sorted positions `rows` from `source` to `output`.
fn copy_rows(source: &Path, output: &Path, rows: &[usize]) -> Result<()> {
    let (mut reader, layout) = open_csv(source)?;
    atomic_write_with(output, |out| {
        let mut writer = csv::Writer::from_writer(out);
        write_header(&mut writer, &layout.names)?;

        let mut wanted = rows.iter().copied().peekable();
        let mut record = csv::StringRecord::new();
        let mut position = 0;
        while wanted.peek().is_some() && reader.read_record(&mut record)? {
            if wanted.next_if_eq(&position).is_some() {
                let mut fields = record.iter();
                let index = if layout.has_index {
                    fields.next().and_then(|raw| raw.parse::<u64>().ok())
                } else {
                    None
                };
                writer.write_field(index.unwrap_or(position as u64).to_string())?;
                for field in fields {
                    writer.write_field(field)?;
                }
                writer.write_record(None::<&[u8]>)?;
            }
            position += 1;
        }
        writer.flush()
    })
    .map_err(|source| WrangleError::Write {
        path: output.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use std::collections::HashMap;

    fn labels(classes: &[(&str, usize)]) -> Vec<String> {
        classes
            .iter()
            .flat_map(|(label, n)| std::iter::repeat_n(label.to_string(), *n))
            .collect()
    }

    fn class_counts(labels: &[String], rows: &[usize]) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for &row in rows {
            *counts.entry(labels[row].clone()).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn test_sample_size_is_ceiling() {
        let labels = labels(&[("Benign", 70), ("DDoS", 25), ("Scanning", 8)]);
        let rows = stratified_indices(&labels, 0.10, 3703).unwrap();
        assert_eq!(rows.len(), 11);
    }

    #[test]
    fn test_proportions_preserved() {
        let labels = labels(&[("Benign", 600), ("DDoS", 300), ("Scanning", 100)]);
        let rows = stratified_indices(&labels, 0.10, 3703).unwrap();
        let counts = class_counts(&labels, &rows);
        assert_eq!(counts["Benign"], 60);
        assert_eq!(counts["DDoS"], 30);
        assert_eq!(counts["Scanning"], 10);
    }

    #[test]
    fn test_rows_sorted_and_unique() {
        let labels = labels(&[("a", 40), ("b", 13)]);
        let rows = stratified_indices(&labels, 0.3, 1).unwrap();
        assert!(rows.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_same_seed_same_rows() {
        let labels = labels(&[("a", 50), ("b", 30), ("c", 20)]);
        let first = stratified_indices(&labels, 0.2, 3703).unwrap();
        let second = stratified_indices(&labels, 0.2, 3703).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_fraction() {
        let labels = labels(&[("a", 10), ("b", 10)]);
        for fraction in [0.0, 1.0, -0.5, f64::NAN] {
            assert!(matches!(
                stratified_indices(&labels, fraction, 0),
                Err(SampleError::InvalidFraction { .. })
            ));
        }
    }

    #[test]
    fn test_singleton_class_rejected() {
        let labels = labels(&[("a", 10), ("Worms", 1)]);
        let err = stratified_indices(&labels, 0.5, 0).unwrap_err();
        assert!(matches!(err, SampleError::ClassTooSmall { count: 1, .. }));
    }

    #[test]
    fn test_sample_smaller_than_class_count() {
        let labels = labels(&[("a", 10), ("b", 10), ("c", 10)]);
        let err = stratified_indices(&labels, 0.05, 0).unwrap_err();
        assert!(matches!(err, SampleError::TooFewRows { side: "Sample", .. }));
    }

    #[test]
    fn test_empty_labels() {
        assert!(matches!(
            stratified_indices(&[], 0.1, 0),
            Err(SampleError::EmptyTable)
        ));
    }

    #[test]
    fn test_missing_target_column() {
        let table = Table::new(vec![Column::text("Label", ["0", "1"])]).unwrap();
        let err = stratified_sample(&table, "Attack", 0.5, 3703).unwrap_err();
        match err {
            WrangleError::MissingColumn { column, available } => {
                assert_eq!(column, "Attack");
                assert_eq!(available, vec!["Label"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sample_keeps_original_index() {
        let table = Table::new(vec![
            Column::int("L4_DST_PORT", 0..20),
            Column::text(
                "Attack",
                (0..20).map(|i| if i % 2 == 0 { "Benign" } else { "DDoS" }),
            ),
        ])
        .unwrap();
        let sample = stratified_sample(&table, "Attack", 0.5, 3703).unwrap();
        assert_eq!(sample.height(), 10);
        let ports = &sample.column("L4_DST_PORT").unwrap().data;
        for (row, &index) in sample.index().iter().enumerate() {
            assert_eq!(ports.format_cell(row), Some(index.to_string()));
        }
    }

    fn flow_file(dir: &Path, with_index: bool) -> std::path::PathBuf {
        let mut csv = String::new();
        if with_index {
            csv.push(',');
        }
        csv.push_str("IPV4_SRC_ADDR,L4_SRC_PORT,FLOW_DURATION,Attack\n");
        for i in 0..60 {
            if with_index {
                csv.push_str(&format!("{},", 1000 + i * 3));
            }
            let addr = if i % 9 == 0 { "0.0.0.0".to_string() } else { format!("10.0.0.{i}") };
            let port = if i % 11 == 0 { String::new() } else { (40000 + i).to_string() };
            let duration = if i % 4 == 0 { "1.50" } else { "-1" };
            let label = ["Benign", "DDoS", "DDoS", "scanning"][i % 4];
            csv.push_str(&format!("{addr},{port},{duration},{label}\n"));
        }
        let path = dir.join("raw_full.csv");
        std::fs::write(&path, csv).unwrap();
        path
    }

    #[test]
    fn test_streamed_reduction_matches_in_memory_sample() {
        let dir = tempfile::TempDir::new().unwrap();
        let full = flow_file(dir.path(), false);
        let config = SampleConfig {
            reduction_percent: 0.25,
            ..SampleConfig::default()
        };

        let output = dir.path().join("raw_short.csv");
        let outcome = create_raw_short(&full, &output, &config).unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Created {
                path: output.clone(),
                rows: Some(15),
            }
        );

        let table = Table::read_csv(&full).unwrap();
        let expected = dir.path().join("expected.csv");
        stratified_sample(&table, "Attack", 0.25, config.seed)
            .unwrap()
            .write_csv(&expected)
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            std::fs::read_to_string(&expected).unwrap()
        );
    }

    #[test]
    fn test_streamed_reduction_keeps_source_index() {
        let dir = tempfile::TempDir::new().unwrap();
        let full = flow_file(dir.path(), true);
        let output = dir.path().join("raw_short.csv");
        let config = SampleConfig {
            reduction_percent: 0.5,
            ..SampleConfig::default()
        };

        create_raw_short(&full, &output, &config).unwrap();
        let reduced = Table::read_csv(&output).unwrap();
        assert_eq!(reduced.height(), 30);
        assert!(reduced.index().iter().all(|i| (i - 1000) % 3 == 0));
        assert!(reduced.index().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_missing_target_writes_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let full = flow_file(dir.path(), false);
        let output = dir.path().join("raw_short.csv");
        let config = SampleConfig {
            target_variable: "Label".to_string(),
            ..SampleConfig::default()
        };

        let err = create_raw_short(&full, &output, &config).unwrap_err();
        assert!(matches!(err, WrangleError::MissingColumn { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_existing_output_is_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        let full = flow_file(dir.path(), false);
        let output = dir.path().join("raw_short.csv");
        std::fs::write(&output, "kept").unwrap();

        let outcome = create_raw_short(&full, &output, &SampleConfig::default()).unwrap();
        assert!(outcome.is_skipped());
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "kept");
    }
}
