//! Colored terminal output for pipeline progress and reports.

use wrangle_core::{
    DiagnosisReport, PipelineObserver, PipelineReport, Step, StepOutcome, WrangleError,
};

/// Prints pipeline progress to stdout.
pub struct TerminalObserver;

impl PipelineObserver for TerminalObserver {
    fn on_step_start(&self, step: Step, message: &str) {
        println!("\x1b[36m[{}]\x1b[0m {}", step, message);
    }

    fn on_step_complete(&self, step: Step, outcome: &StepOutcome) {
        println!("{}", render_outcome(step, outcome));
    }

    fn on_step_failed(&self, step: Step, error: &WrangleError) {
        eprintln!("\x1b[31m[{}] failed:\x1b[0m {}", step, error);
    }

    fn on_diagnosis(&self, report: &DiagnosisReport) {
        print!("{}", render_diagnosis(report));
    }
}

pub fn render_outcome(step: Step, outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Skipped { path } => format!(
            "\x1b[90m[{}] {} exists, skipping\x1b[0m",
            step,
            path.display()
        ),
        StepOutcome::Created {
            path,
            rows: Some(rows),
        } => format!(
            "\x1b[32m[{}]\x1b[0m wrote {} ({} rows)",
            step,
            path.display(),
            rows
        ),
        StepOutcome::Created { path, rows: None } => {
            format!("\x1b[32m[{}]\x1b[0m wrote {}", step, path.display())
        }
    }
}

pub fn render_diagnosis(report: &DiagnosisReport) -> String {
    let mut out = String::new();
    out.push_str("\x1b[1mWhat Is Being Diagnosed:\x1b[0m\n");
    out.push_str("\tDuplicate rows check\n");
    out.push_str("\tHard Nulls:\tempty cells, NaN\n");
    out.push_str("\tNumeric Checks:\tinfinite values\n");
    out.push_str(&format!("\tIP Checks:\t{}\n", report.criteria.invalid_address));
    out.push_str(&format!(
        "\tNonsense Vals:\t{}\n",
        report.criteria.negative_sentinel
    ));
    out.push_str(&format!(
        "\tBad Strings:\t{:?}\n",
        report.criteria.placeholders
    ));

    if report.duplicate_rows == 0 {
        out.push_str("\x1b[32mNo duplicates found!\x1b[0m\n");
    } else {
        out.push_str(&format!(
            "\x1b[31m{} duplicate rows found!\x1b[0m\n",
            report.duplicate_rows
        ));
    }

    for column in &report.columns {
        if column.counts.is_clean() {
            out.push_str(&format!(
                "\x1b[32m{} had 0 detected nulls!\x1b[0m\n",
                column.column
            ));
        } else {
            out.push_str(&format!("\x1b[33m{} detected:\x1b[0m\n", column.column));
            for (label, count) in column.counts.findings() {
                out.push_str(&format!("\t{label}: {count}\n"));
            }
        }
    }
    out
}

pub fn render_summary(report: &PipelineReport) -> String {
    if report.all_skipped() {
        return "\x1b[90mAll pipeline outputs already present, nothing to do.\x1b[0m".to_string();
    }
    let flagged = report.diagnosis.flagged().count();
    let mut out = String::from("\x1b[1;32mPipeline complete.\x1b[0m\n");
    out.push_str(&format!("  raw:      {}\n", report.raw_full.path().display()));
    out.push_str(&format!("  reduced:  {}\n", report.raw_short.path().display()));
    out.push_str(&format!("  prepared: {}\n", report.prepared.path().display()));
    out.push_str(&format!(
        "  diagnosis: {} rows, {} duplicates, {} flagged columns",
        report.diagnosis.total_rows, report.diagnosis.duplicate_rows, flagged
    ));
    out
}

pub fn render_error(error: &anyhow::Error) -> String {
    format!("\x1b[31mError:\x1b[0m {:#}", error)
}
