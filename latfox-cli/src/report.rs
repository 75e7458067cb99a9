//! Human-readable run summary

use latfox_core::MigrationReport;
use std::fmt::Write;

/// Summary printed after a migration run
pub fn format_summary(report: &MigrationReport) -> String {
    let mut out = String::new();
    let heading = if report.dry_run {
        "Dry run complete!"
    } else {
        "Migration complete!"
    };
    let elapsed = report.elapsed().num_milliseconds() as f64 / 1000.0;

    let _ = writeln!(out, "{}", heading);
    let _ = writeln!(out, "  Rows: {}", report.rows);
    let _ = writeln!(out, "  Migrated objects: {}", report.migrated);
    let _ = writeln!(out, "  Versions added: {}", report.versions_added);
    let _ = writeln!(out, "  Single version: {}", report.single_version);
    let _ = writeln!(out, "  Older versions skipped: {}", report.superseded);
    let _ = writeln!(out, "  Deleted objects: {}", report.deleted);
    let _ = writeln!(out, "  Failed: {}", report.failed);
    for failure in &report.failures {
        let _ = writeln!(out, "    {}: {}", failure.node_id, failure.error);
    }
    let _ = writeln!(out, "  Elapsed: {:.1}s", elapsed);
    out
}
