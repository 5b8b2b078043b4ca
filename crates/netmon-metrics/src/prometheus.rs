//! Prometheus text exposition format.
//!
//! Renders registry snapshots into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use crate::registry::FamilySnapshot;

/// Render registry snapshots into Prometheus text format.
///
/// Each family gets `# HELP` (when known) and `# TYPE` lines followed by one
/// `name{labels} value` line per label set.
pub fn render_prometheus(families: &[FamilySnapshot]) -> String {
    let mut out = String::new();

    for family in families {
        if !family.help.is_empty() {
            let _ = writeln!(out, "# HELP {} {}", family.name, escape_help(&family.help));
        }
        let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind);
        for (labels, value) in &family.series {
            let _ = writeln!(out, "{}{} {}", family.name, labels, format_value(*value));
        }
    }

    out
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}
