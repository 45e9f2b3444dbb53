use std::fmt::Write;

use super::drift::{ColumnDrift, DataDriftTable, DatasetDrift, TargetCorrelations};
use super::regression::{ErrorDistribution, RegressionQuality, RegressionStats, TopError, TopErrorGroups};
use super::{MetricResult, Report};

const BAR_WIDTH_PX: f64 = 240.0;

/// Escape text for use inside HTML element content and attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn num(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.4}")
    } else {
        "-".to_string()
    }
}

fn opt_num(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), num)
}

/// Render the report as a standalone HTML page.
pub fn render(report: &Report) -> String {
    let template = include_str!("templates/report.html");

    let mut sections = String::new();
    for metric in report.metrics() {
        let _ = write!(
            sections,
            "<section id=\"{}\">\n<h2>{}</h2>\n",
            metric.name(),
            metric.name()
        );
        match metric {
            MetricResult::RegressionQuality(q) => regression_quality(&mut sections, q),
            MetricResult::RegressionErrorDistribution(d) => error_distribution(&mut sections, d),
            MetricResult::RegressionTopError(t) => top_error(&mut sections, t),
            MetricResult::ColumnDrift(d) => drift_rows(&mut sections, std::slice::from_ref(d)),
            MetricResult::TargetCorrelations(c) => correlations(&mut sections, c),
            MetricResult::DataDriftTable(t) => data_drift_table(&mut sections, t),
            MetricResult::DatasetDrift(d) => dataset_drift(&mut sections, d),
        }
        sections.push_str("</section>\n");
    }

    let title = format!("{}: {}", report.preset().label(), report.name());
    let reference_rows = report
        .reference_rows()
        .map_or_else(|| "none".to_string(), |n| n.to_string());

    fill(
        template,
        &[
            ("title", escape(&title)),
            ("report_id", report.id().to_string()),
            (
                "created_at",
                report.created_at().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ),
            ("reference_rows", reference_rows),
            ("current_rows", report.current_rows().to_string()),
            ("sections", sections),
        ],
    )
}

/// Substitute `{{key}}` placeholders in one pass; inserted values are never rescanned.
fn fill(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let value = after.find("}}").and_then(|end| {
            values
                .iter()
                .find(|(key, _)| *key == &after[..end])
                .map(|(_, value)| (value, end))
        });
        match value {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn stats_row(out: &mut String, label: &str, stats: &RegressionStats) {
    let _ = writeln!(
        out,
        "<tr><th>{}</th><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td>\
         <td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td></tr>",
        label,
        stats.rows,
        num(stats.mean_error),
        num(stats.mean_abs_error),
        num(stats.rmse),
        opt_num(stats.mean_abs_perc_error),
        opt_num(stats.r2_score),
        num(stats.error_std),
        num(stats.abs_error_max),
    );
}

fn regression_quality(out: &mut String, quality: &RegressionQuality) {
    out.push_str(
        "<table>\n<tr><th></th><th>Rows</th><th>Mean error</th><th>MAE</th><th>RMSE</th>\
         <th>MAPE %</th><th>R&sup2;</th><th>Error std</th><th>Max |error|</th></tr>\n",
    );
    stats_row(out, "Current", &quality.current);
    if let Some(reference) = &quality.reference {
        stats_row(out, "Reference", reference);
    }
    out.push_str("</table>\n");
}

fn bar(count: usize, max: usize, class: &str) -> String {
    let width = if max == 0 {
        0.0
    } else {
        BAR_WIDTH_PX * count as f64 / max as f64
    };
    format!("<span class=\"{class}\" style=\"width:{width:.0}px\"></span> {count}")
}

fn error_distribution(out: &mut String, dist: &ErrorDistribution) {
    let max = dist
        .current
        .iter()
        .chain(dist.reference.iter().flatten())
        .copied()
        .max()
        .unwrap_or(0);

    out.push_str("<table>\n<tr><th>Error bin</th><th>Current</th>");
    if dist.reference.is_some() {
        out.push_str("<th>Reference</th>");
    }
    out.push_str("</tr>\n");

    for (i, count) in dist.current.iter().enumerate() {
        let _ = write!(
            out,
            "<tr><td>[{}, {})</td><td>{}</td>",
            num(dist.bin_edges[i]),
            num(dist.bin_edges[i + 1]),
            bar(*count, max, "bar")
        );
        if let Some(reference) = &dist.reference {
            let _ = write!(out, "<td>{}</td>", bar(reference[i], max, "bar ref"));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
}

fn top_error_rows(out: &mut String, label: &str, groups: &TopErrorGroups) {
    for (group, stats) in [
        ("Underestimation", &groups.underestimation),
        ("Majority", &groups.majority),
        ("Overestimation", &groups.overestimation),
    ] {
        let _ = writeln!(
            out,
            "<tr><td>{label}</td><td>{group}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td></tr>",
            stats.rows,
            num(stats.mean_error),
            num(stats.std_error)
        );
    }
}

fn top_error(out: &mut String, top: &TopError) {
    out.push_str(
        "<table>\n<tr><th>Dataset</th><th>Group</th><th>Rows</th><th>Mean error</th><th>Std</th></tr>\n",
    );
    top_error_rows(out, "Current", &top.current);
    if let Some(reference) = &top.reference {
        top_error_rows(out, "Reference", reference);
    }
    out.push_str("</table>\n");
}

fn drift_rows(out: &mut String, columns: &[ColumnDrift]) {
    out.push_str(
        "<table>\n<tr><th>Column</th><th>Type</th><th>Test</th><th>Score</th><th>Threshold</th>\
         <th>Reference mean</th><th>Current mean</th><th>Status</th></tr>\n",
    );
    for c in columns {
        let (class, status) = if c.drift_detected {
            ("drift", "Drift detected")
        } else {
            ("stable", "Not detected")
        };
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{:?}</td><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td>\
             <td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"{class}\">{status}</td></tr>",
            escape(&c.column),
            c.kind,
            escape(&c.stattest_label),
            num(c.drift_score),
            num(c.threshold),
            num(c.reference_mean),
            num(c.current_mean),
        );
    }
    out.push_str("</table>\n");
}

fn correlations(out: &mut String, corr: &TargetCorrelations) {
    let _ = writeln!(
        out,
        "<p>Pearson correlation with <code>{}</code></p>",
        escape(&corr.column)
    );
    out.push_str("<table>\n<tr><th>Feature</th><th>Reference</th><th>Current</th></tr>\n");
    for f in &corr.features {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td></tr>",
            escape(&f.feature),
            opt_num(f.reference),
            opt_num(f.current)
        );
    }
    out.push_str("</table>\n");
}

fn data_drift_table(out: &mut String, table: &DataDriftTable) {
    drift_rows(out, &table.columns);
}

fn dataset_drift(out: &mut String, summary: &DatasetDrift) {
    let (class, verdict) = if summary.dataset_drift {
        ("drift", "Dataset drift detected")
    } else {
        ("stable", "Dataset drift not detected")
    };
    let _ = writeln!(
        out,
        "<p class=\"{class}\">{verdict}</p>\n<p>{} of {} columns drifted (share {:.2}, threshold {:.2}).</p>",
        summary.n_drifted_columns,
        summary.n_columns,
        summary.share_of_drifted_columns,
        summary.threshold
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape("<b>\"a\" & 'b'</b>"),
            "&lt;b&gt;&quot;a&quot; &amp; &#39;b&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn bars_scale_to_the_largest_count() {
        assert!(bar(10, 10, "bar").contains("width:240px"));
        assert!(bar(5, 10, "bar").contains("width:120px"));
        assert!(bar(0, 0, "bar").contains("width:0px"));
    }

    #[test]
    fn non_finite_numbers_render_as_dash() {
        assert_eq!(num(f64::NAN), "-");
        assert_eq!(num(1.5), "1.5000");
        assert_eq!(opt_num(None), "-");
    }

    #[test]
    fn placeholders_are_filled_once() {
        let out = fill(
            "<h1>{{title}}</h1>{{body}} {{unknown}} {{",
            &[
                ("title", "{{body}}".to_string()),
                ("body", "<p>x</p>".to_string()),
            ],
        );
        assert_eq!(out, "<h1>{{body}}</h1><p>x</p> {{unknown}} {{");
    }

    #[test]
    fn report_name_with_placeholders_is_kept_verbatim() {
        use crate::report::{ColumnMapping, Preset};
        use polars::prelude::*;

        let frame = df!(
            "target" => [1.0, 2.0, 3.0, 4.0],
            "prediction" => [1.5, 2.0, 2.5, 4.5],
        )
        .unwrap();
        let mapping = ColumnMapping {
            target: Some("target".into()),
            prediction: Some("prediction".into()),
            ..Default::default()
        };
        let report = Report::run(
            "week{{sections}}{{report_id}}",
            Preset::Regression,
            None,
            &frame,
            &mapping,
        )
        .unwrap();

        let html = render(&report);
        assert!(html.contains("week{{sections}}{{report_id}}"));
        assert_eq!(html.matches("<section id=\"RegressionQuality\">").count(), 1);
    }
}
