//! Text renderings of reports and dashboard state

use std::fmt::Write;
use std::str::FromStr;

use super::PerformanceReport;
use crate::dashboard::DashboardState;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Html,
    Markdown,
}

impl FromStr for ReportFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "structured" => Ok(ReportFormat::Json),
            "html" | "rendered" => Ok(ReportFormat::Html),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            _ => Err(PipelineError::UnsupportedFormat(s.to_string())),
        }
    }
}

pub fn render_report(report: &PerformanceReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        ReportFormat::Html => Ok(report_html(report)),
        ReportFormat::Markdown => Ok(report_markdown(report)),
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

// `write!` into a String cannot fail, so its results are ignored below.

fn report_markdown(report: &PerformanceReport) -> String {
    let meta = &report.report_metadata;
    let agg = &report.aggregated_metrics;
    let mut md = String::new();

    let _ = writeln!(md, "# Performance Report ({}h)", meta.period_hours);
    let _ = writeln!(md);
    let _ = writeln!(md, "Generated: {}  ", meta.generated_at_utc);
    let _ = writeln!(md, "Data points: {}", meta.data_points);
    let _ = writeln!(md);

    let _ = writeln!(md, "## Metrics");
    let _ = writeln!(md);
    let _ = writeln!(md, "| Metric | Avg | Min | Max |");
    let _ = writeln!(md, "|---|---|---|---|");
    for (name, s) in [
        ("Throughput", &agg.throughput),
        ("Power (W)", &agg.power),
        ("Temperature (°C)", &agg.temperature),
        ("Efficiency", &agg.efficiency),
    ] {
        let _ = writeln!(md, "| {name} | {:.3} | {:.3} | {:.3} |", s.avg, s.min, s.max);
    }
    let _ = writeln!(md);

    if !report.kpi_trends.is_empty() {
        let _ = writeln!(md, "## KPIs");
        let _ = writeln!(md);
        let _ = writeln!(md, "| KPI | Avg | Min | Max |");
        let _ = writeln!(md, "|---|---|---|---|");
        for (name, s) in &report.kpi_trends {
            let _ = writeln!(md, "| {name} | {:.3} | {:.3} | {:.3} |", s.avg, s.min, s.max);
        }
        let _ = writeln!(md);
    }

    if !report.alert_summary.is_empty() {
        let _ = writeln!(md, "## Alerts");
        let _ = writeln!(md);
        for a in &report.alert_summary {
            let _ = writeln!(md, "- {}: {} (max {})", a.alert_type, a.count, a.max_severity);
        }
        let _ = writeln!(md);
    }

    let _ = writeln!(md, "## Recommendations");
    let _ = writeln!(md);
    for r in &report.recommendations {
        let _ = writeln!(md, "- {}", r.message);
    }

    md
}

fn report_html(report: &PerformanceReport) -> String {
    let meta = &report.report_metadata;
    let agg = &report.aggregated_metrics;
    let mut html = String::new();

    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Performance Report</title></head>\n<body>\n\
         <h1>Performance Report ({}h)</h1>\n<p>Generated {} from {} data points</p>\n",
        meta.period_hours,
        escape_html(&meta.generated_at_utc),
        meta.data_points
    );

    html.push_str("<h2>Metrics</h2>\n<table>\n<tr><th>Metric</th><th>Avg</th><th>Min</th><th>Max</th></tr>\n");
    for (name, s) in [
        ("Throughput", &agg.throughput),
        ("Power (W)", &agg.power),
        ("Temperature (°C)", &agg.temperature),
        ("Efficiency", &agg.efficiency),
    ] {
        let _ = writeln!(
            html,
            "<tr><td>{name}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td></tr>",
            s.avg, s.min, s.max
        );
    }
    html.push_str("</table>\n");

    if !report.kpi_trends.is_empty() {
        html.push_str("<h2>KPIs</h2>\n<table>\n<tr><th>KPI</th><th>Avg</th><th>Min</th><th>Max</th></tr>\n");
        for (name, s) in &report.kpi_trends {
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td></tr>",
                escape_html(name),
                s.avg,
                s.min,
                s.max
            );
        }
        html.push_str("</table>\n");
    }

    if !report.alert_summary.is_empty() {
        html.push_str("<h2>Alerts</h2>\n<ul>\n");
        for a in &report.alert_summary {
            let _ = writeln!(
                html,
                "<li>{}: {} (max {})</li>",
                a.alert_type, a.count, a.max_severity
            );
        }
        html.push_str("</ul>\n");
    }

    html.push_str("<h2>Recommendations</h2>\n<ul>\n");
    for r in &report.recommendations {
        let _ = writeln!(html, "<li>{}</li>", escape_html(&r.message));
    }
    html.push_str("</ul>\n</body>\n</html>\n");

    html
}

/// Standalone HTML page for the current dashboard state
pub fn render_dashboard_html(state: &DashboardState) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Telemetry Dashboard</title></head>\n<body>\n\
         <h1>Telemetry Dashboard</h1>\n<p>Generated {}</p>\n",
        escape_html(&state.generated_at_utc)
    );

    html.push_str("<h2>Current</h2>\n");
    match &state.current {
        Some(snapshot) => {
            let s = &snapshot.system;
            let _ = writeln!(
                html,
                "<ul>\n<li>Units: {}/{} active</li>\n<li>Total throughput: {:.2}</li>\n\
                 <li>Total power: {:.0} W</li>\n<li>Avg temperature: {:.1} °C</li>\n\
                 <li>Avg efficiency: {:.3}</li>\n</ul>",
                s.active_units,
                s.total_units,
                s.total_throughput,
                s.total_power_watts,
                s.avg_temperature_c,
                s.avg_efficiency
            );
        }
        None => html.push_str("<p>No data collected yet</p>\n"),
    }

    let o = &state.last_hour;
    let _ = writeln!(
        html,
        "<h2>Last hour</h2>\n<ul>\n<li>Avg throughput: {:.2}</li>\n<li>Avg power: {:.0} W</li>\n\
         <li>Avg temperature: {:.1} °C</li>\n<li>Avg efficiency: {:.3}</li>\n<li>Samples: {}</li>\n</ul>",
        o.avg_throughput, o.avg_power_watts, o.avg_temperature_c, o.avg_efficiency, o.data_points
    );

    if !state.kpis.is_empty() {
        html.push_str("<h2>KPIs</h2>\n<table>\n<tr><th>KPI</th><th>Value</th><th>Target</th></tr>\n");
        for k in &state.kpis {
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{:.3}</td><td>{:.2}</td></tr>",
                k.name, k.value, k.target
            );
        }
        html.push_str("</table>\n");
    }

    html.push_str("<h2>Open alerts</h2>\n");
    if state.alerts.is_empty() {
        html.push_str("<p>None</p>\n");
    } else {
        html.push_str("<ul>\n");
        for a in &state.alerts {
            let _ = writeln!(
                html,
                "<li>[{}] {}: {}</li>",
                a.severity,
                a.alert_type,
                escape_html(&a.message)
            );
        }
        html.push_str("</ul>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}
