//! Renders the operator report as a single self-contained HTML file. The
//! data is computed entirely by `bridge_workers::OperatorSurface`; this
//! module only builds markup from already-computed numbers.

use bridge_workers::{Anomaly, LoadPrediction, PerformanceReport};

pub fn render_html(performance: &PerformanceReport, anomalies: &[Anomaly], predictions: &[LoadPrediction]) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
    out.push_str("<title>Bridge Operator Report</title>");
    out.push_str(STYLE);
    out.push_str("</head><body>");
    out.push_str("<h1>Bridge Operator Report</h1>");

    out.push_str(&format!(
        "<p>Trend: <strong>{:?}</strong> &middot; success rate: <strong>{:.1}%</strong></p>",
        performance.trend, performance.success_rate_pct
    ));

    out.push_str("<h2>Hourly buckets</h2><table><tr><th>hour</th><th>created</th><th>completed</th><th>failed</th><th>success %</th><th>avg secs</th></tr>");
    for bucket in &performance.buckets {
        out.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.1}</td><td>{}</td></tr>",
            bucket.hour_start.format("%Y-%m-%d %H:00"),
            bucket.created,
            bucket.completed,
            bucket.failed,
            bucket.success_rate_pct,
            bucket
                .avg_processing_secs
                .map(|s| format!("{s:.2}"))
                .unwrap_or_else(|| "-".to_string()),
        ));
    }
    out.push_str("</table>");

    out.push_str("<h2>Anomalies</h2>");
    if anomalies.is_empty() {
        out.push_str("<p class=\"ok\">none detected</p>");
    } else {
        out.push_str("<ul>");
        for anomaly in anomalies {
            out.push_str(&format!(
                "<li class=\"sev-{:?}\"><strong>{:?}</strong> ({:?}): {}</li>",
                anomaly.severity, anomaly.kind, anomaly.severity, escape(&anomaly.detail)
            ));
        }
        out.push_str("</ul>");
    }

    out.push_str("<h2>Load prediction</h2><table><tr><th>time</th><th>predicted</th><th>range</th><th>confidence</th><th>recommendation</th></tr>");
    for p in predictions {
        out.push_str(&format!(
            "<tr><td>{}</td><td>{:.1}</td><td>{:.1}-{:.1}</td><td>{:.0}%</td><td>{}</td></tr>",
            p.time.format("%Y-%m-%d %H:00"),
            p.predicted_count,
            p.range_low,
            p.range_high,
            p.confidence,
            p.recommendation,
        ));
    }
    out.push_str("</table>");

    out.push_str("</body></html>");
    out
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

const STYLE: &str = "<style>\
body{font-family:sans-serif;margin:2rem;color:#222}\
table{border-collapse:collapse;margin-bottom:1.5rem}\
th,td{border:1px solid #ccc;padding:0.25rem 0.6rem;text-align:right}\
th:first-child,td:first-child{text-align:left}\
.sev-High{color:#b00020}.sev-Medium{color:#b06a00}.sev-Low{color:#555}\
.ok{color:#2a7d2a}\
</style>";
