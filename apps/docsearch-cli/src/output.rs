use std::fmt::Write;

use docsearch_core::query::{QueryResponse, QueryStatus};
use docsearch_hybrid::EvalReport;

const PREVIEW_CHARS: usize = 160;

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}

pub fn format_response(question: &str, resp: &QueryResponse) -> String {
    let mut out = String::new();
    if resp.status == QueryStatus::Cancelled {
        let _ = writeln!(out, "Query cancelled after {} ms", resp.latency.total_ms);
        return out;
    }
    let _ = writeln!(out, "Query: {question}");
    let _ = writeln!(
        out,
        "Mode: {:?}  total {} ms (retrieval {} / rerank {})",
        resp.mode, resp.latency.total_ms, resp.latency.retrieval_ms, resp.latency.rerank_ms
    );
    for d in &resp.degradations {
        let _ = writeln!(out, "  ! {} {:?}: {}", d.stage, d.kind, d.message);
    }
    if resp.is_empty() {
        let _ = writeln!(out, "\nNo results.");
        return out;
    }
    let _ = writeln!(out, "\nCitations:");
    for (i, c) in resp.citation_chunks.iter().enumerate() {
        let _ = writeln!(out, "{:>2}. [{} p.{}] {}", i + 1, c.doc_id, c.page, preview(&c.text));
    }
    let _ = writeln!(out, "\nContext:");
    for c in &resp.context_chunks {
        let title = c.section_title.as_deref().unwrap_or("-");
        let _ = writeln!(out, "  - {} ({} p.{}, {})", c.chunk_id, c.doc_id, c.page, title);
    }
    out
}

pub fn format_report(report: &EvalReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Cases: {}", report.cases);
    let _ = writeln!(out, "Recall@{}: {:.3}", report.k, report.mean_recall);
    let _ = writeln!(out, "Avg latency: {:.1} ms", report.avg_latency_ms);
    let _ = writeln!(out, "P95 latency: {:.1} ms", report.p95_latency_ms);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("a\n  b"), "a b");
        let long = "x".repeat(PREVIEW_CHARS + 10);
        assert!(preview(&long).ends_with("..."));
    }

    #[test]
    fn cancelled_response_prints_one_line() {
        let text = format_response("q", &QueryResponse::cancelled(12));
        assert_eq!(text.trim(), "Query cancelled after 12 ms");
    }
}
