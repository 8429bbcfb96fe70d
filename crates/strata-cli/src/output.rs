use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde_json::{Value, json};
use strata::analysis::TenderAnalysis;
use strata::protocol::{Extraction, ExtractionFailure};

#[derive(Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().copied());
    table
}

fn or_dash(value: Option<&str>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or("-")
        .to_string()
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Titled tables for a tender analysis, in display order
pub fn analysis_tables(analysis: &TenderAnalysis) -> Vec<(&'static str, Table)> {
    let mut tables = Vec::new();

    let meta = &analysis.tender_metadata;
    let summary = &analysis.executive_summary;
    let mut overview = new_table(&["Field", "Value"]);
    overview.add_row(["Title".to_string(), or_dash(meta.title.as_deref())]);
    overview.add_row([
        "Issuing authority".to_string(),
        or_dash(meta.issuing_authority.as_deref()),
    ]);
    overview.add_row(["Deadline".to_string(), or_dash(meta.deadline.as_deref())]);
    overview.add_row(["Category".to_string(), or_dash(meta.category.as_deref())]);
    overview.add_row([
        "Readiness score".to_string(),
        analysis
            .readiness_score()
            .map(|s| format!("{s:.0}/100"))
            .unwrap_or_else(|| "-".to_string()),
    ]);
    overview.add_row([
        "Readiness".to_string(),
        or_dash(summary.overall_readiness_statement.as_deref()),
    ]);
    tables.push(("Overview", overview));

    if !analysis.top_blockers.is_empty() {
        let mut blockers = new_table(&["Blocker", "Type"]);
        for b in &analysis.top_blockers {
            blockers.add_row([b.blocker.clone(), or_dash(b.kind.as_deref())]);
        }
        tables.push(("Top blockers", blockers));
    }

    if !analysis.mandatory_requirements.is_empty() {
        let mut requirements = new_table(&["Requirement", "Criticality", "Clause", "Status"]);
        for r in &analysis.mandatory_requirements {
            requirements.add_row([
                truncate_string(&r.requirement, 80),
                or_dash(r.criticality.as_deref()),
                or_dash(r.source_clause.as_deref()),
                or_dash(r.status.as_deref()),
            ]);
        }
        tables.push(("Mandatory requirements", requirements));
    }

    if !analysis.required_documents.is_empty() {
        let mut documents = new_table(&["Document", "Mandatory", "Present"]);
        for d in &analysis.required_documents {
            documents.add_row([
                d.document_name.clone(),
                yes_no(d.mandatory).to_string(),
                yes_no(d.present).to_string(),
            ]);
        }
        tables.push(("Required documents", documents));
    }

    if !analysis.risks_flagged.is_empty() {
        let mut risks = new_table(&["Risk"]);
        for risk in &analysis.risks_flagged {
            risks.add_row([risk.clone()]);
        }
        tables.push(("Risks", risks));
    }

    if !analysis.evaluation_criteria.is_empty() {
        let mut criteria = new_table(&["Criterion", "Weight"]);
        for c in &analysis.evaluation_criteria {
            let weight = match &c.weight {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "-".to_string(),
            };
            criteria.add_row([c.criterion.clone(), weight]);
        }
        tables.push(("Evaluation criteria", criteria));
    }

    tables
}

/// Key/value table for an arbitrary object
pub fn object_table(value: &Value) -> Table {
    let mut table = new_table(&["Key", "Value"]);
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    Value::Array(items) => items
                        .iter()
                        .map(|i| match i {
                            Value::String(s) => format!("- {s}"),
                            other => format!("- {other}"),
                        })
                        .collect::<Vec<_>>()
                        .join("\n"),
                    other => other.to_string(),
                };
                table.add_row([key.clone(), rendered]);
            }
        }
        other => {
            table.add_row(["value".to_string(), other.to_string()]);
        }
    }
    table
}

/// Machine-readable summary of a finished session
pub fn extraction_json(extraction: &Extraction, complete: bool) -> Value {
    match &extraction.result {
        Ok(value) => json!({
            "complete": complete,
            "prose": extraction.prose,
            "result": value,
        }),
        Err(failure) => json!({
            "complete": complete,
            "prose": extraction.prose,
            "error": failure_kind(failure),
            "detail": failure.to_string(),
        }),
    }
}

pub fn failure_kind(failure: &ExtractionFailure) -> &'static str {
    match failure {
        ExtractionFailure::NoBlockFound => "no_block_found",
        ExtractionFailure::InvalidJson(_) => "invalid_json",
    }
}
