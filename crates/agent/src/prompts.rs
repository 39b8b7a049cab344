//! Prompt text for the business analyst and data analyst roles.
//!
//! Prompts are plain strings assembled from typed inputs. Nothing here calls a
//! model, so every builder is unit-testable.

use chrono::NaiveDate;

use funnelsight_core::domain::analysis::{
    ExtractedParameters, Interpretation, QueryOrigin, QueryOutcome, TechnicalResult, Verbosity,
};
use funnelsight_core::text::truncate_chars;

/// Rows of a result set that are quoted back to the synthesis prompt.
const SYNTHESIS_SAMPLE_ROWS: usize = 20;
const SYNTHESIS_ANALYSIS_CHARS: usize = 4_000;

pub const BUSINESS_ANALYST_PROMPT: &str = "\
You are a business analyst for an airline website. You turn stakeholder questions into precise \
analysis requirements and turn technical results into short, business-friendly answers.

Funnel: traffic (sessions entering the site) -> flight page loads -> payment confirmations.
Conversion rate = payment_confirmation_loaded / traffic * 100.
Markets (culture): BR, CL, PE, PY, US, CO, AR, EC, UY. Devices: desktop, mobile.
Traffic sources: Organico (organic and SEO), Pagado (paid), Promoted (social and promotions).

Rules:
- Never invent figures. Only report numbers present in the technical results.
- If the technical results contain no rows, say that no data was found for the criteria.
- Be concise unless the user explicitly asks for detail or recommendations.
- Do not ask the user follow-up questions; state assumptions instead.";

pub fn data_analyst_prompt(table: &str, reference_date: NaiveDate) -> String {
    format!(
        "You are a data analyst with expertise in SQL over a SQLite warehouse.\n\
         \n\
         Table `{table}`: daily aggregated funnel data, one row per date, culture, device and \
         traffic_type.\n\
         Columns:\n\
         - date (TEXT, YYYY-MM-DD)\n\
         - culture (TEXT): BR, CL, PE, PY, US, CO, AR, EC, UY\n\
         - device (TEXT): desktop, mobile\n\
         - traffic_type (TEXT): Organico, Pagado, Promoted\n\
         - traffic (INTEGER): sessions entering the funnel\n\
         - flight_dom_loaded_flight (INTEGER): flight page loads\n\
         - payment_confirmation_loaded (INTEGER): payment confirmations\n\
         - median_time_seconds, median_time_minutes (REAL): median time to book\n\
         \n\
         Today is {today}.\n\
         \n\
         Guidelines:\n\
         - Use only SELECT or WITH statements against `{table}`, one statement per call.\n\
         - Conversion rate is 100.0 * SUM(payment_confirmation_loaded) / NULLIF(SUM(traffic), 0).\n\
         - When a period is missing use the most recent complete month; when a market, device \
         or traffic source is missing include all of them combined.\n\
         - Never refuse because details are missing. Make a reasonable assumption and state it.\n\
         - Call sql_query before answering. Use data_analysis for totals, trends or \
         comparisons and get_schema_info if unsure about a column.\n\
         - Finish with the SQL you ran, the key figures and a short technical reading.",
        today = reference_date.format("%Y-%m-%d"),
    )
}

pub fn interpretation_request(question: &str, assumptions: &[String]) -> String {
    let mut request = format!(
        "A user asked the following question about airline website performance:\n\n\
         \"{question}\"\n\n\
         Describe in a few lines:\n\
         1. The business metric or performance area of interest.\n\
         2. The data needed: period, metrics, segmentation by culture, device or traffic type, \
         and any comparison.\n\
         3. Why the question matters to the business."
    );
    if !assumptions.is_empty() {
        request.push_str("\n\nApply these defaults where the question is silent:");
        for assumption in assumptions {
            request.push_str(&format!("\n- {assumption}"));
        }
    }
    request
}

pub fn analysis_request(
    question: &str,
    interpretation: &Interpretation,
    parameters: &ExtractedParameters,
) -> String {
    let mut request = format!(
        "Business question: {question}\n\nBusiness interpretation:\n{}",
        interpretation.text.trim()
    );
    if !interpretation.assumptions.is_empty() {
        request.push_str("\n\nAssumptions:");
        for assumption in &interpretation.assumptions {
            request.push_str(&format!("\n- {assumption}"));
        }
    }
    let carried = parameters.describe();
    if !carried.is_empty() {
        request.push_str(&format!(
            "\n\nFilters from this conversation (keep them unless the question changes them): \
             {carried}"
        ));
    }
    request.push_str("\n\nQuery the warehouse and report the results.");
    request
}

pub fn synthesis_request(question: &str, result: &TechnicalResult, verbosity: Verbosity) -> String {
    let instructions = match verbosity {
        Verbosity::Concise => {
            "Answer the question directly in at most four sentences. Mention only the figures \
             that answer it."
        }
        Verbosity::Detailed => {
            "Give a direct answer first, then the key findings, what they mean for the business \
             and concrete recommendations."
        }
    };
    format!(
        "Original question: {question}\n\nTechnical results:\n{}\n\n{instructions}\n\
         Use only figures that appear in the technical results.",
        technical_summary(result)
    )
}

/// Analysis text, the SQL that ran and a sample of the rows it returned.
pub fn technical_summary(result: &TechnicalResult) -> String {
    let mut summary = truncate_chars(result.analysis_text.trim(), SYNTHESIS_ANALYSIS_CHARS);
    for query in &result.queries {
        let origin = match query.origin {
            QueryOrigin::Agent => "query",
            QueryOrigin::Fallback => "default query",
        };
        summary.push_str(&format!("\n\n{origin}: {}\n", query.sql));
        match &query.outcome {
            QueryOutcome::Rows { columns, rows, row_count, truncated } => {
                summary.push_str(&format!("rows: {row_count}"));
                if *truncated {
                    summary.push_str(" (sample below)");
                }
                summary.push_str(&format!("\n{}", columns.join(" | ")));
                for row in rows.iter().take(SYNTHESIS_SAMPLE_ROWS) {
                    let cells: Vec<String> = row.iter().map(render_cell).collect();
                    summary.push_str(&format!("\n{}", cells.join(" | ")));
                }
            }
            QueryOutcome::Empty => summary.push_str("rows: 0"),
            QueryOutcome::Failed { reason } => summary.push_str(&format!("failed: {reason}")),
            QueryOutcome::NotExecuted => summary.push_str("not executed"),
        }
    }
    summary
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use funnelsight_core::domain::analysis::{
        ExecutedQuery, ExtractedParameters, Interpretation, ParameterKind, QueryOrigin,
        QueryOutcome, TechnicalResult, Verbosity,
    };

    use super::{
        analysis_request, data_analyst_prompt, interpretation_request, synthesis_request,
        technical_summary,
    };

    #[test]
    fn data_analyst_prompt_names_table_and_reference_date() {
        let prompt = data_analyst_prompt(
            "funnels_resumido",
            NaiveDate::from_ymd_opt(2025, 9, 2).expect("date"),
        );
        assert!(prompt.contains("Table `funnels_resumido`"));
        assert!(prompt.contains("Today is 2025-09-02."));
    }

    #[test]
    fn interpretation_request_lists_assumptions() {
        let request = interpretation_request(
            "conversion rate Chile",
            &["No device given: combine desktop and mobile.".to_string()],
        );
        assert!(request.contains("\"conversion rate Chile\""));
        assert!(request.contains("- No device given"));
        assert!(!interpretation_request("traffic", &[]).contains("defaults"));
    }

    #[test]
    fn analysis_request_carries_conversation_filters() {
        let mut parameters = ExtractedParameters::default();
        parameters.insert(ParameterKind::Market, "CL");
        let interpretation =
            Interpretation { text: "Full table for Chile".to_string(), assumptions: Vec::new() };

        let request = analysis_request("show me the full table", &interpretation, &parameters);
        assert!(request.contains("market: CL"));
        assert!(request.contains("Full table for Chile"));
    }

    #[test]
    fn technical_summary_quotes_queries_and_rows() {
        let result = TechnicalResult {
            analysis_text: "Chile converted at 3.1%.".to_string(),
            queries: vec![ExecutedQuery {
                sql: "SELECT culture, SUM(traffic) FROM funnels_resumido GROUP BY culture"
                    .to_string(),
                origin: QueryOrigin::Fallback,
                outcome: QueryOutcome::Rows {
                    columns: vec!["culture".to_string(), "traffic".to_string()],
                    rows: vec![vec![json!("CL"), json!(3100)]],
                    row_count: 1,
                    truncated: false,
                },
            }],
            ..TechnicalResult::default()
        };

        let summary = technical_summary(&result);
        assert!(summary.starts_with("Chile converted at 3.1%."));
        assert!(summary.contains("default query: SELECT culture"));
        assert!(summary.contains("CL | 3100"));

        let detailed = synthesis_request("conversion Chile", &result, Verbosity::Detailed);
        assert!(detailed.contains("recommendations"));
    }
}
