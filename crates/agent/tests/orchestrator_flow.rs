use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;

use funnelsight_agent::{
    AnalysisOrchestrator, LlmClient, LlmError, LlmReply, LlmRequest, RunOutcome, RunResponse,
    ToolCall,
};
use funnelsight_core::audit::InMemoryAuditSink;
use funnelsight_core::checkpoint::CheckpointStore;
use funnelsight_core::config::AppConfig;
use funnelsight_core::domain::conversation::ConversationTurn;
use funnelsight_core::extraction::{ExtractionContext, ParameterExtractor};
use funnelsight_db::{
    connect_with_settings, migrations, FunnelSeedDataset, InMemoryCheckpointStore, SqlWarehouse,
};

const AUGUST_CHILE_SQL: &str = "SELECT culture, SUM(traffic) AS traffic, \
     ROUND(100.0 * SUM(payment_confirmation_loaded) / NULLIF(SUM(traffic), 0), 2) \
     AS conversion_rate_pct FROM funnels_resumido \
     WHERE culture = 'CL' AND date BETWEEN '2025-08-01' AND '2025-08-31' GROUP BY culture";

const AUGUST_ECUADOR_SQL: &str = "SELECT culture, SUM(traffic) AS traffic FROM funnels_resumido \
     WHERE culture = 'EC' AND date BETWEEN '2025-08-01' AND '2025-08-31' GROUP BY culture";

const FULL_TABLE_SQL: &str = "SELECT date, culture, device, traffic_type, traffic \
     FROM funnels_resumido \
     WHERE culture = 'CL' AND date BETWEEN '2025-08-01' AND '2025-08-31' ORDER BY date";

/// Replays canned replies in order and records every request.
#[derive(Default)]
struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<LlmReply, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    fn new(replies: Vec<LlmReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Requests that offered tools, i.e. data agent rounds.
    fn agent_requests(&self) -> Vec<LlmRequest> {
        self.requests().into_iter().filter(|request| !request.tools.is_empty()).collect()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn invoke(&self, request: LlmRequest) -> Result<LlmReply, LlmError> {
        self.requests.lock().expect("requests lock").push(request);
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Ok(LlmReply::text("scripted reply")))
    }
}

fn query_call(id: &str, sql: &str) -> LlmReply {
    LlmReply {
        text: String::new(),
        tool_calls: vec![ToolCall {
            id: id.to_string(),
            name: "sql_query".to_string(),
            arguments: json!({ "query": sql }),
        }],
    }
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 1).expect("reference date")
}

struct Harness {
    orchestrator: AnalysisOrchestrator,
    checkpoints: Arc<InMemoryCheckpointStore>,
    audit: InMemoryAuditSink,
}

async fn harness(llm: Arc<ScriptedLlm>) -> Harness {
    let pool = connect_with_settings(":memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    FunnelSeedDataset::load(&pool).await.expect("seed");
    let warehouse = Arc::new(SqlWarehouse::new(pool, 30));

    let checkpoints = Arc::new(InMemoryCheckpointStore::default());
    let audit = InMemoryAuditSink::default();
    let orchestrator =
        AnalysisOrchestrator::new(llm, warehouse.clone(), warehouse, &AppConfig::default())
            .with_checkpoints(checkpoints.clone())
            .with_audit_sink(Arc::new(audit.clone()))
            .with_reference_date(reference_date());
    Harness { orchestrator, checkpoints, audit }
}

/// A response is exactly one of answered, clarification or failure.
fn assert_single_outcome(response: &RunResponse) {
    match response.outcome() {
        RunOutcome::Answered => {
            assert!(response.success);
            assert!(!response.needs_clarification);
            assert!(response.clarifying_questions.is_empty());
            assert!(response.metadata.error.is_none());
        }
        RunOutcome::Clarification => {
            assert!(response.success);
            assert!(!response.clarifying_questions.is_empty());
            assert!(!response.metadata.analysis_completed);
        }
        RunOutcome::Failed => {
            assert!(!response.needs_clarification);
            assert!(response.metadata.error.is_some());
            assert!(response.response.starts_with("Error: "));
        }
    }
    assert!(!response.response.trim().is_empty());
}

#[tokio::test]
async fn metric_and_market_are_enough_to_answer() {
    let llm = ScriptedLlm::new(vec![
        LlmReply::text("Conversion rate for the Chilean market."),
        query_call("call-1", AUGUST_CHILE_SQL),
        LlmReply::text("Chile converted at about 3.1% in August."),
        LlmReply::text("Chile converted at about 3.1% in August 2025."),
    ]);
    let harness = harness(llm.clone()).await;

    let response = harness.orchestrator.run("conversion rate Chile", "thread-cl", &[]).await;

    assert_single_outcome(&response);
    assert_eq!(response.outcome(), RunOutcome::Answered);
    assert_eq!(response.metadata.tools_used, vec!["sql_query"]);
    assert!(!response.metadata.used_fallback);
    assert!(response.metadata.analysis_completed);
    assert_eq!(response.response, "Chile converted at about 3.1% in August 2025.");

    let synthesis = llm.requests().pop().expect("synthesis request");
    let prompt = &synthesis.messages.last().expect("synthesis message").content;
    assert!(prompt.contains("conversion_rate_pct"));
    assert!(prompt.contains("CL | "));
    assert_eq!(harness.audit.events_of_type("run.completed").len(), 1);
}

#[tokio::test]
async fn empty_results_are_reported_as_no_data() {
    let llm = ScriptedLlm::new(vec![
        LlmReply::text("Traffic for Ecuador in August."),
        query_call("call-1", AUGUST_ECUADOR_SQL),
        LlmReply::text("The query returned no rows."),
    ]);
    let harness = harness(llm.clone()).await;

    let response =
        harness.orchestrator.run("traffic in Ecuador for August 2025", "thread-ec", &[]).await;

    assert_single_outcome(&response);
    assert_eq!(response.outcome(), RunOutcome::Answered);
    assert!(response.response.starts_with("No data available for the requested criteria"));
    assert!(response.response.contains("market: EC"));
    assert!(!response.metadata.used_fallback);
    // interpretation plus two agent rounds; synthesis never reaches the model
    assert_eq!(llm.requests().len(), 3);
}

#[tokio::test]
async fn agents_that_never_query_get_exactly_one_default_query() {
    let llm = ScriptedLlm::new(vec![
        LlmReply::text("Traffic for Peru."),
        LlmReply::text("Peru is a mid-sized market."),
        LlmReply::text("Peru had steady traffic over the last 30 days."),
    ]);
    let harness = harness(llm.clone()).await;

    let response = harness.orchestrator.run("traffic Peru", "thread-pe", &[]).await;

    assert_single_outcome(&response);
    assert_eq!(response.outcome(), RunOutcome::Answered);
    assert_eq!(response.metadata.tools_used, vec!["sql_query"]);
    assert!(response.metadata.used_fallback);

    let checkpoint = harness.checkpoints.get("thread-pe").await.expect("get").expect("saved");
    assert_eq!(checkpoint.executed_queries.len(), 1);
    let sql = checkpoint.executed_queries[0].query_text().expect("query text");
    assert!(sql.contains("culture IN ('PE')"));
    assert!(sql.contains("BETWEEN '2025-08-02' AND '2025-09-01'"));
}

#[tokio::test]
async fn rejecting_clarification_in_history_skips_questions() {
    let llm = ScriptedLlm::new(vec![
        LlmReply::text("General performance overview."),
        LlmReply::text("Overview prepared."),
        LlmReply::text("Across all markets the funnel converted steadily."),
    ]);
    let harness = harness(llm).await;
    let history = vec![
        ConversationTurn::user("no more questions, just tell me"),
        ConversationTurn::assistant("Understood."),
    ];

    let response = harness.orchestrator.run("how are we doing?", "thread-direct", &history).await;

    assert_single_outcome(&response);
    assert_eq!(response.outcome(), RunOutcome::Answered);
    assert!(response.clarifying_questions.is_empty());
    assert_eq!(override_reason(&harness).as_deref(), Some("explicit_rejection"));
}

#[tokio::test]
async fn rejecting_clarification_on_a_first_question_answers_with_defaults() {
    let llm = ScriptedLlm::new(vec![
        LlmReply::text("General performance overview."),
        LlmReply::text("Overview prepared."),
        LlmReply::text("Across all markets the funnel converted steadily."),
    ]);
    let harness = harness(llm).await;

    let question = "No quiero clarificación, ¿cómo vamos?";
    let response = harness.orchestrator.run(question, "thread-first", &[]).await;

    assert_single_outcome(&response);
    assert_eq!(response.outcome(), RunOutcome::Answered);
    assert!(response.clarifying_questions.is_empty());
    assert_eq!(override_reason(&harness).as_deref(), Some("explicit_rejection"));
}

fn override_reason(harness: &Harness) -> Option<String> {
    harness
        .audit
        .events_of_type("clarification.decided")
        .last()
        .and_then(|event| event.metadata.get("override_reason").cloned())
}

#[tokio::test]
async fn unspecified_subjects_ask_before_querying() {
    let llm = ScriptedLlm::new(vec![LlmReply::text("The request names no subject.")]);
    let harness = harness(llm.clone()).await;

    let response = harness.orchestrator.run("how are we doing?", "thread-vague", &[]).await;

    assert_single_outcome(&response);
    assert_eq!(response.outcome(), RunOutcome::Clarification);
    assert!(response.response.starts_with("To answer accurately:"));
    assert!(response.metadata.tools_used.is_empty());
    assert!(llm.agent_requests().is_empty());
    assert_eq!(override_reason(&harness), None);
}

#[tokio::test]
async fn follow_ups_keep_the_filters_of_the_thread() {
    let llm = ScriptedLlm::new(vec![
        LlmReply::text("Conversion rate for Chile in August."),
        query_call("call-1", AUGUST_CHILE_SQL),
        LlmReply::text("Chile converted at about 3.1%."),
        LlmReply::text("Chile converted at about 3.1% in August."),
        LlmReply::text("Daily detail for the same selection."),
        query_call("call-2", FULL_TABLE_SQL),
        LlmReply::text("Daily rows for Chile in August."),
        LlmReply::text("Here is the daily table for Chile in August."),
    ]);
    let harness = harness(llm.clone()).await;

    let first = harness
        .orchestrator
        .run("conversion rate in Chile for August", "thread-follow", &[])
        .await;
    assert_eq!(first.outcome(), RunOutcome::Answered);

    let history = vec![
        ConversationTurn::user("conversion rate in Chile for August"),
        ConversationTurn::assistant(first.response.clone()),
    ];
    let second =
        harness.orchestrator.run("show me the full table", "thread-follow", &history).await;

    assert_single_outcome(&second);
    assert_eq!(second.outcome(), RunOutcome::Answered);
    assert!(!second.metadata.used_fallback);

    let agent_requests = llm.agent_requests();
    let follow_up = agent_requests
        .iter()
        .map(|request| &request.messages[0].content)
        .find(|content| content.contains("show me the full table"))
        .expect("follow-up analysis request");
    assert!(follow_up.contains("market: CL"));
    assert!(follow_up.contains("date: 2025-08-01..2025-08-31"));

    let checkpoint = harness.checkpoints.get("thread-follow").await.expect("get").expect("saved");
    assert_eq!(checkpoint.executed_queries.len(), 2);
    assert_eq!(
        checkpoint.last_state.as_ref().map(|state| state.question().to_string()),
        Some("show me the full table".to_string())
    );
}

#[tokio::test]
async fn extraction_is_stable_for_the_same_inputs() {
    let extractor = ParameterExtractor::new(reference_date());
    let context = ExtractionContext {
        prior_invocations: Vec::new(),
        previous_question: Some("conversion rate in Chile for August".to_string()),
    };

    let first = extractor.extract("and on mobile?", &context);
    let second = extractor.extract("and on mobile?", &context);

    assert_eq!(first, second);
    assert_eq!(first.describe(), second.describe());
    assert!(first.describe().contains("market: CL"));
    assert!(first.describe().contains("device: mobile"));
}
