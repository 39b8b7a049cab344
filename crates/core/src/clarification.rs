//! Clarification policy.
//!
//! Decides whether a question is too underspecified to answer. The policy is
//! biased hard toward answering: every gap that has a sensible default becomes
//! an assumption instead of a question, and the user can switch clarification
//! off for the whole thread by saying so.
//!
//! Precedence, first match wins:
//! 1. An explicit rejection phrase in the question or any earlier user turn,
//!    or a generic "just give me the data" request in the question.
//! 2. Recent history shows repeated clarification requests, or the user asked
//!    to include everything.
//! 3. Gap analysis: only a completely unspecified subject with no earlier
//!    conversation to inherit from produces a question.

use serde::{Deserialize, Serialize};

use crate::domain::analysis::ParameterKind;
use crate::domain::conversation::{recent_window, ConversationTurn};
use crate::extraction::mentioned_kinds;
use crate::text::{contains_normalized_phrase, normalize};

pub const CLARIFICATION_HEADER: &str = "To answer accurately:";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhraseEffect {
    /// User refuses clarification; honored for the rest of the thread.
    RejectClarification,
    /// Broad request for data; answer with defaults.
    GenericRequest,
    /// User wants every value of a dimension instead of choosing one.
    IncludeEverything,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhraseRule {
    pub phrase: &'static str,
    pub effect: PhraseEffect,
}

const fn rule(phrase: &'static str, effect: PhraseEffect) -> PhraseRule {
    PhraseRule { phrase, effect }
}

use PhraseEffect::{GenericRequest, IncludeEverything, RejectClarification};

/// Phrases are stored normalized: lower-case and without accents.
pub const DIRECT_ANSWER_RULES: &[PhraseRule] = &[
    rule("no more questions", RejectClarification),
    rule("no more clarification", RejectClarification),
    rule("no more clarifications", RejectClarification),
    rule("no clarification", RejectClarification),
    rule("no clarifications", RejectClarification),
    rule("without clarification", RejectClarification),
    rule("stop asking", RejectClarification),
    rule("don't ask", RejectClarification),
    rule("dont ask", RejectClarification),
    rule("do not ask", RejectClarification),
    rule("just answer", RejectClarification),
    rule("answer directly", RejectClarification),
    rule("direct answer", RejectClarification),
    rule("no quiero mas clarificaciones", RejectClarification),
    rule("no quiero mas preguntas", RejectClarification),
    rule("no quiero clarificacion", RejectClarification),
    rule("no quiero clarificaciones", RejectClarification),
    rule("dame una respuesta directa", RejectClarification),
    rule("ya lo dije", RejectClarification),
    rule("por favor responde", RejectClarification),
    rule("no i want", RejectClarification),
    rule("sin clarificaciones", RejectClarification),
    rule("sin preguntas", RejectClarification),
    rule("no mas preguntas", RejectClarification),
    rule("no mas clarificaciones", RejectClarification),
    rule("respuesta directa", RejectClarification),
    rule("responde directamente", RejectClarification),
    rule("ya te explique", RejectClarification),
    rule("no preguntes", RejectClarification),
    rule("general", GenericRequest),
    rule("overall", GenericRequest),
    rule("overview", GenericRequest),
    rule("data", GenericRequest),
    rule("metrics", GenericRequest),
    rule("results", GenericRequest),
    rule("datos", GenericRequest),
    rule("metricas", GenericRequest),
    rule("resultados", GenericRequest),
    rule("informacion", GenericRequest),
    rule("all", IncludeEverything),
    rule("both", IncludeEverything),
    rule("everything", IncludeEverything),
    rule("todo", IncludeEverything),
    rule("todos", IncludeEverything),
    rule("ambos", IncludeEverything),
];

/// Phrases of an assistant turn that asked for clarification, stored normalized.
const CLARIFICATION_MARKERS: &[&str] = &[
    "to answer accurately",
    "need a clarification",
    "need clarification",
    "could you clarify",
    "can you clarify",
    "please clarify",
    "necesito una clarificacion",
    "puedes aclarar",
    "podrias aclarar",
];

/// Broad subject words that are not metrics but still say what to look at.
const SUBJECT_WORDS: &[&str] =
    &["performance", "rendimiento", "funnel", "embudo", "kpi", "kpis", "desempeno", "ventas"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum OverrideReason {
    EmptyQuestion,
    ExplicitRejection { phrase: String },
    GenericRequest { phrase: String },
    RepeatedClarification { requests: usize },
    IncludeEverything { phrase: String },
}

impl OverrideReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::EmptyQuestion => "empty_question",
            Self::ExplicitRejection { .. } => "explicit_rejection",
            Self::GenericRequest { .. } => "generic_request",
            Self::RepeatedClarification { .. } => "repeated_clarification",
            Self::IncludeEverything { .. } => "include_everything",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assumption {
    pub kind: ParameterKind,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationDecision {
    pub needs_clarification: bool,
    pub questions: Vec<String>,
    /// Defaults applied instead of asking.
    pub assumptions: Vec<Assumption>,
    pub override_reason: Option<OverrideReason>,
}

impl ClarificationDecision {
    fn answer_directly(reason: OverrideReason) -> Self {
        Self {
            needs_clarification: false,
            questions: Vec::new(),
            assumptions: Vec::new(),
            override_reason: Some(reason),
        }
    }
}

/// Gap handling per parameter kind: either a default to assume or, for the
/// subject only, a question to ask.
fn gap_resolution(kind: ParameterKind) -> GapResolution {
    match kind {
        ParameterKind::Date => GapResolution::Assume(
            "No period given: use the most recent complete month with data.",
        ),
        ParameterKind::Market => {
            GapResolution::Assume("No market given: cover all markets combined and by market.")
        }
        ParameterKind::Device => {
            GapResolution::Assume("No device given: combine desktop and mobile.")
        }
        ParameterKind::TrafficSource => {
            GapResolution::Assume("No traffic source given: combine all traffic types.")
        }
        ParameterKind::Metric => GapResolution::Ask(
            "Which metric should I analyze: conversion rate, traffic, flight page loads, or payment confirmations?",
        ),
    }
}

enum GapResolution {
    Assume(&'static str),
    Ask(&'static str),
}

#[derive(Clone, Debug)]
pub struct ClarificationPolicy {
    max_questions: usize,
    history_window: usize,
}

impl Default for ClarificationPolicy {
    fn default() -> Self {
        Self { max_questions: 3, history_window: 3 }
    }
}

impl ClarificationPolicy {
    pub fn new(max_questions: usize) -> Self {
        Self { max_questions, ..Self::default() }
    }

    pub fn decide(&self, question: &str, history: &[ConversationTurn]) -> ClarificationDecision {
        let normalized = normalize(question);
        if normalized.is_empty() {
            return ClarificationDecision::answer_directly(OverrideReason::EmptyQuestion);
        }

        if let Some(reason) = self.direct_answer_override(&normalized, history) {
            return ClarificationDecision::answer_directly(reason);
        }

        self.analyze_gaps(question, &normalized, history)
    }

    fn direct_answer_override(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Option<OverrideReason> {
        if let Some(phrase) = first_match(question, RejectClarification) {
            return Some(OverrideReason::ExplicitRejection { phrase });
        }
        for turn in history.iter().filter(|turn| turn.is_user()) {
            if let Some(phrase) = first_match(&normalize(&turn.content), RejectClarification) {
                return Some(OverrideReason::ExplicitRejection { phrase });
            }
        }
        if let Some(phrase) = first_match(question, GenericRequest) {
            return Some(OverrideReason::GenericRequest { phrase });
        }

        let recent = recent_window(history, self.history_window);
        let requests = recent
            .iter()
            .filter(|turn| turn.is_assistant())
            .filter(|turn| {
                let content = normalize(&turn.content);
                CLARIFICATION_MARKERS
                    .iter()
                    .any(|marker| contains_normalized_phrase(&content, marker))
            })
            .count();
        if requests >= 2 {
            return Some(OverrideReason::RepeatedClarification { requests });
        }

        let everything = std::iter::once(question.to_owned())
            .chain(recent.iter().filter(|turn| turn.is_user()).map(|turn| normalize(&turn.content)))
            .find_map(|text| first_match(&text, IncludeEverything));
        everything.map(|phrase| OverrideReason::IncludeEverything { phrase })
    }

    fn analyze_gaps(
        &self,
        question: &str,
        normalized: &str,
        history: &[ConversationTurn],
    ) -> ClarificationDecision {
        let mut mentioned = mentioned_kinds(question);
        if SUBJECT_WORDS.iter().any(|word| contains_normalized_phrase(normalized, word)) {
            mentioned.insert(ParameterKind::Metric);
        }

        // Any concrete anchor, or an earlier turn to inherit the subject from,
        // gives the subject a safe default too.
        let anchored = mentioned.iter().any(|kind| *kind != ParameterKind::Metric);
        let subject_has_default = anchored || !history.is_empty();

        let mut questions = Vec::new();
        let mut assumptions = Vec::new();
        for kind in ParameterKind::ALL {
            if mentioned.contains(&kind) {
                continue;
            }
            match gap_resolution(kind) {
                GapResolution::Assume(text) => {
                    assumptions.push(Assumption { kind, text: text.to_owned() })
                }
                GapResolution::Ask(_) if subject_has_default => assumptions.push(Assumption {
                    kind,
                    text: "No metric given: report traffic and conversion rate.".to_owned(),
                }),
                GapResolution::Ask(text) => questions.push(text.to_owned()),
            }
        }
        questions.truncate(self.max_questions);

        ClarificationDecision {
            needs_clarification: !questions.is_empty(),
            questions,
            assumptions,
            override_reason: None,
        }
    }
}

fn first_match(normalized: &str, effect: PhraseEffect) -> Option<String> {
    DIRECT_ANSWER_RULES
        .iter()
        .filter(|rule| rule.effect == effect)
        .find(|rule| contains_normalized_phrase(normalized, rule.phrase))
        .map(|rule| rule.phrase.to_owned())
}

/// `To answer accurately:\n1. ...\n2. ...`
pub fn format_clarification(questions: &[String]) -> String {
    let mut out = String::from(CLARIFICATION_HEADER);
    for (index, question) in questions.iter().enumerate() {
        out.push_str(&format!("\n{}. {question}", index + 1));
    }
    out
}
