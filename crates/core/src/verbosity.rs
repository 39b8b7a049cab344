use crate::domain::analysis::Verbosity;
use crate::domain::conversation::{recent_window, ConversationTurn};
use crate::text::{contains_normalized_phrase, normalize};

/// Requests for depth. Stored normalized (lower-case, no accents).
pub const DETAIL_PHRASES: &[&str] = &[
    "more detail",
    "more details",
    "more information",
    "in detail",
    "detailed",
    "explain",
    "elaborate",
    "analyze",
    "analyse",
    "insights",
    "recommendation",
    "recommendations",
    "why",
    "mas detalles",
    "mas detalle",
    "mas informacion",
    "en detalle",
    "detallado",
    "explica",
    "explicame",
    "analiza",
    "recomendaciones",
    "recomendacion",
    "por que",
];

/// Concise unless the question or one of the last `window` user turns asks
/// for depth.
pub fn detect_verbosity(question: &str, history: &[ConversationTurn], window: usize) -> Verbosity {
    let mut texts = vec![normalize(question)];
    texts.extend(
        recent_window(history, window)
            .iter()
            .filter(|turn| turn.is_user())
            .map(|turn| normalize(&turn.content)),
    );

    let wants_detail = texts
        .iter()
        .any(|text| DETAIL_PHRASES.iter().any(|phrase| contains_normalized_phrase(text, phrase)));
    if wants_detail {
        Verbosity::Detailed
    } else {
        Verbosity::Concise
    }
}
