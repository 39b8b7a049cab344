//! Parameter extraction for follow-up questions.
//!
//! A follow-up such as "show me the full table" carries no filters of its own.
//! The extractor recovers them from the SQL the data agent already ran on this
//! thread and from the free text of the current and previous questions, so the
//! next query can stay on the same market and period.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::analysis::{DateRange, ExtractedParameters, ParameterKind, ToolInvocation};
use crate::text::{contains_normalized_phrase, normalize, tokens};

/// Everything the extractor may look at besides the current question.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionContext {
    /// Tool calls from earlier runs on the thread, oldest first.
    pub prior_invocations: Vec<ToolInvocation>,
    pub previous_question: Option<String>,
}

/// Canonical entity plus the phrases (already normalized) that denote it.
struct EntityRule {
    value: &'static str,
    phrases: &'static [&'static str],
}

const MARKET_RULES: &[EntityRule] = &[
    EntityRule { value: "CL", phrases: &["chile", "chilean", "chileno", "chilena"] },
    EntityRule { value: "BR", phrases: &["brazil", "brasil", "brazilian", "brasileno"] },
    EntityRule { value: "PE", phrases: &["peru", "peruvian", "peruano"] },
    EntityRule { value: "PY", phrases: &["paraguay", "paraguayan", "paraguayo"] },
    EntityRule {
        value: "US",
        phrases: &["united states", "estados unidos", "usa", "eeuu", "american market"],
    },
    EntityRule { value: "CO", phrases: &["colombia", "colombian", "colombiano"] },
    EntityRule { value: "AR", phrases: &["argentina", "argentinian", "argentino"] },
    EntityRule { value: "EC", phrases: &["ecuador", "ecuadorian", "ecuatoriano"] },
    EntityRule { value: "UY", phrases: &["uruguay", "uruguayan", "uruguayo"] },
];

const DEVICE_RULES: &[EntityRule] = &[
    EntityRule { value: "mobile", phrases: &["mobile", "movil", "celular", "smartphone"] },
    EntityRule { value: "desktop", phrases: &["desktop", "escritorio", "computador"] },
];

const TRAFFIC_RULES: &[EntityRule] = &[
    EntityRule { value: "Organico", phrases: &["organic", "organico", "seo"] },
    EntityRule { value: "Pagado", phrases: &["paid", "pagado", "paid traffic", "ppc"] },
    EntityRule { value: "Promoted", phrases: &["promoted", "promocionado"] },
];

const METRIC_RULES: &[EntityRule] = &[
    EntityRule {
        value: "conversion_rate",
        phrases: &["conversion", "conversions", "conversion rate", "tasa de conversion", "cvr"],
    },
    EntityRule { value: "traffic", phrases: &["traffic", "trafico", "visits", "visitas", "sessions"] },
    EntityRule {
        value: "flight_page_loads",
        phrases: &["flight page", "flight pages", "pagina de vuelos", "paginas de vuelo"],
    },
    EntityRule {
        value: "payment_confirmations",
        phrases: &["payment", "payments", "confirmations", "confirmaciones", "bookings", "reservas"],
    },
    EntityRule { value: "median_time", phrases: &["median time", "tiempo medio", "time to book"] },
];

/// Metric columns of the funnel table and the metric they measure.
const METRIC_COLUMNS: &[(&str, &str)] = &[
    ("traffic", "traffic"),
    ("flight_dom_loaded_flight", "flight_page_loads"),
    ("payment_confirmation_loaded", "payment_confirmations"),
    ("median_time_seconds", "median_time"),
    ("median_time_minutes", "median_time"),
];

const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("enero", 1),
    ("february", 2),
    ("febrero", 2),
    ("march", 3),
    ("marzo", 3),
    ("april", 4),
    ("abril", 4),
    ("may", 5),
    ("mayo", 5),
    ("june", 6),
    ("junio", 6),
    ("july", 7),
    ("julio", 7),
    ("august", 8),
    ("agosto", 8),
    ("september", 9),
    ("septiembre", 9),
    ("setiembre", 9),
    ("october", 10),
    ("octubre", 10),
    ("november", 11),
    ("noviembre", 11),
    ("december", 12),
    ("diciembre", 12),
];

/// Words that place a question in time without naming a month.
const PERIOD_WORDS: &[&str] = &[
    "today", "yesterday", "week", "weekly", "month", "monthly", "year", "quarter", "days",
    "hoy", "ayer", "semana", "semanal", "mes", "mensual", "ano", "trimestre", "dias",
];

/// Words that make the English "may" a month rather than a modal verb.
const MAY_PREFIXES: &[&str] = &["in", "for", "during", "since", "of", "last", "until"];

const COMPARISON_PATTERN: &str =
    r"(?i)(?:\b[a-z_][a-z0-9_]*\.)?\b(date|culture|device|traffic_type)\s*(>=|<=|=|>|<)\s*'([^']*)'";
const IN_LIST_PATTERN: &str =
    r"(?i)(?:\b[a-z_][a-z0-9_]*\.)?\b(culture|device|traffic_type)\s+in\s*\(([^)]*)\)";
const BETWEEN_PATTERN: &str =
    r"(?i)(?:\b[a-z_][a-z0-9_]*\.)?\bdate\s+between\s+'([^']+)'\s+and\s+'([^']+)'";
const QUOTED_PATTERN: &str = r"'([^']*)'";
const ISO_DATE_PATTERN: &str = r"\b(\d{4}-\d{2}-\d{2})\b";
const LAST_DAYS_PATTERN: &str = r"\b(?:last|past|ultimos|ultimas)\s+(\d{1,3})\s+(?:days|dias)\b";

fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn comparison_regex() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&CELL, COMPARISON_PATTERN)
}

fn in_list_regex() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&CELL, IN_LIST_PATTERN)
}

fn between_regex() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&CELL, BETWEEN_PATTERN)
}

fn quoted_regex() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&CELL, QUOTED_PATTERN)
}

fn iso_date_regex() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&CELL, ISO_DATE_PATTERN)
}

fn last_days_regex() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&CELL, LAST_DAYS_PATTERN)
}

/// Pure extractor. The reference date anchors relative expressions such as
/// "last month"; for a fixed reference date the output depends only on input.
#[derive(Clone, Debug)]
pub struct ParameterExtractor {
    reference_date: NaiveDate,
}

impl ParameterExtractor {
    pub fn new(reference_date: NaiveDate) -> Self {
        Self { reference_date }
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    /// Values mentioned in the current question win per kind; kinds it leaves
    /// open are filled from the newest prior query, then the previous question.
    pub fn extract(&self, question: &str, context: &ExtractionContext) -> ExtractedParameters {
        let mut extracted = self.scan_text(question);

        let mut carried = ExtractedParameters::default();
        for sql in context
            .prior_invocations
            .iter()
            .rev()
            .filter(|invocation| invocation.is_success())
            .filter_map(ToolInvocation::query_text)
        {
            carried.fill_missing_from(&self.scan_sql(sql));
        }
        if let Some(previous) = context.previous_question.as_deref() {
            carried.fill_missing_from(&self.scan_text(previous));
        }

        extracted.fill_missing_from(&carried);
        extracted
    }

    /// Reads filter clauses on the funnel dimensions out of one SQL statement.
    pub fn scan_sql(&self, sql: &str) -> ExtractedParameters {
        let mut params = ExtractedParameters::default();
        let mut lower: Option<NaiveDate> = None;
        let mut upper: Option<NaiveDate> = None;

        if let Some(regex) = between_regex() {
            for caps in regex.captures_iter(sql) {
                let start = caps.get(1).and_then(|m| parse_sql_date(m.as_str()));
                let end = caps.get(2).and_then(|m| parse_sql_date(m.as_str()));
                if let (Some(start), Some(end)) = (start, end) {
                    if let Some(range) = DateRange::new(start.min(end), start.max(end)) {
                        params.insert_date_range(range);
                    }
                }
            }
        }

        if let Some(regex) = comparison_regex() {
            for caps in regex.captures_iter(sql) {
                let (Some(field), Some(op), Some(value)) = (caps.get(1), caps.get(2), caps.get(3))
                else {
                    continue;
                };
                let field = field.as_str().to_ascii_lowercase();
                let value = value.as_str();
                if field == "date" {
                    let Some(day) = parse_sql_date(value) else { continue };
                    match op.as_str() {
                        "=" => params.insert_date_range(DateRange::single(day)),
                        ">=" => lower = Some(lower.map_or(day, |current| current.max(day))),
                        ">" => {
                            let day = day + Duration::days(1);
                            lower = Some(lower.map_or(day, |current| current.max(day)));
                        }
                        "<=" => upper = Some(upper.map_or(day, |current| current.min(day))),
                        "<" => {
                            let day = day - Duration::days(1);
                            upper = Some(upper.map_or(day, |current| current.min(day)));
                        }
                        _ => {}
                    }
                } else if op.as_str() == "=" {
                    insert_dimension(&mut params, &field, value);
                }
            }
        }

        if let Some(regex) = in_list_regex() {
            for caps in regex.captures_iter(sql) {
                let (Some(field), Some(list)) = (caps.get(1), caps.get(2)) else { continue };
                let field = field.as_str().to_ascii_lowercase();
                if let Some(quoted) = quoted_regex() {
                    for value in quoted.captures_iter(list.as_str()).filter_map(|c| c.get(1)) {
                        insert_dimension(&mut params, &field, value.as_str());
                    }
                }
            }
        }

        match (lower, upper) {
            (Some(start), Some(end)) => {
                if let Some(range) = DateRange::new(start, end) {
                    params.insert_date_range(range);
                }
            }
            (Some(start), None) => {
                if let Some(range) = DateRange::new(start, start.max(self.reference_date)) {
                    params.insert_date_range(range);
                }
            }
            _ => {}
        }

        let normalized_sql = sql.to_ascii_lowercase();
        let sql_words = tokens_of_identifiers(&normalized_sql);
        for (column, metric) in METRIC_COLUMNS {
            if sql_words.iter().any(|word| word == column) {
                params.insert(ParameterKind::Metric, *metric);
            }
        }
        if sql_words.iter().any(|word| word.contains("conversion")) {
            params.insert(ParameterKind::Metric, "conversion_rate");
        }

        params
    }

    /// Entities named in free text: countries, devices, traffic sources,
    /// metrics, month names, ISO dates and a few relative periods.
    pub fn scan_text(&self, text: &str) -> ExtractedParameters {
        let mut params = ExtractedParameters::default();
        let normalized = normalize(text);
        if normalized.is_empty() {
            return params;
        }

        for (kind, rules) in [
            (ParameterKind::Market, MARKET_RULES),
            (ParameterKind::Device, DEVICE_RULES),
            (ParameterKind::TrafficSource, TRAFFIC_RULES),
            (ParameterKind::Metric, METRIC_RULES),
        ] {
            for rule in rules {
                if rule.phrases.iter().any(|phrase| contains_normalized_phrase(&normalized, phrase))
                {
                    params.insert(kind, rule.value);
                }
            }
        }

        for range in self.month_ranges(&normalized) {
            params.insert_date_range(range);
        }
        for range in self.relative_ranges(&normalized) {
            params.insert_date_range(range);
        }

        let iso_dates: Vec<NaiveDate> = iso_date_regex()
            .map(|regex| {
                regex
                    .captures_iter(text)
                    .filter_map(|caps| caps.get(1))
                    .filter_map(|m| parse_sql_date(m.as_str()))
                    .collect()
            })
            .unwrap_or_default();
        match iso_dates.as_slice() {
            [] => {}
            [single] => params.insert_date_range(DateRange::single(*single)),
            [first, second, ..] => {
                if let Some(range) = DateRange::new(*first.min(second), *first.max(second)) {
                    params.insert_date_range(range);
                }
            }
        }

        params
    }

    fn month_ranges(&self, normalized: &str) -> Vec<DateRange> {
        let words = tokens(normalized);
        let explicit_year = words.iter().find_map(|word| parse_year(word));
        let mut ranges = Vec::new();

        for (index, word) in words.iter().enumerate() {
            let Some(month) = MONTHS.iter().find(|(name, _)| name == word).map(|(_, m)| *m) else {
                continue;
            };
            let next = words.get(index + 1).copied();
            let after_de = if next == Some("de") { words.get(index + 2).copied() } else { None };
            let adjacent_year = next.and_then(parse_year).or_else(|| after_de.and_then(parse_year));

            if *word == "may" {
                let previous = index.checked_sub(1).and_then(|i| words.get(i)).copied();
                let month_like = adjacent_year.is_some()
                    || previous.is_some_and(|prev| MAY_PREFIXES.contains(&prev));
                if !month_like {
                    continue;
                }
            }

            let year = adjacent_year.or(explicit_year).unwrap_or_else(|| {
                if month <= self.reference_date.month() {
                    self.reference_date.year()
                } else {
                    self.reference_date.year() - 1
                }
            });
            if let Some(range) = month_range(year, month) {
                ranges.push(range);
            }
        }

        ranges
    }

    fn relative_ranges(&self, normalized: &str) -> Vec<DateRange> {
        let today = self.reference_date;
        let mut ranges = Vec::new();

        let last_month = ["last month", "previous month", "mes pasado", "ultimo mes", "mes anterior"];
        if last_month.iter().any(|phrase| contains_normalized_phrase(normalized, phrase)) {
            if let Some(range) = previous_month(today) {
                ranges.push(range);
            }
        }

        let this_month = ["this month", "current month", "este mes", "mes actual"];
        if this_month.iter().any(|phrase| contains_normalized_phrase(normalized, phrase)) {
            if let Some(start) = NaiveDate::from_ymd_opt(today.year(), today.month(), 1) {
                ranges.push(DateRange { start, end: today });
            }
        }

        if ["yesterday", "ayer"].iter().any(|phrase| contains_normalized_phrase(normalized, phrase))
        {
            ranges.push(DateRange::single(today - Duration::days(1)));
        }

        if let Some(regex) = last_days_regex() {
            for caps in regex.captures_iter(normalized) {
                let Some(days) = caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok()) else {
                    continue;
                };
                if days > 0 {
                    ranges.push(DateRange { start: today - Duration::days(days - 1), end: today });
                }
            }
        }

        ranges
    }
}

/// Parameter kinds a text mentions at all, without resolving values. Cheap
/// enough for routing decisions that only care about presence.
pub fn mentioned_kinds(text: &str) -> BTreeSet<ParameterKind> {
    let normalized = normalize(text);
    let mut kinds = BTreeSet::new();
    if normalized.is_empty() {
        return kinds;
    }

    for (kind, rules) in [
        (ParameterKind::Market, MARKET_RULES),
        (ParameterKind::Device, DEVICE_RULES),
        (ParameterKind::TrafficSource, TRAFFIC_RULES),
        (ParameterKind::Metric, METRIC_RULES),
    ] {
        let mentioned = rules.iter().any(|rule| {
            rule.phrases.iter().any(|phrase| contains_normalized_phrase(&normalized, phrase))
        });
        if mentioned {
            kinds.insert(kind);
        }
    }

    let words = tokens(&normalized);
    let names_month =
        words.iter().any(|word| *word != "may" && MONTHS.iter().any(|(name, _)| name == word));
    let names_period =
        words.iter().any(|word| PERIOD_WORDS.contains(word) || parse_year(word).is_some());
    let has_iso_date = iso_date_regex().is_some_and(|regex| regex.is_match(text));
    if names_month || names_period || has_iso_date {
        kinds.insert(ParameterKind::Date);
    }

    kinds
}

fn insert_dimension(params: &mut ExtractedParameters, field: &str, raw: &str) {
    let value = raw.trim();
    if value.is_empty() {
        return;
    }
    match field {
        "culture" => params.insert(ParameterKind::Market, value.to_ascii_uppercase()),
        "device" => params.insert(ParameterKind::Device, value.to_ascii_lowercase()),
        "traffic_type" => params.insert(ParameterKind::TrafficSource, canonical_traffic(value)),
        _ => {}
    }
}

fn canonical_traffic(value: &str) -> String {
    match normalize(value).as_str() {
        "organico" | "organic" => "Organico".to_owned(),
        "pagado" | "paid" => "Pagado".to_owned(),
        "promoted" | "promocionado" => "Promoted".to_owned(),
        _ => value.to_owned(),
    }
}

fn tokens_of_identifiers(sql: &str) -> Vec<String> {
    sql.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Accepts `2025-08-01` and timestamps that start with a date.
fn parse_sql_date(value: &str) -> Option<NaiveDate> {
    let head = value.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn parse_year(word: &str) -> Option<i32> {
    if word.len() != 4 || !word.starts_with("20") {
        return None;
    }
    word.parse().ok()
}

fn month_range(year: i32, month: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    DateRange::new(start, next - Duration::days(1))
}

/// The most recent complete calendar month before `today`.
pub fn previous_month(today: NaiveDate) -> Option<DateRange> {
    let (year, month) =
        if today.month() == 1 { (today.year() - 1, 12) } else { (today.year(), today.month() - 1) };
    month_range(year, month)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{
        comparison_regex, mentioned_kinds, previous_month, ExtractionContext, ParameterExtractor,
        BETWEEN_PATTERN, COMPARISON_PATTERN, IN_LIST_PATTERN, ISO_DATE_PATTERN, LAST_DAYS_PATTERN,
        QUOTED_PATTERN,
    };
    use crate::domain::analysis::{ParameterKind, ToolInvocation};

    fn extractor() -> ParameterExtractor {
        ParameterExtractor::new(NaiveDate::from_ymd_opt(2025, 9, 15).expect("valid date"))
    }

    fn executed(sql: &str) -> ToolInvocation {
        ToolInvocation::succeeded("sql_query", json!({ "query": sql }), json!({"rows_returned": 12}))
    }

    #[test]
    fn every_pattern_compiles() {
        for pattern in [
            COMPARISON_PATTERN,
            IN_LIST_PATTERN,
            BETWEEN_PATTERN,
            QUOTED_PATTERN,
            ISO_DATE_PATTERN,
            LAST_DAYS_PATTERN,
        ] {
            assert!(regex::Regex::new(pattern).is_ok(), "pattern should compile: {pattern}");
        }
        assert!(comparison_regex().is_some());
    }

    #[test]
    fn follow_up_inherits_market_and_period_from_prior_query() {
        let context = ExtractionContext {
            prior_invocations: vec![executed(
                "SELECT date, SUM(traffic) AS traffic FROM funnels_resumido \
                 WHERE culture = 'CL' AND date >= '2025-08-01' AND date <= '2025-08-31' \
                 GROUP BY date",
            )],
            previous_question: None,
        };

        let params = extractor().extract("show me the full table", &context);

        assert_eq!(
            params.get(ParameterKind::Market).map(|set| set.iter().cloned().collect::<Vec<_>>()),
            Some(vec!["CL".to_owned()])
        );
        assert!(params.contains(ParameterKind::Date, "2025-08-01..2025-08-31"));
        assert_eq!(params.get(ParameterKind::Date).map(|set| set.len()), Some(1));
    }

    #[test]
    fn extraction_is_idempotent() {
        let context = ExtractionContext {
            prior_invocations: vec![executed(
                "SELECT * FROM funnels_resumido WHERE device IN ('mobile', 'desktop') \
                 AND date BETWEEN '2025-07-01' AND '2025-07-31'",
            )],
            previous_question: Some("traffic in Brazil during July".to_owned()),
        };
        let extractor = extractor();

        let first = extractor.extract("and the conversion rate?", &context);
        let second = extractor.extract("and the conversion rate?", &context);

        assert_eq!(first, second);
        assert!(first.contains(ParameterKind::Device, "mobile"));
        assert!(first.contains(ParameterKind::Device, "desktop"));
        assert!(first.contains(ParameterKind::Market, "BR"));
        assert!(first.contains(ParameterKind::Metric, "conversion_rate"));
        assert!(first.contains(ParameterKind::Date, "2025-07-01..2025-07-31"));
    }

    #[test]
    fn current_question_overrides_carried_values_per_kind() {
        let context = ExtractionContext {
            prior_invocations: vec![executed(
                "SELECT * FROM funnels_resumido f WHERE f.culture = 'CL' AND f.date = '2025-08-04'",
            )],
            previous_question: None,
        };

        let params = extractor().extract("same for Peru", &context);

        assert!(params.contains(ParameterKind::Market, "PE"));
        assert!(!params.contains(ParameterKind::Market, "CL"));
        assert!(params.contains(ParameterKind::Date, "2025-08-04"));
    }

    #[test]
    fn failed_queries_are_not_carried_forward() {
        let context = ExtractionContext {
            prior_invocations: vec![ToolInvocation::failed(
                "sql_query",
                json!({"query": "SELECT * FROM funnels_resumido WHERE culture = 'AR'"}),
                "no such column",
            )],
            previous_question: None,
        };

        assert!(extractor().extract("show me more", &context).is_empty());
    }

    #[test]
    fn strict_bounds_and_traffic_types_are_normalized() {
        let params = extractor().scan_sql(
            "select * from funnels_resumido where date > '2025-06-30' and date < '2025-08-01' \
             and traffic_type = 'organico' and culture in ('br','cl')",
        );

        assert!(params.contains(ParameterKind::Date, "2025-07-01..2025-07-31"));
        assert!(params.contains(ParameterKind::TrafficSource, "Organico"));
        assert!(params.contains(ParameterKind::Market, "BR"));
        assert!(params.contains(ParameterKind::Market, "CL"));
    }

    #[test]
    fn open_lower_bound_runs_to_reference_date() {
        let params = extractor().scan_sql(
            "SELECT SUM(payment_confirmation_loaded) FROM funnels_resumido WHERE date >= '2025-09-01'",
        );
        assert!(params.contains(ParameterKind::Date, "2025-09-01..2025-09-15"));
        assert!(params.contains(ParameterKind::Metric, "payment_confirmations"));
    }

    #[test]
    fn month_names_resolve_to_inclusive_ranges() {
        let extractor = extractor();

        let spanish = extractor.scan_text("conversión de Chile en agosto");
        assert!(spanish.contains(ParameterKind::Date, "2025-08-01..2025-08-31"));
        assert!(spanish.contains(ParameterKind::Market, "CL"));

        let future_month = extractor.scan_text("traffic in November");
        assert!(future_month.contains(ParameterKind::Date, "2024-11-01..2024-11-30"));

        let explicit_year = extractor.scan_text("febrero de 2024 en Argentina");
        assert!(explicit_year.contains(ParameterKind::Date, "2024-02-01..2024-02-29"));
    }

    #[test]
    fn modal_may_is_not_a_month() {
        let extractor = extractor();
        assert!(!extractor.scan_text("may I see traffic by device").has(ParameterKind::Date));
        assert!(extractor
            .scan_text("traffic in may")
            .contains(ParameterKind::Date, "2025-05-01..2025-05-31"));
    }

    #[test]
    fn relative_periods_use_reference_date() {
        let extractor = extractor();
        assert!(extractor
            .scan_text("mobile conversion last month")
            .contains(ParameterKind::Date, "2025-08-01..2025-08-31"));
        assert!(extractor
            .scan_text("tráfico pagado últimos 7 días")
            .contains(ParameterKind::Date, "2025-09-09..2025-09-15"));
        assert!(extractor
            .scan_text("traffic between 2025-08-10 and 2025-08-03")
            .contains(ParameterKind::Date, "2025-08-03..2025-08-10"));

        let january = NaiveDate::from_ymd_opt(2025, 1, 10).expect("valid date");
        assert_eq!(
            previous_month(january).map(|range| range.to_string()),
            Some("2024-12-01..2024-12-31".to_owned())
        );
    }

    #[test]
    fn mentioned_kinds_reports_presence_only() {
        let kinds = mentioned_kinds("conversion rate Chile this week");
        assert!(kinds.contains(&ParameterKind::Metric));
        assert!(kinds.contains(&ParameterKind::Market));
        assert!(kinds.contains(&ParameterKind::Date));
        assert!(!kinds.contains(&ParameterKind::Device));
        assert!(mentioned_kinds("how is it going?").is_empty());
    }

    #[test]
    fn unrelated_text_yields_nothing() {
        assert!(extractor().scan_text("hello there").is_empty());
        assert!(extractor().scan_text("").is_empty());
    }
}
