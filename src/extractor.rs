// slot extraction from free-form conversation

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::agent::{AgentError, AgentRunner, AgentTask};
use crate::models::{PartialTripParameters, TravelDate};

const EXTRACTION_CONTRACT: &str = "\
    Consolidate data and return a json with keys - destination, start_date, budget, no_of_days and other_details. \
    Every key must be present; use null for anything the conversation does not state. \
    Rest all summarized data - just key points with comma separated is set to other_details. \
    Don't need to provide suggestions or look for additional info.";

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Trip details response is not valid JSON: {0}")]
    Malformed(String),
    #[error("Trip details response must be a JSON object")]
    NotAnObject,
    #[error(transparent)]
    Agent(#[from] AgentError),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextOrList {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawSlots {
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    budget: Option<NumberOrText>,
    #[serde(default)]
    no_of_days: Option<NumberOrText>,
    #[serde(default)]
    other_details: Option<TextOrList>,
}

// drops a surrounding markdown code fence and its language tag
pub fn strip_code_fence(raw: &str) -> &str {
    let unfenced = raw.trim().trim_matches('`').trim();
    let tag_len = unfenced
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(unfenced.len());
    let rest = unfenced[tag_len..].trim_start();
    if tag_len > 0 && (rest.starts_with('{') || rest.starts_with('[')) {
        rest
    } else {
        unfenced
    }
}

pub fn parse_slots(raw: &str, today: NaiveDate) -> Result<PartialTripParameters, ExtractionError> {
    let body = strip_code_fence(raw);
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ExtractionError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(ExtractionError::NotAnObject);
    }

    let slots: RawSlots =
        serde_json::from_value(value).map_err(|e| ExtractionError::Malformed(e.to_string()))?;

    Ok(PartialTripParameters {
        destination: non_empty(slots.destination),
        start_date: slots
            .start_date
            .and_then(|text| TravelDate::parse(&text, today)),
        budget: slots.budget.and_then(to_budget),
        duration_days: slots.no_of_days.and_then(to_days),
        other_details: slots.other_details.and_then(|details| match details {
            TextOrList::Text(text) => non_empty(Some(text)),
            TextOrList::List(items) => non_empty(Some(items.join(", "))),
        }),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// the single number inside text such as "$1,500", "1.5k" or "2 weeks",
// with the word that follows it
fn number_with_unit(text: &str) -> Option<(f64, Option<String>)> {
    let pattern = r"(\d[\d,]*(?:\.\d+)?)\s*([A-Za-z]+)?";
    let regex = Regex::new(pattern).ok()?;
    let mut found = regex.captures_iter(text);
    let first = found.next()?;
    // ranges and compound values
    if found.next().is_some() {
        return None;
    }

    let number = first.get(1)?.as_str().replace(',', "").parse::<f64>().ok()?;
    let unit = first.get(2).map(|u| u.as_str().to_lowercase());
    Some((number, unit))
}

fn budget_scale(unit: &str) -> Option<f64> {
    match unit {
        "k" | "thousand" => Some(1_000.0),
        "usd" | "eur" | "gbp" | "inr" | "dollar" | "dollars" | "euro" | "euros" | "pound"
        | "pounds" | "rupee" | "rupees" | "bucks" | "total" => Some(1.0),
        _ => None,
    }
}

fn days_scale(unit: &str) -> Option<f64> {
    match unit {
        "day" | "days" | "night" | "nights" => Some(1.0),
        "week" | "weeks" => Some(7.0),
        _ => None,
    }
}

fn read_quantity(text: &str, field: &str, scale: fn(&str) -> Option<f64>) -> Option<f64> {
    if text.trim().is_empty() {
        return None;
    }

    let parsed = number_with_unit(text).and_then(|(number, unit)| match unit {
        None => Some(number),
        Some(unit) => scale(&unit).map(|factor| number * factor),
    });
    if parsed.is_none() {
        warn!("Could not read {} from {:?}, asking again", field, text);
    }
    parsed
}

fn positive(amount: f64) -> Option<f64> {
    Some(amount).filter(|n| n.is_finite() && *n > 0.0)
}

fn to_budget(value: NumberOrText) -> Option<f64> {
    match value {
        NumberOrText::Number(n) => positive(n),
        NumberOrText::Text(text) => read_quantity(&text, "budget", budget_scale).and_then(positive),
    }
}

fn to_days(value: NumberOrText) -> Option<u32> {
    let days = match value {
        NumberOrText::Number(n) => positive(n),
        NumberOrText::Text(text) => read_quantity(&text, "no_of_days", days_scale).and_then(positive),
    };
    days.map(f64::round)
        .filter(|days| *days >= 1.0 && *days <= u32::MAX as f64)
        .map(|days| days as u32)
}

// turns a running conversation into structured trip parameters
pub struct SlotExtractor<'a, A> {
    agent: &'a A,
    today: NaiveDate,
}

impl<'a, A: AgentRunner> SlotExtractor<'a, A> {
    pub fn new(agent: &'a A, today: NaiveDate) -> Self {
        Self { agent, today }
    }

    pub async fn extract(&self, conversation_text: &str) -> Result<PartialTripParameters, ExtractionError> {
        info!("Extracting trip details from {} chars of conversation", conversation_text.len());
        let task = AgentTask::new(conversation_text, EXTRACTION_CONTRACT);
        let reply = self.agent.run(&task).await?;
        debug!("Extractor reply: {}", reply);

        let slots = parse_slots(&reply, self.today)?;
        debug!(?slots, "Parsed trip details");
        Ok(slots)
    }
}
