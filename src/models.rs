// data models for trip planning sessions

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("User"),
            Role::Assistant => f.write_str("Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

// renders a log as `Role: text` lines, the shape the agent receives as context
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    PlanningSession,
    FreeformChat,
}

// a calendar date when one resolves, otherwise the traveller's wording ("this weekend")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelDate {
    Exact(NaiveDate),
    Described(String),
}

impl TravelDate {
    pub fn parse(text: &str, today: NaiveDate) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        for format in ["%Y-%m-%d", "%d-%b-%Y", "%d/%m/%Y", "%B %d, %Y"] {
            if let Ok(date) = NaiveDate::parse_from_str(text, format) {
                return Some(TravelDate::Exact(date));
            }
        }

        match extract_date_from_text(text, today) {
            Some(date) => Some(TravelDate::Exact(date)),
            None => Some(TravelDate::Described(text.to_string())),
        }
    }
}

impl fmt::Display for TravelDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TravelDate::Exact(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            TravelDate::Described(text) => f.write_str(text),
        }
    }
}

// the three fields a chat session must collect before planning,
// in the order the follow-up question asks for them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    StartDate,
    Budget,
    NoOfDays,
}

impl RequiredField {
    pub const ORDER: [RequiredField; 3] = [
        RequiredField::StartDate,
        RequiredField::Budget,
        RequiredField::NoOfDays,
    ];

    pub fn question(self) -> &'static str {
        match self {
            RequiredField::StartDate => "What is your Start Date?",
            RequiredField::Budget => "What is your Budget?",
            RequiredField::NoOfDays => "For how many days you plan this trip?",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartialTripParameters {
    pub destination: Option<String>,
    pub start_date: Option<TravelDate>,
    pub budget: Option<f64>,
    pub duration_days: Option<u32>,
    pub other_details: Option<String>,
}

impl PartialTripParameters {
    pub fn missing_fields(&self) -> Vec<RequiredField> {
        RequiredField::ORDER
            .into_iter()
            .filter(|field| match field {
                RequiredField::StartDate => self.start_date.is_none(),
                RequiredField::Budget => self.budget.is_none(),
                RequiredField::NoOfDays => self.duration_days.is_none(),
            })
            .collect()
    }

    // destination is not asked for, so a missing one falls back to the default
    pub fn into_complete(self, default_destination: &str) -> Option<TripParameters> {
        Some(TripParameters {
            destination: self
                .destination
                .unwrap_or_else(|| default_destination.to_string()),
            start_date: self.start_date?,
            budget: self.budget?,
            duration_days: self.duration_days?,
            interests: BTreeSet::new(),
            other_details: self.other_details.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripParameters {
    pub destination: String,
    pub start_date: TravelDate,
    pub budget: f64,
    pub duration_days: u32,
    pub interests: BTreeSet<String>,
    pub other_details: String,
}

// today's date from the local clock
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

// extract "June 14" / "14th June" style dates; an explicit year is kept,
// otherwise the date rolls to its next occurrence
fn extract_date_from_text(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    // try "June 12" / "June 12th, 2026" format
    let month_day_pattern = r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b(?:,?\s+(\d{4})\b)?";
    if let Ok(regex) = Regex::new(month_day_pattern) {
        if let Some(captures) = regex.captures(text) {
            let month = captures.get(1).and_then(|m| month_name_to_number(m.as_str()));
            let day = captures.get(2).and_then(|d| d.as_str().parse::<u32>().ok());
            let year = captures.get(3).and_then(|y| y.as_str().parse::<i32>().ok());
            if let Some(date) = month.zip(day).and_then(|(m, d)| resolve_date(today, year, m, d)) {
                return Some(date);
            }
        }
    }

    // try "12th June" / "12th of June 2026" format
    let day_month_pattern = r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(?:of\s+)?(January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)\b(?:,?\s+(\d{4})\b)?";
    if let Ok(regex) = Regex::new(day_month_pattern) {
        if let Some(captures) = regex.captures(text) {
            let day = captures.get(1).and_then(|d| d.as_str().parse::<u32>().ok());
            let month = captures.get(2).and_then(|m| month_name_to_number(m.as_str()));
            let year = captures.get(3).and_then(|y| y.as_str().parse::<i32>().ok());
            if let Some(date) = month.zip(day).and_then(|(m, d)| resolve_date(today, year, m, d)) {
                return Some(date);
            }
        }
    }

    None
}

fn resolve_date(today: NaiveDate, year: Option<i32>, month: u32, day: u32) -> Option<NaiveDate> {
    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => next_occurrence(today, month, day),
    }
}

fn next_occurrence(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    use chrono::Datelike;

    NaiveDate::from_ymd_opt(today.year(), month, day)
        .filter(|date| *date >= today)
        .or_else(|| NaiveDate::from_ymd_opt(today.year() + 1, month, day))
}

// convert month names to numbers
fn month_name_to_number(month: &str) -> Option<u32> {
    match month.to_lowercase().as_str() {
        "january" | "jan" => Some(1),
        "february" | "feb" => Some(2),
        "march" | "mar" => Some(3),
        "april" | "apr" => Some(4),
        "may" => Some(5),
        "june" | "jun" => Some(6),
        "july" | "jul" => Some(7),
        "august" | "aug" => Some(8),
        "september" | "sep" | "sept" => Some(9),
        "october" | "oct" => Some(10),
        "november" | "nov" => Some(11),
        "december" | "dec" => Some(12),
        _ => None,
    }
}
