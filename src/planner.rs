// itinerary generation and follow-up answers

use regex::Regex;
use tracing::{info, warn};

use crate::agent::{AgentError, AgentRunner, AgentTask};
use crate::models::{render_transcript, Message, SessionMode, TripParameters};
use crate::weather::WeatherBriefing;

pub const PLAN_CONTRACT: &str = "A detailed travel plan including weather-appropriate recommendations \
    based on the provided preferences, budget, and current/seasonal weather conditions.";

pub const PLANNING_FOLLOW_UP_CONTRACT: &str = "A well-structured travel itinerary.";

pub const NO_PLAN_FALLBACK: &str = "No trip plan generated. Please try again.";

pub const NO_REPLY_FALLBACK: &str = "No response generated. Please try again.";

// the request text that grounds a plan: trip parameters plus weather
pub fn plan_request(params: &TripParameters, briefing: &WeatherBriefing) -> String {
    let interests = if params.interests.is_empty() {
        "none specified".to_string()
    } else {
        params.interests.iter().cloned().collect::<Vec<_>>().join(", ")
    };

    let mut request = format!(
        "Plan a trip to {} for {} days starting {}.\nBudget: ${}\nInterests: {}\n",
        params.destination, params.duration_days, params.start_date, params.budget, interests
    );
    if !params.other_details.is_empty() {
        request.push_str(&format!("Other details: {}\n", params.other_details));
    }
    request.push_str(&format!("\nWeather Information:\n{}\n", briefing));
    request.push_str(
        "Please consider the current and seasonal weather conditions when planning activities. \
         Suggest indoor alternatives for bad weather and outdoor activities for good weather. \
         Make appropriate recommendations based on the temperature and conditions. \
         Where weather data is marked unavailable, do not assume any particular conditions.",
    );
    request
}

// why the latest message has to go to a human travel agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTrigger {
    TransitBooking,
    Customization,
}

// spot requests the assistant must hand over instead of answering itself
pub fn redirect_trigger(message: &str) -> Option<RedirectTrigger> {
    let booking = Regex::new(r"(?i)\b(book|booking|reserve|reservation|buy|purchase)\b").ok()?;
    let transit = Regex::new(r"(?i)\b(bus|buses|train|flight|flights|ticket|tickets|taxi|cab|ferry|transfer|seat|seats)\b").ok()?;
    let customization = Regex::new(r"(?i)\b(cheap|cheaper|cheapest|discount|discounts|customi[sz]e|customi[sz]ation|affordable|low[- ]cost)\b").ok()?;

    if booking.is_match(message) && transit.is_match(message) {
        Some(RedirectTrigger::TransitBooking)
    } else if customization.is_match(message) {
        Some(RedirectTrigger::Customization)
    } else {
        None
    }
}

fn mentions_bus(message: &str) -> bool {
    Regex::new(r"(?i)\bbus(es)?\b")
        .map(|re| re.is_match(message))
        .unwrap_or(false)
}

// expected-output contract for one turn
pub fn expected_output(
    mode: SessionMode,
    first_itinerary: bool,
    latest_message: &str,
    bus_tour_url: &str,
) -> String {
    match mode {
        SessionMode::PlanningSession if first_itinerary => PLAN_CONTRACT.to_string(),
        SessionMode::PlanningSession => PLANNING_FOLLOW_UP_CONTRACT.to_string(),
        SessionMode::FreeformChat => freeform_policy(first_itinerary, latest_message, bus_tour_url),
    }
}

fn freeform_policy(first_itinerary: bool, latest_message: &str, bus_tour_url: &str) -> String {
    let mut rules = Vec::new();

    if first_itinerary {
        rules.push("Provide a table-structured travel itinerary covering every day of the trip.".to_string());
    } else {
        rules.push(
            "An itinerary was already provided: make changes to it or give recommendations only. \
             If the latest question is not about the itinerary, answer only that question and \
             don't show the full itinerary unless it is explicitly requested."
                .to_string(),
        );
    }

    if mentions_bus(latest_message) {
        rules.push(format!(
            "The traveller asked about bus travel: you may recommend BigBusTours ({}).",
            bus_tour_url
        ));
    } else {
        rules.push("Don't recommend any bus tour operator.".to_string());
    }

    rules.push(
        "If the traveller asks to customize the plan, such as cheaper options, respond by offering \
         to connect them with a live travel agent."
            .to_string(),
    );
    rules.push(
        "If the traveller asks you to do something such as booking a bus, train or flight, or your \
         answer would amount to 'I am an AI', instead respond that you can redirect them to a live \
         travel agent or arrange a call back later."
            .to_string(),
    );
    rules.push("Never say that you are an AI.".to_string());

    match redirect_trigger(latest_message) {
        Some(RedirectTrigger::TransitBooking) => rules.push(
            "The latest message asks for a booking: do not attempt it, connect the traveller to a live travel agent."
                .to_string(),
        ),
        Some(RedirectTrigger::Customization) => rules.push(
            "The latest message asks to customize the plan: suggest a travel guide and offer to connect the traveller to a live travel agent."
                .to_string(),
        ),
        None => {}
    }

    rules.join("\n")
}

pub struct PlanGenerator<'a, A> {
    agent: &'a A,
}

impl<'a, A: AgentRunner> PlanGenerator<'a, A> {
    pub fn new(agent: &'a A) -> Self {
        Self { agent }
    }

    pub async fn generate(
        &self,
        request: &str,
        conversation: &[Message],
        expected_output: &str,
    ) -> Result<String, AgentError> {
        let description = if conversation.is_empty() {
            request.to_string()
        } else {
            format!("{}\n\nConversation so far:\n{}", request, render_transcript(conversation))
        };

        let plan = self.agent.run(&AgentTask::new(description, expected_output)).await?;
        if plan.trim().is_empty() {
            warn!("Agent returned an empty plan");
            return Ok(NO_PLAN_FALLBACK.to_string());
        }
        info!("Trip plan generated, {} chars", plan.len());
        Ok(plan)
    }
}

pub struct FollowUpResponder<'a, A> {
    agent: &'a A,
}

impl<'a, A: AgentRunner> FollowUpResponder<'a, A> {
    pub fn new(agent: &'a A) -> Self {
        Self { agent }
    }

    pub async fn respond(
        &self,
        initial_request: Option<&str>,
        conversation: &[Message],
        expected_output: &str,
    ) -> Result<String, AgentError> {
        let transcript = render_transcript(conversation);
        let description = match initial_request {
            Some(request) => format!("Initial Request:{}\n{}", request, transcript),
            None => transcript,
        };

        let reply = self.agent.run(&AgentTask::new(description, expected_output)).await?;
        if reply.trim().is_empty() {
            warn!("Agent returned an empty follow-up");
            return Ok(NO_REPLY_FALLBACK.to_string());
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::ScriptedAgent;
    use crate::models::TravelDate;
    use crate::weather::tests::{snapshot, FixedWeather};
    use crate::weather::{build_briefing, Season, WeatherMode};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    const BUS_URL: &str = "https://example.test/bus-tours";

    fn params() -> TripParameters {
        TripParameters {
            destination: "Athens".into(),
            start_date: TravelDate::Exact(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()),
            budget: 1200.0,
            duration_days: 5,
            interests: BTreeSet::from(["History".to_string(), "Food".to_string()]),
            other_details: String::new(),
        }
    }

    #[test]
    fn plan_request_lists_parameters_and_weather() {
        let mut provider = FixedWeather::all_clear();
        provider.seasons.insert(Season::Summer, snapshot(33.0, "Hot"));
        provider.seasons.remove(&Season::Winter);
        let briefing = tokio_test::block_on(build_briefing(&provider, "Athens", WeatherMode::Live));

        let request = plan_request(&params(), &briefing);

        assert!(request.starts_with("Plan a trip to Athens for 5 days starting 2025-07-01."));
        assert!(request.contains("Budget: $1200"));
        assert!(request.contains("Interests: Food, History"));
        assert!(request.contains("Summer: Temperature: 33°C, Condition: Hot"));
        assert!(request.contains("Winter: unavailable"));
        assert!(!request.contains("Other details"));
    }

    #[test]
    fn planning_session_always_expects_an_itinerary() {
        let policy = expected_output(SessionMode::PlanningSession, false, "what about museums?", BUS_URL);
        assert_eq!(policy, PLANNING_FOLLOW_UP_CONTRACT);
        let policy = expected_output(SessionMode::PlanningSession, true, "", BUS_URL);
        assert_eq!(policy, PLAN_CONTRACT);
    }

    #[test]
    fn freeform_first_turn_wants_a_table() {
        let policy = expected_output(SessionMode::FreeformChat, true, "3 days, $500, from Monday", BUS_URL);
        assert!(policy.contains("table-structured travel itinerary"));
        assert!(!policy.contains(BUS_URL));
    }

    #[test]
    fn bus_booking_request_is_redirected_to_a_human() {
        let latest = "Can you book a bus ticket to Delphi for Tuesday?";
        assert_eq!(redirect_trigger(latest), Some(RedirectTrigger::TransitBooking));

        let policy = expected_output(SessionMode::FreeformChat, false, latest, BUS_URL);
        assert!(policy.contains("connect the traveller to a live travel agent"));
        assert!(policy.contains("Never say that you are an AI."));
        assert!(policy.contains(BUS_URL));
        assert!(policy.contains("answer only that question"));
    }

    #[test]
    fn cheaper_options_count_as_customization() {
        assert_eq!(
            redirect_trigger("Any cheaper hotels?"),
            Some(RedirectTrigger::Customization)
        );
        assert_eq!(redirect_trigger("What should I eat in Plaka?"), None);
        assert_eq!(redirect_trigger("Is the bookshop open?"), None);
    }

    #[test]
    fn follow_up_prepends_initial_request() {
        let agent = ScriptedAgent::replying(&["Updated plan"]);
        let log = vec![Message::assistant("Day 1"), Message::user("Add a beach day")];

        let reply = tokio_test::block_on(
            FollowUpResponder::new(&agent).respond(Some("Plan a trip"), &log, PLANNING_FOLLOW_UP_CONTRACT),
        )
        .unwrap();

        assert_eq!(reply, "Updated plan");
        let task = agent.last_task();
        assert_eq!(task.description, "Initial Request:Plan a trip\nAssistant: Day 1\nUser: Add a beach day");
        assert_eq!(task.expected_output, PLANNING_FOLLOW_UP_CONTRACT);
    }

    #[test]
    fn empty_agent_output_falls_back() {
        let agent = ScriptedAgent::replying(&["   ", ""]);
        let plan = tokio_test::block_on(PlanGenerator::new(&agent).generate("Plan", &[], PLAN_CONTRACT)).unwrap();
        assert_eq!(plan, NO_PLAN_FALLBACK);

        let reply = tokio_test::block_on(FollowUpResponder::new(&agent).respond(None, &[], "x")).unwrap();
        assert_eq!(reply, NO_REPLY_FALLBACK);
    }
}
