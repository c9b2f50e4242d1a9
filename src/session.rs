// turn pipeline: form submissions and chat turns against one session

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::AgentRunner;
use crate::conversation::{ConversationState, SlotOutcome, Stage};
use crate::error::PlannerError;
use crate::extractor::SlotExtractor;
use crate::models::{self, Role, SessionMode, TravelDate, TripParameters};
use crate::planner::{expected_output, plan_request, FollowUpResponder, PlanGenerator};
use crate::weather::{build_briefing, MockScenario, WeatherBriefing, WeatherMode, WeatherProvider};

pub const DEFAULT_GREETING: &str = "Welcome to Athens, How can I help you?";
pub const DEFAULT_DESTINATION: &str = "Athens";
pub const DEFAULT_BUS_TOUR_URL: &str = "https://www.bigbustours.com/en/athens/athens-bus-tours";

const MAX_TRIP_DAYS: u32 = 30;

#[derive(Debug, Clone)]
pub struct PlannerSettings {
    // used when a chat never names a destination
    pub default_destination: String,
    pub greeting: Option<String>,
    pub bus_tour_url: String,
    // weather source for chat sessions and forms that don't pick one
    pub weather_mode: WeatherMode,
    // fixed "today" for resolving relative dates; `None` reads the clock
    pub today: Option<NaiveDate>,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            default_destination: DEFAULT_DESTINATION.to_string(),
            greeting: Some(DEFAULT_GREETING.to_string()),
            bus_tour_url: DEFAULT_BUS_TOUR_URL.to_string(),
            weather_mode: WeatherMode::Mock {
                scenario: MockScenario::SunnyDay,
            },
            today: None,
        }
    }
}

fn default_duration() -> u32 {
    7
}

fn default_budget() -> f64 {
    1000.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripForm {
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default = "default_duration")]
    pub duration_days: u32,
    #[serde(default = "default_budget")]
    pub budget: f64,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub weather_mode: Option<WeatherMode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    pub briefing: WeatherBriefing,
    pub plan: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    pub assistant_messages: Vec<String>,
    pub still_awaiting_parameters: bool,
}

pub struct TripPlanner<W, A> {
    weather: W,
    validator: A,
    planner: A,
    settings: PlannerSettings,
}

impl<W: WeatherProvider, A: AgentRunner> TripPlanner<W, A> {
    pub fn new(weather: W, validator: A, planner: A, settings: PlannerSettings) -> Self {
        Self {
            weather,
            validator,
            planner,
            settings,
        }
    }

    pub fn new_session(&self) -> ConversationState {
        ConversationState::new(self.settings.greeting.as_deref())
    }

    fn today(&self) -> NaiveDate {
        self.settings.today.unwrap_or_else(models::today)
    }

    pub async fn submit_form(
        &self,
        state: &mut ConversationState,
        form: TripForm,
    ) -> Result<PlanOutcome, PlannerError> {
        let destination = form.destination.trim();
        if destination.is_empty() {
            warn!("Form submitted without a destination");
            return Err(PlannerError::MissingDestination);
        }
        if !(1..=MAX_TRIP_DAYS).contains(&form.duration_days) {
            return Err(PlannerError::InvalidForm(format!(
                "duration must be between 1 and {} days",
                MAX_TRIP_DAYS
            )));
        }
        if !(form.budget.is_finite() && form.budget > 0.0) {
            return Err(PlannerError::InvalidForm("budget must be positive".to_string()));
        }

        let parameters = TripParameters {
            destination: destination.to_string(),
            start_date: TravelDate::Exact(form.start_date.unwrap_or_else(|| self.today())),
            budget: form.budget,
            duration_days: form.duration_days,
            interests: form
                .interests
                .iter()
                .map(|i| i.trim().to_string())
                .filter(|i| !i.is_empty())
                .collect(),
            other_details: String::new(),
        };
        let weather_mode = form.weather_mode.unwrap_or(self.settings.weather_mode);
        info!(
            "Planning {} days in {} from the trip form",
            parameters.duration_days, parameters.destination
        );

        let briefing = build_briefing(&self.weather, &parameters.destination, weather_mode).await;
        let request = plan_request(&parameters, &briefing);
        let contract = expected_output(SessionMode::PlanningSession, true, "", &self.settings.bus_tour_url);
        let plan = PlanGenerator::new(&self.planner)
            .generate(&request, &[], &contract)
            .await?;

        state.adopt_form_plan(parameters, briefing.clone(), request, &plan);
        Ok(PlanOutcome { briefing, plan })
    }

    // chat path: slot-filling until the trip is complete, then planning and follow-ups
    pub async fn submit_chat_turn(
        &self,
        state: &mut ConversationState,
        raw_text: &str,
    ) -> Result<TurnOutcome, PlannerError> {
        let text = raw_text.trim();
        if text.is_empty() {
            return Err(PlannerError::EmptyMessage);
        }
        state.enter_mode(SessionMode::FreeformChat);

        let stage = state.stage();
        info!(?stage, "Handling chat turn");
        match (stage, state.parameters().cloned()) {
            (Stage::AwaitingParameters, _) | (Stage::AwaitingPlanInput, None) => {
                self.gather_parameters(state, text).await
            }
            (Stage::AwaitingPlanInput, Some(parameters)) => {
                state.push_confirmed_user(text);
                let plan = self.plan_from_chat(state, parameters).await?;
                Ok(TurnOutcome {
                    assistant_messages: vec![plan],
                    still_awaiting_parameters: false,
                })
            }
            (Stage::PlanningActive, _) => {
                let reply = self.follow_up(state, text).await?;
                Ok(TurnOutcome {
                    assistant_messages: vec![reply],
                    still_awaiting_parameters: false,
                })
            }
        }
    }

    async fn gather_parameters(
        &self,
        state: &mut ConversationState,
        text: &str,
    ) -> Result<TurnOutcome, PlannerError> {
        state.push_pending_user(text);
        let slots = SlotExtractor::new(&self.validator, self.today())
            .extract(&state.pending_transcript())
            .await?;

        match state.apply_slots(slots, &self.settings.default_destination) {
            SlotOutcome::AskFollowUp(question) => Ok(TurnOutcome {
                assistant_messages: vec![question],
                still_awaiting_parameters: true,
            }),
            SlotOutcome::ReadyToPlan(parameters) => {
                let plan = self.plan_from_chat(state, parameters).await?;
                Ok(TurnOutcome {
                    assistant_messages: vec![plan],
                    still_awaiting_parameters: false,
                })
            }
        }
    }

    async fn plan_from_chat(
        &self,
        state: &mut ConversationState,
        parameters: TripParameters,
    ) -> Result<String, PlannerError> {
        let mode = state.mode().unwrap_or(SessionMode::FreeformChat);
        let latest = state
            .confirmed_log()
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text.clone())
            .unwrap_or_default();
        let contract = expected_output(mode, true, &latest, &self.settings.bus_tour_url);

        let briefing = build_briefing(&self.weather, &parameters.destination, self.settings.weather_mode).await;
        let request = plan_request(&parameters, &briefing);
        let plan = PlanGenerator::new(&self.planner)
            .generate(&request, state.confirmed_log(), &contract)
            .await?;

        state.complete_plan(briefing, request, &plan);
        Ok(plan)
    }

    async fn follow_up(&self, state: &mut ConversationState, text: &str) -> Result<String, PlannerError> {
        state.push_confirmed_user(text);
        let mode = state.mode().unwrap_or(SessionMode::FreeformChat);
        let contract = expected_output(mode, false, text, &self.settings.bus_tour_url);
        let initial_request = match mode {
            SessionMode::PlanningSession => state.initial_request(),
            SessionMode::FreeformChat => None,
        };

        let reply = FollowUpResponder::new(&self.planner)
            .respond(initial_request, state.confirmed_log(), &contract)
            .await?;
        state.record_reply(&reply);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::ScriptedAgent;
    use crate::models::{Message, RequiredField};
    use crate::planner::{PLANNING_FOLLOW_UP_CONTRACT, PLAN_CONTRACT};
    use crate::weather::tests::FixedWeather;
    use crate::weather::Season;
    use tokio_test::block_on;

    const NOTHING: &str = r#"```json
{"destination": null, "start_date": null, "budget": null, "no_of_days": null, "other_details": null}
```"#;
    const DAYS_ONLY: &str = r#"{"destination": "Madurai", "start_date": null, "budget": null, "no_of_days": 3, "other_details": "honeymoon"}"#;
    const DATE_AND_DAYS: &str = r#"{"destination": "Madurai", "start_date": "2025-06-14", "budget": null, "no_of_days": 3, "other_details": "honeymoon"}"#;
    const EVERYTHING: &str = r#"{"destination": "Madurai", "start_date": "2025-06-14", "budget": "$800", "no_of_days": 3, "other_details": "honeymoon"}"#;

    fn planner(validator: ScriptedAgent, agent: ScriptedAgent) -> TripPlanner<FixedWeather, ScriptedAgent> {
        let settings = PlannerSettings {
            today: NaiveDate::from_ymd_opt(2025, 6, 1),
            weather_mode: WeatherMode::Live,
            ..PlannerSettings::default()
        };
        TripPlanner::new(FixedWeather::all_clear(), validator, agent, settings)
    }

    fn form(destination: &str) -> TripForm {
        TripForm {
            destination: destination.to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 7, 1),
            duration_days: 5,
            budget: 1500.0,
            interests: vec!["History".into(), " ".into()],
            weather_mode: None,
        }
    }

    #[test]
    fn stays_awaiting_until_all_three_fields_resolve() {
        let tp = planner(
            ScriptedAgent::replying(&[NOTHING, DAYS_ONLY, DATE_AND_DAYS, EVERYTHING]),
            ScriptedAgent::replying(&["| Day | Plan |"]),
        );
        let mut state = tp.new_session();

        let first = block_on(tp.submit_chat_turn(&mut state, "Hi there")).unwrap();
        assert!(first.still_awaiting_parameters);
        assert_eq!(
            first.assistant_messages,
            vec!["What is your Start Date?\nWhat is your Budget?\nFor how many days you plan this trip?"]
        );

        let second = block_on(tp.submit_chat_turn(&mut state, "Madurai for 3 days")).unwrap();
        assert!(second.still_awaiting_parameters);
        assert_eq!(
            second.assistant_messages,
            vec!["What is your Start Date?\nWhat is your Budget?"]
        );

        let third = block_on(tp.submit_chat_turn(&mut state, "From June 14")).unwrap();
        assert!(third.still_awaiting_parameters);
        assert_eq!(third.assistant_messages, vec![RequiredField::Budget.question()]);
        assert!(tp.planner.tasks().is_empty());

        let fourth = block_on(tp.submit_chat_turn(&mut state, "$800 total")).unwrap();
        assert!(!fourth.still_awaiting_parameters);
        assert_eq!(fourth.assistant_messages, vec!["| Day | Plan |"]);
        assert_eq!(state.stage(), Stage::PlanningActive);
        assert_eq!(state.parameters().unwrap().destination, "Madurai");
    }

    #[test]
    fn extractor_sees_whole_pending_conversation() {
        let tp = planner(ScriptedAgent::replying(&[DAYS_ONLY, DAYS_ONLY]), ScriptedAgent::default());
        let mut state = tp.new_session();

        block_on(tp.submit_chat_turn(&mut state, "Madurai, 3 days")).unwrap();
        block_on(tp.submit_chat_turn(&mut state, "not sure yet")).unwrap();

        let description = tp.validator.last_task().description;
        assert_eq!(
            description,
            format!(
                "Assistant: {}\nUser: Madurai, 3 days\nAssistant: What is your Start Date?\nWhat is your Budget?\nUser: not sure yet",
                DEFAULT_GREETING
            )
        );
    }

    #[test]
    fn completion_flushes_pending_log_then_plans() {
        let tp = planner(
            ScriptedAgent::replying(&[DAYS_ONLY, EVERYTHING]),
            ScriptedAgent::replying(&["Itinerary table"]),
        );
        let mut state = tp.new_session();

        block_on(tp.submit_chat_turn(&mut state, "Madurai for 3 days")).unwrap();
        let pending_before: Vec<Message> = state.pending_log().to_vec();
        block_on(tp.submit_chat_turn(&mut state, "June 14, $800")).unwrap();

        assert!(state.pending_log().is_empty());
        let confirmed = state.confirmed_log();
        assert_eq!(&confirmed[..pending_before.len()], pending_before.as_slice());
        assert_eq!(confirmed[pending_before.len()], Message::user("June 14, $800"));
        assert_eq!(confirmed.last(), Some(&Message::assistant("Itinerary table")));

        let task = tp.planner.last_task();
        assert!(task.description.starts_with("Plan a trip to Madurai for 3 days starting 2025-06-14."));
        assert!(task.description.contains("User: June 14, $800"));
        assert!(task.expected_output.contains("table-structured travel itinerary"));
        assert!(state.briefing().is_some());
    }

    #[test]
    fn malformed_extraction_keeps_only_the_user_message() {
        let tp = planner(
            ScriptedAgent::replying(&["I think you want to go to Madurai!"]),
            ScriptedAgent::default(),
        );
        let mut state = tp.new_session();

        let result = block_on(tp.submit_chat_turn(&mut state, "Madurai please"));

        assert!(matches!(result, Err(PlannerError::ExtractionParse(_))));
        assert_eq!(
            state.pending_log(),
            &[Message::assistant(DEFAULT_GREETING), Message::user("Madurai please")]
        );
        assert!(state.confirmed_log().is_empty());
        assert_eq!(state.stage(), Stage::AwaitingParameters);
    }

    #[test]
    fn failed_plan_is_retried_on_next_turn() {
        let planner_agent = ScriptedAgent::default();
        planner_agent.push_failure("upstream 500");
        planner_agent.push_reply("Here is your itinerary");
        let tp = planner(ScriptedAgent::replying(&[EVERYTHING]), planner_agent);
        let mut state = tp.new_session();

        let result = block_on(tp.submit_chat_turn(&mut state, "Madurai June 14, 3 days, $800"));
        assert!(matches!(result, Err(PlannerError::Agent(_))));
        assert_eq!(state.stage(), Stage::AwaitingPlanInput);
        assert_eq!(state.confirmed_log().last(), Some(&Message::user("Madurai June 14, 3 days, $800")));

        let retry = block_on(tp.submit_chat_turn(&mut state, "Please try again")).unwrap();
        assert_eq!(retry.assistant_messages, vec!["Here is your itinerary"]);
        assert_eq!(state.stage(), Stage::PlanningActive);
        assert_eq!(tp.validator.tasks().len(), 1);
        assert!(tp.planner.last_task().expected_output.contains("table-structured"));
    }

    #[test]
    fn freeform_follow_up_redirects_bus_booking() {
        let tp = planner(
            ScriptedAgent::replying(&[EVERYTHING]),
            ScriptedAgent::replying(&["Plan", "Let me connect you with a live travel agent."]),
        );
        let mut state = tp.new_session();
        block_on(tp.submit_chat_turn(&mut state, "Madurai June 14, 3 days, $800")).unwrap();

        let outcome = block_on(tp.submit_chat_turn(&mut state, "Book me a bus ticket to Rameswaram")).unwrap();

        assert!(!outcome.still_awaiting_parameters);
        let task = tp.planner.last_task();
        assert!(task.expected_output.contains("live travel agent"));
        assert!(task.expected_output.contains("Never say that you are an AI."));
        assert!(!task.description.starts_with("Initial Request:"));
        assert!(task.description.ends_with("User: Book me a bus ticket to Rameswaram"));
        assert_eq!(
            state.confirmed_log().last(),
            Some(&Message::assistant("Let me connect you with a live travel agent."))
        );
    }

    #[test]
    fn form_rejects_missing_destination_before_any_call() {
        let tp = planner(ScriptedAgent::default(), ScriptedAgent::default());
        let mut state = tp.new_session();

        let result = block_on(tp.submit_form(&mut state, form("   ")));

        assert!(matches!(result, Err(PlannerError::MissingDestination)));
        assert!(tp.planner.tasks().is_empty());
        assert_eq!(state.pending_log().len(), 1);
    }

    #[test]
    fn form_plan_degrades_missing_season_and_enables_follow_ups() {
        let mut weather = FixedWeather::all_clear();
        weather.seasons.remove(&Season::Winter);
        let settings = PlannerSettings {
            today: NaiveDate::from_ymd_opt(2025, 6, 1),
            weather_mode: WeatherMode::Live,
            ..PlannerSettings::default()
        };
        let tp = TripPlanner::new(
            weather,
            ScriptedAgent::default(),
            ScriptedAgent::replying(&["Day 1: Acropolis", "Day 1: Acropolis, Day 2: beach"]),
            settings,
        );
        let mut state = tp.new_session();

        let outcome = block_on(tp.submit_form(&mut state, form("Athens"))).unwrap();

        assert_eq!(outcome.plan, "Day 1: Acropolis");
        assert_eq!(outcome.briefing.unavailable_seasons(), vec![Season::Winter]);
        assert_eq!(state.mode(), Some(SessionMode::PlanningSession));
        assert!(state.pending_log().is_empty());
        assert_eq!(state.parameters().unwrap().interests.len(), 1);
        let plan_task = tp.planner.last_task();
        assert_eq!(plan_task.expected_output, PLAN_CONTRACT);
        assert!(plan_task.description.contains("Winter: unavailable"));

        block_on(tp.submit_chat_turn(&mut state, "Add a beach day")).unwrap();

        let task = tp.planner.last_task();
        assert!(task.description.starts_with("Initial Request:Plan a trip to Athens"));
        assert!(task.description.ends_with("Assistant: Day 1: Acropolis\nUser: Add a beach day"));
        assert_eq!(task.expected_output, PLANNING_FOLLOW_UP_CONTRACT);
        assert_eq!(state.confirmed_log().len(), 3);
    }

    #[test]
    fn failed_form_plan_leaves_session_untouched() {
        let planner_agent = ScriptedAgent::default();
        planner_agent.push_failure("timeout");
        let tp = planner(ScriptedAgent::default(), planner_agent);
        let mut state = tp.new_session();

        let result = block_on(tp.submit_form(&mut state, form("Athens")));

        assert!(matches!(result, Err(PlannerError::Agent(_))));
        assert_eq!(state.mode(), None);
        assert_eq!(state.stage(), Stage::AwaitingParameters);
        assert_eq!(state.pending_log().len(), 1);
        assert!(state.confirmed_log().is_empty());
    }

    #[test]
    fn follow_up_failure_keeps_user_message() {
        let planner_agent = ScriptedAgent::replying(&["Plan"]);
        planner_agent.push_failure("boom");
        let tp = planner(ScriptedAgent::default(), planner_agent);
        let mut state = tp.new_session();
        block_on(tp.submit_form(&mut state, form("Athens"))).unwrap();

        let result = block_on(tp.submit_chat_turn(&mut state, "Swap day 2"));

        assert!(matches!(result, Err(PlannerError::Agent(_))));
        assert_eq!(state.confirmed_log().last(), Some(&Message::user("Swap day 2")));
        assert_eq!(state.stage(), Stage::PlanningActive);
    }

    #[test]
    fn empty_message_changes_nothing() {
        let tp = planner(ScriptedAgent::default(), ScriptedAgent::default());
        let mut state = tp.new_session();

        let result = block_on(tp.submit_chat_turn(&mut state, "  \n "));

        assert!(matches!(result, Err(PlannerError::EmptyMessage)));
        assert_eq!(state.mode(), None);
        assert!(tp.validator.tasks().is_empty());
    }

    #[test]
    fn form_bounds_are_checked() {
        let tp = planner(ScriptedAgent::default(), ScriptedAgent::default());
        let mut state = tp.new_session();
        let mut too_long = form("Athens");
        too_long.duration_days = 45;

        let result = block_on(tp.submit_form(&mut state, too_long));

        assert!(matches!(result, Err(PlannerError::InvalidForm(_))));
    }

    #[test]
    fn chat_without_destination_plans_for_default() {
        let tp = planner(
            ScriptedAgent::replying(&[r#"{"start_date":"this weekend","budget":500,"no_of_days":2}"#]),
            ScriptedAgent::replying(&["Weekend plan"]),
        );
        let mut state = tp.new_session();

        block_on(tp.submit_chat_turn(&mut state, "This weekend, 2 days, 500 dollars")).unwrap();

        let params = state.parameters().unwrap();
        assert_eq!(params.destination, DEFAULT_DESTINATION);
        assert_eq!(params.start_date, TravelDate::Described("this weekend".into()));
    }
}
