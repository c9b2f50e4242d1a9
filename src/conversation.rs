// per-session conversation state and its transitions

use serde::Serialize;
use tracing::{debug, info};

use crate::models::{render_transcript, Message, PartialTripParameters, SessionMode, TripParameters};
use crate::weather::WeatherBriefing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    // chat is still collecting start date, budget and trip length
    AwaitingParameters,
    // parameters are complete but no itinerary has been delivered yet
    AwaitingPlanInput,
    // an itinerary exists; every turn refines it or answers around it
    PlanningActive,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlotOutcome {
    AskFollowUp(String),
    ReadyToPlan(TripParameters),
}

// per-session state, created on session start and dropped on end
#[derive(Debug, Clone)]
pub struct ConversationState {
    pending: Vec<Message>,
    confirmed: Vec<Message>,
    mode: Option<SessionMode>,
    stage: Stage,
    parameters: Option<TripParameters>,
    briefing: Option<WeatherBriefing>,
    initial_request: Option<String>,
}

impl ConversationState {
    pub fn new(greeting: Option<&str>) -> Self {
        Self {
            pending: greeting.map(Message::assistant).into_iter().collect(),
            confirmed: Vec::new(),
            mode: None,
            stage: Stage::AwaitingParameters,
            parameters: None,
            briefing: None,
            initial_request: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn mode(&self) -> Option<SessionMode> {
        self.mode
    }

    pub fn pending_log(&self) -> &[Message] {
        &self.pending
    }

    pub fn confirmed_log(&self) -> &[Message] {
        &self.confirmed
    }

    pub fn parameters(&self) -> Option<&TripParameters> {
        self.parameters.as_ref()
    }

    pub fn briefing(&self) -> Option<&WeatherBriefing> {
        self.briefing.as_ref()
    }

    pub fn initial_request(&self) -> Option<&str> {
        self.initial_request.as_deref()
    }

    // the first interaction decides the mode; a form submission overrides it later
    pub fn enter_mode(&mut self, mode: SessionMode) -> SessionMode {
        *self.mode.get_or_insert(mode)
    }

    pub fn push_pending_user(&mut self, text: &str) {
        self.pending.push(Message::user(text));
    }

    pub fn push_confirmed_user(&mut self, text: &str) {
        self.confirmed.push(Message::user(text));
    }

    pub fn pending_transcript(&self) -> String {
        render_transcript(&self.pending)
    }

    // missing fields ask on the pending log, a complete set flushes it into confirmed
    pub fn apply_slots(
        &mut self,
        slots: PartialTripParameters,
        default_destination: &str,
    ) -> SlotOutcome {
        let missing = slots.missing_fields();
        let Some(parameters) = slots.into_complete(default_destination) else {
            let question = missing
                .iter()
                .map(|field| field.question())
                .collect::<Vec<_>>()
                .join("\n");
            debug!(?missing, "Trip details still incomplete");
            self.pending.push(Message::assistant(question.as_str()));
            return SlotOutcome::AskFollowUp(question);
        };

        info!(
            "Trip details complete for {}, moving {} pending messages to chat history",
            parameters.destination,
            self.pending.len()
        );
        self.confirmed.append(&mut self.pending);
        self.parameters = Some(parameters.clone());
        self.stage = Stage::AwaitingPlanInput;
        SlotOutcome::ReadyToPlan(parameters)
    }

    pub fn complete_plan(&mut self, briefing: WeatherBriefing, initial_request: String, plan: &str) {
        self.confirmed.push(Message::assistant(plan));
        self.briefing = Some(briefing);
        self.initial_request = Some(initial_request);
        self.stage = Stage::PlanningActive;
    }

    // form path commit, only reached once a plan exists
    pub fn adopt_form_plan(
        &mut self,
        parameters: TripParameters,
        briefing: WeatherBriefing,
        initial_request: String,
        plan: &str,
    ) {
        self.mode = Some(SessionMode::PlanningSession);
        self.pending.clear();
        self.parameters = Some(parameters);
        self.complete_plan(briefing, initial_request, plan);
    }

    pub fn record_reply(&mut self, text: &str) {
        self.confirmed.push(Message::assistant(text));
    }
}
