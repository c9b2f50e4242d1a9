// llm agent boundary

use std::future::Future;
use std::time::Duration;

use rig::prelude::*;
use rig::{agent::Agent, completion::Prompt, providers::openai};
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTask {
    pub description: String,
    pub expected_output: String,
}

impl AgentTask {
    pub fn new(description: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            expected_output: expected_output.into(),
        }
    }

    fn to_prompt(&self) -> String {
        format!(
            "{}\n\nExpected output:\n{}",
            self.description.trim(),
            self.expected_output.trim()
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent invocation failed: {0}")]
    Invocation(String),
    #[error("Agent did not answer within {0} seconds")]
    Timeout(u64),
}

pub trait AgentRunner: Send + Sync {
    fn run(&self, task: &AgentTask) -> impl Future<Output = Result<String, AgentError>> + Send;
}

const VALIDATOR_INSTRUCTIONS: &str = "\
    You read travel conversations and pull out trip details. \
    Answer with a single JSON object and nothing else. \
    Never invent values the traveller did not give.";

const PLANNER_INSTRUCTIONS: &str = "\
    You are an experienced tour planner for a travel agency. \
    You build day-by-day itineraries that fit the traveller's budget, \
    trip length and interests, and you adapt activities to the weather: \
    indoor alternatives for bad weather, outdoor activities for good weather.";

pub struct RigAgent {
    agent: Agent<openai::CompletionModel>,
    timeout: Duration,
}

impl RigAgent {
    // deterministic agent for structured extraction
    pub fn validator(client: &openai::Client, model: &str, timeout: Duration) -> Self {
        let agent = client
            .agent(model)
            .preamble(VALIDATOR_INSTRUCTIONS)
            .max_tokens(512)
            .temperature(0.0)
            .build();
        Self { agent, timeout }
    }

    // creative agent for itineraries and follow-up answers
    pub fn planner(client: &openai::Client, model: &str, timeout: Duration) -> Self {
        let agent = client
            .agent(model)
            .preamble(PLANNER_INSTRUCTIONS)
            .max_tokens(2048)
            .temperature(0.7)
            .build();
        Self { agent, timeout }
    }
}

impl AgentRunner for RigAgent {
    async fn run(&self, task: &AgentTask) -> Result<String, AgentError> {
        let prompt = task.to_prompt();
        debug!(prompt_len = prompt.len(), "Submitting task to agent");

        let outcome = tokio::time::timeout(self.timeout, async {
            self.agent.prompt(prompt.as_str()).await
        })
        .await;

        match outcome {
            Ok(Ok(response)) => {
                info!("Agent answered, response length: {} chars", response.len());
                Ok(response)
            }
            Ok(Err(e)) => {
                error!("Agent execution failed: {}", e);
                Err(AgentError::Invocation(e.to_string()))
            }
            Err(_) => {
                error!("Agent timed out after {:?}", self.timeout);
                Err(AgentError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

// setup openai client from env
pub fn initialize_openai_client() -> Result<openai::Client, String> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(_) => {
            info!("OpenAI API key found in environment");
            Ok(openai::Client::from_env())
        }
        Err(_) => Err("OPENAI_API_KEY not found in environment".to_string()),
    }
}
