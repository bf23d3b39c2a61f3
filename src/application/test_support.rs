use crate::infrastructure::error::InfraError;
use crate::infrastructure::gemini_client::{GenerateRequest, ModelClient, ModelOutcome};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Outcome(ModelOutcome),
    TransportError(String),
}

/// Replays queued replies per model and records every request it sees.
#[derive(Debug, Default)]
pub struct ScriptedModelClient {
    replies: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedModelClient {
    pub fn push(&self, model_id: &str, outcome: ModelOutcome) {
        self.push_reply(model_id, ScriptedReply::Outcome(outcome));
    }

    pub fn push_success(&self, model_id: &str, text: &str) {
        self.push(model_id, ModelOutcome::Success(text.to_string()));
    }

    pub fn push_reply(&self, model_id: &str, reply: ScriptedReply) {
        self.replies
            .lock()
            .expect("replies mutex poisoned")
            .entry(model_id.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().expect("requests mutex poisoned").clone()
    }

    pub fn called_models(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|request| request.model_id)
            .collect()
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelOutcome, InfraError> {
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .push(request.clone());
        let reply = self
            .replies
            .lock()
            .expect("replies mutex poisoned")
            .get_mut(&request.model_id)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(ScriptedReply::Outcome(outcome)) => Ok(outcome),
            Some(ScriptedReply::TransportError(message)) => Err(InfraError::Transport(message)),
            None => Ok(ModelOutcome::Failure(format!(
                "no scripted reply for {}",
                request.model_id
            ))),
        }
    }
}
