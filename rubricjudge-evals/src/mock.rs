// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Scripted inference engine shared by unit tests

use crate::llm_client::{InferenceEngine, LLMError, Prompt};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

type Responder = Box<dyn Fn(&Prompt) -> String + Send + Sync>;

/// Replies with queued batches first, then with the responder.
/// Without a responder an exhausted script fails the call.
pub(crate) struct ScriptedEngine {
    script: Mutex<VecDeque<Result<Vec<String>, String>>>,
    responder: Option<Responder>,
    calls: Mutex<Vec<Vec<Prompt>>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new().with_responder(move |_| reply.clone())
    }

    pub fn then_reply(self, outputs: Vec<&str>) -> Self {
        self.script
            .lock()
            .push_back(Ok(outputs.into_iter().map(String::from).collect()));
        self
    }

    pub fn then_fail(self, message: &str) -> Self {
        self.script.lock().push_back(Err(message.to_string()));
        self
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&Prompt) -> String + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<Vec<Prompt>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    async fn infer(&self, prompts: Vec<Prompt>) -> Result<Vec<String>, LLMError> {
        self.calls.lock().push(prompts.clone());
        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(outputs)) => Ok(outputs),
            Some(Err(message)) => Err(LLMError::ApiError(message)),
            None => match &self.responder {
                Some(responder) => Ok(prompts.iter().map(|p| responder(p)).collect()),
                None => Err(LLMError::ApiError("script exhausted".to_string())),
            },
        }
    }

    fn engine_name(&self) -> &str {
        "scripted"
    }
}
