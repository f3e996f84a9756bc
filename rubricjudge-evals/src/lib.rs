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

//! # Rubricjudge Evaluation Framework
//!
//! LLM-as-judge with typed verdicts instead of free text.
//!
//! ## Features
//!
//! - **Structured output repair**: sanitizer plus bounded, batched repair rounds
//! - **Direct assessment**: one option per instance, optional positional bias check
//! - **Pairwise assessment**: round-robin contests judged in both orderings
//! - **Multi-criteria aggregation**: weighted, threshold and required-gate policies
//! - **Inference boundary**: OpenAI/Anthropic clients, response cache, engine registry
//!
//! ## Example
//!
//! ```rust,ignore
//! use rubricjudge_core::{Criterion, CriterionOption, Instance};
//! use rubricjudge_evals::{DirectJudge, Judge, OpenAIClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Arc::new(OpenAIClient::new(
//!         std::env::var("OPENAI_API_KEY").unwrap(),
//!         "gpt-4o-mini".to_string(),
//!     ));
//!
//!     let criterion = Criterion::new("accuracy", "Is the answer factually correct?")
//!         .with_option(CriterionOption::new("Good", "Correct").with_score(1.0))
//!         .with_option(CriterionOption::new("Bad", "Incorrect").with_score(0.0));
//!
//!     let judge = DirectJudge::new(engine).with_positional_bias_check(true);
//!     let results = judge
//!         .evaluate(&[Instance::response("Buenos Aires is the capital of Argentina")], &[criterion])
//!         .await
//!         .unwrap();
//!     println!("{} ({:?})", results[0].selected_option, results[0].score);
//! }
//! ```

pub mod cache;
pub mod judges;
pub mod llm_client;
pub mod persona;
pub mod presets;
pub mod prompts;
pub mod registry;
pub mod repair;
pub mod sanitize;

#[cfg(test)]
mod mock;

pub use cache::{CacheStats, CachedInference};
pub use judges::{DirectJudge, Judge, JudgeMetadata, PairwiseJudge};
pub use llm_client::{
    engine_from_settings, AnthropicClient, ChatMessage, InferenceEngine, LLMClient, LLMError,
    LLMResponse, OpenAIClient, Prompt, Role, TokenUsage,
};
pub use persona::Persona;
pub use presets::CriteriaPreset;
pub use registry::EngineRegistry;
pub use repair::{GenerationMetadata, RepairParser};
pub use sanitize::sanitize;
