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

//! Structured-output repair loop
//!
//! Turns raw model text into schema-valid records:
//!
//! 1. Strict parse against the target schema
//! 2. Sanitize (fences, quotes, control characters, bracket balance) and parse again
//! 3. Batched repair rounds: every still-failing item gets a prompt carrying its
//!    invalid output, the parser error and the JSON schema; all of them go to
//!    the engine in one call per round
//! 4. After `max_retries` rounds, either raise `GenerationRepairExhausted` or
//!    substitute a placeholder record flagged `generation_failed`
//!
//! A single originally-failing item therefore costs at most `max_retries + 1`
//! inference calls including the initial generation.

use crate::llm_client::{ChatMessage, InferenceEngine, Prompt, Role, JSON_SCHEMA_CONSTRAINT};
use crate::sanitize::sanitize;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rubricjudge_core::{FailurePolicy, Record, RecordSchema, RepairConfig, Result, RubricError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-item bookkeeping of how a record was obtained
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Record is a fallback placeholder, not model output
    pub generation_failed: bool,
    /// Repair rounds this item took part in
    pub repair_attempts: u32,
    /// Parsed only after sanitization
    pub sanitized: bool,
    /// Most recent raw text seen for this item
    pub last_raw_output: String,
    /// Last parser error, if the item ever failed to parse
    pub parse_error: Option<String>,
}

pub struct RepairParser {
    engine: Arc<dyn InferenceEngine>,
    config: RepairConfig,
    rng: Mutex<StdRng>,
}

impl RepairParser {
    pub fn new(engine: Arc<dyn InferenceEngine>, config: RepairConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            engine,
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &RepairConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn InferenceEngine> {
        &self.engine
    }

    /// Run one batched generation and repair its outputs
    ///
    /// A collaborator failure on the initial batch counts as every item
    /// having produced empty output, which then goes through repair and the
    /// failure policy like any other malformed generation.
    pub async fn generate(
        &self,
        prompts: Vec<Prompt>,
        schemas: &[RecordSchema],
        fallback_values: Option<&[Record]>,
    ) -> Result<(Vec<Record>, Vec<GenerationMetadata>)> {
        if prompts.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let conversations: Vec<Vec<ChatMessage>> =
            prompts.iter().map(|p| p.messages.clone()).collect();
        let expected = prompts.len();

        debug!("Generating {} records with {}", expected, self.engine.engine_name());
        let raw_texts = match self.engine.infer(prompts).await {
            Ok(outputs) if outputs.len() == expected => outputs,
            Ok(outputs) => {
                warn!(
                    "Inference returned {} outputs for {} prompts, treating batch as failed",
                    outputs.len(),
                    expected
                );
                vec![String::new(); expected]
            }
            Err(e) => {
                warn!("Inference batch failed: {}", e);
                vec![String::new(); expected]
            }
        };

        self.parse_and_repair(raw_texts, schemas, fallback_values, Some(&conversations))
            .await
    }

    /// Parse raw outputs into records, repairing failures in batched rounds
    ///
    /// Output order and length always match `raw_texts`.
    pub async fn parse_and_repair(
        &self,
        raw_texts: Vec<String>,
        schemas: &[RecordSchema],
        fallback_values: Option<&[Record]>,
        prior_messages: Option<&[Vec<ChatMessage>]>,
    ) -> Result<(Vec<Record>, Vec<GenerationMetadata>)> {
        let n = raw_texts.len();
        check_len("target schemas", schemas.len(), n)?;
        if let Some(fallbacks) = fallback_values {
            check_len("fallback values", fallbacks.len(), n)?;
        }
        if let Some(prior) = prior_messages {
            check_len("prior conversations", prior.len(), n)?;
        }

        let mut records: Vec<Option<Record>> = vec![None; n];
        let mut metadata: Vec<GenerationMetadata> = Vec::with_capacity(n);
        let mut pending = Vec::new();

        for (idx, text) in raw_texts.iter().enumerate() {
            let mut meta = GenerationMetadata {
                last_raw_output: text.clone(),
                ..Default::default()
            };
            match try_parse(&schemas[idx], text) {
                Ok((record, sanitized)) => {
                    meta.sanitized = sanitized;
                    records[idx] = Some(record);
                }
                Err(error) => {
                    meta.parse_error = Some(error);
                    pending.push(idx);
                }
            }
            metadata.push(meta);
        }

        let mut round = 0;
        while !pending.is_empty() && round < self.config.max_retries {
            round += 1;
            debug!(
                "Repair round {}/{} for {} items",
                round,
                self.config.max_retries,
                pending.len()
            );

            let prompts: Vec<Prompt> = pending
                .iter()
                .map(|&idx| {
                    repair_prompt(
                        &schemas[idx],
                        &metadata[idx].last_raw_output,
                        metadata[idx].parse_error.as_deref().unwrap_or_default(),
                        prior_messages.map(|p| p[idx].as_slice()),
                    )
                })
                .collect();

            let outputs = match self.engine.infer(prompts).await {
                Ok(outputs) if outputs.len() == pending.len() => outputs,
                Ok(outputs) => {
                    warn!(
                        "Repair round {} returned {} outputs for {} prompts, giving up",
                        round,
                        outputs.len(),
                        pending.len()
                    );
                    break;
                }
                Err(e) => {
                    warn!("Repair round {} failed: {}, giving up", round, e);
                    break;
                }
            };

            let mut still_failing = Vec::new();
            for (idx, text) in pending.into_iter().zip(outputs) {
                let meta = &mut metadata[idx];
                meta.repair_attempts = round;
                match try_parse(&schemas[idx], &text) {
                    Ok((record, sanitized)) => {
                        info!("Item {} repaired after {} rounds", idx, round);
                        meta.sanitized = sanitized;
                        records[idx] = Some(record);
                    }
                    Err(error) => {
                        meta.parse_error = Some(error);
                        still_failing.push(idx);
                    }
                }
                meta.last_raw_output = text;
            }
            pending = still_failing;
        }

        for idx in pending {
            let meta = &mut metadata[idx];
            let parser_error = meta.parse_error.clone().unwrap_or_default();
            match self.config.on_failure {
                FailurePolicy::Raise => {
                    return Err(RubricError::GenerationRepairExhausted {
                        index: idx,
                        attempts: meta.repair_attempts,
                        original_output: raw_texts[idx].clone(),
                        last_attempt: meta.last_raw_output.clone(),
                        parser_error,
                    });
                }
                FailurePolicy::RandomDefault => {
                    warn!(
                        "Item {} unrecoverable after {} repair rounds ({}), using default record",
                        idx, meta.repair_attempts, parser_error
                    );
                    let overrides = fallback_values.map(|f| &f[idx]);
                    let record = schemas[idx].default_record(overrides, &mut *self.rng.lock());
                    meta.generation_failed = true;
                    records[idx] = Some(record);
                }
            }
        }

        let records = records
            .into_iter()
            .enumerate()
            .map(|(idx, record)| {
                record.ok_or_else(|| {
                    RubricError::CollaboratorFailure(format!("no record produced for item {}", idx))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((records, metadata))
    }
}

fn check_len(what: &str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(RubricError::InvalidInput(format!(
            "expected {} {}, got {}",
            expected, what, got
        )));
    }
    Ok(())
}

/// Strict parse, then one sanitized retry. The flag reports whether the
/// sanitizer was needed.
fn try_parse(schema: &RecordSchema, text: &str) -> std::result::Result<(Record, bool), String> {
    match schema.parse(text) {
        Ok(record) => Ok((record, false)),
        Err(strict_error) => {
            let cleaned = sanitize(text);
            if cleaned == text.trim() {
                return Err(strict_error);
            }
            schema.parse(&cleaned).map(|record| (record, true))
        }
    }
}

fn repair_prompt(
    schema: &RecordSchema,
    invalid_output: &str,
    error: &str,
    prior: Option<&[ChatMessage]>,
) -> Prompt {
    let json_schema = schema.to_json_schema();
    let instructions = |with_output: bool| {
        let mut text = format!(
            "The previous answer is not a valid {} record.\n\n",
            schema.name
        );
        if with_output {
            text.push_str(&format!("Invalid output:\n{}\n\n", invalid_output));
        }
        text.push_str(&format!(
            "Parser error:\n{}\n\n\
             Return only a corrected JSON object that conforms to this JSON schema, \
             keeping the original judgement where possible:\n{}",
            error, json_schema
        ));
        text
    };

    let prompt = match prior {
        Some(history) if !history.is_empty() => {
            let mut messages = history.to_vec();
            if invalid_output.trim().is_empty() {
                // Chat APIs reject empty assistant turns, so fold the
                // instructions into the original request instead
                match messages.last_mut() {
                    Some(last) if last.role == Role::User => {
                        last.content.push_str("\n\n");
                        last.content.push_str(&instructions(false));
                    }
                    _ => messages.push(ChatMessage::new(Role::User, instructions(false))),
                }
            } else {
                messages.push(ChatMessage::new(Role::Assistant, invalid_output));
                messages.push(ChatMessage::new(Role::User, instructions(false)));
            }
            Prompt::from_messages(messages)
        }
        _ => Prompt::text(instructions(true)),
    };
    prompt.with_constraint(JSON_SCHEMA_CONSTRAINT, json_schema)
}
