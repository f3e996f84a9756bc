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

//! Direct assessment: one verdict per (instance, criterion) pair
//!
//! All prompts of a pass go to the engine in one batch. With the bias check
//! enabled a second batch repeats every prompt with the option list reversed;
//! a verdict that changes between the two passes is flagged as positional
//! bias and the reversed-pass result is attached.

use super::{pair_criteria, Judge, JudgeMetadata};
use crate::llm_client::InferenceEngine;
use crate::persona::Persona;
use crate::prompts::direct_prompt;
use crate::repair::{GenerationMetadata, RepairParser};
use async_trait::async_trait;
use rubricjudge_core::{
    direct_result_schema, Criterion, DirectInstanceResult, Instance, MultiCriteria,
    MultiCriteriaDirectInstanceResult, PositionalBias, Record, RepairConfig, Result,
    RubricConfig, EXPLANATION_FIELD, FEEDBACK_FIELD, GENERATION_FAILED_KEY,
    SELECTED_OPTION_FIELD,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct DirectJudge {
    repair: RepairParser,
    persona: Option<Persona>,
    check_positional_bias: bool,
}

impl DirectJudge {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        Self {
            repair: RepairParser::new(engine, RepairConfig::default()),
            persona: None,
            check_positional_bias: false,
        }
    }

    pub fn from_config(engine: Arc<dyn InferenceEngine>, config: &RubricConfig) -> Result<Self> {
        let persona = config
            .judge
            .persona
            .as_deref()
            .map(str::parse::<Persona>)
            .transpose()?;
        Ok(Self {
            repair: RepairParser::new(engine, config.repair.clone()),
            persona,
            check_positional_bias: config.judge.check_positional_bias,
        })
    }

    pub fn with_repair_config(self, config: RepairConfig) -> Self {
        Self {
            repair: RepairParser::new(self.repair.engine().clone(), config),
            ..self
        }
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = Some(persona);
        self
    }

    pub fn with_positional_bias_check(mut self, enabled: bool) -> Self {
        self.check_positional_bias = enabled;
        self
    }

    /// Judge every instance under every criterion of a multi-criteria set
    /// and aggregate per instance
    ///
    /// All (instance, criterion) prompts share one batch per pass.
    pub async fn evaluate_multi_criteria(
        &self,
        instances: &[Instance],
        multi_criteria: &MultiCriteria,
    ) -> Result<Vec<MultiCriteriaDirectInstanceResult>> {
        let criteria = multi_criteria.criteria();
        let pairs: Vec<(&Instance, &Criterion)> = instances
            .iter()
            .flat_map(|instance| criteria.iter().map(move |c| (instance, c)))
            .collect();

        let results = self.assess(&pairs).await?;
        if criteria.is_empty() {
            return Ok(Vec::new());
        }
        results
            .chunks(criteria.len())
            .map(|per_instance| multi_criteria.get_result(per_instance))
            .collect()
    }

    async fn assess(&self, pairs: &[(&Instance, &Criterion)]) -> Result<Vec<DirectInstanceResult>> {
        for (_, criterion) in pairs {
            criterion.validate()?;
        }

        let mut results = self.run_pass(pairs, false).await?;
        if !self.check_positional_bias || results.is_empty() {
            return Ok(results);
        }

        debug!("Running reversed-option pass on {} items", pairs.len());
        let alternates = self.run_pass(pairs, true).await?;
        let mut detected = 0usize;
        for (result, alternate) in results.iter_mut().zip(alternates) {
            // A placeholder verdict says nothing about ordering
            if result.generation_failed() || alternate.generation_failed() {
                continue;
            }
            if result.selected_option != alternate.selected_option {
                detected += 1;
                result.positional_bias = PositionalBias {
                    detected: true,
                    alternate_result: Some(Box::new(alternate)),
                };
            }
        }
        if detected > 0 {
            info!("Positional bias detected in {}/{} verdicts", detected, results.len());
        }
        Ok(results)
    }

    /// One batched generation over all pairs. Prompts are built before the
    /// call so a malformed instance fails without spending inference.
    async fn run_pass(
        &self,
        pairs: &[(&Instance, &Criterion)],
        reversed: bool,
    ) -> Result<Vec<DirectInstanceResult>> {
        let shown: Vec<Criterion> = pairs
            .iter()
            .map(|(_, c)| if reversed { c.reversed_options() } else { (*c).clone() })
            .collect();
        let schemas: Vec<_> = shown.iter().map(direct_result_schema).collect();
        let prompts = pairs
            .iter()
            .zip(&shown)
            .zip(&schemas)
            .map(|(((instance, _), criterion), schema)| {
                direct_prompt(criterion, instance, self.persona.as_ref(), schema)
            })
            .collect::<Result<Vec<_>>>()?;
        let fallbacks: Vec<Record> = shown.iter().map(option_fallback).collect();

        let prompt_texts: Vec<String> = prompts.iter().map(|p| p.user_text().to_string()).collect();
        let (records, metadata) = self
            .repair
            .generate(prompts, &schemas, Some(&fallbacks))
            .await?;

        Ok(pairs
            .iter()
            .zip(records)
            .zip(metadata)
            .zip(prompt_texts)
            .map(|((((_, criterion), record), meta), prompt)| {
                to_result(criterion, &record, &meta, prompt, reversed)
            })
            .collect())
    }
}

#[async_trait]
impl Judge for DirectJudge {
    type Output = DirectInstanceResult;

    fn id(&self) -> &str {
        "direct_v1"
    }

    async fn evaluate(
        &self,
        instances: &[Instance],
        criteria: &[Criterion],
    ) -> Result<Vec<DirectInstanceResult>> {
        let pairs = pair_criteria(instances, criteria)?;
        self.assess(&pairs).await
    }

    fn metadata(&self) -> JudgeMetadata {
        JudgeMetadata {
            name: "Direct Assessment".to_string(),
            version: "1.0.0".to_string(),
            description: "Selects one criterion option per instance".to_string(),
            engine: self.repair.engine().engine_name().to_string(),
            passes: if self.check_positional_bias { 2 } else { 1 },
        }
    }
}

/// Fallback table letting the failure policy pick any declared option
fn option_fallback(criterion: &Criterion) -> Record {
    let mut record = Record::new();
    record.insert(SELECTED_OPTION_FIELD.to_string(), json!(criterion.option_names()));
    record
}

fn to_result(
    criterion: &Criterion,
    record: &Record,
    meta: &GenerationMetadata,
    prompt: String,
    reversed: bool,
) -> DirectInstanceResult {
    let text = |field: &str| record.get(field).and_then(Value::as_str).map(str::to_string);
    let selected_option = text(SELECTED_OPTION_FIELD).unwrap_or_default();

    let mut metadata = HashMap::new();
    metadata.insert(GENERATION_FAILED_KEY.to_string(), json!(meta.generation_failed));
    metadata.insert("repair_attempts".to_string(), json!(meta.repair_attempts));
    metadata.insert("sanitized".to_string(), json!(meta.sanitized));
    metadata.insert("raw_output".to_string(), json!(meta.last_raw_output));
    metadata.insert("prompt".to_string(), json!(prompt));
    metadata.insert("options_reversed".to_string(), json!(reversed));

    DirectInstanceResult {
        criterion: criterion.clone(),
        score: criterion.score_of(&selected_option),
        selected_option,
        explanation: text(EXPLANATION_FIELD).unwrap_or_default(),
        feedback: text(FEEDBACK_FIELD),
        positional_bias: PositionalBias::default(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedEngine;
    use crate::llm_client::Prompt;
    use rubricjudge_core::{CriterionOption, FailurePolicy, MultiCriteriaItem, RubricError};

    fn good_bad() -> Criterion {
        Criterion::new("accuracy", "Is the answer factually correct?").with_options(vec![
            CriterionOption::new("Good", "Correct").with_score(1.0),
            CriterionOption::new("Bad", "Incorrect").with_score(0.0),
        ])
    }

    fn verdict(option: &str) -> String {
        format!(r#"{{"selected_option": "{}", "explanation": "because"}}"#, option)
    }

    /// Picks whichever option the prompt lists first
    fn first_listed(prompt: &Prompt) -> String {
        let text = prompt.user_text();
        let good = text.find("- \"Good\"").unwrap_or(usize::MAX);
        let bad = text.find("- \"Bad\"").unwrap_or(usize::MAX);
        verdict(if good < bad { "Good" } else { "Bad" })
    }

    #[tokio::test]
    async fn test_single_pass_score_and_metadata() {
        let engine = Arc::new(ScriptedEngine::always(&verdict("Good")));
        let judge = DirectJudge::new(engine.clone());

        let results = judge
            .evaluate(
                &[Instance::response("Buenos Aires is the capital of Argentina")],
                &[good_bad()],
            )
            .await
            .unwrap();

        assert_eq!(results[0].selected_option, "Good");
        assert_eq!(results[0].score, Some(1.0));
        assert!(!results[0].positional_bias.detected);
        assert!(!results[0].generation_failed());
        assert_eq!(results[0].metadata["repair_attempts"], 0);
        assert!(results[0].metadata["prompt"]
            .as_str()
            .unwrap()
            .contains("Buenos Aires"));
        assert_eq!(engine.call_count(), 1);
    }

    #[tokio::test]
    async fn test_consistent_passes_report_no_bias() {
        let engine = Arc::new(ScriptedEngine::always(&verdict("Bad")));
        let judge = DirectJudge::new(engine.clone()).with_positional_bias_check(true);

        let results = judge
            .evaluate(&[Instance::response("Lyon")], &[good_bad()])
            .await
            .unwrap();

        assert!(!results[0].positional_bias.detected);
        assert!(results[0].positional_bias.alternate_result.is_none());
        assert_eq!(engine.call_count(), 2);
    }

    #[tokio::test]
    async fn test_order_sensitive_model_flags_bias() {
        let engine = Arc::new(ScriptedEngine::new().with_responder(first_listed));
        let judge = DirectJudge::new(engine.clone()).with_positional_bias_check(true);

        let results = judge
            .evaluate(&[Instance::response("Paris")], &[good_bad()])
            .await
            .unwrap();

        let bias = &results[0].positional_bias;
        assert!(bias.detected);
        let alternate = bias.alternate_result.as_ref().unwrap();
        assert_eq!(results[0].selected_option, "Good");
        assert_eq!(alternate.selected_option, "Bad");
        assert_eq!(alternate.score, Some(0.0));
        // Results always carry the criterion in its declared order
        assert_eq!(alternate.criterion.options[0].name, "Good");
    }

    #[tokio::test]
    async fn test_missing_field_fails_before_inference() {
        let engine = Arc::new(ScriptedEngine::always(&verdict("Good")));
        let judge = DirectJudge::new(engine.clone());
        let instance = Instance::new().with_field("answer", "Paris");

        let err = judge.evaluate(&[instance], &[good_bad()]).await.unwrap_err();
        assert!(matches!(err, RubricError::SchemaMismatch(_)));
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test]
    async fn test_random_default_picks_declared_option() {
        let engine = Arc::new(ScriptedEngine::always("no idea"));
        let judge = DirectJudge::new(engine.clone()).with_repair_config(RepairConfig {
            max_retries: 1,
            on_failure: FailurePolicy::RandomDefault,
            seed: Some(3),
        });

        let results = judge
            .evaluate(&[Instance::response("Paris")], &[good_bad()])
            .await
            .unwrap();

        assert!(results[0].generation_failed());
        assert!(["Good", "Bad"].contains(&results[0].selected_option.as_str()));
        assert!(results[0].score.is_some());
        assert_eq!(engine.call_count(), 2);
    }

    #[tokio::test]
    async fn test_multi_criteria_batches_and_aggregates() {
        let engine = Arc::new(ScriptedEngine::new().with_responder(|prompt: &Prompt| {
            if prompt.user_text().contains("Criterion: concise") {
                verdict("No")
            } else {
                verdict("Yes")
            }
        }));
        let judge = DirectJudge::new(engine.clone());
        let multi = MultiCriteria::new(vec![
            MultiCriteriaItem::weighted(Criterion::yes_no("accurate", "Is it accurate?"), 0.5),
            MultiCriteriaItem::weighted(Criterion::yes_no("concise", "Is it concise?"), 0.5),
        ])
        .unwrap();

        let results = judge
            .evaluate_multi_criteria(
                &[Instance::response("Paris"), Instance::response("Lyon")],
                &multi,
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].aggregated_score, 0.5);
        assert_eq!(results[1].per_criterion_results.len(), 2);
        assert_eq!(engine.call_count(), 1);
        assert_eq!(engine.calls()[0].len(), 4);
    }

    #[tokio::test]
    async fn test_persona_from_config() {
        let mut config = RubricConfig::default();
        config.judge.persona = Some("critical_thinker".to_string());
        let engine = Arc::new(ScriptedEngine::always(&verdict("Good")));
        let judge = DirectJudge::from_config(engine.clone(), &config).unwrap();

        judge
            .evaluate(&[Instance::response("Paris")], &[good_bad()])
            .await
            .unwrap();
        assert!(engine.calls()[0][0].messages[0]
            .content
            .contains("critical thinker"));

        config.judge.persona = Some("pirate".to_string());
        assert!(DirectJudge::from_config(engine, &config).is_err());
    }
}
