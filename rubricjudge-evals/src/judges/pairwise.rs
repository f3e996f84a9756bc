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

//! Pairwise assessment: round-robin contests between N responses
//!
//! Every unordered pair (i, j) is judged in both orderings, so positional
//! bias is measured on every contest. All forward orderings form one batch
//! and all reversed orderings a second one. When the orderings disagree the
//! configured tie-break picks which pass counts, and the stored explanation
//! says so.

use super::{pair_criteria, Judge, JudgeMetadata};
use crate::llm_client::{InferenceEngine, Prompt};
use crate::persona::Persona;
use crate::prompts::pairwise_prompt;
use crate::repair::RepairParser;
use async_trait::async_trait;
use rubricjudge_core::{
    pairwise_result_schema, BiasTieBreak, Criterion, Instance, PairwiseInstanceResult, Record,
    RecordSchema, RepairConfig, Result, RubricConfig, RubricError, SingleSystemPairwiseResult,
    EXPLANATION_FIELD, WINNER_FIELD,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PairwiseJudge {
    repair: RepairParser,
    persona: Option<Persona>,
    tie_break: BiasTieBreak,
}

/// One judged ordering of a contest
struct Verdict {
    /// The system shown as "Response 1" won
    first_shown_won: bool,
    explanation: String,
    /// Placeholder record, not model output
    generation_failed: bool,
}

/// Resolved outcome of the contest between systems `a` and `b` (a < b)
struct Contest {
    a: usize,
    b: usize,
    a_won: bool,
    biased: bool,
    generation_failed: bool,
    explanation: String,
}

/// System names and contest pairs for one instance
struct Plan {
    names: Vec<String>,
    contests: Vec<(usize, usize)>,
}

impl PairwiseJudge {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        Self {
            repair: RepairParser::new(engine, RepairConfig::default()),
            persona: None,
            tie_break: BiasTieBreak::default(),
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
            tie_break: config.judge.bias_tie_break,
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

    pub fn with_tie_break(mut self, tie_break: BiasTieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    async fn judge_orderings(&self, prompts: Vec<Prompt>) -> Result<Vec<Verdict>> {
        let schemas: Vec<RecordSchema> = vec![pairwise_result_schema(); prompts.len()];
        let mut fallback = Record::new();
        fallback.insert(WINNER_FIELD.to_string(), json!(["1", "2"]));
        let fallbacks = vec![fallback; prompts.len()];

        let (records, metadata) = self
            .repair
            .generate(prompts, &schemas, Some(&fallbacks))
            .await?;

        Ok(records
            .iter()
            .zip(&metadata)
            .map(|(record, meta)| Verdict {
                first_shown_won: record.get(WINNER_FIELD).and_then(Value::as_str) == Some("1"),
                explanation: record
                    .get(EXPLANATION_FIELD)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                generation_failed: meta.generation_failed,
            })
            .collect())
    }

    fn resolve(&self, a: usize, b: usize, forward: Verdict, backward: Verdict) -> Contest {
        // Forward shows a first, backward shows b first
        let a_won_forward = forward.first_shown_won;
        let a_won_backward = !backward.first_shown_won;

        // A placeholder never counts as a verdict, so it cannot signal bias
        let (a_won, biased, generation_failed, explanation) =
            match (forward.generation_failed, backward.generation_failed) {
                (true, true) => (a_won_forward, false, true, forward.explanation),
                (true, false) => (a_won_backward, false, false, backward.explanation),
                (false, true) => (a_won_forward, false, false, forward.explanation),
                (false, false) if a_won_forward == a_won_backward => {
                    (a_won_forward, false, false, forward.explanation)
                }
                (false, false) => {
                    let (a_won, kept) = match self.tie_break {
                        BiasTieBreak::FirstPass => (a_won_forward, "first"),
                        BiasTieBreak::SecondPass => (a_won_backward, "second"),
                    };
                    let explanation = format!(
                        "Verdict changed with presentation order; kept the {} pass. \
                         First pass: {} Second pass: {}",
                        kept, forward.explanation, backward.explanation
                    );
                    (a_won, true, false, explanation)
                }
            };

        Contest {
            a,
            b,
            a_won,
            biased,
            generation_failed,
            explanation,
        }
    }
}

fn plan_contests(instance: &Instance, criterion: &Criterion) -> Result<(Plan, Vec<String>)> {
    let responses = criterion
        .evaluated_value(instance)?
        .as_list()
        .ok_or_else(|| {
            RubricError::InvalidInput(format!(
                "pairwise field '{}' must hold a list of responses",
                criterion.evaluated_field()
            ))
        })?
        .to_vec();
    if responses.len() < 2 {
        return Err(RubricError::InvalidInput(format!(
            "pairwise comparison needs at least 2 responses, got {}",
            responses.len()
        )));
    }

    let names = match instance.system_names() {
        Some(names) if names.len() == responses.len() => names,
        Some(names) => {
            return Err(RubricError::InvalidInput(format!(
                "{} system names for {} responses",
                names.len(),
                responses.len()
            )))
        }
        None => (1..=responses.len()).map(|i| format!("system_{}", i)).collect(),
    };
    let mut seen = HashSet::new();
    if let Some(duplicate) = names.iter().find(|name| !seen.insert(name.as_str())) {
        return Err(RubricError::InvalidInput(format!(
            "duplicate system name '{}'",
            duplicate
        )));
    }

    let contests = (0..responses.len())
        .flat_map(|a| (a + 1..responses.len()).map(move |b| (a, b)))
        .collect();
    Ok((Plan { names, contests }, responses))
}

/// Per-system winrate, ranking and contest records
fn summarize(names: &[String], contests: &[Contest]) -> PairwiseInstanceResult {
    let n = names.len();
    let mut per_system: Vec<SingleSystemPairwiseResult> = (0..n)
        .map(|_| SingleSystemPairwiseResult {
            contest_results: Vec::new(),
            compared_to: Vec::new(),
            explanations: Vec::new(),
            positional_bias: Some(Vec::new()),
            generation_failed: Vec::new(),
            winrate: 0.0,
            ranking: 0,
            selections: Vec::new(),
        })
        .collect();

    for contest in contests {
        let winner = if contest.a_won { contest.a } else { contest.b };
        for (me, other) in [(contest.a, contest.b), (contest.b, contest.a)] {
            let entry = &mut per_system[me];
            entry.contest_results.push(winner == me);
            entry.compared_to.push(other);
            entry.explanations.push(contest.explanation.clone());
            if let Some(bias) = entry.positional_bias.as_mut() {
                bias.push(contest.biased);
            }
            entry.generation_failed.push(contest.generation_failed);
            entry.selections.push(names[winner].clone());
        }
    }

    // Placeholder contests carry no signal and stay out of the winrate
    for entry in &mut per_system {
        let (wins, total) = entry
            .contest_results
            .iter()
            .zip(&entry.generation_failed)
            .filter(|(_, failed)| !**failed)
            .fold((0usize, 0usize), |(wins, total), (won, _)| {
                (wins + usize::from(*won), total + 1)
            });
        entry.winrate = if total > 0 { wins as f64 / total as f64 } else { 0.0 };
    }

    // Stable sort keeps declaration order among equal winrates
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|x, y| per_system[*y].winrate.total_cmp(&per_system[*x].winrate));
    for (rank, idx) in order.into_iter().enumerate() {
        per_system[idx].ranking = rank + 1;
    }

    names.iter().cloned().zip(per_system).collect()
}

#[async_trait]
impl Judge for PairwiseJudge {
    type Output = PairwiseInstanceResult;

    fn id(&self) -> &str {
        "pairwise_v1"
    }

    async fn evaluate(
        &self,
        instances: &[Instance],
        criteria: &[Criterion],
    ) -> Result<Vec<PairwiseInstanceResult>> {
        let pairs = pair_criteria(instances, criteria)?;
        let schema = pairwise_result_schema();

        let mut plans = Vec::with_capacity(pairs.len());
        let mut forward_prompts = Vec::new();
        let mut backward_prompts = Vec::new();
        for (instance, criterion) in &pairs {
            let (plan, responses) = plan_contests(instance, criterion)?;
            let context = criterion.resolve_context(instance)?;
            for &(a, b) in &plan.contests {
                let persona = self.persona.as_ref();
                forward_prompts.push(pairwise_prompt(
                    criterion,
                    &context,
                    &responses[a],
                    &responses[b],
                    persona,
                    &schema,
                ));
                backward_prompts.push(pairwise_prompt(
                    criterion,
                    &context,
                    &responses[b],
                    &responses[a],
                    persona,
                    &schema,
                ));
            }
            plans.push(plan);
        }

        debug!(
            "Judging {} contests across {} instances in both orderings",
            forward_prompts.len(),
            plans.len()
        );
        let forward = self.judge_orderings(forward_prompts).await?;
        let backward = self.judge_orderings(backward_prompts).await?;

        let mut verdicts = forward.into_iter().zip(backward);
        let mut results = Vec::with_capacity(plans.len());
        let mut biased = 0usize;
        let mut failed = 0usize;
        for plan in plans {
            let mut contests = Vec::with_capacity(plan.contests.len());
            for &(a, b) in &plan.contests {
                let (fwd, bwd) = verdicts.next().ok_or_else(|| {
                    RubricError::CollaboratorFailure("missing pairwise verdict".to_string())
                })?;
                let contest = self.resolve(a, b, fwd, bwd);
                biased += usize::from(contest.biased);
                failed += usize::from(contest.generation_failed);
                contests.push(contest);
            }
            results.push(summarize(&plan.names, &contests));
        }
        if biased > 0 {
            info!("Positional bias detected in {} pairwise contests", biased);
        }
        if failed > 0 {
            warn!(
                "{} pairwise contests fell back to placeholders in both orderings",
                failed
            );
        }
        Ok(results)
    }

    fn metadata(&self) -> JudgeMetadata {
        JudgeMetadata {
            name: "Pairwise Comparison".to_string(),
            version: "1.0.0".to_string(),
            description: "Ranks N responses by round-robin contests in both orderings"
                .to_string(),
            engine: self.repair.engine().engine_name().to_string(),
            passes: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedEngine;

    fn inclusivity() -> Criterion {
        Criterion::new("inclusivity", "Which response uses more inclusive language?")
    }

    fn responses(items: &[&str]) -> Instance {
        Instance::new().with_field(
            "response",
            items.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        )
    }

    fn winner(w: &str) -> String {
        format!(r#"{{"explanation": "reasons", "winner": "{}"}}"#, w)
    }

    fn between<'a>(text: &'a str, start: &str, end: &str) -> &'a str {
        let from = text.find(start).map(|i| i + start.len()).unwrap_or(0);
        let to = text[from..].find(end).map(|i| from + i).unwrap_or(text.len());
        &text[from..to]
    }

    fn warmth(response: &str) -> u8 {
        if response.contains("everyone") {
            2
        } else if response.contains("all") {
            1
        } else {
            0
        }
    }

    /// Order-insensitive judge preferring the warmer greeting
    fn content_judge(prompt: &Prompt) -> String {
        let text = prompt.user_text();
        let first = between(text, "### Response 1\n", "\n\n### Response 2");
        let second = between(text, "### Response 2\n", "\n\n### Output format");
        winner(if warmth(first) > warmth(second) { "1" } else { "2" })
    }

    #[tokio::test]
    async fn test_consistent_three_way_ranking() {
        let engine = Arc::new(ScriptedEngine::new().with_responder(content_judge));
        let judge = PairwiseJudge::new(engine.clone());
        let instance = responses(&["Hi guys", "Hello everyone", "Hey all"]);

        let results = judge.evaluate(&[instance], &[inclusivity()]).await.unwrap();
        let result = &results[0];

        assert_eq!(result["system_2"].winrate, 1.0);
        assert_eq!(result["system_2"].ranking, 1);
        assert_eq!(result["system_2"].compared_to, vec![0, 2]);
        assert_eq!(result["system_3"].winrate, 0.5);
        assert_eq!(result["system_3"].ranking, 2);
        assert_eq!(result["system_1"].ranking, 3);
        assert_eq!(result["system_1"].selections, vec!["system_2", "system_3"]);
        assert_eq!(result["system_3"].positional_bias, Some(vec![false, false]));

        let calls = engine.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].len(), 3);
        assert_eq!(calls[1].len(), 3);
    }

    #[test]
    fn test_equal_winrates_rank_by_declaration_order() {
        let names: Vec<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
        let contest = |a, b, a_won| Contest {
            a,
            b,
            a_won,
            biased: false,
            generation_failed: false,
            explanation: String::new(),
        };
        // x beats y, y beats z, z beats x
        let result = summarize(
            &names,
            &[contest(0, 1, true), contest(0, 2, false), contest(1, 2, true)],
        );
        assert_eq!(result["x"].winrate, 0.5);
        assert_eq!(result["x"].ranking, 1);
        assert_eq!(result["y"].ranking, 2);
        assert_eq!(result["z"].ranking, 3);
    }

    #[tokio::test]
    async fn test_order_bias_uses_tie_break() {
        // Always prefers whatever is shown first
        let engine = Arc::new(ScriptedEngine::always(&winner("1")));
        let instance = responses(&["A", "B"]);

        let first = PairwiseJudge::new(engine.clone())
            .evaluate(&[instance.clone()], &[inclusivity()])
            .await
            .unwrap();
        assert_eq!(first[0]["system_1"].contest_results, vec![true]);
        assert_eq!(first[0]["system_1"].positional_bias, Some(vec![true]));
        assert!(first[0]["system_1"].explanations[0].contains("kept the first pass"));

        let second = PairwiseJudge::new(engine)
            .with_tie_break(BiasTieBreak::SecondPass)
            .evaluate(&[instance], &[inclusivity()])
            .await
            .unwrap();
        assert_eq!(second[0]["system_2"].contest_results, vec![true]);
        assert_eq!(second[0]["system_2"].ranking, 1);
    }

    #[tokio::test]
    async fn test_system_names_from_metadata() {
        let engine = Arc::new(ScriptedEngine::new().with_responder(content_judge));
        let instance = responses(&["Hello everyone", "Yo"])
            .with_metadata("system_names", json!(["gpt", "llama"]));

        let results = PairwiseJudge::new(engine)
            .evaluate(&[instance], &[inclusivity()])
            .await
            .unwrap();

        assert_eq!(results[0]["gpt"].ranking, 1);
        assert_eq!(results[0]["llama"].selections, vec!["gpt"]);
    }

    fn random_default(max_retries: u32) -> RepairConfig {
        RepairConfig {
            max_retries,
            on_failure: rubricjudge_core::FailurePolicy::RandomDefault,
            seed: Some(3),
        }
    }

    #[tokio::test]
    async fn test_unrepairable_contests_are_flagged_not_ranked() {
        let engine = Arc::new(ScriptedEngine::always("I cannot answer in JSON"));
        let judge = PairwiseJudge::new(engine.clone()).with_repair_config(random_default(1));

        let results = judge
            .evaluate(&[responses(&["A", "B", "C"])], &[inclusivity()])
            .await
            .unwrap();
        let result = &results[0];

        for (rank, name) in ["system_1", "system_2", "system_3"].iter().enumerate() {
            assert_eq!(result[*name].generation_failed, vec![true, true]);
            assert_eq!(result[*name].positional_bias, Some(vec![false, false]));
            assert_eq!(result[*name].winrate, 0.0);
            assert_eq!(result[*name].ranking, rank + 1);
        }
        // Initial batch plus one repair round, for each ordering
        assert_eq!(engine.call_count(), 4);
    }

    #[tokio::test]
    async fn test_one_failed_ordering_defers_to_the_other() {
        // Forward verdict parses; the reversed batch and its repair both fail
        let engine = Arc::new(ScriptedEngine::new().then_reply(vec![winner("2").as_str()]));
        let judge = PairwiseJudge::new(engine.clone()).with_repair_config(random_default(1));

        let results = judge
            .evaluate(&[responses(&["A", "B"])], &[inclusivity()])
            .await
            .unwrap();
        let result = &results[0];

        assert_eq!(result["system_2"].contest_results, vec![true]);
        assert_eq!(result["system_2"].generation_failed, vec![false]);
        assert_eq!(result["system_2"].positional_bias, Some(vec![false]));
        assert_eq!(result["system_2"].winrate, 1.0);
        assert_eq!(result["system_2"].ranking, 1);
        assert_eq!(engine.call_count(), 3);
    }

    #[test]
    fn test_failed_contests_excluded_from_winrate() {
        let names: Vec<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
        let contest = |a, b, a_won, generation_failed| Contest {
            a,
            b,
            a_won,
            biased: false,
            generation_failed,
            explanation: String::new(),
        };
        let result = summarize(
            &names,
            &[
                contest(0, 1, true, false),
                contest(0, 2, false, true),
                contest(1, 2, true, false),
            ],
        );
        assert_eq!(result["x"].winrate, 1.0);
        assert_eq!(result["x"].generation_failed, vec![false, true]);
        assert_eq!(result["z"].winrate, 0.0);
        assert_eq!(result["z"].contest_results, vec![true, false]);
    }

    #[tokio::test]
    async fn test_duplicate_system_names_rejected() {
        let engine = Arc::new(ScriptedEngine::always(&winner("1")));
        let instance =
            responses(&["A", "B", "C"]).with_metadata("system_names", json!(["m", "m", "n"]));

        let err = PairwiseJudge::new(engine.clone())
            .evaluate(&[instance], &[inclusivity()])
            .await
            .unwrap_err();

        assert!(matches!(err, RubricError::InvalidInput(ref msg) if msg.contains("'m'")));
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_single_response() {
        let engine = Arc::new(ScriptedEngine::always(&winner("1")));
        let err = PairwiseJudge::new(engine.clone())
            .evaluate(&[responses(&["only"])], &[inclusivity()])
            .await
            .unwrap_err();
        assert!(matches!(err, RubricError::InvalidInput(_)));
        assert_eq!(engine.call_count(), 0);
    }
}
