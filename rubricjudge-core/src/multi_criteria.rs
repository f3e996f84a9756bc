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

//! Multi-criteria definitions
//!
//! Each item wraps a criterion with exactly one aggregation policy:
//!
//! - `weight`: contributes `weight * score` (weighted family)
//! - `target_option`: 1.0 on an exact option match, else 0.0 (pass/fail family)
//! - `score_threshold`: 1.0 when the score exceeds the threshold (pass/fail family)
//!
//! An item with none of the three set joins the weighted family and receives
//! an equal share when no item in the set declares a weight.
//!
//! All non-required items must belong to the same family. A required item from
//! the other family acts purely as a gate: it can zero the total but adds
//! nothing to it. Validation happens once, in [`MultiCriteria::new`]; a
//! deserialized set is validated the same way.

use crate::criteria::Criterion;
use crate::error::{Result, RubricError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tolerance applied to the weight-sum check
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

fn default_normalize() -> bool {
    true
}

/// How an item's result is turned into a number
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationPolicy {
    Weighted(Option<f64>),
    TargetOption(String),
    ScoreThreshold(f64),
}

/// Policy family shared by all non-required items of a set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyFamily {
    Weighted,
    PassFail,
}

impl AggregationPolicy {
    pub fn family(&self) -> PolicyFamily {
        match self {
            AggregationPolicy::Weighted(_) => PolicyFamily::Weighted,
            AggregationPolicy::TargetOption(_) | AggregationPolicy::ScoreThreshold(_) => {
                PolicyFamily::PassFail
            }
        }
    }
}

/// One criterion plus its aggregation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiCriteriaItem {
    pub criterion: Criterion,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub target_option: Option<String>,
    #[serde(default)]
    pub score_threshold: Option<f64>,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_normalize")]
    pub normalize_scores: bool,
}

impl MultiCriteriaItem {
    /// Item with no explicit policy; weighted with an equal share
    pub fn new(criterion: Criterion) -> Self {
        Self {
            criterion,
            weight: None,
            target_option: None,
            score_threshold: None,
            required: false,
            normalize_scores: true,
        }
    }

    pub fn weighted(criterion: Criterion, weight: f64) -> Self {
        Self {
            weight: Some(weight),
            ..Self::new(criterion)
        }
    }

    pub fn target(criterion: Criterion, target_option: impl Into<String>) -> Self {
        Self {
            target_option: Some(target_option.into()),
            ..Self::new(criterion)
        }
    }

    pub fn threshold(criterion: Criterion, score_threshold: f64) -> Self {
        Self {
            score_threshold: Some(score_threshold),
            ..Self::new(criterion)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn without_normalization(mut self) -> Self {
        self.normalize_scores = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.criterion.name
    }

    pub fn policy(&self) -> AggregationPolicy {
        if let Some(target) = &self.target_option {
            AggregationPolicy::TargetOption(target.clone())
        } else if let Some(threshold) = self.score_threshold {
            AggregationPolicy::ScoreThreshold(threshold)
        } else {
            AggregationPolicy::Weighted(self.weight)
        }
    }

    fn validate(&self) -> Result<()> {
        let set = [
            self.weight.is_some(),
            self.target_option.is_some(),
            self.score_threshold.is_some(),
        ]
        .iter()
        .filter(|s| **s)
        .count();
        if set > 1 {
            return Err(RubricError::InvalidMultiCriteriaDefinition(format!(
                "criterion '{}' sets more than one of weight, target_option and score_threshold",
                self.name()
            )));
        }

        if let Some(weight) = self.weight {
            if !(0.0..=1.0).contains(&weight) {
                return Err(RubricError::InvalidMultiCriteriaDefinition(format!(
                    "criterion '{}' has weight {} outside [0, 1]",
                    self.name(),
                    weight
                )));
            }
        }

        match self.policy() {
            AggregationPolicy::TargetOption(target) => {
                if self.criterion.option(&target).is_none() {
                    return Err(RubricError::InvalidMultiCriteriaDefinition(format!(
                        "target option '{}' is not an option of criterion '{}'",
                        target,
                        self.name()
                    )));
                }
            }
            AggregationPolicy::ScoreThreshold(_) | AggregationPolicy::Weighted(_) => {
                if !self.criterion.has_all_scores() {
                    return Err(RubricError::InvalidMultiCriteriaDefinition(format!(
                        "criterion '{}' needs a score on every option",
                        self.name()
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct RawMultiCriteria {
    items: Vec<MultiCriteriaItem>,
}

/// A validated set of criteria evaluated together and reduced to one score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMultiCriteria", into = "RawMultiCriteria")]
pub struct MultiCriteria {
    items: Vec<MultiCriteriaItem>,
    family: PolicyFamily,
}

impl TryFrom<RawMultiCriteria> for MultiCriteria {
    type Error = RubricError;

    fn try_from(raw: RawMultiCriteria) -> Result<Self> {
        MultiCriteria::new(raw.items)
    }
}

impl From<MultiCriteria> for RawMultiCriteria {
    fn from(multi: MultiCriteria) -> Self {
        RawMultiCriteria { items: multi.items }
    }
}

impl MultiCriteria {
    /// Validate and build a multi-criteria set
    pub fn new(mut items: Vec<MultiCriteriaItem>) -> Result<Self> {
        if items.is_empty() {
            return Err(RubricError::InvalidMultiCriteriaDefinition(
                "at least one criterion is required".to_string(),
            ));
        }

        for (index, item) in items.iter_mut().enumerate() {
            if item.criterion.name.trim().is_empty() {
                item.criterion.name = format!("criteria_{}", index);
            }
        }

        let mut names = HashSet::new();
        for item in &items {
            if !names.insert(item.name().to_string()) {
                return Err(RubricError::InvalidMultiCriteriaDefinition(format!(
                    "duplicate criterion name '{}'",
                    item.name()
                )));
            }
            item.validate()?;
        }

        let family = Self::resolve_family(&items)?;

        if family == PolicyFamily::Weighted {
            Self::resolve_weights(&mut items)?;
        }

        Ok(Self { items, family })
    }

    /// Equally weighted Yes/No criteria built from plain descriptions
    pub fn from_descriptions<S: AsRef<str>>(descriptions: &[S]) -> Result<Self> {
        let items = descriptions
            .iter()
            .map(|d| MultiCriteriaItem::new(Criterion::yes_no("", d.as_ref())))
            .collect();
        Self::new(items)
    }

    fn resolve_family(items: &[MultiCriteriaItem]) -> Result<PolicyFamily> {
        let scored: Vec<&MultiCriteriaItem> = if items.iter().any(|i| !i.required) {
            items.iter().filter(|i| !i.required).collect()
        } else {
            items.iter().collect()
        };

        let family = scored[0].policy().family();
        if let Some(mixed) = scored.iter().find(|i| i.policy().family() != family) {
            return Err(RubricError::InvalidMultiCriteriaDefinition(format!(
                "criterion '{}' mixes weighted and pass/fail policies in one set",
                mixed.name()
            )));
        }
        Ok(family)
    }

    fn resolve_weights(items: &mut [MultiCriteriaItem]) -> Result<()> {
        let weighted: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.policy().family() == PolicyFamily::Weighted)
            .map(|(idx, _)| idx)
            .collect();

        let explicit = weighted
            .iter()
            .filter(|&&idx| items[idx].weight.is_some())
            .count();

        if explicit == 0 {
            let share = 1.0 / weighted.len() as f64;
            for &idx in &weighted {
                items[idx].weight = Some(share);
            }
            return Ok(());
        }

        if explicit != weighted.len() {
            return Err(RubricError::InvalidMultiCriteriaDefinition(
                "either every weighted criterion declares a weight or none does".to_string(),
            ));
        }

        let sum: f64 = weighted.iter().filter_map(|&idx| items[idx].weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(RubricError::InvalidMultiCriteriaDefinition(format!(
                "weights must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(())
    }

    pub fn items(&self) -> &[MultiCriteriaItem] {
        &self.items
    }

    pub fn family(&self) -> PolicyFamily {
        self.family
    }

    /// Named criteria, in declaration order, ready to hand to a judge
    pub fn criteria(&self) -> Vec<Criterion> {
        self.items.iter().map(|i| i.criterion.clone()).collect()
    }

    /// Weight applied to an item's score. Gate-only items contribute nothing;
    /// pass/fail items default to 1.0.
    pub fn effective_weight(&self, item: &MultiCriteriaItem) -> f64 {
        if item.policy().family() != self.family {
            return 0.0;
        }
        item.weight.unwrap_or(1.0)
    }
}
