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

//! Rubricjudge Core
//!
//! Criteria, instances, result records, record schemas and multi-criteria
//! aggregation for rubric-based LLM judging.

pub mod aggregation;
pub mod config;
pub mod criteria;
pub mod error;
pub mod instance;
pub mod multi_criteria;
pub mod results;
pub mod schema;

pub use config::{
    BiasTieBreak, FailurePolicy, InferenceSettings, JudgeSettings, Provider, RepairConfig,
    RubricConfig, DEFAULT_MAX_RETRIES,
};
pub use criteria::{Criterion, CriterionExample, CriterionOption, DEFAULT_EVALUATED_FIELD};
pub use error::{Result, RubricError};
pub use instance::{FieldValue, Instance, SYSTEM_NAMES_KEY};
pub use multi_criteria::{
    AggregationPolicy, MultiCriteria, MultiCriteriaItem, PolicyFamily, WEIGHT_SUM_TOLERANCE,
};
pub use results::{
    DirectInstanceResult, MultiCriteriaDirectInstanceResult, PairwiseInstanceResult,
    PositionalBias, SingleSystemPairwiseResult, GENERATION_FAILED_KEY,
};
pub use schema::{
    direct_result_schema, pairwise_result_schema, FieldKind, FieldSpec, Record, RecordSchema,
    EXPLANATION_FIELD, FEEDBACK_FIELD, SELECTED_OPTION_FIELD, WINNER_FIELD,
};
