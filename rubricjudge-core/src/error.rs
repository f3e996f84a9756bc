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

//! Error taxonomy shared by every judging component
//!
//! Structural errors (`SchemaMismatch`, `InvalidCriterion`,
//! `InvalidMultiCriteriaDefinition`, `MissingCriterionResult`) are raised
//! immediately. Generation errors are recovered by the repair loop and only
//! surface as `GenerationRepairExhausted` under the `raise` failure policy.

use thiserror::Error;

/// Errors that can occur while judging or aggregating
#[derive(Debug, Error)]
pub enum RubricError {
    /// An instance lacks a field the criterion requires
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A criterion definition is malformed (e.g. duplicate option names)
    #[error("Invalid criterion '{criterion}': {reason}")]
    InvalidCriterion { criterion: String, reason: String },

    /// Model output could not be coerced into a valid record
    #[error(
        "Generation repair exhausted for item {index} after {attempts} repair rounds. \
         Original output: {original_output:?}. Last attempt: {last_attempt:?}. \
         Parser error: {parser_error}"
    )]
    GenerationRepairExhausted {
        index: usize,
        attempts: u32,
        original_output: String,
        last_attempt: String,
        parser_error: String,
    },

    /// The aggregator was given no result for a declared criterion
    #[error("Missing result for criterion '{0}'")]
    MissingCriterionResult(String),

    /// Construction-time validation of a multi-criteria set failed
    #[error("Invalid multi-criteria definition: {0}")]
    InvalidMultiCriteriaDefinition(String),

    /// The inference collaborator failed for a whole batch
    #[error("Inference collaborator failure: {0}")]
    CollaboratorFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RubricError>;

impl RubricError {
    /// Whether this error reflects a caller programming error rather than
    /// a transient model issue
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            RubricError::SchemaMismatch(_)
                | RubricError::InvalidCriterion { .. }
                | RubricError::MissingCriterionResult(_)
                | RubricError::InvalidMultiCriteriaDefinition(_)
                | RubricError::InvalidInput(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_exhausted_message_names_outputs() {
        let err = RubricError::GenerationRepairExhausted {
            index: 2,
            attempts: 3,
            original_output: "{\"selected_option\": \"Maybe\"".to_string(),
            last_attempt: "still broken".to_string(),
            parser_error: "EOF while parsing".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("item 2"));
        assert!(message.contains("still broken"));
        assert!(message.contains("EOF while parsing"));
        assert!(!err.is_structural());
    }

    #[test]
    fn test_structural_errors() {
        assert!(RubricError::SchemaMismatch("response".into()).is_structural());
        assert!(RubricError::MissingCriterionResult("clarity".into()).is_structural());
        assert!(!RubricError::CollaboratorFailure("timeout".into()).is_structural());
    }
}
