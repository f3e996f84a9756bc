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

//! Judge implementations

pub mod direct;
pub mod pairwise;

pub use direct::DirectJudge;
pub use pairwise::PairwiseJudge;

use async_trait::async_trait;
use rubricjudge_core::{Criterion, Instance, Result, RubricError};
use serde::{Deserialize, Serialize};

/// Something that turns instances and criteria into typed verdicts
#[async_trait]
pub trait Judge: Send + Sync {
    type Output: Send;

    /// Unique identifier for this judge (e.g., "direct_v1")
    fn id(&self) -> &str;

    /// Judge every instance
    ///
    /// `criteria` holds either a single criterion applied to every instance
    /// or exactly one criterion per instance.
    async fn evaluate(
        &self,
        instances: &[Instance],
        criteria: &[Criterion],
    ) -> Result<Vec<Self::Output>>;

    fn metadata(&self) -> JudgeMetadata;
}

/// Metadata about a judge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Engine serving the judge's inference calls
    pub engine: String,
    /// Extra inference passes per instance, e.g. the bias check
    pub passes: u32,
}

/// Pair each instance with its criterion
pub(crate) fn pair_criteria<'a>(
    instances: &'a [Instance],
    criteria: &'a [Criterion],
) -> Result<Vec<(&'a Instance, &'a Criterion)>> {
    match criteria.len() {
        1 => Ok(instances.iter().map(|i| (i, &criteria[0])).collect()),
        n if n == instances.len() => Ok(instances.iter().zip(criteria.iter()).collect()),
        n => Err(RubricError::InvalidInput(format!(
            "expected 1 or {} criteria, got {}",
            instances.len(),
            n
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_criteria() {
        let instances = vec![Instance::response("a"), Instance::response("b")];
        let one = vec![Criterion::yes_no("c", "d")];
        assert_eq!(pair_criteria(&instances, &one).unwrap().len(), 2);

        let two = vec![Criterion::yes_no("c1", "d"), Criterion::yes_no("c2", "d")];
        let pairs = pair_criteria(&instances, &two).unwrap();
        assert_eq!(pairs[1].1.name, "c2");

        let three = vec![Criterion::yes_no("c", "d"); 3];
        assert!(matches!(
            pair_criteria(&instances, &three),
            Err(RubricError::InvalidInput(_))
        ));
        assert!(pair_criteria(&instances, &[]).is_err());
    }
}
