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

//! Judge personas, rendered as the system turn of every judging prompt

use rubricjudge_core::RubricError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    ExperiencedContentEvaluator,
    IndustryExpert,
    CriticalThinker,
    UnbiasedJudge,
    Custom { name: String, description: String },
}

impl Persona {
    pub fn name(&self) -> &str {
        match self {
            Persona::ExperiencedContentEvaluator => "experienced content evaluator",
            Persona::IndustryExpert => "industry expert",
            Persona::CriticalThinker => "critical thinker",
            Persona::UnbiasedJudge => "unbiased judge",
            Persona::Custom { name, .. } => name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Persona::ExperiencedContentEvaluator => {
                "You have reviewed thousands of texts across many genres. You judge \
                 clarity, accuracy and fitness for purpose, and you hold every text to \
                 the same standard."
            }
            Persona::IndustryExpert => {
                "You have deep professional experience in the subject matter of the \
                 text. You notice technical mistakes, outdated practice and claims an \
                 expert would not make."
            }
            Persona::CriticalThinker => {
                "You question every claim and look for gaps in reasoning, unsupported \
                 statements and hidden assumptions before you accept a conclusion."
            }
            Persona::UnbiasedJudge => {
                "You judge strictly against the stated criterion. Length, tone, style \
                 and the order in which options are presented do not influence you."
            }
            Persona::Custom { description, .. } => description,
        }
    }

    /// System preamble for judging prompts
    pub fn preamble(&self) -> String {
        let name = self.name();
        let article = match name.chars().next() {
            Some(c) if "aeiouAEIOU".contains(c) => "an",
            _ => "a",
        };
        format!(
            "You are {} {}. {}\nEvaluate the text you are given against the criterion \
             and report your verdict in the requested format.",
            article,
            name,
            self.description()
        )
    }
}

impl FromStr for Persona {
    type Err = RubricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "experienced_content_evaluator" => Ok(Persona::ExperiencedContentEvaluator),
            "industry_expert" => Ok(Persona::IndustryExpert),
            "critical_thinker" => Ok(Persona::CriticalThinker),
            "unbiased_judge" => Ok(Persona::UnbiasedJudge),
            other => Err(RubricError::Config(format!("unknown persona '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_keys() {
        assert_eq!(
            "critical_thinker".parse::<Persona>().unwrap(),
            Persona::CriticalThinker
        );
        assert_eq!(
            "Industry Expert".parse::<Persona>().unwrap(),
            Persona::IndustryExpert
        );
        assert!("pirate".parse::<Persona>().is_err());
    }

    #[test]
    fn test_preamble_article() {
        assert!(Persona::CriticalThinker
            .preamble()
            .starts_with("You are a critical thinker."));
        assert!(Persona::IndustryExpert
            .preamble()
            .starts_with("You are an industry expert."));
    }

    #[test]
    fn test_custom_persona() {
        let persona = Persona::Custom {
            name: "pediatric nurse".to_string(),
            description: "You care about patient safety above all.".to_string(),
        };
        assert!(persona.preamble().contains("patient safety"));
    }
}
