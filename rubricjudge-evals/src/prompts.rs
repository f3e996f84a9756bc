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

//! Prompt templates for direct and pairwise judging
//!
//! Options are rendered in the order the criterion declares them. The bias
//! pass reverses them by passing a reversed criterion, never by shuffling.

use crate::llm_client::{Prompt, JSON_SCHEMA_CONSTRAINT};
use crate::persona::Persona;
use rubricjudge_core::{Criterion, FieldValue, Instance, RecordSchema, Result};

/// Prompt asking for a verdict on one instance under one criterion
pub fn direct_prompt(
    criterion: &Criterion,
    instance: &Instance,
    persona: Option<&Persona>,
    schema: &RecordSchema,
) -> Result<Prompt> {
    let evaluated = criterion.evaluated_value(instance)?;
    let context = criterion.resolve_context(instance)?;

    let mut text = String::from(
        "You will assess a text against the criterion below and choose the option \
         that best describes it.\n\n",
    );
    text.push_str(&criterion_block(criterion));

    if !criterion.examples.is_empty() {
        text.push_str("### Examples\n");
        for (i, example) in criterion.examples.iter().enumerate() {
            text.push_str(&format!("Example {}:\n", i + 1));
            let shown = criterion.resolve_context(&example.instance).unwrap_or_default();
            text.push_str(&context_lines(&shown));
            if let Some(value) = example.instance.get(criterion.evaluated_field()) {
                text.push_str(&format!("Text: {}\n", value.render()));
            }
            text.push_str(&format!("Verdict: {}\n\n", example.expected_verdict));
        }
    }

    if !context.is_empty() {
        text.push_str("### Context\n");
        text.push_str(&context_lines(&context));
        text.push('\n');
    }

    text.push_str(&format!(
        "### Text to evaluate ({})\n{}\n\n",
        criterion.evaluated_field(),
        evaluated.render()
    ));
    text.push_str("### Output format\n");
    text.push_str(&schema.format_instructions());

    Ok(finish(Prompt::text(text), persona, schema))
}

/// Prompt comparing two responses under one criterion
///
/// `first` is shown as "Response 1" and `second` as "Response 2"; the
/// pairwise schema's `winner` field refers to those labels.
pub fn pairwise_prompt(
    criterion: &Criterion,
    context: &[(String, &FieldValue)],
    first: &str,
    second: &str,
    persona: Option<&Persona>,
    schema: &RecordSchema,
) -> Prompt {
    let mut text = String::from(
        "You will compare two responses against the criterion below and decide \
         which one satisfies it better.\n\n",
    );
    text.push_str(&criterion_block(criterion));

    if !context.is_empty() {
        text.push_str("### Context\n");
        text.push_str(&context_lines(context));
        text.push('\n');
    }

    text.push_str(&format!("### Response 1\n{}\n\n", first));
    text.push_str(&format!("### Response 2\n{}\n\n", second));
    text.push_str("### Output format\n");
    text.push_str(&schema.format_instructions());

    finish(Prompt::text(text), persona, schema)
}

fn criterion_block(criterion: &Criterion) -> String {
    let mut block = format!(
        "### Criterion: {}\n{}\n\n",
        criterion.name, criterion.description
    );
    if !criterion.options.is_empty() {
        block.push_str("### Options\n");
        for option in &criterion.options {
            block.push_str(&format!("- \"{}\": {}\n", option.name, option.description));
        }
        block.push('\n');
    }
    block
}

fn context_lines(context: &[(String, &FieldValue)]) -> String {
    context
        .iter()
        .map(|(name, value)| format!("{}: {}\n", name, value.render()))
        .collect()
}

fn finish(prompt: Prompt, persona: Option<&Persona>, schema: &RecordSchema) -> Prompt {
    let prompt = prompt.with_constraint(JSON_SCHEMA_CONSTRAINT, schema.to_json_schema());
    match persona {
        Some(persona) => prompt.with_system(persona.preamble()),
        None => prompt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::Role;
    use rubricjudge_core::{direct_result_schema, CriterionOption, RubricError};

    fn criterion() -> Criterion {
        Criterion::new("accuracy", "Is the answer factually correct?").with_options(vec![
            CriterionOption::new("Good", "Correct").with_score(1.0),
            CriterionOption::new("Bad", "Incorrect").with_score(0.0),
        ])
    }

    #[test]
    fn test_options_in_declaration_order() {
        let c = criterion();
        let instance = Instance::response("Buenos Aires is the capital of Argentina");
        let prompt = direct_prompt(&c, &instance, None, &direct_result_schema(&c)).unwrap();
        let text = prompt.user_text();
        assert!(text.find("\"Good\"").unwrap() < text.find("\"Bad\"").unwrap());
        assert!(text.contains("Buenos Aires"));
        assert!(!text.contains("### Context"));

        let reversed = c.reversed_options();
        let prompt = direct_prompt(&reversed, &instance, None, &direct_result_schema(&reversed))
            .unwrap();
        let text = prompt.user_text();
        assert!(text.find("- \"Bad\"").unwrap() < text.find("- \"Good\"").unwrap());
    }

    #[test]
    fn test_context_policy() {
        let instance = Instance::response("Paris")
            .with_field("question", "Capital of France?")
            .with_field("source", "Atlas");
        let all = criterion();
        let text = direct_prompt(&all, &instance, None, &direct_result_schema(&all))
            .unwrap()
            .user_text()
            .to_string();
        assert!(text.contains("question: Capital of France?"));
        assert!(text.contains("source: Atlas"));

        let none = criterion().with_context_fields(vec![]);
        let text = direct_prompt(&none, &instance, None, &direct_result_schema(&none))
            .unwrap()
            .user_text()
            .to_string();
        assert!(!text.contains("### Context"));

        let missing = criterion().with_context_fields(vec!["reference".to_string()]);
        let err = direct_prompt(&missing, &instance, None, &direct_result_schema(&missing))
            .unwrap_err();
        assert!(matches!(err, RubricError::SchemaMismatch(_)));
    }

    #[test]
    fn test_persona_and_examples() {
        let c = criterion().with_example(Instance::response("Lyon is the capital of France"), "Bad");
        let prompt = direct_prompt(
            &c,
            &Instance::response("Paris"),
            Some(&Persona::UnbiasedJudge),
            &direct_result_schema(&c),
        )
        .unwrap();

        assert_eq!(prompt.messages[0].role, Role::System);
        assert!(prompt.messages[0].content.contains("unbiased judge"));
        assert!(prompt.user_text().contains("Text: Lyon is the capital of France"));
        assert!(prompt.user_text().contains("Verdict: Bad"));
        assert!(prompt.constraints.contains_key(JSON_SCHEMA_CONSTRAINT));
    }
}
