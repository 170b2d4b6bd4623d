//! Control-flow nodes: async builds that ask the model a structured question
//! before deciding their subtree.
//!
//! Each node sends a nested response with a JSON-schema-constrained format,
//! parses the structured answer, and hands the validated value to its child
//! function. A choice index outside the declared list is fatal; it is never
//! clamped or retried.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::build::BuildCx;
use crate::client::{ResponseFormat, RespondOptions};
use crate::error::WeftError;
use crate::prompt::Prompt;

/// Boolean question node configuration.
#[derive(Clone)]
pub struct Predicate {
    pub(crate) question: String,
    pub(crate) child: Arc<dyn Fn(bool) -> Option<Prompt> + Send + Sync>,
}

/// Single-choice node configuration.
#[derive(Clone)]
pub struct Select {
    pub(crate) instruction: String,
    pub(crate) choices: Vec<String>,
    pub(crate) child: Arc<dyn Fn(usize) -> Option<Prompt> + Send + Sync>,
}

/// Multiple-choice node configuration.
#[derive(Clone)]
pub struct MultiSelect {
    pub(crate) instruction: String,
    pub(crate) choices: Vec<String>,
    pub(crate) child: Arc<dyn Fn(&[usize]) -> Option<Prompt> + Send + Sync>,
}

#[derive(Deserialize)]
struct PredicateAnswer {
    result: bool,
}

#[derive(Deserialize)]
struct ChoiceAnswer {
    choice: i64,
}

#[derive(Deserialize)]
struct ChoicesAnswer {
    choices: Vec<i64>,
}

fn predicate_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "result": { "type": "boolean" } },
        "required": ["result"],
        "additionalProperties": false,
    })
}

fn choice_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "choice": { "type": "integer" } },
        "required": ["choice"],
        "additionalProperties": false,
    })
}

fn choices_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "choices": { "type": "array", "items": { "type": "integer" } },
        },
        "required": ["choices"],
        "additionalProperties": false,
    })
}

fn structured(name: &str, schema: Value) -> RespondOptions {
    RespondOptions {
        response_format: Some(ResponseFormat::json_schema(name, schema)),
        ..RespondOptions::default()
    }
}

/// Map a raw model-provided index onto the choice list, rejecting anything
/// negative or past the end.
fn resolve_index(raw: i64, count: usize) -> Result<usize, WeftError> {
    usize::try_from(raw)
        .ok()
        .filter(|index| *index < count)
        .ok_or(WeftError::ChoiceOutOfRange { index: raw, count })
}

fn choice_listing(instruction: &str, lead: &str, choices: &[String]) -> Vec<Prompt> {
    let mut lines = vec![Prompt::line(format!("{lead}{instruction}"))];
    for (index, choice) in choices.iter().enumerate() {
        lines.push(Prompt::line(format!("Choice {index}: {choice}")));
    }
    lines
}

pub(crate) async fn build_predicate(
    node: &Predicate,
    cx: &mut BuildCx<'_, '_>,
) -> Result<Option<Prompt>, WeftError> {
    let question = Prompt::user(vec![Prompt::line(format!(
        "Answer this question with true or false: {}",
        node.question
    ))]);
    let completion = cx
        .respond(Some(question), structured("predicate_answer", predicate_schema()))
        .await?;
    let answer: PredicateAnswer = serde_json::from_str(&completion.text())?;
    debug!(result = answer.result, "predicate answered");
    Ok((node.child)(answer.result))
}

pub(crate) async fn build_select(
    node: &Select,
    cx: &mut BuildCx<'_, '_>,
) -> Result<Option<Prompt>, WeftError> {
    let question = Prompt::user(choice_listing(
        &node.instruction,
        "Select exactly one of the following choices according to the instruction: ",
        &node.choices,
    ));
    let completion = cx
        .respond(Some(question), structured("choice_answer", choice_schema()))
        .await?;
    let answer: ChoiceAnswer = serde_json::from_str(&completion.text())?;
    let index = resolve_index(answer.choice, node.choices.len())?;
    debug!(index, "choice selected");
    Ok((node.child)(index))
}

pub(crate) async fn build_multi_select(
    node: &MultiSelect,
    cx: &mut BuildCx<'_, '_>,
) -> Result<Option<Prompt>, WeftError> {
    let question = Prompt::user(choice_listing(
        &node.instruction,
        "Select any number of the following choices according to the instruction: ",
        &node.choices,
    ));
    let completion = cx
        .respond(Some(question), structured("choices_answer", choices_schema()))
        .await?;
    let answer: ChoicesAnswer = serde_json::from_str(&completion.text())?;
    let indices = answer
        .choices
        .into_iter()
        .map(|raw| resolve_index(raw, node.choices.len()))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(selected = indices.len(), "choices selected");
    Ok((node.child)(&indices))
}
