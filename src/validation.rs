//! Step validation against a runner
//!
//! Every distinct step text is sent once as a `StepValidateRequest`; steps the
//! runner cannot resolve become build errors of the scenarios using them.

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::errors::ParseError;
use crate::models::{BuildErrors, SpecCollection, Step};
use crate::runner::{Message, Runner, ValidationErrorType};

fn describe(error_type: Option<ValidationErrorType>, message: Option<String>) -> String {
    let kind = match error_type {
        Some(ValidationErrorType::StepImplementationNotFound) | None => "Step implementation not found",
        Some(ValidationErrorType::DuplicateStepImplementation) => "Duplicate step implementation",
    };
    match message.filter(|m| !m.is_empty()) {
        Some(message) => format!("{kind}: {message}"),
        None => kind.to_string(),
    }
}

pub async fn validate_steps(runner: &dyn Runner, specs: &SpecCollection) -> BuildErrors {
    let texts: BTreeSet<&str> = specs
        .iter()
        .flat_map(|spec| spec.scenarios.iter())
        .flat_map(|sc| sc.steps.iter())
        .flat_map(|item| item.flatten())
        .map(|step| step.text.as_str())
        .collect();

    let mut invalid: HashMap<&str, String> = HashMap::new();
    for text in texts {
        let response = runner
            .execute_message_with_timeout(Message::StepValidateRequest {
                step_text: text.to_string(),
            })
            .await;
        match response {
            Ok(Message::StepValidateResponse { is_valid: true, .. }) => {}
            Ok(Message::StepValidateResponse {
                error_type,
                error_message,
                ..
            }) => {
                invalid.insert(text, describe(error_type, error_message));
            }
            Ok(other) => {
                invalid.insert(text, format!("unexpected {} from runner", other.kind()));
            }
            Err(err) => {
                invalid.insert(text, format!("could not validate step: {err}"));
            }
        }
    }
    debug!("{} step(s) failed validation", invalid.len());

    let mut errors = BuildErrors::new();
    for spec in specs.iter() {
        for scenario in &spec.scenarios {
            let steps: Vec<&Step> = scenario.steps.iter().flat_map(|i| i.flatten()).collect();
            for step in steps {
                if let Some(reason) = invalid.get(step.text.as_str()) {
                    warn!("{}:{} {}", spec.file_name, step.line, reason);
                    errors.add_scenario_error(
                        spec.file_name.clone(),
                        scenario.line,
                        ParseError::new(spec.file_name.clone(), step.line, reason.clone(), step.text.clone()),
                    );
                }
            }
        }
    }
    errors
}
