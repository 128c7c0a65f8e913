//! Prompt construction for the planning loop.

use cicerone_common::protocol::{PageDetails, Step};

/// Extra guidance appended to `input_text` tool results so the planner
/// fills every required input before submitting a form.
pub const REQUIRED_INPUTS_HINT: &str = "\
Use the required attribute to check if there are other required inputs in the form \
and plan to fill them even if they are not planned in the steps and before you submit the form.
<input> and <button> elements can have a form attribute. Use it to identify which form \
the input belongs to and check for required inputs in the form.";

/// The opening message of a guide session: the task, the planned steps,
/// and the current page state.
pub fn initial_prompt(
    instructions: &str,
    steps: &[Step],
    details: Option<&PageDetails>,
    resumed: bool,
) -> String {
    let planned_steps = steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step.description))
        .collect::<Vec<_>>()
        .join("\n");

    let (url, title, elements) = match details {
        Some(details) => (
            details.url.as_str(),
            details.title.as_str(),
            details.clickable_elements.as_str(),
        ),
        None => ("unknown", "unknown", ""),
    };

    let mut content = format!(
        "Guide the user through the following task by performing the actions yourself.\n\n\
         Instructions:\n{instructions}\n\n\
         Planned steps:\n{planned_steps}\n\n\
         Current URL: {url}\n\
         Current Page Title: {title}\n\
         Interactive Elements:\n{elements}\n\n\
         Report progress through current_state.completed_steps on every action, \
         and finish with a done action once the task is complete."
    );

    if resumed {
        content.push_str(
            "\n\nWe are resuming the guide. Check if the steps are still valid based on \
             the current page elements.",
        );
    }

    content
}

/// Tool result for a successfully executed action: the new page state is
/// the planner's only view of the action's effect.
pub fn action_result(
    action_name: &str,
    value: Option<&str>,
    details: Option<&PageDetails>,
    additional_instructions: &str,
) -> String {
    let (url, title, elements) = match details {
        Some(details) => (
            details.url.as_str(),
            details.title.as_str(),
            details.clickable_elements.as_str(),
        ),
        None => ("unknown", "unknown", ""),
    };

    let mut message = format!("Executed the last action: {action_name}.");
    if let Some(value) = value {
        message.push_str(&format!("\nResult: {value}"));
    }
    message.push_str(&format!(
        "\n\nNow, the current URL is: {url}\nCurrent Page Title: {title}\nElements: {elements}"
    ));
    if !additional_instructions.is_empty() {
        message.push('\n');
        message.push_str(additional_instructions);
    }
    message
}

pub fn action_failure(details: Option<&PageDetails>) -> String {
    let elements = details.map(|d| d.clickable_elements.as_str()).unwrap_or("");
    format!("Failed to execute action. Current elements: {elements}")
}

pub fn action_cancelled(details: Option<&PageDetails>) -> String {
    let elements = details.map(|d| d.clickable_elements.as_str()).unwrap_or("");
    format!("Action cancelled by user. Current elements: {elements}")
}
