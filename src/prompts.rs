//! Prompt assembly for the two generation calls.

/// Grounding prompt for the revision call: role preamble, the retrieved
/// guideline context, the user's code, and an output constraint so the
/// response is directly usable as code.
pub fn revise_prompt(instruction: &str, code: &str, guidelines: &str) -> String {
    format!(
        "You are a web accessibility expert. Using the web content \
accessibility guidelines below, revise the HTML code the user provided \
according to this request: '{instruction}'.

Web content accessibility guidelines:
{guidelines}

User-provided code:
{code}

Respond with the revised code only."
    )
}

/// Second prompt: contrast the original and revised snippets and ask for a
/// short summary of what changed.
pub fn explain_prompt(original_code: &str, revised_code: &str) -> String {
    format!(
        "Here is the code the user originally provided:

Original code:
{original_code}

And here is the revised code:

Revised code:
{revised_code}

Briefly explain the changes that were made."
    )
}
