//! Prompt template handling
//!
//! A template is plain text with three recognised placeholders:
//! `${targetComponentPath}`, `${screenshotPath}` and `${userMessage}`.
//! Substitution is a single literal pass, so placeholder-looking text inside
//! the substituted values is left alone.

use serde::Serialize;

pub const TARGET_COMPONENT_PATH: &str = "targetComponentPath";
pub const SCREENSHOT_PATH: &str = "screenshotPath";
pub const USER_MESSAGE: &str = "userMessage";

const PLACEHOLDERS: [&str; 3] = [TARGET_COMPONENT_PATH, SCREENSHOT_PATH, USER_MESSAGE];

const SYSTEM_PROMPT: &str = r#"
Context:

The React component being edited is located at: ${targetComponentPath}
The annotated screenshot of the React component is located at: ${screenshotPath}
Additional context from the user: "${userMessage}"

Main rules:

* Please make direct changes to the code files based on what you see in the screenshot and the additional context from the user (if any).
* Do not make changes outside of the current working directory.
* Do not just suggest changes - actually implement them.
* The annotations in the screenshot are low-fidelity and intended to communicate changes, so don't reproduce them exactly. For example, there may be arrows or text that show what changes are desired. The color of the annotations are always red, but that doesn't mean you should make the changes red.
* Once you make the changes, reply with a summary of the changes in a single paragraph with no special formatting.

Specific instructions:
"#;

/// A named built-in template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptPreset {
    pub name: &'static str,
    pub template: String,
}

/// The built-in templates offered to the client
pub fn presets() -> Vec<PromptPreset> {
    [
        (
            "Add component",
            "Add new component(s) to the code as needed. Optimize for modularity and reusability.",
        ),
        (
            "Remove component",
            "Remove the specified component(s) from the code as needed.",
        ),
        (
            "Edit component",
            "Edit the specified component(s) in the code as needed. Prefer changes to the existing code or direct imports rather than creating new files or editing files unrelated to or upstream of the existing component(s).",
        ),
        (
            "Adjust layout",
            "Adjust the layout of the page and components in the code as needed.",
        ),
    ]
    .into_iter()
    .map(|(name, instructions)| PromptPreset {
        name,
        template: format!("{}\n{}", SYSTEM_PROMPT, instructions),
    })
    .collect()
}

/// Template used when the client sends an empty one
pub fn default_template() -> String {
    format!(
        "{}\nEdit the specified component(s) in the code as needed.",
        SYSTEM_PROMPT
    )
}

/// Values substituted into a template
#[derive(Debug, Clone, Copy)]
pub struct PromptVars<'a> {
    pub target_component_path: &'a str,
    pub screenshot_path: &'a str,
    pub user_message: &'a str,
}

impl PromptVars<'_> {
    fn get(&self, name: &str) -> Option<&str> {
        match name {
            TARGET_COMPONENT_PATH => Some(self.target_component_path),
            SCREENSHOT_PATH => Some(self.screenshot_path),
            USER_MESSAGE => Some(self.user_message),
            _ => None,
        }
    }
}

/// Piece of a parsed template
#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>, String> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| "unterminated placeholder '${'".to_string())?;
        let name = &after[..end];
        if !PLACEHOLDERS.contains(&name) {
            return Err(format!(
                "unknown placeholder '${{{}}}' (expected one of {})",
                name,
                PLACEHOLDERS
                    .iter()
                    .map(|p| format!("${{{}}}", p))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        segments.push(Segment::Placeholder(name));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    Ok(segments)
}

/// Check that every `${...}` in the template is a known, terminated placeholder
pub fn validate_template(template: &str) -> Result<(), String> {
    parse(template).map(|_| ())
}

/// Substitute the placeholders, falling back to the default template when empty
pub fn render(template: &str, vars: &PromptVars<'_>) -> Result<String, String> {
    let owned_default;
    let template = if template.trim().is_empty() {
        owned_default = default_template();
        owned_default.as_str()
    } else {
        template
    };

    let mut out = String::with_capacity(template.len() + 256);
    for segment in parse(template)? {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Placeholder(name) => out.push_str(vars.get(name).unwrap_or_default()),
        }
    }
    Ok(out)
}
