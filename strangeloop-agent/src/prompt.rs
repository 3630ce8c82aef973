//! Prompt rendering for the decision step.

use serde_json::Value;
use std::fmt::Write;
use strangeloop_runtime::CapabilityMeta;

const DECISION_INSTRUCTIONS: &str = r#"Reply with a single JSON object and nothing else, in exactly one of these forms:

{"action": "use_capability", "capability": "<name>", "arguments": [<positional arguments>], "explanation": "<why>"}
{"action": "create_capability", "description": "<what the new capability must do>", "explanation": "<why>"}
{"action": "direct_response", "response": "<your answer>", "explanation": "<why>"}

Use an existing capability when one fits, passing its arguments in parameter order.
Create a capability only when the request needs a reusable computation none of the listed capabilities provides.
Answer directly when no computation is needed."#;

/// Render the prompt asking the model to pick one action for `request`
pub fn decision_prompt(request: &str, capabilities: &[CapabilityMeta]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are the dispatcher of a command-line agent. Decide how to handle the user's request.\n"
    );
    let _ = writeln!(prompt, "User request:\n{}\n", request.trim());

    prompt.push_str("Available capabilities:\n");
    if capabilities.is_empty() {
        prompt.push_str("(none)\n");
    }
    for meta in capabilities {
        let _ = writeln!(prompt, "- {}", meta.display_signature());
        let summary = meta.summary();
        if !summary.is_empty() {
            let _ = writeln!(prompt, "  {}", summary);
        }
        for param in &meta.signature.params {
            let requirement = match &param.default {
                Some(default) => format!("optional, default {}", default),
                None => "required".to_string(),
            };
            let _ = write!(prompt, "  * {} ({}, {})", param.name, param.param_type, requirement);
            if !param.description.is_empty() {
                let _ = write!(prompt, ": {}", param.description);
            }
            prompt.push('\n');
        }
    }

    prompt.push('\n');
    prompt.push_str(DECISION_INSTRUCTIONS);
    prompt
}

/// The `strangeloop capability run` line equivalent to invoking `name(arguments)`
pub fn run_command(name: &str, arguments: &[Value]) -> String {
    let mut command = format!("strangeloop capability run {}", name);
    for argument in arguments {
        let text = match argument {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        command.push(' ');
        command.push_str(&shell_quote(&text));
    }
    command
}

fn shell_quote(text: &str) -> String {
    let plain = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.,:/=+@%".contains(c));
    if plain {
        text.to_string()
    } else {
        format!("'{}'", text.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strangeloop_runtime::{Origin, Param, ParamType, Signature};

    fn double() -> CapabilityMeta {
        CapabilityMeta {
            name: "double_number".into(),
            signature: Signature::new(vec![
                Param::required("n", ParamType::Int).with_description("the number"),
                Param::optional("factor", ParamType::Int, json!(2)),
            ]),
            documentation: "Doubles a number.\n\nMore text.".into(),
            source: None,
            origin: Origin::Synthesized,
        }
    }

    #[test]
    fn test_decision_prompt_lists_capabilities() {
        let prompt = decision_prompt("double 21", &[double()]);
        assert!(prompt.contains("User request:\ndouble 21"));
        assert!(prompt.contains("- double_number(n: int, factor: int = 2)"));
        assert!(prompt.contains("  Doubles a number."));
        assert!(!prompt.contains("More text."));
        assert!(prompt.contains("* n (int, required): the number"));
        assert!(prompt.contains("* factor (int, optional, default 2)"));
        assert!(prompt.contains("\"action\": \"use_capability\""));
    }

    #[test]
    fn test_decision_prompt_without_capabilities() {
        let prompt = decision_prompt("hi", &[]);
        assert!(prompt.contains("Available capabilities:\n(none)"));
    }

    #[test]
    fn test_run_command_quoting() {
        assert_eq!(
            run_command("double_number", &[json!("21")]),
            "strangeloop capability run double_number 21"
        );
        assert_eq!(
            run_command("greet", &[json!("Ada Lovelace"), json!(3), json!([1, 2])]),
            "strangeloop capability run greet 'Ada Lovelace' 3 '[1,2]'"
        );
        assert_eq!(run_command("quote", &[json!("it's")]), "strangeloop capability run quote 'it'\\''s'");
        assert_eq!(run_command("noop", &[]), "strangeloop capability run noop");
    }
}
