//! Prompt text for the generation ladder

/// Assistant prefill that biases the model toward emitting an object immediately
pub const PRIMER: &str = "{\n";

/// System instructions used when the caller supplies none, and appended otherwise
pub const JSON_SYSTEM_RULES: &str = "You are an expert at generating perfectly formatted JSON.

JSON FORMATTING REQUIREMENTS:
1. Your entire response must be ONLY a valid JSON object, nothing else.
2. Never include explanatory text, markdown, or code blocks.
3. Arrays must be real JSON arrays: [\"item1\", \"item2\"], never \"[\\\"item1\\\", \\\"item2\\\"]\".
4. Objects must be real JSON objects: {\"key\": \"value\"}, never \"{\\\"key\\\": \\\"value\\\"}\".
5. Nested arrays and objects keep proper JSON structure.
6. Every value has the correct type: string, number, boolean, array or object.
7. Check every bracket and comma before answering.";

/// Suffix appended to every prompt
pub const JSON_PROMPT_RULES: &str = "

IMPORTANT JSON FORMATTING RULES:
- Respond with valid JSON only, with no additional text
- Arrays must be JSON arrays, not strings
- Objects must be JSON objects, not strings
- Never stringify nested arrays or objects
- Never include markdown code fences or explanations";

/// Marker that opens the explicit re-ask instructions
pub const REASK_MARKER: &str = "CRITICAL: Your response MUST be a valid JSON object following EXACTLY this structure:";

/// System text for a request: caller text followed by the JSON rules
#[must_use]
pub fn system_text(caller: Option<&str>) -> String {
    match caller.map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) => format!("{text}\n\n{JSON_SYSTEM_RULES}"),
        None => JSON_SYSTEM_RULES.to_string(),
    }
}

/// Prompt with the formatting rules appended
#[must_use]
pub fn formatted_prompt(prompt: &str) -> String {
    format!("{prompt}{JSON_PROMPT_RULES}")
}

/// Prompt for the explicit re-ask rung, embedding an example payload
#[must_use]
pub fn reask_prompt(prompt: &str, example: &str) -> String {
    format!(
        "{prompt}\n\n{REASK_MARKER}\n{example}\n\n\
         Your response must contain ONLY the JSON with NO additional text.\n\
         Do not include ```json or ``` markers.\n\
         All arrays must be proper JSON arrays without quotes around them.\n\
         All fields must have the correct data types."
    )
}

/// Response text with the primer restored when the model continued after it
#[must_use]
pub fn restore_primer(text: &str) -> String {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with("```") {
        text.to_string()
    } else {
        format!("{PRIMER}{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_system_text_keeps_rules() {
        let text = system_text(Some("You are a research analyst."));
        assert!(text.starts_with("You are a research analyst."));
        assert!(text.ends_with(JSON_SYSTEM_RULES));
        assert_eq!(system_text(Some("  ")), JSON_SYSTEM_RULES);
    }

    #[test]
    fn primer_restored_only_when_missing() {
        assert_eq!(restore_primer("\"a\": 1}"), "{\n\"a\": 1}");
        assert_eq!(restore_primer(" {\"a\": 1}"), " {\"a\": 1}");
        assert_eq!(restore_primer("```json\n{}\n```"), "```json\n{}\n```");
    }

    #[test]
    fn reask_embeds_example() {
        let prompt = reask_prompt("Analyze X", "{\"a\": 1}");
        assert!(prompt.contains(REASK_MARKER));
        assert!(prompt.contains("{\"a\": 1}"));
    }
}
