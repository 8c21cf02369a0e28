//! Lenient parsing of model output into typed values.
//!
//! Models wrap JSON in code fences, reasoning blocks and prose. We take the
//! first balanced JSON object or array and deserialize only that.

use serde::de::DeserializeOwned;

use brandlens_shared::ModelOutput;

/// Drop `<think>…</think>` blocks and markdown code fences.
pub fn strip_wrappers(raw: &str) -> String {
    let mut text = raw.to_string();
    while let Some(start) = text.find("<think>") {
        match text[start..].find("</think>") {
            Some(end) => text.replace_range(start..start + end + "</think>".len(), ""),
            None => {
                text.truncate(start);
                break;
            }
        }
    }
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The first balanced `{…}` or `[…]` in `text`, string-literal aware.
pub fn first_json_value(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse model output into `T`; never fails.
pub fn parse_model_output<T: DeserializeOwned>(raw: &str) -> ModelOutput<T> {
    let cleaned = strip_wrappers(raw);
    let Some(json) = first_json_value(&cleaned) else {
        return ModelOutput::malformed("no JSON value found");
    };
    match serde_json::from_str(json) {
        Ok(value) => ModelOutput::Parsed(value),
        Err(e) => ModelOutput::malformed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        brands: Vec<String>,
    }

    #[test]
    fn finds_first_balanced_object() {
        let text = "Sure! {\"brands\": [\"A\", \"}\"]} and then {\"other\": 1}";
        assert_eq!(first_json_value(text), Some("{\"brands\": [\"A\", \"}\"]}"));
        assert_eq!(first_json_value("[1, [2, 3]] tail"), Some("[1, [2, 3]]"));
        assert_eq!(first_json_value("{\"unterminated\": "), None);
        assert_eq!(first_json_value("{\"a\": [}"), None);
        assert_eq!(first_json_value("no json"), None);
    }

    #[test]
    fn parses_fenced_output() {
        let raw = "<think>consider {brands}</think>\n```json\n{\"brands\": [\"比亚迪\", \"特斯拉\"]}\n```";
        let out: ModelOutput<Payload> = parse_model_output(raw);
        assert_eq!(
            out,
            ModelOutput::Parsed(Payload {
                brands: vec!["比亚迪".into(), "特斯拉".into()]
            })
        );
    }

    #[test]
    fn malformed_output_is_not_an_error() {
        let out: ModelOutput<Payload> = parse_model_output("I could not find any brands.");
        assert!(!out.is_parsed());
        let out: ModelOutput<Payload> = parse_model_output("{\"products\": []}");
        assert!(matches!(out, ModelOutput::Malformed { .. }));
    }
}
