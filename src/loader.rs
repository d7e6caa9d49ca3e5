use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

use crate::models::{Example, SkippedEntry};

/// Valid examples plus the inputs that were rejected
#[derive(Debug, Default)]
pub struct LoadResult {
    pub examples: Vec<Example>,
    pub skipped: Vec<SkippedEntry>,
}

impl LoadResult {
    pub fn input_len(&self) -> usize {
        self.examples.len() + self.skipped.len()
    }
}

/// Load examples from a JSON array file, validating each entry
pub fn load_examples(path: &Path) -> Result<LoadResult> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    let data: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON input: {}", path.display()))?;

    parse_examples(data)
}

fn parse_examples(data: Value) -> Result<LoadResult> {
    let Value::Array(items) = data else {
        bail!("Input must be a JSON array");
    };

    let mut result = LoadResult::default();
    let mut seen_ids = HashSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let example = validate_example(&item).and_then(|example| {
            if seen_ids.insert(example.id.clone()) {
                Ok(example)
            } else {
                Err("Duplicate 'id' value".to_string())
            }
        });

        match example {
            Ok(example) => result.examples.push(example),
            Err(reason) => {
                tracing::warn!(index, reason = %reason, "skipping invalid example");
                result.skipped.push(SkippedEntry::Invalid { index, reason });
            }
        }
    }

    Ok(result)
}

/// Check one input item, returning the reason it is unusable
fn validate_example(item: &Value) -> Result<Example, String> {
    let object = item
        .as_object()
        .ok_or_else(|| "Item is not an object".to_string())?;

    let id = required_str(object, "id")?;
    let ticket = required_str(object, "ticket")?;
    let response = required_str(object, "response")?;
    let model = required_str(object, "model")?;
    let prompt_version = required_str(object, "prompt_version")?;

    Ok(Example {
        id: id.to_string(),
        ticket: ticket.to_string(),
        response: response.to_string(),
        model: model.to_string(),
        prompt_version: prompt_version.to_string(),
    })
}

fn required_str<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a str, String> {
    let value = object
        .get(field)
        .ok_or_else(|| format!("Missing '{}' field", field))?;
    let text = value
        .as_str()
        .ok_or_else(|| format!("'{}' must be a string", field))?;
    if text.trim().is_empty() {
        return Err(format!("'{}' is empty", field));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const REQUIRED_FIELDS: [&str; 5] = ["id", "ticket", "response", "model", "prompt_version"];

    fn valid(id: &str) -> Value {
        json!({
            "id": id,
            "ticket": "TICKET-123",
            "response": "Response",
            "model": "gpt-4",
            "prompt_version": "v1"
        })
    }

    fn reasons(result: &LoadResult) -> Vec<(usize, String)> {
        result
            .skipped
            .iter()
            .map(|s| match s {
                SkippedEntry::Invalid { index, reason } => (*index, reason.clone()),
                other => panic!("unexpected entry: {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_load_valid_examples_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let data = json!([
            {"id": "1", "ticket": "TICKET-123", "response": "Response 1", "model": "gpt-4", "prompt_version": "v1"},
            {"id": "2", "ticket": "TICKET-456", "response": "Response 2", "model": "claude-3", "prompt_version": "v2"}
        ]);
        write!(temp_file, "{}", data).unwrap();

        let result = load_examples(temp_file.path()).unwrap();
        assert_eq!(result.examples.len(), 2);
        assert!(result.skipped.is_empty());
        assert_eq!(result.examples[0].id, "1");
        assert_eq!(result.examples[0].ticket, "TICKET-123");
        assert_eq!(result.examples[0].response, "Response 1");
        assert_eq!(result.examples[0].model, "gpt-4");
        assert_eq!(result.examples[0].prompt_version, "v1");
        assert_eq!(result.examples[1].model, "claude-3");
        assert_eq!(result.examples[1].prompt_version, "v2");
    }

    #[test]
    fn test_reject_non_array_json() {
        let err = parse_examples(valid("1")).unwrap_err();
        assert!(err.to_string().contains("Input must be a JSON array"));
    }

    #[test]
    fn test_reject_malformed_json_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[{{not json").unwrap();

        let err = load_examples(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse JSON input"));
    }

    #[test]
    fn test_skip_items_that_arent_objects() {
        let data = json!([valid("1"), "string item", 123, null, true, ["nested", "array"]]);

        let result = parse_examples(data).unwrap();
        assert_eq!(result.examples.len(), 1);
        let skipped = reasons(&result);
        assert_eq!(skipped.len(), 5);
        for (offset, (index, reason)) in skipped.iter().enumerate() {
            assert_eq!(*index, offset + 1);
            assert_eq!(reason, "Item is not an object");
        }
    }

    #[test]
    fn test_skip_items_missing_required_fields() {
        let mut items = vec![valid("1")];
        for field in REQUIRED_FIELDS {
            let mut item = valid("x");
            item.as_object_mut().unwrap().remove(field);
            items.push(item);
        }

        let result = parse_examples(Value::Array(items)).unwrap();
        assert_eq!(result.examples.len(), 1);
        assert_eq!(
            reasons(&result),
            vec![
                (1, "Missing 'id' field".to_string()),
                (2, "Missing 'ticket' field".to_string()),
                (3, "Missing 'response' field".to_string()),
                (4, "Missing 'model' field".to_string()),
                (5, "Missing 'prompt_version' field".to_string()),
            ]
        );
    }

    #[test]
    fn test_skip_items_with_non_string_fields() {
        let data = json!([
            {"id": 1, "ticket": "T", "response": "R", "model": "gpt-4", "prompt_version": "v1"},
            {"id": "2", "ticket": ["T"], "response": "R", "model": "gpt-4", "prompt_version": "v1"},
            {"id": "3", "ticket": "T", "response": null, "model": "gpt-4", "prompt_version": "v1"},
            {"id": "4", "ticket": "T", "response": "R", "model": 4, "prompt_version": "v1"},
            {"id": "5", "ticket": "T", "response": "R", "model": "gpt-4", "prompt_version": 1.0}
        ]);

        let result = parse_examples(data).unwrap();
        assert!(result.examples.is_empty());
        let skipped: Vec<String> = reasons(&result).into_iter().map(|(_, r)| r).collect();
        assert_eq!(
            skipped,
            vec![
                "'id' must be a string",
                "'ticket' must be a string",
                "'response' must be a string",
                "'model' must be a string",
                "'prompt_version' must be a string",
            ]
        );
    }

    #[test]
    fn test_skip_items_with_empty_or_whitespace_fields() {
        let data = json!([
            {"id": "", "ticket": "T", "response": "R", "model": "gpt-4", "prompt_version": "v1"},
            {"id": "2", "ticket": "   ", "response": "R", "model": "gpt-4", "prompt_version": "v1"},
            {"id": "3", "ticket": "T", "response": "\n\t", "model": "gpt-4", "prompt_version": "v1"},
            {"id": "4", "ticket": "T", "response": "R", "model": "", "prompt_version": "v1"},
            {"id": "5", "ticket": "T", "response": "R", "model": "gpt-4", "prompt_version": " "}
        ]);

        let result = parse_examples(data).unwrap();
        let skipped: Vec<String> = reasons(&result).into_iter().map(|(_, r)| r).collect();
        assert_eq!(
            skipped,
            vec![
                "'id' is empty",
                "'ticket' is empty",
                "'response' is empty",
                "'model' is empty",
                "'prompt_version' is empty",
            ]
        );
    }

    #[test]
    fn test_skip_duplicate_ids() {
        let data = json!([valid("1"), valid("2"), valid("1")]);

        let result = parse_examples(data).unwrap();
        assert_eq!(result.examples.len(), 2);
        assert_eq!(reasons(&result), vec![(2, "Duplicate 'id' value".to_string())]);
    }

    #[test]
    fn test_every_item_accounted_for() {
        let data = json!([valid("1"), 7, valid("2"), {"id": "3"}, valid("1")]);

        let result = parse_examples(data).unwrap();
        assert_eq!(result.input_len(), 5);
        assert_eq!(result.examples.len(), 2);
    }
}
