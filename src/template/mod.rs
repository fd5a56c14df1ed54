//! # Template Engine
//!
//! `{{field}}` placeholder substitution for per-row instructions.
//!
//! - Whitespace inside the braces is ignored: `{{ name }}` refers to `name`.
//! - Placeholders naming an absent field are kept verbatim.
//! - Substitution is a single left-to-right pass; inserted values are never
//!   scanned for further placeholders.
//! - A placeholder is the innermost `{{...}}` with no braces in its name, so
//!   stray braces around it stay literal: `{{{name}}}` renders as `{Ana}`.
//! - An opening `{{` without a closing `}}` is copied literally.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::models::RowInput;

/// `{{ name }}` with a brace-free name. `None` only if the pattern fails to
/// compile, in which case templates render unchanged.
static PLACEHOLDER_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    match Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}") {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            tracing::error!("Failed to compile placeholder regex: {}", e);
            None
        }
    }
});

fn field_name<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1).map_or("", |name| name.as_str().trim())
}

/// Text inserted for a field value
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitute every `{{name}}` with the row's value for `name`
pub fn render(template: &str, fields: &RowInput) -> String {
    let Some(pattern) = PLACEHOLDER_PATTERN.as_ref() else {
        return template.to_string();
    };

    pattern
        .replace_all(template, |caps: &Captures<'_>| match fields.get(field_name(caps)) {
            Some(value) => stringify(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Field names referenced by the template, in first-appearance order
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for caps in PLACEHOLDER_PATTERN
        .iter()
        .flat_map(|pattern| pattern.captures_iter(template))
    {
        let name = field_name(&caps);
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Referenced field names the row does not provide
pub fn missing_fields<'a>(template: &'a str, fields: &RowInput) -> Vec<&'a str> {
    placeholders(template)
        .into_iter()
        .filter(|name| !fields.contains_key(*name))
        .collect()
}

/// Final prompt as the generation worker builds it: optional context prefix,
/// the rendered instruction, and an optional expected-output hint.
pub fn compose_prompt(
    template: &str,
    fields: &RowInput,
    auxiliary_context: Option<&str>,
    output_fields: Option<&[String]>,
) -> String {
    let mut prompt = String::new();

    if let Some(context) = auxiliary_context.filter(|context| !context.trim().is_empty()) {
        prompt.push_str("Context: ");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }

    prompt.push_str(&render(template, fields));

    if let Some(fields) = output_fields.filter(|fields| !fields.is_empty()) {
        prompt.push_str("\n\nExpected output format: ");
        prompt.push_str(&fields.join(", "));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> RowInput {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_render_substitutes_fields() {
        let fields = row(json!({"name": "Alice", "role": "Engineer"}));
        assert_eq!(
            render("Bio for {{name}}, a {{role}}", &fields),
            "Bio for Alice, a Engineer"
        );
    }

    #[test]
    fn test_render_trims_whitespace_inside_braces() {
        let fields = row(json!({"name": "Alice"}));
        assert_eq!(render("Hi {{ name }}!", &fields), "Hi Alice!");
    }

    #[test]
    fn test_missing_field_left_intact() {
        let fields = row(json!({"name": "Alice"}));
        assert_eq!(render("{{name}} from {{city}}", &fields), "Alice from {{city}}");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let fields = row(json!({"a": "{{b}}", "b": "nope"}));
        assert_eq!(render("{{a}}", &fields), "{{b}}");
    }

    #[test]
    fn test_non_string_values() {
        let fields = row(json!({"n": 42, "ok": true, "none": null, "tags": ["x", "y"]}));
        assert_eq!(
            render("{{n}}|{{ok}}|{{none}}|{{tags}}", &fields),
            "42|true||[\"x\",\"y\"]"
        );
    }

    #[test]
    fn test_unterminated_placeholder_copied_literally() {
        let fields = row(json!({"name": "Alice"}));
        assert_eq!(render("{{name}} and {{oops", &fields), "Alice and {{oops");
        assert_eq!(render("", &fields), "");
        assert_eq!(render("no placeholders", &fields), "no placeholders");
    }

    #[test]
    fn test_placeholder_next_to_stray_braces() {
        let fields = row(json!({"name": "Ana"}));
        assert_eq!(render("{{{name}}}", &fields), "{Ana}");
        assert_eq!(render("{{a {{name}}", &fields), "{{a Ana");
        assert_eq!(render("}}{{name}}{{", &fields), "}}Ana{{");
        assert_eq!(placeholders("{{a {{name}}"), vec!["name"]);
    }

    #[test]
    fn test_placeholders_and_missing_fields() {
        let template = "{{name}} {{ city }} {{name}}";
        assert_eq!(placeholders(template), vec!["name", "city"]);

        let fields = row(json!({"name": "Alice"}));
        assert_eq!(missing_fields(template, &fields), vec!["city"]);
    }

    #[test]
    fn test_compose_prompt() {
        let fields = row(json!({"name": "Alice"}));
        let output_fields = vec!["bio".to_string(), "tagline".to_string()];

        assert_eq!(
            compose_prompt(
                "Write about {{name}}",
                &fields,
                Some("Company directory"),
                Some(output_fields.as_slice())
            ),
            "Context: Company directory\n\nWrite about Alice\n\nExpected output format: bio, tagline"
        );
        assert_eq!(
            compose_prompt("Write about {{name}}", &fields, Some("  "), Some(&[] as &[String])),
            "Write about Alice"
        );
    }
}
