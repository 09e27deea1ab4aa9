//! `{{field}}` template rendering for event titles and descriptions.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

static FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+(?:\.\w+)*)\}\}").expect("valid field pattern"));

/// Substitute `{{dotted.path}}` placeholders with values from `data`.
/// Missing or null values render as the empty string.
pub fn render(template: &str, data: &Value) -> String {
    FIELD
        .replace_all(template, |caps: &Captures| {
            let mut value = data;
            for key in caps[1].split('.') {
                match value.get(key) {
                    Some(v) => value = v,
                    None => return String::new(),
                }
            }
            match value {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_flat_and_nested_fields() {
        let data = json!({
            "full_name": "Ann Lee",
            "estimate": { "square_footage": 480.0 }
        });
        assert_eq!(
            render("{{full_name}} - {{estimate.square_footage}} sf", &data),
            "Ann Lee - 480.0 sf"
        );
    }

    #[test]
    fn missing_fields_render_empty() {
        let data = json!({ "a": { "b": null } });
        assert_eq!(render("[{{a.b}}][{{a.c}}][{{x}}]", &data), "[][][]");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(render("no placeholders here", &json!({})), "no placeholders here");
    }
}
