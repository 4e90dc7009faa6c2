use std::{collections::HashMap, time::Duration};

use serde_json::Value;

use crate::models::retry::RetryConfig;

/// Replaces every `{{name}}` token with its binding. Tokens without a binding are
/// left verbatim.
pub fn render_template(template: &str, variables: &HashMap<String, Value>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        rendered.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(end) = after_open.find("}}") else {
            rendered.push_str(&rest[start..]);
            rest = "";
            break;
        };

        let name = after_open[..end].trim();
        match variables.get(name) {
            Some(value) => rendered.push_str(&variable_to_string(value)),
            None => rendered.push_str(&rest[start..start + end + 4]),
        }

        rest = &after_open[end + 2..];
    }

    rendered.push_str(rest);
    rendered
}

fn variable_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Exponential delay with jitter for the given zero-based attempt, capped at
/// `max_delay_ms`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponential = config
        .initial_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    let jitter = exponential / 2;

    let randomized = if jitter > 0 {
        exponential - jitter + rand::random_range(0..jitter)
    } else {
        exponential
    };

    Duration::from_millis(randomized.min(config.max_delay_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tokens_with_inner_whitespace_are_replaced() {
        let variables = HashMap::from([("name".to_string(), json!("Ann"))]);

        assert_eq!(render_template("Hi {{ name }}!", &variables), "Hi Ann!");
    }

    #[test]
    fn test_unterminated_token_is_kept() {
        let variables = HashMap::from([("name".to_string(), json!("Ann"))]);

        assert_eq!(render_template("Hi {{name", &variables), "Hi {{name");
    }

    #[test]
    fn test_non_string_bindings_are_stringified() {
        let variables = HashMap::from([
            ("count".to_string(), json!(3)),
            ("urgent".to_string(), json!(true)),
            ("missing".to_string(), Value::Null),
        ]);

        assert_eq!(
            render_template("{{count}} items, urgent={{urgent}}, [{{missing}}]", &variables),
            "3 items, urgent=true, []"
        );
    }

    #[test]
    fn test_zero_base_delay_stays_zero() {
        let config = RetryConfig {
            initial_delay_ms: 0,
            ..RetryConfig::default()
        };

        assert_eq!(backoff_delay(&config, 4), Duration::ZERO);
    }
}
