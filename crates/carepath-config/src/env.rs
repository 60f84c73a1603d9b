use std::sync::LazyLock;

use regex::{Captures, Regex};

/// `{{ env.NAME }}` or `{{ env.NAME | default("value") }}`
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
});

/// Expand environment placeholders in raw config text
///
/// Comment lines are copied verbatim so commented-out secrets never have
/// to be present in the environment.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut lines = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
        } else {
            lines.push(expand_line(line)?);
        }
    }

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn expand_line(line: &str) -> Result<String, String> {
    let mut expanded = String::with_capacity(line.len());
    let mut cursor = 0;

    for captures in PLACEHOLDER.captures_iter(line) {
        let Some(whole) = captures.get(0) else { continue };
        expanded.push_str(&line[cursor..whole.start()]);
        expanded.push_str(&resolve(&captures)?);
        cursor = whole.end();
    }

    expanded.push_str(&line[cursor..]);
    Ok(expanded)
}

fn resolve(captures: &Captures<'_>) -> Result<String, String> {
    let key = captures.get(1).map_or("", |m| m.as_str());
    let fallback = captures.get(2).map(|m| m.as_str());

    let Some(name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(name), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(fallback)) => Ok(fallback.to_string()),
        (Err(_), None) => Err(format!("environment variable not found: `{name}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "listen_address = \"0.0.0.0:8080\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn expands_api_key() {
        temp_env::with_var("CAREPATH_TEST_KEY", Some("sk-test"), || {
            let result = expand_env("api_key = \"{{ env.CAREPATH_TEST_KEY }}\"").unwrap();
            assert_eq!(result, "api_key = \"sk-test\"");
        });
    }

    #[test]
    fn expands_several_placeholders_on_one_line() {
        let vars = [("CP_HOST", Some("localhost")), ("CP_PORT", Some("11434"))];
        temp_env::with_vars(vars, || {
            let result = expand_env("base_url = \"http://{{ env.CP_HOST }}:{{ env.CP_PORT }}\"").unwrap();
            assert_eq!(result, "base_url = \"http://localhost:11434\"");
        });
    }

    #[test]
    fn missing_variable_is_an_error() {
        temp_env::with_var_unset("CP_MISSING", || {
            let err = expand_env("api_key = \"{{ env.CP_MISSING }}\"").unwrap_err();
            assert!(err.contains("CP_MISSING"));
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("CP_MODEL", || {
            let result = expand_env("model = \"{{ env.CP_MODEL | default(\"medgemma:27b\") }}\"").unwrap();
            assert_eq!(result, "model = \"medgemma:27b\"");
        });
        temp_env::with_var("CP_MODEL", Some("llama3"), || {
            let result = expand_env("model = \"{{ env.CP_MODEL | default(\"medgemma:27b\") }}\"").unwrap();
            assert_eq!(result, "model = \"llama3\"");
        });
    }

    #[test]
    fn rejects_non_env_scope() {
        let err = expand_env("key = \"{{ vault.SECRET }}\"").unwrap_err();
        assert!(err.contains("only variables scoped with 'env.'"));

        let err = expand_env("key = \"{{ env.A.B }}\"").unwrap_err();
        assert!(err.contains("env.A.B"));
    }

    #[test]
    fn comment_lines_are_left_alone() {
        temp_env::with_var_unset("CP_COMMENTED", || {
            let input = "  # api_key = \"{{ env.CP_COMMENTED }}\"\nname = \"x\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }
}
