use std::sync::OnceLock;

use regex::{Captures, Regex};

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid reference pattern"))
}

/// Replace every `${NAME}` in `input` with `lookup(NAME)`. Names the lookup
/// does not know expand to the empty string.
pub fn substitute<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    pattern()
        .replace_all(input, |caps: &Captures<'_>| lookup(&caps[1]).unwrap_or_default())
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "AZURE_LOCATION" => Some("eastus2".into()),
            "AZURE_ENV_NAME" => Some("dev".into()),
            _ => None,
        }
    }

    #[test]
    fn expands_known_names() {
        let out = substitute(r#"{"location": {"value": "${AZURE_LOCATION}"}, "name": "${AZURE_ENV_NAME}-rg"}"#, lookup);
        assert_eq!(out, r#"{"location": {"value": "eastus2"}, "name": "dev-rg"}"#);
    }

    #[test]
    fn unknown_names_become_empty() {
        assert_eq!(substitute("x=${NOPE};", lookup), "x=;");
    }

    #[test]
    fn leaves_other_dollar_forms_alone() {
        assert_eq!(substitute("$AZURE_LOCATION ${1BAD} $${", lookup), "$AZURE_LOCATION ${1BAD} $${");
    }
}
