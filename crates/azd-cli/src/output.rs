use std::collections::{BTreeMap, HashMap};

use azd_domain::OutputParameter;
use azd_provisioning::DeploymentPreview;

/// Render predicted changes as an aligned table.
pub fn render_preview(preview: &DeploymentPreview) -> String {
    if preview.changes.is_empty() {
        return "No changes.".to_string();
    }

    let change_width = preview.changes.iter().map(|c| c.change_type.len()).max().unwrap_or(0);
    let type_width = preview.changes.iter().map(|c| c.resource_type.len()).max().unwrap_or(0);

    let mut out = String::from("Resources:\n\n");
    for change in &preview.changes {
        out.push_str(&format!(
            "  {:<cw$} : {:<tw$} : {}\n",
            change.change_type,
            change.resource_type,
            change.name,
            cw = change_width,
            tw = type_width,
        ));
    }
    out
}

/// Outputs sorted by name, one `NAME = value` line each.
pub fn render_outputs(outputs: &HashMap<String, OutputParameter>) -> String {
    if outputs.is_empty() {
        return "No outputs.".to_string();
    }
    let sorted: BTreeMap<&String, &OutputParameter> = outputs.iter().collect();
    let mut out = String::new();
    for (name, output) in sorted {
        out.push_str(&format!("{} = {}\n", name, output.env_value()));
    }
    out
}

/// Values in dotenv form.
pub fn render_env_values(values: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in values {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        out.push_str(&format!("{}=\"{}\"\n", key, escaped));
    }
    out
}

pub fn render_env_list(names: &[String], default: Option<&str>) -> String {
    if names.is_empty() {
        return "No environments.".to_string();
    }
    let width = names.iter().map(String::len).max().unwrap_or(0).max("NAME".len());
    let mut out = format!("{:<width$}  DEFAULT\n", "NAME", width = width);
    for name in names {
        let marker = if Some(name.as_str()) == default { "true" } else { "false" };
        out.push_str(&format!("{:<width$}  {}\n", name, marker, width = width));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use azd_domain::ParameterType;
    use azd_provisioning::PreviewChange;
    use serde_json::json;

    #[test]
    fn preview_columns_are_aligned() {
        let preview = DeploymentPreview {
            status: "Completed".into(),
            changes: vec![
                PreviewChange { change_type: "Create".into(), resource_type: "Resource group".into(), name: "rg-dev".into() },
                PreviewChange { change_type: "Modify".into(), resource_type: "Key Vault".into(), name: "kv-dev".into() },
            ],
        };
        assert_eq!(
            render_preview(&preview),
            "Resources:\n\n  Create : Resource group : rg-dev\n  Modify : Key Vault      : kv-dev\n"
        );
        assert_eq!(render_preview(&DeploymentPreview::default()), "No changes.");
    }

    #[test]
    fn outputs_are_sorted_and_flattened() {
        let outputs = HashMap::from([
            ("WEBURI".to_string(), OutputParameter::new(ParameterType::String, "https://web")),
            ("ALLOWED".to_string(), OutputParameter::new(ParameterType::Array, json!(["a", "b"]))),
        ]);
        assert_eq!(render_outputs(&outputs), "ALLOWED = [\"a\",\"b\"]\nWEBURI = https://web\n");
    }

    #[test]
    fn env_values_escape_quotes() {
        let values = BTreeMap::from([
            ("AZURE_ENV_NAME".to_string(), "dev".to_string()),
            ("JSON".to_string(), "{\"a\":1}".to_string()),
        ]);
        assert_eq!(render_env_values(&values), "AZURE_ENV_NAME=\"dev\"\nJSON=\"{\\\"a\\\":1}\"\n");
    }

    #[test]
    fn env_list_marks_the_default() {
        let names = vec!["dev".to_string(), "production".to_string()];
        assert_eq!(
            render_env_list(&names, Some("dev")),
            "NAME        DEFAULT\ndev         true\nproduction  false\n"
        );
    }
}
