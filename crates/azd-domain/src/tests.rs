#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::config::ConfigTree;
    use crate::options::Options;
    use crate::types::*;

    #[test]
    fn empty_string_counts_as_value() {
        let param = InputParameter {
            param_type: "string".into(),
            default_value: None,
            value: Some(json!("")),
        };
        assert!(param.has_value());
        assert!(!param.has_default_value());

        let unset = InputParameter { param_type: "string".into(), ..Default::default() };
        assert!(!unset.has_value());

        let null = InputParameter { value: Some(Value::Null), ..unset };
        assert!(!null.has_value());
    }

    #[test]
    fn empty_default_counts_as_default() {
        let param = InputParameter {
            param_type: "string".into(),
            default_value: Some(json!("")),
            value: None,
        };
        assert!(param.has_default_value());
    }

    #[test]
    fn merge_into_prefers_other() {
        let mut state = State {
            outputs: [
                ("A".to_string(), OutputParameter::new(ParameterType::String, "old")),
                ("B".to_string(), OutputParameter::new(ParameterType::String, "b")),
            ]
            .into(),
            resources: vec![Resource::new("r1"), Resource::new("r2")],
        };
        let other = State {
            outputs: [
                ("A".to_string(), OutputParameter::new(ParameterType::String, "new")),
                ("C".to_string(), OutputParameter::new(ParameterType::Number, 3)),
            ]
            .into(),
            resources: vec![Resource::new("r2"), Resource::new("r3")],
        };

        state.merge_into(&other);

        assert_eq!(state.outputs.len(), 3);
        assert_eq!(state.outputs["A"].value, json!("new"));
        assert_eq!(state.outputs["B"].value, json!("b"));
        assert_eq!(state.outputs["C"].value, json!(3));
        let ids: Vec<&str> = state.resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r3"]);

        // Merging the same state again changes nothing.
        let snapshot = state.clone();
        state.merge_into(&other);
        assert_eq!(state, snapshot);
    }

    #[test]
    fn number_assignability() {
        let number = ParameterType::Number;
        assert!(!number.is_assignable(&json!(1.5)));
        assert!(number.is_assignable(&json!(1.0)));
        assert!(number.is_assignable(&json!(1)));
        assert!(number.is_assignable(&json!(-7)));
        assert!(number.is_assignable(&json!(u64::MAX)));
        assert!(!number.is_assignable(&json!("1")));

        let parsed_int: Value = serde_json::from_str("1").unwrap();
        let parsed_frac: Value = serde_json::from_str("1.5").unwrap();
        assert!(number.is_assignable(&parsed_int));
        assert!(!number.is_assignable(&parsed_frac));
    }

    #[test]
    fn other_assignability() {
        assert!(ParameterType::Array.is_assignable(&json!([1, 2])));
        assert!(!ParameterType::Array.is_assignable(&json!({})));
        assert!(ParameterType::Boolean.is_assignable(&json!(false)));
        assert!(!ParameterType::Boolean.is_assignable(&json!("false")));
        assert!(ParameterType::Object.is_assignable(&json!({"a": 1})));
        assert!(!ParameterType::Object.is_assignable(&json!([])));
        assert!(ParameterType::String.is_assignable(&json!("")));
        assert!(!ParameterType::String.is_assignable(&json!(1)));
    }

    #[test]
    fn coerce_file_values() {
        assert_eq!(ParameterType::Boolean.coerce_file_value(json!("true")), json!(true));
        assert_eq!(ParameterType::Boolean.coerce_file_value(json!("F")), json!(false));
        assert_eq!(ParameterType::Number.coerce_file_value(json!("42")), json!(42));
        // Failed coercion falls through to the raw value.
        assert_eq!(ParameterType::Boolean.coerce_file_value(json!("nope")), json!("nope"));
        assert_eq!(ParameterType::Number.coerce_file_value(json!("4.2")), json!("4.2"));
        // Non-string values and other types are untouched.
        assert_eq!(ParameterType::Number.coerce_file_value(json!(3)), json!(3));
        assert_eq!(ParameterType::String.coerce_file_value(json!("true")), json!("true"));
    }

    #[test]
    fn arm_type_mapping() {
        assert_eq!(ParameterType::from_arm_type("secureString").unwrap(), ParameterType::String);
        assert_eq!(ParameterType::from_arm_type("securestring").unwrap(), ParameterType::String);
        assert_eq!(ParameterType::from_arm_type("Int").unwrap(), ParameterType::Number);
        assert_eq!(ParameterType::from_arm_type("bool").unwrap(), ParameterType::Boolean);
        assert_eq!(ParameterType::from_arm_type("secureObject").unwrap(), ParameterType::Object);
        assert_eq!(ParameterType::from_arm_type("Array").unwrap(), ParameterType::Array);
        assert!(ParameterType::from_arm_type("float").is_err());
    }

    #[test]
    fn canonical_names_parse_back() {
        for t in [
            ParameterType::String,
            ParameterType::Number,
            ParameterType::Boolean,
            ParameterType::Object,
            ParameterType::Array,
        ] {
            assert_eq!(t.as_str().parse::<ParameterType>().unwrap(), t);
        }
        assert!("Int".parse::<ParameterType>().is_err());
    }

    #[test]
    fn output_env_value_rendering() {
        assert_eq!(OutputParameter::new(ParameterType::String, "x").env_value(), "x");
        assert_eq!(OutputParameter::new(ParameterType::Number, 5).env_value(), "5");
        assert_eq!(OutputParameter::new(ParameterType::Boolean, true).env_value(), "true");
        assert_eq!(
            OutputParameter::new(ParameterType::Array, json!(["a", "b"])).env_value(),
            r#"["a","b"]"#
        );
    }

    #[test]
    fn destroy_options_getters() {
        let opts = DestroyOptions::new(true, false);
        assert!(opts.force());
        assert!(!opts.purge());
    }

    #[test]
    fn provider_kind_parse() {
        assert_eq!("Bicep".parse::<ProviderKind>().unwrap(), ProviderKind::Bicep);
        assert_eq!("devcenter".parse::<ProviderKind>().unwrap(), ProviderKind::DevCenter);
        assert!("pulumi".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::Terraform.to_string(), "terraform");
    }

    #[test]
    fn options_defaults_first_non_empty_wins() {
        let explicit = Options { provider: None, path: "".into(), module: "app".into() };
        let project = Options {
            provider: Some(ProviderKind::Terraform),
            path: "deploy".into(),
            module: "ignored".into(),
        };

        let merged = explicit.with_defaults(&[project]);
        assert_eq!(merged.provider, Some(ProviderKind::Terraform));
        assert_eq!(merged.path, "deploy");
        assert_eq!(merged.module, "app");

        let bare = Options::default().with_defaults(&[]);
        assert_eq!(bare.path, "infra");
        assert_eq!(bare.module, "main");
        assert_eq!(bare.provider, None);
    }

    #[test]
    fn config_tree_set_get_unset() {
        let mut tree = ConfigTree::new();
        tree.set("infra.parameters.location", "westus").unwrap();
        tree.set("infra.parameters.count", 3).unwrap();

        assert_eq!(tree.get("infra.parameters.location"), Some(&json!("westus")));
        assert_eq!(tree.get_string("infra.parameters.location"), Some("westus"));
        assert_eq!(tree.get("infra.parameters.count"), Some(&json!(3)));
        assert!(tree.get("infra.missing").is_none());

        tree.unset("infra.parameters.location").unwrap();
        assert!(tree.get("infra.parameters.location").is_none());
        assert!(tree.get("infra.parameters.count").is_some());

        // Unsetting something that is not there is fine.
        tree.unset("nope.nothing").unwrap();
    }

    #[test]
    fn config_tree_rejects_non_object_parent() {
        let mut tree = ConfigTree::new();
        tree.set("a", "scalar").unwrap();
        assert!(tree.set("a.b", 1).is_err());
        assert!(tree.set("a..b", 1).is_err());
    }

    #[test]
    fn bool_spellings() {
        for yes in ["1", "t", "T", "true", "TRUE", "True"] {
            assert_eq!(parse_bool(yes), Some(true), "{yes}");
        }
        for no in ["0", "f", "F", "false", "FALSE", "False"] {
            assert_eq!(parse_bool(no), Some(false), "{no}");
        }
        assert_eq!(parse_bool("yes"), None);
        assert_eq!(parse_bool("tRUE"), None);
    }
}
