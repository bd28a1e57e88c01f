use std::path::Path;

use azd_config::{find_project_dir, load_project, load_user_config, ConfigError};
use azd_domain::ProviderKind;

fn fixtures() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

#[test]
fn load_valid_fixture() {
    let project = load_project(&fixtures().join("todo-app")).expect("should load without error");
    assert_eq!(project.name, "todo-app");
    assert_eq!(project.infra.provider, Some(ProviderKind::Terraform));
    assert_eq!(project.infra.path, "deploy");
    assert_eq!(project.infra.module, "");

    let platform = project.platform.expect("platform section");
    assert_eq!(platform.kind, "devcenter");
    assert_eq!(platform.config.get_string("name"), Some("contoso-dc"));
    assert_eq!(platform.config.get_string("environmentDefinition"), Some("webapp"));
}

#[test]
fn defaults_apply_after_loading() {
    let project = load_project(&fixtures().join("todo-app")).unwrap();
    let options = project.infra.with_defaults(&[]);
    assert_eq!(options.path, "deploy");
    assert_eq!(options.module, "main");
}

#[test]
fn finds_project_from_nested_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("azure.yaml"), "name: nested\n").unwrap();
    let nested = dir.path().join("src/api");
    std::fs::create_dir_all(&nested).unwrap();

    let found = find_project_dir(&nested).unwrap();
    assert_eq!(found, dir.path());

    let project = load_project(&found).unwrap();
    assert_eq!(project.infra.provider, None);
    assert!(project.platform.is_none());
}

#[test]
fn unknown_provider_is_a_conversion_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("azure.yaml"),
        "name: bad\ninfra:\n  provider: pulumi\n",
    )
    .unwrap();

    match load_project(dir.path()) {
        Err(ConfigError::Conversion { message, .. }) => assert!(message.contains("pulumi")),
        other => panic!("expected conversion error, got {other:?}"),
    }
}

#[test]
fn missing_dir_returns_error() {
    let dir = Path::new("/nonexistent/path/does/not/exist");
    assert!(load_project(dir).is_err());
}

#[test]
fn user_config_loads_and_tolerates_missing_file() {
    let tree = load_user_config(&fixtures().join("user")).unwrap();
    assert_eq!(tree.get_string("defaults.location"), Some("eastus2"));
    assert_eq!(tree.get_string("platform.config.user"), Some("me"));

    let empty = tempfile::tempdir().unwrap();
    assert!(load_user_config(empty.path()).unwrap().is_empty());
}
