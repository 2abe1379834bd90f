//! Integration tests for merging, registration and synthesis.

use std::fs;

use serde_json::json;
use tempfile::tempdir;

use trellis_core::{
    merge, merge_all, CheckId, ConstructError, Environment, Fragment, OutputTree, RemovalPolicy, ResourceDeclaration,
    ResourceKind, StackConfig, Suppression, TemplateFormat,
};

fn fragment(value: serde_json::Value) -> Fragment {
    Fragment::from_value(value).unwrap()
}

fn role() -> ResourceDeclaration {
    ResourceDeclaration::new(
        ResourceKind::Role,
        fragment(json!({"AssumeRolePolicyDocument": {"Version": "2012-10-17", "Statement": []}})),
    )
}

#[test]
fn test_merge_with_nothing_is_identity() {
    let defaults = fragment(json!({"versioned": true, "encryption": {"type": "s3-managed"}}));
    assert_eq!(merge(&defaults, None), defaults);
    assert_eq!(merge(&defaults, Some(&Fragment::new())), defaults);
}

#[test]
fn test_override_wins_and_defaults_survive() {
    let defaults = fragment(json!({
        "removalPolicy": "retain",
        "versioned": true,
        "encryption": {"type": "s3-managed", "bucketKey": true}
    }));
    let overrides = fragment(json!({
        "removalPolicy": "destroy",
        "encryption": {"type": "kms"}
    }));

    let merged = merge(&defaults, Some(&overrides));
    assert_eq!(merged.get("removalPolicy"), Some(&json!("destroy")));
    assert_eq!(merged.get("versioned"), Some(&json!(true)));
    assert_eq!(merged.get_path("encryption.type"), Some(&json!("kms")));
    assert_eq!(merged.get_path("encryption.bucketKey"), Some(&json!(true)));

    assert_eq!(defaults.get("removalPolicy"), Some(&json!("retain")));
    assert_eq!(overrides.get("versioned"), None);
}

#[test]
fn test_arrays_replace_and_layers_apply_in_order() {
    let defaults = fragment(json!({"subnets": ["a", "b"], "maxAzs": 2}));
    let first = fragment(json!({"subnets": ["c"], "maxAzs": 3}));
    let second = fragment(json!({"maxAzs": 1}));

    let merged = merge_all(&defaults, [&first, &second]);
    assert_eq!(merged.get("subnets"), Some(&json!(["c"])));
    assert_eq!(merged.get("maxAzs"), Some(&json!(1)));
}

#[test]
fn test_registration_requires_an_assembly() {
    let mut tree = OutputTree::new(StackConfig::new("test"));
    let err = tree.root().register("Role", role()).unwrap_err();
    assert!(err.is_configuration());
    assert!(tree.is_empty());
}

#[test]
fn test_duplicate_ids_collide() {
    let mut tree = OutputTree::new(StackConfig::new("test"));
    let err = tree
        .root()
        .assemble("app", |scope| {
            scope.register("Role", role())?;
            scope.register("Role", role())
        })
        .unwrap_err();

    assert!(matches!(err, ConstructError::NamingCollision { ref id, ref scope } if id == "Role" && scope == "app"));
    assert!(tree.is_aborted());
}

#[test]
fn test_aborted_tree_rejects_further_assemblies() {
    let mut tree = OutputTree::new(StackConfig::new("test"));
    let _ = tree.root().assemble("broken", |scope| {
        scope.register("Role", ResourceDeclaration::new(ResourceKind::Role, Fragment::new()))
    });

    let err = tree
        .root()
        .assemble("next", |scope| scope.register("Role", role()))
        .unwrap_err();
    assert!(matches!(err, ConstructError::AssemblyAborted { ref assembly } if assembly == "broken"));
}

#[test]
fn test_template_roundtrips_through_files() {
    let environment = Environment::new("123456789012", "eu-west-1");
    let mut tree = OutputTree::new(StackConfig::new("files").with_environment(environment));
    tree.root()
        .assemble("app", |scope| {
            let role = scope.register("Role", role())?;
            let policy = ResourceDeclaration::new(
                ResourceKind::Policy,
                fragment(json!({
                    "PolicyDocument": {"Version": "2012-10-17", "Statement": []},
                    "PolicyName": "appPolicy",
                    "Roles": [role.reference()]
                })),
            )
            .with_removal_policy(RemovalPolicy::Retain)
            .with_suppressions(vec![Suppression::new(CheckId::W58, "Scoped elsewhere")?]);
            scope.register("Policy", policy)
        })
        .unwrap();

    let template = tree.synthesize().unwrap();
    let dir = tempdir().unwrap();
    let json_path = dir.path().join("template.json");
    let yaml_path = dir.path().join("template.yaml");
    template.write_to(&json_path, TemplateFormat::Json).unwrap();
    template.write_to(&yaml_path, TemplateFormat::Yaml).unwrap();

    let from_json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    let from_yaml: serde_json::Value = serde_yaml::from_str(&fs::read_to_string(&yaml_path).unwrap()).unwrap();
    assert_eq!(&from_json, template.document());
    assert_eq!(from_json, from_yaml);
    assert_eq!(template.resource_ids(), vec!["appRole", "appPolicy"]);
}

#[test]
fn test_stack_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stack.yaml");
    fs::write(
        &path,
        "name: integ-lambda-s3\ndescription: Integration stack\nenvironment:\n  account: \"123456789012\"\n  region: us-east-1\n",
    )
    .unwrap();

    let config = StackConfig::from_file(&path).unwrap();
    assert_eq!(config.name, "integ-lambda-s3");
    assert_eq!(config.environment.region_value(), json!("us-east-1"));
}
