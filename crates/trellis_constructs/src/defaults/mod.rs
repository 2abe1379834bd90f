//! Default profiles.
//!
//! Every resource family has one or more named variants producing a canonical
//! default fragment. Factories are pure: the same [`DefaultContext`] always
//! yields the same fragment, and nothing time-based or random goes in.

mod cache;
mod catalog;
mod compute;
mod network;
mod security_group;
mod storage;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use trellis_core::{ConstructError, ConstructResult, Environment, Fragment};

use crate::builders::catalog::Column;

pub use cache::default_cache_port;
pub use catalog::STREAM_NAME;
pub use network::enforced_network_layer;

/// Families that carry default profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileFamily {
    Storage,
    Network,
    SecurityGroup,
    Cache,
    CatalogDatabase,
    CatalogTable,
    Compute,
}

impl ProfileFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileFamily::Storage => "storage",
            ProfileFamily::Network => "network",
            ProfileFamily::SecurityGroup => "security-group",
            ProfileFamily::Cache => "cache",
            ProfileFamily::CatalogDatabase => "catalog-database",
            ProfileFamily::CatalogTable => "catalog-table",
            ProfileFamily::Compute => "compute",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "storage" => Some(ProfileFamily::Storage),
            "network" => Some(ProfileFamily::Network),
            "security-group" => Some(ProfileFamily::SecurityGroup),
            "cache" => Some(ProfileFamily::Cache),
            "catalog-database" => Some(ProfileFamily::CatalogDatabase),
            "catalog-table" => Some(ProfileFamily::CatalogTable),
            "compute" => Some(ProfileFamily::Compute),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProfileFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inputs a catalog table profile needs on top of the environment.
#[derive(Debug, Clone)]
pub struct CatalogContext<'a> {
    pub catalog_id: Value,
    pub database_name: Value,
    pub columns: &'a [Column],
    pub parameters: &'a BTreeMap<String, String>,
}

/// Context handed to every default factory.
#[derive(Debug, Clone)]
pub struct DefaultContext<'a> {
    pub environment: &'a Environment,
    /// Construct id used for generated names.
    pub name: &'a str,
    pub catalog: Option<CatalogContext<'a>>,
}

impl<'a> DefaultContext<'a> {
    pub fn new(environment: &'a Environment, name: &'a str) -> Self {
        Self {
            environment,
            name,
            catalog: None,
        }
    }

    pub fn with_catalog(mut self, catalog: CatalogContext<'a>) -> Self {
        self.catalog = Some(catalog);
        self
    }
}

type Factory = fn(&DefaultContext<'_>) -> ConstructResult<Fragment>;

/// A named, versioned default template bound to a family.
pub struct DefaultProfile {
    pub family: ProfileFamily,
    pub variant: &'static str,
    pub version: &'static str,
    /// Used when no variant is requested.
    pub is_default: bool,
    pub description: &'static str,
    factory: Factory,
}

impl DefaultProfile {
    pub fn fragment(&self, ctx: &DefaultContext<'_>) -> ConstructResult<Fragment> {
        (self.factory)(ctx)
    }
}

impl std::fmt::Debug for DefaultProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultProfile")
            .field("family", &self.family)
            .field("variant", &self.variant)
            .field("version", &self.version)
            .field("is_default", &self.is_default)
            .finish()
    }
}

static PROFILES: &[DefaultProfile] = &[
    DefaultProfile {
        family: ProfileFamily::Storage,
        variant: "secure",
        version: "1",
        is_default: true,
        description: "Encrypted, versioned bucket with public access blocked and access logging",
        factory: storage::secure,
    },
    DefaultProfile {
        family: ProfileFamily::Storage,
        variant: "access-log",
        version: "1",
        is_default: false,
        description: "Destination bucket for server access logs",
        factory: storage::access_log,
    },
    DefaultProfile {
        family: ProfileFamily::Storage,
        variant: "scrap",
        version: "1",
        is_default: false,
        description: "Short-lived test bucket destroyed with its stack",
        factory: storage::scrap,
    },
    DefaultProfile {
        family: ProfileFamily::Network,
        variant: "public-private",
        version: "1",
        is_default: true,
        description: "Public and private subnets with one NAT gateway",
        factory: network::public_private,
    },
    DefaultProfile {
        family: ProfileFamily::Network,
        variant: "isolated",
        version: "1",
        is_default: false,
        description: "Isolated subnets only, no internet access",
        factory: network::isolated,
    },
    DefaultProfile {
        family: ProfileFamily::SecurityGroup,
        variant: "default",
        version: "1",
        is_default: true,
        description: "No inbound rules, all outbound traffic allowed",
        factory: security_group::default,
    },
    DefaultProfile {
        family: ProfileFamily::Cache,
        variant: "memcached",
        version: "1",
        is_default: true,
        description: "Two-node cross-AZ memcached cluster",
        factory: cache::memcached,
    },
    DefaultProfile {
        family: ProfileFamily::Cache,
        variant: "redis",
        version: "1",
        is_default: false,
        description: "Single-node redis cluster",
        factory: cache::redis,
    },
    DefaultProfile {
        family: ProfileFamily::CatalogDatabase,
        variant: "default",
        version: "1",
        is_default: true,
        description: "Catalog database in the deployment account",
        factory: catalog::database,
    },
    DefaultProfile {
        family: ProfileFamily::CatalogTable,
        variant: "kinesis",
        version: "1",
        is_default: true,
        description: "External JSON table over a Kinesis data stream",
        factory: catalog::kinesis_table,
    },
    DefaultProfile {
        family: ProfileFamily::Compute,
        variant: "standard",
        version: "1",
        is_default: true,
        description: "Function with a 3 second timeout and 128 MB of memory",
        factory: compute::standard,
    },
];

/// All registered profiles.
pub fn profiles() -> &'static [DefaultProfile] {
    PROFILES
}

/// Find the profile for a family and variant; no variant means the family default.
pub fn lookup(family: ProfileFamily, variant: Option<&str>) -> ConstructResult<&'static DefaultProfile> {
    PROFILES
        .iter()
        .find(|p| {
            p.family == family
                && match variant {
                    Some(v) => p.variant == v,
                    None => p.is_default,
                }
        })
        .ok_or_else(|| ConstructError::unknown_variant(family.as_str(), variant.unwrap_or("<default>")))
}

/// Canonical default fragment for a family and variant.
pub fn default_fragment_for(
    family: ProfileFamily,
    variant: Option<&str>,
    ctx: &DefaultContext<'_>,
) -> ConstructResult<Fragment> {
    let profile = lookup(family, variant)?;
    debug!(
        "Resolving {} defaults '{}' v{} for '{}'",
        family, profile.variant, profile.version, ctx.name
    );
    profile.fragment(ctx)
}

/// Default table fragment for a source type over a database and field schema.
pub fn default_table_fragment(
    environment: &Environment,
    name: &str,
    source_type: &str,
    catalog: CatalogContext<'_>,
) -> ConstructResult<Fragment> {
    let ctx = DefaultContext::new(environment, name).with_catalog(catalog);
    default_fragment_for(ProfileFamily::CatalogTable, Some(source_type), &ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_family_has_one_default() {
        for family in [
            ProfileFamily::Storage,
            ProfileFamily::Network,
            ProfileFamily::SecurityGroup,
            ProfileFamily::Cache,
            ProfileFamily::CatalogDatabase,
            ProfileFamily::CatalogTable,
            ProfileFamily::Compute,
        ] {
            let defaults = profiles().iter().filter(|p| p.family == family && p.is_default).count();
            assert_eq!(defaults, 1, "family {}", family);
        }
    }

    #[test]
    fn test_unknown_variant() {
        let env = Environment::agnostic();
        let ctx = DefaultContext::new(&env, "Bucket");
        let err = default_fragment_for(ProfileFamily::Storage, Some("fancy"), &ctx).unwrap_err();
        assert!(matches!(
            err,
            ConstructError::UnknownVariant { ref family, ref variant } if family == "storage" && variant == "fancy"
        ));
    }

    #[test]
    fn test_defaults_are_deterministic() {
        let env = Environment::new("123456789012", "us-east-1");
        for profile in profiles().iter().filter(|p| p.family != ProfileFamily::CatalogTable) {
            let ctx = DefaultContext::new(&env, "Resource1");
            assert_eq!(profile.fragment(&ctx).unwrap(), profile.fragment(&ctx).unwrap());
        }
    }

    #[test]
    fn test_storage_defaults_are_secure() {
        let env = Environment::agnostic();
        let ctx = DefaultContext::new(&env, "Bucket");
        let fragment = default_fragment_for(ProfileFamily::Storage, None, &ctx).unwrap();
        assert_eq!(fragment.get("encryption"), Some(&json!("s3-managed")));
        assert_eq!(fragment.get("versioned"), Some(&json!(true)));
        assert_eq!(fragment.get("blockPublicAccess"), Some(&json!(true)));
    }

    fn kinesis_inputs() -> (Vec<Column>, BTreeMap<String, String>) {
        let columns = vec![
            Column::new("id", "int", "Identifier for the record"),
            Column::new("name", "string", "The name of the record"),
            Column::new("type", "string", "The type of the record"),
            Column::new("numericvalue", "int", "Some value associated with the record"),
        ];
        let mut parameters = BTreeMap::new();
        parameters.insert(STREAM_NAME.to_string(), "testStream".to_string());
        (columns, parameters)
    }

    #[test]
    fn test_kinesis_table_defaults() {
        let env = Environment::agnostic();
        let (columns, parameters) = kinesis_inputs();
        let catalog = CatalogContext {
            catalog_id: env.account_value(),
            database_name: json!({"Ref": "GlueDatabase"}),
            columns: &columns,
            parameters: &parameters,
        };
        let fragment = default_table_fragment(&env, "Table", "kinesis", catalog).unwrap();

        assert_eq!(fragment.get("catalogId"), Some(&json!({"Ref": "AWS::AccountId"})));
        assert_eq!(fragment.get_path("tableInput.tableType"), Some(&json!("EXTERNAL_TABLE")));
        assert_eq!(
            fragment.get_path("tableInput.storageDescriptor.location"),
            Some(&json!("testStream"))
        );
        assert_eq!(
            fragment.get_path("tableInput.storageDescriptor.serdeInfo.parameters.paths"),
            Some(&json!("id,name,type,numericvalue"))
        );
        assert_eq!(
            fragment.get_path("tableInput.storageDescriptor.parameters.endpointUrl"),
            Some(&json!({"Fn::Join": ["", ["https://kinesis.", {"Ref": "AWS::Region"}, ".amazonaws.com"]]}))
        );
    }

    #[test]
    fn test_unsupported_source_type() {
        let env = Environment::agnostic();
        let (columns, parameters) = kinesis_inputs();
        let catalog = CatalogContext {
            catalog_id: env.account_value(),
            database_name: json!("fakedatabase"),
            columns: &columns,
            parameters: &parameters,
        };
        let err = default_table_fragment(&env, "Table", "SomeSource", catalog).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("SomeSource"));
    }

    #[test]
    fn test_kinesis_table_requires_stream_name() {
        let env = Environment::agnostic();
        let (columns, _) = kinesis_inputs();
        let parameters = BTreeMap::new();
        let catalog = CatalogContext {
            catalog_id: env.account_value(),
            database_name: json!("fakedatabase"),
            columns: &columns,
            parameters: &parameters,
        };
        let err = default_table_fragment(&env, "Table", "kinesis", catalog).unwrap_err();
        assert!(matches!(err, ConstructError::Configuration { ref path, .. } if path == "Table.parameters.STREAM_NAME"));
    }

    #[test]
    fn test_cache_defaults_use_name() {
        let env = Environment::agnostic();
        let ctx = DefaultContext::new(&env, "sessions");
        let fragment = default_fragment_for(ProfileFamily::Cache, None, &ctx).unwrap();
        assert_eq!(fragment.get("clusterName"), Some(&json!("sessions-cdk-cluster")));
        assert_eq!(fragment.get("port"), Some(&json!(default_cache_port())));
    }

    #[test]
    fn test_family_names_roundtrip() {
        for profile in profiles() {
            assert_eq!(ProfileFamily::from_str(profile.family.as_str()), Some(profile.family));
        }
        assert_eq!(ProfileFamily::from_str("queue"), None);
    }
}
