//! Resource declarations and the handles that refer to them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fragment::Fragment;
use crate::suppression::{extend_unique, Suppression};
use crate::tokens;

/// Categories of infrastructure resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceFamily {
    Storage,
    Network,
    Cache,
    Catalog,
    Compute,
    Identity,
}

impl ResourceFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceFamily::Storage => "storage",
            ResourceFamily::Network => "network",
            ResourceFamily::Cache => "cache",
            ResourceFamily::Catalog => "catalog",
            ResourceFamily::Compute => "compute",
            ResourceFamily::Identity => "identity",
        }
    }
}

impl std::fmt::Display for ResourceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concrete resource types the builders emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Bucket,
    BucketPolicy,
    Function,
    Role,
    Policy,
    Vpc,
    Subnet,
    RouteTable,
    SubnetRouteTableAssociation,
    Route,
    InternetGateway,
    VpcGatewayAttachment,
    Eip,
    NatGateway,
    SecurityGroup,
    CacheSubnetGroup,
    CacheCluster,
    GlueDatabase,
    GlueTable,
}

impl ResourceKind {
    /// The resource type name in the emitted document.
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceKind::Bucket => "AWS::S3::Bucket",
            ResourceKind::BucketPolicy => "AWS::S3::BucketPolicy",
            ResourceKind::Function => "AWS::Lambda::Function",
            ResourceKind::Role => "AWS::IAM::Role",
            ResourceKind::Policy => "AWS::IAM::Policy",
            ResourceKind::Vpc => "AWS::EC2::VPC",
            ResourceKind::Subnet => "AWS::EC2::Subnet",
            ResourceKind::RouteTable => "AWS::EC2::RouteTable",
            ResourceKind::SubnetRouteTableAssociation => "AWS::EC2::SubnetRouteTableAssociation",
            ResourceKind::Route => "AWS::EC2::Route",
            ResourceKind::InternetGateway => "AWS::EC2::InternetGateway",
            ResourceKind::VpcGatewayAttachment => "AWS::EC2::VPCGatewayAttachment",
            ResourceKind::Eip => "AWS::EC2::EIP",
            ResourceKind::NatGateway => "AWS::EC2::NatGateway",
            ResourceKind::SecurityGroup => "AWS::EC2::SecurityGroup",
            ResourceKind::CacheSubnetGroup => "AWS::ElastiCache::SubnetGroup",
            ResourceKind::CacheCluster => "AWS::ElastiCache::CacheCluster",
            ResourceKind::GlueDatabase => "AWS::Glue::Database",
            ResourceKind::GlueTable => "AWS::Glue::Table",
        }
    }

    pub fn family(&self) -> ResourceFamily {
        match self {
            ResourceKind::Bucket => ResourceFamily::Storage,
            ResourceKind::Function => ResourceFamily::Compute,
            ResourceKind::BucketPolicy | ResourceKind::Role | ResourceKind::Policy => {
                ResourceFamily::Identity
            }
            ResourceKind::Vpc
            | ResourceKind::Subnet
            | ResourceKind::RouteTable
            | ResourceKind::SubnetRouteTableAssociation
            | ResourceKind::Route
            | ResourceKind::InternetGateway
            | ResourceKind::VpcGatewayAttachment
            | ResourceKind::Eip
            | ResourceKind::NatGateway
            | ResourceKind::SecurityGroup => ResourceFamily::Network,
            ResourceKind::CacheSubnetGroup | ResourceKind::CacheCluster => ResourceFamily::Cache,
            ResourceKind::GlueDatabase | ResourceKind::GlueTable => ResourceFamily::Catalog,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// What happens to a resource when it leaves the deployed stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    #[serde(alias = "DESTROY")]
    Destroy,
    #[serde(alias = "RETAIN")]
    Retain,
    #[serde(alias = "SNAPSHOT")]
    Snapshot,
}

impl RemovalPolicy {
    /// The deletion policy attribute value.
    pub fn deletion_policy(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "Delete",
            RemovalPolicy::Retain => "Retain",
            RemovalPolicy::Snapshot => "Snapshot",
        }
    }
}

/// A named node in the output tree.
///
/// Built with the `with_*` methods and then handed to
/// [`Scope::register`](crate::tree::Scope::register), which assigns its
/// identity. Properties are fixed from that point on.
#[derive(Debug, Clone)]
pub struct ResourceDeclaration {
    kind: ResourceKind,
    properties: Fragment,
    depends_on: BTreeSet<String>,
    references: BTreeMap<String, String>,
    suppressions: Vec<Suppression>,
    removal_policy: Option<RemovalPolicy>,
    pub(crate) logical_id: String,
    pub(crate) path: String,
    pub(crate) owner: String,
}

impl ResourceDeclaration {
    pub fn new(kind: ResourceKind, properties: Fragment) -> Self {
        Self {
            kind,
            properties,
            depends_on: BTreeSet::new(),
            references: BTreeMap::new(),
            suppressions: Vec::new(),
            removal_policy: None,
            logical_id: String::new(),
            path: String::new(),
            owner: String::new(),
        }
    }

    /// Declare an explicit ordering dependency on an existing resource.
    pub fn depends_on(mut self, target: &ResourceHandle) -> Self {
        self.depends_on.insert(target.logical_id.clone());
        self
    }

    /// Record a named, non-owning reference to another resource.
    ///
    /// References are bindings too, so they also order the target first.
    pub fn with_reference(mut self, name: impl Into<String>, target: &ResourceHandle) -> Self {
        self.references.insert(name.into(), target.logical_id.clone());
        self.depends_on.insert(target.logical_id.clone());
        self
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = Some(policy);
        self
    }

    pub fn with_suppressions(mut self, entries: impl IntoIterator<Item = Suppression>) -> Self {
        extend_unique(&mut self.suppressions, entries);
        self
    }

    pub(crate) fn add_suppressions(&mut self, entries: impl IntoIterator<Item = Suppression>) {
        extend_unique(&mut self.suppressions, entries);
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn family(&self) -> ResourceFamily {
        self.kind.family()
    }

    pub fn properties(&self) -> &Fragment {
        &self.properties
    }

    pub fn property(&self, path: &str) -> Option<&Value> {
        self.properties.get_path(path)
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.depends_on
    }

    pub fn references(&self) -> &BTreeMap<String, String> {
        &self.references
    }

    pub fn suppressions(&self) -> &[Suppression] {
        &self.suppressions
    }

    pub fn removal_policy(&self) -> Option<RemovalPolicy> {
        self.removal_policy
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// Construct path, e.g. `test-lambda-s3/S3Bucket`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of the assembly that declared this resource.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn handle(&self) -> ResourceHandle {
        ResourceHandle {
            logical_id: self.logical_id.clone(),
            path: self.path.clone(),
            kind: self.kind,
        }
    }
}

/// A typed pointer to a registered declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceHandle {
    pub logical_id: String,
    pub path: String,
    pub kind: ResourceKind,
}

impl ResourceHandle {
    /// The resource's primary identifier, resolved at deployment.
    pub fn reference(&self) -> Value {
        tokens::reference(&self.logical_id)
    }

    pub fn attribute(&self, name: &str) -> Value {
        tokens::get_att(&self.logical_id, name)
    }

    pub fn arn(&self) -> Value {
        self.attribute("Arn")
    }
}
