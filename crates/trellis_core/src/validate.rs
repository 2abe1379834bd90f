//! Structural validation of registered declarations.

use crate::error::{ConstructError, ConstructResult};
use crate::resource::{ResourceDeclaration, ResourceKind};
use crate::tokens;
use crate::tree::OutputTree;

/// Properties every declaration of a kind must carry.
pub fn required_properties(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Bucket | ResourceKind::InternetGateway => &[],
        ResourceKind::BucketPolicy => &["Bucket", "PolicyDocument"],
        ResourceKind::Function => &["Code", "Role", "Runtime", "Handler"],
        ResourceKind::Role => &["AssumeRolePolicyDocument"],
        ResourceKind::Policy => &["PolicyDocument", "PolicyName", "Roles"],
        ResourceKind::Vpc => &["CidrBlock"],
        ResourceKind::Subnet => &["VpcId", "CidrBlock", "AvailabilityZone"],
        ResourceKind::RouteTable => &["VpcId"],
        ResourceKind::SubnetRouteTableAssociation => &["SubnetId", "RouteTableId"],
        ResourceKind::Route => &["RouteTableId", "DestinationCidrBlock"],
        ResourceKind::VpcGatewayAttachment => &["VpcId", "InternetGatewayId"],
        ResourceKind::Eip => &["Domain"],
        ResourceKind::NatGateway => &["SubnetId", "AllocationId"],
        ResourceKind::SecurityGroup => &["GroupDescription", "VpcId"],
        ResourceKind::CacheSubnetGroup => &["Description", "SubnetIds"],
        ResourceKind::CacheCluster => &["CacheNodeType", "Engine", "NumCacheNodes"],
        ResourceKind::GlueDatabase => &["CatalogId", "DatabaseInput"],
        ResourceKind::GlueTable => &["CatalogId", "DatabaseName", "TableInput"],
    }
}

/// Property pairs that must not both be set.
pub fn exclusive_properties(kind: ResourceKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        ResourceKind::Function => &[("Code.ZipFile", "Code.S3Bucket")],
        ResourceKind::Route => &[("GatewayId", "NatGatewayId")],
        _ => &[],
    }
}

/// Validate one declaration against the tree it belongs to.
///
/// Checks required properties, mutually exclusive properties and that every
/// binding (property reference, explicit dependency, named reference) points
/// at a declaration in `tree`.
pub fn validate_declaration<'d>(
    declaration: &'d ResourceDeclaration,
    tree: &OutputTree,
) -> ConstructResult<&'d ResourceDeclaration> {
    let resource = declaration.logical_id();
    let properties = declaration.properties();

    for path in required_properties(declaration.kind()) {
        if !properties.is_set(path) {
            return Err(ConstructError::validation(
                resource,
                *path,
                format!("required property of {} is missing", declaration.kind()),
            ));
        }
    }

    for (first, second) in exclusive_properties(declaration.kind()) {
        if properties.is_set(first) && properties.is_set(second) {
            return Err(ConstructError::validation(
                resource,
                *first,
                format!("'{}' and '{}' are mutually exclusive", first, second),
            ));
        }
    }

    let referenced = properties
        .as_map()
        .values()
        .flat_map(tokens::referenced_ids);
    let explicit = declaration
        .dependencies()
        .iter()
        .chain(declaration.references().values())
        .cloned();
    for target in referenced.chain(explicit) {
        if !tree.contains(&target) {
            return Err(ConstructError::BindingNotFound {
                resource: declaration.path().to_string(),
                target,
            });
        }
    }

    Ok(declaration)
}
