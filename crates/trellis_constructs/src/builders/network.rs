//! Virtual networks.
//!
//! Subnet blocks are carved from the network block in configuration order,
//! one block per subnet configuration per availability zone, each aligned to
//! its own size.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use trellis_core::tokens;
use trellis_core::{
    CheckId, ConstructError, ConstructResult, Environment, Fragment, ResourceDeclaration, ResourceHandle,
    ResourceKind, Scope, Suppression, PRIMARY_RESOURCE,
};

use super::{merge_settings, props_layer, Merged};
use crate::defaults::{default_fragment_for, enforced_network_layer, DefaultContext, ProfileFamily};
use crate::policy;

const REQUIRED_KEYS: &[&str] = &[
    "cidr",
    "maxAzs",
    "natGateways",
    "enableDnsHostnames",
    "enableDnsSupport",
    "subnetConfiguration",
];

const ANY_IPV4: &str = "0.0.0.0/0";

/// Smallest subnet block the builder carves.
pub const MAX_SUBNET_MASK: u8 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetType {
    #[serde(alias = "PUBLIC")]
    Public,
    #[serde(alias = "PRIVATE", alias = "PRIVATE_WITH_NAT")]
    Private,
    #[serde(alias = "ISOLATED", alias = "PRIVATE_ISOLATED")]
    Isolated,
}

impl SubnetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetType::Public => "public",
            SubnetType::Private => "private",
            SubnetType::Isolated => "isolated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubnetConfiguration {
    pub name: String,
    pub subnet_type: SubnetType,
    pub cidr_mask: u8,
}

/// Caller overrides for a network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct VpcProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_azs: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nat_gateways: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_dns_hostnames: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_dns_support: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_configuration: Option<Vec<SubnetConfiguration>>,
}

/// Fully merged network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VpcSettings {
    pub cidr: String,
    pub max_azs: u8,
    pub nat_gateways: u8,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
    pub subnet_configuration: Vec<SubnetConfiguration>,
}

impl VpcSettings {
    pub fn has_subnets(&self, subnet_type: SubnetType) -> bool {
        self.subnet_configuration.iter().any(|c| c.subnet_type == subnet_type)
    }
}

/// An IPv4 block in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    base: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Parse `a.b.c.d/n`. Host bits must be zero.
    pub fn parse(s: &str) -> Option<Self> {
        let (addr, prefix) = s.split_once('/')?;
        let addr: Ipv4Addr = addr.parse().ok()?;
        let prefix: u8 = prefix.parse().ok()?;
        if prefix > 32 {
            return None;
        }
        let base = u32::from(addr);
        if base & !Self::netmask(prefix) != 0 {
            return None;
        }
        Some(Self { base, prefix })
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn netmask(prefix: u8) -> u32 {
        u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
    }

    fn size(prefix: u8) -> u64 {
        1u64 << (32 - u32::from(prefix))
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.base), self.prefix)
    }
}

/// One subnet block assigned to an availability zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSubnet {
    pub name: String,
    pub subnet_type: SubnetType,
    pub az_index: usize,
    pub cidr: Ipv4Cidr,
}

impl PlannedSubnet {
    fn construct_id(&self) -> String {
        format!("{}Subnet{}", self.name, self.az_index + 1)
    }
}

/// Carve subnet blocks for every configuration and availability zone.
pub fn plan_subnets(resource: &str, settings: &VpcSettings) -> ConstructResult<Vec<PlannedSubnet>> {
    let vpc = Ipv4Cidr::parse(&settings.cidr).ok_or_else(|| {
        ConstructError::validation(resource, "cidr", format!("'{}' is not an IPv4 CIDR block", settings.cidr))
    })?;
    let end = u64::from(vpc.base) + Ipv4Cidr::size(vpc.prefix);
    let mut cursor = u64::from(vpc.base);
    let mut planned = Vec::new();

    for config in &settings.subnet_configuration {
        if config.cidr_mask < vpc.prefix || config.cidr_mask > MAX_SUBNET_MASK {
            return Err(ConstructError::validation(
                resource,
                "subnetConfiguration.cidrMask",
                format!(
                    "mask /{} of '{}' must lie between /{} and /{}",
                    config.cidr_mask, config.name, vpc.prefix, MAX_SUBNET_MASK
                ),
            ));
        }
        let size = Ipv4Cidr::size(config.cidr_mask);
        for az_index in 0..usize::from(settings.max_azs) {
            cursor = cursor.div_ceil(size) * size;
            if cursor + size > end {
                return Err(ConstructError::validation(
                    resource,
                    "subnetConfiguration",
                    format!("subnets do not fit in {}", settings.cidr),
                ));
            }
            planned.push(PlannedSubnet {
                name: config.name.clone(),
                subnet_type: config.subnet_type,
                az_index,
                cidr: Ipv4Cidr {
                    base: cursor as u32,
                    prefix: config.cidr_mask,
                },
            });
            cursor += size;
        }
    }
    Ok(planned)
}

/// Handles to a built network.
#[derive(Debug, Clone)]
pub struct VpcHandle {
    pub vpc: ResourceHandle,
    pub internet_gateway: Option<ResourceHandle>,
    pub public_subnets: Vec<ResourceHandle>,
    pub private_subnets: Vec<ResourceHandle>,
    pub isolated_subnets: Vec<ResourceHandle>,
    pub nat_gateways: Vec<ResourceHandle>,
    pub merged: Fragment,
    pub settings: VpcSettings,
}

impl VpcHandle {
    pub fn vpc_id(&self) -> Value {
        self.vpc.reference()
    }

    pub fn subnets(&self, subnet_type: SubnetType) -> &[ResourceHandle] {
        match subnet_type {
            SubnetType::Public => &self.public_subnets,
            SubnetType::Private => &self.private_subnets,
            SubnetType::Isolated => &self.isolated_subnets,
        }
    }
}

/// Merge caller props, then construct props, then the enforced DNS layer over
/// a network profile.
pub fn resolve_vpc(
    environment: &Environment,
    id: &str,
    variant: Option<&str>,
    props: Option<&VpcProps>,
    construct_props: Option<&VpcProps>,
) -> ConstructResult<Merged<VpcSettings>> {
    let ctx = DefaultContext::new(environment, id);
    let defaults = default_fragment_for(ProfileFamily::Network, variant, &ctx)?;
    let mut layers: Vec<Fragment> = props_layer(props)?.into_iter().collect();
    layers.extend(props_layer(construct_props)?);
    layers.push(enforced_network_layer());
    let merged = merge_settings::<VpcSettings>(id, &defaults, &layers, REQUIRED_KEYS)?;
    policy::check_vpc(id, &merged.settings)?;
    Ok(merged)
}

enum DefaultRoute<'h> {
    Internet {
        gateway: &'h ResourceHandle,
        attachment: &'h ResourceHandle,
    },
    Nat(&'h ResourceHandle),
    None,
}

/// Build a network construct under `id` from settings `resolve_vpc` produced.
pub fn build_vpc(scope: &mut Scope<'_>, id: &str, merged: Merged<VpcSettings>) -> ConstructResult<VpcHandle> {
    let settings = &merged.settings;
    let planned = plan_subnets(id, settings)?;

    let mut vpc_scope = scope.child(id)?;
    let path = vpc_scope.path();
    let vpc = vpc_scope.register(
        PRIMARY_RESOURCE,
        ResourceDeclaration::new(
            ResourceKind::Vpc,
            Fragment::new()
                .with("CidrBlock", settings.cidr.as_str())
                .with("EnableDnsHostnames", settings.enable_dns_hostnames)
                .with("EnableDnsSupport", settings.enable_dns_support)
                .with("InstanceTenancy", "default")
                .with("Tags", name_tag(&path)),
        )
        .with_suppressions(vec![Suppression::new(
            CheckId::W60,
            "Flow logs are configured by the owner of the network",
        )?]),
    )?;

    let mut public_subnets = Vec::new();
    let mut private_subnets = Vec::new();
    let mut isolated_subnets = Vec::new();
    let mut nat_gateways = Vec::new();

    let mut internet_gateway = None;
    if settings.has_subnets(SubnetType::Public) {
        let gateway = vpc_scope.register(
            "IGW",
            ResourceDeclaration::new(ResourceKind::InternetGateway, Fragment::new().with("Tags", name_tag(&path))),
        )?;
        let attachment = vpc_scope.register(
            "VPCGW",
            ResourceDeclaration::new(
                ResourceKind::VpcGatewayAttachment,
                Fragment::new()
                    .with("InternetGatewayId", gateway.reference())
                    .with("VpcId", vpc.reference()),
            )
            .depends_on(&gateway)
            .depends_on(&vpc),
        )?;

        for subnet in planned.iter().filter(|s| s.subnet_type == SubnetType::Public) {
            let with_nat = nat_gateways.len() < usize::from(settings.nat_gateways);
            let route = DefaultRoute::Internet {
                gateway: &gateway,
                attachment: &attachment,
            };
            let (handle, nat) = declare_subnet(&mut vpc_scope, &vpc, subnet, route, with_nat)?;
            public_subnets.push(handle);
            nat_gateways.extend(nat);
        }
        internet_gateway = Some(gateway);
    }

    for subnet in planned.iter().filter(|s| s.subnet_type == SubnetType::Private) {
        let nat = nat_gateways
            .get(subnet.az_index % nat_gateways.len().max(1))
            .ok_or_else(|| {
                ConstructError::validation(id, "natGateways", "private subnets need at least one NAT gateway")
            })?;
        let (handle, _) = declare_subnet(&mut vpc_scope, &vpc, subnet, DefaultRoute::Nat(nat), false)?;
        private_subnets.push(handle);
    }

    for subnet in planned.iter().filter(|s| s.subnet_type == SubnetType::Isolated) {
        let (handle, _) = declare_subnet(&mut vpc_scope, &vpc, subnet, DefaultRoute::None, false)?;
        isolated_subnets.push(handle);
    }

    info!(
        "Built network '{}' ({} public, {} private, {} isolated subnets, {} NAT gateways)",
        path,
        public_subnets.len(),
        private_subnets.len(),
        isolated_subnets.len(),
        nat_gateways.len()
    );

    Ok(VpcHandle {
        vpc,
        internet_gateway,
        public_subnets,
        private_subnets,
        isolated_subnets,
        nat_gateways,
        merged: merged.fragment,
        settings: merged.settings,
    })
}

fn declare_subnet(
    vpc_scope: &mut Scope<'_>,
    vpc: &ResourceHandle,
    subnet: &PlannedSubnet,
    route: DefaultRoute<'_>,
    with_nat: bool,
) -> ConstructResult<(ResourceHandle, Option<ResourceHandle>)> {
    let mut subnet_scope = vpc_scope.child(&subnet.construct_id())?;
    let path = subnet_scope.path();

    let handle = subnet_scope.register(
        "Subnet",
        ResourceDeclaration::new(
            ResourceKind::Subnet,
            Fragment::new()
                .with("AvailabilityZone", tokens::availability_zone(subnet.az_index))
                .with("CidrBlock", subnet.cidr.to_string())
                .with("MapPublicIpOnLaunch", subnet.subnet_type == SubnetType::Public)
                .with(
                    "Tags",
                    json!([
                        {"Key": "Name", "Value": path},
                        {"Key": "trellis:subnet-name", "Value": subnet.name},
                        {"Key": "trellis:subnet-type", "Value": subnet.subnet_type.as_str()}
                    ]),
                )
                .with("VpcId", vpc.reference()),
        )
        .depends_on(vpc),
    )?;
    let table = subnet_scope.register(
        "RouteTable",
        ResourceDeclaration::new(
            ResourceKind::RouteTable,
            Fragment::new().with("Tags", name_tag(&path)).with("VpcId", vpc.reference()),
        )
        .depends_on(vpc),
    )?;
    subnet_scope.register(
        "RouteTableAssociation",
        ResourceDeclaration::new(
            ResourceKind::SubnetRouteTableAssociation,
            Fragment::new()
                .with("RouteTableId", table.reference())
                .with("SubnetId", handle.reference()),
        )
        .depends_on(&table)
        .depends_on(&handle),
    )?;

    let default_route = match route {
        DefaultRoute::Internet { gateway, attachment } => Some(
            subnet_scope.register(
                "DefaultRoute",
                ResourceDeclaration::new(
                    ResourceKind::Route,
                    Fragment::new()
                        .with("DestinationCidrBlock", ANY_IPV4)
                        .with("GatewayId", gateway.reference())
                        .with("RouteTableId", table.reference()),
                )
                .depends_on(&table)
                .depends_on(gateway)
                .depends_on(attachment),
            )?,
        ),
        DefaultRoute::Nat(nat) => Some(subnet_scope.register(
            "DefaultRoute",
            ResourceDeclaration::new(
                ResourceKind::Route,
                Fragment::new()
                    .with("DestinationCidrBlock", ANY_IPV4)
                    .with("NatGatewayId", nat.reference())
                    .with("RouteTableId", table.reference()),
            )
            .depends_on(&table)
            .depends_on(nat),
        )?),
        DefaultRoute::None => None,
    };

    let nat = match (with_nat, default_route) {
        (true, Some(default_route)) => {
            let eip = subnet_scope.register(
                "EIP",
                ResourceDeclaration::new(
                    ResourceKind::Eip,
                    Fragment::new().with("Domain", "vpc").with("Tags", name_tag(&path)),
                ),
            )?;
            Some(subnet_scope.register(
                "NATGateway",
                ResourceDeclaration::new(
                    ResourceKind::NatGateway,
                    Fragment::new()
                        .with("AllocationId", eip.attribute("AllocationId"))
                        .with("SubnetId", handle.reference())
                        .with("Tags", name_tag(&path)),
                )
                .depends_on(&eip)
                .depends_on(&handle)
                .depends_on(&default_route),
            )?)
        }
        _ => None,
    };

    Ok((handle, nat))
}

fn name_tag(path: &str) -> Value {
    json!([{"Key": "Name", "Value": path}])
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{OutputTree, StackConfig};

    fn settings(cidr: &str, max_azs: u8, configs: Vec<(&str, SubnetType, u8)>) -> VpcSettings {
        VpcSettings {
            cidr: cidr.to_string(),
            max_azs,
            nat_gateways: 0,
            enable_dns_hostnames: true,
            enable_dns_support: true,
            subnet_configuration: configs
                .into_iter()
                .map(|(name, subnet_type, cidr_mask)| SubnetConfiguration {
                    name: name.to_string(),
                    subnet_type,
                    cidr_mask,
                })
                .collect(),
        }
    }

    #[test]
    fn test_cidr_parse() {
        let cidr = Ipv4Cidr::parse("10.0.0.0/16").unwrap();
        assert_eq!(cidr.prefix(), 16);
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
        assert!(Ipv4Cidr::parse("10.0.0.1/16").is_none());
        assert!(Ipv4Cidr::parse("10.0.0.0").is_none());
        assert!(Ipv4Cidr::parse("10.0.0.0/33").is_none());
        assert!(Ipv4Cidr::parse("banana/16").is_none());
    }

    #[test]
    fn test_plan_fills_block_in_order() {
        let s = settings(
            "10.0.0.0/16",
            2,
            vec![("public", SubnetType::Public, 18), ("private", SubnetType::Private, 18)],
        );
        let planned: Vec<String> = plan_subnets("Vpc", &s)
            .unwrap()
            .iter()
            .map(|p| p.cidr.to_string())
            .collect();
        assert_eq!(
            planned,
            vec!["10.0.0.0/18", "10.0.64.0/18", "10.0.128.0/18", "10.0.192.0/18"]
        );
    }

    #[test]
    fn test_plan_aligns_mixed_masks() {
        let s = settings(
            "10.0.0.0/16",
            1,
            vec![("small", SubnetType::Isolated, 24), ("large", SubnetType::Isolated, 20)],
        );
        let planned = plan_subnets("Vpc", &s).unwrap();
        assert_eq!(planned[0].cidr.to_string(), "10.0.0.0/24");
        assert_eq!(planned[1].cidr.to_string(), "10.0.16.0/20");
    }

    #[test]
    fn test_plan_overflow() {
        let s = settings("10.0.0.0/16", 3, vec![("isolated", SubnetType::Isolated, 17)]);
        let err = plan_subnets("Vpc", &s).unwrap_err();
        assert!(matches!(err, ConstructError::Validation { ref path, .. } if path == "subnetConfiguration"));
    }

    #[test]
    fn test_public_private_network() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let handle = tree
            .root()
            .assemble("net", |scope| {
                let merged = resolve_vpc(scope.environment(), "Vpc", None, None, None)?;
                build_vpc(scope, "Vpc", merged)
            })
            .unwrap();

        assert_eq!(handle.vpc.logical_id, "netVpc");
        assert_eq!(handle.public_subnets.len(), 2);
        assert_eq!(handle.private_subnets.len(), 2);
        assert!(handle.isolated_subnets.is_empty());
        assert_eq!(handle.nat_gateways.len(), 1);
        assert!(handle.internet_gateway.is_some());

        let route = tree.get("netVpcprivateSubnet2DefaultRoute").unwrap();
        assert_eq!(
            route.property("NatGatewayId"),
            Some(&json!({"Ref": "netVpcpublicSubnet1NATGateway"}))
        );
        let vpc = tree.get("netVpc").unwrap();
        assert_eq!(vpc.suppressions()[0].check(), CheckId::W60);
    }

    #[test]
    fn test_isolated_network_has_no_gateways() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let handle = tree
            .root()
            .assemble("net", |scope| {
                let merged = resolve_vpc(scope.environment(), "Vpc", Some("isolated"), None, None)?;
                build_vpc(scope, "Vpc", merged)
            })
            .unwrap();

        assert_eq!(handle.isolated_subnets.len(), 2);
        assert!(handle.internet_gateway.is_none());
        assert!(handle.nat_gateways.is_empty());
        assert_eq!(tree.declarations_of(trellis_core::ResourceFamily::Network).count(), 1 + 2 * 3);
    }

    #[test]
    fn test_subnet_bindings_are_explicit_dependencies() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        tree.root()
            .assemble("net", |scope| {
                let merged = resolve_vpc(scope.environment(), "Vpc", None, None, None)?;
                build_vpc(scope, "Vpc", merged)
            })
            .unwrap();

        let subnet = tree.get("netVpcprivateSubnet1Subnet").unwrap();
        assert!(subnet.dependencies().contains("netVpc"));
        let table = tree.get("netVpcprivateSubnet1RouteTable").unwrap();
        assert!(table.dependencies().contains("netVpc"));
        let association = tree.get("netVpcprivateSubnet1RouteTableAssociation").unwrap();
        assert!(association.dependencies().contains("netVpcprivateSubnet1RouteTable"));
        assert!(association.dependencies().contains("netVpcprivateSubnet1Subnet"));
        let route = tree.get("netVpcprivateSubnet1DefaultRoute").unwrap();
        assert!(route.dependencies().contains("netVpcpublicSubnet1NATGateway"));
        let attachment = tree.get("netVpcVPCGW").unwrap();
        assert!(attachment.dependencies().contains("netVpcIGW"));
    }

    #[test]
    fn test_dns_is_enforced() {
        let props = VpcProps {
            enable_dns_support: Some(false),
            ..Default::default()
        };
        let merged = resolve_vpc(&Environment::agnostic(), "Vpc", None, Some(&props), None).unwrap();
        assert!(merged.settings.enable_dns_support);
    }

    #[test]
    fn test_construct_props_override_caller_props() {
        let props = VpcProps {
            cidr: Some("10.1.0.0/16".to_string()),
            ..Default::default()
        };
        let construct = VpcProps {
            cidr: Some("172.168.0.0/16".to_string()),
            ..Default::default()
        };
        let merged =
            resolve_vpc(&Environment::agnostic(), "Vpc", Some("isolated"), Some(&props), Some(&construct)).unwrap();
        assert_eq!(merged.settings.cidr, "172.168.0.0/16");
    }
}
