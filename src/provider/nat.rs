//! NAT rule synthesis.
//!
//! A NAT gateway created for a machine gets a fixed catalogue of allow
//! rules for well known infrastructure ports, followed by any custom rules
//! given as compact `name:type:protocol:publicIp:sourceSubnet:targetSubnet:portStart:portEnd`
//! strings. Rule order is evaluation order on the gateway.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::models::{FlowLogProperties, NatGatewayRuleProperties, Resource, TargetPortRange};

/// Suffix of every generated default rule name
const DEFAULT_RULE_NAME: &str = "Docker Machine NAT Rule";

/// Errors raised while parsing compact NAT encodings
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NatError {
    #[error("invalid NAT rule {rule:?}: expected 8 ':' separated fields, got {found}")]
    RuleFieldCount { rule: String, found: usize },

    #[error("invalid NAT flow log {flowlog:?}: expected 4 ':' separated fields, got {found}")]
    FlowLogFieldCount { flowlog: String, found: usize },

    #[error("invalid port {value:?} in NAT rule {rule:?}")]
    Port { rule: String, value: String },

    #[error("unknown NAT rule protocol {0:?}")]
    Protocol(String),

    #[error("unknown NAT rule type {0:?}")]
    RuleType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatProtocol {
    Tcp,
    Udp,
    Icmp,
    All,
}

impl NatProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            NatProtocol::Tcp => "TCP",
            NatProtocol::Udp => "UDP",
            NatProtocol::Icmp => "ICMP",
            NatProtocol::All => "ALL",
        }
    }

    /// `ALL` and `ICMP` rules never carry a port range.
    pub fn has_ports(&self) -> bool {
        matches!(self, NatProtocol::Tcp | NatProtocol::Udp)
    }
}

impl fmt::Display for NatProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NatProtocol {
    type Err = NatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TCP" => Ok(NatProtocol::Tcp),
            "UDP" => Ok(NatProtocol::Udp),
            "ICMP" => Ok(NatProtocol::Icmp),
            "ALL" => Ok(NatProtocol::All),
            _ => Err(NatError::Protocol(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NatRuleType {
    #[default]
    Snat,
}

impl NatRuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NatRuleType::Snat => "SNAT",
        }
    }
}

impl FromStr for NatRuleType {
    type Err = NatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SNAT" => Ok(NatRuleType::Snat),
            _ => Err(NatError::RuleType(s.to_string())),
        }
    }
}

/// Inclusive target port range; unset bounds mean "all ports".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortRange {
    pub start: Option<u16>,
    pub end: Option<u16>,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }
}

/// A single gateway rule, ready to be sent to the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatRule {
    pub name: String,
    pub rule_type: NatRuleType,
    pub protocol: NatProtocol,
    pub public_ip: String,
    pub source_subnet: String,
    pub target_subnet: Option<String>,
    pub target_port_range: Option<PortRange>,
}

impl NatRule {
    pub fn to_model(&self) -> Resource<NatGatewayRuleProperties> {
        Resource::new(NatGatewayRuleProperties {
            name: self.name.clone(),
            rule_type: self.rule_type.as_str().to_string(),
            protocol: self.protocol.as_str().to_string(),
            source_subnet: self.source_subnet.clone(),
            public_ip: self.public_ip.clone(),
            target_subnet: self.target_subnet.clone(),
            target_port_range: self.target_port_range.map(|range| TargetPortRange {
                start: range.start,
                end: range.end,
            }),
        })
    }
}

/// Builds many rules that share public IP and subnets but open different ports.
pub struct NatRuleMaker {
    rules: Vec<NatRule>,
    public_ip: String,
    source_subnet: String,
    target_subnet: Option<String>,
}

impl NatRuleMaker {
    pub fn new(public_ip: &str, source_subnet: &str, target_subnet: Option<&str>) -> Self {
        Self {
            rules: Vec::new(),
            public_ip: public_ip.to_string(),
            source_subnet: source_subnet.to_string(),
            target_subnet: target_subnet.map(String::from),
        }
    }

    pub fn open_port(self, protocol: NatProtocol, port: u16) -> Self {
        self.open_ports(protocol, port, port)
    }

    pub fn open_ports(mut self, protocol: NatProtocol, start: u16, end: u16) -> Self {
        let (name, target_port_range) = if protocol.has_ports() {
            (
                format!("{} ({} - {}): {}", protocol, start, end, DEFAULT_RULE_NAME),
                Some(PortRange::new(start, end)),
            )
        } else {
            (format!("{}: {}", protocol, DEFAULT_RULE_NAME), None)
        };

        self.rules.push(NatRule {
            name,
            rule_type: NatRuleType::Snat,
            protocol,
            public_ip: self.public_ip.clone(),
            source_subnet: self.source_subnet.clone(),
            target_subnet: self.target_subnet.clone(),
            target_port_range,
        });
        self
    }

    pub fn build(self) -> Vec<NatRule> {
        self.rules
    }
}

/// Default allow rules, in gateway evaluation order: `(protocol, start, end)`.
pub const DEFAULT_RULES: &[(NatProtocol, u16, u16)] = &[
    (NatProtocol::Tcp, 22, 22),       // SSH
    (NatProtocol::Udp, 53, 53),       // DNS
    (NatProtocol::Tcp, 80, 80),       // HTTP
    (NatProtocol::Tcp, 179, 179),     // Calico BGP
    (NatProtocol::Tcp, 443, 443),     // HTTPS
    (NatProtocol::Tcp, 2376, 2376),   // Docker daemon TLS
    (NatProtocol::Udp, 4789, 4789),   // Flannel VXLAN (Windows)
    (NatProtocol::Tcp, 6443, 6443),   // Kubernetes API
    (NatProtocol::Tcp, 6783, 6783),   // Weave
    (NatProtocol::Tcp, 8443, 8443),   // Rancher webhook
    (NatProtocol::Udp, 8472, 8472),   // Canal/Flannel VXLAN
    (NatProtocol::Tcp, 9099, 9099),   // Canal/Flannel probes
    (NatProtocol::Tcp, 9100, 9100),   // Linux node-exporter
    (NatProtocol::Tcp, 9443, 9443),   // Rancher webhook
    (NatProtocol::Tcp, 9796, 9796),   // Windows node-exporter
    (NatProtocol::Tcp, 10254, 10254), // Ingress controller probes
    (NatProtocol::Tcp, 10256, 10256), // kube-proxy health
    (NatProtocol::Tcp, 2379, 2380),   // etcd
    (NatProtocol::Udp, 6783, 6784),   // Weave
    (NatProtocol::Tcp, 10250, 10252), // kubelet and metrics
    (NatProtocol::Tcp, 30000, 32767), // NodePorts
    (NatProtocol::Udp, 30000, 32767), // NodePorts
    (NatProtocol::All, 0, 0),         // Outbound
];

/// Build the default catalogue for a gateway
pub fn default_rules(public_ip: &str, source_subnet: &str) -> Vec<NatRule> {
    DEFAULT_RULES
        .iter()
        .fold(
            NatRuleMaker::new(public_ip, source_subnet, None),
            |maker, &(protocol, start, end)| maker.open_ports(protocol, start, end),
        )
        .build()
}

/// A custom rule parsed from its compact encoding.
///
/// Empty `public_ip` and `source_subnet` are filled in from the gateway
/// defaults when the rule is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatRuleSpec {
    pub name: String,
    pub rule_type: NatRuleType,
    pub protocol: NatProtocol,
    pub public_ip: Option<String>,
    pub source_subnet: Option<String>,
    pub target_subnet: Option<String>,
    pub port_start: Option<u16>,
    pub port_end: Option<u16>,
}

impl NatRuleSpec {
    /// Fill in gateway defaults
    pub fn resolve(&self, public_ip: &str, source_subnet: &str) -> NatRule {
        NatRule {
            name: self.name.clone(),
            rule_type: self.rule_type,
            protocol: self.protocol,
            public_ip: self
                .public_ip
                .clone()
                .unwrap_or_else(|| public_ip.to_string()),
            source_subnet: self
                .source_subnet
                .clone()
                .unwrap_or_else(|| source_subnet.to_string()),
            target_subnet: self.target_subnet.clone(),
            target_port_range: Some(PortRange {
                start: self.port_start,
                end: self.port_end,
            }),
        }
    }
}

impl FromStr for NatRuleSpec {
    type Err = NatError;

    fn from_str(rule: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = rule.split(':').collect();
        let [name, rule_type, protocol, public_ip, source_subnet, target_subnet, start, end] =
            fields[..]
        else {
            return Err(NatError::RuleFieldCount {
                rule: rule.to_string(),
                found: fields.len(),
            });
        };

        let port = |value: &str| -> Result<Option<u16>, NatError> {
            if value.is_empty() {
                return Ok(None);
            }
            value.parse().map(Some).map_err(|_| NatError::Port {
                rule: rule.to_string(),
                value: value.to_string(),
            })
        };

        Ok(Self {
            name: name.to_string(),
            rule_type: rule_type.parse()?,
            protocol: protocol.parse()?,
            public_ip: non_empty(public_ip),
            source_subnet: non_empty(source_subnet),
            target_subnet: non_empty(target_subnet),
            port_start: port(start)?,
            port_end: port(end)?,
        })
    }
}

/// A flow log parsed from `name:action:direction:bucket`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowLog {
    pub name: String,
    pub action: String,
    pub direction: String,
    pub bucket: String,
}

impl FlowLog {
    pub fn to_model(&self) -> Resource<FlowLogProperties> {
        Resource::new(FlowLogProperties {
            name: self.name.clone(),
            action: self.action.clone(),
            direction: self.direction.clone(),
            bucket: self.bucket.clone(),
        })
    }
}

impl FromStr for FlowLog {
    type Err = NatError;

    fn from_str(flowlog: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = flowlog.split(':').collect();
        let [name, action, direction, bucket] = fields[..] else {
            return Err(NatError::FlowLogFieldCount {
                flowlog: flowlog.to_string(),
                found: fields.len(),
            });
        };

        Ok(Self {
            name: name.to_string(),
            action: action.to_string(),
            direction: direction.to_string(),
            bucket: bucket.to_string(),
        })
    }
}

/// Build the full ordered rule list for a gateway: defaults (unless skipped)
/// followed by the custom rules in the order given.
pub fn build_rules(
    public_ip: &str,
    source_subnet: &str,
    skip_defaults: bool,
    custom: &[NatRuleSpec],
) -> Vec<NatRule> {
    let mut rules = if skip_defaults {
        Vec::new()
    } else {
        default_rules(public_ip, source_subnet)
    };

    rules.extend(
        custom
            .iter()
            .map(|spec| spec.resolve(public_ip, source_subnet)),
    );
    rules
}

/// Same as [`build_rules`], parsing the custom rules from their encodings.
/// Any malformed rule aborts the whole build.
pub fn build_rules_from_strings<S: AsRef<str>>(
    public_ip: &str,
    source_subnet: &str,
    skip_defaults: bool,
    custom: &[S],
) -> Result<Vec<NatRule>, NatError> {
    let specs = custom
        .iter()
        .map(|rule| rule.as_ref().parse())
        .collect::<Result<Vec<NatRuleSpec>, _>>()?;

    Ok(build_rules(public_ip, source_subnet, skip_defaults, &specs))
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
