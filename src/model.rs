//! The types exchanged with the callers of the [`Firewall`](crate::Firewall).

use std::convert::TryFrom;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chain::HookClass;
use crate::error::Error;
use crate::rule::MAX_COMMENT_LEN;

/// One of the three chains the engine manages.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Input,
    Forward,
    Output,
}

impl ChainKind {
    pub const ALL: [ChainKind; 3] = [ChainKind::Input, ChainKind::Forward, ChainKind::Output];

    pub fn name(&self) -> &'static str {
        match self {
            ChainKind::Input => "input",
            ChainKind::Forward => "forward",
            ChainKind::Output => "output",
        }
    }

    pub fn hook(&self) -> HookClass {
        match self {
            ChainKind::Input => HookClass::In,
            ChainKind::Forward => HookClass::Forward,
            ChainKind::Output => HookClass::Out,
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChainKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(ChainKind::Input),
            "forward" => Ok(ChainKind::Forward),
            "output" => Ok(ChainKind::Output),
            _ => Err(Error::BadRequest(format!(
                "invalid chain '{}', expected input, forward or output",
                s
            ))),
        }
    }
}

/// The transport protocol a rule matches. `Any` is the empty string on the wire.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "")]
    Any,
    #[serde(rename = "tcp")]
    Tcp,
    #[serde(rename = "udp")]
    Udp,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Any
    }
}

impl Protocol {
    /// The IP protocol number, `None` for `Any`.
    pub fn number(&self) -> Option<u8> {
        match self {
            Protocol::Any => None,
            Protocol::Tcp => Some(crate::sys::IPPROTO_TCP),
            Protocol::Udp => Some(crate::sys::IPPROTO_UDP),
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            crate::sys::IPPROTO_TCP => Some(Protocol::Tcp),
            crate::sys::IPPROTO_UDP => Some(Protocol::Udp),
            _ => None,
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" => Ok(Protocol::Any),
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(Error::BadRequest(format!(
                "invalid protocol '{}', expected tcp, udp or nothing",
                s
            ))),
        }
    }
}

/// The verdict of a rule.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Accept,
    Drop,
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accept" => Ok(Action::Accept),
            "drop" => Ok(Action::Drop),
            _ => Err(Error::BadRequest(format!(
                "invalid action '{}', expected accept or drop",
                s
            ))),
        }
    }
}

/// A managed rule, as listed to callers and stored in the mirror.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct FirewallRule {
    /// Kernel handle, `0` until the rule is committed.
    #[serde(default)]
    pub handle: u64,
    pub chain: ChainKind,
    #[serde(default)]
    pub protocol: Protocol,
    /// Destination port, `0` matches any port.
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub source_ip: Option<Ipv4Addr>,
    pub action: Action,
    #[serde(default)]
    pub comment: String,
}

impl FirewallRule {
    /// Checks the constraints the type itself cannot express.
    pub fn validate(&self) -> Result<(), Error> {
        if self.port != 0 && self.protocol == Protocol::Any {
            return Err(Error::BadRequest(format!(
                "port {} requires a protocol (tcp or udp)",
                self.port
            )));
        }
        if self.comment.len() > MAX_COMMENT_LEN {
            return Err(Error::BadRequest(format!(
                "comment is {} bytes long, at most {} are allowed",
                self.comment.len(),
                MAX_COMMENT_LEN
            )));
        }
        if self.comment.contains('\0') {
            return Err(Error::BadRequest("comment must not contain NUL".to_string()));
        }
        Ok(())
    }

    /// Whether both rules match the same packets with the same verdict, whatever their handle
    /// and comment.
    pub fn same_match(&self, other: &FirewallRule) -> bool {
        self.chain == other.chain
            && self.protocol == other.protocol
            && self.port == other.port
            && self.source_ip == other.source_ip
            && self.action == other.action
    }
}

/// A rule creation request, as received by the API layer.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateRuleRequest {
    pub chain: String,
    pub protocol: String,
    pub port: u16,
    /// IPv4 literal, empty for any source.
    pub source_ip: String,
    pub action: String,
    pub comment: String,
}

impl TryFrom<&CreateRuleRequest> for FirewallRule {
    type Error = Error;

    fn try_from(req: &CreateRuleRequest) -> Result<Self, Self::Error> {
        let source_ip = match req.source_ip.trim() {
            "" => None,
            ip => Some(ip.parse::<Ipv4Addr>().map_err(|_| {
                Error::BadRequest(format!("invalid source_ip '{}', expected an IPv4 address", ip))
            })?),
        };
        let rule = FirewallRule {
            handle: 0,
            chain: req.chain.parse()?,
            protocol: req.protocol.parse()?,
            port: req.port,
            source_ip,
            action: req.action.parse()?,
            comment: req.comment.clone(),
        };
        rule.validate()?;
        Ok(rule)
    }
}

/// Summary returned by [`Firewall::status`](crate::Firewall::status).
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub enabled: bool,
    pub rule_count: usize,
    pub table: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(chain: &str, protocol: &str, port: u16, action: &str) -> CreateRuleRequest {
        CreateRuleRequest {
            chain: chain.into(),
            protocol: protocol.into(),
            port,
            action: action.into(),
            ..Default::default()
        }
    }

    #[test]
    fn request_is_validated() {
        let rule = FirewallRule::try_from(&request("input", "TCP", 22, "accept")).unwrap();
        assert_eq!(rule.protocol, Protocol::Tcp);
        assert_eq!(rule.chain, ChainKind::Input);

        for bad in &[
            request("prerouting", "tcp", 22, "accept"),
            request("input", "icmp", 0, "accept"),
            request("input", "tcp", 22, "reject"),
            request("input", "", 443, "accept"),
        ] {
            match FirewallRule::try_from(bad) {
                Err(Error::BadRequest(_)) => {}
                other => panic!("{:?} accepted: {:?}", bad, other),
            }
        }
    }

    #[test]
    fn source_ip_must_be_ipv4() {
        let mut req = request("input", "", 0, "drop");
        req.source_ip = "10.0.0.1".into();
        let rule = FirewallRule::try_from(&req).unwrap();
        assert_eq!(rule.source_ip, Some(Ipv4Addr::new(10, 0, 0, 1)));

        req.source_ip = "::1".into();
        assert!(matches!(
            FirewallRule::try_from(&req),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn comment_must_fit_the_kernel_rule() {
        let mut req = request("input", "tcp", 53, "accept");
        req.comment = "é".repeat(MAX_COMMENT_LEN / 2);
        assert!(FirewallRule::try_from(&req).is_ok());

        for comment in &["x".repeat(MAX_COMMENT_LEN + 1), "dns\0server".to_string()] {
            req.comment = comment.clone();
            assert!(matches!(
                FirewallRule::try_from(&req),
                Err(Error::BadRequest(_))
            ));
        }
    }

    #[test]
    fn json_shape() {
        let rule = FirewallRule {
            handle: 4,
            chain: ChainKind::Forward,
            protocol: Protocol::Any,
            port: 0,
            source_ip: None,
            action: Action::Drop,
            comment: String::new(),
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "handle": 4,
                "chain": "forward",
                "protocol": "",
                "port": 0,
                "source_ip": null,
                "action": "drop",
                "comment": "",
            })
        );
        let back: FirewallRule = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }
}
