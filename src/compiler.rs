//! Translation between [`FirewallRule`]s and the nf_tables expressions that implement them.
//!
//! A managed rule always has the shape:
//!
//! ```text
//! [meta l4proto == <proto>] [ip saddr == <addr>] [th dport == <port>] counter <accept|drop>
//! ```
//!
//! where each bracketed match is only present when the rule constrains that field.

use std::net::Ipv4Addr;

use crate::error::BuilderError;
use crate::expr::{
    Cmp, CmpOp, Counter, ExpressionList, ExpressionVariant, HighLevelPayload, IPv4HeaderField,
    Immediate, Meta, MetaType, TransportHeaderField, VerdictKind,
};
use crate::model::{Action, ChainKind, FirewallRule, Protocol};
use crate::{Chain, Placement, Rule};

/// Compiles the matches and the verdict of `rule` into the expressions of a kernel rule.
pub fn compile(rule: &FirewallRule) -> ExpressionList {
    let mut exprs = ExpressionList::default();

    if let Some(proto) = rule.protocol.number() {
        exprs.add_value(Meta::new(MetaType::L4Proto));
        exprs.add_value(Cmp::new(CmpOp::Eq, [proto]));
    }

    if let Some(addr) = rule.source_ip {
        exprs.add_value(HighLevelPayload::Network(IPv4HeaderField::Saddr).build());
        exprs.add_value(Cmp::new(CmpOp::Eq, addr.octets()));
    }

    if rule.port != 0 {
        exprs.add_value(HighLevelPayload::Transport(TransportHeaderField::Dport).build());
        // ports are compared in network byte order
        exprs.add_value(Cmp::new(CmpOp::Eq, rule.port.to_be_bytes()));
    }

    exprs.add_value(Counter::new());
    exprs.add_value(Immediate::new_verdict(match rule.action {
        Action::Accept => VerdictKind::Accept,
        Action::Drop => VerdictKind::Drop,
    }));

    exprs
}

// what the next comparison applies to
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Loaded {
    Nothing,
    Protocol,
    SourceIp,
    Port,
    /// A load the rule model cannot express.
    Other,
}

impl Loaded {
    fn from_payload(field: Option<HighLevelPayload>) -> Self {
        match field {
            Some(HighLevelPayload::Network(IPv4HeaderField::Protocol)) => Loaded::Protocol,
            Some(HighLevelPayload::Network(IPv4HeaderField::Saddr)) => Loaded::SourceIp,
            Some(HighLevelPayload::Transport(TransportHeaderField::Dport)) => Loaded::Port,
            _ => Loaded::Other,
        }
    }
}

/// Rebuilds a managed rule from kernel expressions.
///
/// Each comparison is interpreted according to the load before it. A rule comparing anything
/// the model cannot express (another header field, an interface, a negated match), or without
/// an accept or drop verdict, is not one of ours and `None` is returned. Unknown expressions
/// are skipped. The handle and comment of the result are left empty.
pub fn decompile<'a>(
    exprs: impl IntoIterator<Item = &'a ExpressionVariant>,
    chain: ChainKind,
) -> Option<FirewallRule> {
    let mut protocol = Protocol::Any;
    let mut port = 0;
    let mut source_ip = None;
    let mut action = None;
    let mut loaded = Loaded::Nothing;

    for expr in exprs {
        match expr {
            ExpressionVariant::Meta(meta) => {
                loaded = match meta.get_key() {
                    Some(MetaType::L4Proto) => Loaded::Protocol,
                    _ => Loaded::Other,
                }
            }
            ExpressionVariant::Payload(payload) => loaded = Loaded::from_payload(payload.field()),
            ExpressionVariant::Conntrack(_) | ExpressionVariant::Bitwise(_) => {
                loaded = Loaded::Other
            }
            ExpressionVariant::Cmp(cmp) => {
                if cmp.get_op() != Some(&CmpOp::Eq) {
                    return None;
                }
                let value = cmp.value();
                match (loaded, value.len()) {
                    (Loaded::Protocol, 1) => protocol = Protocol::from_number(value[0])?,
                    (Loaded::Port, 2) => port = u16::from_be_bytes([value[0], value[1]]),
                    (Loaded::SourceIp, 4) => {
                        source_ip = Some(Ipv4Addr::new(value[0], value[1], value[2], value[3]))
                    }
                    _ => return None,
                }
                loaded = Loaded::Nothing;
            }
            ExpressionVariant::Immediate(imm) => match imm.verdict() {
                Some(VerdictKind::Accept) => action = Some(Action::Accept),
                Some(VerdictKind::Drop) => action = Some(Action::Drop),
                _ => {}
            },
            _ => {}
        }
    }

    Some(FirewallRule {
        handle: 0,
        chain,
        protocol,
        port,
        source_ip,
        action: action?,
        comment: String::new(),
    })
}

/// [`decompile`] on a kernel rule, filling in its handle and comment.
pub fn decompile_rule(rule: &Rule, chain: ChainKind) -> Option<FirewallRule> {
    let mut res = decompile(rule.iter_expressions(), chain)?;
    res.handle = rule.get_handle().copied().unwrap_or(0);
    res.comment = rule.get_comment().unwrap_or_default();
    Some(res)
}

/// Builds the kernel rule implementing `rule`, appended to `chain`.
pub fn build_rule(chain: &Chain, rule: &FirewallRule) -> Result<Rule, BuilderError> {
    Ok(Rule::new(chain)?
        .with_placement(Placement::Tail)
        .with_expressions(compile(rule))
        .with_comment(&rule.comment))
}
