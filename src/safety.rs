//! The two system rules kept at the top of the input chain: accept on loopback and accept
//! established/related connections. They keep the host administrable whatever the rules below
//! them drop.
//!
//! They are recognized by the shape of their expressions, never by their comment.

use crate::error::{BuilderError, Error};
use crate::expr::{
    Bitwise, Cmp, CmpOp, ConnTrackState, Conntrack, ConntrackKey, ExpressionVariant, Immediate,
    Meta, MetaType, VerdictKind,
};
use crate::kernel::{Netfilter, Transaction};
use crate::{Chain, Placement, Rule};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SafetyRule {
    /// `iifname "lo" accept`
    Loopback,
    /// `ct state established,related accept`
    Established,
}

/// Tells whether the expressions are those of a safety rule: an accept matching purely on the
/// input interface name, or purely on the conntrack state, with no protocol or port match.
pub fn classify<'a>(exprs: impl IntoIterator<Item = &'a ExpressionVariant>) -> Option<SafetyRule> {
    let mut iifname = false;
    let mut ct_state = false;
    let mut accept = false;

    for expr in exprs {
        match expr {
            ExpressionVariant::Meta(meta) => match meta.get_key() {
                Some(MetaType::IifName) => iifname = true,
                _ => return None,
            },
            ExpressionVariant::Conntrack(ct) => match ct.get_key() {
                Some(ConntrackKey::State) => ct_state = true,
                _ => return None,
            },
            ExpressionVariant::Payload(_) => return None,
            ExpressionVariant::Immediate(imm) => {
                accept = imm.verdict() == Some(VerdictKind::Accept);
            }
            _ => {}
        }
    }

    match (accept, iifname, ct_state) {
        (true, true, false) => Some(SafetyRule::Loopback),
        (true, false, true) => Some(SafetyRule::Established),
        _ => None,
    }
}

pub fn loopback_rule(chain: &Chain) -> Result<Rule, BuilderError> {
    Ok(Rule::new(chain)?
        .with_placement(Placement::Head)
        .with_expr(Meta::new(MetaType::IifName))
        .with_expr(Cmp::new(CmpOp::Eq, b"lo\0".to_vec()))
        .with_expr(Immediate::new_verdict(VerdictKind::Accept))
        .with_comment("hostwall: accept loopback"))
}

pub fn established_rule(chain: &Chain) -> Result<Rule, BuilderError> {
    let allowed_states = (ConnTrackState::ESTABLISHED | ConnTrackState::RELATED).bits();
    // the conntrack state is loaded in host byte order
    Ok(Rule::new(chain)?
        .with_placement(Placement::Head)
        .with_expr(Conntrack::new(ConntrackKey::State))
        .with_expr(Bitwise::new(
            allowed_states.to_ne_bytes(),
            0u32.to_ne_bytes(),
        )?)
        .with_expr(Cmp::new(CmpOp::Neq, 0u32.to_ne_bytes()))
        .with_expr(Immediate::new_verdict(VerdictKind::Accept))
        .with_comment("hostwall: accept established,related"))
}

/// Makes sure the input chain starts with the loopback rule followed by the established rule.
///
/// When they are already in place nothing is changed. Otherwise any misplaced copy is removed
/// and both rules are inserted at the head of the chain in a single transaction.
pub fn ensure(kernel: &dyn Netfilter, input: &Chain) -> Result<(), Error> {
    let rules = kernel.list_rules(input)?;
    let kinds: Vec<Option<SafetyRule>> = rules
        .iter()
        .map(|r| classify(r.iter_expressions()))
        .collect();

    if kinds.len() >= 2
        && kinds[0] == Some(SafetyRule::Loopback)
        && kinds[1] == Some(SafetyRule::Established)
        && kinds[2..].iter().all(Option::is_none)
    {
        debug!("Safety rules already in place");
        return Ok(());
    }

    let mut tx = Transaction::new();
    for (rule, kind) in rules.iter().zip(&kinds) {
        if kind.is_some() {
            let handle = *rule.get_handle().ok_or(BuilderError::MissingRuleHandle)?;
            tx.delete(Rule::new(input)?.with_handle(handle));
        }
    }
    // each insertion goes to the head: the last one ends up first
    tx.add(established_rule(input)?);
    tx.add(loopback_rule(input)?);
    kernel.commit(tx)?;
    info!("Installed the loopback and established/related safety rules");

    Ok(())
}
