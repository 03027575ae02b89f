use std::fmt::Debug;

use crate::chain::Chain;
use crate::error::{BuilderError, DecodeError};
use crate::expr::{ExpressionList, ExpressionVariant};
use crate::impl_attr_getters_and_setters;
use crate::nlmsg::{NfNetlinkDeserializable, NfNetlinkObject};
use crate::parser::deserialize_object;
use crate::sys::{
    NFTA_RULE_CHAIN, NFTA_RULE_EXPRESSIONS, NFTA_RULE_HANDLE, NFTA_RULE_ID, NFTA_RULE_POSITION,
    NFTA_RULE_TABLE, NFTA_RULE_USERDATA, NFTNL_UDATA_RULE_COMMENT, NFT_MSG_DELRULE,
    NFT_MSG_NEWRULE, NLM_F_APPEND, NLM_F_CREATE,
};
use crate::ProtocolFamily;

/// Longest comment the userdata TLV can hold: its length is a single byte and counts the NUL
/// terminator.
pub const MAX_COMMENT_LEN: usize = u8::MAX as usize - 1;

/// Where a new rule lands in its chain when no position is given.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Placement {
    /// Insert before every other rule of the chain.
    Head,
    /// Append after every other rule of the chain.
    Tail,
}

impl Default for Placement {
    fn default() -> Self {
        Placement::Tail
    }
}

/// A nftables firewall rule.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Rule {
    family: ProtocolFamily,
    placement: Placement,
    table: Option<String>,
    chain: Option<String>,
    handle: Option<u64>,
    expressions: Option<ExpressionList>,
    position: Option<u64>,
    userdata: Option<Vec<u8>>,
    id: Option<u32>,
}

impl_attr_getters_and_setters!(Rule, nested = false, [
    (table, get_table, set_table, with_table, NFTA_RULE_TABLE, String),
    (chain, get_chain, set_chain, with_chain, NFTA_RULE_CHAIN, String),
    (handle, get_handle, set_handle, with_handle, NFTA_RULE_HANDLE, u64),
    (expressions, get_expressions, set_expressions, with_expressions, NFTA_RULE_EXPRESSIONS, ExpressionList),
    (position, get_position, set_position, with_position, NFTA_RULE_POSITION, u64),
    (userdata, get_userdata, set_userdata, with_userdata, NFTA_RULE_USERDATA, Vec<u8>),
    (id, get_id, set_id, with_id, NFTA_RULE_ID, u32),
]);

impl Rule {
    /// Creates a new rule object in the given [`Chain`].
    pub fn new(chain: &Chain) -> Result<Rule, BuilderError> {
        Ok(Rule::default()
            .with_family(chain.get_family())
            .with_table(
                chain
                    .get_table()
                    .ok_or(BuilderError::MissingChainInformationError)?
                    .as_str(),
            )
            .with_chain(
                chain
                    .get_name()
                    .ok_or(BuilderError::MissingChainInformationError)?
                    .as_str(),
            ))
    }

    fn with_family(mut self, family: ProtocolFamily) -> Self {
        self.family = family;
        self
    }

    pub fn get_placement(&self) -> Placement {
        self.placement
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Adds an expression to this rule. Expressions are evaluated from first to last added.
    /// As soon as an expression does not match the packet it's being evaluated for, evaluation
    /// stops and the packet is evaluated against the next rule in the chain.
    pub fn add_expr(&mut self, e: impl Into<ExpressionVariant>) {
        let mut exprs = self.expressions.take().unwrap_or_default();
        exprs.add_value(e);
        self.expressions = Some(exprs);
    }

    pub fn with_expr(mut self, e: impl Into<ExpressionVariant>) -> Self {
        self.add_expr(e);
        self
    }

    /// Iterates over the expressions of the rule, in evaluation order.
    pub fn iter_expressions(&self) -> impl Iterator<Item = &ExpressionVariant> {
        self.expressions.iter().flat_map(|e| e.iter())
    }

    /// Stores `comment` in the rule userdata, in the TLV format `nft` reads.
    ///
    /// Comments longer than [`MAX_COMMENT_LEN`] bytes are cut on a character boundary.
    pub fn set_comment(&mut self, comment: &str) {
        if comment.is_empty() {
            self.userdata = None;
            return;
        }
        let mut len = comment.len().min(MAX_COMMENT_LEN);
        while !comment.is_char_boundary(len) {
            len -= 1;
        }
        let mut udata = Vec::with_capacity(len + 3);
        udata.push(NFTNL_UDATA_RULE_COMMENT);
        udata.push((len + 1) as u8);
        udata.extend_from_slice(&comment.as_bytes()[..len]);
        udata.push(0);
        self.userdata = Some(udata);
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.set_comment(comment);
        self
    }

    /// Reads the comment stored in the rule userdata, if any.
    pub fn get_comment(&self) -> Option<String> {
        let mut udata = self.userdata.as_deref()?;
        while udata.len() >= 2 {
            let (ty, len) = (udata[0], udata[1] as usize);
            let value = udata.get(2..2 + len)?;
            if ty == NFTNL_UDATA_RULE_COMMENT {
                let end = value.iter().position(|&c| c == 0).unwrap_or(value.len());
                return Some(String::from_utf8_lossy(&value[..end]).into_owned());
            }
            udata = &udata[2 + len..];
        }
        None
    }
}

impl NfNetlinkObject for Rule {
    const MSG_TYPE_ADD: u16 = NFT_MSG_NEWRULE;
    const MSG_TYPE_DEL: u16 = NFT_MSG_DELRULE;

    fn get_family(&self) -> ProtocolFamily {
        self.family
    }

    fn set_family(&mut self, family: ProtocolFamily) {
        self.family = family;
    }

    fn get_add_flags(&self) -> u16 {
        match self.placement {
            Placement::Head => NLM_F_CREATE,
            // append at the end of the chain, instead of the beginning
            Placement::Tail => NLM_F_CREATE | NLM_F_APPEND,
        }
    }
}

impl NfNetlinkDeserializable for Rule {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        deserialize_object(buf)
    }
}

