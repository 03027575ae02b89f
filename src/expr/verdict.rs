use crate::sys::{
    NFTA_VERDICT_CHAIN, NFTA_VERDICT_CHAIN_ID, NFTA_VERDICT_CODE, NFT_BREAK, NFT_CONTINUE,
    NFT_GOTO, NFT_JUMP, NFT_RETURN, NF_ACCEPT, NF_DROP, NF_QUEUE,
};
use crate::{impl_attr_getters_and_setters, impl_nested_deserialize, nfnetlink_enum};

nfnetlink_enum! {
    pub enum VerdictType: i32 {
        Drop = NF_DROP,
        Accept = NF_ACCEPT,
        Queue = NF_QUEUE,
        Continue = NFT_CONTINUE,
        Break = NFT_BREAK,
        Jump = NFT_JUMP,
        Goto = NFT_GOTO,
        Return = NFT_RETURN,
    }
}

#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Verdict {
    code: Option<VerdictType>,
    chain: Option<String>,
    chain_id: Option<u32>,
}

impl_attr_getters_and_setters!(Verdict, nested = true, [
    (code, get_code, set_code, with_code, NFTA_VERDICT_CODE, VerdictType),
    (chain, get_chain, set_chain, with_chain, NFTA_VERDICT_CHAIN, String),
    (chain_id, get_chain_id, set_chain_id, with_chain_id, NFTA_VERDICT_CHAIN_ID, u32),
]);
impl_nested_deserialize!(Verdict);

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum VerdictKind {
    /// Silently drop the packet.
    Drop,
    /// Accept the packet and let it pass.
    Accept,
    Queue,
    Continue,
    Break,
    Jump {
        chain: String,
    },
    Goto {
        chain: String,
    },
    Return,
}

impl Verdict {
    /// The high-level verdict, `None` if the code is missing or a jump lacks its target.
    pub fn kind(&self) -> Option<VerdictKind> {
        Some(match self.code? {
            VerdictType::Drop => VerdictKind::Drop,
            VerdictType::Accept => VerdictKind::Accept,
            VerdictType::Queue => VerdictKind::Queue,
            VerdictType::Continue => VerdictKind::Continue,
            VerdictType::Break => VerdictKind::Break,
            VerdictType::Jump => VerdictKind::Jump {
                chain: self.chain.clone()?,
            },
            VerdictType::Goto => VerdictKind::Goto {
                chain: self.chain.clone()?,
            },
            VerdictType::Return => VerdictKind::Return,
        })
    }
}
