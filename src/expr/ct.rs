use super::{Expression, Register};
use crate::{
    impl_attr_getters_and_setters, impl_nested_deserialize, nfnetlink_enum,
    sys::{
        NFTA_CT_DIRECTION, NFTA_CT_DREG, NFTA_CT_KEY, NFTA_CT_SREG, NFT_CT_DIRECTION,
        NFT_CT_MARK, NFT_CT_STATE, NFT_CT_STATUS,
    },
};

bitflags::bitflags! {
    pub struct ConnTrackState: u32 {
        const INVALID = 1;
        const ESTABLISHED = 2;
        const RELATED = 4;
        const NEW = 8;
        const UNTRACKED = 64;
    }
}

nfnetlink_enum! {
    pub enum ConntrackKey: u32 {
        State = NFT_CT_STATE,
        Direction = NFT_CT_DIRECTION,
        Status = NFT_CT_STATUS,
        Mark = NFT_CT_MARK,
    }
}

#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct Conntrack {
    dreg: Option<Register>,
    key: Option<ConntrackKey>,
    direction: Option<u8>,
    sreg: Option<Register>,
}

impl_attr_getters_and_setters!(Conntrack, nested = true, [
    (dreg, get_dreg, set_dreg, with_dreg, NFTA_CT_DREG, Register),
    (key, get_key, set_key, with_key, NFTA_CT_KEY, ConntrackKey),
    (direction, get_direction, set_direction, with_direction, NFTA_CT_DIRECTION, u8),
    (sreg, get_sreg, set_sreg, with_sreg, NFTA_CT_SREG, Register),
]);
impl_nested_deserialize!(Conntrack);

impl Expression for Conntrack {
    fn get_name() -> &'static str {
        "ct"
    }
}

impl Conntrack {
    /// Loads the `key` conntrack value of the packet in the first register.
    pub fn new(key: ConntrackKey) -> Self {
        Self::default().with_dreg(Register::Reg1).with_key(key)
    }
}
