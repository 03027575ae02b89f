use super::{Expression, Register};
use crate::{
    impl_attr_getters_and_setters, impl_nested_deserialize, nfnetlink_enum,
    sys::{
        NFTA_META_DREG, NFTA_META_KEY, NFTA_META_SREG, NFT_META_IIF, NFT_META_IIFNAME,
        NFT_META_L4PROTO, NFT_META_LEN, NFT_META_MARK, NFT_META_NFPROTO, NFT_META_OIF,
        NFT_META_OIFNAME, NFT_META_PROTOCOL,
    },
};

nfnetlink_enum! {
    /// A meta expression refers to meta data associated with a packet.
    pub enum MetaType: u32 {
        /// Packet length (skb->len).
        Len = NFT_META_LEN,
        /// Packet ethertype protocol (skb->protocol), invalid in OUTPUT.
        Protocol = NFT_META_PROTOCOL,
        /// Packet mark.
        Mark = NFT_META_MARK,
        /// Packet input interface index (dev->ifindex).
        Iif = NFT_META_IIF,
        /// Packet output interface index (dev->ifindex).
        Oif = NFT_META_OIF,
        /// Packet input interface name (dev->name).
        IifName = NFT_META_IIFNAME,
        /// Packet output interface name (dev->name).
        OifName = NFT_META_OIFNAME,
        /// Netfilter protocol (Transport layer protocol).
        NfProto = NFT_META_NFPROTO,
        /// Layer 4 protocol number.
        L4Proto = NFT_META_L4PROTO,
    }
}

#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Meta {
    dreg: Option<Register>,
    key: Option<MetaType>,
    sreg: Option<Register>,
}

impl_attr_getters_and_setters!(Meta, nested = true, [
    (dreg, get_dreg, set_dreg, with_dreg, NFTA_META_DREG, Register),
    (key, get_key, set_key, with_key, NFTA_META_KEY, MetaType),
    (sreg, get_sreg, set_sreg, with_sreg, NFTA_META_SREG, Register),
]);
impl_nested_deserialize!(Meta);

impl Meta {
    /// Loads the `ty` meta value of the packet in the first register.
    pub fn new(ty: MetaType) -> Self {
        Meta::default().with_dreg(Register::Reg1).with_key(ty)
    }
}

impl Expression for Meta {
    fn get_name() -> &'static str {
        "meta"
    }
}
