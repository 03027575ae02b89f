use super::{Expression, Register};
use crate::{
    impl_attr_getters_and_setters, impl_nested_deserialize, nfnetlink_enum,
    sys::{
        NFTA_PAYLOAD_BASE, NFTA_PAYLOAD_DREG, NFTA_PAYLOAD_LEN, NFTA_PAYLOAD_OFFSET,
        NFTA_PAYLOAD_SREG, NFT_PAYLOAD_LL_HEADER, NFT_PAYLOAD_NETWORK_HEADER,
        NFT_PAYLOAD_TRANSPORT_HEADER,
    },
};

nfnetlink_enum! {
    /// The header a payload offset is relative to.
    pub enum PayloadBase: u32 {
        LinkLayer = NFT_PAYLOAD_LL_HEADER,
        Network = NFT_PAYLOAD_NETWORK_HEADER,
        Transport = NFT_PAYLOAD_TRANSPORT_HEADER,
    }
}

/// Payload expressions refer to data from the packet's payload.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    dreg: Option<Register>,
    base: Option<PayloadBase>,
    offset: Option<u32>,
    len: Option<u32>,
    sreg: Option<Register>,
}

impl_attr_getters_and_setters!(Payload, nested = true, [
    (dreg, get_dreg, set_dreg, with_dreg, NFTA_PAYLOAD_DREG, Register),
    (base, get_base, set_base, with_base, NFTA_PAYLOAD_BASE, PayloadBase),
    (offset, get_offset, set_offset, with_offset, NFTA_PAYLOAD_OFFSET, u32),
    (len, get_len, set_len, with_len, NFTA_PAYLOAD_LEN, u32),
    (sreg, get_sreg, set_sreg, with_sreg, NFTA_PAYLOAD_SREG, Register),
]);
impl_nested_deserialize!(Payload);

impl Payload {
    /// The header field this payload loads, if it is one we know about.
    pub fn field(&self) -> Option<HighLevelPayload> {
        let (offset, len) = (*self.offset.as_ref()?, *self.len.as_ref()?);
        match self.base? {
            PayloadBase::Network => {
                IPv4HeaderField::from_raw_data(offset, len).map(HighLevelPayload::Network)
            }
            PayloadBase::Transport => {
                TransportHeaderField::from_raw_data(offset, len).map(HighLevelPayload::Transport)
            }
            PayloadBase::LinkLayer => None,
        }
    }
}

impl Expression for Payload {
    fn get_name() -> &'static str {
        "payload"
    }
}

/// A named header field, turned into a raw [`Payload`] load with [`build`].
///
/// [`build`]: HighLevelPayload::build
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HighLevelPayload {
    Network(IPv4HeaderField),
    Transport(TransportHeaderField),
}

impl HighLevelPayload {
    pub fn build(&self) -> Payload {
        match *self {
            HighLevelPayload::Network(ref f) => Payload::default()
                .with_base(PayloadBase::Network)
                .with_offset(f.offset())
                .with_len(f.len()),
            HighLevelPayload::Transport(ref f) => Payload::default()
                .with_base(PayloadBase::Transport)
                .with_offset(f.offset())
                .with_len(f.len()),
        }
        .with_dreg(Register::Reg1)
    }
}

pub trait HeaderField {
    fn offset(&self) -> u32;
    fn len(&self) -> u32;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IPv4HeaderField {
    Ttl,
    Protocol,
    Saddr,
    Daddr,
}

impl HeaderField for IPv4HeaderField {
    fn offset(&self) -> u32 {
        use self::IPv4HeaderField::*;
        match *self {
            Ttl => 8,
            Protocol => 9,
            Saddr => 12,
            Daddr => 16,
        }
    }

    fn len(&self) -> u32 {
        use self::IPv4HeaderField::*;
        match *self {
            Ttl => 1,
            Protocol => 1,
            Saddr => 4,
            Daddr => 4,
        }
    }
}

impl IPv4HeaderField {
    pub fn from_raw_data(offset: u32, len: u32) -> Option<Self> {
        Some(match (offset, len) {
            (8, 1) => Self::Ttl,
            (9, 1) => Self::Protocol,
            (12, 4) => Self::Saddr,
            (16, 4) => Self::Daddr,
            _ => return None,
        })
    }
}

/// TCP and UDP share the layout of their first four bytes: source port, then destination port.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TransportHeaderField {
    Sport,
    Dport,
}

impl HeaderField for TransportHeaderField {
    fn offset(&self) -> u32 {
        match *self {
            TransportHeaderField::Sport => 0,
            TransportHeaderField::Dport => 2,
        }
    }

    fn len(&self) -> u32 {
        2
    }
}

impl TransportHeaderField {
    pub fn from_raw_data(offset: u32, len: u32) -> Option<Self> {
        Some(match (offset, len) {
            (0, 2) => Self::Sport,
            (2, 2) => Self::Dport,
            _ => return None,
        })
    }
}
