use std::fmt::Debug;

use crate::error::DecodeError;
use crate::nlmsg::{NfNetlinkAttribute, NfNetlinkDeserializable, NfNetlinkObject};
use crate::parser::deserialize_object;
use crate::sys::{
    NFTA_CHAIN_FLAGS, NFTA_CHAIN_HANDLE, NFTA_CHAIN_HOOK, NFTA_CHAIN_NAME, NFTA_CHAIN_POLICY,
    NFTA_CHAIN_TABLE, NFTA_CHAIN_TYPE, NFTA_CHAIN_USE, NFTA_HOOK_HOOKNUM, NFTA_HOOK_PRIORITY,
    NFT_MSG_DELCHAIN, NFT_MSG_NEWCHAIN, NF_ACCEPT, NF_DROP, NF_INET_FORWARD, NF_INET_LOCAL_IN,
    NF_INET_LOCAL_OUT, NF_INET_POST_ROUTING, NF_INET_PRE_ROUTING,
};
use crate::{impl_attr_getters_and_setters, impl_nested_deserialize, nfnetlink_enum};
use crate::{ProtocolFamily, Table};

pub type ChainPriority = i32;

nfnetlink_enum! {
    /// The netfilter event hooks a chain can register for.
    pub enum HookClass: u32 {
        /// Hook into the pre-routing stage of netfilter. Corresponds to `NF_INET_PRE_ROUTING`.
        PreRouting = NF_INET_PRE_ROUTING,
        /// Hook into the input stage of netfilter. Corresponds to `NF_INET_LOCAL_IN`.
        In = NF_INET_LOCAL_IN,
        /// Hook into the forward stage of netfilter. Corresponds to `NF_INET_FORWARD`.
        Forward = NF_INET_FORWARD,
        /// Hook into the output stage of netfilter. Corresponds to `NF_INET_LOCAL_OUT`.
        Out = NF_INET_LOCAL_OUT,
        /// Hook into the post-routing stage of netfilter. Corresponds to `NF_INET_POST_ROUTING`.
        PostRouting = NF_INET_POST_ROUTING,
    }
}

#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Hook {
    class: Option<HookClass>,
    priority: Option<u32>,
}

impl_attr_getters_and_setters!(Hook, nested = true, [
    (class, get_class, set_class, with_class, NFTA_HOOK_HOOKNUM, HookClass),
    (priority, get_priority, set_priority, with_priority, NFTA_HOOK_PRIORITY, u32),
]);
impl_nested_deserialize!(Hook);

impl Hook {
    pub fn new(class: HookClass, priority: ChainPriority) -> Self {
        Hook::default()
            .with_class(class)
            .with_priority(priority as u32)
    }
}

nfnetlink_enum! {
    /// A chain policy. Decides what to do with a packet that was processed by the chain but did
    /// not match any rules.
    pub enum ChainPolicy: u32 {
        /// Accept the packet.
        Accept = NF_ACCEPT as u32,
        /// Drop the packet.
        Drop = NF_DROP as u32,
    }
}

/// Base chain type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ChainType {
    /// Used to filter packets.
    /// Supported protocols: ip, ip6, inet, arp, and bridge tables.
    Filter,
    /// Used to reroute packets if IP headers or packet marks are modified.
    /// Supported protocols: ip, and ip6 tables.
    Route,
    /// Used to perform NAT.
    /// Supported protocols: ip, and ip6 tables.
    Nat,
}

impl ChainType {
    fn as_str(&self) -> &'static str {
        match *self {
            ChainType::Filter => "filter",
            ChainType::Route => "route",
            ChainType::Nat => "nat",
        }
    }
}

impl NfNetlinkAttribute for ChainType {
    fn get_size(&self) -> usize {
        self.as_str().len() + 1
    }

    fn write_payload(&self, buf: &mut [u8]) {
        self.as_str().to_string().write_payload(buf);
    }
}

impl NfNetlinkDeserializable for ChainType {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let (s, remaining_data) = String::deserialize(buf)?;
        Ok((
            match s.as_str() {
                "filter" => ChainType::Filter,
                "route" => ChainType::Route,
                "nat" => ChainType::Nat,
                _ => return Err(DecodeError::UnknownChainType),
            },
            remaining_data,
        ))
    }
}

/// Abstraction of a `nftnl_chain`. Chains reside inside [`Table`]s and they hold [`Rule`]s.
///
/// A chain with a [`Hook`] is a "base chain": netfilter feeds it packets at that hook. Chains
/// without a hook are only reached by jumping to them.
///
/// [`Rule`]: crate::Rule
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Chain {
    family: ProtocolFamily,
    table: Option<String>,
    name: Option<String>,
    handle: Option<u64>,
    hook: Option<Hook>,
    policy: Option<ChainPolicy>,
    use_count: Option<u32>,
    chain_type: Option<ChainType>,
    flags: Option<u32>,
}

impl_attr_getters_and_setters!(Chain, nested = false, [
    (table, get_table, set_table, with_table, NFTA_CHAIN_TABLE, String),
    (handle, get_handle, set_handle, with_handle, NFTA_CHAIN_HANDLE, u64),
    (name, get_name, set_name, with_name, NFTA_CHAIN_NAME, String),
    (hook, get_hook, set_hook, with_hook, NFTA_CHAIN_HOOK, Hook),
    (policy, get_policy, set_policy, with_policy, NFTA_CHAIN_POLICY, ChainPolicy),
    (use_count, get_use, set_use, with_use, NFTA_CHAIN_USE, u32),
    (chain_type, get_type, set_type, with_type, NFTA_CHAIN_TYPE, ChainType),
    (flags, get_flags, set_flags, with_flags, NFTA_CHAIN_FLAGS, u32),
]);

impl Chain {
    /// Creates a new chain instance inside the given [`Table`].
    pub fn new(table: &Table) -> Chain {
        let mut chain = Chain::default();
        chain.family = table.get_family();

        if let Some(table_name) = table.get_name() {
            chain.set_table(table_name.as_str());
        }

        chain
    }

    /// Whether `other` designates the same kernel chain (same family, table and name).
    pub fn is_same(&self, other: &Chain) -> bool {
        self.family == other.family && self.table == other.table && self.name == other.name
    }
}

impl NfNetlinkObject for Chain {
    const MSG_TYPE_ADD: u16 = NFT_MSG_NEWCHAIN;
    const MSG_TYPE_DEL: u16 = NFT_MSG_DELCHAIN;

    fn get_family(&self) -> ProtocolFamily {
        self.family
    }

    fn set_family(&mut self, family: ProtocolFamily) {
        self.family = family;
    }
}

impl NfNetlinkDeserializable for Chain {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        deserialize_object(buf)
    }
}
