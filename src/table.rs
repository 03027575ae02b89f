use crate::error::DecodeError;
use crate::impl_attr_getters_and_setters;
use crate::nlmsg::{NfNetlinkDeserializable, NfNetlinkObject};
use crate::parser::deserialize_object;
use crate::sys::{
    NFTA_TABLE_FLAGS, NFTA_TABLE_HANDLE, NFTA_TABLE_NAME, NFTA_TABLE_USE, NFTA_TABLE_USERDATA,
    NFT_MSG_DELTABLE, NFT_MSG_NEWTABLE,
};
use crate::ProtocolFamily;

/// Abstraction of a `nftnl_table`, the top level container in netfilter. A table has a protocol
/// family and contains [`Chain`]s that in turn hold the rules.
///
/// [`Chain`]: crate::Chain
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Table {
    family: ProtocolFamily,
    name: Option<String>,
    flags: Option<u32>,
    use_count: Option<u32>,
    handle: Option<u64>,
    userdata: Option<Vec<u8>>,
}

impl_attr_getters_and_setters!(Table, nested = false, [
    (name, get_name, set_name, with_name, NFTA_TABLE_NAME, String),
    (flags, get_flags, set_flags, with_flags, NFTA_TABLE_FLAGS, u32),
    (use_count, get_use, set_use, with_use, NFTA_TABLE_USE, u32),
    (handle, get_handle, set_handle, with_handle, NFTA_TABLE_HANDLE, u64),
    (userdata, get_userdata, set_userdata, with_userdata, NFTA_TABLE_USERDATA, Vec<u8>),
]);

impl Table {
    pub fn new(family: ProtocolFamily) -> Table {
        let mut res = Table::default();
        res.family = family;
        res
    }

    /// Whether `other` designates the same kernel table (same family and name).
    pub fn is_same(&self, other: &Table) -> bool {
        self.family == other.family && self.name == other.name
    }
}

impl NfNetlinkObject for Table {
    const MSG_TYPE_ADD: u16 = NFT_MSG_NEWTABLE;
    const MSG_TYPE_DEL: u16 = NFT_MSG_DELTABLE;

    fn get_family(&self) -> ProtocolFamily {
        self.family
    }

    fn set_family(&mut self, family: ProtocolFamily) {
        self.family = family;
    }
}

impl NfNetlinkDeserializable for Table {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        deserialize_object(buf)
    }
}
