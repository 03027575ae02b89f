use std::{fmt::Debug, mem::size_of};

use crate::{
    error::DecodeError,
    sys::{
        nlmsghdr, NFNETLINK_V0, NFNL_MSG_BATCH_BEGIN, NFNL_MSG_BATCH_END, NFNL_SUBSYS_NFTABLES,
        NLMSG_ALIGNTO, NLM_F_ACK, NLM_F_CREATE, NLM_F_REQUEST,
    },
    MsgType, ProtocolFamily,
};

pub type NetlinkType = u16;

#[inline]
pub const fn pad_netlink_object_with_variable_size(size: usize) -> usize {
    // align on a 4 bytes boundary
    (size + (NLMSG_ALIGNTO as usize - 1)) & !(NLMSG_ALIGNTO as usize - 1)
}

#[inline]
pub const fn pad_netlink_object<T>() -> usize {
    let size = size_of::<T>();
    pad_netlink_object_with_variable_size(size)
}

/// `struct nfgenmsg`, the nfnetlink header following every `nlmsghdr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Nfgenmsg {
    pub family: u8,
    pub version: u8,
    /// Stored in network byte order on the wire.
    pub res_id: u16,
}

impl Nfgenmsg {
    pub const SIZE: usize = 4;
}

/// Appends netlink messages to a byte buffer.
///
/// Every header opened with [`write_header`] stays "open" until [`finalize_writing_object`] is
/// called: the data appended in between is accounted in its `nlmsg_len`.
///
/// [`write_header`]: NfNetlinkWriter::write_header
/// [`finalize_writing_object`]: NfNetlinkWriter::finalize_writing_object
pub struct NfNetlinkWriter<'a> {
    buf: &'a mut Vec<u8>,
    // offsets of the headers that are still being written
    headers: Vec<usize>,
}

impl<'a> NfNetlinkWriter<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> NfNetlinkWriter<'a> {
        NfNetlinkWriter {
            buf,
            headers: Vec::new(),
        }
    }

    pub fn add_data_zeroed(&mut self, size: usize) -> &mut [u8] {
        let padded_size = pad_netlink_object_with_variable_size(size);
        let start = self.buf.len();
        self.buf.resize(start + padded_size, 0);

        for &hdr in &self.headers {
            let len_field = &mut self.buf[hdr..hdr + 4];
            let len = u32::from_ne_bytes([len_field[0], len_field[1], len_field[2], len_field[3]]);
            len_field.copy_from_slice(&(len + padded_size as u32).to_ne_bytes());
        }

        &mut self.buf[start..start + size]
    }

    // rewrite of `__nftnl_nlmsg_build_hdr`
    pub fn write_header(
        &mut self,
        msg_type: u16,
        family: ProtocolFamily,
        flags: u16,
        seq: u32,
        ressource_id: Option<u16>,
    ) {
        let start = self.buf.len();
        let nlmsghdr_len = pad_netlink_object::<nlmsghdr>();

        let mut nlmsg_type = msg_type;
        // batch messages are not specific to the nftables subsystem
        if msg_type != NFNL_MSG_BATCH_BEGIN && msg_type != NFNL_MSG_BATCH_END {
            nlmsg_type |= NFNL_SUBSYS_NFTABLES << 8;
        }

        let hdr = self.add_data_zeroed(nlmsghdr_len);
        // nlmsg_len is filled in by the size accounting below
        hdr[4..6].copy_from_slice(&nlmsg_type.to_ne_bytes());
        hdr[6..8].copy_from_slice(&(NLM_F_REQUEST | flags).to_ne_bytes());
        hdr[8..12].copy_from_slice(&seq.to_ne_bytes());
        self.buf[start..start + 4].copy_from_slice(&(nlmsghdr_len as u32).to_ne_bytes());
        self.headers.push(start);

        let nfgenmsg = self.add_data_zeroed(Nfgenmsg::SIZE);
        nfgenmsg[0] = family as u8;
        nfgenmsg[1] = NFNETLINK_V0;
        nfgenmsg[2..4].copy_from_slice(&ressource_id.unwrap_or(0).to_be_bytes());
    }

    pub fn finalize_writing_object(&mut self) {
        self.headers.pop();
    }
}

/// A value that can be written as the payload of a netlink attribute.
pub trait NfNetlinkAttribute: Debug + Sized {
    /// Nested attributes get the `NLA_F_NESTED` flag in their header.
    fn is_nested(&self) -> bool {
        false
    }

    /// Size of the payload, without the trailing alignment padding.
    fn get_size(&self) -> usize {
        size_of::<Self>()
    }

    /// Writes the payload in `buf`, which holds at least `get_size()` bytes.
    fn write_payload(&self, buf: &mut [u8]);
}

pub trait NfNetlinkDeserializable: Sized {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError>;
}

/// A top-level nf_tables object (table, chain, rule) that can be added to or removed from the
/// kernel.
pub trait NfNetlinkObject: NfNetlinkAttribute + NfNetlinkDeserializable {
    const MSG_TYPE_ADD: u16;
    const MSG_TYPE_DEL: u16;

    fn get_family(&self) -> ProtocolFamily;

    fn set_family(&mut self, family: ProtocolFamily);

    fn get_add_flags(&self) -> u16 {
        NLM_F_CREATE
    }

    fn add_or_remove(&self, writer: &mut NfNetlinkWriter<'_>, msg_type: MsgType, seq: u32) {
        let (raw_msg_type, flags) = match msg_type {
            MsgType::Add => (Self::MSG_TYPE_ADD, self.get_add_flags()),
            MsgType::Del => (Self::MSG_TYPE_DEL, 0),
        };
        writer.write_header(
            raw_msg_type,
            self.get_family(),
            flags | NLM_F_ACK,
            seq,
            None,
        );
        let buf = writer.add_data_zeroed(self.get_size());
        self.write_payload(buf);
        writer.finalize_writing_object();
    }
}
