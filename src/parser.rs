use std::{convert::TryFrom, mem::size_of};

use nix::errno::Errno;

use crate::{
    error::DecodeError,
    nlmsg::{
        pad_netlink_object, pad_netlink_object_with_variable_size, NetlinkType,
        NfNetlinkAttribute, NfNetlinkObject, Nfgenmsg,
    },
    sys::{
        nlattr, nlmsghdr, NFNETLINK_V0, NFNL_MSG_BATCH_BEGIN, NFNL_MSG_BATCH_END,
        NFNL_SUBSYS_NFTABLES, NLA_F_NESTED, NLA_TYPE_MASK, NLMSG_DONE, NLMSG_ERROR,
        NLMSG_MIN_TYPE, NLMSG_NOOP, NLM_F_DUMP_INTR,
    },
    ProtocolFamily,
};

/// The largest nf_tables netlink message is the set element message, which contains the
/// NFTA_SET_ELEM_LIST_ELEMENTS attribute. This attribute is a nest that describes the set
/// elements. Given that the netlink attribute length (nla_len) is 16 bits, the largest message is
/// a bit larger than 64 KBytes.
pub fn nft_nlmsg_maxsize() -> u32 {
    u32::from(u16::MAX) + unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u32
}

pub fn get_subsystem_from_nlmsghdr_type(x: u16) -> u8 {
    ((x & 0xff00) >> 8) as u8
}

pub fn get_operation_from_nlmsghdr_type(x: u16) -> u8 {
    (x & 0x00ff) as u8
}

fn read_u16(buf: &[u8], pos: usize) -> u16 {
    u16::from_ne_bytes([buf[pos], buf[pos + 1]])
}

fn read_u32(buf: &[u8], pos: usize) -> u32 {
    u32::from_ne_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}

pub fn get_nlmsghdr(buf: &[u8]) -> Result<nlmsghdr, DecodeError> {
    let size_of_hdr = size_of::<nlmsghdr>();

    if buf.len() < size_of_hdr {
        return Err(DecodeError::BufTooSmall);
    }

    let hdr = nlmsghdr {
        nlmsg_len: read_u32(buf, 0),
        nlmsg_type: read_u16(buf, 4),
        nlmsg_flags: read_u16(buf, 6),
        nlmsg_seq: read_u32(buf, 8),
        nlmsg_pid: read_u32(buf, 12),
    };

    if hdr.nlmsg_len as usize > buf.len() || (hdr.nlmsg_len as usize) < size_of_hdr {
        return Err(DecodeError::NlMsgTooSmall);
    }

    if hdr.nlmsg_flags & NLM_F_DUMP_INTR != 0 {
        return Err(DecodeError::ConcurrentGenerationUpdate);
    }

    Ok(hdr)
}

#[derive(Debug)]
pub enum NlMsg<'a> {
    Done,
    Noop,
    /// An `NLMSG_ERROR` message. A zero errno is an acknowledgement.
    Error(Option<Errno>),
    NfGenMsg(Nfgenmsg, &'a [u8]),
}

pub fn parse_nlmsg(buf: &[u8]) -> Result<(nlmsghdr, NlMsg<'_>), DecodeError> {
    // in theory the message is composed of the following parts:
    // - nlmsghdr (contains the message size and type)
    // - struct nlmsgerr OR nfgenmsg (nftables header that describes the message family)
    // - the raw value that we want to validate (if the previous part is nfgenmsg)
    let hdr = get_nlmsghdr(buf)?;

    let size_of_hdr = pad_netlink_object::<nlmsghdr>();

    if hdr.nlmsg_type < NLMSG_MIN_TYPE {
        match hdr.nlmsg_type {
            NLMSG_NOOP => return Ok((hdr, NlMsg::Noop)),
            NLMSG_ERROR => {
                if (hdr.nlmsg_len as usize) < size_of_hdr + size_of::<i32>() {
                    return Err(DecodeError::NlMsgTooSmall);
                }
                // some APIs return negative values, while other return positive values
                let code = (read_u32(buf, size_of_hdr) as i32).abs();
                let err = if code == 0 {
                    None
                } else {
                    Some(Errno::from_i32(code))
                };
                return Ok((hdr, NlMsg::Error(err)));
            }
            NLMSG_DONE => return Ok((hdr, NlMsg::Done)),
            x => return Err(DecodeError::UnsupportedType(x)),
        }
    }

    // batch messages are not specific to the nftables subsystem
    if hdr.nlmsg_type != NFNL_MSG_BATCH_BEGIN && hdr.nlmsg_type != NFNL_MSG_BATCH_END {
        // verify that we are decoding nftables messages
        let subsys = get_subsystem_from_nlmsghdr_type(hdr.nlmsg_type);
        if subsys != NFNL_SUBSYS_NFTABLES as u8 {
            return Err(DecodeError::InvalidSubsystem(subsys));
        }
    }

    let size_of_nfgenmsg = pad_netlink_object_with_variable_size(Nfgenmsg::SIZE);
    if (hdr.nlmsg_len as usize) < size_of_hdr + size_of_nfgenmsg {
        return Err(DecodeError::NlMsgTooSmall);
    }

    let nfgenmsg = Nfgenmsg {
        family: buf[size_of_hdr],
        version: buf[size_of_hdr + 1],
        res_id: u16::from_be_bytes([buf[size_of_hdr + 2], buf[size_of_hdr + 3]]),
    };

    if nfgenmsg.version != NFNETLINK_V0 {
        return Err(DecodeError::InvalidVersion(nfgenmsg.version));
    }

    let raw_value = &buf[size_of_hdr + size_of_nfgenmsg..hdr.nlmsg_len as usize];

    Ok((hdr, NlMsg::NfGenMsg(nfgenmsg, raw_value)))
}

/// Write the attribute, preceded by a `libc::nlattr`.
// rewrite of `mnl_attr_put`
pub fn write_attribute<T: NfNetlinkAttribute>(ty: NetlinkType, obj: &T, buf: &mut [u8]) {
    let header_len = pad_netlink_object::<nlattr>();
    // nla_len contains the header size + the unpadded attribute length
    let nla_len = (header_len + obj.get_size()) as u16;
    let nla_type = if obj.is_nested() {
        ty | NLA_F_NESTED
    } else {
        ty
    };

    buf[0..2].copy_from_slice(&nla_len.to_ne_bytes());
    buf[2..4].copy_from_slice(&nla_type.to_ne_bytes());
    obj.write_payload(&mut buf[header_len..header_len + obj.get_size()]);
}

/// Space taken by an attribute once written, header and padding included.
pub fn attribute_size<T: NfNetlinkAttribute>(obj: &T) -> usize {
    pad_netlink_object::<nlattr>() + pad_netlink_object_with_variable_size(obj.get_size())
}

/// Iterates over the attributes stored in a buffer, yielding their type (stripped of the
/// byteorder and nested flags) and their payload.
///
/// A truncated or inconsistent attribute ends the iteration with an error instead of panicking.
pub struct NfNetlinkAttributeReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> NfNetlinkAttributeReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl<'a> Iterator for NfNetlinkAttributeReader<'a> {
    type Item = Result<(NetlinkType, &'a [u8]), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let header_len = pad_netlink_object::<nlattr>();
        let remaining = self.buf.len() - self.pos;
        if remaining == 0 {
            return None;
        }
        if remaining < header_len {
            self.pos = self.buf.len();
            return Some(Err(DecodeError::InvalidDataSize));
        }

        let nla_len = read_u16(self.buf, self.pos) as usize;
        let nla_type = read_u16(self.buf, self.pos + 2) & NLA_TYPE_MASK;
        if nla_len < header_len || nla_len > remaining {
            self.pos = self.buf.len();
            return Some(Err(DecodeError::InvalidDataSize));
        }

        let payload = &self.buf[self.pos + header_len..self.pos + nla_len];
        self.pos = (self.pos + pad_netlink_object_with_variable_size(nla_len)).min(self.buf.len());

        Some(Ok((nla_type, payload)))
    }
}

/// Splits a top-level nf_tables message into its nfgenmsg header, its attributes and the data
/// that follows it in the buffer.
pub fn parse_object(
    buf: &[u8],
    add_obj: u16,
    del_obj: u16,
) -> Result<(Nfgenmsg, &[u8], &[u8]), DecodeError> {
    let (hdr, msg) = parse_nlmsg(buf)?;

    let op = get_operation_from_nlmsghdr_type(hdr.nlmsg_type) as u16;
    if op != add_obj && op != del_obj {
        return Err(DecodeError::UnexpectedType(hdr.nlmsg_type));
    }

    let remaining_data_offset =
        pad_netlink_object_with_variable_size(hdr.nlmsg_len as usize).min(buf.len());
    let remaining_data = &buf[remaining_data_offset..];

    match msg {
        NlMsg::NfGenMsg(nfgenmsg, content) => Ok((nfgenmsg, content, remaining_data)),
        _ => Err(DecodeError::UnexpectedType(hdr.nlmsg_type)),
    }
}

/// Generates, for a struct whose fields are all `Option`s, the typed accessors (`get_x`,
/// `set_x`, `with_x`), the netlink encoding of the fields in declaration order and the
/// `AttributeDecoder` that fills them back from a buffer.
///
/// Attributes with an unknown type are ignored, so that newer kernels adding attributes don't
/// break decoding.
#[macro_export]
macro_rules! impl_attr_getters_and_setters {
    ($struct:ident, nested = $nested:expr, [$(($field:ident, $getter_name:ident, $setter_name:ident, $in_place_edit_name:ident, $attr_name:expr, $type:ty)),+ $(,)?]) => {
        impl $struct {
            $(
                #[allow(dead_code)]
                pub fn $getter_name(&self) -> Option<&$type> {
                    self.$field.as_ref()
                }

                #[allow(dead_code)]
                pub fn $setter_name(&mut self, val: impl Into<$type>) {
                    self.$field = Some(val.into());
                }

                #[allow(dead_code)]
                pub fn $in_place_edit_name(mut self, val: impl Into<$type>) -> Self {
                    self.$field = Some(val.into());
                    self
                }
            )+
        }

        impl $crate::nlmsg::NfNetlinkAttribute for $struct {
            fn is_nested(&self) -> bool {
                $nested
            }

            fn get_size(&self) -> usize {
                let mut size = 0;
                $(
                    if let Some(val) = &self.$field {
                        size += $crate::parser::attribute_size(val);
                    }
                )+
                size
            }

            fn write_payload(&self, buf: &mut [u8]) {
                let mut pos = 0;
                $(
                    if let Some(val) = &self.$field {
                        $crate::parser::write_attribute($attr_name, val, &mut buf[pos..]);
                        pos += $crate::parser::attribute_size(val);
                    }
                )+
                let _ = pos;
            }
        }

        impl $crate::parser::AttributeDecoder for $struct {
            fn decode_attribute(
                &mut self,
                attr_type: $crate::nlmsg::NetlinkType,
                buf: &[u8],
            ) -> Result<(), $crate::error::DecodeError> {
                use $crate::nlmsg::NfNetlinkDeserializable;
                match attr_type {
                    $(
                        x if x == $attr_name => {
                            let (val, remaining) = <$type>::deserialize(buf)?;
                            if !remaining.is_empty() {
                                return Err($crate::error::DecodeError::InvalidDataSize);
                            }
                            self.$field = Some(val);
                        },
                    )+
                    _ => ::log::debug!(
                        "Ignore attribute type {} for type {}",
                        attr_type,
                        stringify!($struct)
                    ),
                }
                Ok(())
            }
        }
    };
}

/// Implements `NfNetlinkDeserializable` for an attribute holder that is embedded in another
/// object (as opposed to the top-level objects, parsed from a full netlink message).
#[macro_export]
macro_rules! impl_nested_deserialize {
    ($struct:ident) => {
        impl $crate::nlmsg::NfNetlinkDeserializable for $struct {
            fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), $crate::error::DecodeError> {
                let mut obj = Self::default();
                $crate::parser::AttributeDecoder::decode_attributes(&mut obj, buf)?;
                Ok((obj, &[]))
            }
        }
    };
}

/// Declares a fieldless enum mapped onto an integer netlink attribute.
#[macro_export]
macro_rules! nfnetlink_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident : $repr:ty { $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            pub fn value(&self) -> $repr {
                match self {
                    $(
                        $name::$variant => $value,
                    )+
                }
            }
        }

        impl std::convert::TryFrom<$repr> for $name {
            type Error = $crate::error::DecodeError;

            fn try_from(val: $repr) -> Result<Self, Self::Error> {
                $(
                    if val == $value {
                        return Ok($name::$variant);
                    }
                )+
                Err($crate::error::DecodeError::UnknownEnumValue(stringify!($name), val as i64))
            }
        }

        impl $crate::nlmsg::NfNetlinkAttribute for $name {
            fn get_size(&self) -> usize {
                std::mem::size_of::<$repr>()
            }

            fn write_payload(&self, buf: &mut [u8]) {
                $crate::nlmsg::NfNetlinkAttribute::write_payload(&self.value(), buf);
            }
        }

        impl $crate::nlmsg::NfNetlinkDeserializable for $name {
            fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), $crate::error::DecodeError> {
                use std::convert::TryFrom;
                use $crate::nlmsg::NfNetlinkDeserializable;
                let (v, remaining_data) = <$repr>::deserialize(buf)?;
                Ok(($name::try_from(v)?, remaining_data))
            }
        }
    };
}

pub trait AttributeDecoder {
    fn decode_attribute(&mut self, attr_type: NetlinkType, buf: &[u8]) -> Result<(), DecodeError>;

    fn decode_attributes(&mut self, buf: &[u8]) -> Result<(), DecodeError> {
        for attr in NfNetlinkAttributeReader::new(buf) {
            let (attr_type, payload) = attr?;
            self.decode_attribute(attr_type, payload)?;
        }
        Ok(())
    }
}

/// Decodes a top-level object (table, chain, rule) from a full netlink message, returning the
/// data that follows it in the buffer.
pub fn deserialize_object<T>(buf: &[u8]) -> Result<(T, &[u8]), DecodeError>
where
    T: NfNetlinkObject + AttributeDecoder + Default,
{
    let (nfgenmsg, attrs, remaining_data) = parse_object(buf, T::MSG_TYPE_ADD, T::MSG_TYPE_DEL)?;
    let mut obj = T::default();
    obj.decode_attributes(attrs)?;
    obj.set_family(ProtocolFamily::try_from(nfgenmsg.family as i32)?);

    Ok((obj, remaining_data))
}
