//! A module with all the nftables expressions that can be added to [`Rule`]s to build up how
//! they match against packets.
//!
//! Only the expressions the firewall engine emits are modelled. Anything else found in a kernel
//! rule is kept as a [`RawExpression`] so that foreign rules can still be listed and deleted.
//!
//! [`Rule`]: crate::Rule

use std::fmt::Debug;

use crate::error::DecodeError;
use crate::nlmsg::{NfNetlinkAttribute, NfNetlinkDeserializable};
use crate::parser::{attribute_size, write_attribute, NfNetlinkAttributeReader};
use crate::sys::{NFTA_EXPR_DATA, NFTA_EXPR_NAME, NFTA_LIST_ELEM};

mod bitwise;
pub use self::bitwise::*;

mod cmp;
pub use self::cmp::*;

mod counter;
pub use self::counter::*;

pub mod ct;
pub use self::ct::*;

mod immediate;
pub use self::immediate::*;

mod meta;
pub use self::meta::*;

mod payload;
pub use self::payload::*;

mod register;
pub use self::register::Register;

mod verdict;
pub use self::verdict::*;

pub trait Expression {
    fn get_name() -> &'static str;
}

/// An expression this crate has no model for, or could not decode. The attributes of its
/// `NFTA_EXPR_DATA` nest are kept verbatim so it can be written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExpression {
    pub name: String,
    pub data: Vec<u8>,
}

// an already-encoded attribute nest
#[derive(Debug)]
struct RawNest<'a>(&'a [u8]);

impl<'a> NfNetlinkAttribute for RawNest<'a> {
    fn is_nested(&self) -> bool {
        true
    }

    fn get_size(&self) -> usize {
        self.0.len()
    }

    fn write_payload(&self, buf: &mut [u8]) {
        buf[..self.0.len()].copy_from_slice(self.0);
    }
}

macro_rules! create_expr_variant {
    ($enum:ident $(, [$name:ident, $type:ty])+) => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum $enum {
            $(
                $name($type),
            )+
            Raw(RawExpression),
        }

        impl $enum {
            /// The kernel name of the expression (`cmp`, `payload`...).
            pub fn name(&self) -> &str {
                match self {
                    $(
                        $enum::$name(_) => <$type>::get_name(),
                    )+
                    $enum::Raw(raw) => &raw.name,
                }
            }

            fn data_size(&self) -> usize {
                match self {
                    $(
                        $enum::$name(val) => attribute_size(val),
                    )+
                    $enum::Raw(raw) => attribute_size(&RawNest(&raw.data)),
                }
            }

            fn write_data(&self, buf: &mut [u8]) {
                match self {
                    $(
                        $enum::$name(val) => write_attribute(NFTA_EXPR_DATA, val, buf),
                    )+
                    $enum::Raw(raw) => write_attribute(NFTA_EXPR_DATA, &RawNest(&raw.data), buf),
                }
            }

            // An expression whose data fails to decode is kept raw instead of failing the whole
            // rule.
            fn decode(name: String, data: &[u8]) -> Self {
                $(
                    if name == <$type>::get_name() {
                        match <$type>::deserialize(data) {
                            Ok((val, _)) => return $enum::$name(val),
                            Err(e) => debug!("Keeping undecodable '{}' expression raw: {}", name, e),
                        }
                    }
                )+
                $enum::Raw(RawExpression { name, data: data.to_vec() })
            }
        }

        $(
            impl From<$type> for $enum {
                fn from(val: $type) -> Self {
                    $enum::$name(val)
                }
            }
        )+

        impl From<RawExpression> for $enum {
            fn from(val: RawExpression) -> Self {
                $enum::Raw(val)
            }
        }
    };
}

create_expr_variant!(
    ExpressionVariant,
    [Bitwise, Bitwise],
    [Cmp, Cmp],
    [Conntrack, Conntrack],
    [Counter, Counter],
    [Immediate, Immediate],
    [Meta, Meta],
    [Payload, Payload]
);

// the content of a NFTA_LIST_ELEM: the expression name followed by its data
impl NfNetlinkAttribute for ExpressionVariant {
    fn is_nested(&self) -> bool {
        true
    }

    fn get_size(&self) -> usize {
        attribute_size(&self.name().to_string()) + self.data_size()
    }

    fn write_payload(&self, buf: &mut [u8]) {
        let name = self.name().to_string();
        write_attribute(NFTA_EXPR_NAME, &name, buf);
        self.write_data(&mut buf[attribute_size(&name)..]);
    }
}

impl NfNetlinkDeserializable for ExpressionVariant {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let mut name = None;
        let mut data: &[u8] = &[];
        for attr in NfNetlinkAttributeReader::new(buf) {
            let (attr_type, payload) = attr?;
            match attr_type {
                NFTA_EXPR_NAME => name = Some(String::deserialize(payload)?.0),
                NFTA_EXPR_DATA => data = payload,
                x => debug!("Ignore attribute type {} in an expression", x),
            }
        }
        let name = name.ok_or(DecodeError::MissingExpressionName)?;
        Ok((ExpressionVariant::decode(name, data), &[]))
    }
}

/// The ordered expressions of a rule (`NFTA_RULE_EXPRESSIONS`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpressionList {
    exprs: Vec<ExpressionVariant>,
}

impl ExpressionList {
    pub fn add_value(&mut self, e: impl Into<ExpressionVariant>) {
        self.exprs.push(e.into());
    }

    pub fn with_value(mut self, e: impl Into<ExpressionVariant>) -> Self {
        self.add_value(e);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExpressionVariant> {
        self.exprs.iter()
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}

impl From<Vec<ExpressionVariant>> for ExpressionList {
    fn from(exprs: Vec<ExpressionVariant>) -> Self {
        ExpressionList { exprs }
    }
}

impl NfNetlinkAttribute for ExpressionList {
    fn is_nested(&self) -> bool {
        true
    }

    fn get_size(&self) -> usize {
        // one nlattr LIST_ELEM per object
        self.exprs.iter().map(attribute_size).sum()
    }

    fn write_payload(&self, buf: &mut [u8]) {
        let mut pos = 0;
        for item in &self.exprs {
            write_attribute(NFTA_LIST_ELEM, item, &mut buf[pos..]);
            pos += attribute_size(item);
        }
    }
}

impl NfNetlinkDeserializable for ExpressionList {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let mut exprs = Vec::new();
        for attr in NfNetlinkAttributeReader::new(buf) {
            let (attr_type, payload) = attr?;
            if attr_type != NFTA_LIST_ELEM {
                return Err(DecodeError::UnsupportedType(attr_type));
            }
            exprs.push(ExpressionVariant::deserialize(payload)?.0);
        }
        Ok((Self { exprs }, &[]))
    }
}
