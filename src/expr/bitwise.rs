use super::{Expression, Register};
use crate::error::BuilderError;
use crate::parser_impls::NfNetlinkData;
use crate::sys::{
    NFTA_BITWISE_DREG, NFTA_BITWISE_LEN, NFTA_BITWISE_MASK, NFTA_BITWISE_SREG, NFTA_BITWISE_XOR,
};
use crate::{impl_attr_getters_and_setters, impl_nested_deserialize};

#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct Bitwise {
    sreg: Option<Register>,
    dreg: Option<Register>,
    len: Option<u32>,
    mask: Option<NfNetlinkData>,
    xor: Option<NfNetlinkData>,
}

impl_attr_getters_and_setters!(Bitwise, nested = true, [
    (sreg, get_sreg, set_sreg, with_sreg, NFTA_BITWISE_SREG, Register),
    (dreg, get_dreg, set_dreg, with_dreg, NFTA_BITWISE_DREG, Register),
    (len, get_len, set_len, with_len, NFTA_BITWISE_LEN, u32),
    (mask, get_mask, set_mask, with_mask, NFTA_BITWISE_MASK, NfNetlinkData),
    (xor, get_xor, set_xor, with_xor, NFTA_BITWISE_XOR, NfNetlinkData),
]);
impl_nested_deserialize!(Bitwise);

impl Expression for Bitwise {
    fn get_name() -> &'static str {
        "bitwise"
    }
}

impl Bitwise {
    /// Returns a new `Bitwise` instance that first masks the value it's applied to with `mask` and
    /// then performs xor with the value in `xor`
    pub fn new(mask: impl Into<Vec<u8>>, xor: impl Into<Vec<u8>>) -> Result<Self, BuilderError> {
        let mask = mask.into();
        let xor = xor.into();
        if mask.len() != xor.len() {
            return Err(BuilderError::IncompatibleLength);
        }
        Ok(Bitwise::default()
            .with_sreg(Register::Reg1)
            .with_dreg(Register::Reg1)
            .with_len(mask.len() as u32)
            .with_xor(NfNetlinkData::default().with_value(xor))
            .with_mask(NfNetlinkData::default().with_value(mask)))
    }
}
