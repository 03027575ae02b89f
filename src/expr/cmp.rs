use super::{Expression, Register};
use crate::{
    impl_attr_getters_and_setters, impl_nested_deserialize, nfnetlink_enum,
    parser_impls::NfNetlinkData,
    sys::{
        NFTA_CMP_DATA, NFTA_CMP_OP, NFTA_CMP_SREG, NFT_CMP_EQ, NFT_CMP_GT, NFT_CMP_GTE,
        NFT_CMP_LT, NFT_CMP_LTE, NFT_CMP_NEQ,
    },
};

nfnetlink_enum! {
    /// Comparison operator.
    pub enum CmpOp: u32 {
        /// Equals.
        Eq = NFT_CMP_EQ,
        /// Not equal.
        Neq = NFT_CMP_NEQ,
        /// Less than.
        Lt = NFT_CMP_LT,
        /// Less than, or equal.
        Lte = NFT_CMP_LTE,
        /// Greater than.
        Gt = NFT_CMP_GT,
        /// Greater than, or equal.
        Gte = NFT_CMP_GTE,
    }
}

/// Comparator expression. Allows comparing the content of the netfilter register with any value.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Cmp {
    sreg: Option<Register>,
    op: Option<CmpOp>,
    data: Option<NfNetlinkData>,
}

impl_attr_getters_and_setters!(Cmp, nested = true, [
    (sreg, get_sreg, set_sreg, with_sreg, NFTA_CMP_SREG, Register),
    (op, get_op, set_op, with_op, NFTA_CMP_OP, CmpOp),
    (data, get_data, set_data, with_data, NFTA_CMP_DATA, NfNetlinkData),
]);
impl_nested_deserialize!(Cmp);

impl Cmp {
    /// Returns a new comparison expression comparing the value loaded in the register with the
    /// data in `data` using the comparison operator `op`.
    pub fn new(op: CmpOp, data: impl Into<Vec<u8>>) -> Self {
        Cmp {
            sreg: Some(Register::Reg1),
            op: Some(op),
            data: Some(NfNetlinkData::default().with_value(data)),
        }
    }

    /// The raw value compared against, empty if the expression carries none.
    pub fn value(&self) -> &[u8] {
        self.data
            .as_ref()
            .and_then(|d| d.get_value())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

impl Expression for Cmp {
    fn get_name() -> &'static str {
        "cmp"
    }
}
