use super::{Expression, Register, Verdict, VerdictKind, VerdictType};
use crate::{
    impl_attr_getters_and_setters, impl_nested_deserialize,
    parser_impls::NfNetlinkData,
    sys::{NFTA_IMMEDIATE_DATA, NFTA_IMMEDIATE_DREG},
};

#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Immediate {
    dreg: Option<Register>,
    data: Option<NfNetlinkData>,
}

impl_attr_getters_and_setters!(Immediate, nested = true, [
    (dreg, get_dreg, set_dreg, with_dreg, NFTA_IMMEDIATE_DREG, Register),
    (data, get_data, set_data, with_data, NFTA_IMMEDIATE_DATA, NfNetlinkData),
]);
impl_nested_deserialize!(Immediate);

impl Immediate {
    pub fn new_data(data: Vec<u8>, register: Register) -> Self {
        Immediate::default()
            .with_dreg(register)
            .with_data(NfNetlinkData::default().with_value(data))
    }

    pub fn new_verdict(kind: VerdictKind) -> Self {
        let code = match kind {
            VerdictKind::Drop => VerdictType::Drop,
            VerdictKind::Accept => VerdictType::Accept,
            VerdictKind::Queue => VerdictType::Queue,
            VerdictKind::Continue => VerdictType::Continue,
            VerdictKind::Break => VerdictType::Break,
            VerdictKind::Jump { .. } => VerdictType::Jump,
            VerdictKind::Goto { .. } => VerdictType::Goto,
            VerdictKind::Return => VerdictType::Return,
        };
        let mut data = Verdict::default().with_code(code);
        if let VerdictKind::Jump { chain } | VerdictKind::Goto { chain } = kind {
            data.set_chain(chain);
        }
        Immediate::default()
            .with_dreg(Register::Verdict)
            .with_data(NfNetlinkData::default().with_verdict(data))
    }

    /// The verdict this expression sets, if it loads one into the verdict register.
    pub fn verdict(&self) -> Option<VerdictKind> {
        if self.dreg != Some(Register::Verdict) {
            return None;
        }
        self.data.as_ref()?.get_verdict()?.kind()
    }
}

impl Expression for Immediate {
    fn get_name() -> &'static str {
        "immediate"
    }
}
