use crate::nfnetlink_enum;
use crate::sys::{NFT_REG_1, NFT_REG_2, NFT_REG_3, NFT_REG_4, NFT_REG_VERDICT};

nfnetlink_enum! {
    /// A netfilter data register. The expressions store and read data to and from these when
    /// evaluating rule statements.
    pub enum Register: u32 {
        Verdict = NFT_REG_VERDICT,
        Reg1 = NFT_REG_1,
        Reg2 = NFT_REG_2,
        Reg3 = NFT_REG_3,
        Reg4 = NFT_REG_4,
    }
}
