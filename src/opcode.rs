//! Known Message Opcodes
//!
//! Labels the 32-bit operation codes that staking pool, vesting and wallet
//! contracts put at the head of a message body.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Opcodes recognised when labelling decoded messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownOpcode {
    /// Plain text comment - 0x00000000
    TextComment,
    /// Pool stake deposit - 0x7bcd1fef
    StakeDeposit,
    /// Pool stake withdraw - 0xda803efd
    StakeWithdraw,
    /// Pool accept deposit - 0x99a811fb
    AcceptDeposit,
    /// Pool accept withdraw - 0xa19fd934
    AcceptWithdraw,
    /// Vesting wallet send - 0xa7733acd
    VestingSend,
    /// Vesting wallet add whitelist - 0x7258a69b
    AddWhitelist,
    /// Bounced message - 0xffffffff
    Bounce,
}

impl KnownOpcode {
    pub const ALL: [KnownOpcode; 8] = [
        KnownOpcode::TextComment,
        KnownOpcode::StakeDeposit,
        KnownOpcode::StakeWithdraw,
        KnownOpcode::AcceptDeposit,
        KnownOpcode::AcceptWithdraw,
        KnownOpcode::VestingSend,
        KnownOpcode::AddWhitelist,
        KnownOpcode::Bounce,
    ];

    /// Returns the 32-bit opcode
    pub fn code(&self) -> u32 {
        match self {
            KnownOpcode::TextComment => 0x0000_0000,
            KnownOpcode::StakeDeposit => 0x7bcd_1fef,
            KnownOpcode::StakeWithdraw => 0xda80_3efd,
            KnownOpcode::AcceptDeposit => 0x99a8_11fb,
            KnownOpcode::AcceptWithdraw => 0xa19f_d934,
            KnownOpcode::VestingSend => 0xa773_3acd,
            KnownOpcode::AddWhitelist => 0x7258_a69b,
            KnownOpcode::Bounce => 0xffff_ffff,
        }
    }

    /// Returns the contract-side operation name
    pub fn name(&self) -> &'static str {
        match self {
            KnownOpcode::TextComment => "text_comment",
            KnownOpcode::StakeDeposit => "stake_deposit",
            KnownOpcode::StakeWithdraw => "stake_withdraw",
            KnownOpcode::AcceptDeposit => "accept_deposit",
            KnownOpcode::AcceptWithdraw => "accept_withdraw",
            KnownOpcode::VestingSend => "send",
            KnownOpcode::AddWhitelist => "add_whitelist",
            KnownOpcode::Bounce => "bounce",
        }
    }

    /// Returns the opcode as `0x`-prefixed, zero-padded hex
    pub fn hex(&self) -> String {
        format!("{:#010x}", self.code())
    }
}

static KNOWN_OPCODES: LazyLock<HashMap<u32, KnownOpcode>> =
    LazyLock::new(|| KnownOpcode::ALL.iter().map(|op| (op.code(), *op)).collect());

/// Look up a known opcode
pub fn lookup_opcode(code: u32) -> Option<KnownOpcode> {
    KNOWN_OPCODES.get(&code).copied()
}

/// Operation name for a code, if known
pub fn opcode_name(code: u32) -> Option<&'static str> {
    lookup_opcode(code).map(|op| op.name())
}
