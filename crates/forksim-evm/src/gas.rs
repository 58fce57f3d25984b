//! Gas cost calculations
//!
//! Opcodes whose price depends on warmth, memory or operands carry only
//! their fixed part in [`static_gas`]; the interpreter charges the rest.

use crate::opcode::Opcode;
use primitive_types::U256;

/// Gas costs for EVM operations
pub mod cost {
    /// Zero gas
    pub const ZERO: u64 = 0;
    /// Base gas
    pub const BASE: u64 = 2;
    /// Very low gas
    pub const VERYLOW: u64 = 3;
    /// Low gas
    pub const LOW: u64 = 5;
    /// Mid gas
    pub const MID: u64 = 8;
    /// High gas
    pub const HIGH: u64 = 10;

    /// Jump dest gas
    pub const JUMPDEST: u64 = 1;
    /// Exp gas
    pub const EXP: u64 = 10;
    /// Exp byte gas
    pub const EXP_BYTE: u64 = 50;
    /// SHA3 base gas
    pub const SHA3: u64 = 30;
    /// SHA3 word gas
    pub const SHA3_WORD: u64 = 6;
    /// BLOCKHASH
    pub const BLOCKHASH: u64 = 20;

    /// First touch of an account in a transaction (EIP-2929)
    pub const COLD_ACCOUNT_ACCESS: u64 = 2600;
    /// First touch of a storage slot in a transaction (EIP-2929)
    pub const COLD_SLOAD: u64 = 2100;
    /// Any later touch
    pub const WARM_ACCESS: u64 = 100;

    /// Sstore set gas
    pub const SSTORE_SET: u64 = 20000;
    /// Sstore reset gas (5000 minus the cold surcharge)
    pub const SSTORE_RESET: u64 = 2900;
    /// Sstore clear refund (EIP-3529)
    pub const SSTORE_CLEAR_REFUND: u64 = 4800;
    /// SSTORE fails when no more than the stipend is left (EIP-2200)
    pub const SSTORE_SENTRY: u64 = 2300;

    /// Log gas
    pub const LOG: u64 = 375;
    /// Log topic gas
    pub const LOG_TOPIC: u64 = 375;
    /// Log data gas (per byte)
    pub const LOG_DATA: u64 = 8;

    /// Create gas
    pub const CREATE: u64 = 32000;
    /// Per initcode word (EIP-3860)
    pub const INITCODE_WORD: u64 = 2;
    /// Per deployed code byte
    pub const CODE_DEPOSIT: u64 = 200;
    /// Call value transfer gas
    pub const CALL_VALUE: u64 = 9000;
    /// Call new account gas
    pub const CALL_NEW_ACCOUNT: u64 = 25000;
    /// Call stipend
    pub const CALL_STIPEND: u64 = 2300;

    /// Memory gas per word
    pub const MEMORY: u64 = 3;
    /// Copy gas per word
    pub const COPY: u64 = 3;

    /// Transaction gas
    pub const TX: u64 = 21000;
    /// Transaction data zero byte
    pub const TX_DATA_ZERO: u64 = 4;
    /// Transaction data non-zero byte
    pub const TX_DATA_NONZERO: u64 = 16;
    /// Access list address gas
    pub const ACCESS_LIST_ADDRESS: u64 = 2400;
    /// Access list storage key gas
    pub const ACCESS_LIST_STORAGE_KEY: u64 = 1900;

    /// Selfdestruct gas
    pub const SELFDESTRUCT: u64 = 5000;
    /// Selfdestruct new account gas
    pub const SELFDESTRUCT_NEW_ACCOUNT: u64 = 25000;

    /// Refund cap divisor (EIP-3529)
    pub const MAX_REFUND_QUOTIENT: u64 = 5;

    /// Max call depth
    pub const MAX_CALL_DEPTH: usize = 1024;
    /// Max stack size
    pub const MAX_STACK_SIZE: usize = 1024;
    /// Max code size (EIP-170)
    pub const MAX_CODE_SIZE: usize = 24576;
    /// Max init code size (EIP-3860)
    pub const MAX_INIT_CODE_SIZE: usize = 49152;
}

/// Get static gas cost for an opcode
pub fn static_gas(opcode: Opcode) -> u64 {
    use Opcode::*;

    if (opcode.is_push() && opcode != PUSH0) || opcode.dup_depth() > 0 || opcode.swap_depth() > 0 {
        return cost::VERYLOW;
    }
    if opcode.is_log() {
        return cost::LOG + cost::LOG_TOPIC * opcode.log_topics() as u64;
    }

    match opcode {
        STOP | RETURN | REVERT | INVALID => cost::ZERO,

        // Warmth-dependent, charged in full by the interpreter
        BALANCE | EXTCODESIZE | EXTCODECOPY | EXTCODEHASH | SLOAD | SSTORE | CALL | CALLCODE
        | DELEGATECALL | STATICCALL => cost::ZERO,

        ADDRESS | ORIGIN | CALLER | CALLVALUE | CALLDATASIZE | CODESIZE | GASPRICE | COINBASE
        | TIMESTAMP | NUMBER | PREVRANDAO | GASLIMIT | CHAINID | RETURNDATASIZE | POP | PC
        | MSIZE | GAS | BASEFEE | PUSH0 => cost::BASE,

        ADD | SUB | NOT | LT | GT | SLT | SGT | EQ | ISZERO | AND | OR | XOR | BYTE | SHL
        | SHR | SAR | CALLDATALOAD | MLOAD | MSTORE | MSTORE8 | CALLDATACOPY | CODECOPY
        | RETURNDATACOPY | MCOPY => cost::VERYLOW,

        MUL | DIV | SDIV | MOD | SMOD | SIGNEXTEND | SELFBALANCE => cost::LOW,

        ADDMOD | MULMOD | JUMP => cost::MID,

        JUMPI => cost::HIGH,

        JUMPDEST => cost::JUMPDEST,

        EXP => cost::EXP,
        KECCAK256 => cost::SHA3,
        BLOCKHASH => cost::BLOCKHASH,
        TLOAD | TSTORE => cost::WARM_ACCESS,
        CREATE | CREATE2 => cost::CREATE,
        SELFDESTRUCT => cost::SELFDESTRUCT,

        _ => cost::ZERO,
    }
}

/// EIP-2929 account access cost
pub fn account_access_gas(was_warm: bool) -> u64 {
    if was_warm {
        cost::WARM_ACCESS
    } else {
        cost::COLD_ACCOUNT_ACCESS
    }
}

/// EIP-2929 SLOAD cost
pub fn sload_gas(was_warm: bool) -> u64 {
    if was_warm {
        cost::WARM_ACCESS
    } else {
        cost::COLD_SLOAD
    }
}

/// Calculate memory expansion cost
pub fn memory_gas(current_size: usize, new_size: usize) -> u64 {
    if new_size <= current_size {
        return 0;
    }
    let new_cost = memory_word_cost(new_size.div_ceil(32));
    let old_cost = memory_word_cost(current_size.div_ceil(32));
    new_cost.saturating_sub(old_cost)
}

fn memory_word_cost(words: usize) -> u64 {
    let words = words as u64;
    cost::MEMORY * words + words * words / 512
}

/// Calculate copy cost (for CALLDATACOPY, CODECOPY, etc.)
pub fn copy_gas(length: usize) -> u64 {
    cost::COPY * length.div_ceil(32) as u64
}

/// Per-byte part of EXP
pub fn exp_gas(exponent: &U256) -> u64 {
    let byte_size = exponent.bits().div_ceil(8) as u64;
    cost::EXP_BYTE * byte_size
}

/// Per-word part of KECCAK256 (also the CREATE2 hashing charge)
pub fn sha3_word_gas(length: usize) -> u64 {
    cost::SHA3_WORD * length.div_ceil(32) as u64
}

/// Per-byte part of LOGn
pub fn log_data_gas(data_size: usize) -> u64 {
    cost::LOG_DATA * data_size as u64
}

/// EIP-3860 initcode word charge
pub fn initcode_gas(length: usize) -> u64 {
    cost::INITCODE_WORD * length.div_ceil(32) as u64
}

/// EIP-150: a parent keeps 1/64th of what it has left
pub fn all_but_one_64th(gas: u64) -> u64 {
    gas - gas / 64
}

/// Intrinsic gas of a message call transaction
pub fn intrinsic_gas(data: &[u8], access_list_addresses: usize, access_list_keys: usize) -> u64 {
    let zeros = data.iter().filter(|b| **b == 0).count() as u64;
    let non_zeros = data.len() as u64 - zeros;
    cost::TX
        + zeros * cost::TX_DATA_ZERO
        + non_zeros * cost::TX_DATA_NONZERO
        + access_list_addresses as u64 * cost::ACCESS_LIST_ADDRESS
        + access_list_keys as u64 * cost::ACCESS_LIST_STORAGE_KEY
}

/// Refund actually granted (EIP-3529)
pub fn capped_refund(gas_used: u64, refund: u64) -> u64 {
    refund.min(gas_used / cost::MAX_REFUND_QUOTIENT)
}

/// SSTORE price and refund delta under EIP-2200, EIP-2929 and EIP-3529.
///
/// `original` is the value at the start of the transaction, `current` the
/// value before this write.
pub fn sstore_gas(original: &U256, current: &U256, new: &U256, was_warm: bool) -> (u64, i64) {
    let cold = if was_warm { 0 } else { cost::COLD_SLOAD };
    let set_refund = (cost::SSTORE_SET - cost::WARM_ACCESS) as i64;
    let reset_refund = (cost::SSTORE_RESET - cost::WARM_ACCESS) as i64;
    let clear = cost::SSTORE_CLEAR_REFUND as i64;

    if new == current {
        return (cold + cost::WARM_ACCESS, 0);
    }

    if original == current {
        if original.is_zero() {
            return (cold + cost::SSTORE_SET, 0);
        }
        let refund = if new.is_zero() { clear } else { 0 };
        return (cold + cost::SSTORE_RESET, refund);
    }

    let mut refund = 0i64;
    if !original.is_zero() {
        if current.is_zero() {
            refund -= clear;
        } else if new.is_zero() {
            refund += clear;
        }
    }
    if original == new {
        refund += if original.is_zero() {
            set_refund
        } else {
            reset_refund
        };
    }
    (cold + cost::WARM_ACCESS, refund)
}
