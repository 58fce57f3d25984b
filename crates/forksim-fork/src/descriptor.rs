//! Opcodes that need remote state before they run

use forksim_evm::Opcode;

/// What a hooked opcode needs fetched
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchKind {
    /// Reads a slot of the executing account
    StorageRead,
    /// Writes a slot of the executing account
    StorageWrite,
    /// Calls another account, possibly with value
    Call,
    /// Reads another account's code without calling it
    ExternalCode,
}

/// Where a hooked opcode's operands sit on the stack (0 = top)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchDescriptor {
    /// Kind of fetch
    pub kind: FetchKind,
    /// Stack height the fetch needs
    pub required_depth: usize,
    /// Position of the slot (storage kinds) or the address (the others)
    pub operand: usize,
    /// Position of the call value, if the opcode carries one
    pub value: Option<usize>,
    /// Whether the touch goes into the access list
    pub access_list: bool,
}

impl FetchDescriptor {
    const fn storage(kind: FetchKind) -> Self {
        Self {
            kind,
            required_depth: 1,
            operand: 0,
            value: None,
            access_list: true,
        }
    }

    const fn account(kind: FetchKind, required_depth: usize, value: Option<usize>) -> Self {
        Self {
            kind,
            required_depth,
            operand: if required_depth == 1 { 0 } else { 1 },
            value,
            access_list: false,
        }
    }
}

static SLOAD: FetchDescriptor = FetchDescriptor::storage(FetchKind::StorageRead);
static SSTORE: FetchDescriptor = FetchDescriptor::storage(FetchKind::StorageWrite);
static VALUE_CALL: FetchDescriptor = FetchDescriptor::account(FetchKind::Call, 3, Some(2));
static PLAIN_CALL: FetchDescriptor = FetchDescriptor::account(FetchKind::Call, 2, None);
static EXT_CODE: FetchDescriptor = FetchDescriptor::account(FetchKind::ExternalCode, 1, None);

/// Fetch table lookup; `None` for opcodes that never fetch
pub fn fetch_descriptor(opcode: Opcode) -> Option<&'static FetchDescriptor> {
    match opcode {
        Opcode::SLOAD => Some(&SLOAD),
        Opcode::SSTORE => Some(&SSTORE),
        Opcode::CALL | Opcode::CALLCODE => Some(&VALUE_CALL),
        Opcode::DELEGATECALL | Opcode::STATICCALL => Some(&PLAIN_CALL),
        Opcode::EXTCODESIZE | Opcode::EXTCODEHASH | Opcode::EXTCODECOPY => Some(&EXT_CODE),
        _ => None,
    }
}
