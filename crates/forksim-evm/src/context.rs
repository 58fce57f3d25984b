//! Execution context for EVM

use forksim_primitives::{Address, H256, U256};

/// How a frame was entered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CallKind {
    /// Top-level or CALL
    #[default]
    Call,
    /// CALLCODE: callee code, caller storage
    CallCode,
    /// DELEGATECALL: callee code, caller storage, caller and value
    DelegateCall,
    /// STATICCALL: no state modifications
    StaticCall,
    /// CREATE initcode frame
    Create,
    /// CREATE2 initcode frame
    Create2,
}

impl CallKind {
    /// Initcode frames
    pub fn is_create(self) -> bool {
        matches!(self, Self::Create | Self::Create2)
    }
}

/// Call context information
#[derive(Clone, Debug)]
pub struct CallContext {
    /// Address whose storage and balance the frame operates on
    pub address: Address,
    /// Address whose code is running; differs from `address` for CALLCODE and DELEGATECALL
    pub code_address: Address,
    /// Caller address
    pub caller: Address,
    /// Call value in wei
    pub value: U256,
    /// Call data
    pub data: Vec<u8>,
    /// Gas limit
    pub gas: u64,
    /// Whether this is a static call (no state modifications)
    pub is_static: bool,
    /// Call depth
    pub depth: usize,
    /// How the frame was entered
    pub kind: CallKind,
}

impl CallContext {
    /// Create a new call context
    pub fn new(address: Address, caller: Address, value: U256, data: Vec<u8>, gas: u64) -> Self {
        Self {
            address,
            code_address: address,
            caller,
            value,
            data,
            gas,
            is_static: false,
            depth: 0,
            kind: CallKind::Call,
        }
    }

    /// Create a static call context
    pub fn new_static(address: Address, caller: Address, data: Vec<u8>, gas: u64) -> Self {
        Self {
            is_static: true,
            kind: CallKind::StaticCall,
            ..Self::new(address, caller, U256::zero(), data, gas)
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(Address::ZERO, Address::ZERO, U256::zero(), Vec::new(), 0)
    }
}

/// Block environment information
#[derive(Clone, Debug)]
pub struct BlockContext {
    /// Block number
    pub number: u64,
    /// Block timestamp
    pub timestamp: u64,
    /// Block gas limit
    pub gas_limit: u64,
    /// Block coinbase
    pub coinbase: Address,
    /// Prevrandao
    pub prevrandao: H256,
    /// Chain ID
    pub chain_id: u64,
    /// Base fee (EIP-1559)
    pub base_fee: U256,
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            number: 0,
            timestamp: 0,
            gas_limit: 30_000_000,
            coinbase: Address::ZERO,
            prevrandao: H256::ZERO,
            chain_id: 1,
            base_fee: U256::zero(),
        }
    }
}

/// Transaction environment information
#[derive(Clone, Debug, Default)]
pub struct TxContext {
    /// Transaction origin (original sender)
    pub origin: Address,
    /// Gas price
    pub gas_price: U256,
}

/// Complete execution environment
#[derive(Clone, Debug, Default)]
pub struct Environment {
    /// Call context
    pub call: CallContext,
    /// Block context
    pub block: BlockContext,
    /// Transaction context
    pub tx: TxContext,
}

impl Environment {
    /// Create new environment
    pub fn new(call: CallContext, block: BlockContext, tx: TxContext) -> Self {
        Self { call, block, tx }
    }

    /// Same block and transaction, different frame
    pub fn with_call(&self, call: CallContext) -> Self {
        Self {
            call,
            block: self.block.clone(),
            tx: self.tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Address {
        Address::from_low_u64_be(0xc0de)
    }

    fn sender() -> Address {
        Address::from_low_u64_be(0x5e)
    }

    #[test]
    fn test_outer_frame_runs_own_code() {
        let call = CallContext::new(target(), sender(), U256::from(10), vec![0xab], 79_000);
        assert_eq!(call.code_address, call.address);
        assert_eq!(call.depth, 0);
        assert_eq!(call.kind, CallKind::Call);
        assert!(!call.is_static);
    }

    #[test]
    fn test_static_frame_carries_no_value() {
        let call = CallContext::new_static(target(), sender(), Vec::new(), 2_300);
        assert!(call.is_static);
        assert!(call.value.is_zero());
        assert_eq!(call.kind, CallKind::StaticCall);
    }

    #[test]
    fn test_block_defaults() {
        let block = BlockContext::default();
        assert_eq!(block.chain_id, 1);
        assert!(block.base_fee.is_zero());
        assert_eq!(block.coinbase, Address::ZERO);
    }

    #[test]
    fn test_child_frame_shares_block_and_origin() {
        let env = Environment::new(
            CallContext::new(target(), sender(), U256::zero(), Vec::new(), 50_000),
            BlockContext {
                number: 17_000_000,
                ..Default::default()
            },
            TxContext {
                origin: sender(),
                gas_price: U256::from(7),
            },
        );
        let mut delegated = CallContext::new(target(), sender(), U256::zero(), Vec::new(), 1_000);
        delegated.code_address = Address::from_low_u64_be(0x11b);
        delegated.kind = CallKind::DelegateCall;
        delegated.depth = 1;

        let child = env.with_call(delegated);
        assert_eq!(child.block.number, 17_000_000);
        assert_eq!(child.tx.origin, sender());
        assert_eq!(child.call.address, target());
        assert_ne!(child.call.code_address, child.call.address);
    }

    #[test]
    fn test_initcode_frames() {
        assert!(CallKind::Create.is_create());
        assert!(CallKind::Create2.is_create());
        assert!(!CallKind::CallCode.is_create());
    }
}
