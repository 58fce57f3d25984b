//! Simulation request and result

use forksim_evm::Log;
use forksim_fork::{AccessList, ExecutionOutcome, ForkRecord, Transaction};
use forksim_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// One transaction to simulate.
///
/// A negative `block_number` means the latest block. A zero `gas_limit`
/// falls back to the configured default. Non-empty `code` replaces whatever
/// code the target has.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    /// Sender
    pub from: Address,
    /// Call target
    pub to: Address,
    /// Block the remote state is read at
    #[serde(default = "latest_block")]
    pub block_number: i64,
    /// Gas limit
    #[serde(default)]
    pub gas_limit: u64,
    /// Gas price
    #[serde(default)]
    pub gas_price: U256,
    /// Value sent with the call
    #[serde(default)]
    pub value: U256,
    /// Calldata
    #[serde(default, with = "hex_bytes")]
    pub input: Vec<u8>,
    /// Code to run at the target instead of the deployed code
    #[serde(default, with = "hex_bytes")]
    pub code: Vec<u8>,
}

fn latest_block() -> i64 {
    -1
}

impl Simulation {
    /// Call `to` from `from` at the latest block
    pub fn new(from: Address, to: Address) -> Self {
        Self {
            from,
            to,
            block_number: latest_block(),
            ..Default::default()
        }
    }

    /// Set the block number
    pub fn block_number(mut self, block_number: i64) -> Self {
        self.block_number = block_number;
        self
    }

    /// Set the gas limit
    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Set the gas price
    pub fn gas_price(mut self, gas_price: U256) -> Self {
        self.gas_price = gas_price;
        self
    }

    /// Set the value
    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Set the calldata
    pub fn input(mut self, input: Vec<u8>) -> Self {
        self.input = input;
        self
    }

    /// Run `code` at the target
    pub fn code(mut self, code: Vec<u8>) -> Self {
        self.code = code;
        self
    }
}

/// Outcome of a simulated transaction, from the accounting pass
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Return data
    pub output: Vec<u8>,
    /// Gas used after the refund, intrinsic gas included
    pub gas_used: u64,
    /// Gas limit the transaction ran with
    pub gas_limit: u64,
    /// Refund subtracted from `gas_used`
    pub refund: u64,
    /// Intrinsic part of `gas_used`
    pub intrinsic_gas: u64,
    /// Emitted logs
    pub logs: Vec<Log>,
    /// Everything fetched so far, with this transaction's access list
    pub record: ForkRecord,
}

impl SimulationResult {
    pub(crate) fn new(tx: &Transaction, outcome: ExecutionOutcome) -> Self {
        Self {
            output: outcome.output,
            gas_used: outcome.gas_used,
            gas_limit: tx.gas_limit,
            refund: outcome.refund,
            intrinsic_gas: outcome.intrinsic_gas,
            logs: outcome.logs,
            record: outcome.record,
        }
    }

    /// Access list discovered for this transaction
    pub fn access_list(&self) -> &AccessList {
        &self.record.access_list
    }
}

mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let sim = Simulation::new(Address::from_low_u64_be(1), Address::from_low_u64_be(2))
            .block_number(100)
            .gas_limit(50_000)
            .value(U256::from(7))
            .input(vec![0xab]);
        assert_eq!(sim.block_number, 100);
        assert_eq!(sim.gas_limit, 50_000);
        assert_eq!(sim.value, U256::from(7));
        assert_eq!(sim.input, vec![0xab]);
        assert!(sim.code.is_empty());
    }

    #[test]
    fn test_defaults_to_latest() {
        let sim = Simulation::new(Address::ZERO, Address::ZERO);
        assert_eq!(sim.block_number, -1);
    }

    #[test]
    fn test_deserialize_json() {
        let json = r#"{
            "from": "0x0000000000000000000000000000000000000001",
            "to": "0x0000000000000000000000000000000000000002",
            "value": "0x10",
            "input": "0x18160ddd"
        }"#;
        let sim: Simulation = serde_json::from_str(json).unwrap();
        assert_eq!(sim.to, Address::from_low_u64_be(2));
        assert_eq!(sim.block_number, -1);
        assert_eq!(sim.value, U256::from(16));
        assert_eq!(sim.input, vec![0x18, 0x16, 0x0d, 0xdd]);
        assert!(sim.code.is_empty());

        let back = serde_json::to_string(&sim).unwrap();
        assert!(back.contains("\"input\":\"0x18160ddd\""));
        assert!(back.contains("\"blockNumber\":-1"));
    }
}
