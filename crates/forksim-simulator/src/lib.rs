//! # forksim-simulator
//!
//! Predicts what a transaction, or an ordered bundle of them, would do on a
//! remote chain at a given block without copying that chain's state first.
//!
//! Every simulation runs twice:
//!
//! 1. **Discovery** executes against whatever is known, fetching code,
//!    storage and balances from the remote node as the bytecode touches them.
//!    Its gas figure is thrown away.
//! 2. **Accounting** executes again against a fresh state holding exactly the
//!    discovered facts, with the discovered access list declared, so warm and
//!    cold charges come out as a block-included transaction would pay them.
//!
//! ```rust,no_run
//! use forksim_primitives::{Address, U256};
//! use forksim_simulator::{Simulation, Simulator, SimulatorConfig};
//! use forksim_storage::StateDb;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let simulator = Simulator::connect(SimulatorConfig::load("forksim.toml")?)?;
//! let simulation = Simulation::new(
//!     Address::from_hex("0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0")?,
//!     Address::from_hex("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48")?,
//! )
//! .block_number(18_000_000)
//! .input(hex::decode("18160ddd")?);
//!
//! let reference = StateDb::new().open_empty();
//! let result = simulator.simulate(&simulation, &reference, None)?;
//! println!("gas used: {}", result.gas_used);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod simulation;
mod simulator;

pub use config::{BlockConfig, SimulatorConfig, RPC_URL_ENV};
pub use error::{SimResult, SimulationError};
pub use simulation::{Simulation, SimulationResult};
pub use simulator::{Discovery, Simulator};

pub use forksim_fork::{AccessList, AccessListItem, ForkRecord, StorageKey};
pub use forksim_rpc::{BlockTag, HttpStateSource, MockStateSource, RpcConfig, StateSource};
