//! Single-pass transaction execution over a lazily forked state

use crate::error::{ForkError, ForkResult};
use crate::hooks::LazyFork;
use crate::record::{AccessList, ForkRecord};
use forksim_evm::gas;
use forksim_evm::{
    BlockContext, CallContext, Environment, EvmError, Interpreter, JournaledState, Log, StateAccess,
    TxContext,
};
use forksim_primitives::{Address, U256};
use forksim_rpc::{BlockTag, StateSource};
use forksim_storage::{State, StateCache, StorageResult};
use tracing::debug;

/// Precompile addresses, warm from the start of every transaction
pub const PRECOMPILES: std::ops::RangeInclusive<u64> = 0x01..=0x0a;

/// A message call ready to run
#[derive(Clone, Debug, Default)]
pub struct Transaction {
    /// Sender, also the transaction origin
    pub sender: Address,
    /// Called account
    pub target: Address,
    /// Block the remote lookups read
    pub block: BlockTag,
    /// Gas limit, intrinsic gas included
    pub gas_limit: u64,
    /// Gas price, visible to GASPRICE
    pub gas_price: U256,
    /// Value sent to the target
    pub value: U256,
    /// Call data
    pub input: Vec<u8>,
    /// Fetched target code, installed as a fact when the target has none;
    /// `None` runs whatever the target already has
    pub code: Option<Vec<u8>>,
    /// Code replacing the target's, written like a deployment so that later
    /// transactions over the same state see it too
    pub code_override: Option<Vec<u8>>,
    /// Remote sender balance learned before execution
    pub funded_balance: Option<U256>,
}

/// What a completed run produced
#[derive(Clone, Debug)]
pub struct ExecutionOutcome {
    /// RETURN data
    pub output: Vec<u8>,
    /// Gas charged after the refund
    pub gas_used: u64,
    /// Refund applied, already capped
    pub refund: u64,
    /// Intrinsic part of the gas
    pub intrinsic_gas: u64,
    /// Logs in emission order
    pub logs: Vec<Log>,
    /// Facts known after the run, with the access list it built
    pub record: ForkRecord,
    /// State changes made by the transaction, on top of any pending writes
    /// it started from
    pub writes: StateCache,
}

impl ExecutionOutcome {
    /// Apply the writes to a working state
    pub fn flush_into<S: State>(&self, state: &mut S) -> StorageResult<()> {
        self.writes.apply_to(state)
    }
}

/// Run one transaction.
///
/// `record` seeds the fetch sets, and its access list is the warm list the
/// transaction declares (charged as intrinsic gas, warm from the start).
/// `pending` holds writes of earlier, uncommitted transactions.
///
/// Fetched facts land in `state`; the transaction's own writes come back in
/// [`ExecutionOutcome::writes`]. A transaction that does not complete is an
/// error, with REVERT data kept in [`EvmError::Revert`].
pub fn execute<S, R>(
    tx: &Transaction,
    block: &BlockContext,
    state: &mut S,
    pending: StateCache,
    mut record: ForkRecord,
    source: &R,
) -> ForkResult<ExecutionOutcome>
where
    S: State,
    R: StateSource + ?Sized,
{
    let warm = record.take_access_list();
    state.create_account(&tx.sender)?;
    let mut journal = JournaledState::with_pending(state, pending);

    if let Some(funded) = tx.funded_balance {
        let local = journal.get_balance(&tx.sender)?;
        if funded > local {
            journal.preload_balance_credit(&tx.sender, funded - local)?;
        }
        record.balances.insert(tx.sender);
    } else if !tx.value.is_zero() {
        record.balances.insert(tx.sender);
    }

    if let Some(code) = &tx.code {
        journal.preload_code(&tx.target, code.clone())?;
        record.code.insert(tx.target);
    }
    if let Some(code) = &tx.code_override {
        journal.set_code(&tx.target, code.clone())?;
    }

    warm_up(&mut journal, tx, block, &warm);

    let intrinsic_gas = gas::intrinsic_gas(&tx.input, warm.len(), warm.storage_key_count());
    if tx.gas_limit < intrinsic_gas {
        return Err(ForkError::Execution(EvmError::OutOfGas));
    }

    journal.transfer(&tx.sender, &tx.target, tx.value)?;

    let env = Environment::new(
        CallContext::new(
            tx.target,
            tx.sender,
            tx.value,
            tx.input.clone(),
            tx.gas_limit - intrinsic_gas,
        ),
        block.clone(),
        TxContext {
            origin: tx.sender,
            gas_price: tx.gas_price,
        },
    );
    let code = journal.get_code(&tx.target)?;
    let mut hook = LazyFork::new(source, tx.block, record);
    let result = Interpreter::new(code, tx.gas_limit - intrinsic_gas).run_hooked(&env, &mut journal, &mut hook)?;

    if !result.success {
        let reason = result.halt.unwrap_or(EvmError::OutOfGas);
        debug!(target = %tx.target, %reason, "transaction failed");
        return Err(ForkError::Execution(reason));
    }

    let gas_used = tx.gas_limit - result.gas_left;
    let refund = gas::capped_refund(gas_used, journal.refund());
    let record = hook.finish();
    debug!(
        target = %tx.target,
        gas_used = gas_used - refund,
        refund,
        intrinsic_gas,
        fetched = record.fact_count(),
        "transaction executed"
    );

    Ok(ExecutionOutcome {
        output: result.output,
        gas_used: gas_used - refund,
        refund,
        intrinsic_gas,
        logs: result.logs,
        record,
        writes: journal.into_writes(),
    })
}

fn warm_up<S: StateAccess>(state: &mut S, tx: &Transaction, block: &BlockContext, warm: &AccessList) {
    state.warm_address(&tx.sender);
    state.warm_address(&tx.target);
    state.warm_address(&block.coinbase);
    for precompile in PRECOMPILES {
        state.warm_address(&Address::from_low_u64_be(precompile));
    }
    for item in warm.items() {
        state.warm_address(&item.address);
        for slot in &item.storage_keys {
            state.warm_storage(&item.address, slot);
        }
    }
}
