//! Ideal-state reconstruction

use crate::record::{ForkRecord, StorageKey};
use forksim_storage::{StateDb, StateReader, StateWriter, StorageResult, WorkingState};
use tracing::debug;

/// Build a fresh state holding only what `record` names, with values read
/// from `reference`, commit it and reopen the root.
///
/// Addresses in the code set get an account and their code; the balance set
/// brings balances and the storage set brings slot values. Anything else
/// reads as zero or empty.
pub fn reconstruct<R: StateReader + ?Sized>(
    reference: &R,
    record: &ForkRecord,
    db: &StateDb,
) -> StorageResult<WorkingState> {
    let mut ideal = db.open_empty();

    for address in &record.code {
        ideal.create_account(address)?;
        let code = reference.get_account_code(address)?;
        ideal.set_account_code(address, code)?;
    }
    for address in &record.balances {
        ideal.set_balance(address, reference.get_balance(address)?)?;
    }
    for StorageKey(address, slot) in &record.storage {
        ideal.set_storage(*address, *slot, reference.get_storage(address, slot)?)?;
    }

    let root = ideal.commit()?;
    debug!(
        %root,
        code = record.code.len(),
        balances = record.balances.len(),
        slots = record.storage.len(),
        "reconstructed ideal state"
    );
    db.open(root)
}
