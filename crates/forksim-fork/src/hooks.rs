//! Fetch-on-demand interpreter hook

use crate::descriptor::{fetch_descriptor, FetchDescriptor, FetchKind};
use crate::error::{ForkError, ForkResult};
use crate::record::{AccessListBuilder, ForkRecord, StorageKey};
use forksim_evm::{stack, FrameView, OpcodeHook, StateAccess};
use forksim_primitives::{Address, U256};
use forksim_rpc::{BlockTag, StateSource};
use tracing::{debug, trace};

/// Installs remote facts right before the opcode that needs them.
///
/// Fetched facts go into the state's baseline and into the record's sets;
/// slots touched by SLOAD/SSTORE go into a fresh access list.
pub struct LazyFork<'a, R: StateSource + ?Sized> {
    source: &'a R,
    block: BlockTag,
    record: ForkRecord,
    access_list: AccessListBuilder,
}

impl<'a, R: StateSource + ?Sized> LazyFork<'a, R> {
    /// Hook over `source` at `block`, seeded with `record`'s sets
    pub fn new(source: &'a R, block: BlockTag, mut record: ForkRecord) -> Self {
        record.take_access_list();
        Self {
            source,
            block,
            record,
            access_list: AccessListBuilder::new(),
        }
    }

    /// Facts known so far
    pub fn record(&self) -> &ForkRecord {
        &self.record
    }

    /// The record, carrying the access list this run built
    pub fn finish(self) -> ForkRecord {
        let access_list = self.access_list.finish();
        self.record.with_access_list(access_list)
    }

    /// Fetch and install `address`'s code unless already known
    pub fn ensure_code<S: StateAccess>(&mut self, address: Address, state: &mut S) -> ForkResult<()> {
        if self.record.has_code(&address) {
            return Ok(());
        }
        let code = self.source.get_code(&address, self.block)?;
        debug!(%address, block = %self.block, len = code.len(), "fetched code");
        state.preload_code(&address, code)?;
        self.record.code.insert(address);
        Ok(())
    }

    /// Top up `address` from the remote balance when `value` exceeds what is
    /// known locally
    pub fn ensure_balance<S: StateAccess>(
        &mut self,
        address: Address,
        value: U256,
        state: &mut S,
    ) -> ForkResult<()> {
        let local = state.get_balance(&address)?;
        if value <= local || self.record.has_balance(&address) {
            return Ok(());
        }
        let remote = self.source.get_balance(&address, self.block)?;
        debug!(%address, block = %self.block, %remote, %local, "fetched balance");
        if remote >= value {
            state.preload_balance_credit(&address, remote - local)?;
            self.record.balances.insert(address);
        }
        Ok(())
    }

    fn storage_touch<S: StateAccess>(
        &mut self,
        descriptor: &FetchDescriptor,
        frame: &FrameView<'_>,
        state: &mut S,
    ) -> ForkResult<()> {
        let slot = stack::word_to_h256(frame.stack.peek_at(descriptor.operand)?);
        let address = frame.address;

        if descriptor.kind == FetchKind::StorageRead && !self.record.has_storage(&address, &slot) {
            let value = self.source.get_storage_at(&address, &slot, self.block)?;
            debug!(%address, %slot, block = %self.block, %value, "fetched storage");
            state.preload_storage(&address, &slot, value)?;
            self.record.storage.insert(StorageKey(address, slot));
        }

        if descriptor.access_list && self.access_list.touch(address, slot) {
            trace!(%address, %slot, "access list append");
        }
        Ok(())
    }
}

impl<R: StateSource + ?Sized> OpcodeHook for LazyFork<'_, R> {
    type Error = ForkError;

    fn before_opcode<S: StateAccess>(
        &mut self,
        frame: &FrameView<'_>,
        state: &mut S,
    ) -> ForkResult<()> {
        let Some(descriptor) = fetch_descriptor(frame.opcode) else {
            return Ok(());
        };
        if frame.stack.len() < descriptor.required_depth {
            return Err(ForkError::StackUnderflow {
                opcode: frame.opcode,
                required: descriptor.required_depth,
                available: frame.stack.len(),
            });
        }

        match descriptor.kind {
            FetchKind::StorageRead | FetchKind::StorageWrite => {
                self.storage_touch(descriptor, frame, state)
            }
            FetchKind::Call | FetchKind::ExternalCode => {
                let target = stack::word_to_address(frame.stack.peek_at(descriptor.operand)?);
                self.ensure_code(target, state)?;
                if let Some(position) = descriptor.value {
                    let value = *frame.stack.peek_at(position)?;
                    self.ensure_balance(target, value, state)?;
                }
                Ok(())
            }
        }
    }
}
