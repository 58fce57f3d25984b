//! Two-pass simulation driver

use crate::config::SimulatorConfig;
use crate::error::{SimResult, SimulationError};
use crate::simulation::{Simulation, SimulationResult};
use forksim_fork::{execute, reconstruct, AccessList, ExecutionOutcome, ForkRecord, Transaction};
use forksim_primitives::{Address, H256};
use forksim_rpc::{BlockTag, HttpStateSource, StateSource};
use forksim_storage::{Account, StateCache, StateDb, StateReader, StorageResult, WorkingState};
use tracing::{debug, info, info_span, warn};

/// What the discovery pass of a bundle learned
#[derive(Debug)]
pub struct Discovery {
    /// Prepared transactions, in bundle order
    pub transactions: Vec<Transaction>,
    /// Access list of each transaction, in bundle order
    pub access_lists: Vec<AccessList>,
    /// Union of all fetched facts, without an access list
    pub record: ForkRecord,
    /// Reference state plus every fetched fact
    pub baseline: WorkingState,
}

/// Runs simulations against a remote node
pub struct Simulator<R: StateSource> {
    source: R,
    config: SimulatorConfig,
}

impl Simulator<HttpStateSource> {
    /// Connect to the node named in `config`
    pub fn connect(config: SimulatorConfig) -> SimResult<Self> {
        let source = HttpStateSource::new(&config.rpc)?;
        Ok(Self::new(source, config))
    }
}

impl<R: StateSource> Simulator<R> {
    /// Simulator over an arbitrary state source
    pub fn new(source: R, config: SimulatorConfig) -> Self {
        Self { source, config }
    }

    /// State source
    pub fn source(&self) -> &R {
        &self.source
    }

    /// Configuration
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Simulate one transaction.
    ///
    /// `reference` is never modified, and nothing is committed to its
    /// registry. `prior` contributes the facts an earlier run already
    /// fetched; its access list is ignored.
    pub fn simulate(
        &self,
        simulation: &Simulation,
        reference: &WorkingState,
        prior: Option<&ForkRecord>,
    ) -> SimResult<SimulationResult> {
        let span = info_span!("simulate", target = %simulation.to, block = simulation.block_number);
        let _enter = span.enter();

        let seed = prior.map(ForkRecord::without_access_list).unwrap_or_default();
        let tx = self.prepare(simulation, reference, &seed)?;

        let mut baseline = reference.clone();
        let discovered = self.run(&tx, &mut baseline, StateCache::new(), seed)?;
        info!(
            fetched = discovered.record.fact_count(),
            slots = discovered.record.access_list.storage_key_count(),
            "discovery pass done"
        );

        let mut ideal = reconstruct(&baseline, &discovered.record, &StateDb::new())?;
        let outcome = self.run(&tx, &mut ideal, StateCache::new(), discovered.record)?;
        info!(gas_used = outcome.gas_used, refund = outcome.refund, "accounting pass done");

        Ok(SimulationResult::new(&tx, outcome))
    }

    /// Simulate an ordered bundle, each transaction seeing the effects of
    /// the ones before it.
    ///
    /// The first failing transaction aborts the whole bundle.
    pub fn simulate_bundle(
        &self,
        simulations: &[Simulation],
        reference: &WorkingState,
        prior: Option<&ForkRecord>,
    ) -> SimResult<Vec<SimulationResult>> {
        let span = info_span!("simulate_bundle", transactions = simulations.len());
        let _enter = span.enter();

        if simulations.is_empty() {
            return Ok(Vec::new());
        }
        let discovery = self.discover(simulations, reference, prior)?;
        self.account(discovery)
    }

    /// Run every transaction in order against `reference`, threading
    /// uncommitted writes from one to the next, and collect what had to be
    /// fetched.
    pub fn discover(
        &self,
        simulations: &[Simulation],
        reference: &WorkingState,
        prior: Option<&ForkRecord>,
    ) -> SimResult<Discovery> {
        let mut baseline = reference.clone();
        let mut pending = StateCache::new();
        let mut record = prior.map(ForkRecord::without_access_list).unwrap_or_default();
        let mut transactions = Vec::with_capacity(simulations.len());
        let mut access_lists = Vec::with_capacity(simulations.len());

        for (index, simulation) in simulations.iter().enumerate() {
            let tx = {
                let view = Layered {
                    base: &baseline,
                    pending: &pending,
                };
                self.prepare(simulation, &view, &record)?
            };

            let ExecutionOutcome {
                record: mut discovered,
                writes,
                ..
            } = self.run(&tx, &mut baseline, pending, record)?;
            access_lists.push(discovered.take_access_list());
            debug!(index, fetched = discovered.fact_count(), "discovered transaction");

            pending = writes;
            record = discovered;
            transactions.push(tx);
        }

        info!(fetched = record.fact_count(), "discovery pass done");
        Ok(Discovery {
            transactions,
            access_lists,
            record,
            baseline,
        })
    }

    /// Replay a discovered bundle against the state it needs and nothing
    /// more, committing after each transaction.
    ///
    /// Commits go to a registry owned by this call and dropped with it.
    pub fn account(&self, discovery: Discovery) -> SimResult<Vec<SimulationResult>> {
        let Discovery {
            transactions,
            access_lists,
            mut record,
            baseline,
        } = discovery;
        let db = StateDb::new();
        let mut working = reconstruct(&baseline, &record, &db)?;
        let mut results = Vec::with_capacity(transactions.len());

        for (index, (tx, access_list)) in transactions.iter().zip(access_lists).enumerate() {
            let outcome = self.run(tx, &mut working, StateCache::new(), record.with_access_list(access_list))?;
            outcome.flush_into(&mut working).map_err(SimulationError::Commit)?;
            let root = working.commit().map_err(SimulationError::Commit)?;
            working = db.open(root).map_err(SimulationError::Commit)?;
            info!(index, %root, gas_used = outcome.gas_used, "committed transaction");

            let result = SimulationResult::new(tx, outcome);
            record = result.record.without_access_list();
            results.push(result);
        }

        Ok(results)
    }

    /// Resolve defaults and check, before anything runs, that the sender
    /// can pay the value.
    fn prepare<V>(&self, simulation: &Simulation, view: &V, record: &ForkRecord) -> SimResult<Transaction>
    where
        V: StateReader + ?Sized,
    {
        let block = BlockTag::from_number(simulation.block_number);

        let code_override = (!simulation.code.is_empty()).then(|| simulation.code.clone());
        let code = if code_override.is_some()
            || record.has_code(&simulation.to)
            || !view.get_account_code(&simulation.to)?.is_empty()
        {
            None
        } else {
            let code = self.source.get_code(&simulation.to, block)?;
            debug!(target = %simulation.to, len = code.len(), "fetched target code");
            Some(code)
        };

        let mut funded_balance = None;
        if !simulation.value.is_zero()
            && !record.has_balance(&simulation.from)
            && view.get_balance(&simulation.from)?.is_zero()
        {
            let available = self.source.get_balance(&simulation.from, block)?;
            if available <= simulation.value {
                warn!(
                    sender = %simulation.from,
                    required = %simulation.value,
                    %available,
                    "sender cannot cover value"
                );
                return Err(SimulationError::InsufficientBalance {
                    required: simulation.value,
                    available,
                });
            }
            funded_balance = Some(available);
        }

        let gas_limit = match simulation.gas_limit {
            0 => self.config.default_gas_limit,
            limit => limit,
        };

        Ok(Transaction {
            sender: simulation.from,
            target: simulation.to,
            block,
            gas_limit,
            gas_price: simulation.gas_price,
            value: simulation.value,
            input: simulation.input.clone(),
            code,
            code_override,
            funded_balance,
        })
    }

    fn run(
        &self,
        tx: &Transaction,
        state: &mut WorkingState,
        pending: StateCache,
        record: ForkRecord,
    ) -> SimResult<ExecutionOutcome> {
        let block = self.config.block.context(tx.block);
        Ok(execute(tx, &block, state, pending, record, &self.source)?)
    }
}

/// Committed-so-far state with a bundle's uncommitted writes on top
struct Layered<'a> {
    base: &'a WorkingState,
    pending: &'a StateCache,
}

impl StateReader for Layered<'_> {
    fn get_account(&self, address: &Address) -> StorageResult<Option<Account>> {
        match self.pending.cached_account(address) {
            Some(cached) => Ok(cached.cloned()),
            None => self.base.get_account(address),
        }
    }

    fn get_storage(&self, address: &Address, key: &H256) -> StorageResult<H256> {
        match self.pending.cached_storage(address, key) {
            Some(value) => Ok(value),
            None => self.base.get_storage(address, key),
        }
    }

    fn get_code(&self, code_hash: &H256) -> StorageResult<Option<Vec<u8>>> {
        match self.pending.cached_code(code_hash) {
            Some(code) => Ok(Some(code.clone())),
            None => self.base.get_code(code_hash),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forksim_primitives::U256;
    use forksim_rpc::MockStateSource;
    use forksim_storage::StateWriter;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn simulator(source: &MockStateSource) -> Simulator<&MockStateSource> {
        Simulator::new(source, SimulatorConfig::default())
    }

    #[test]
    fn test_layered_prefers_pending() {
        let db = StateDb::new();
        let mut base = db.open_empty();
        base.set_balance(&addr(1), U256::from(5)).unwrap();
        base.set_storage(addr(1), H256::ZERO, H256::from_low_u64_be(1)).unwrap();

        let mut pending = StateCache::new();
        pending.set_storage(addr(1), H256::ZERO, H256::from_low_u64_be(2)).unwrap();

        let view = Layered {
            base: &base,
            pending: &pending,
        };
        assert_eq!(view.get_storage(&addr(1), &H256::ZERO).unwrap(), H256::from_low_u64_be(2));
        assert_eq!(view.get_balance(&addr(1)).unwrap(), U256::from(5));
    }

    #[test]
    fn test_prepare_defaults_gas_limit() {
        let source = MockStateSource::new();
        let reference = StateDb::new().open_empty();
        let sim = Simulation::new(addr(1), addr(2));
        let tx = simulator(&source).prepare(&sim, &reference, &ForkRecord::new()).unwrap();
        assert_eq!(tx.gas_limit, 30_000_000);
        assert_eq!(tx.block, BlockTag::Latest);
        assert_eq!(tx.code, Some(Vec::new()));
        assert_eq!(source.code_calls(), 1);
    }

    #[test]
    fn test_prepare_explicit_code_skips_fetch() {
        let source = MockStateSource::new();
        let reference = StateDb::new().open_empty();
        let sim = Simulation::new(addr(1), addr(2)).code(vec![0x00]);
        let tx = simulator(&source).prepare(&sim, &reference, &ForkRecord::new()).unwrap();
        assert_eq!(tx.code, None);
        assert_eq!(tx.code_override, Some(vec![0x00]));
        assert_eq!(source.total_calls(), 0);
    }

    #[test]
    fn test_prepare_skips_known_code() {
        let source = MockStateSource::new();
        let mut reference = StateDb::new().open_empty();
        reference.set_account_code(&addr(2), vec![0x00]).unwrap();
        let sim = Simulation::new(addr(1), addr(2));
        let tx = simulator(&source).prepare(&sim, &reference, &ForkRecord::new()).unwrap();
        assert_eq!(tx.code, None);
        assert_eq!(source.total_calls(), 0);
    }

    #[test]
    fn test_prepare_funds_from_remote() {
        let source = MockStateSource::new().with_balance(addr(1), U256::from(1000));
        let reference = StateDb::new().open_empty();
        let sim = Simulation::new(addr(1), addr(2)).value(U256::from(10)).code(vec![0x00]);
        let tx = simulator(&source).prepare(&sim, &reference, &ForkRecord::new()).unwrap();
        assert_eq!(tx.funded_balance, Some(U256::from(1000)));
    }

    #[test]
    fn test_prepare_rejects_short_sender() {
        let source = MockStateSource::new().with_balance(addr(1), U256::from(10));
        let reference = StateDb::new().open_empty();
        let sim = Simulation::new(addr(1), addr(2)).value(U256::from(10)).code(vec![0x00]);
        let err = simulator(&source)
            .prepare(&sim, &reference, &ForkRecord::new())
            .unwrap_err();
        assert!(matches!(
            err,
            SimulationError::InsufficientBalance { required, available }
                if required == U256::from(10) && available == U256::from(10)
        ));
    }

    #[test]
    fn test_prepare_trusts_local_balance() {
        let source = MockStateSource::new();
        let mut reference = StateDb::new().open_empty();
        reference.set_balance(&addr(1), U256::from(3)).unwrap();
        let sim = Simulation::new(addr(1), addr(2)).value(U256::from(10)).code(vec![0x00]);
        let tx = simulator(&source).prepare(&sim, &reference, &ForkRecord::new()).unwrap();
        assert_eq!(tx.funded_balance, None);
        assert_eq!(source.balance_calls(), 0);
    }

    #[test]
    fn test_empty_bundle() {
        let source = MockStateSource::new();
        let reference = StateDb::new().open_empty();
        let results = simulator(&source).simulate_bundle(&[], &reference, None).unwrap();
        assert!(results.is_empty());
        assert_eq!(source.total_calls(), 0);
    }
}
