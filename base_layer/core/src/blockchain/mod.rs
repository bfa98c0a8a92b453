// Copyright 2023. The Corpochain Developers
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! The single writer of chain state. Arbitrates which valid chain is
//! canonical by accumulated weight, handles fork resolution, and keeps the
//! in-memory record cache and height map as a projection of committed
//! storage.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::Path,
    sync::{Arc, RwLock},
};

use corpochain_common_types::types::FixedHash;
use log::*;
use strum_macros::Display;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    blocks::{
        BlockRecord,
        EndOfSubSlotBundle,
        FullBlock,
        HeaderBlock,
        SubEpochChallengeSegment,
        SubEpochSummary,
        UnfinishedBlock,
        VdfInfo,
    },
    chain_storage::{BlockHeightMap, BlockStore, ChainStorageError, DbTransaction},
    consensus::{
        block_to_block_record,
        find_fork_point_in_chain,
        get_next_sub_slot_iters_and_difficulty,
        validate_block_body,
        BlockchainInterface,
        ConsensusConstants,
        ConsensusError,
    },
    execution::ExecutionEngine,
    validation::{
        pre_validate_blocks,
        validate_unfinished_header_block,
        ErrorCode,
        PreValidationResult,
        ValidationPool,
    },
};

const LOG_TARGET: &str = "c::blockchain";

/// Compact VDF proofs already seen; cleared once it grows past this.
const MAX_SEEN_COMPACT_PROOFS: usize = 10_000;

#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Chain storage error: {0}")]
    ChainStorage(#[from] ChainStorageError),
    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),
    #[error("Block {0} is no longer in the canonical chain")]
    NotInCanonicalChain(FixedHash),
}

/// Outcome of [`Blockchain::receive_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ReceiveBlockResult {
    /// Added to the peak of the blockchain
    NewPeak,
    /// Added as an orphan or stale block, not the new peak
    AddedAsOrphan,
    /// Block was not added because it was invalid
    InvalidBlock,
    /// Block is already present in this blockchain
    AlreadyHaveBlock,
    /// Block's parent is not in this blockchain
    DisconnectedBlock,
}

/// What changed when a block became the new peak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChangeSummary {
    pub peak: BlockRecord,
    pub fork_height: u32,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BlockchainConfig {
    pub reserved_cores: usize,
    pub single_threaded: bool,
    pub optimistic_import: bool,
    pub batch_size: usize,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            reserved_cores: 1,
            single_threaded: false,
            optimistic_import: true,
            batch_size: 4,
        }
    }
}

/// In-memory projection of committed chain state. Only mutated on the commit
/// path of the writer transaction.
struct ChainState {
    peak_height: Option<u32>,
    block_records: HashMap<FixedHash, BlockRecord>,
    // Hashes per height, for cache garbage collection
    heights_in_cache: BTreeMap<u32, HashSet<FixedHash>>,
    height_map: BlockHeightMap,
}

impl ChainState {
    fn add_block_record(&mut self, record: BlockRecord) {
        self.heights_in_cache
            .entry(record.height)
            .or_default()
            .insert(record.header_hash);
        self.block_records.insert(record.header_hash, record);
    }

    fn remove_records_below(&mut self, height: u32) {
        let keep = self.heights_in_cache.split_off(&height);
        for (_, hashes) in std::mem::replace(&mut self.heights_in_cache, keep) {
            for hash in hashes {
                self.block_records.remove(&hash);
            }
        }
    }
}

pub struct Blockchain {
    constants: ConsensusConstants,
    config: BlockchainConfig,
    block_store: BlockStore,
    execution_engine: Arc<dyn ExecutionEngine>,
    pool: ValidationPool,
    // Serializes all chain mutation; cooperative, held across engine I/O
    write_lock: Mutex<()>,
    // Guards compact-proof workflows and the seen set
    pub compact_proof_lock: Mutex<()>,
    state: RwLock<ChainState>,
    seen_compact_proofs: std::sync::Mutex<HashSet<(VdfInfo, u32)>>,
}

impl Blockchain {
    /// Initializes the chain manager from committed storage, loading the
    /// record cache around the peak and the persistent height map.
    pub async fn create<P: AsRef<Path>>(
        block_store: BlockStore,
        constants: ConsensusConstants,
        execution_engine: Arc<dyn ExecutionEngine>,
        blockchain_dir: P,
        config: BlockchainConfig,
    ) -> Result<Self, BlockchainError> {
        let pool = if config.single_threaded {
            ValidationPool::single_threaded()
        } else {
            ValidationPool::new(config.reserved_cores)
        };

        let mut height_map = BlockHeightMap::load(blockchain_dir.as_ref())?;
        let (records, peak_hash) = block_store.get_block_records_close_to_peak(constants.blocks_cache_size)?;

        let mut peak_height = None;
        if let Some(peak_hash) = peak_hash {
            let peak = records
                .get(&peak_hash)
                .cloned()
                .ok_or_else(|| ChainStorageError::ValueNotFound {
                    entity: "BlockRecord",
                    field: "header_hash",
                    value: peak_hash.to_hex(),
                })?;
            reconcile_height_map(&mut height_map, &block_store, &peak)?;
            peak_height = Some(peak.height);
            info!(
                target: LOG_TARGET,
                "Loaded chain at peak height {} ({})", peak.height, peak_hash
            );
        } else {
            info!(target: LOG_TARGET, "Started with an empty chain");
        }

        let mut state = ChainState {
            peak_height,
            block_records: HashMap::new(),
            heights_in_cache: BTreeMap::new(),
            height_map,
        };
        for record in records.values() {
            state.add_block_record(record.clone());
        }

        Ok(Self {
            constants,
            config,
            block_store,
            execution_engine,
            pool,
            write_lock: Mutex::new(()),
            compact_proof_lock: Mutex::new(()),
            state: RwLock::new(state),
            seen_compact_proofs: std::sync::Mutex::new(HashSet::new()),
        })
    }

    pub fn constants(&self) -> &ConsensusConstants {
        &self.constants
    }

    pub fn get_peak_height(&self) -> Option<u32> {
        self.read_state().peak_height
    }

    pub fn get_peak(&self) -> Option<BlockRecord> {
        let state = self.read_state();
        let height = state.peak_height?;
        let hash = state.height_map.get_hash(height)?;
        state.block_records.get(&hash).cloned()
    }

    pub fn get_full_peak(&self) -> Result<Option<FullBlock>, BlockchainError> {
        let peak_hash = {
            let state = self.read_state();
            match state.peak_height.and_then(|h| state.height_map.get_hash(h)) {
                None => return Ok(None),
                Some(hash) => hash,
            }
        };
        Ok(self.block_store.get_full_block(&peak_hash)?)
    }

    pub fn get_full_block(&self, header_hash: &FixedHash) -> Result<Option<FullBlock>, BlockchainError> {
        Ok(self.block_store.get_full_block(header_hash)?)
    }

    /// Adds a validated block to the chain. Must only race with itself
    /// through the writer lock it takes internally.
    pub async fn receive_block(
        &self,
        block: &FullBlock,
        pre_validation_result: &PreValidationResult,
        fork_point_with_peak: Option<u32>,
    ) -> Result<(ReceiveBlockResult, Option<ErrorCode>, Option<StateChangeSummary>), BlockchainError> {
        let _guard = self.write_lock.lock().await;

        let header_hash = block.header_hash();
        let genesis = block.height() == 0;

        // 1. Duplicates
        if self.contains_block(&header_hash) {
            return Ok((ReceiveBlockResult::AlreadyHaveBlock, None, None));
        }
        // 2. Connectivity
        if !genesis && !self.contains_block(&block.prev_header_hash()) {
            return Ok((
                ReceiveBlockResult::DisconnectedBlock,
                Some(ErrorCode::InvalidPrevBlockHash),
                None,
            ));
        }
        // 3. Height continuity
        if !genesis {
            let prev = self.block_record(&block.prev_header_hash())?;
            if prev.height + 1 != block.height() {
                return Ok((ReceiveBlockResult::InvalidBlock, Some(ErrorCode::InvalidHeight), None));
            }
        }
        // 4. Pre-validation verdict
        if let Some(code) = pre_validation_result.error {
            return Ok((ReceiveBlockResult::InvalidBlock, Some(code), None));
        }
        let required_iters = match pre_validation_result.required_iters {
            Some(iters) => iters,
            None => {
                return Ok((ReceiveBlockResult::InvalidBlock, Some(ErrorCode::Unknown), None));
            },
        };

        // 5. Build the immutable record
        let block_record = match block_to_block_record(&self.constants, self, required_iters, block, None) {
            Ok(record) => record,
            Err(ConsensusError::InvalidSubEpochSummary) => {
                return Ok((
                    ReceiveBlockResult::InvalidBlock,
                    Some(ErrorCode::InvalidSubEpochSummary),
                    None,
                ));
            },
            Err(e) => return Err(e.into()),
        };

        // 6. Execution payload validation
        if let Some(code) = validate_block_body(
            &*self.execution_engine,
            self,
            &self.constants,
            block.execution_payload.as_ref(),
            Some(&block_record),
            self.config.optimistic_import,
        )
        .await
        {
            return Ok((ReceiveBlockResult::InvalidBlock, Some(code), None));
        }

        // 7. Persist atomically and reconsider the peak
        let mut txn = DbTransaction::new();
        txn.insert_block(header_hash, Arc::new(block.clone()), block_record.clone());
        let (records_to_add, state_change_summary) =
            match self.reconsider_peak(&mut txn, &block_record, block, genesis, fork_point_with_peak) {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.block_store.rollback_cache_block(&header_hash);
                    error!(
                        target: LOG_TARGET,
                        "Error while adding block {} height {}, rolling back: {}",
                        header_hash,
                        block.height(),
                        e
                    );
                    return Err(e);
                },
            };
        if let Err(e) = self.block_store.write(txn) {
            self.block_store.rollback_cache_block(&header_hash);
            error!(
                target: LOG_TARGET,
                "Error while adding block {} height {}, rolling back: {}",
                header_hash,
                block.height(),
                e
            );
            return Err(e.into());
        }

        // 8. Only now update the committed-state projection
        {
            let mut state = self.write_state();
            state.add_block_record(block_record.clone());
            if let Some(summary) = &state_change_summary {
                state.height_map.rollback(summary.fork_height);
                for record in &records_to_add {
                    state.height_map.update_height(
                        record.height,
                        record.header_hash,
                        record.sub_epoch_summary_included.as_ref(),
                    );
                }
                state.peak_height = Some(block_record.height);
            }
        }

        // 9. Opportunistic flush, outside the transaction
        self.write_state().height_map.maybe_flush()?;

        match state_change_summary {
            Some(summary) => {
                debug!(
                    target: LOG_TARGET,
                    "New peak at height {} ({}), fork height {}",
                    block_record.height,
                    header_hash,
                    summary.fork_height
                );
                Ok((ReceiveBlockResult::NewPeak, None, Some(summary)))
            },
            None => Ok((ReceiveBlockResult::AddedAsOrphan, None, None)),
        }
    }

    /// Decides whether `block_record` becomes the new peak, appending the
    /// necessary membership and rollback operations to `txn`. Returns the
    /// records that became canonical, oldest first.
    fn reconsider_peak(
        &self,
        txn: &mut DbTransaction,
        block_record: &BlockRecord,
        block: &FullBlock,
        genesis: bool,
        fork_point_with_peak: Option<u32>,
    ) -> Result<(Vec<BlockRecord>, Option<StateChangeSummary>), BlockchainError> {
        let peak = self.get_peak();

        if genesis {
            return if peak.is_none() {
                txn.set_in_chain(vec![block_record.header_hash]);
                txn.set_peak(block_record.header_hash);
                Ok((vec![block_record.clone()], Some(StateChangeSummary {
                    peak: block_record.clone(),
                    fork_height: 0,
                })))
            } else {
                Ok((Vec::new(), None))
            };
        }

        let peak = peak.ok_or_else(|| {
            ChainStorageError::InvalidOperation("non-genesis block arrived on an empty chain".to_string())
        })?;
        if block_record.weight <= peak.weight {
            // Not heavier than the heaviest chain we have seen
            return Ok((Vec::new(), None));
        }

        // Find the fork. An append returns the old peak; disjoint chains
        // return -1 and revert everything.
        let fork_height: i64 = if block_record.prev_hash == peak.header_hash {
            i64::from(peak.height)
        } else if let Some(hint) = fork_point_with_peak {
            i64::from(hint)
        } else {
            find_fork_point_in_chain(self, block_record, &peak)?
        };

        // Backtrack to the fork point, pulling the soon-to-be-canonical
        // blocks from the store.
        let mut blocks_to_add: Vec<BlockRecord> = Vec::new();
        let mut curr = block_record.header_hash;
        while fork_height < 0 || Some(curr) != self.height_to_hash(fork_height as u32) {
            let fetched = if curr == block_record.header_hash {
                debug_assert_eq!(block.header_hash(), curr);
                block_record.clone()
            } else {
                self.block_store
                    .get_block_record(&curr)?
                    .ok_or_else(|| ChainStorageError::ValueNotFound {
                        entity: "BlockRecord",
                        field: "header_hash",
                        value: curr.to_hex(),
                    })?
            };
            let at_genesis = fetched.height == 0;
            let prev_hash = fetched.prev_hash;
            blocks_to_add.push(fetched);
            if at_genesis {
                // Full reorg, starting over from height zero
                break;
            }
            curr = prev_hash;
        }
        blocks_to_add.reverse();

        txn.rollback_chain(fork_height);
        txn.set_in_chain(blocks_to_add.iter().map(|r| r.header_hash).collect());
        txn.set_peak(block_record.header_hash);

        Ok((blocks_to_add, Some(StateChangeSummary {
            peak: block_record.clone(),
            fork_height: std::cmp::max(fork_height, 0) as u32,
        })))
    }

    /// Header-validates an unfinished block against the current chain tip.
    pub async fn validate_unfinished_block_header(
        &self,
        block: &UnfinishedBlock,
        skip_overflow_ss_validation: bool,
    ) -> (Option<u64>, Option<ErrorCode>) {
        if !self.contains_block(&block.prev_header_hash()) &&
            block.prev_header_hash() != self.constants.genesis_challenge
        {
            return (None, Some(ErrorCode::InvalidPrevBlockHash));
        }

        let unfinished_header_block = block.to_unfinished_header_block();
        let prev_b = self.try_block_record(&block.prev_header_hash());
        let (sub_slot_iters, difficulty) = get_next_sub_slot_iters_and_difficulty(
            &self.constants,
            !unfinished_header_block.finished_sub_slots.is_empty(),
            prev_b.as_ref(),
            self,
        );
        match validate_unfinished_header_block(
            &self.constants,
            self,
            &unfinished_header_block,
            difficulty,
            sub_slot_iters,
            skip_overflow_ss_validation,
        ) {
            Ok(required_iters) => (Some(required_iters), None),
            Err(e) => (None, Some(e.code())),
        }
    }

    /// Fully validates an unfinished block, including its execution payload.
    pub async fn validate_unfinished_block(
        &self,
        block: &UnfinishedBlock,
        skip_overflow_ss_validation: bool,
    ) -> PreValidationResult {
        let (required_iters, error) = self
            .validate_unfinished_block_header(block, skip_overflow_ss_validation)
            .await;
        if let Some(code) = error {
            return PreValidationResult::with_error(code);
        }

        if let Some(code) = validate_block_body(
            &*self.execution_engine,
            self,
            &self.constants,
            block.execution_payload.as_ref(),
            None,
            self.config.optimistic_import,
        )
        .await
        {
            return PreValidationResult::with_error(code);
        }

        match required_iters {
            Some(iters) => PreValidationResult::ok(iters),
            None => PreValidationResult::with_error(ErrorCode::Unknown),
        }
    }

    /// Batch pre-validation against this chain's view, on the manager's
    /// worker pool.
    pub async fn pre_validate_blocks_parallel(
        &self,
        blocks: &[FullBlock],
        wp_summaries: Option<&[SubEpochSummary]>,
    ) -> Vec<PreValidationResult> {
        pre_validate_blocks(
            &self.constants,
            self,
            blocks,
            &self.pool,
            self.config.batch_size,
            wp_summaries,
        )
        .await
    }

    /// Preloads the record cache around `fork_point` from the store.
    pub fn warmup(&self, fork_point: u32) -> Result<(), BlockchainError> {
        if self.get_peak_height().is_none() {
            return Ok(());
        }
        let lo = fork_point.saturating_sub(self.constants.blocks_cache_size);
        let records = self.block_store.get_block_records_in_range(lo, fork_point)?;
        let mut state = self.write_state();
        for record in records.into_values() {
            state.add_block_record(record);
        }
        Ok(())
    }

    /// Removes every cached record with height below `height`.
    pub fn clean_block_record(&self, height: i64) {
        if height < 0 {
            return;
        }
        self.write_state().remove_records_below(height as u32);
    }

    /// Keeps the cache to the most recent `BLOCKS_CACHE_SIZE` heights below
    /// the peak; the retained window is what future difficulty adjustments
    /// need.
    pub fn clean_block_records(&self) {
        let (cache_len, peak_height) = {
            let state = self.read_state();
            (state.block_records.len(), state.peak_height)
        };
        if cache_len < self.constants.blocks_cache_size as usize {
            return;
        }
        let peak_height = match peak_height {
            None => return,
            Some(height) => height,
        };
        if peak_height < self.constants.blocks_cache_size {
            return;
        }
        self.clean_block_record(i64::from(peak_height) - i64::from(self.constants.blocks_cache_size));
    }

    /// The most recent reward-chain challenges walking back from the peak,
    /// oldest first, including prior sub-slot hashes at slot starts.
    pub fn get_recent_reward_challenges(&self) -> Vec<(FixedHash, u128)> {
        let peak = match self.get_peak() {
            None => return Vec::new(),
            Some(peak) => peak,
        };
        let limit = 2 * self.constants.max_sub_slot_blocks as usize;
        let mut recent_rc: Vec<(FixedHash, u128)> = Vec::new();
        let mut curr = Some(peak.clone());
        while let Some(record) = curr {
            if recent_rc.len() >= limit {
                break;
            }
            if record != peak {
                recent_rc.push((record.reward_infusion_new_challenge, record.total_iters));
            }
            if record.first_in_sub_slot {
                if let Some(hashes) = &record.finished_reward_slot_hashes {
                    let mut sub_slot_total_iters = record.ip_sub_slot_total_iters(&self.constants);
                    for rc_hash in hashes.iter().rev() {
                        if sub_slot_total_iters < u128::from(record.sub_slot_iters) {
                            break;
                        }
                        recent_rc.push((*rc_hash, sub_slot_total_iters));
                        sub_slot_total_iters -= u128::from(record.sub_slot_iters);
                    }
                }
            }
            curr = self.try_block_record(&record.prev_hash);
        }
        recent_rc.reverse();
        recent_rc
    }

    /// The sub-slot bundles enclosing the signage and infusion points of a
    /// block, when the relevant slot starts are still reachable.
    pub fn get_sp_and_ip_sub_slots(
        &self,
        header_hash: &FixedHash,
    ) -> Result<Option<(Option<EndOfSubSlotBundle>, Option<EndOfSubSlotBundle>)>, BlockchainError> {
        let block = match self.block_store.get_full_block(header_hash)? {
            None => return Ok(None),
            Some(block) => block,
        };
        let curr_record = self.block_record(header_hash)?;
        let is_overflow = curr_record.overflow;

        // Walk to the first block of the infusion sub-slot
        let mut curr_b = curr_record;
        let slot_block = loop {
            if curr_b.first_in_sub_slot {
                break self
                    .block_store
                    .get_full_block(&curr_b.header_hash)?
                    .ok_or_else(|| ChainStorageError::ValueNotFound {
                        entity: "FullBlock",
                        field: "header_hash",
                        value: curr_b.header_hash.to_hex(),
                    })?;
            }
            if curr_b.height == 0 {
                break block.clone();
            }
            curr_b = self.block_record(&curr_b.prev_hash)?;
        };

        if slot_block.finished_sub_slots.is_empty() {
            // Reached genesis without ever finishing a sub-slot
            return Ok(Some((None, None)));
        }
        let ip_sub_slot = slot_block.finished_sub_slots.last().cloned();

        if !is_overflow {
            // The signage point lives in the same sub-slot as the infusion
            return Ok(Some((None, ip_sub_slot)));
        }
        if slot_block.finished_sub_slots.len() > 1 {
            let sp_sub_slot = slot_block.finished_sub_slots[slot_block.finished_sub_slots.len() - 2].clone();
            return Ok(Some((Some(sp_sub_slot), ip_sub_slot)));
        }

        // The signage-point slot ended one block-run earlier
        let mut prev_b = match self.try_block_record(&slot_block.prev_header_hash()) {
            None => return Ok(Some((None, ip_sub_slot))),
            Some(prev) => prev,
        };
        let sp_slot_block = loop {
            if prev_b.first_in_sub_slot {
                break Some(self.block_store.get_full_block(&prev_b.header_hash)?.ok_or_else(|| {
                    ChainStorageError::ValueNotFound {
                        entity: "FullBlock",
                        field: "header_hash",
                        value: prev_b.header_hash.to_hex(),
                    }
                })?);
            }
            if prev_b.height == 0 {
                break None;
            }
            prev_b = self.block_record(&prev_b.prev_hash)?;
        };
        let sp_sub_slot = sp_slot_block.and_then(|b| b.finished_sub_slots.last().cloned());
        Ok(Some((sp_sub_slot, ip_sub_slot)))
    }

    pub fn get_next_difficulty(&self, header_hash: &FixedHash, new_slot: bool) -> Result<u64, BlockchainError> {
        let curr = self.block_record(header_hash)?;
        if curr.height <= 2 {
            return Ok(self.constants.difficulty_starting);
        }
        Ok(get_next_sub_slot_iters_and_difficulty(&self.constants, new_slot, Some(&curr), self).1)
    }

    pub fn get_next_slot_iters(&self, header_hash: &FixedHash, new_slot: bool) -> Result<u64, BlockchainError> {
        let curr = self.block_record(header_hash)?;
        if curr.height <= 2 {
            return Ok(self.constants.sub_slot_iters_starting);
        }
        Ok(get_next_sub_slot_iters_and_difficulty(&self.constants, new_slot, Some(&curr), self).0)
    }

    pub fn get_block_records_in_range(
        &self,
        start: u32,
        stop: u32,
    ) -> Result<HashMap<FixedHash, BlockRecord>, BlockchainError> {
        Ok(self.block_store.get_block_records_in_range(start, stop)?)
    }

    /// Canonical block records at the given heights.
    pub fn get_block_records_at(&self, heights: &[u32]) -> Result<Vec<BlockRecord>, BlockchainError> {
        let mut hashes = Vec::with_capacity(heights.len());
        for height in heights {
            let hash = self
                .height_to_hash(*height)
                .ok_or(ConsensusError::HeightNotFound(*height))?;
            hashes.push(hash);
        }
        Ok(self.block_store.get_block_records_by_hash(&hashes)?)
    }

    pub fn get_block_record_from_db(&self, header_hash: &FixedHash) -> Result<Option<BlockRecord>, BlockchainError> {
        if let Some(record) = self.try_block_record(header_hash) {
            return Ok(Some(record));
        }
        Ok(self.block_store.get_block_record(header_hash)?)
    }

    /// Canonical header blocks for `start..=stop`. Collects the canonical
    /// hashes first, then resolves the blocks, so the height index is read
    /// exactly once per height.
    pub fn get_header_blocks_in_range(
        &self,
        start: u32,
        stop: u32,
    ) -> Result<HashMap<FixedHash, HeaderBlock>, BlockchainError> {
        let mut hashes = Vec::new();
        for height in start..=stop {
            if let Some(hash) = self.height_to_hash(height) {
                hashes.push(hash);
            }
        }

        let blocks = self.block_store.get_blocks_by_hash(&hashes)?;
        let mut header_blocks = HashMap::with_capacity(blocks.len());
        for block in blocks {
            let header_hash = block.header_hash();
            if self.height_to_hash(block.height()) != Some(header_hash) {
                // A reorg moved this block out from under us mid-read
                return Err(BlockchainError::NotInCanonicalChain(header_hash));
            }
            header_blocks.insert(header_hash, block.to_header_block());
        }
        Ok(header_blocks)
    }

    pub fn get_header_block_by_height(
        &self,
        height: u32,
        header_hash: &FixedHash,
    ) -> Result<Option<HeaderBlock>, BlockchainError> {
        let header_dict = self.get_header_blocks_in_range(height, height)?;
        Ok(header_dict.get(header_hash).cloned())
    }

    pub fn persist_sub_epoch_challenge_segments(
        &self,
        ses_block_hash: FixedHash,
        segments: Vec<SubEpochChallengeSegment>,
    ) -> Result<(), BlockchainError> {
        Ok(self
            .block_store
            .persist_sub_epoch_challenge_segments(ses_block_hash, segments)?)
    }

    pub fn get_sub_epoch_challenge_segments(
        &self,
        ses_block_hash: &FixedHash,
    ) -> Result<Option<Vec<SubEpochChallengeSegment>>, BlockchainError> {
        Ok(self.block_store.get_sub_epoch_challenge_segments(ses_block_hash)?)
    }

    /// Returns true if this compact proof was already seen; records it
    /// otherwise. The set is bounded and cleared wholesale when it overflows.
    pub fn seen_compact_proofs(&self, vdf_info: &VdfInfo, height: u32) -> bool {
        let mut seen = self
            .seen_compact_proofs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let key = (vdf_info.clone(), height);
        if seen.contains(&key) {
            return true;
        }
        if seen.len() > MAX_SEEN_COMPACT_PROOFS {
            seen.clear();
        }
        seen.insert(key);
        false
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, ChainState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, ChainState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn cached_heights(&self) -> Vec<u32> {
        self.read_state().heights_in_cache.keys().copied().collect()
    }
}

impl BlockchainInterface for Blockchain {
    fn contains_block(&self, header_hash: &FixedHash) -> bool {
        self.read_state().block_records.contains_key(header_hash)
    }

    fn try_block_record(&self, header_hash: &FixedHash) -> Option<BlockRecord> {
        self.read_state().block_records.get(header_hash).cloned()
    }

    fn height_to_hash(&self, height: u32) -> Option<FixedHash> {
        self.read_state().height_map.get_hash(height)
    }

    fn get_ses_heights(&self) -> Vec<u32> {
        self.read_state().height_map.get_ses_heights()
    }

    fn get_ses(&self, height: u32) -> Option<SubEpochSummary> {
        self.read_state().height_map.get_ses(height)
    }
}

/// Brings the persisted height map back in line with the committed peak: a
/// crash may have left it a flush interval behind, or ahead after a partial
/// reorg.
fn reconcile_height_map(
    height_map: &mut BlockHeightMap,
    block_store: &BlockStore,
    peak: &BlockRecord,
) -> Result<(), BlockchainError> {
    if let Some(map_peak) = height_map.peak_height() {
        if map_peak > peak.height {
            warn!(
                target: LOG_TARGET,
                "Height map runs to {} but the committed peak is {}; truncating", map_peak, peak.height
            );
            height_map.rollback(peak.height);
        }
    }

    // Walk back from the peak until the map agrees, then replay forward
    let mut missing: Vec<BlockRecord> = Vec::new();
    let mut curr = peak.clone();
    loop {
        if height_map.get_hash(curr.height) == Some(curr.header_hash) {
            break;
        }
        let prev_hash = curr.prev_hash;
        let at_genesis = curr.height == 0;
        missing.push(curr);
        if at_genesis {
            break;
        }
        curr = block_store
            .get_block_record(&prev_hash)?
            .ok_or_else(|| ChainStorageError::ValueNotFound {
                entity: "BlockRecord",
                field: "header_hash",
                value: prev_hash.to_hex(),
            })?;
    }
    if !missing.is_empty() {
        info!(
            target: LOG_TARGET,
            "Rebuilding {} stale height map entries up to height {}",
            missing.len(),
            peak.height
        );
        for record in missing.into_iter().rev() {
            height_map.update_height(record.height, record.header_hash, record.sub_epoch_summary_included.as_ref());
        }
        height_map.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests;
