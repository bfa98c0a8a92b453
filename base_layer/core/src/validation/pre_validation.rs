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

//! Batched, parallel header validation ahead of the serial insertion step.
//! Workers receive isolated copies of the recent chain window, so nothing in
//! here can mutate chain state; failure paths are side-effect free.

use std::{collections::HashMap, sync::Arc};

use corpochain_common_types::types::FixedHash;
use futures::future;
use log::*;
use tokio::sync::Semaphore;

use crate::{
    blocks::{BlockRecord, FullBlock, HeaderBlock, SubEpochSummary},
    consensus::{
        block_to_block_record,
        get_block_challenge,
        get_next_sub_slot_iters_and_difficulty,
        pot_iterations::{calculate_iterations_quality, is_overflow_block},
        BlockCache,
        BlockchainInterface,
        ConsensusConstants,
        ConsensusError,
    },
    validation::{validate_finished_header_block, ErrorCode},
};

const LOG_TARGET: &str = "c::validation::pre_validation";

/// Upper bound on validation workers, matching the platform limit the
/// process-pool equivalent runs into on Windows Server.
const MAX_VALIDATION_WORKERS: usize = 61;

/// Per-block verdict of the pipeline. `required_iters` is set iff `error` is
/// not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreValidationResult {
    pub error: Option<ErrorCode>,
    pub required_iters: Option<u64>,
}

impl PreValidationResult {
    pub fn ok(required_iters: u64) -> Self {
        Self {
            error: None,
            required_iters: Some(required_iters),
        }
    }

    pub fn with_error(code: ErrorCode) -> Self {
        Self {
            error: Some(code),
            required_iters: None,
        }
    }
}

/// Bounded pool of CPU-bound validation workers. The single-threaded variant
/// runs everything inline, for tests and low-core hosts.
pub struct ValidationPool {
    semaphore: Option<Arc<Semaphore>>,
    num_workers: usize,
}

impl ValidationPool {
    pub fn new(reserved_cores: usize) -> Self {
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let num_workers = std::cmp::min(std::cmp::max(cpus.saturating_sub(reserved_cores), 1), MAX_VALIDATION_WORKERS);
        info!(target: LOG_TARGET, "Started {} block validation workers", num_workers);
        Self {
            semaphore: Some(Arc::new(Semaphore::new(num_workers))),
            num_workers,
        }
    }

    pub fn single_threaded() -> Self {
        Self {
            semaphore: None,
            num_workers: 1,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    async fn dispatch<T, F>(&self, job: F) -> T
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        match &self.semaphore {
            None => job(),
            Some(semaphore) => {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("validation pool semaphore is never closed");
                match tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    job()
                })
                .await
                {
                    Ok(result) => result,
                    Err(e) => {
                        // A panicking worker must not take the node down with it
                        error!(target: LOG_TARGET, "Validation worker failed: {}", e);
                        std::panic::resume_unwind(e.into_panic())
                    },
                }
            },
        }
    }
}

/// Validates `blocks` (which must form a connected sequence) in parallel
/// batches of `batch_size`, returning one result per block in input order.
///
/// Early structural failures (unknown parent, invalid proof of space, bad
/// sub-epoch summary) abort the whole call with a single-element result, the
/// same way a peer delivering one bad block taints its whole batch.
pub async fn pre_validate_blocks(
    constants: &ConsensusConstants,
    block_records: &dyn BlockchainInterface,
    blocks: &[FullBlock],
    pool: &ValidationPool,
    batch_size: usize,
    wp_summaries: Option<&[SubEpochSummary]>,
) -> Vec<PreValidationResult> {
    if blocks.is_empty() {
        return Vec::new();
    }

    // Build the isolated recent window the workers will resolve against.
    let mut working = match collect_recent_window(constants, block_records, &blocks[0]) {
        Ok(cache) => cache,
        Err(code) => return vec![PreValidationResult::with_error(code)],
    };

    // First pass: derive expected difficulty and sub-slot iterations per
    // block, verify each proof of space, and layer tentative records into the
    // working view so later blocks can resolve their parents.
    let mut prev_b: Option<BlockRecord> = None;
    let mut diff_ssis: Vec<(u64, u64)> = Vec::with_capacity(blocks.len());
    for block in blocks {
        if block.height() != 0 && prev_b.is_none() {
            match working.try_block_record(&block.prev_header_hash()) {
                Some(record) => prev_b = Some(record),
                None => return vec![PreValidationResult::with_error(ErrorCode::InvalidPrevBlockHash)],
            }
        }

        let (sub_slot_iters, difficulty) = get_next_sub_slot_iters_and_difficulty(
            constants,
            block.first_in_sub_slot(),
            prev_b.as_ref(),
            &working,
        );

        let overflow = match is_overflow_block(constants, block.reward_chain_block.signage_point_index) {
            Ok(overflow) => overflow,
            Err(_) => return vec![PreValidationResult::with_error(ErrorCode::InvalidSpIndex)],
        };
        let challenge = match get_block_challenge(
            constants,
            &block.finished_sub_slots,
            block.prev_header_hash(),
            &working,
            prev_b.is_none(),
            overflow,
            false,
        ) {
            Ok(challenge) => challenge,
            Err(_) => return vec![PreValidationResult::with_error(ErrorCode::InvalidPospace)],
        };
        let cc_sp_hash = match &block.reward_chain_block.challenge_chain_sp_vdf {
            Some(vdf_info) => vdf_info.output_hash(),
            None => challenge,
        };
        let q_str = match block
            .reward_chain_block
            .proof_of_space
            .verify_and_get_quality_string(constants, &challenge, &cc_sp_hash)
        {
            Some(q_str) => q_str,
            None => return vec![PreValidationResult::with_error(ErrorCode::InvalidPospace)],
        };
        let required_iters = calculate_iterations_quality(
            constants.difficulty_constant_factor,
            &q_str,
            block.reward_chain_block.proof_of_space.size,
            difficulty,
            &cc_sp_hash,
        );

        let block_rec = match block_to_block_record(constants, &working, required_iters, block, Some(sub_slot_iters)) {
            Ok(record) => record,
            Err(ConsensusError::InvalidSubEpochSummary) => {
                return vec![PreValidationResult::with_error(ErrorCode::InvalidSubEpochSummary)];
            },
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to build tentative block record: {}", e);
                return vec![PreValidationResult::with_error(ErrorCode::Unknown)];
            },
        };

        if let (Some(ses), Some(summaries)) = (&block_rec.sub_epoch_summary_included, wp_summaries) {
            let idx = (block.height() / constants.sub_epoch_blocks) as usize;
            let expected = idx.checked_sub(1).and_then(|i| summaries.get(i));
            if expected.map(|s| s != ses).unwrap_or(true) {
                error!(
                    target: LOG_TARGET,
                    "Sub-epoch summary at height {} does not match the weight proof", block.height()
                );
                return vec![PreValidationResult::with_error(ErrorCode::InvalidSubEpochSummary)];
            }
        }

        working.add_block_record(block_rec.clone());
        prev_b = Some(block_rec);
        diff_ssis.push((difficulty, sub_slot_iters));
    }

    // Second pass: ship header batches to the workers and gather results in
    // input order.
    let records_snapshot: HashMap<FixedHash, BlockRecord> = working.records().clone();
    let batch_size = std::cmp::max(batch_size, 1);
    let mut batch_futures = Vec::new();
    for (batch_index, batch) in blocks.chunks(batch_size).enumerate() {
        let constants = constants.clone();
        let records = records_snapshot.clone();
        let headers: Vec<HeaderBlock> = batch.iter().map(|b| b.to_header_block()).collect();
        let expectations: Vec<(u64, u64)> = diff_ssis
            [batch_index * batch_size..batch_index * batch_size + batch.len()]
            .to_vec();
        batch_futures.push(pool.dispatch(move || batch_validate_headers(&constants, records, &headers, &expectations)));
    }
    future::join_all(batch_futures).await.into_iter().flatten().collect()
}

/// Runs the full header validator over one batch against an isolated view.
fn batch_validate_headers(
    constants: &ConsensusConstants,
    records: HashMap<FixedHash, BlockRecord>,
    headers: &[HeaderBlock],
    expectations: &[(u64, u64)],
) -> Vec<PreValidationResult> {
    let view = BlockCache::new(records);
    headers
        .iter()
        .zip(expectations)
        .map(|(header, (difficulty, sub_slot_iters))| {
            match validate_finished_header_block(constants, &view, header, *difficulty, *sub_slot_iters) {
                Ok(required_iters) => PreValidationResult::ok(required_iters),
                Err(e) => {
                    debug!(target: LOG_TARGET, "Pre-validation failed for {}: {}", header.log_string(), e);
                    PreValidationResult::with_error(e.code())
                },
            }
        })
        .collect()
}

/// Walks backwards from the first block's parent until the window contains a
/// sub-epoch summary, enough transaction-block timestamps, and two (three
/// when the tail is an overflow block) finished sub-slots.
fn collect_recent_window(
    constants: &ConsensusConstants,
    block_records: &dyn BlockchainInterface,
    first_block: &FullBlock,
) -> Result<BlockCache, ErrorCode> {
    let mut window = BlockCache::default();
    if first_block.height() == 0 {
        return Ok(window);
    }
    let mut curr = block_records
        .try_block_record(&first_block.prev_header_hash())
        .ok_or(ErrorCode::InvalidPrevBlockHash)?;

    let sub_slots_to_look_for = if curr.overflow { 3 } else { 2 };
    let mut num_sub_slots_found = 0usize;
    let mut num_blocks_seen = 0usize;
    let mut ses_seen = false;

    loop {
        if curr.first_in_sub_slot {
            num_sub_slots_found += curr.finished_challenge_slot_hashes.as_ref().map(Vec::len).unwrap_or(0);
        }
        if curr.sub_epoch_summary_included.is_some() {
            ses_seen = true;
        }
        if curr.is_transaction_block {
            num_blocks_seen += 1;
        }
        window.add_block_record(curr.clone());

        let done = ses_seen &&
            num_blocks_seen >= usize::from(constants.number_of_timestamps) &&
            num_sub_slots_found >= sub_slots_to_look_for;
        if done || curr.height == 0 {
            return Ok(window);
        }
        curr = block_records
            .try_block_record(&curr.prev_hash)
            .ok_or(ErrorCode::InvalidPrevBlockHash)?;
    }
}
