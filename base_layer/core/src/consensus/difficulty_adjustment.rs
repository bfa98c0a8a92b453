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

//! Next-epoch difficulty and sub-slot iteration computation.

use corpochain_common_types::Hashable;
use log::*;

use crate::{
    blocks::{BlockRecord, SubEpochSummary},
    consensus::{BlockchainInterface, ConsensusConstants},
};

const LOG_TARGET: &str = "c::consensus::difficulty";

/// Zeroes every bit below the top `significant_bits`, keeping adjustment
/// outputs deterministic.
pub fn truncate_to_significant_bits(input: u64, significant_bits: u8) -> u64 {
    if input == 0 {
        return 0;
    }
    let bits = 64 - input.leading_zeros();
    if bits <= u32::from(significant_bits) {
        return input;
    }
    let shift = bits - u32::from(significant_bits);
    (input >> shift) << shift
}

/// Whether the block following `prev_b` closes a sub-epoch, and whether it
/// also closes a full epoch. A boundary is crossed when the next height moves
/// into a new window relative to the last included summary.
pub fn can_finish_sub_and_full_epoch(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    prev_b: &BlockRecord,
) -> (bool, bool) {
    let next_height = prev_b.height + 1;
    if next_height < constants.sub_epoch_blocks {
        return (false, false);
    }

    let ses_heights = blocks.get_ses_heights();
    let last_ses_height = ses_heights.last().copied().unwrap_or(0);
    let can_finish_se =
        next_height / constants.sub_epoch_blocks > last_ses_height / constants.sub_epoch_blocks;
    if !can_finish_se {
        return (false, false);
    }

    // The epoch window is anchored at the last summary that changed the
    // difficulty.
    let last_epoch_height = ses_heights
        .iter()
        .rev()
        .find(|h| {
            blocks
                .get_ses(**h)
                .map(|ses| ses.new_difficulty.is_some())
                .unwrap_or(false)
        })
        .copied()
        .unwrap_or(0);
    let can_finish_epoch = next_height >= constants.epoch_blocks &&
        next_height / constants.epoch_blocks > last_epoch_height / constants.epoch_blocks;

    (true, can_finish_epoch)
}

/// Builds the summary the next first-in-sub-slot block must include.
pub fn make_sub_epoch_summary(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    prev_b: &BlockRecord,
    new_difficulty: Option<u64>,
    new_sub_slot_iters: Option<u64>,
) -> SubEpochSummary {
    let prev_ses_hash = blocks
        .get_ses_heights()
        .last()
        .and_then(|h| blocks.get_ses(*h))
        .map(|ses| ses.hash())
        .unwrap_or(constants.genesis_challenge);
    let next_height = prev_b.height + 1;
    SubEpochSummary {
        prev_subepoch_summary_hash: prev_ses_hash,
        reward_chain_hash: prev_b.reward_infusion_new_challenge,
        num_blocks_overflow: (next_height % constants.sub_epoch_blocks) as u8,
        new_difficulty,
        new_sub_slot_iters,
    }
}

/// Returns the `(sub_slot_iters, difficulty)` that apply to the block built
/// on `prev_b`. Outside an epoch boundary these are simply the running
/// values; at a boundary they are recomputed from the wall-clock time the
/// last epoch actually took.
pub fn get_next_sub_slot_iters_and_difficulty(
    constants: &ConsensusConstants,
    new_slot: bool,
    prev_b: Option<&BlockRecord>,
    blocks: &dyn BlockchainInterface,
) -> (u64, u64) {
    let prev_b = match prev_b {
        None => {
            return (constants.sub_slot_iters_starting, constants.difficulty_starting);
        },
        Some(prev) => prev,
    };

    if prev_b.height <= 2 {
        return (constants.sub_slot_iters_starting, constants.difficulty_starting);
    }

    let current_difficulty = match blocks.try_block_record(&prev_b.prev_hash) {
        Some(parent) => (prev_b.weight - parent.weight) as u64,
        None => constants.difficulty_starting,
    };
    let current_ssi = prev_b.sub_slot_iters;

    if !new_slot {
        return (current_ssi, current_difficulty);
    }
    let (_, can_finish_epoch) = can_finish_sub_and_full_epoch(constants, blocks, prev_b);
    if !can_finish_epoch {
        return (current_ssi, current_difficulty);
    }

    let (actual_seconds, blocks_elapsed) = match epoch_elapsed_time(constants, blocks, prev_b) {
        Some(elapsed) => elapsed,
        None => {
            warn!(
                target: LOG_TARGET,
                "Missing timestamps for the epoch ending at height {}; keeping current difficulty", prev_b.height
            );
            return (current_ssi, current_difficulty);
        },
    };
    let target_seconds =
        u128::from(blocks_elapsed) * u128::from(constants.sub_slot_time_target) / u128::from(constants.slot_blocks_target);

    let new_difficulty = scale_and_clamp(
        current_difficulty,
        target_seconds,
        actual_seconds,
        u64::from(constants.difficulty_change_max_factor),
        1,
        constants.significant_bits,
    );
    let new_ssi = scale_and_clamp(
        current_ssi,
        target_seconds,
        actual_seconds,
        u64::from(constants.difficulty_change_max_factor),
        constants.sub_slot_iters_hard_min,
        constants.significant_bits,
    );

    debug!(
        target: LOG_TARGET,
        "Epoch boundary at height {}: {}s elapsed over {} blocks; difficulty {} -> {}, sub_slot_iters {} -> {}",
        prev_b.height,
        actual_seconds,
        blocks_elapsed,
        current_difficulty,
        new_difficulty,
        current_ssi,
        new_ssi
    );
    (new_ssi, new_difficulty)
}

/// Wall-clock seconds between the transaction blocks bracketing the epoch
/// window ending at `prev_b`, with the number of blocks spanned.
fn epoch_elapsed_time(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    prev_b: &BlockRecord,
) -> Option<(u128, u32)> {
    let end_tb = find_transaction_block_at_or_below(blocks, prev_b.clone())?;
    let epoch_start_height = (prev_b.height + 1).saturating_sub(constants.epoch_blocks);
    let mut start_candidate = end_tb.clone();
    // Walk to the last transaction block at or below the epoch start
    loop {
        if start_candidate.height <= epoch_start_height {
            break;
        }
        let parent = blocks.try_block_record(&start_candidate.prev_hash)?;
        start_candidate = find_transaction_block_at_or_below(blocks, parent)?;
    }
    let start_ts = start_candidate.timestamp?;
    let end_ts = end_tb.timestamp?;
    if end_ts <= start_ts {
        return None;
    }
    let blocks_elapsed = end_tb.height.checked_sub(start_candidate.height)?;
    if blocks_elapsed == 0 {
        return None;
    }
    Some((u128::from(end_ts - start_ts), blocks_elapsed))
}

fn find_transaction_block_at_or_below(
    blocks: &dyn BlockchainInterface,
    start: BlockRecord,
) -> Option<BlockRecord> {
    let mut curr = start;
    while !curr.is_transaction_block {
        if curr.height == 0 {
            return None;
        }
        curr = blocks.try_block_record(&curr.prev_hash)?;
    }
    Some(curr)
}

fn scale_and_clamp(
    current: u64,
    target_seconds: u128,
    actual_seconds: u128,
    max_factor: u64,
    hard_min: u64,
    significant_bits: u8,
) -> u64 {
    let current = std::cmp::max(current, 1);
    let scaled = u128::from(current) * target_seconds / actual_seconds;
    let upper = u128::from(current.saturating_mul(max_factor));
    let lower = u128::from(std::cmp::max(current / max_factor, 1));
    let clamped = scaled.clamp(lower, upper) as u64;
    truncate_to_significant_bits(std::cmp::max(clamped, hard_min), significant_bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod truncate {
        use super::*;

        #[test]
        fn keeps_small_values_intact() {
            assert_eq!(truncate_to_significant_bits(0, 8), 0);
            assert_eq!(truncate_to_significant_bits(0xff, 8), 0xff);
        }

        #[test]
        fn zeroes_trailing_bits() {
            // 0x1ff has 9 significant bits; the lowest is dropped
            assert_eq!(truncate_to_significant_bits(0x1ff, 8), 0x1fe);
            assert_eq!(truncate_to_significant_bits(u64::MAX, 8), 0xff80_0000_0000_0000);
        }

        #[test]
        fn result_is_idempotent() {
            let once = truncate_to_significant_bits(123_456_789, 8);
            assert_eq!(truncate_to_significant_bits(once, 8), once);
        }
    }

    mod scale_and_clamp {
        use super::*;

        #[test]
        fn fast_epochs_raise_the_value() {
            // Took half the target time: double the difficulty
            let scaled = scale_and_clamp(1000, 200, 100, 3, 1, 64);
            assert_eq!(scaled, 2000);
        }

        #[test]
        fn clamps_to_the_max_factor() {
            let scaled = scale_and_clamp(1000, 1000, 10, 3, 1, 64);
            assert_eq!(scaled, 3000);
            let scaled = scale_and_clamp(1000, 10, 1000, 3, 1, 64);
            assert_eq!(scaled, 1000 / 3);
        }

        #[test]
        fn applies_the_hard_floor() {
            let scaled = scale_and_clamp(1000, 10, 1000, 3, 900, 64);
            assert_eq!(scaled, 900);
        }
    }
}
