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

use corpochain_common_types::Hashable;

use crate::{
    blocks::{BlockRecord, FullBlock},
    consensus::{
        can_finish_sub_and_full_epoch,
        get_next_sub_slot_iters_and_difficulty,
        make_sub_epoch_summary,
        pot_iterations::is_overflow_block,
        BlockchainInterface,
        ConsensusConstants,
        ConsensusError,
    },
};

/// How many more blocks must be infused into the current slot before its
/// challenge chain can be infused.
///
/// Counts down from `MIN_BLOCKS_PER_CHALLENGE_BLOCK - 1` at genesis and
/// resets when a slot finishes, with the reset withheld from an overflow
/// block that still belongs to the previous slot.
pub fn calculate_deficit(
    constants: &ConsensusConstants,
    height: u32,
    prev_b: Option<&BlockRecord>,
    overflow: bool,
    num_finished_sub_slots: usize,
) -> u8 {
    let reset = constants.min_blocks_per_challenge_block;
    if height == 0 {
        return reset - 1;
    }
    let prev_deficit = prev_b.map(|p| p.deficit).unwrap_or(reset - 1);

    if prev_deficit == reset {
        // The previous block was an overflow block that received the full
        // reset; this one continues the countdown unless it overflows too.
        if overflow && num_finished_sub_slots == 0 {
            return prev_deficit;
        }
        return prev_deficit - 1;
    }

    if prev_deficit == 0 {
        match num_finished_sub_slots {
            0 => 0,
            1 if overflow => reset,
            _ => reset - 1,
        }
    } else {
        prev_deficit.saturating_sub(1)
    }
}

/// Builds the immutable [`BlockRecord`] for a block whose header has already
/// been validated against `required_iters`.
pub fn block_to_block_record(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    required_iters: u64,
    block: &FullBlock,
    sub_slot_iters: Option<u64>,
) -> Result<BlockRecord, ConsensusError> {
    let height = block.height();
    let prev_b = if height == 0 {
        None
    } else {
        Some(blocks.block_record(&block.prev_header_hash())?)
    };

    let new_slot = block.first_in_sub_slot();
    let sub_slot_iters = match sub_slot_iters {
        Some(ssi) => ssi,
        None => get_next_sub_slot_iters_and_difficulty(constants, new_slot, prev_b.as_ref(), blocks).0,
    };
    let overflow = is_overflow_block(constants, block.reward_chain_block.signage_point_index)
        .map_err(|_| ConsensusError::InvalidSignagePointIndex(block.reward_chain_block.signage_point_index))?;
    let deficit = calculate_deficit(
        constants,
        height,
        prev_b.as_ref(),
        overflow,
        block.finished_sub_slots.len(),
    );

    let sub_epoch_summary_included = expected_sub_epoch_summary(constants, blocks, prev_b.as_ref(), block)?;

    let (finished_challenge_slot_hashes, finished_reward_slot_hashes) = if new_slot {
        (
            Some(
                block
                    .finished_sub_slots
                    .iter()
                    .map(|ss| ss.challenge_chain.hash())
                    .collect(),
            ),
            Some(block.finished_sub_slots.iter().map(|ss| ss.reward_chain.hash()).collect()),
        )
    } else {
        (None, None)
    };

    let last_withdrawal_index = match &block.execution_payload {
        Some(payload) => payload
            .last_withdrawal_index()
            .or_else(|| prev_b.as_ref().and_then(|p| p.last_withdrawal_index)),
        None => prev_b.as_ref().and_then(|p| p.last_withdrawal_index),
    };

    Ok(BlockRecord {
        header_hash: block.header_hash(),
        prev_hash: block.prev_header_hash(),
        height,
        weight: block.weight(),
        total_iters: block.total_iters(),
        signage_point_index: block.reward_chain_block.signage_point_index,
        required_iters,
        deficit,
        overflow,
        first_in_sub_slot: new_slot,
        is_transaction_block: block.is_transaction_block(),
        sub_slot_iters,
        coinbase: block.foliage.foliage_block_data.coinbase,
        reward_infusion_new_challenge: block.reward_chain_block.hash(),
        timestamp: block.foliage_transaction_block.as_ref().map(|ftb| ftb.timestamp),
        execution_block_hash: block.execution_payload.as_ref().map(|p| p.block_hash),
        last_withdrawal_index,
        finished_challenge_slot_hashes,
        finished_reward_slot_hashes,
        sub_epoch_summary_included,
    })
}

/// Computes the sub-epoch summary this block must include (if any) and
/// cross-checks it against the one announced in the first finished sub-slot.
fn expected_sub_epoch_summary(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    prev_b: Option<&BlockRecord>,
    block: &FullBlock,
) -> Result<Option<crate::blocks::SubEpochSummary>, ConsensusError> {
    let announced = block
        .finished_sub_slots
        .first()
        .and_then(|ss| ss.challenge_chain.subepoch_summary_hash);

    let prev_b = match prev_b {
        None => {
            if announced.is_some() {
                return Err(ConsensusError::InvalidSubEpochSummary);
            }
            return Ok(None);
        },
        Some(prev) => prev,
    };

    if !block.first_in_sub_slot() {
        if announced.is_some() {
            return Err(ConsensusError::InvalidSubEpochSummary);
        }
        return Ok(None);
    }

    let (can_finish_se, can_finish_epoch) = can_finish_sub_and_full_epoch(constants, blocks, prev_b);
    if !can_finish_se {
        if announced.is_some() {
            return Err(ConsensusError::InvalidSubEpochSummary);
        }
        return Ok(None);
    }

    let (new_difficulty, new_sub_slot_iters) = if can_finish_epoch {
        let (ssi, difficulty) = get_next_sub_slot_iters_and_difficulty(constants, true, Some(prev_b), blocks);
        (Some(difficulty), Some(ssi))
    } else {
        (None, None)
    };
    let ses = make_sub_epoch_summary(constants, blocks, prev_b, new_difficulty, new_sub_slot_iters);
    match announced {
        Some(hash) if hash == ses.hash() => Ok(Some(ses)),
        _ => Err(ConsensusError::InvalidSubEpochSummary),
    }
}
