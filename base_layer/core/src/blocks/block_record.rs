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

use std::cmp::Ordering;

use borsh::{BorshDeserialize, BorshSerialize};
use corpochain_common_types::types::{ExecutionAddress, ExecutionBlockHash, FixedHash};

use crate::{
    blocks::SubEpochSummary,
    consensus::{
        pot_iterations::{calculate_ip_iters, calculate_sp_iters},
        ConsensusConstants,
    },
};

/// Immutable consensus summary of a block. Everything fork choice, difficulty
/// adjustment and withdrawal derivation need without re-reading the full
/// block. Never mutated once created.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct BlockRecord {
    pub header_hash: FixedHash,
    pub prev_hash: FixedHash,
    pub height: u32,
    // Cumulative difficulty, the fork-choice metric
    pub weight: u128,
    pub total_iters: u128,
    pub signage_point_index: u8,
    pub required_iters: u64,
    pub deficit: u8,
    pub overflow: bool,
    pub first_in_sub_slot: bool,
    pub is_transaction_block: bool,
    pub sub_slot_iters: u64,
    pub coinbase: ExecutionAddress,
    pub reward_infusion_new_challenge: FixedHash,
    // Present iff transaction block
    pub timestamp: Option<u64>,
    pub execution_block_hash: Option<ExecutionBlockHash>,
    pub last_withdrawal_index: Option<u64>,
    // Present iff first_in_sub_slot
    pub finished_challenge_slot_hashes: Option<Vec<FixedHash>>,
    pub finished_reward_slot_hashes: Option<Vec<FixedHash>>,
    // Present iff this block closes a sub-epoch
    pub sub_epoch_summary_included: Option<SubEpochSummary>,
}

impl BlockRecord {
    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    pub fn is_challenge_block(&self, constants: &ConsensusConstants) -> bool {
        self.deficit == constants.min_blocks_per_challenge_block.saturating_sub(1)
    }

    pub fn sp_iters(&self, constants: &ConsensusConstants) -> u64 {
        calculate_sp_iters(constants, self.sub_slot_iters, self.signage_point_index)
            .expect("a stored block record holds validated signage point data")
    }

    pub fn ip_iters(&self, constants: &ConsensusConstants) -> u64 {
        calculate_ip_iters(
            constants,
            self.sub_slot_iters,
            self.signage_point_index,
            self.required_iters,
        )
        .expect("a stored block record holds validated infusion point data")
    }

    /// Total iterations at the start of the sub-slot this block was infused
    /// into.
    pub fn ip_sub_slot_total_iters(&self, constants: &ConsensusConstants) -> u128 {
        self.total_iters - u128::from(self.ip_iters(constants))
    }

    /// Total iterations at the start of the sub-slot holding this block's
    /// signage point. One sub-slot earlier than the infusion sub-slot for
    /// overflow blocks.
    pub fn sp_sub_slot_total_iters(&self, constants: &ConsensusConstants) -> u128 {
        let ip_slot_start = self.ip_sub_slot_total_iters(constants);
        if self.overflow {
            ip_slot_start - u128::from(self.sub_slot_iters)
        } else {
            ip_slot_start
        }
    }

    pub fn sp_total_iters(&self, constants: &ConsensusConstants) -> u128 {
        self.sp_sub_slot_total_iters(constants) + u128::from(self.sp_iters(constants))
    }
}

impl PartialEq for BlockRecord {
    fn eq(&self, other: &Self) -> bool {
        self.header_hash == other.header_hash
    }
}

impl Eq for BlockRecord {}

impl std::hash::Hash for BlockRecord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.header_hash.hash(state);
    }
}

// Fork-choice order: by weight, then total iterations, then hash as the
// deterministic tie break.
impl Ord for BlockRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.weight, self.total_iters, self.header_hash).cmp(&(other.weight, other.total_iters, other.header_hash))
    }
}

impl PartialOrd for BlockRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
