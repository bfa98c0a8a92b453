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

//! Pure consensus rules: constants, proof-of-time iteration arithmetic,
//! difficulty adjustment, challenge derivation, the block record conversion
//! and the reward schedule.

pub mod block_body_validation;
mod block_cache;
mod block_rewards;
mod blockchain_interface;
mod constants;
mod difficulty_adjustment;
mod find_fork_point;
mod full_block_to_block_record;
mod get_block_challenge;
pub mod pot_iterations;

pub use block_body_validation::validate_block_body;
pub use block_cache::BlockCache;
pub use block_rewards::{calculate_block_reward, create_withdrawals};
pub use blockchain_interface::BlockchainInterface;
pub use constants::{ConsensusConstants, ConsensusOverrides};
pub use difficulty_adjustment::{
    can_finish_sub_and_full_epoch,
    get_next_sub_slot_iters_and_difficulty,
    make_sub_epoch_summary,
    truncate_to_significant_bits,
};
pub use find_fork_point::find_fork_point_in_chain;
pub use full_block_to_block_record::{block_to_block_record, calculate_deficit};
pub use get_block_challenge::get_block_challenge;

use corpochain_common_types::types::FixedHash;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("Block record {0} not found")]
    BlockRecordNotFound(FixedHash),
    #[error("No block at height {0} in the canonical chain")]
    HeightNotFound(u32),
    #[error("Signage point index {0} is out of range")]
    InvalidSignagePointIndex(u8),
    #[error("Sub slot iterations {0} are not divisible into signage points")]
    InvalidSubSlotIters(u64),
    #[error("Required iters {required_iters} do not fit the signage point interval {sp_interval_iters}")]
    InvalidRequiredIters {
        required_iters: u64,
        sp_interval_iters: u64,
    },
    #[error("Sub epoch summary does not match the expected value")]
    InvalidSubEpochSummary,
    #[error("Invalid constant override for {0}")]
    InvalidConstantOverride(String),
}
