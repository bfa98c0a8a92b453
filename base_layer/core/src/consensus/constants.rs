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

use corpochain_common_types::types::{ExecutionAddress, ExecutionBlockHash, FixedHash};
use log::*;
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::consensus::ConsensusError;

const LOG_TARGET: &str = "c::consensus::constants";

/// Network parameters consumed by the chain core. A network profile overrides
/// individual values through [`ConsensusOverrides`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusConstants {
    /// How many blocks to target per sub-slot
    pub slot_blocks_target: u32,
    /// How many blocks must be created per slot to make a challenge block
    pub min_blocks_per_challenge_block: u8,
    /// Max number of blocks that can be infused into a sub-slot
    pub max_sub_slot_blocks: u32,
    /// Signage points per sub-slot, including the 0th at the slot start
    pub num_sps_sub_slot: u32,
    pub sub_slot_iters_starting: u64,
    /// Hard floor for anti-stall protection
    pub sub_slot_iters_hard_min: u64,
    /// Multiplied by the difficulty to get iterations
    pub difficulty_constant_factor: u128,
    pub difficulty_starting: u64,
    /// Max factor by which difficulty and sub_slot_iters change per epoch
    pub difficulty_change_max_factor: u32,
    pub sub_epoch_blocks: u32,
    /// Blocks per epoch; must be a multiple of sub_epoch_blocks
    pub epoch_blocks: u32,
    /// Bits retained in difficulty and iteration figures; the rest are zeroed
    pub significant_bits: u8,
    pub discriminant_size_bits: u16,
    /// H(plot id ++ challenge ++ sp) must start with this many zero bits
    pub number_zero_bits_plot_filter: u8,
    pub min_plot_size: u8,
    pub max_plot_size: u8,
    /// Target seconds per sub-slot
    pub sub_slot_time_target: u64,
    /// Signage-point intervals between a signage point and its infusion
    pub num_sp_intervals_extra: u8,
    /// Seconds a timestamp may run ahead of local time
    pub max_future_time: u64,
    /// Window size for the timestamp monotonicity check
    pub number_of_timestamps: u8,
    /// Initial challenge for both chains and the first back-pointers
    pub genesis_challenge: FixedHash,
    /// Maximum classgroup elements within an n-wesolowski witness
    pub max_vdf_witness_size: u8,
    pub weight_proof_threshold: u8,
    pub weight_proof_recent_blocks: u32,
    pub blocks_cache_size: u32,
    pub genesis_execution_block_hash: ExecutionBlockHash,
    pub prefarm_address: ExecutionAddress,
    pub prefarm_amount: u64,
}

static MAINNET: Lazy<ConsensusConstants> = Lazy::new(|| ConsensusConstants {
    slot_blocks_target: 32,
    min_blocks_per_challenge_block: 16,
    max_sub_slot_blocks: 128,
    num_sps_sub_slot: 64,
    sub_slot_iters_starting: 2u64.pow(27),
    sub_slot_iters_hard_min: 2u64.pow(20),
    difficulty_constant_factor: 2u128.pow(67),
    difficulty_starting: 7,
    difficulty_change_max_factor: 3,
    sub_epoch_blocks: 384,
    epoch_blocks: 4608,
    significant_bits: 8,
    discriminant_size_bits: 1024,
    number_zero_bits_plot_filter: 9,
    min_plot_size: 32,
    max_plot_size: 50,
    sub_slot_time_target: 600,
    num_sp_intervals_extra: 3,
    max_future_time: 5 * 60,
    number_of_timestamps: 11,
    genesis_challenge: parse_hash("a90dbbb23b8b935b1a51e7e6ef08e9e2d32c33b55c5cbbb1d29a9fda80768c06"),
    max_vdf_witness_size: 64,
    weight_proof_threshold: 2,
    weight_proof_recent_blocks: 1000,
    blocks_cache_size: 4608 + 128 * 4,
    genesis_execution_block_hash: parse_hash("9f3e5b40af964a6c0b9f6e7e5f2c00f35e7a8cc3bb31d7a9c45b6efb6f4e9c51"),
    prefarm_address: parse_address("69fe5f0ab5e0af4a9f65c5c8eda84c90d0e7dd3b"),
    prefarm_amount: 21_000_000,
});

fn parse_hash(hex_str: &str) -> FixedHash {
    FixedHash::from_hex(hex_str).expect("built-in constant is valid hex")
}

fn parse_address(hex_str: &str) -> ExecutionAddress {
    ExecutionAddress::from_hex(hex_str).expect("built-in constant is valid hex")
}

impl ConsensusConstants {
    pub fn mainnet() -> &'static Self {
        &MAINNET
    }
}

/// Partial constant overrides as they appear in a network profile. Byte-sized
/// values are hex strings and are replaced wholesale; unknown keys are
/// tolerated at the deserialization layer.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConsensusOverrides {
    pub slot_blocks_target: Option<u32>,
    pub min_blocks_per_challenge_block: Option<u8>,
    pub max_sub_slot_blocks: Option<u32>,
    pub num_sps_sub_slot: Option<u32>,
    pub sub_slot_iters_starting: Option<u64>,
    pub sub_slot_iters_hard_min: Option<u64>,
    pub difficulty_constant_factor: Option<u128>,
    pub difficulty_starting: Option<u64>,
    pub difficulty_change_max_factor: Option<u32>,
    pub sub_epoch_blocks: Option<u32>,
    pub epoch_blocks: Option<u32>,
    pub significant_bits: Option<u8>,
    pub number_zero_bits_plot_filter: Option<u8>,
    pub sub_slot_time_target: Option<u64>,
    pub max_future_time: Option<u64>,
    pub number_of_timestamps: Option<u8>,
    pub genesis_challenge: Option<String>,
    pub weight_proof_recent_blocks: Option<u32>,
    pub blocks_cache_size: Option<u32>,
    pub genesis_execution_block_hash: Option<String>,
    pub prefarm_address: Option<String>,
    pub prefarm_amount: Option<u64>,
}

impl ConsensusOverrides {
    /// Applies this profile on top of `base`, decoding hex strings into their
    /// byte representations.
    pub fn apply(&self, base: &ConsensusConstants) -> Result<ConsensusConstants, ConsensusError> {
        let mut constants = base.clone();

        macro_rules! replace {
            ($($field:ident),+ $(,)?) => {
                $(if let Some(value) = self.$field {
                    constants.$field = value;
                })+
            };
        }
        replace!(
            slot_blocks_target,
            min_blocks_per_challenge_block,
            max_sub_slot_blocks,
            num_sps_sub_slot,
            sub_slot_iters_starting,
            sub_slot_iters_hard_min,
            difficulty_constant_factor,
            difficulty_starting,
            difficulty_change_max_factor,
            sub_epoch_blocks,
            epoch_blocks,
            significant_bits,
            number_zero_bits_plot_filter,
            sub_slot_time_target,
            max_future_time,
            number_of_timestamps,
            weight_proof_recent_blocks,
            blocks_cache_size,
            prefarm_amount,
        );

        if let Some(hex_str) = &self.genesis_challenge {
            constants.genesis_challenge = FixedHash::from_hex(hex_str)
                .map_err(|_| ConsensusError::InvalidConstantOverride("genesis_challenge".to_string()))?;
        }
        if let Some(hex_str) = &self.genesis_execution_block_hash {
            constants.genesis_execution_block_hash = ExecutionBlockHash::from_hex(hex_str)
                .map_err(|_| ConsensusError::InvalidConstantOverride("genesis_execution_block_hash".to_string()))?;
        }
        if let Some(hex_str) = &self.prefarm_address {
            constants.prefarm_address = ExecutionAddress::from_hex(hex_str)
                .map_err(|_| ConsensusError::InvalidConstantOverride("prefarm_address".to_string()))?;
        }

        if constants.epoch_blocks % constants.sub_epoch_blocks != 0 {
            warn!(
                target: LOG_TARGET,
                "epoch_blocks ({}) is not a multiple of sub_epoch_blocks ({})",
                constants.epoch_blocks,
                constants.sub_epoch_blocks
            );
        }
        Ok(constants)
    }
}
