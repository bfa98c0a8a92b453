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

//! Proof-of-time iteration arithmetic: where signage and infusion points fall
//! within a sub-slot and how many iterations a proof of space must buy.

use corpochain_common_types::types::FixedHash;
use primitive_types::U512;
use sha2::{Digest, Sha256};

use crate::consensus::{ConsensusConstants, ConsensusError};

/// An overflow block has its signage point in the sub-slot before its
/// infusion point.
pub fn is_overflow_block(constants: &ConsensusConstants, signage_point_index: u8) -> Result<bool, ConsensusError> {
    if u32::from(signage_point_index) >= constants.num_sps_sub_slot {
        return Err(ConsensusError::InvalidSignagePointIndex(signage_point_index));
    }
    let extra = u32::from(constants.num_sp_intervals_extra);
    Ok(u32::from(signage_point_index) + extra >= constants.num_sps_sub_slot)
}

pub fn calculate_sp_interval_iters(constants: &ConsensusConstants, sub_slot_iters: u64) -> Result<u64, ConsensusError> {
    if sub_slot_iters % u64::from(constants.num_sps_sub_slot) != 0 {
        return Err(ConsensusError::InvalidSubSlotIters(sub_slot_iters));
    }
    Ok(sub_slot_iters / u64::from(constants.num_sps_sub_slot))
}

pub fn calculate_sp_iters(
    constants: &ConsensusConstants,
    sub_slot_iters: u64,
    signage_point_index: u8,
) -> Result<u64, ConsensusError> {
    if u32::from(signage_point_index) >= constants.num_sps_sub_slot {
        return Err(ConsensusError::InvalidSignagePointIndex(signage_point_index));
    }
    Ok(calculate_sp_interval_iters(constants, sub_slot_iters)? * u64::from(signage_point_index))
}

/// Where within the sub-slot a proof with `required_iters` gets infused,
/// wrapping around the slot end for overflow blocks.
pub fn calculate_ip_iters(
    constants: &ConsensusConstants,
    sub_slot_iters: u64,
    signage_point_index: u8,
    required_iters: u64,
) -> Result<u64, ConsensusError> {
    let sp_iters = calculate_sp_iters(constants, sub_slot_iters, signage_point_index)?;
    let sp_interval_iters = calculate_sp_interval_iters(constants, sub_slot_iters)?;
    if required_iters >= sp_interval_iters || required_iters == 0 {
        return Err(ConsensusError::InvalidRequiredIters {
            required_iters,
            sp_interval_iters,
        });
    }
    Ok(
        (sp_iters + u64::from(constants.num_sp_intervals_extra) * sp_interval_iters + required_iters) %
            sub_slot_iters,
    )
}

/// Expected space of a k-sized plot, in proof-of-space units.
pub fn expected_plot_size(k: u8) -> u128 {
    (2 * u128::from(k) + 1) << (u128::from(k) - 1)
}

/// Converts a quality string into the iterations the farmer must wait after
/// the signage point. Lower is better; scaled by difficulty and plot size.
pub fn calculate_iterations_quality(
    difficulty_constant_factor: u128,
    quality_string: &FixedHash,
    size: u8,
    difficulty: u64,
    cc_sp_output_hash: &FixedHash,
) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(quality_string.as_bytes());
    hasher.update(cc_sp_output_hash.as_bytes());
    let sp_quality_string = hasher.finalize();

    let numerator =
        U512::from(difficulty) * U512::from(difficulty_constant_factor) * U512::from_big_endian(&sp_quality_string);
    let denominator = (U512::one() << 256) * U512::from(expected_plot_size(size));
    let iters = numerator / denominator;
    if iters > U512::from(u64::MAX) {
        return u64::MAX;
    }
    std::cmp::max(1, iters.as_u64())
}
