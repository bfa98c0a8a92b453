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

use corpochain_common_types::{types::FixedHash, Hashable};

use crate::{
    blocks::EndOfSubSlotBundle,
    consensus::{BlockchainInterface, ConsensusConstants, ConsensusError},
};

/// Derives the proof-of-space challenge for a block.
///
/// The challenge is the hash of the sub-slot the signage point falls in. For
/// overflow blocks that is one slot further back, unless overflow validation
/// of the final slot is being skipped.
pub fn get_block_challenge(
    constants: &ConsensusConstants,
    finished_sub_slots: &[EndOfSubSlotBundle],
    prev_header_hash: FixedHash,
    blocks: &dyn BlockchainInterface,
    genesis_block: bool,
    overflow: bool,
    skip_overflow_last_ss_validation: bool,
) -> Result<FixedHash, ConsensusError> {
    let slots_to_look_for: usize = if overflow && !skip_overflow_last_ss_validation {
        2
    } else {
        1
    };

    if !finished_sub_slots.is_empty() {
        // Walk the newly finished slots from most recent backwards,
        // continuing into the chain when they do not reach far enough.
        let mut challenges: Vec<FixedHash> = Vec::with_capacity(slots_to_look_for);
        for sub_slot in finished_sub_slots.iter().rev() {
            if challenges.len() >= slots_to_look_for {
                break;
            }
            challenges.push(sub_slot.challenge_chain.hash());
        }
        if challenges.len() < slots_to_look_for {
            if genesis_block {
                challenges.push(constants.genesis_challenge);
            } else {
                collect_chain_challenges(constants, blocks, prev_header_hash, &mut challenges, slots_to_look_for)?;
            }
        }
        return Ok(challenges[slots_to_look_for - 1]);
    }

    if genesis_block {
        return Ok(constants.genesis_challenge);
    }

    let mut challenges: Vec<FixedHash> = Vec::with_capacity(slots_to_look_for);
    collect_chain_challenges(constants, blocks, prev_header_hash, &mut challenges, slots_to_look_for)?;
    Ok(challenges[slots_to_look_for - 1])
}

/// Appends finished challenge-slot hashes found walking back from
/// `start_hash` until `wanted` entries exist, falling back to the genesis
/// challenge at the chain start.
fn collect_chain_challenges(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    start_hash: FixedHash,
    challenges: &mut Vec<FixedHash>,
    wanted: usize,
) -> Result<(), ConsensusError> {
    let mut curr = blocks.block_record(&start_hash)?;
    loop {
        if challenges.len() >= wanted {
            return Ok(());
        }
        if curr.first_in_sub_slot {
            if let Some(hashes) = &curr.finished_challenge_slot_hashes {
                for hash in hashes.iter().rev() {
                    if challenges.len() >= wanted {
                        break;
                    }
                    challenges.push(*hash);
                }
            }
        }
        if curr.height == 0 {
            while challenges.len() < wanted {
                challenges.push(constants.genesis_challenge);
            }
            return Ok(());
        }
        curr = blocks.block_record(&curr.prev_hash)?;
    }
}
