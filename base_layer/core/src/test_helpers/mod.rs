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

//! Builders for consensus-consistent test fixtures.

mod blockchain;

pub(crate) use blockchain::{create_test_blockchain, MockExecutionEngine, TempStore, TestBlockchain, TestChain};
use corpochain_common_types::{
    types::{
        BlsPublicKey,
        Bloom,
        ClassgroupElement,
        ExecutionAddress,
        ExecutionBlockHash,
        FixedHash,
        CLASSGROUP_ELEMENT_LENGTH,
    },
    Hashable,
};

use crate::{
    blocks::{
        proof_commitment,
        witness_commitment,
        BlockRecord,
        ChallengeChainSubSlot,
        EndOfSubSlotBundle,
        ExecutionPayloadV2,
        ProofOfSpace,
        RewardChainSubSlot,
        SubSlotProofs,
        VdfInfo,
        VdfProof,
        WithdrawalV1,
    },
    consensus::ConsensusConstants,
};

/// Small-parameter constants for fast deterministic tests. The plot filter is
/// disabled so every constructed proof is eligible.
pub(crate) fn test_constants() -> ConsensusConstants {
    let mut constants = ConsensusConstants::mainnet().clone();
    constants.slot_blocks_target = 4;
    constants.min_blocks_per_challenge_block = 4;
    constants.max_sub_slot_blocks = 8;
    constants.num_sps_sub_slot = 16;
    constants.sub_slot_iters_starting = 1024;
    constants.sub_slot_iters_hard_min = 64;
    constants.difficulty_constant_factor = 1024;
    constants.difficulty_starting = 4;
    constants.sub_epoch_blocks = 16;
    constants.epoch_blocks = 64;
    constants.number_zero_bits_plot_filter = 0;
    constants.max_future_time = 300;
    constants.number_of_timestamps = 3;
    constants.genesis_challenge = FixedHash::from([0x47u8; 32]);
    constants.max_vdf_witness_size = 4;
    constants.weight_proof_recent_blocks = 100;
    constants.blocks_cache_size = 32;
    constants.genesis_execution_block_hash = ExecutionBlockHash::from([0x5au8; 32]);
    constants.prefarm_address = ExecutionAddress::from([0x11u8; 20]);
    constants.prefarm_amount = 9;
    constants
}

/// A witness that opens the statement commitment for `(input, info)`.
pub(crate) fn make_vdf_proof(input: &ClassgroupElement, info: &VdfInfo) -> VdfProof {
    let mut witness = vec![0u8; CLASSGROUP_ELEMENT_LENGTH];
    witness[..32].copy_from_slice(witness_commitment(input, info).as_bytes());
    VdfProof {
        witness_type: 0,
        witness,
        normalized_to_identity: false,
    }
}

/// A proof of space that verifies for `(challenge, cc_sp_hash)` at the
/// minimum plot size.
pub(crate) fn make_proof_of_space(
    constants: &ConsensusConstants,
    challenge: &FixedHash,
    cc_sp_hash: &FixedHash,
) -> ProofOfSpace {
    let plot_public_key = BlsPublicKey::from([7u8; 48]);
    let mut pos = ProofOfSpace {
        challenge: *challenge,
        plot_public_key,
        size: constants.min_plot_size,
        proof: vec![0u8; usize::from(constants.min_plot_size) * 8],
    };
    let commitment = proof_commitment(&pos.get_plot_id(), challenge, cc_sp_hash);
    pos.proof[..32].copy_from_slice(commitment.as_bytes());
    pos
}

/// A block record with plausible defaults; callers override what they assert
/// on. Weight defaults to `total_iters` so ordering tests read naturally.
pub(crate) fn make_block_record(header_hash: FixedHash, height: u32, total_iters: u128) -> BlockRecord {
    BlockRecord {
        header_hash,
        prev_hash: FixedHash::zero(),
        height,
        weight: total_iters,
        total_iters,
        signage_point_index: 0,
        required_iters: 1,
        deficit: 3,
        overflow: false,
        first_in_sub_slot: false,
        is_transaction_block: false,
        sub_slot_iters: 1024,
        coinbase: ExecutionAddress::from([9u8; 20]),
        reward_infusion_new_challenge: header_hash,
        timestamp: None,
        execution_block_hash: None,
        last_withdrawal_index: None,
        finished_challenge_slot_hashes: None,
        finished_reward_slot_hashes: None,
        sub_epoch_summary_included: None,
    }
}

/// A finished sub-slot whose VDF proofs verify, chained onto
/// `prev_challenge`.
pub(crate) fn make_end_of_sub_slot(
    constants: &ConsensusConstants,
    prev_challenge: FixedHash,
    seed: u8,
) -> EndOfSubSlotBundle {
    let input = ClassgroupElement::zero();
    let cc_vdf = VdfInfo::new(
        prev_challenge,
        constants.sub_slot_iters_starting,
        ClassgroupElement::from([seed; 100]),
    );
    let challenge_chain = ChallengeChainSubSlot {
        challenge_chain_end_of_slot_vdf: cc_vdf.clone(),
        infused_challenge_chain_sub_slot_hash: None,
        subepoch_summary_hash: None,
        new_sub_slot_iters: None,
        new_difficulty: None,
    };
    let rc_vdf = VdfInfo::new(
        prev_challenge,
        constants.sub_slot_iters_starting,
        ClassgroupElement::from([seed.wrapping_add(1); 100]),
    );
    let reward_chain = RewardChainSubSlot {
        end_of_slot_vdf: rc_vdf.clone(),
        challenge_chain_sub_slot_hash: challenge_chain.hash(),
        infused_challenge_chain_sub_slot_hash: None,
        deficit: constants.min_blocks_per_challenge_block - 1,
    };
    let proofs = SubSlotProofs {
        challenge_chain_slot_proof: make_vdf_proof(&input, &cc_vdf),
        infused_challenge_chain_slot_proof: None,
        reward_chain_slot_proof: make_vdf_proof(&input, &rc_vdf),
    };
    EndOfSubSlotBundle {
        challenge_chain,
        infused_challenge_chain: None,
        reward_chain,
        proofs,
    }
}

/// A minimal well-formed execution payload.
pub(crate) fn make_execution_payload(
    block_number: u64,
    block_hash: ExecutionBlockHash,
    withdrawals: Vec<WithdrawalV1>,
) -> ExecutionPayloadV2 {
    ExecutionPayloadV2 {
        parent_hash: ExecutionBlockHash::zero(),
        fee_recipient: ExecutionAddress::from([2u8; 20]),
        state_root: FixedHash::from([3u8; 32]),
        receipts_root: FixedHash::from([4u8; 32]),
        logs_bloom: Bloom::zero(),
        prev_randao: FixedHash::from([5u8; 32]),
        block_number,
        gas_limit: 30_000_000,
        gas_used: 0,
        timestamp: 1_700_000_000 + block_number,
        extra_data: Vec::new(),
        base_fee_per_gas: 7,
        block_hash,
        transactions: Vec::new(),
        withdrawals,
    }
}
