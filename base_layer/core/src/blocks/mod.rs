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

//! Immutable block value types. Everything in this module is a plain value
//! with a deterministic borsh encoding; `Hashable::hash` is the SHA-256 digest
//! of that encoding and is the canonical identity used across the chain.

mod block_record;
mod execution_payload;
mod foliage;
mod full_block;
mod header_block;
mod proof_of_space;
mod reward_chain_block;
mod slots;
mod sub_epoch_summary;
mod unfinished_block;
mod unfinished_header_block;
mod vdf;
mod weight_proof;

pub use block_record::BlockRecord;
pub(crate) use execution_payload::serde_eth;
#[cfg(test)]
pub(crate) use proof_of_space::proof_commitment;
#[cfg(test)]
pub(crate) use vdf::witness_commitment;
pub use execution_payload::{ExecutionPayloadV2, WithdrawalV1, WITHDRAWAL_TYPE_PREFARM, WITHDRAWAL_TYPE_REWARD};
pub use foliage::{Foliage, FoliageBlockData, FoliageTransactionBlock};
pub use full_block::FullBlock;
pub use header_block::HeaderBlock;
pub use proof_of_space::ProofOfSpace;
pub use reward_chain_block::{RewardChainBlock, RewardChainBlockUnfinished};
pub use slots::{
    ChallengeChainSubSlot,
    EndOfSubSlotBundle,
    InfusedChallengeChainSubSlot,
    RewardChainSubSlot,
    SubSlotProofs,
};
pub use sub_epoch_summary::SubEpochSummary;
pub use unfinished_block::UnfinishedBlock;
pub use unfinished_header_block::UnfinishedHeaderBlock;
pub use vdf::{VdfInfo, VdfProof};
pub use weight_proof::{SubEpochChallengeSegment, SubEpochSegments};

use borsh::BorshSerialize;
use corpochain_common_types::types::FixedHash;
use sha2::{Digest, Sha256};

/// SHA-256 over the borsh encoding of a value. Borsh is canonical, so this is
/// a stable content address.
pub(crate) fn hash_of<T: BorshSerialize>(value: &T) -> FixedHash {
    let bytes = borsh::to_vec(value).expect("borsh serialization of an in-memory block type is infallible");
    let digest = Sha256::digest(&bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    FixedHash::from(out)
}

macro_rules! impl_hashable {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl corpochain_common_types::Hashable for $ty {
                fn hash(&self) -> FixedHash {
                    crate::blocks::hash_of(self)
                }
            }
        )+
    };
}

impl_hashable!(
    Foliage,
    FoliageBlockData,
    FoliageTransactionBlock,
    RewardChainBlock,
    RewardChainBlockUnfinished,
    ChallengeChainSubSlot,
    InfusedChallengeChainSubSlot,
    RewardChainSubSlot,
    SubEpochSummary,
    VdfInfo,
    ProofOfSpace,
);
