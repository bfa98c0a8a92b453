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

use corpochain_common_types::types::FixedHash;

use crate::{
    blocks::{BlockRecord, SubEpochSummary},
    consensus::ConsensusError,
};

/// Read-only view of block records and the canonical height index. The chain
/// manager implements this over its cache; validation workers implement it
/// over an isolated [`BlockCache`](crate::consensus::BlockCache).
pub trait BlockchainInterface {
    fn contains_block(&self, header_hash: &FixedHash) -> bool;

    fn try_block_record(&self, header_hash: &FixedHash) -> Option<BlockRecord>;

    fn block_record(&self, header_hash: &FixedHash) -> Result<BlockRecord, ConsensusError> {
        self.try_block_record(header_hash)
            .ok_or(ConsensusError::BlockRecordNotFound(*header_hash))
    }

    fn height_to_hash(&self, height: u32) -> Option<FixedHash>;

    fn contains_height(&self, height: u32) -> bool {
        self.height_to_hash(height).is_some()
    }

    fn height_to_block_record(&self, height: u32) -> Result<BlockRecord, ConsensusError> {
        let header_hash = self.height_to_hash(height).ok_or(ConsensusError::HeightNotFound(height))?;
        self.block_record(&header_hash)
    }

    /// Heights of all known sub-epoch summaries, ascending.
    fn get_ses_heights(&self) -> Vec<u32>;

    fn get_ses(&self, height: u32) -> Option<SubEpochSummary>;
}
