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

use std::collections::{BTreeMap, HashMap};

use corpochain_common_types::types::FixedHash;

use crate::{
    blocks::{BlockRecord, SubEpochSummary},
    consensus::BlockchainInterface,
};

/// An owned, mutable snapshot of block records used as the working view
/// during pre-validation. Mutating it never touches the chain manager's
/// state, which keeps failure paths side-effect free.
#[derive(Clone, Debug, Default)]
pub struct BlockCache {
    block_records: HashMap<FixedHash, BlockRecord>,
    height_to_hash: HashMap<u32, FixedHash>,
    sub_epoch_summaries: BTreeMap<u32, SubEpochSummary>,
}

impl BlockCache {
    pub fn new(block_records: HashMap<FixedHash, BlockRecord>) -> Self {
        let mut cache = Self::default();
        for record in block_records.into_values() {
            cache.add_block_record(record);
        }
        cache
    }

    pub fn len(&self) -> usize {
        self.block_records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block_records.is_empty()
    }

    pub fn records(&self) -> &HashMap<FixedHash, BlockRecord> {
        &self.block_records
    }

    /// Adds a record, indexing its height and any sub-epoch summary it
    /// carries.
    pub fn add_block_record(&mut self, block_record: BlockRecord) {
        self.height_to_hash.insert(block_record.height, block_record.header_hash);
        if let Some(ses) = &block_record.sub_epoch_summary_included {
            self.sub_epoch_summaries.insert(block_record.height, ses.clone());
        }
        self.block_records.insert(block_record.header_hash, block_record);
    }

    pub fn remove_block_record(&mut self, header_hash: &FixedHash) {
        if let Some(record) = self.block_records.remove(header_hash) {
            self.height_to_hash.remove(&record.height);
            self.sub_epoch_summaries.remove(&record.height);
        }
    }
}

impl BlockchainInterface for BlockCache {
    fn contains_block(&self, header_hash: &FixedHash) -> bool {
        self.block_records.contains_key(header_hash)
    }

    fn try_block_record(&self, header_hash: &FixedHash) -> Option<BlockRecord> {
        self.block_records.get(header_hash).cloned()
    }

    fn height_to_hash(&self, height: u32) -> Option<FixedHash> {
        self.height_to_hash.get(&height).copied()
    }

    fn get_ses_heights(&self) -> Vec<u32> {
        self.sub_epoch_summaries.keys().copied().collect()
    }

    fn get_ses(&self, height: u32) -> Option<SubEpochSummary> {
        self.sub_epoch_summaries.get(&height).cloned()
    }
}
