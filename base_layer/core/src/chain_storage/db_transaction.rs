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

use std::{fmt, sync::Arc};

use corpochain_common_types::types::FixedHash;

use crate::blocks::{BlockRecord, FullBlock, SubEpochChallengeSegment};

/// An ordered list of writes applied atomically by
/// [`BlockStore::write`](crate::chain_storage::BlockStore::write). Either
/// every operation commits or none do.
#[derive(Debug, Default)]
pub struct DbTransaction {
    operations: Vec<WriteOperation>,
}

impl DbTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> &[WriteOperation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn insert_block(&mut self, header_hash: FixedHash, block: Arc<FullBlock>, record: BlockRecord) -> &mut Self {
        self.operations.push(WriteOperation::InsertBlock {
            header_hash,
            block,
            record,
        });
        self
    }

    /// Marks the given blocks as members of the canonical chain.
    pub fn set_in_chain(&mut self, header_hashes: Vec<FixedHash>) -> &mut Self {
        self.operations.push(WriteOperation::SetInChain { header_hashes });
        self
    }

    pub fn set_peak(&mut self, header_hash: FixedHash) -> &mut Self {
        self.operations.push(WriteOperation::SetPeak { header_hash });
        self
    }

    /// Removes canonical-chain membership strictly above `height`. A
    /// negative height reverts the whole chain.
    pub fn rollback_chain(&mut self, height: i64) -> &mut Self {
        self.operations.push(WriteOperation::RollbackChain { height });
        self
    }

    pub fn insert_sub_epoch_segments(
        &mut self,
        ses_hash: FixedHash,
        segments: Vec<SubEpochChallengeSegment>,
    ) -> &mut Self {
        self.operations
            .push(WriteOperation::InsertSubEpochSegments { ses_hash, segments });
        self
    }
}

#[derive(Debug)]
pub enum WriteOperation {
    InsertBlock {
        header_hash: FixedHash,
        block: Arc<FullBlock>,
        record: BlockRecord,
    },
    SetInChain {
        header_hashes: Vec<FixedHash>,
    },
    SetPeak {
        header_hash: FixedHash,
    },
    RollbackChain {
        height: i64,
    },
    InsertSubEpochSegments {
        ses_hash: FixedHash,
        segments: Vec<SubEpochChallengeSegment>,
    },
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOperation::InsertBlock { header_hash, record, .. } => {
                write!(f, "InsertBlock({}, height {})", header_hash, record.height)
            },
            WriteOperation::SetInChain { header_hashes } => write!(f, "SetInChain({} blocks)", header_hashes.len()),
            WriteOperation::SetPeak { header_hash } => write!(f, "SetPeak({})", header_hash),
            WriteOperation::RollbackChain { height } => write!(f, "RollbackChain(above {})", height),
            WriteOperation::InsertSubEpochSegments { ses_hash, segments } => {
                write!(f, "InsertSubEpochSegments({}, {} segments)", ses_hash, segments.len())
            },
        }
    }
}
