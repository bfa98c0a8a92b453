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

use crate::{
    blocks::BlockRecord,
    consensus::{BlockchainInterface, ConsensusError},
};

/// Height of the last common ancestor of `block_1` and `block_2`, or -1 when
/// the two chains share no block at all.
pub fn find_fork_point_in_chain(
    blocks: &dyn BlockchainInterface,
    block_1: &BlockRecord,
    block_2: &BlockRecord,
) -> Result<i64, ConsensusError> {
    let mut b1 = block_1.clone();
    let mut b2 = block_2.clone();

    while b2.height > b1.height {
        b2 = blocks.block_record(&b2.prev_hash)?;
    }
    while b1.height > b2.height {
        b1 = blocks.block_record(&b1.prev_hash)?;
    }

    loop {
        if b1.header_hash == b2.header_hash {
            return Ok(i64::from(b1.height));
        }
        if b1.height == 0 {
            return Ok(-1);
        }
        b1 = blocks.block_record(&b1.prev_hash)?;
        b2 = blocks.block_record(&b2.prev_hash)?;
    }
}
