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

//! The coinbase reward schedule and its materialization as execution-layer
//! withdrawals.

use crate::{
    blocks::{BlockRecord, WithdrawalV1, WITHDRAWAL_TYPE_PREFARM, WITHDRAWAL_TYPE_REWARD},
    consensus::{BlockchainInterface, ConsensusConstants, ConsensusError},
};

const CORPOCHAIN_TO_GWEI: u64 = 1_000_000_000;
const BLOCKS_PER_YEAR: u64 = 4608 * 2 * 365;

/// Coinbase reward in base subunits, halving-style steps every three years
/// until it runs out after year fifteen.
pub fn calculate_block_reward(height: u32) -> u64 {
    let height = u64::from(height);
    if height < 3 * BLOCKS_PER_YEAR {
        2 * CORPOCHAIN_TO_GWEI
    } else if height < 6 * BLOCKS_PER_YEAR {
        CORPOCHAIN_TO_GWEI
    } else if height < 9 * BLOCKS_PER_YEAR {
        CORPOCHAIN_TO_GWEI / 2
    } else if height < 12 * BLOCKS_PER_YEAR {
        CORPOCHAIN_TO_GWEI / 4
    } else if height < 15 * BLOCKS_PER_YEAR {
        CORPOCHAIN_TO_GWEI / 8
    } else {
        0
    }
}

/// Enumerates the withdrawals owed after `prev_tx_block`: the one-off prefarm
/// when the chain starts, then one coinbase reward per block back to (and
/// excluding) the previous transaction block.
pub fn create_withdrawals(
    constants: &ConsensusConstants,
    prev_tx_block: &BlockRecord,
    blocks: &dyn BlockchainInterface,
) -> Result<Vec<WithdrawalV1>, ConsensusError> {
    let mut withdrawals = Vec::new();
    let mut next_wd_index = match prev_tx_block.last_withdrawal_index {
        None => 0,
        Some(index) => index + 1,
    };

    if prev_tx_block.height == 0 {
        withdrawals.push(WithdrawalV1 {
            index: next_wd_index,
            withdrawal_type: WITHDRAWAL_TYPE_PREFARM,
            address: constants.prefarm_address,
            amount: constants.prefarm_amount * CORPOCHAIN_TO_GWEI,
        });
        next_wd_index += 1;
    }

    let mut curr = prev_tx_block.clone();
    loop {
        withdrawals.push(WithdrawalV1 {
            index: next_wd_index,
            withdrawal_type: WITHDRAWAL_TYPE_REWARD,
            address: curr.coinbase,
            amount: calculate_block_reward(curr.height),
        });
        next_wd_index += 1;

        if curr.prev_hash == constants.genesis_challenge {
            break;
        }
        curr = blocks.block_record(&curr.prev_hash)?;
        if curr.is_transaction_block {
            break;
        }
    }

    Ok(withdrawals)
}
