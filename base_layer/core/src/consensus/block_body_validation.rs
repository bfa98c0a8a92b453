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

//! Execution-payload validation policy. The header is assumed valid by the
//! time this runs; everything here is about what the external engine says and
//! how far we trust it while it is still syncing.

use log::*;

use crate::{
    blocks::{BlockRecord, ExecutionPayloadV2},
    consensus::{create_withdrawals, BlockchainInterface, ConsensusConstants},
    execution::{ExecutionEngine, ForkchoiceStateV1, PayloadAttributesV2, PayloadStatus},
    validation::ErrorCode,
};

const LOG_TARGET: &str = "c::consensus::block_body";

/// Transaction blocks this far behind the head are reported to the engine as
/// finalized.
const FINALIZED_TX_BLOCK_DEPTH: u32 = 32;

/// Validates the execution payload of a block through the engine.
///
/// `block_record` is present for finished blocks, which additionally drive a
/// fork-choice update; unfinished blocks stop after `new_payload`. Non
/// transaction blocks carry no payload and pass trivially. Engine transport
/// failures and timeouts degrade to [`ErrorCode::Unknown`].
pub async fn validate_block_body(
    engine: &dyn ExecutionEngine,
    blocks: &dyn BlockchainInterface,
    constants: &ConsensusConstants,
    payload: Option<&ExecutionPayloadV2>,
    block_record: Option<&BlockRecord>,
    optimistic_import: bool,
) -> Option<ErrorCode> {
    let payload = match payload {
        None => return None,
        Some(payload) => payload,
    };

    let status = match engine.new_payload(payload).await {
        Ok(status) => status,
        Err(e) => {
            warn!(target: LOG_TARGET, "new_payload failed for {}: {}", payload.block_hash, e);
            return Some(ErrorCode::Unknown);
        },
    };
    match status {
        PayloadStatus::Invalid | PayloadStatus::InvalidBlockHash => {
            return Some(ErrorCode::PayloadInvalidated);
        },
        PayloadStatus::Syncing | PayloadStatus::Accepted => {
            if block_record.is_none() {
                // Unfinished block: nothing to optimistically import yet
                return Some(ErrorCode::PayloadNotValidated);
            }
        },
        PayloadStatus::Valid => {},
        PayloadStatus::Unknown => return Some(ErrorCode::Unknown),
    }

    let block_record = match block_record {
        None => return None,
        Some(record) => record,
    };

    let state = forkchoice_state(constants, blocks, block_record, payload);
    let attributes = payload_attributes(constants, blocks, block_record);
    let status = match engine.forkchoice_update(state, attributes).await {
        Ok(status) => status,
        Err(e) => {
            warn!(
                target: LOG_TARGET,
                "forkchoice_update failed for {}: {}", payload.block_hash, e
            );
            return Some(ErrorCode::Unknown);
        },
    };
    match status {
        PayloadStatus::Valid => None,
        PayloadStatus::Invalid | PayloadStatus::InvalidBlockHash => Some(ErrorCode::PayloadInvalidated),
        PayloadStatus::Syncing | PayloadStatus::Accepted => {
            if optimistic_import {
                debug!(
                    target: LOG_TARGET,
                    "Importing {} optimistically while the engine catches up", payload.block_hash
                );
                None
            } else {
                Some(ErrorCode::PayloadNotValidated)
            }
        },
        PayloadStatus::Unknown => Some(ErrorCode::Unknown),
    }
}

fn forkchoice_state(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    head: &BlockRecord,
    payload: &ExecutionPayloadV2,
) -> ForkchoiceStateV1 {
    let finalized_block_hash = finalized_execution_hash(constants, blocks, head);
    ForkchoiceStateV1 {
        head_block_hash: payload.block_hash,
        safe_block_hash: payload.block_hash,
        finalized_block_hash,
    }
}

/// Execution hash of the newest transaction block at least
/// `FINALIZED_TX_BLOCK_DEPTH` blocks behind `head`, or the genesis execution
/// block when the chain is still that young.
fn finalized_execution_hash(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    head: &BlockRecord,
) -> corpochain_common_types::types::ExecutionBlockHash {
    let target_height = head.height.saturating_sub(FINALIZED_TX_BLOCK_DEPTH);
    let mut curr = head.clone();
    loop {
        if curr.height == 0 {
            break;
        }
        let parent = match blocks.try_block_record(&curr.prev_hash) {
            Some(parent) => parent,
            None => break,
        };
        curr = parent;
        if curr.height <= target_height && curr.is_transaction_block {
            if let Some(hash) = curr.execution_block_hash {
                return hash;
            }
        }
    }
    constants.genesis_execution_block_hash
}

/// Attributes handed to the engine so it can start building the next payload
/// on top of the new head, crediting all rewards accrued since the previous
/// transaction block.
fn payload_attributes(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    head: &BlockRecord,
) -> Option<PayloadAttributesV2> {
    let withdrawals = match create_withdrawals(constants, head, blocks) {
        Ok(withdrawals) => withdrawals,
        Err(e) => {
            warn!(target: LOG_TARGET, "Could not derive withdrawals for {}: {}", head.header_hash, e);
            return None;
        },
    };
    Some(PayloadAttributesV2 {
        timestamp: head.timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp() as u64),
        prev_randao: head.reward_infusion_new_challenge,
        suggested_fee_recipient: head.coinbase,
        withdrawals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        consensus::BlockCache,
        test_helpers::{make_block_record, make_execution_payload, test_constants, MockExecutionEngine},
    };
    use corpochain_common_types::types::{ExecutionBlockHash, FixedHash};

    fn tx_record() -> BlockRecord {
        let mut record = make_block_record(FixedHash::from([1u8; 32]), 0, 100);
        record.prev_hash = test_constants().genesis_challenge;
        record.is_transaction_block = true;
        record.timestamp = Some(1_700_000_000);
        record.execution_block_hash = Some(ExecutionBlockHash::from([0xabu8; 32]));
        record
    }

    #[tokio::test]
    async fn non_transaction_blocks_pass_without_engine_calls() {
        let constants = test_constants();
        let engine = MockExecutionEngine::new();
        let cache = BlockCache::default();
        let result = validate_block_body(&engine, &cache, &constants, None, None, true).await;
        assert_eq!(result, None);
        assert_eq!(engine.new_payload_calls(), 0);
    }

    #[tokio::test]
    async fn unfinished_block_accepts_only_valid() {
        let constants = test_constants();
        let cache = BlockCache::default();
        let payload = make_execution_payload(1, ExecutionBlockHash::from([2u8; 32]), vec![]);

        let engine = MockExecutionEngine::new();
        assert_eq!(
            validate_block_body(&engine, &cache, &constants, Some(&payload), None, true).await,
            None
        );

        let engine = MockExecutionEngine::with_new_payload_status(PayloadStatus::Invalid);
        assert_eq!(
            validate_block_body(&engine, &cache, &constants, Some(&payload), None, true).await,
            Some(ErrorCode::PayloadInvalidated)
        );

        let engine = MockExecutionEngine::with_new_payload_status(PayloadStatus::Syncing);
        assert_eq!(
            validate_block_body(&engine, &cache, &constants, Some(&payload), None, true).await,
            Some(ErrorCode::PayloadNotValidated)
        );
    }

    #[tokio::test]
    async fn full_block_respects_the_optimistic_import_flag() {
        let constants = test_constants();
        let cache = BlockCache::default();
        let record = tx_record();
        let payload = make_execution_payload(1, record.execution_block_hash.unwrap(), vec![]);

        let engine = MockExecutionEngine::with_forkchoice_status(PayloadStatus::Syncing);
        assert_eq!(
            validate_block_body(&engine, &cache, &constants, Some(&payload), Some(&record), true).await,
            None
        );

        let engine = MockExecutionEngine::with_forkchoice_status(PayloadStatus::Syncing);
        assert_eq!(
            validate_block_body(&engine, &cache, &constants, Some(&payload), Some(&record), false).await,
            Some(ErrorCode::PayloadNotValidated)
        );
    }

    #[tokio::test]
    async fn full_block_rejects_forkchoice_invalid() {
        let constants = test_constants();
        let cache = BlockCache::default();
        let record = tx_record();
        let payload = make_execution_payload(1, record.execution_block_hash.unwrap(), vec![]);
        let engine = MockExecutionEngine::with_forkchoice_status(PayloadStatus::Invalid);
        assert_eq!(
            validate_block_body(&engine, &cache, &constants, Some(&payload), Some(&record), true).await,
            Some(ErrorCode::PayloadInvalidated)
        );
    }

    #[tokio::test]
    async fn unrecognized_statuses_degrade_to_unknown() {
        let constants = test_constants();
        let cache = BlockCache::default();
        let record = tx_record();
        let payload = make_execution_payload(1, record.execution_block_hash.unwrap(), vec![]);
        let engine = MockExecutionEngine::with_new_payload_status(PayloadStatus::Unknown);
        assert_eq!(
            validate_block_body(&engine, &cache, &constants, Some(&payload), Some(&record), true).await,
            Some(ErrorCode::Unknown)
        );
    }

    #[tokio::test]
    async fn forkchoice_attributes_carry_the_withdrawals() {
        let constants = test_constants();
        let cache = BlockCache::default();
        let record = tx_record();
        let payload = make_execution_payload(1, record.execution_block_hash.unwrap(), vec![]);
        let engine = MockExecutionEngine::new();
        validate_block_body(&engine, &cache, &constants, Some(&payload), Some(&record), true).await;

        let attributes = engine.last_attributes().expect("attributes were sent");
        // Height-0 transaction block: prefarm plus its own coinbase reward
        assert_eq!(attributes.withdrawals.len(), 2);
        assert_eq!(attributes.withdrawals[0].index, 0);
        assert_eq!(attributes.withdrawals[0].address, constants.prefarm_address);
        assert_eq!(attributes.suggested_fee_recipient, record.coinbase);
        assert_eq!(attributes.prev_randao, record.reward_infusion_new_challenge);
    }
}
