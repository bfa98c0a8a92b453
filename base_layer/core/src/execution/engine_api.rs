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

//! Engine API wire types. Hashes and quantities use the 0x-hex conventions
//! shared with the execution payload.

use corpochain_common_types::types::{ExecutionAddress, ExecutionBlockHash};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::blocks::WithdrawalV1;

use crate::blocks::serde_eth;

/// Engine verdict over a payload or fork-choice update. Anything the engine
/// says that is not one of the five known statuses decodes to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PayloadStatus {
    Valid,
    Invalid,
    InvalidBlockHash,
    Syncing,
    Accepted,
    Unknown,
}

impl PayloadStatus {
    pub fn from_engine_str(status: &str) -> Self {
        match status {
            "VALID" => PayloadStatus::Valid,
            "INVALID" => PayloadStatus::Invalid,
            "INVALID_BLOCK_HASH" => PayloadStatus::InvalidBlockHash,
            "SYNCING" => PayloadStatus::Syncing,
            "ACCEPTED" => PayloadStatus::Accepted,
            _ => PayloadStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadStatusV1 {
    pub status: String,
    #[serde(default)]
    pub latest_valid_hash: Option<String>,
    #[serde(default)]
    pub validation_error: Option<String>,
}

impl PayloadStatusV1 {
    pub fn status(&self) -> PayloadStatus {
        PayloadStatus::from_engine_str(&self.status)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkchoiceStateV1 {
    #[serde(with = "serde_eth::fixed")]
    pub head_block_hash: ExecutionBlockHash,
    #[serde(with = "serde_eth::fixed")]
    pub safe_block_hash: ExecutionBlockHash,
    #[serde(with = "serde_eth::fixed")]
    pub finalized_block_hash: ExecutionBlockHash,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadAttributesV2 {
    #[serde(with = "serde_eth::quantity")]
    pub timestamp: u64,
    #[serde(with = "serde_eth::fixed")]
    pub prev_randao: corpochain_common_types::types::FixedHash,
    #[serde(with = "serde_eth::fixed")]
    pub suggested_fee_recipient: ExecutionAddress,
    pub withdrawals: Vec<WithdrawalV1>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkchoiceUpdatedResponse {
    pub payload_status: PayloadStatusV1,
    #[serde(default)]
    pub payload_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_statuses_decode_exactly() {
        assert_eq!(PayloadStatus::from_engine_str("VALID"), PayloadStatus::Valid);
        assert_eq!(PayloadStatus::from_engine_str("INVALID"), PayloadStatus::Invalid);
        assert_eq!(
            PayloadStatus::from_engine_str("INVALID_BLOCK_HASH"),
            PayloadStatus::InvalidBlockHash
        );
        assert_eq!(PayloadStatus::from_engine_str("SYNCING"), PayloadStatus::Syncing);
        assert_eq!(PayloadStatus::from_engine_str("ACCEPTED"), PayloadStatus::Accepted);
    }

    #[test]
    fn anything_else_decodes_to_unknown() {
        assert_eq!(PayloadStatus::from_engine_str("valid"), PayloadStatus::Unknown);
        assert_eq!(PayloadStatus::from_engine_str(""), PayloadStatus::Unknown);
        assert_eq!(PayloadStatus::from_engine_str("VALID_ACCEPTED"), PayloadStatus::Unknown);
    }

    #[test]
    fn forkchoice_state_serializes_with_prefixes() {
        let state = ForkchoiceStateV1 {
            head_block_hash: ExecutionBlockHash::from([1u8; 32]),
            safe_block_hash: ExecutionBlockHash::from([1u8; 32]),
            finalized_block_hash: ExecutionBlockHash::from([2u8; 32]),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["headBlockHash"], format!("0x{}", "01".repeat(32)));
        assert_eq!(json["finalizedBlockHash"], format!("0x{}", "02".repeat(32)));
    }
}
