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

use num_derive::FromPrimitive;
use serde_repr::{Deserialize_repr, Serialize_repr};
use strum_macros::Display;
use thiserror::Error;

use crate::consensus::ConsensusError;

/// Compact numeric validation verdicts as they travel across worker and peer
/// boundaries. Values are part of the wire format; never renumber.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromPrimitive, Serialize_repr, Deserialize_repr,
)]
#[repr(u16)]
pub enum ErrorCode {
    Unknown = 1,
    InvalidPrevBlockHash = 2,
    InvalidHeight = 3,
    InvalidWeight = 4,
    InvalidPospace = 5,
    InvalidSubEpochSummary = 6,
    PayloadInvalidated = 7,
    PayloadNotValidated = 8,
    InvalidNewSubSlotIters = 10,
    InvalidNewDifficulty = 11,
    InvalidCcEosVdf = 12,
    InvalidIccEosVdf = 13,
    InvalidRcEosVdf = 14,
    InvalidIccPresence = 15,
    InvalidSpIndex = 16,
    InvalidCcSpVdf = 17,
    InvalidRcSpVdf = 18,
    InvalidCcIpVdf = 19,
    InvalidIccIpVdf = 20,
    InvalidRcIpVdf = 21,
    InvalidTotalIters = 22,
    InvalidRequiredIters = 23,
    InvalidIsTransactionBlock = 24,
    InvalidPrevChallengeSlotHash = 25,
    InvalidFoliageBlockPresence = 26,
    InvalidFoliageBlockHash = 27,
    InvalidRewardBlockHash = 28,
    InvalidUrsbHash = 29,
    TimestampTooFarInPast = 30,
    TimestampTooFarInFuture = 31,
    InvalidPrevTransactionBlockHash = 32,
    InvalidExecutionPayloadPresence = 33,
}

/// A failed consensus check, carrying the wire code and a human-readable
/// account of what was violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{code}: {details}")]
    Block { code: ErrorCode, details: String },
    #[error("Consensus error during validation: {0}")]
    Consensus(#[from] ConsensusError),
}

impl ValidationError {
    pub fn new<T: Into<String>>(code: ErrorCode, details: T) -> Self {
        ValidationError::Block {
            code,
            details: details.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ValidationError::Block { code, .. } => *code,
            ValidationError::Consensus(err) => match err {
                ConsensusError::BlockRecordNotFound(_) | ConsensusError::HeightNotFound(_) => {
                    ErrorCode::InvalidPrevBlockHash
                },
                ConsensusError::InvalidSignagePointIndex(_) => ErrorCode::InvalidSpIndex,
                ConsensusError::InvalidRequiredIters { .. } => ErrorCode::InvalidRequiredIters,
                ConsensusError::InvalidSubEpochSummary => ErrorCode::InvalidSubEpochSummary,
                _ => ErrorCode::Unknown,
            },
        }
    }
}
