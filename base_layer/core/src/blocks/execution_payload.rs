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

//! The opaque execution-layer block and its Engine API JSON form. Quantities
//! and byte strings follow the 0x-prefixed hex conventions of the Engine API.

use borsh::{BorshDeserialize, BorshSerialize};
use corpochain_common_types::types::{Bloom, ExecutionAddress, ExecutionBlockHash, FixedHash};
use serde::{Deserialize, Serialize};

pub const WITHDRAWAL_TYPE_PREFARM: u64 = 0;
pub const WITHDRAWAL_TYPE_REWARD: u64 = 1;

/// A credit instruction pushed into the execution layer. The Engine API
/// `validatorIndex` slot carries the withdrawal type (0 = prefarm, 1 = block
/// reward).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct WithdrawalV1 {
    #[serde(with = "serde_eth::quantity")]
    pub index: u64,
    #[serde(rename = "validatorIndex", with = "serde_eth::quantity")]
    pub withdrawal_type: u64,
    #[serde(with = "serde_eth::fixed")]
    pub address: ExecutionAddress,
    #[serde(with = "serde_eth::quantity")]
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayloadV2 {
    #[serde(with = "serde_eth::fixed")]
    pub parent_hash: ExecutionBlockHash,
    #[serde(with = "serde_eth::fixed")]
    pub fee_recipient: ExecutionAddress,
    #[serde(with = "serde_eth::fixed")]
    pub state_root: FixedHash,
    #[serde(with = "serde_eth::fixed")]
    pub receipts_root: FixedHash,
    #[serde(with = "serde_eth::fixed")]
    pub logs_bloom: Bloom,
    #[serde(with = "serde_eth::fixed")]
    pub prev_randao: FixedHash,
    #[serde(with = "serde_eth::quantity")]
    pub block_number: u64,
    #[serde(with = "serde_eth::quantity")]
    pub gas_limit: u64,
    #[serde(with = "serde_eth::quantity")]
    pub gas_used: u64,
    #[serde(with = "serde_eth::quantity")]
    pub timestamp: u64,
    #[serde(with = "serde_eth::bytes")]
    pub extra_data: Vec<u8>,
    #[serde(with = "serde_eth::quantity_u128")]
    pub base_fee_per_gas: u128,
    #[serde(with = "serde_eth::fixed")]
    pub block_hash: ExecutionBlockHash,
    #[serde(with = "serde_eth::bytes_list")]
    pub transactions: Vec<Vec<u8>>,
    pub withdrawals: Vec<WithdrawalV1>,
}

impl ExecutionPayloadV2 {
    pub fn last_withdrawal_index(&self) -> Option<u64> {
        self.withdrawals.last().map(|w| w.index)
    }
}

/// 0x-prefixed hex (de)serialization helpers for the Engine API surface.
pub(crate) mod serde_eth {
    pub mod quantity {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&format!("0x{:x}", value))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
            let s = String::deserialize(deserializer)?;
            let digits = s.strip_prefix("0x").unwrap_or(&s);
            u64::from_str_radix(digits, 16).map_err(serde::de::Error::custom)
        }
    }

    pub mod quantity_u128 {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&format!("0x{:x}", value))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
            let s = String::deserialize(deserializer)?;
            let digits = s.strip_prefix("0x").unwrap_or(&s);
            u128::from_str_radix(digits, 16).map_err(serde::de::Error::custom)
        }
    }

    pub mod fixed {
        use std::convert::TryFrom;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
            T: AsRef<[u8]>,
        {
            serializer.serialize_str(&format!("0x{}", hex::encode(value.as_ref())))
        }

        pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
        where
            D: Deserializer<'de>,
            T: for<'a> TryFrom<&'a [u8]>,
        {
            let s = String::deserialize(deserializer)?;
            let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)?;
            T::try_from(bytes.as_slice()).map_err(|_| serde::de::Error::custom("invalid byte length"))
        }
    }

    pub mod bytes {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&format!("0x{}", hex::encode(value)))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
            let s = String::deserialize(deserializer)?;
            hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
        }
    }

    pub mod bytes_list {
        use serde::{ser::SerializeSeq, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(value.len()))?;
            for item in value {
                seq.serialize_element(&format!("0x{}", hex::encode(item)))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
            let items = Vec::<String>::deserialize(deserializer)?;
            items
                .into_iter()
                .map(|s| hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom))
                .collect()
        }
    }
}
