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

use std::{
    convert::TryFrom,
    fmt,
    str::FromStr,
};

use borsh::{BorshDeserialize, BorshSerialize};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const BLOCK_HASH_LENGTH: usize = 32;
pub const EXECUTION_ADDRESS_LENGTH: usize = 20;
pub const BLS_PUBLIC_KEY_LENGTH: usize = 48;
pub const BLS_SIGNATURE_LENGTH: usize = 96;
pub const CLASSGROUP_ELEMENT_LENGTH: usize = 100;
pub const BLOOM_LENGTH: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SizedBytesError {
    #[error("Invalid size: expected {expected} bytes, got {actual}")]
    InvalidSize { expected: usize, actual: usize },
    #[error("Invalid hex encoding")]
    InvalidHex,
}

macro_rules! sized_bytes {
    ($(#[$attr:meta])* $name:ident, $len:expr) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const fn byte_size() -> usize {
                $len
            }

            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn to_vec(&self) -> Vec<u8> {
                self.0.to_vec()
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(hex_str: &str) -> Result<Self, SizedBytesError> {
                let bytes = hex::decode(hex_str.trim_start_matches("0x")).map_err(|_| SizedBytesError::InvalidHex)?;
                Self::try_from(bytes.as_slice())
            }

            pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
                let mut buf = [0u8; $len];
                rng.fill_bytes(&mut buf);
                Self(buf)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::zero()
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl From<$name> for [u8; $len] {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = SizedBytesError;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                if bytes.len() != $len {
                    return Err(SizedBytesError::InvalidSize {
                        expected: $len,
                        actual: bytes.len(),
                    });
                }
                let mut buf = [0u8; $len];
                buf.copy_from_slice(bytes);
                Ok(Self(buf))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = SizedBytesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_hex())
                } else {
                    serializer.serialize_bytes(&self.0)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let hex_str = <String as Deserialize>::deserialize(deserializer)?;
                    Self::from_hex(&hex_str).map_err(serde::de::Error::custom)
                } else {
                    let bytes = <Vec<u8> as Deserialize>::deserialize(deserializer)?;
                    Self::try_from(bytes.as_slice()).map_err(serde::de::Error::custom)
                }
            }
        }
    };
}

sized_bytes!(
    /// A 32-byte digest identifying blocks, challenges and VDF outputs.
    FixedHash,
    BLOCK_HASH_LENGTH
);
sized_bytes!(
    /// A 20-byte execution-layer account address.
    ExecutionAddress,
    EXECUTION_ADDRESS_LENGTH
);
sized_bytes!(BlsPublicKey, BLS_PUBLIC_KEY_LENGTH);
sized_bytes!(BlsSignature, BLS_SIGNATURE_LENGTH);
sized_bytes!(
    /// Serialized classgroup element, the in/output format of the VDF chains.
    ClassgroupElement,
    CLASSGROUP_ELEMENT_LENGTH
);
sized_bytes!(Bloom, BLOOM_LENGTH);

pub type BlockHash = FixedHash;
pub type ExecutionBlockHash = FixedHash;
