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
    ops::Deref,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
};

use async_trait::async_trait;
use corpochain_common_types::{
    types::{BlsSignature, ClassgroupElement, ExecutionAddress, ExecutionBlockHash, FixedHash},
    Hashable,
};

use crate::{
    blockchain::{Blockchain, BlockchainConfig},
    blocks::{
        BlockRecord,
        ExecutionPayloadV2,
        Foliage,
        FoliageBlockData,
        FoliageTransactionBlock,
        FullBlock,
        RewardChainBlock,
        VdfInfo,
    },
    chain_storage::BlockStore,
    consensus::{
        block_to_block_record,
        calculate_deficit,
        get_next_sub_slot_iters_and_difficulty,
        pot_iterations::{calculate_ip_iters, calculate_iterations_quality, calculate_sp_iters},
        BlockCache,
        BlockchainInterface,
        ConsensusConstants,
    },
    execution::{ExecutionClientError, ExecutionEngine, ForkchoiceStateV1, PayloadAttributesV2, PayloadStatus},
    test_helpers::{make_execution_payload, make_proof_of_space, make_vdf_proof, test_constants},
};

/// Builds chains of blocks that satisfy the header validator and the record
/// conversion, block by block. The chain stays inside its first sub-slot, so
/// signage points advance with height and wrap before the overflow range.
#[derive(Clone)]
pub(crate) struct TestChain {
    constants: ConsensusConstants,
    cache: BlockCache,
    tip: Option<BlockRecord>,
    base_timestamp: u64,
    counter: u8,
}

impl TestChain {
    pub fn new(constants: ConsensusConstants) -> Self {
        Self::with_seed(constants, 0)
    }

    /// A builder whose blocks are distinct from those of any builder with a
    /// different seed, for constructing competing forks.
    pub fn with_seed(constants: ConsensusConstants, seed: u8) -> Self {
        Self {
            constants,
            cache: BlockCache::default(),
            tip: None,
            // A fixed past timestamp keeps the fixtures deterministic
            base_timestamp: 1_700_000_000,
            counter: seed,
        }
    }

    pub fn view(&self) -> &BlockCache {
        &self.cache
    }

    pub fn tip(&self) -> Option<&BlockRecord> {
        self.tip.as_ref()
    }

    /// Builds the next block on the current tip without adopting it.
    pub fn make_next_block(&mut self, transaction_block: bool) -> FullBlock {
        self.make_next_block_with(transaction_block, None)
    }

    /// As [`make_next_block`], with an explicit claimed weight (used to craft
    /// heavier and lighter forks).
    pub fn make_next_block_with(&mut self, transaction_block: bool, weight_override: Option<u128>) -> FullBlock {
        self.counter = self.counter.wrapping_add(1);
        let counter = self.counter;
        let constants = self.constants.clone();
        let prev = self.tip.clone();

        let height = prev.as_ref().map(|p| p.height + 1).unwrap_or(0);
        let (sub_slot_iters, difficulty) =
            get_next_sub_slot_iters_and_difficulty(&constants, false, prev.as_ref(), &self.cache);
        let challenge = constants.genesis_challenge;

        // Signage points advance with height, staying under the overflow
        // threshold so infusion points keep increasing within the slot.
        let non_overflow_sps = constants.num_sps_sub_slot - u32::from(constants.num_sp_intervals_extra);
        let sp_index = (height % non_overflow_sps) as u8;
        let sp_iters = calculate_sp_iters(&constants, sub_slot_iters, sp_index).unwrap();

        let (challenge_chain_sp_vdf, reward_chain_sp_vdf) = if sp_index == 0 {
            (None, None)
        } else {
            (
                Some(VdfInfo::new(challenge, sp_iters, element(1, height))),
                Some(VdfInfo::new(challenge, sp_iters, element(2, height))),
            )
        };
        let cc_sp_hash = challenge_chain_sp_vdf
            .as_ref()
            .map(|vdf_info| vdf_info.output_hash())
            .unwrap_or(challenge);

        let proof_of_space = make_proof_of_space(&constants, &challenge, &cc_sp_hash);
        let q_str = proof_of_space
            .verify_and_get_quality_string(&constants, &challenge, &cc_sp_hash)
            .expect("constructed proof of space verifies");
        let required_iters = calculate_iterations_quality(
            constants.difficulty_constant_factor,
            &q_str,
            proof_of_space.size,
            difficulty,
            &cc_sp_hash,
        );
        let ip_iters = calculate_ip_iters(&constants, sub_slot_iters, sp_index, required_iters).unwrap();

        let slot_start = prev
            .as_ref()
            .map(|p| p.ip_sub_slot_total_iters(&constants))
            .unwrap_or(0);
        let total_iters = slot_start + u128::from(ip_iters);
        let weight = weight_override
            .unwrap_or_else(|| prev.as_ref().map(|p| p.weight).unwrap_or(0) + u128::from(difficulty));

        let deficit = calculate_deficit(&constants, height, prev.as_ref(), false, 0);
        let icc_needed = deficit < constants.min_blocks_per_challenge_block.saturating_sub(1);

        let challenge_chain_ip_vdf = VdfInfo::new(challenge, ip_iters, element(3, height));
        let rc_ip_challenge = prev
            .as_ref()
            .map(|p| p.reward_infusion_new_challenge)
            .unwrap_or(constants.genesis_challenge);
        let reward_chain_ip_vdf = VdfInfo::new(rc_ip_challenge, ip_iters, element(4, height));
        let infused_challenge_chain_ip_vdf =
            icc_needed.then(|| VdfInfo::new(FixedHash::from([0xccu8; 32]), ip_iters, element(5, height)));

        let reward_chain_block = RewardChainBlock {
            weight,
            height,
            total_iters,
            signage_point_index: sp_index,
            pos_ss_cc_challenge_hash: challenge,
            proof_of_space,
            challenge_chain_sp_vdf: challenge_chain_sp_vdf.clone(),
            challenge_chain_sp_signature: BlsSignature::zero(),
            challenge_chain_ip_vdf: challenge_chain_ip_vdf.clone(),
            reward_chain_sp_vdf: reward_chain_sp_vdf.clone(),
            reward_chain_sp_signature: BlsSignature::zero(),
            reward_chain_ip_vdf: reward_chain_ip_vdf.clone(),
            infused_challenge_chain_ip_vdf: infused_challenge_chain_ip_vdf.clone(),
            is_transaction_block: transaction_block,
        };

        let input = ClassgroupElement::zero();
        let (foliage_transaction_block, execution_payload) = if transaction_block {
            let mut payload_hash = [0u8; 32];
            payload_hash[0] = counter;
            payload_hash[1] = 0xee;
            payload_hash[2..6].copy_from_slice(&height.to_be_bytes());
            let payload = make_execution_payload(u64::from(height), ExecutionBlockHash::from(payload_hash), vec![]);
            let ftb = FoliageTransactionBlock {
                prev_transaction_block_hash: self.previous_transaction_block_hash(),
                timestamp: self.base_timestamp + u64::from(height) * 600,
                execution_block_hash: payload.block_hash,
            };
            (Some(ftb), Some(payload))
        } else {
            (None, None)
        };

        let foliage = Foliage {
            prev_block_hash: prev
                .as_ref()
                .map(|p| p.header_hash)
                .unwrap_or(constants.genesis_challenge),
            reward_block_hash: reward_chain_block.hash(),
            foliage_block_data: FoliageBlockData {
                unfinished_reward_block_hash: reward_chain_block.get_unfinished().hash(),
                coinbase: ExecutionAddress::from([counter; 20]),
                extension_data: FixedHash::from([counter; 32]),
            },
            foliage_block_data_signature: BlsSignature::zero(),
            foliage_transaction_block_hash: foliage_transaction_block.as_ref().map(|ftb| ftb.hash()),
            foliage_transaction_block_signature: foliage_transaction_block.as_ref().map(|_| BlsSignature::zero()),
        };

        FullBlock {
            finished_sub_slots: Vec::new(),
            reward_chain_block,
            challenge_chain_sp_proof: challenge_chain_sp_vdf.as_ref().map(|v| make_vdf_proof(&input, v)),
            challenge_chain_ip_proof: make_vdf_proof(&input, &challenge_chain_ip_vdf),
            reward_chain_sp_proof: reward_chain_sp_vdf.as_ref().map(|v| make_vdf_proof(&input, v)),
            reward_chain_ip_proof: make_vdf_proof(&input, &reward_chain_ip_vdf),
            infused_challenge_chain_ip_proof: infused_challenge_chain_ip_vdf
                .as_ref()
                .map(|v| make_vdf_proof(&input, v)),
            foliage,
            foliage_transaction_block,
            execution_payload,
        }
    }

    /// Adopts a block into the builder's view, returning its record.
    pub fn accept(&mut self, block: FullBlock) -> BlockRecord {
        let record = block_to_block_record(&self.constants, &self.cache, 1, &block, None)
            .expect("constructed block converts to a record");
        self.cache.add_block_record(record.clone());
        self.tip = Some(record.clone());
        record
    }

    /// Recomputes the foliage commitments after a test mutated the trunk, so
    /// validation reaches the check under test instead of tripping on a hash
    /// mismatch.
    pub fn reseal(&self, block: &mut FullBlock) {
        if let Some(ftb) = &block.foliage_transaction_block {
            block.foliage.foliage_transaction_block_hash = Some(ftb.hash());
        }
        block.foliage.foliage_block_data.unfinished_reward_block_hash =
            block.reward_chain_block.get_unfinished().hash();
        block.foliage.reward_block_hash = block.reward_chain_block.hash();
    }

    fn previous_transaction_block_hash(&self) -> FixedHash {
        let mut curr = match &self.tip {
            None => return self.constants.genesis_challenge,
            Some(tip) => tip.clone(),
        };
        loop {
            if curr.is_transaction_block {
                return curr.header_hash;
            }
            if curr.height == 0 {
                return self.constants.genesis_challenge;
            }
            curr = match self.cache.try_block_record(&curr.prev_hash) {
                Some(record) => record,
                None => return self.constants.genesis_challenge,
            };
        }
    }
}

fn element(tag: u8, height: u32) -> ClassgroupElement {
    let mut bytes = [0u8; 100];
    bytes[0] = tag;
    bytes[1..5].copy_from_slice(&height.to_be_bytes());
    ClassgroupElement::from(bytes)
}

/// Scripted execution engine. Records calls and the last set of payload
/// attributes it was handed.
pub(crate) struct MockExecutionEngine {
    new_payload_status: Mutex<PayloadStatus>,
    forkchoice_status: Mutex<PayloadStatus>,
    new_payload_calls: AtomicUsize,
    forkchoice_calls: AtomicUsize,
    last_attributes: Mutex<Option<PayloadAttributesV2>>,
    last_state: Mutex<Option<ForkchoiceStateV1>>,
}

impl MockExecutionEngine {
    pub fn new() -> Self {
        Self {
            new_payload_status: Mutex::new(PayloadStatus::Valid),
            forkchoice_status: Mutex::new(PayloadStatus::Valid),
            new_payload_calls: AtomicUsize::new(0),
            forkchoice_calls: AtomicUsize::new(0),
            last_attributes: Mutex::new(None),
            last_state: Mutex::new(None),
        }
    }

    pub fn with_new_payload_status(status: PayloadStatus) -> Self {
        let engine = Self::new();
        *engine.new_payload_status.lock().unwrap() = status;
        engine
    }

    pub fn with_forkchoice_status(status: PayloadStatus) -> Self {
        let engine = Self::new();
        *engine.forkchoice_status.lock().unwrap() = status;
        engine
    }

    pub fn set_new_payload_status(&self, status: PayloadStatus) {
        *self.new_payload_status.lock().unwrap() = status;
    }

    pub fn set_forkchoice_status(&self, status: PayloadStatus) {
        *self.forkchoice_status.lock().unwrap() = status;
    }

    pub fn new_payload_calls(&self) -> usize {
        self.new_payload_calls.load(Ordering::SeqCst)
    }

    pub fn forkchoice_calls(&self) -> usize {
        self.forkchoice_calls.load(Ordering::SeqCst)
    }

    pub fn last_attributes(&self) -> Option<PayloadAttributesV2> {
        self.last_attributes.lock().unwrap().clone()
    }

    pub fn last_state(&self) -> Option<ForkchoiceStateV1> {
        self.last_state.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionEngine for MockExecutionEngine {
    async fn new_payload(&self, _payload: &ExecutionPayloadV2) -> Result<PayloadStatus, ExecutionClientError> {
        self.new_payload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.new_payload_status.lock().unwrap())
    }

    async fn forkchoice_update(
        &self,
        state: ForkchoiceStateV1,
        attributes: Option<PayloadAttributesV2>,
    ) -> Result<PayloadStatus, ExecutionClientError> {
        self.forkchoice_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_state.lock().unwrap() = Some(state);
        *self.last_attributes.lock().unwrap() = attributes;
        Ok(*self.forkchoice_status.lock().unwrap())
    }

    async fn latest_block_hash(&self) -> Result<Option<ExecutionBlockHash>, ExecutionClientError> {
        Ok(None)
    }
}

/// An on-disk block store in a temporary directory, removed on drop.
pub(crate) struct TempStore {
    _dir: tempfile::TempDir,
    store: BlockStore,
}

impl TempStore {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::create(dir.path().join("blockchain")).unwrap();
        Self { _dir: dir, store }
    }
}

impl Deref for TempStore {
    type Target = BlockStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

pub(crate) struct TestBlockchain {
    pub chain: Blockchain,
    pub engine: Arc<MockExecutionEngine>,
    pub builder: TestChain,
    _dir: tempfile::TempDir,
}

/// A blockchain over a temporary store, a mock engine and the test constants,
/// with an in-step block builder.
pub(crate) async fn create_test_blockchain() -> TestBlockchain {
    let dir = tempfile::tempdir().unwrap();
    let constants = test_constants();
    let store = BlockStore::create(dir.path().join("blockchain")).unwrap();
    let engine = Arc::new(MockExecutionEngine::new());
    let chain = Blockchain::create(store, constants.clone(), engine.clone(), dir.path(), BlockchainConfig {
        single_threaded: true,
        ..Default::default()
    })
    .await
    .unwrap();
    TestBlockchain {
        chain,
        engine,
        builder: TestChain::new(constants),
        _dir: dir,
    }
}
