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

use super::*;
use crate::{
    execution::PayloadStatus,
    test_helpers::create_test_blockchain,
    validation::PreValidationResult,
};

fn ok_result() -> PreValidationResult {
    PreValidationResult::ok(1)
}

mod receive_block {
    use super::*;

    #[tokio::test]
    async fn genesis_becomes_the_peak() {
        let mut t = create_test_blockchain().await;
        let genesis = t.builder.make_next_block(true);
        let (result, error, summary) = t.chain.receive_block(&genesis, &ok_result(), None).await.unwrap();
        assert_eq!(result, ReceiveBlockResult::NewPeak);
        assert_eq!(error, None);
        let summary = summary.unwrap();
        assert_eq!(summary.fork_height, 0);
        assert_eq!(summary.peak.height, 0);
        assert_eq!(t.chain.get_peak_height(), Some(0));
        assert_eq!(t.chain.height_to_hash(0), Some(genesis.header_hash()));
    }

    #[tokio::test]
    async fn genesis_forkchoice_carries_prefarm_and_reward() {
        let mut t = create_test_blockchain().await;
        let genesis = t.builder.make_next_block(true);
        t.chain.receive_block(&genesis, &ok_result(), None).await.unwrap();

        let state = t.engine.last_state().expect("forkchoice was driven");
        let payload_hash = genesis.execution_payload.as_ref().unwrap().block_hash;
        assert_eq!(state.head_block_hash, payload_hash);
        assert_eq!(state.safe_block_hash, payload_hash);
        assert_eq!(
            state.finalized_block_hash,
            t.chain.constants().genesis_execution_block_hash
        );

        let attributes = t.engine.last_attributes().expect("forkchoice carried attributes");
        assert_eq!(attributes.withdrawals.len(), 2);
        assert_eq!(attributes.withdrawals[0].index, 0);
        assert_eq!(
            attributes.withdrawals[0].address,
            t.chain.constants().prefarm_address
        );
        assert_eq!(
            attributes.withdrawals[0].amount,
            t.chain.constants().prefarm_amount * 1_000_000_000
        );
        assert_eq!(attributes.withdrawals[1].index, 1);
        assert_eq!(attributes.withdrawals[1].amount, 2_000_000_000);
    }

    #[tokio::test]
    async fn a_second_delivery_reports_already_have_block() {
        let mut t = create_test_blockchain().await;
        let genesis = t.builder.make_next_block(true);
        let (first, _, _) = t.chain.receive_block(&genesis, &ok_result(), None).await.unwrap();
        assert_eq!(first, ReceiveBlockResult::NewPeak);
        let peak_before = t.chain.get_peak().unwrap();

        let (second, error, summary) = t.chain.receive_block(&genesis, &ok_result(), None).await.unwrap();
        assert_eq!(second, ReceiveBlockResult::AlreadyHaveBlock);
        assert_eq!(error, None);
        assert!(summary.is_none());
        assert_eq!(t.chain.get_peak().unwrap(), peak_before);
    }

    #[tokio::test]
    async fn a_block_with_unknown_parent_is_disconnected() {
        let mut t = create_test_blockchain().await;
        let genesis = t.builder.make_next_block(true);
        t.chain.receive_block(&genesis, &ok_result(), None).await.unwrap();
        t.builder.accept(genesis);
        // Skip one block: build two ahead and deliver only the second
        let skipped = t.builder.make_next_block(false);
        t.builder.accept(skipped);
        let disconnected = t.builder.make_next_block(false);

        let (result, error, _) = t.chain.receive_block(&disconnected, &ok_result(), None).await.unwrap();
        assert_eq!(result, ReceiveBlockResult::DisconnectedBlock);
        assert_eq!(error, Some(ErrorCode::InvalidPrevBlockHash));
    }

    #[tokio::test]
    async fn a_pre_validation_failure_is_an_invalid_block() {
        let mut t = create_test_blockchain().await;
        let genesis = t.builder.make_next_block(true);
        let verdict = PreValidationResult::with_error(ErrorCode::InvalidPospace);
        let (result, error, _) = t.chain.receive_block(&genesis, &verdict, None).await.unwrap();
        assert_eq!(result, ReceiveBlockResult::InvalidBlock);
        assert_eq!(error, Some(ErrorCode::InvalidPospace));
        assert_eq!(t.chain.get_peak_height(), None);
    }

    #[tokio::test]
    async fn a_rejected_payload_leaves_no_state_behind() {
        let mut t = create_test_blockchain().await;
        t.engine.set_new_payload_status(PayloadStatus::Invalid);
        let genesis = t.builder.make_next_block(true);
        let (result, error, _) = t.chain.receive_block(&genesis, &ok_result(), None).await.unwrap();
        assert_eq!(result, ReceiveBlockResult::InvalidBlock);
        assert_eq!(error, Some(ErrorCode::PayloadInvalidated));
        assert_eq!(t.chain.get_peak_height(), None);
        assert!(!t.chain.contains_block(&genesis.header_hash()));
        assert!(t.chain.get_full_block(&genesis.header_hash()).unwrap().is_none());
    }

    #[tokio::test]
    async fn engine_syncing_respects_optimistic_import() {
        // optimistic_import on (the default): a syncing engine accepts
        let mut t = create_test_blockchain().await;
        t.engine.set_forkchoice_status(PayloadStatus::Syncing);
        let genesis = t.builder.make_next_block(true);
        let (result, _, _) = t.chain.receive_block(&genesis, &ok_result(), None).await.unwrap();
        assert_eq!(result, ReceiveBlockResult::NewPeak);
    }

    #[tokio::test]
    async fn extending_the_peak_forks_at_the_old_peak() {
        let mut t = create_test_blockchain().await;
        for height in 0..4u32 {
            let block = t.builder.make_next_block(height % 2 == 0);
            let (result, _, summary) = t.chain.receive_block(&block, &ok_result(), None).await.unwrap();
            assert_eq!(result, ReceiveBlockResult::NewPeak);
            let summary = summary.unwrap();
            assert_eq!(summary.fork_height, height.saturating_sub(1));
            t.builder.accept(block);
        }
        assert_eq!(t.chain.get_peak_height(), Some(3));
        assert_eq!(t.builder.tip().unwrap().height, 3);
    }
}

mod reorgs {
    use super::*;

    #[tokio::test]
    async fn a_lighter_sibling_is_an_orphan() {
        let mut t = create_test_blockchain().await;
        let mut blocks = Vec::new();
        for _ in 0..6u32 {
            let block = t.builder.make_next_block(false);
            t.chain.receive_block(&block, &ok_result(), None).await.unwrap();
            t.builder.accept(block.clone());
            blocks.push(block);
        }
        let peak_before = t.chain.get_peak().unwrap();

        // A sibling of the peak: same parent, less claimed weight
        let mut replay = crate::test_helpers::TestChain::with_seed(t.chain.constants().clone(), 100);
        for block in &blocks[..5] {
            replay.accept(block.clone());
        }
        let light = replay.make_next_block_with(false, Some(peak_before.weight - 1));
        assert_eq!(light.height(), 5);

        let (result, error, summary) = t.chain.receive_block(&light, &ok_result(), None).await.unwrap();
        assert_eq!(result, ReceiveBlockResult::AddedAsOrphan);
        assert_eq!(error, None);
        assert!(summary.is_none());
        assert_eq!(t.chain.get_peak().unwrap(), peak_before);
        // The orphan is persisted, just not canonical
        assert!(t.chain.get_full_block(&light.header_hash()).unwrap().is_some());
    }

    #[tokio::test]
    async fn a_heavier_fork_reorgs_the_chain() {
        let mut t = create_test_blockchain().await;
        let mut chain_a_blocks = Vec::new();
        for _ in 0..=10u32 {
            let block = t.builder.make_next_block(false);
            t.chain.receive_block(&block, &ok_result(), None).await.unwrap();
            t.builder.accept(block.clone());
            chain_a_blocks.push(block);
        }
        assert_eq!(t.chain.get_peak_height(), Some(10));

        // Chain B diverges after height 5 and claims more weight
        let mut branch = crate::test_helpers::TestChain::with_seed(t.chain.constants().clone(), 100);
        for block in &chain_a_blocks[..=5] {
            branch.accept(block.clone());
        }
        let mut expected_hashes = Vec::new();
        let mut summaries = Vec::new();
        for height in 6..=11u32 {
            let weight = t.chain.get_peak().unwrap().weight + u128::from(height);
            let block = branch.make_next_block_with(false, Some(weight));
            expected_hashes.push((height, block.header_hash()));
            let (result, error, summary) = t.chain.receive_block(&block, &ok_result(), None).await.unwrap();
            assert_eq!(error, None);
            assert_eq!(result, ReceiveBlockResult::NewPeak);
            branch.accept(block);
            summaries.extend(summary);
        }

        // The first heavier block reorged back to the common ancestor; the
        // rest were plain appends.
        assert_eq!(summaries[0].fork_height, 5);
        assert_eq!(summaries.last().unwrap().peak.height, 11);
        assert_eq!(t.chain.get_peak_height(), Some(11));
        for (height, hash) in expected_hashes {
            assert_eq!(t.chain.height_to_hash(height), Some(hash), "height {}", height);
        }
        // Heights up to the fork still belong to chain A
        for (height, block) in chain_a_blocks[..=5].iter().enumerate() {
            assert_eq!(t.chain.height_to_hash(height as u32), Some(block.header_hash()));
        }
    }

    #[tokio::test]
    async fn the_first_heavier_fork_block_reports_the_fork_height() {
        let mut t = create_test_blockchain().await;
        let mut chain_a_blocks = Vec::new();
        for _ in 0..=6u32 {
            let block = t.builder.make_next_block(false);
            t.chain.receive_block(&block, &ok_result(), None).await.unwrap();
            t.builder.accept(block.clone());
            chain_a_blocks.push(block);
        }

        let mut branch = crate::test_helpers::TestChain::with_seed(t.chain.constants().clone(), 100);
        for block in &chain_a_blocks[..=3] {
            branch.accept(block.clone());
        }
        // Build the competing chain as orphans first, then tip it over the
        // peak weight with the final block.
        let mut summaries = Vec::new();
        for height in 4..=7u32 {
            let heavier = height == 7;
            let weight = if heavier {
                t.chain.get_peak().unwrap().weight + 100
            } else {
                u128::from(height)
            };
            let block = branch.make_next_block_with(false, Some(weight));
            let (result, _, summary) = t.chain.receive_block(&block, &ok_result(), None).await.unwrap();
            branch.accept(block);
            if heavier {
                assert_eq!(result, ReceiveBlockResult::NewPeak);
            } else {
                assert_eq!(result, ReceiveBlockResult::AddedAsOrphan);
            }
            summaries.extend(summary);
        }
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].fork_height, 3);
        assert_eq!(t.chain.get_peak_height(), Some(7));
    }

    #[tokio::test]
    async fn a_full_reorg_from_genesis_replaces_every_height() {
        let mut t = create_test_blockchain().await;
        let mut chain_a_blocks = Vec::new();
        for _ in 0..4u32 {
            let block = t.builder.make_next_block(false);
            t.chain.receive_block(&block, &ok_result(), None).await.unwrap();
            t.builder.accept(block.clone());
            chain_a_blocks.push(block);
        }

        // An unrelated chain from genesis with more total weight
        let mut branch = crate::test_helpers::TestChain::with_seed(t.chain.constants().clone(), 100);
        let mut branch_hashes = Vec::new();
        for height in 0..4u32 {
            let weight = if height == 3 {
                t.chain.get_peak().unwrap().weight + 50
            } else {
                u128::from(height + 1)
            };
            let block = branch.make_next_block_with(false, Some(weight));
            branch_hashes.push(block.header_hash());
            let (result, error, summary) = t.chain.receive_block(&block, &ok_result(), None).await.unwrap();
            assert_eq!(error, None);
            branch.accept(block);
            if height == 3 {
                assert_eq!(result, ReceiveBlockResult::NewPeak);
                // No common ancestor: the summary clamps the fork to zero
                assert_eq!(summary.unwrap().fork_height, 0);
            }
        }
        for (height, hash) in branch_hashes.iter().enumerate() {
            assert_eq!(t.chain.height_to_hash(height as u32), Some(*hash));
        }
    }
}

mod cache_gc {
    use super::*;

    #[tokio::test]
    async fn retains_the_top_window_after_cleaning() {
        let mut t = create_test_blockchain().await;
        let cache_size = t.chain.constants().blocks_cache_size;
        let total = cache_size + 8;
        for _ in 0..total {
            let block = t.builder.make_next_block(false);
            t.chain.receive_block(&block, &ok_result(), None).await.unwrap();
            t.builder.accept(block);
        }
        let peak = t.chain.get_peak_height().unwrap();
        assert_eq!(peak, total - 1);

        t.chain.clean_block_records();

        let cached = t.chain.cached_heights();
        let expected_lowest = peak - cache_size;
        assert_eq!(cached.len() as u32, cache_size + 1);
        assert_eq!(*cached.first().unwrap(), expected_lowest);
        assert_eq!(*cached.last().unwrap(), peak);
        // Evicted records are still durable
        assert!(t
            .chain
            .get_block_record_from_db(&t.chain.height_to_hash(0).unwrap())
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn warmup_reloads_evicted_records() {
        let mut t = create_test_blockchain().await;
        let cache_size = t.chain.constants().blocks_cache_size;
        for _ in 0..cache_size + 8 {
            let block = t.builder.make_next_block(false);
            t.chain.receive_block(&block, &ok_result(), None).await.unwrap();
            t.builder.accept(block);
        }
        t.chain.clean_block_records();
        let hash_at_zero = t.chain.height_to_hash(0).unwrap();
        assert!(!t.chain.contains_block(&hash_at_zero));

        t.chain.warmup(4).unwrap();
        assert!(t.chain.contains_block(&hash_at_zero));
    }
}

mod unfinished_blocks {
    use super::*;

    #[tokio::test]
    async fn a_valid_unfinished_block_passes() {
        let mut t = create_test_blockchain().await;
        let genesis = t.builder.make_next_block(true);
        t.chain.receive_block(&genesis, &ok_result(), None).await.unwrap();
        t.builder.accept(genesis);

        let block = t.builder.make_next_block(true);
        let unfinished = crate::blocks::UnfinishedBlock {
            finished_sub_slots: block.finished_sub_slots.clone(),
            reward_chain_block: block.reward_chain_block.get_unfinished(),
            challenge_chain_sp_proof: block.challenge_chain_sp_proof.clone(),
            reward_chain_sp_proof: block.reward_chain_sp_proof.clone(),
            foliage: block.foliage.clone(),
            foliage_transaction_block: block.foliage_transaction_block.clone(),
            execution_payload: block.execution_payload.clone(),
        };
        let result = t.chain.validate_unfinished_block(&unfinished, true).await;
        assert_eq!(result.error, None);
        assert!(result.required_iters.is_some());
        // Unfinished validation never drives fork choice
        assert_eq!(t.engine.forkchoice_calls(), 1); // only the genesis import
    }

    #[tokio::test]
    async fn a_syncing_engine_rejects_an_unfinished_payload() {
        let mut t = create_test_blockchain().await;
        let genesis = t.builder.make_next_block(true);
        t.chain.receive_block(&genesis, &ok_result(), None).await.unwrap();
        t.builder.accept(genesis);
        t.engine.set_new_payload_status(PayloadStatus::Syncing);

        let block = t.builder.make_next_block(true);
        let unfinished = crate::blocks::UnfinishedBlock {
            finished_sub_slots: block.finished_sub_slots.clone(),
            reward_chain_block: block.reward_chain_block.get_unfinished(),
            challenge_chain_sp_proof: block.challenge_chain_sp_proof.clone(),
            reward_chain_sp_proof: block.reward_chain_sp_proof.clone(),
            foliage: block.foliage.clone(),
            foliage_transaction_block: block.foliage_transaction_block.clone(),
            execution_payload: block.execution_payload.clone(),
        };
        let result = t.chain.validate_unfinished_block(&unfinished, true).await;
        assert_eq!(result.error, Some(ErrorCode::PayloadNotValidated));
    }
}

mod recent_reward_challenges {
    use super::*;

    #[tokio::test]
    async fn walks_back_from_the_peak_in_order() {
        let mut t = create_test_blockchain().await;
        let mut records = Vec::new();
        for _ in 0..5u32 {
            let block = t.builder.make_next_block(false);
            t.chain.receive_block(&block, &ok_result(), None).await.unwrap();
            records.push(t.builder.accept(block));
        }
        let recent = t.chain.get_recent_reward_challenges();
        // The peak itself is excluded; the rest arrive oldest first
        assert_eq!(recent.len(), 4);
        for (i, record) in records[..4].iter().enumerate() {
            assert_eq!(recent[i].0, record.reward_infusion_new_challenge);
            assert_eq!(recent[i].1, record.total_iters);
        }
    }

    #[tokio::test]
    async fn empty_chain_has_no_challenges() {
        let t = create_test_blockchain().await;
        assert!(t.chain.get_recent_reward_challenges().is_empty());
    }
}

mod compact_proofs {
    use super::*;
    use crate::blocks::VdfInfo;
    use corpochain_common_types::types::ClassgroupElement;

    #[tokio::test]
    async fn seen_proofs_are_deduplicated() {
        let t = create_test_blockchain().await;
        let vdf_info = VdfInfo::new(FixedHash::from([1u8; 32]), 100, ClassgroupElement::zero());
        assert!(!t.chain.seen_compact_proofs(&vdf_info, 5));
        assert!(t.chain.seen_compact_proofs(&vdf_info, 5));
        // A different height is a different proof
        assert!(!t.chain.seen_compact_proofs(&vdf_info, 6));
    }
}

mod read_surface {
    use super::*;

    #[tokio::test]
    async fn header_blocks_in_range_follow_the_canonical_chain() {
        let mut t = create_test_blockchain().await;
        let mut blocks = Vec::new();
        for i in 0..4u32 {
            let block = t.builder.make_next_block(i % 2 == 0);
            t.chain.receive_block(&block, &ok_result(), None).await.unwrap();
            t.builder.accept(block.clone());
            blocks.push(block);
        }
        let headers = t.chain.get_header_blocks_in_range(1, 2).unwrap();
        assert_eq!(headers.len(), 2);
        assert!(headers.contains_key(&blocks[1].header_hash()));
        assert!(headers.contains_key(&blocks[2].header_hash()));

        let header = t
            .chain
            .get_header_block_by_height(1, &blocks[1].header_hash())
            .unwrap()
            .unwrap();
        assert_eq!(header.header_hash(), blocks[1].header_hash());
        assert!(t
            .chain
            .get_header_block_by_height(1, &blocks[2].header_hash())
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn block_records_at_resolves_canonical_heights() {
        let mut t = create_test_blockchain().await;
        for _ in 0..4u32 {
            let block = t.builder.make_next_block(false);
            t.chain.receive_block(&block, &ok_result(), None).await.unwrap();
            t.builder.accept(block);
        }
        let records = t.chain.get_block_records_at(&[0, 2, 3]).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].height, 0);
        assert_eq!(records[1].height, 2);
        assert_eq!(records[2].height, 3);
    }
}
