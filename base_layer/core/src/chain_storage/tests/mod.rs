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

use std::sync::Arc;

use corpochain_common_types::types::FixedHash;

use crate::{
    blocks::SubEpochChallengeSegment,
    chain_storage::{ChainStorageError, DbTransaction},
    consensus::BlockchainInterface,
    test_helpers::{test_constants, TempStore, TestChain},
};

fn chain_of(len: usize) -> (TestChain, Vec<crate::blocks::FullBlock>) {
    let mut chain = TestChain::new(test_constants());
    let mut blocks = Vec::with_capacity(len);
    for i in 0..len {
        let block = chain.make_next_block(i % 2 == 0);
        chain.accept(block.clone());
        blocks.push(block);
    }
    (chain, blocks)
}

fn insert_chain(store: &TempStore, chain: &TestChain, blocks: &[crate::blocks::FullBlock]) {
    let mut txn = DbTransaction::new();
    let mut hashes = Vec::new();
    for block in blocks {
        let hash = block.header_hash();
        let record = chain.view().try_block_record(&hash).unwrap();
        txn.insert_block(hash, Arc::new(block.clone()), record);
        hashes.push(hash);
    }
    txn.set_in_chain(hashes.clone());
    txn.set_peak(*hashes.last().unwrap());
    store.write(txn).unwrap();
}

mod add_full_block {
    use super::*;

    #[test]
    fn round_trips_blocks_and_records() {
        let store = TempStore::new();
        let (chain, blocks) = chain_of(3);
        insert_chain(&store, &chain, &blocks);

        for block in &blocks {
            let hash = block.header_hash();
            let fetched = store.get_full_block(&hash).unwrap().unwrap();
            assert_eq!(&fetched, block);
            let record = store.get_block_record(&hash).unwrap().unwrap();
            assert_eq!(record.header_hash, hash);
            assert_eq!(record.height, block.height());
        }
    }

    #[test]
    fn missing_blocks_read_as_none() {
        let store = TempStore::new();
        assert!(store.get_full_block(&FixedHash::from([9u8; 32])).unwrap().is_none());
        assert!(store.get_block_record(&FixedHash::from([9u8; 32])).unwrap().is_none());
    }

    #[test]
    fn survives_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blockchain");
        let (chain, blocks) = chain_of(2);
        {
            let store = crate::chain_storage::BlockStore::create(&path).unwrap();
            let mut txn = DbTransaction::new();
            for block in &blocks {
                let hash = block.header_hash();
                txn.insert_block(hash, Arc::new(block.clone()), chain.view().try_block_record(&hash).unwrap());
            }
            txn.set_peak(blocks[1].header_hash());
            store.write(txn).unwrap();
        }
        let store = crate::chain_storage::BlockStore::create(&path).unwrap();
        assert_eq!(store.get_peak().unwrap(), Some(blocks[1].header_hash()));
        assert!(store.get_full_block(&blocks[0].header_hash()).unwrap().is_some());
    }
}

mod get_block_records_in_range {
    use super::*;

    #[test]
    fn returns_the_inclusive_range() {
        let store = TempStore::new();
        let (chain, blocks) = chain_of(6);
        insert_chain(&store, &chain, &blocks);

        let records = store.get_block_records_in_range(2, 4).unwrap();
        assert_eq!(records.len(), 3);
        for block in &blocks[2..=4] {
            assert!(records.contains_key(&block.header_hash()));
        }
    }

    #[test]
    fn empty_range_is_empty() {
        let store = TempStore::new();
        let (chain, blocks) = chain_of(2);
        insert_chain(&store, &chain, &blocks);
        assert!(store.get_block_records_in_range(5, 9).unwrap().is_empty());
    }

    #[test]
    fn close_to_peak_returns_the_window_and_peak() {
        let store = TempStore::new();
        let (chain, blocks) = chain_of(6);
        insert_chain(&store, &chain, &blocks);

        let (records, peak) = store.get_block_records_close_to_peak(2).unwrap();
        assert_eq!(peak, Some(blocks[5].header_hash()));
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn close_to_peak_on_an_empty_store() {
        let store = TempStore::new();
        let (records, peak) = store.get_block_records_close_to_peak(10).unwrap();
        assert!(records.is_empty());
        assert!(peak.is_none());
    }
}

mod get_block_records_by_hash {
    use super::*;

    #[test]
    fn preserves_request_order() {
        let store = TempStore::new();
        let (chain, blocks) = chain_of(4);
        insert_chain(&store, &chain, &blocks);

        let hashes = vec![
            blocks[3].header_hash(),
            blocks[0].header_hash(),
            blocks[2].header_hash(),
        ];
        let records = store.get_block_records_by_hash(&hashes).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].height, 3);
        assert_eq!(records[1].height, 0);
        assert_eq!(records[2].height, 2);
    }

    #[test]
    fn unknown_hash_is_an_error() {
        let store = TempStore::new();
        let err = store
            .get_block_records_by_hash(&[FixedHash::from([1u8; 32])])
            .unwrap_err();
        assert!(matches!(err, ChainStorageError::ValueNotFound { .. }));
    }
}

mod set_in_chain {
    use super::*;

    #[test]
    fn marks_membership_and_rollback_clears_it() {
        let store = TempStore::new();
        let (chain, blocks) = chain_of(5);
        insert_chain(&store, &chain, &blocks);

        for block in &blocks {
            assert!(store.is_in_main_chain(&block.header_hash()).unwrap());
        }

        let mut txn = DbTransaction::new();
        txn.rollback_chain(2);
        store.write(txn).unwrap();

        for block in &blocks[..=2] {
            assert!(store.is_in_main_chain(&block.header_hash()).unwrap());
        }
        for block in &blocks[3..] {
            assert!(!store.is_in_main_chain(&block.header_hash()).unwrap());
        }
    }
}

mod write {
    use super::*;

    #[test]
    fn a_failing_transaction_commits_nothing() {
        let store = TempStore::new();
        let (chain, blocks) = chain_of(1);
        let hash = blocks[0].header_hash();
        let record = chain.view().try_block_record(&hash).unwrap();

        // SetInChain for an unknown row fails after the insert queued in the
        // same transaction; the insert must not survive.
        let mut txn = DbTransaction::new();
        txn.insert_block(hash, Arc::new(blocks[0].clone()), record);
        txn.set_in_chain(vec![FixedHash::from([0xfeu8; 32])]);
        let err = store.write(txn).unwrap_err();
        assert!(matches!(err, ChainStorageError::ValueNotFound { .. }));
        store.rollback_cache_block(&hash);

        assert!(store.get_full_block(&hash).unwrap().is_none());
        assert!(store.get_peak().unwrap().is_none());
    }

    #[test]
    fn set_peak_is_visible_to_readers() {
        let store = TempStore::new();
        let (chain, blocks) = chain_of(2);
        insert_chain(&store, &chain, &blocks);
        assert_eq!(store.get_peak().unwrap(), Some(blocks[1].header_hash()));
    }
}

mod sub_epoch_segments {
    use super::*;

    #[test]
    fn persist_and_read_back() {
        let store = TempStore::new();
        let ses_hash = FixedHash::from([0x21u8; 32]);
        let segments = vec![
            SubEpochChallengeSegment {
                sub_epoch_n: 0,
                segment: vec![1, 2, 3],
            },
            SubEpochChallengeSegment {
                sub_epoch_n: 1,
                segment: vec![4, 5],
            },
        ];
        store
            .persist_sub_epoch_challenge_segments(ses_hash, segments.clone())
            .unwrap();
        let fetched = store.get_sub_epoch_challenge_segments(&ses_hash).unwrap().unwrap();
        assert_eq!(fetched, segments);
    }

    #[test]
    fn missing_segments_read_as_none() {
        let store = TempStore::new();
        assert!(store
            .get_sub_epoch_challenge_segments(&FixedHash::from([3u8; 32]))
            .unwrap()
            .is_none());
    }
}
