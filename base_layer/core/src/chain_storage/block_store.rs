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

//! Durable block storage over LMDB. All mutation flows through
//! [`BlockStore::write`], which applies a [`DbTransaction`] inside a single
//! LMDB write transaction: commit on success, abort on any error. Readers use
//! their own snapshots and may proceed concurrently.

use std::{
    collections::{HashMap, VecDeque},
    convert::TryFrom,
    path::Path,
    sync::{Arc, Mutex},
};

use borsh::{BorshDeserialize, BorshSerialize};
use corpochain_common_types::types::FixedHash;
use lmdb_zero as lmdb;
use lmdb_zero::{db, open, put, Database, DatabaseOptions, EnvBuilder, Environment, ReadTransaction, WriteTransaction};
use log::*;

use crate::{
    blocks::{BlockRecord, FullBlock, SubEpochChallengeSegment, SubEpochSegments},
    chain_storage::{ChainStorageError, DbTransaction, WriteOperation},
};

const LOG_TARGET: &str = "c::cs::block_store";

const LMDB_DB_BLOCKS: &str = "blocks";
const LMDB_DB_BLOCK_HEIGHTS: &str = "block_heights";
const LMDB_DB_SUB_EPOCH_SEGMENTS: &str = "sub_epoch_segments";
const LMDB_DB_METADATA: &str = "metadata";

const METADATA_KEY_PEAK: &[u8] = b"peak";

const LMDB_MAP_SIZE: usize = 16 * 1024 * 1024 * 1024;
const BLOCK_CACHE_CAPACITY: usize = 300;

const EMPTY_VALUE: [u8; 0] = [];

#[derive(Debug, BorshSerialize, BorshDeserialize)]
struct BlockRow {
    height: u32,
    in_main_chain: bool,
    record: BlockRecord,
    block: FullBlock,
}

/// Bounded memoization of recently written or read full blocks, keyed by
/// header hash. Insertion order eviction.
#[derive(Default)]
struct FullBlockCache {
    map: HashMap<FixedHash, Arc<FullBlock>>,
    order: VecDeque<FixedHash>,
}

impl FullBlockCache {
    fn insert(&mut self, hash: FixedHash, block: Arc<FullBlock>) {
        if self.map.insert(hash, block).is_none() {
            self.order.push_back(hash);
        }
        while self.order.len() > BLOCK_CACHE_CAPACITY {
            if let Some(evicted) = self.order.pop_front() {
                self.map.remove(&evicted);
            }
        }
    }

    fn get(&self, hash: &FixedHash) -> Option<Arc<FullBlock>> {
        self.map.get(hash).cloned()
    }

    fn remove(&mut self, hash: &FixedHash) {
        if self.map.remove(hash).is_some() {
            self.order.retain(|h| h != hash);
        }
    }
}

/// Transactional persistence of full blocks, block records, chain membership,
/// the peak pointer and sub-epoch challenge segments.
pub struct BlockStore {
    env: Arc<Environment>,
    db_blocks: Database<'static>,
    db_heights: Database<'static>,
    db_segments: Database<'static>,
    db_metadata: Database<'static>,
    block_cache: Mutex<FullBlockCache>,
}

impl BlockStore {
    /// Opens (or creates) the store under `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, ChainStorageError> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let path_str = path
            .to_str()
            .ok_or_else(|| ChainStorageError::InvalidOperation(format!("Invalid database path: {:?}", path)))?;

        let mut builder = EnvBuilder::new()?;
        builder.set_maxdbs(8)?;
        builder.set_mapsize(LMDB_MAP_SIZE)?;
        let env = Arc::new(unsafe { builder.open(path_str, open::Flags::empty(), 0o600) }?);
        debug!(target: LOG_TARGET, "Opened block store at {}", path_str);

        let options = DatabaseOptions::new(db::CREATE);
        Ok(Self {
            db_blocks: Database::open(env.clone(), Some(LMDB_DB_BLOCKS), &options)?,
            db_heights: Database::open(env.clone(), Some(LMDB_DB_BLOCK_HEIGHTS), &options)?,
            db_segments: Database::open(env.clone(), Some(LMDB_DB_SUB_EPOCH_SEGMENTS), &options)?,
            db_metadata: Database::open(env.clone(), Some(LMDB_DB_METADATA), &options)?,
            env,
            block_cache: Mutex::new(FullBlockCache::default()),
        })
    }

    /// Applies every operation in `txn` atomically. On error nothing is
    /// committed and the error is returned to the caller.
    pub fn write(&self, txn: DbTransaction) -> Result<(), ChainStorageError> {
        let mut inserted: Vec<(FixedHash, Arc<FullBlock>)> = Vec::new();
        let write_txn = WriteTransaction::new(&*self.env)?;
        {
            let mut access = write_txn.access();
            for op in txn.operations() {
                trace!(target: LOG_TARGET, "Applying operation: {}", op);
                match op {
                    WriteOperation::InsertBlock {
                        header_hash,
                        block,
                        record,
                    } => {
                        let row = BlockRow {
                            height: record.height,
                            in_main_chain: false,
                            record: record.clone(),
                            block: (**block).clone(),
                        };
                        let bytes = encode_row(&row)?;
                        access.put(&self.db_blocks, header_hash.as_bytes(), &bytes[..], put::Flags::empty())?;
                        access.put(
                            &self.db_heights,
                            &height_index_key(record.height, header_hash)[..],
                            &EMPTY_VALUE[..],
                            put::Flags::empty(),
                        )?;
                        inserted.push((*header_hash, block.clone()));
                    },
                    WriteOperation::SetInChain { header_hashes } => {
                        for header_hash in header_hashes {
                            let mut row = self.row_for_update(&access, header_hash)?;
                            row.in_main_chain = true;
                            let bytes = encode_row(&row)?;
                            access.put(&self.db_blocks, header_hash.as_bytes(), &bytes[..], put::Flags::empty())?;
                        }
                    },
                    WriteOperation::SetPeak { header_hash } => {
                        access.put(&self.db_metadata, METADATA_KEY_PEAK, header_hash.as_bytes(), put::Flags::empty())?;
                    },
                    WriteOperation::RollbackChain { height } => {
                        let in_chain_above = {
                            let cursor_txn = ReadTransaction::new(&*self.env)?;
                            self.hashes_above_height(&cursor_txn, *height)?
                        };
                        for header_hash in in_chain_above {
                            let mut row = self.row_for_update(&access, &header_hash)?;
                            if row.in_main_chain {
                                row.in_main_chain = false;
                                let bytes = encode_row(&row)?;
                                access.put(&self.db_blocks, header_hash.as_bytes(), &bytes[..], put::Flags::empty())?;
                            }
                        }
                    },
                    WriteOperation::InsertSubEpochSegments { ses_hash, segments } => {
                        let bundle = SubEpochSegments {
                            challenge_segments: segments.clone(),
                        };
                        let bytes = borsh::to_vec(&bundle)
                            .map_err(|e| ChainStorageError::CorruptedData(e.to_string()))?;
                        access.put(&self.db_segments, ses_hash.as_bytes(), &bytes[..], put::Flags::empty())?;
                    },
                }
            }
        }
        write_txn.commit()?;

        let mut cache = acquire_cache(&self.block_cache);
        for (hash, block) in inserted {
            cache.insert(hash, block);
        }
        Ok(())
    }

    /// Evicts a tentatively inserted block from the memoization layer after a
    /// failed transaction.
    pub fn rollback_cache_block(&self, header_hash: &FixedHash) {
        acquire_cache(&self.block_cache).remove(header_hash);
    }

    pub fn get_full_block(&self, header_hash: &FixedHash) -> Result<Option<FullBlock>, ChainStorageError> {
        if let Some(block) = acquire_cache(&self.block_cache).get(header_hash) {
            return Ok(Some((*block).clone()));
        }
        match self.fetch_row(header_hash)? {
            Some(row) => {
                let block = Arc::new(row.block);
                acquire_cache(&self.block_cache).insert(*header_hash, block.clone());
                Ok(Some((*block).clone()))
            },
            None => Ok(None),
        }
    }

    pub fn get_block_record(&self, header_hash: &FixedHash) -> Result<Option<BlockRecord>, ChainStorageError> {
        Ok(self.fetch_row(header_hash)?.map(|row| row.record))
    }

    pub fn get_block_records_by_hash(
        &self,
        header_hashes: &[FixedHash],
    ) -> Result<Vec<BlockRecord>, ChainStorageError> {
        let mut records = Vec::with_capacity(header_hashes.len());
        for header_hash in header_hashes {
            let record =
                self.get_block_record(header_hash)?
                    .ok_or_else(|| ChainStorageError::ValueNotFound {
                        entity: "BlockRecord",
                        field: "header_hash",
                        value: header_hash.to_hex(),
                    })?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn get_blocks_by_hash(&self, header_hashes: &[FixedHash]) -> Result<Vec<FullBlock>, ChainStorageError> {
        let mut blocks = Vec::with_capacity(header_hashes.len());
        for header_hash in header_hashes {
            let block = self
                .get_full_block(header_hash)?
                .ok_or_else(|| ChainStorageError::ValueNotFound {
                    entity: "FullBlock",
                    field: "header_hash",
                    value: header_hash.to_hex(),
                })?;
            blocks.push(block);
        }
        Ok(blocks)
    }

    /// All block records (canonical and orphaned) with `lo <= height <= hi`.
    pub fn get_block_records_in_range(
        &self,
        lo: u32,
        hi: u32,
    ) -> Result<HashMap<FixedHash, BlockRecord>, ChainStorageError> {
        let txn = ReadTransaction::new(&*self.env)?;
        let hashes = self.hashes_in_height_range(&txn, lo, hi)?;
        drop(txn);
        let mut records = HashMap::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(row) = self.fetch_row(&hash)? {
                records.insert(hash, row.record);
            }
        }
        Ok(records)
    }

    /// The `n` records below the peak (inclusive), and the peak hash itself.
    pub fn get_block_records_close_to_peak(
        &self,
        n: u32,
    ) -> Result<(HashMap<FixedHash, BlockRecord>, Option<FixedHash>), ChainStorageError> {
        let peak_hash = match self.get_peak()? {
            None => return Ok((HashMap::new(), None)),
            Some(hash) => hash,
        };
        let peak_row = self
            .fetch_row(&peak_hash)?
            .ok_or_else(|| ChainStorageError::ValueNotFound {
                entity: "BlockRow",
                field: "header_hash",
                value: peak_hash.to_hex(),
            })?;
        let lo = peak_row.height.saturating_sub(n);
        let records = self.get_block_records_in_range(lo, peak_row.height)?;
        Ok((records, Some(peak_hash)))
    }

    pub fn get_peak(&self) -> Result<Option<FixedHash>, ChainStorageError> {
        let txn = ReadTransaction::new(&*self.env)?;
        let access = txn.access();
        match access.get::<[u8], [u8]>(&self.db_metadata, METADATA_KEY_PEAK) {
            Ok(bytes) => Ok(Some(FixedHash::try_from(bytes).map_err(|_| {
                ChainStorageError::CorruptedData("peak pointer is not 32 bytes".to_string())
            })?)),
            Err(lmdb::Error::Code(code)) if code == lmdb::error::NOTFOUND => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_in_main_chain(&self, header_hash: &FixedHash) -> Result<bool, ChainStorageError> {
        Ok(self.fetch_row(header_hash)?.map(|row| row.in_main_chain).unwrap_or(false))
    }

    pub fn persist_sub_epoch_challenge_segments(
        &self,
        ses_hash: FixedHash,
        segments: Vec<SubEpochChallengeSegment>,
    ) -> Result<(), ChainStorageError> {
        let mut txn = DbTransaction::new();
        txn.insert_sub_epoch_segments(ses_hash, segments);
        self.write(txn)
    }

    pub fn get_sub_epoch_challenge_segments(
        &self,
        ses_hash: &FixedHash,
    ) -> Result<Option<Vec<SubEpochChallengeSegment>>, ChainStorageError> {
        let txn = ReadTransaction::new(&*self.env)?;
        let access = txn.access();
        match access.get::<[u8], [u8]>(&self.db_segments, ses_hash.as_bytes()) {
            Ok(bytes) => {
                let segments = SubEpochSegments::try_from_slice(bytes)
                    .map_err(|e| ChainStorageError::CorruptedData(e.to_string()))?;
                Ok(Some(segments.challenge_segments))
            },
            Err(lmdb::Error::Code(code)) if code == lmdb::error::NOTFOUND => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn fetch_row(&self, header_hash: &FixedHash) -> Result<Option<BlockRow>, ChainStorageError> {
        let txn = ReadTransaction::new(&*self.env)?;
        let access = txn.access();
        match access.get::<[u8], [u8]>(&self.db_blocks, header_hash.as_bytes()) {
            Ok(bytes) => Ok(Some(decode_row(bytes)?)),
            Err(lmdb::Error::Code(code)) if code == lmdb::error::NOTFOUND => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn row_for_update(
        &self,
        access: &lmdb::WriteAccessor<'_>,
        header_hash: &FixedHash,
    ) -> Result<BlockRow, ChainStorageError> {
        match access.get::<[u8], [u8]>(&self.db_blocks, header_hash.as_bytes()) {
            Ok(bytes) => decode_row(bytes),
            Err(lmdb::Error::Code(code)) if code == lmdb::error::NOTFOUND => Err(ChainStorageError::ValueNotFound {
                entity: "BlockRow",
                field: "header_hash",
                value: header_hash.to_hex(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn hashes_in_height_range(
        &self,
        txn: &ReadTransaction<'_>,
        lo: u32,
        hi: u32,
    ) -> Result<Vec<FixedHash>, ChainStorageError> {
        let access = txn.access();
        let mut cursor = txn.cursor(&self.db_heights)?;
        let mut hashes = Vec::new();
        let start_key = height_index_key(lo, &FixedHash::zero());
        let mut item = cursor.seek_range_k::<[u8], [u8]>(&access, &start_key[..]);
        loop {
            let key = match item {
                Ok((key, _)) => key,
                Err(lmdb::Error::Code(code)) if code == lmdb::error::NOTFOUND => break,
                Err(e) => return Err(e.into()),
            };
            let (height, hash) = split_height_index_key(key)?;
            if height > hi {
                break;
            }
            hashes.push(hash);
            item = cursor.next::<[u8], [u8]>(&access);
        }
        Ok(hashes)
    }

    fn hashes_above_height(
        &self,
        txn: &ReadTransaction<'_>,
        height: i64,
    ) -> Result<Vec<FixedHash>, ChainStorageError> {
        if height >= i64::from(u32::MAX) {
            return Ok(Vec::new());
        }
        let lo = if height < 0 { 0 } else { height as u32 + 1 };
        self.hashes_in_height_range(txn, lo, u32::MAX)
    }
}

fn acquire_cache(cache: &Mutex<FullBlockCache>) -> std::sync::MutexGuard<'_, FullBlockCache> {
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn encode_row(row: &BlockRow) -> Result<Vec<u8>, ChainStorageError> {
    borsh::to_vec(row).map_err(|e| ChainStorageError::CorruptedData(e.to_string()))
}

fn decode_row(bytes: &[u8]) -> Result<BlockRow, ChainStorageError> {
    BlockRow::try_from_slice(bytes).map_err(|e| ChainStorageError::CorruptedData(e.to_string()))
}

fn height_index_key(height: u32, header_hash: &FixedHash) -> [u8; 36] {
    let mut key = [0u8; 36];
    key[..4].copy_from_slice(&height.to_be_bytes());
    key[4..].copy_from_slice(header_hash.as_bytes());
    key
}

fn split_height_index_key(key: &[u8]) -> Result<(u32, FixedHash), ChainStorageError> {
    if key.len() != 36 {
        return Err(ChainStorageError::CorruptedData(format!(
            "height index key has length {}",
            key.len()
        )));
    }
    let mut height_bytes = [0u8; 4];
    height_bytes.copy_from_slice(&key[..4]);
    let hash = FixedHash::try_from(&key[4..])
        .map_err(|_| ChainStorageError::CorruptedData("height index hash is not 32 bytes".to_string()))?;
    Ok((u32::from_be_bytes(height_bytes), hash))
}
