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

//! Canonical height → hash index with sub-epoch-summary annotations, kept hot
//! in memory and flushed to a compact pair of sidecar files. The on-disk copy
//! may lag the block store by up to a flush interval; a reload truncates back
//! to whatever the store confirms.

use std::{
    collections::BTreeMap,
    convert::TryFrom,
    fs,
    path::{Path, PathBuf},
};

use corpochain_common_types::types::{FixedHash, BLOCK_HASH_LENGTH};
use log::*;

use crate::{blocks::SubEpochSummary, chain_storage::ChainStorageError};

const LOG_TARGET: &str = "c::cs::height_map";

const HEIGHT_FILE: &str = "height_to_hash";
const SES_FILE: &str = "sub_epoch_summaries";

/// Dirty entries tolerated before `maybe_flush` writes to disk.
const FLUSH_THRESHOLD: usize = 256;

pub struct BlockHeightMap {
    dir: PathBuf,
    height_to_hash: Vec<FixedHash>,
    sub_epoch_summaries: BTreeMap<u32, SubEpochSummary>,
    dirty: usize,
}

impl BlockHeightMap {
    /// Loads the persisted map from `dir`, or starts empty when no files
    /// exist yet.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, ChainStorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut height_to_hash = Vec::new();
        let height_path = dir.join(HEIGHT_FILE);
        if height_path.exists() {
            let bytes = fs::read(&height_path)?;
            if bytes.len() % BLOCK_HASH_LENGTH != 0 {
                return Err(ChainStorageError::CorruptedData(format!(
                    "height map file has size {} which is not a multiple of {}",
                    bytes.len(),
                    BLOCK_HASH_LENGTH
                )));
            }
            height_to_hash.reserve(bytes.len() / BLOCK_HASH_LENGTH);
            for chunk in bytes.chunks_exact(BLOCK_HASH_LENGTH) {
                let hash = FixedHash::try_from(chunk)
                    .map_err(|_| ChainStorageError::CorruptedData("invalid hash in height map".to_string()))?;
                height_to_hash.push(hash);
            }
        }

        let mut sub_epoch_summaries = BTreeMap::new();
        let ses_path = dir.join(SES_FILE);
        if ses_path.exists() {
            let bytes = fs::read(&ses_path)?;
            sub_epoch_summaries = bincode::deserialize(&bytes)
                .map_err(|e| ChainStorageError::CorruptedData(format!("sub-epoch summary file: {}", e)))?;
        }

        debug!(
            target: LOG_TARGET,
            "Loaded height map with {} heights and {} sub-epoch summaries",
            height_to_hash.len(),
            sub_epoch_summaries.len()
        );
        Ok(Self {
            dir,
            height_to_hash,
            sub_epoch_summaries,
            dirty: 0,
        })
    }

    pub fn contains_height(&self, height: u32) -> bool {
        (height as usize) < self.height_to_hash.len()
    }

    pub fn get_hash(&self, height: u32) -> Option<FixedHash> {
        self.height_to_hash.get(height as usize).copied()
    }

    /// Highest mapped height, if any.
    pub fn peak_height(&self) -> Option<u32> {
        if self.height_to_hash.is_empty() {
            None
        } else {
            Some((self.height_to_hash.len() - 1) as u32)
        }
    }

    pub fn get_ses(&self, height: u32) -> Option<SubEpochSummary> {
        self.sub_epoch_summaries.get(&height).cloned()
    }

    pub fn get_ses_heights(&self) -> Vec<u32> {
        self.sub_epoch_summaries.keys().copied().collect()
    }

    /// Sets the canonical hash at `height`, either overwriting an existing
    /// entry or appending at the tip.
    pub fn update_height(&mut self, height: u32, header_hash: FixedHash, ses: Option<&SubEpochSummary>) {
        let index = height as usize;
        if index < self.height_to_hash.len() {
            self.height_to_hash[index] = header_hash;
        } else {
            // Only sequential appends happen in practice; pad defensively so
            // a skipped height cannot displace later entries.
            while self.height_to_hash.len() < index {
                self.height_to_hash.push(FixedHash::zero());
            }
            self.height_to_hash.push(header_hash);
        }
        match ses {
            Some(ses) => {
                self.sub_epoch_summaries.insert(height, ses.clone());
            },
            None => {
                self.sub_epoch_summaries.remove(&height);
            },
        }
        self.dirty += 1;
    }

    /// Drops every entry strictly above `fork_height`.
    pub fn rollback(&mut self, fork_height: u32) {
        let keep = (fork_height as usize) + 1;
        if self.height_to_hash.len() > keep {
            self.height_to_hash.truncate(keep);
            self.dirty += 1;
        }
        let stale: Vec<u32> = self
            .sub_epoch_summaries
            .range(fork_height.saturating_add(1)..)
            .map(|(h, _)| *h)
            .collect();
        for height in stale {
            self.sub_epoch_summaries.remove(&height);
            self.dirty += 1;
        }
    }

    /// Flushes when enough entries changed; idempotent and cheap when clean.
    pub fn maybe_flush(&mut self) -> Result<(), ChainStorageError> {
        if self.dirty < FLUSH_THRESHOLD {
            return Ok(());
        }
        self.flush()
    }

    /// Writes both sidecar files via rename so a crash never leaves a torn
    /// file.
    pub fn flush(&mut self) -> Result<(), ChainStorageError> {
        let mut height_bytes = Vec::with_capacity(self.height_to_hash.len() * BLOCK_HASH_LENGTH);
        for hash in &self.height_to_hash {
            height_bytes.extend_from_slice(hash.as_bytes());
        }
        write_atomically(&self.dir.join(HEIGHT_FILE), &height_bytes)?;

        let ses_bytes = bincode::serialize(&self.sub_epoch_summaries)
            .map_err(|e| ChainStorageError::CorruptedData(format!("sub-epoch summary encoding: {}", e)))?;
        write_atomically(&self.dir.join(SES_FILE), &ses_bytes)?;

        debug!(
            target: LOG_TARGET,
            "Flushed height map ({} heights, {} dirty entries)",
            self.height_to_hash.len(),
            self.dirty
        );
        self.dirty = 0;
        Ok(())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ChainStorageError> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
