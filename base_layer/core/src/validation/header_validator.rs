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

//! Verifies a block's proof-of-space-and-time structure, independent of the
//! execution payload. Checks run in a fixed order and the first failure is
//! returned, so a given bad block always reports the same code.

use corpochain_common_types::{
    types::{ClassgroupElement, FixedHash},
    Hashable,
};

use crate::{
    blocks::{BlockRecord, HeaderBlock, UnfinishedHeaderBlock},
    consensus::{
        can_finish_sub_and_full_epoch,
        calculate_deficit,
        get_block_challenge,
        get_next_sub_slot_iters_and_difficulty,
        make_sub_epoch_summary,
        pot_iterations::{
            calculate_ip_iters,
            calculate_iterations_quality,
            calculate_sp_interval_iters,
            calculate_sp_iters,
            is_overflow_block,
        },
        BlockchainInterface,
        ConsensusConstants,
    },
    validation::{ErrorCode, ValidationError},
};

/// Validates everything knowable before the infusion point: linkage, finished
/// sub-slots, the challenge, proof of space, signage-point VDFs, foliage and
/// timestamps. Returns the `required_iters` bought by the proof of space.
pub fn validate_unfinished_header_block(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    header_block: &UnfinishedHeaderBlock,
    expected_difficulty: u64,
    expected_sub_slot_iters: u64,
    skip_overflow_last_ss_validation: bool,
) -> Result<u64, ValidationError> {
    let genesis_block = header_block.prev_header_hash() == constants.genesis_challenge;

    // 1. Linkage
    let prev_b = if genesis_block {
        None
    } else {
        match blocks.try_block_record(&header_block.prev_header_hash()) {
            Some(prev) => Some(prev),
            None => {
                return Err(ValidationError::new(
                    ErrorCode::InvalidPrevBlockHash,
                    format!("unknown previous block {}", header_block.prev_header_hash()),
                ));
            },
        }
    };

    let rcb = &header_block.reward_chain_block;
    let sp_index = rcb.signage_point_index;
    if u32::from(sp_index) >= constants.num_sps_sub_slot {
        return Err(ValidationError::new(
            ErrorCode::InvalidSpIndex,
            format!("signage point index {}", sp_index),
        ));
    }
    let overflow = is_overflow_block(constants, sp_index)?;

    // 2. Finished sub-slots compose into both chains
    validate_finished_sub_slots(
        constants,
        blocks,
        header_block,
        prev_b.as_ref(),
        expected_difficulty,
        expected_sub_slot_iters,
    )?;

    // 3. Challenge derivation
    let challenge = get_block_challenge(
        constants,
        &header_block.finished_sub_slots,
        header_block.prev_header_hash(),
        blocks,
        genesis_block,
        overflow,
        skip_overflow_last_ss_validation,
    )?;
    if rcb.pos_ss_cc_challenge_hash != challenge {
        return Err(ValidationError::new(
            ErrorCode::InvalidPospace,
            format!(
                "challenge mismatch: block claims {}, derived {}",
                rcb.pos_ss_cc_challenge_hash, challenge
            ),
        ));
    }

    // 4. Proof of space
    let cc_sp_hash = match &rcb.challenge_chain_sp_vdf {
        Some(vdf_info) => vdf_info.output_hash(),
        None => challenge,
    };
    let q_str = rcb
        .proof_of_space
        .verify_and_get_quality_string(constants, &challenge, &cc_sp_hash)
        .ok_or_else(|| ValidationError::new(ErrorCode::InvalidPospace, "proof of space does not verify"))?;

    // 5. Required iterations
    let required_iters = calculate_iterations_quality(
        constants.difficulty_constant_factor,
        &q_str,
        rcb.proof_of_space.size,
        expected_difficulty,
        &cc_sp_hash,
    );
    let sp_interval_iters = calculate_sp_interval_iters(constants, expected_sub_slot_iters)?;
    if required_iters >= sp_interval_iters {
        return Err(ValidationError::new(
            ErrorCode::InvalidRequiredIters,
            format!("required_iters {} >= interval {}", required_iters, sp_interval_iters),
        ));
    }

    // 6. Signage-point VDFs
    if !(overflow && skip_overflow_last_ss_validation) {
        validate_signage_point_vdfs(constants, header_block, expected_sub_slot_iters)?;
    }

    // 8. Foliage linkage
    validate_foliage(header_block)?;

    if let Some(ftb) = &header_block.foliage_transaction_block {
        // Transaction-block chain linkage
        let expected_prev_tx = previous_transaction_block_hash(constants, blocks, prev_b.as_ref())?;
        if ftb.prev_transaction_block_hash != expected_prev_tx {
            return Err(ValidationError::new(
                ErrorCode::InvalidPrevTransactionBlockHash,
                format!(
                    "links to transaction block {} where {} was expected",
                    ftb.prev_transaction_block_hash, expected_prev_tx
                ),
            ));
        }
        // 9. Timestamp monotonicity
        validate_timestamp(constants, blocks, prev_b.as_ref(), ftb.timestamp, genesis_block)?;
    }

    // 10. Sub-epoch summary
    validate_sub_epoch_summary(constants, blocks, header_block, prev_b.as_ref())?;

    Ok(required_iters)
}

/// Full-header validation: the unfinished checks plus height, weight, total
/// iterations and the infusion-point VDFs.
pub fn validate_finished_header_block(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    header_block: &HeaderBlock,
    expected_difficulty: u64,
    expected_sub_slot_iters: u64,
) -> Result<u64, ValidationError> {
    let unfinished = header_block.clone().into_unfinished_header_block();
    let required_iters = validate_unfinished_header_block(
        constants,
        blocks,
        &unfinished,
        expected_difficulty,
        expected_sub_slot_iters,
        false,
    )?;

    let genesis_block = header_block.prev_header_hash() == constants.genesis_challenge;
    let prev_b = if genesis_block {
        None
    } else {
        blocks.try_block_record(&header_block.prev_header_hash())
    };
    let rcb = &header_block.reward_chain_block;

    let expected_height = prev_b.as_ref().map(|p| p.height + 1).unwrap_or(0);
    if rcb.height != expected_height {
        return Err(ValidationError::new(
            ErrorCode::InvalidHeight,
            format!("height {} where {} was expected", rcb.height, expected_height),
        ));
    }

    let expected_weight =
        prev_b.as_ref().map(|p| p.weight).unwrap_or(0) + u128::from(expected_difficulty);
    if rcb.weight != expected_weight {
        return Err(ValidationError::new(
            ErrorCode::InvalidWeight,
            format!("weight {} where {} was expected", rcb.weight, expected_weight),
        ));
    }

    let overflow = is_overflow_block(constants, rcb.signage_point_index)?;
    let ip_iters = calculate_ip_iters(
        constants,
        expected_sub_slot_iters,
        rcb.signage_point_index,
        required_iters,
    )?;
    let slot_start = infusion_sub_slot_start(
        constants,
        prev_b.as_ref(),
        header_block.finished_sub_slots.len(),
        expected_sub_slot_iters,
    );
    let expected_total_iters = slot_start + u128::from(ip_iters);
    if rcb.total_iters != expected_total_iters {
        return Err(ValidationError::new(
            ErrorCode::InvalidTotalIters,
            format!(
                "total_iters {} where {} was expected",
                rcb.total_iters, expected_total_iters
            ),
        ));
    }

    // 7. Infusion-point VDFs
    let input = ClassgroupElement::zero();
    if rcb.challenge_chain_ip_vdf.number_of_iterations != ip_iters ||
        (!overflow && rcb.challenge_chain_ip_vdf.challenge != rcb.pos_ss_cc_challenge_hash) ||
        !header_block
            .challenge_chain_ip_proof
            .validate(constants, &input, &rcb.challenge_chain_ip_vdf)
    {
        return Err(ValidationError::new(
            ErrorCode::InvalidCcIpVdf,
            "challenge chain infusion VDF does not verify",
        ));
    }
    if rcb.reward_chain_ip_vdf.number_of_iterations != ip_iters ||
        !header_block
            .reward_chain_ip_proof
            .validate(constants, &input, &rcb.reward_chain_ip_vdf)
    {
        return Err(ValidationError::new(
            ErrorCode::InvalidRcIpVdf,
            "reward chain infusion VDF does not verify",
        ));
    }

    let deficit = calculate_deficit(
        constants,
        rcb.height,
        prev_b.as_ref(),
        overflow,
        header_block.finished_sub_slots.len(),
    );
    let icc_expected = deficit < constants.min_blocks_per_challenge_block.saturating_sub(1);
    match (&rcb.infused_challenge_chain_ip_vdf, &header_block.infused_challenge_chain_ip_proof) {
        (Some(vdf_info), Some(proof)) => {
            if !icc_expected || !proof.validate(constants, &input, vdf_info) {
                return Err(ValidationError::new(
                    ErrorCode::InvalidIccIpVdf,
                    "infused challenge chain infusion VDF does not verify",
                ));
            }
        },
        (None, None) => {
            if icc_expected {
                return Err(ValidationError::new(
                    ErrorCode::InvalidIccIpVdf,
                    "missing infused challenge chain VDF",
                ));
            }
        },
        _ => {
            return Err(ValidationError::new(
                ErrorCode::InvalidIccIpVdf,
                "mismatched infused challenge chain VDF and proof",
            ));
        },
    }

    if header_block.foliage.reward_block_hash != rcb.hash() {
        return Err(ValidationError::new(
            ErrorCode::InvalidRewardBlockHash,
            "foliage does not commit to the reward chain block",
        ));
    }
    if rcb.is_transaction_block != header_block.foliage.foliage_transaction_block_hash.is_some() {
        return Err(ValidationError::new(
            ErrorCode::InvalidIsTransactionBlock,
            "transaction-block flag disagrees with the foliage",
        ));
    }

    Ok(required_iters)
}

/// Total iterations at the start of the sub-slot this block infuses into.
fn infusion_sub_slot_start(
    constants: &ConsensusConstants,
    prev_b: Option<&BlockRecord>,
    num_finished_sub_slots: usize,
    expected_sub_slot_iters: u64,
) -> u128 {
    match prev_b {
        None => num_finished_sub_slots as u128 * u128::from(expected_sub_slot_iters),
        Some(prev) => {
            let prev_slot_start = prev.ip_sub_slot_total_iters(constants);
            if num_finished_sub_slots == 0 {
                prev_slot_start
            } else {
                // The first finished slot closes the previous block's slot;
                // any further ones are empty slots at the new rate.
                prev_slot_start +
                    u128::from(prev.sub_slot_iters) +
                    (num_finished_sub_slots as u128 - 1) * u128::from(expected_sub_slot_iters)
            }
        },
    }
}

fn validate_finished_sub_slots(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    header_block: &UnfinishedHeaderBlock,
    prev_b: Option<&BlockRecord>,
    expected_difficulty: u64,
    expected_sub_slot_iters: u64,
) -> Result<(), ValidationError> {
    let input = ClassgroupElement::zero();
    let genesis_block = prev_b.is_none();

    for (index, sub_slot) in header_block.finished_sub_slots.iter().enumerate() {
        let cc = &sub_slot.challenge_chain;

        // Challenge chaining into the previous slot
        let expected_challenge = if index > 0 {
            Some(header_block.finished_sub_slots[index - 1].challenge_chain.hash())
        } else if genesis_block {
            Some(constants.genesis_challenge)
        } else {
            last_finished_challenge_hash(constants, blocks, prev_b)?
        };
        if let Some(expected) = expected_challenge {
            if cc.challenge_chain_end_of_slot_vdf.challenge != expected {
                return Err(ValidationError::new(
                    ErrorCode::InvalidPrevChallengeSlotHash,
                    format!("sub-slot {} does not chain into the previous slot", index),
                ));
            }
        }

        if !sub_slot
            .proofs
            .challenge_chain_slot_proof
            .validate(constants, &input, &cc.challenge_chain_end_of_slot_vdf)
        {
            return Err(ValidationError::new(
                ErrorCode::InvalidCcEosVdf,
                format!("challenge chain end-of-slot VDF in sub-slot {}", index),
            ));
        }

        // Reward chain must commit to this challenge chain
        let rc = &sub_slot.reward_chain;
        if rc.challenge_chain_sub_slot_hash != cc.hash() {
            return Err(ValidationError::new(
                ErrorCode::InvalidRcEosVdf,
                format!("reward chain sub-slot {} does not commit to the challenge chain", index),
            ));
        }
        if !sub_slot
            .proofs
            .reward_chain_slot_proof
            .validate(constants, &input, &rc.end_of_slot_vdf)
        {
            return Err(ValidationError::new(
                ErrorCode::InvalidRcEosVdf,
                format!("reward chain end-of-slot VDF in sub-slot {}", index),
            ));
        }

        // Infused challenge chain present iff a challenge block was infused
        let deficit_before = if index == 0 {
            prev_b.map(|p| p.deficit).unwrap_or(constants.min_blocks_per_challenge_block)
        } else {
            header_block.finished_sub_slots[index - 1].reward_chain.deficit
        };
        let icc_expected = deficit_before < constants.min_blocks_per_challenge_block;
        match (&sub_slot.infused_challenge_chain, &sub_slot.proofs.infused_challenge_chain_slot_proof) {
            (Some(icc), Some(proof)) => {
                if !icc_expected {
                    return Err(ValidationError::new(
                        ErrorCode::InvalidIccPresence,
                        format!("unexpected infused challenge chain in sub-slot {}", index),
                    ));
                }
                if rc.infused_challenge_chain_sub_slot_hash != Some(icc.hash()) {
                    return Err(ValidationError::new(
                        ErrorCode::InvalidIccPresence,
                        format!("reward chain sub-slot {} does not commit to the infused chain", index),
                    ));
                }
                if !proof.validate(constants, &input, &icc.infused_challenge_chain_end_of_slot_vdf) {
                    return Err(ValidationError::new(
                        ErrorCode::InvalidIccEosVdf,
                        format!("infused challenge chain end-of-slot VDF in sub-slot {}", index),
                    ));
                }
            },
            (None, None) => {
                if icc_expected {
                    return Err(ValidationError::new(
                        ErrorCode::InvalidIccPresence,
                        format!("missing infused challenge chain in sub-slot {}", index),
                    ));
                }
                if rc.infused_challenge_chain_sub_slot_hash.is_some() {
                    return Err(ValidationError::new(
                        ErrorCode::InvalidIccPresence,
                        format!("dangling infused chain commitment in sub-slot {}", index),
                    ));
                }
            },
            _ => {
                return Err(ValidationError::new(
                    ErrorCode::InvalidIccPresence,
                    format!("mismatched infused chain data and proof in sub-slot {}", index),
                ));
            },
        }

        // Epoch parameter announcements must match the computed schedule
        if let Some(new_ssi) = cc.new_sub_slot_iters {
            if new_ssi != expected_sub_slot_iters {
                return Err(ValidationError::new(
                    ErrorCode::InvalidNewSubSlotIters,
                    format!("announced sub_slot_iters {} expected {}", new_ssi, expected_sub_slot_iters),
                ));
            }
        }
        if let Some(new_difficulty) = cc.new_difficulty {
            if new_difficulty != expected_difficulty {
                return Err(ValidationError::new(
                    ErrorCode::InvalidNewDifficulty,
                    format!("announced difficulty {} expected {}", new_difficulty, expected_difficulty),
                ));
            }
        }

        // Only the slot ending the sub-epoch may carry a summary
        if index > 0 && cc.subepoch_summary_hash.is_some() {
            return Err(ValidationError::new(
                ErrorCode::InvalidSubEpochSummary,
                format!("sub-epoch summary announced in trailing sub-slot {}", index),
            ));
        }
    }
    Ok(())
}

/// Challenge-chain hash of the most recently finished slot behind `prev_b`,
/// or `None` when the chain has never finished a slot.
fn last_finished_challenge_hash(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    prev_b: Option<&BlockRecord>,
) -> Result<Option<FixedHash>, ValidationError> {
    let mut curr = match prev_b {
        None => return Ok(Some(constants.genesis_challenge)),
        Some(prev) => prev.clone(),
    };
    loop {
        if curr.first_in_sub_slot {
            return Ok(curr
                .finished_challenge_slot_hashes
                .as_ref()
                .and_then(|hashes| hashes.last().copied()));
        }
        if curr.height == 0 {
            return Ok(Some(constants.genesis_challenge));
        }
        curr = blocks.block_record(&curr.prev_hash)?;
    }
}

/// Hash of the most recent transaction block at or behind `prev_b`, or the
/// genesis challenge when there is none yet.
fn previous_transaction_block_hash(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    prev_b: Option<&BlockRecord>,
) -> Result<FixedHash, ValidationError> {
    let mut curr = match prev_b {
        None => return Ok(constants.genesis_challenge),
        Some(prev) => prev.clone(),
    };
    loop {
        if curr.is_transaction_block {
            return Ok(curr.header_hash);
        }
        if curr.height == 0 {
            return Ok(constants.genesis_challenge);
        }
        curr = blocks.block_record(&curr.prev_hash)?;
    }
}

fn validate_signage_point_vdfs(
    constants: &ConsensusConstants,
    header_block: &UnfinishedHeaderBlock,
    expected_sub_slot_iters: u64,
) -> Result<(), ValidationError> {
    let rcb = &header_block.reward_chain_block;
    let input = ClassgroupElement::zero();

    if rcb.signage_point_index == 0 {
        if rcb.challenge_chain_sp_vdf.is_some() || header_block.challenge_chain_sp_proof.is_some() {
            return Err(ValidationError::new(
                ErrorCode::InvalidCcSpVdf,
                "first signage point of the sub-slot must not carry a VDF",
            ));
        }
        if rcb.reward_chain_sp_vdf.is_some() || header_block.reward_chain_sp_proof.is_some() {
            return Err(ValidationError::new(
                ErrorCode::InvalidRcSpVdf,
                "first signage point of the sub-slot must not carry a VDF",
            ));
        }
        return Ok(());
    }

    let sp_iters = calculate_sp_iters(constants, expected_sub_slot_iters, rcb.signage_point_index)?;

    match (&rcb.challenge_chain_sp_vdf, &header_block.challenge_chain_sp_proof) {
        (Some(vdf_info), Some(proof)) => {
            if vdf_info.number_of_iterations != sp_iters ||
                vdf_info.challenge != rcb.pos_ss_cc_challenge_hash ||
                !proof.validate(constants, &input, vdf_info)
            {
                return Err(ValidationError::new(
                    ErrorCode::InvalidCcSpVdf,
                    "challenge chain signage point VDF does not verify",
                ));
            }
        },
        _ => {
            return Err(ValidationError::new(
                ErrorCode::InvalidCcSpVdf,
                "missing challenge chain signage point VDF",
            ));
        },
    }

    match (&rcb.reward_chain_sp_vdf, &header_block.reward_chain_sp_proof) {
        (Some(vdf_info), Some(proof)) => {
            if vdf_info.number_of_iterations != sp_iters || !proof.validate(constants, &input, vdf_info) {
                return Err(ValidationError::new(
                    ErrorCode::InvalidRcSpVdf,
                    "reward chain signage point VDF does not verify",
                ));
            }
        },
        _ => {
            return Err(ValidationError::new(
                ErrorCode::InvalidRcSpVdf,
                "missing reward chain signage point VDF",
            ));
        },
    }

    Ok(())
}

fn validate_foliage(header_block: &UnfinishedHeaderBlock) -> Result<(), ValidationError> {
    let foliage = &header_block.foliage;

    let ursb_hash = header_block.reward_chain_block.hash();
    if foliage.foliage_block_data.unfinished_reward_block_hash != ursb_hash {
        return Err(ValidationError::new(
            ErrorCode::InvalidUrsbHash,
            "foliage does not commit to the unfinished reward block",
        ));
    }

    match (&foliage.foliage_transaction_block_hash, &header_block.foliage_transaction_block) {
        (Some(expected_hash), Some(ftb)) => {
            if ftb.hash() != *expected_hash {
                return Err(ValidationError::new(
                    ErrorCode::InvalidFoliageBlockHash,
                    "foliage transaction block hash mismatch",
                ));
            }
            if foliage.foliage_transaction_block_signature.is_none() {
                return Err(ValidationError::new(
                    ErrorCode::InvalidFoliageBlockPresence,
                    "transaction block without a foliage signature",
                ));
            }
            match &header_block.execution_payload {
                Some(payload) => {
                    if payload.block_hash != ftb.execution_block_hash {
                        return Err(ValidationError::new(
                            ErrorCode::InvalidExecutionPayloadPresence,
                            "execution payload does not match the foliage commitment",
                        ));
                    }
                },
                None => {
                    return Err(ValidationError::new(
                        ErrorCode::InvalidExecutionPayloadPresence,
                        "transaction block without an execution payload",
                    ));
                },
            }
        },
        (None, None) => {
            if header_block.execution_payload.is_some() {
                return Err(ValidationError::new(
                    ErrorCode::InvalidExecutionPayloadPresence,
                    "execution payload on a non-transaction block",
                ));
            }
        },
        _ => {
            return Err(ValidationError::new(
                ErrorCode::InvalidFoliageBlockPresence,
                "foliage and transaction block presence disagree",
            ));
        },
    }

    Ok(())
}

fn validate_timestamp(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    prev_b: Option<&BlockRecord>,
    timestamp: u64,
    genesis_block: bool,
) -> Result<(), ValidationError> {
    let now = chrono::Utc::now().timestamp() as u64;
    if timestamp > now + constants.max_future_time {
        return Err(ValidationError::new(
            ErrorCode::TimestampTooFarInFuture,
            format!("timestamp {} is more than {}s ahead", timestamp, constants.max_future_time),
        ));
    }
    if genesis_block {
        return Ok(());
    }

    // Mean of the last NUMBER_OF_TIMESTAMPS transaction-block timestamps
    let mut timestamps = Vec::with_capacity(usize::from(constants.number_of_timestamps));
    let mut curr = prev_b.cloned();
    while let Some(record) = curr {
        if timestamps.len() >= usize::from(constants.number_of_timestamps) {
            break;
        }
        if let Some(ts) = record.timestamp {
            timestamps.push(ts);
        }
        if record.height == 0 {
            break;
        }
        curr = blocks.try_block_record(&record.prev_hash);
    }
    if timestamps.is_empty() {
        return Ok(());
    }
    let mean = timestamps.iter().copied().map(u128::from).sum::<u128>() / timestamps.len() as u128;
    if u128::from(timestamp) <= mean {
        return Err(ValidationError::new(
            ErrorCode::TimestampTooFarInPast,
            format!("timestamp {} is not after the recent mean {}", timestamp, mean),
        ));
    }
    Ok(())
}

fn validate_sub_epoch_summary(
    constants: &ConsensusConstants,
    blocks: &dyn BlockchainInterface,
    header_block: &UnfinishedHeaderBlock,
    prev_b: Option<&BlockRecord>,
) -> Result<(), ValidationError> {
    let announced = header_block
        .finished_sub_slots
        .first()
        .and_then(|ss| ss.challenge_chain.subepoch_summary_hash);

    let prev_b = match prev_b {
        None => {
            if announced.is_some() {
                return Err(ValidationError::new(
                    ErrorCode::InvalidSubEpochSummary,
                    "genesis cannot close a sub-epoch",
                ));
            }
            return Ok(());
        },
        Some(prev) => prev,
    };

    let due = header_block.first_in_sub_slot() && can_finish_sub_and_full_epoch(constants, blocks, prev_b).0;
    if !due {
        if announced.is_some() {
            return Err(ValidationError::new(
                ErrorCode::InvalidSubEpochSummary,
                "sub-epoch summary announced outside a boundary",
            ));
        }
        return Ok(());
    }

    let (_, can_finish_epoch) = can_finish_sub_and_full_epoch(constants, blocks, prev_b);
    let (new_difficulty, new_sub_slot_iters) = if can_finish_epoch {
        let (ssi, difficulty) = get_next_sub_slot_iters_and_difficulty(constants, true, Some(prev_b), blocks);
        (Some(difficulty), Some(ssi))
    } else {
        (None, None)
    };
    let expected = make_sub_epoch_summary(constants, blocks, prev_b, new_difficulty, new_sub_slot_iters);
    match announced {
        Some(hash) if hash == expected.hash() => Ok(()),
        _ => Err(ValidationError::new(
            ErrorCode::InvalidSubEpochSummary,
            "announced sub-epoch summary does not match the expected value",
        )),
    }
}
