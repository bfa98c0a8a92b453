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

//! The JSON-RPC client for the execution engine, authenticated with an HS256
//! bearer token derived from the shared JWT secret.

use std::{
    convert::TryFrom,
    sync::atomic::{AtomicI64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use corpochain_common_types::types::ExecutionBlockHash;
use jsonwebtoken::{encode, EncodingKey, Header};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    blocks::ExecutionPayloadV2,
    execution::{
        engine_api::ForkchoiceUpdatedResponse,
        ExecutionClientError,
        ForkchoiceStateV1,
        PayloadAttributesV2,
        PayloadStatus,
        PayloadStatusV1,
    },
};

const LOG_TARGET: &str = "c::execution::client";

const ENGINE_NEW_PAYLOAD: &str = "engine_newPayloadV2";
const ENGINE_FORKCHOICE_UPDATED: &str = "engine_forkchoiceUpdatedV2";
const ETH_GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";

/// The seam between consensus and the engine transport. The HTTP client
/// implements it; tests substitute their own.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn new_payload(&self, payload: &ExecutionPayloadV2) -> Result<PayloadStatus, ExecutionClientError>;

    async fn forkchoice_update(
        &self,
        state: ForkchoiceStateV1,
        attributes: Option<PayloadAttributesV2>,
    ) -> Result<PayloadStatus, ExecutionClientError>;

    /// The engine's latest known execution block hash, if it has one.
    async fn latest_block_hash(&self) -> Result<Option<ExecutionBlockHash>, ExecutionClientError>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionClientConfig {
    pub engine_url: String,
    /// Raw bytes of the shared JWT secret
    pub jwt_secret: Vec<u8>,
    pub timeout_secs: u64,
    pub optimistic_import: bool,
}

impl Default for ExecutionClientConfig {
    fn default() -> Self {
        Self {
            engine_url: "http://127.0.0.1:8551".to_string(),
            jwt_secret: Vec::new(),
            timeout_secs: 30,
            optimistic_import: true,
        }
    }
}

#[derive(Serialize)]
struct JwtClaims {
    iat: i64,
}

/// HTTP Engine API adapter. Stateless from the chain's perspective; every
/// call is a fresh JSON-RPC exchange.
pub struct ExecutionClient {
    config: ExecutionClientConfig,
    http: reqwest::Client,
    request_id: AtomicI64,
}

impl ExecutionClient {
    pub fn new(config: ExecutionClientConfig) -> Result<Self, ExecutionClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            http,
            request_id: AtomicI64::new(1),
        })
    }

    /// Polls the engine until it answers, learning its latest known block.
    /// Used at startup while the engine may still be initializing.
    pub async fn wait_for_engine(&self, poll_interval: Duration) -> Option<ExecutionBlockHash> {
        loop {
            match self.latest_block_hash().await {
                Ok(latest) => {
                    info!(
                        target: LOG_TARGET,
                        "Execution engine is up; latest known block: {:?}", latest
                    );
                    return latest;
                },
                Err(e) => {
                    debug!(target: LOG_TARGET, "Execution engine not ready yet: {}", e);
                    tokio::time::sleep(poll_interval).await;
                },
            }
        }
    }

    fn bearer_token(&self) -> Result<String, ExecutionClientError> {
        let claims = JwtClaims {
            iat: chrono::Utc::now().timestamp(),
        };
        let token = encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.config.jwt_secret),
        )?;
        Ok(token)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ExecutionClientError> {
        let request_id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "method": method,
            "params": params,
        });
        trace!(target: LOG_TARGET, "-> {} (id {})", method, request_id);

        let response: Value = self
            .http
            .post(&self.config.engine_url)
            .bearer_auth(self.bearer_token()?)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified")
                .to_string();
            return Err(ExecutionClientError::Rpc { code, message });
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| ExecutionClientError::UnexpectedResponse("response carries no result".to_string()))
    }
}

#[async_trait]
impl ExecutionEngine for ExecutionClient {
    async fn new_payload(&self, payload: &ExecutionPayloadV2) -> Result<PayloadStatus, ExecutionClientError> {
        let result = self.call(ENGINE_NEW_PAYLOAD, json!([payload])).await?;
        let status: PayloadStatusV1 = serde_json::from_value(result)
            .map_err(|e| ExecutionClientError::UnexpectedResponse(e.to_string()))?;
        if let Some(validation_error) = &status.validation_error {
            warn!(
                target: LOG_TARGET,
                "Engine rejected payload {}: {}", payload.block_hash, validation_error
            );
        }
        Ok(status.status())
    }

    async fn forkchoice_update(
        &self,
        state: ForkchoiceStateV1,
        attributes: Option<PayloadAttributesV2>,
    ) -> Result<PayloadStatus, ExecutionClientError> {
        let result = self
            .call(ENGINE_FORKCHOICE_UPDATED, json!([state, attributes]))
            .await?;
        let response: ForkchoiceUpdatedResponse = serde_json::from_value(result)
            .map_err(|e| ExecutionClientError::UnexpectedResponse(e.to_string()))?;
        Ok(response.payload_status.status())
    }

    async fn latest_block_hash(&self) -> Result<Option<ExecutionBlockHash>, ExecutionClientError> {
        let result = self.call(ETH_GET_BLOCK_BY_NUMBER, json!(["latest", false])).await?;
        if result.is_null() {
            return Ok(None);
        }
        let hash_str = result
            .get("hash")
            .and_then(Value::as_str)
            .ok_or_else(|| ExecutionClientError::UnexpectedResponse("block carries no hash".to_string()))?;
        let bytes = hex::decode(hash_str.trim_start_matches("0x"))
            .map_err(|e| ExecutionClientError::UnexpectedResponse(e.to_string()))?;
        let hash = ExecutionBlockHash::try_from(bytes.as_slice())
            .map_err(|_| ExecutionClientError::UnexpectedResponse("block hash is not 32 bytes".to_string()))?;
        Ok(Some(hash))
    }
}
