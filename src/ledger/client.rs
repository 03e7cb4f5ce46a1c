//! Ledger RPC client with timeout and failover handling.
//!
//! # Responsibilities
//! - Connect to JSON-RPC endpoints (primary + failovers)
//! - Query chain state (head, receipts, logs, nonces)
//! - Broadcast signed transactions through the primary endpoint
//! - Handle timeouts and network errors gracefully

use alloy::eips::BlockId;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::transports::TransportResult;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::LedgerConfig;
use crate::error::{RendezvousError, RendezvousResult};
use crate::ledger::types::{LogQuery, ReceiptView};
use crate::ledger::wallet::Wallet;
use crate::ledger::Ledger;

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// Ledger client wrapping alloy providers with failover support.
#[derive(Clone)]
pub struct LedgerClient {
    /// Read providers (primary + failovers).
    providers: Vec<DynProvider>,
    /// Signing provider on the primary endpoint, when a wallet is configured.
    signer: Option<DynProvider>,
    config: LedgerConfig,
    timeout_duration: Duration,
}

impl LedgerClient {
    /// Create a new ledger client.
    ///
    /// Construction succeeds even when the endpoint is unreachable; chain
    /// verification failures are logged so the caller can degrade gracefully.
    pub async fn new(config: LedgerConfig, wallet: Option<Wallet>) -> RendezvousResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            RendezvousError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;

        let mut providers =
            vec![Arc::new(ProviderBuilder::new().connect_http(primary_url.clone())) as DynProvider];

        for url_str in &config.failover_urls {
            match url_str.parse::<url::Url>() {
                Ok(url) => {
                    providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider)
                }
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        let signer = wallet.map(|wallet| {
            Arc::new(
                ProviderBuilder::new()
                    .wallet(wallet.ethereum_wallet())
                    .connect_http(primary_url),
            ) as DynProvider
        });

        let client = Self {
            providers,
            signer,
            config: config.clone(),
            timeout_duration,
        };

        match client.verify_chain_id().await {
            Ok(()) => tracing::info!(
                rpc_url = %config.rpc_url,
                chain_id = config.chain_id,
                network = ?config.network,
                "Ledger client initialized"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                "Ledger client initialized but chain verification failed"
            ),
        }

        Ok(client)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> RendezvousResult<()> {
        let actual = self.chain_id().await?;
        if actual != self.config.chain_id {
            return Err(RendezvousError::ChainMismatch {
                expected: self.config.chain_id,
                actual,
            });
        }
        Ok(())
    }

    /// Run a read request against each provider in turn until one answers.
    async fn with_failover<T, F, Fut>(&self, op: &'static str, request: F) -> RendezvousResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, request(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, op, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, op, "RPC timeout"),
            }
        }
        Err(RendezvousError::Rpc(format!("All RPC providers failed: {}", op)))
    }

    fn signer(&self) -> RendezvousResult<&DynProvider> {
        self.signer
            .as_ref()
            .ok_or_else(|| RendezvousError::SubmissionFailed("no signing wallet configured".into()))
    }
}

#[async_trait]
impl Ledger for LedgerClient {
    async fn chain_id(&self) -> RendezvousResult<u64> {
        self.with_failover("eth_chainId", |p| async move { p.get_chain_id().await })
            .await
    }

    async fn block_number(&self) -> RendezvousResult<u64> {
        self.with_failover("eth_blockNumber", |p| async move { p.get_block_number().await })
            .await
    }

    async fn gas_price(&self) -> RendezvousResult<u128> {
        self.with_failover("eth_gasPrice", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn transaction_count(&self, address: Address) -> RendezvousResult<u64> {
        self.with_failover("eth_getTransactionCount", |p| async move {
            p.get_transaction_count(address).pending().await
        })
        .await
    }

    async fn estimate_gas(&self, tx: TransactionRequest) -> RendezvousResult<u64> {
        // Estimation failures are almost always reverts; don't mask them as transport errors
        let provider = self.providers[0].clone();
        match timeout(self.timeout_duration, provider.estimate_gas(tx)).await {
            Ok(Ok(gas)) => Ok(gas),
            Ok(Err(e)) => Err(RendezvousError::SubmissionFailed(format!(
                "gas estimation failed: {}",
                e
            ))),
            Err(_) => Err(RendezvousError::Rpc("eth_estimateGas timed out".into())),
        }
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> RendezvousResult<TxHash> {
        let signer = self.signer()?.clone();
        match timeout(self.timeout_duration, signer.send_transaction(tx)).await {
            Ok(Ok(pending)) => Ok(*pending.tx_hash()),
            Ok(Err(e)) => Err(RendezvousError::SubmissionFailed(e.to_string())),
            Err(_) => Err(RendezvousError::SubmissionFailed(
                "node did not acknowledge the transaction in time".into(),
            )),
        }
    }

    async fn transaction_receipt(&self, hash: TxHash) -> RendezvousResult<Option<ReceiptView>> {
        let receipt = self
            .with_failover("eth_getTransactionReceipt", |p| async move {
                p.get_transaction_receipt(hash).await
            })
            .await?;

        Ok(receipt.and_then(|r| {
            // A receipt without a block number is a pending-block artifact
            let block_number = r.block_number?;
            Some(ReceiptView {
                transaction_hash: r.transaction_hash,
                block_number,
                block_hash: r.block_hash,
                success: r.status(),
                gas_used: r.gas_used,
                logs: r.inner.logs().to_vec(),
            })
        }))
    }

    async fn is_transaction_known(&self, hash: TxHash) -> RendezvousResult<bool> {
        let tx = self
            .with_failover("eth_getTransactionByHash", |p| async move {
                p.get_transaction_by_hash(hash).await
            })
            .await?;
        Ok(tx.is_some())
    }

    async fn revert_reason(&self, hash: TxHash, block_number: u64) -> RendezvousResult<Option<String>> {
        let tx = self
            .with_failover("eth_getTransactionByHash", |p| async move {
                p.get_transaction_by_hash(hash).await
            })
            .await?;
        let Some(tx) = tx else {
            return Ok(None);
        };

        let request = tx.into_request();
        let provider = self.providers[0].clone();
        let replay = provider.call(request).block(BlockId::number(block_number));
        match timeout(self.timeout_duration, replay).await {
            // Replays can succeed when the revert depended on state changed earlier in the block
            Ok(Ok(_)) => Ok(None),
            Ok(Err(e)) => Ok(Some(e.to_string())),
            Err(_) => Err(RendezvousError::Rpc("eth_call replay timed out".into())),
        }
    }

    async fn logs(&self, query: &LogQuery) -> RendezvousResult<Vec<Log>> {
        let mut filter = Filter::new()
            .from_block(query.from_block)
            .to_block(query.to_block);
        if !query.addresses.is_empty() {
            filter = filter.address(query.addresses.clone());
        }

        self.with_failover("eth_getLogs", |p| {
            let filter = filter.clone();
            async move { p.get_logs(&filter).await }
        })
        .await
    }

    async fn call(&self, tx: TransactionRequest) -> RendezvousResult<Bytes> {
        self.with_failover("eth_call", |p| {
            let tx = tx.clone();
            async move { p.call(tx).await }
        })
        .await
    }
}

/// Convenience for building read-only calls.
pub fn read_request(to: Address, data: Bytes) -> TransactionRequest {
    TransactionRequest::default().with_to(to).with_input(data)
}

impl std::fmt::Debug for LedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .field("can_sign", &self.signer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LedgerConfig {
        LedgerConfig {
            rpc_url: "http://127.0.0.1:1".to_string(),
            rpc_timeout_secs: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_client_creation_without_node() {
        // Creation must succeed even if nothing listens on the endpoint
        let result = LedgerClient::new(test_config(), None).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let mut config = test_config();
        config.rpc_url = "not a url".into();
        let result = LedgerClient::new(config, None).await;
        assert!(matches!(result, Err(RendezvousError::Rpc(_))));
    }

    #[tokio::test]
    async fn test_rpc_failover_exhausted() {
        let mut config = test_config();
        config.failover_urls.push("http://127.0.0.1:2".to_string());

        let client = LedgerClient::new(config, None).await.unwrap();
        let err = client.block_number().await.unwrap_err();
        assert!(err.to_string().contains("All RPC providers failed"));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_send_without_wallet_fails_submission() {
        let client = LedgerClient::new(test_config(), None).await.unwrap();
        let err = client
            .send_transaction(TransactionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RendezvousError::SubmissionFailed(_)));
    }
}
