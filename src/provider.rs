//! Alloy provider construction and extensions.

use alloy::{
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::client::{ClientBuilder, RpcClient},
    transports::{TransportResult, layers::RetryBackoffLayer},
};
use url::Url;

/// [`RetryBackoffLayer`] used for chain and bundler clients.
///
/// We are allowing max 10 retries with a backoff of 800ms. The CU/s is set to max value to avoid
/// any throttling.
pub const RETRY_LAYER: RetryBackoffLayer = RetryBackoffLayer::new(10, 800, u64::MAX);

/// Creates an HTTP JSON-RPC client with retries.
pub fn http_client(url: Url) -> RpcClient {
    ClientBuilder::default().layer(RETRY_LAYER).http(url)
}

/// Creates a type-erased chain provider for `url`.
pub fn connect_http(url: Url) -> DynProvider {
    ProviderBuilder::new().connect_client(http_client(url)).erased()
}

/// EIP-1559 fees for a user operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeData {
    /// `maxFeePerGas`.
    pub max_fee_per_gas: u128,
    /// `maxPriorityFeePerGas`.
    pub max_priority_fee_per_gas: u128,
}

/// Extension trait for [`Provider`] adding user operation helpers.
pub trait ProviderExt: Provider {
    /// Fetches current fees.
    ///
    /// `maxFeePerGas` is the node's gas price plus the suggested tip, leaving headroom for the
    /// base fee to move between estimation and inclusion.
    fn fee_data(&self) -> impl Future<Output = TransportResult<FeeData>> + Send
    where
        Self: Sized,
    {
        async move {
            let gas_price = self.get_gas_price().await?;
            let priority = self.get_max_priority_fee_per_gas().await?;
            Ok(FeeData {
                max_fee_per_gas: gas_price.saturating_add(priority),
                max_priority_fee_per_gas: priority,
            })
        }
    }
}

impl<T> ProviderExt for T where T: Provider {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::transports::mock::Asserter;

    #[tokio::test]
    async fn fee_data_adds_tip() {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new().connect_mocked_client(asserter.clone());
        asserter.push_success(&"0x3b9aca00");
        asserter.push_success(&"0x5f5e100");

        let fees = provider.fee_data().await.unwrap();
        assert_eq!(fees.max_priority_fee_per_gas, 100_000_000);
        assert_eq!(fees.max_fee_per_gas, 1_100_000_000);
    }
}
