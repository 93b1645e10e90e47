//! The passkey wallet.
//!
//! Ties credential setup, address derivation and execution together for a single passkey-owned
//! smart account.

use crate::{
    account::{AccountFactory, SmartAccount},
    allowlist::Allowlist,
    builder::{GasPolicy, UserOperationBuilder},
    bundler::Bundler,
    config::{RelyingPartyConfig, WalletConfig},
    constants::{DEFAULT_RECEIPT_TIMEOUT, WEBAUTHN_TIMEOUT},
    error::{CredentialError, WalletError},
    executor::{Execution, ExecutionContext, Executor, Middleware, SponsorshipPolicy, Stage},
    hash::{MessageHashBuilder, PackedParam},
    provider::connect_http,
    signers::{PasskeySigner, PayloadSigner},
    storage::{CredentialStore, KeyValueStore},
    types::{BiometricCredential, Call, UserOperation},
    webauthn::{
        Authenticator, Capabilities, RegistrationOptions, TimeoutAuthenticator,
        register_credential,
    },
};
use alloy::{
    primitives::{Address, B256, Bytes, ChainId, U256},
    providers::{DynProvider, Provider},
};
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument, warn};

/// A passkey-owned smart account.
#[derive(Debug, Clone)]
pub struct Wallet<P> {
    chain_id: ChainId,
    factory: AccountFactory<P>,
    provider: P,
    bundler: Arc<dyn Bundler>,
    authenticator: Arc<TimeoutAuthenticator<Arc<dyn Authenticator>>>,
    credentials: CredentialStore,
    allowlist: Arc<Allowlist>,
    relying_party: RelyingPartyConfig,
    gas: GasPolicy,
    sponsorship: SponsorshipPolicy,
    receipt_timeout: Duration,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Wallet<DynProvider> {
    /// Creates a wallet from `config`, with the chain and bundler reached over HTTP.
    pub fn from_config(
        config: &WalletConfig,
        authenticator: Arc<dyn Authenticator>,
        store: Arc<dyn KeyValueStore>,
    ) -> eyre::Result<Self> {
        config.validate()?;
        let provider = connect_http(config.chain.rpc_url.clone());
        let bundler = config.bundler_client()?;

        Ok(Self::new(
            config.chain.chain_id,
            AccountFactory::new(
                config.contracts.factory,
                config.contracts.implementation,
                provider.clone(),
            ),
            provider,
            Arc::new(bundler),
            authenticator,
            CredentialStore::new(store),
        )
        .with_allowlist(config.allowlist()?)
        .with_relying_party(config.relying_party.clone())
        .with_gas_policy(config.gas)
        .with_sponsorship(config.sponsorship())
        .with_receipt_timeout(config.timeouts.receipt)
        .with_webauthn_timeout(config.timeouts.webauthn))
    }
}

impl<P: Provider + Clone + 'static> Wallet<P> {
    /// Creates a wallet with the built-in allowlist and default policies.
    ///
    /// Every WebAuthn ceremony of `authenticator` is bounded by [`WEBAUTHN_TIMEOUT`].
    pub fn new(
        chain_id: ChainId,
        factory: AccountFactory<P>,
        provider: P,
        bundler: Arc<dyn Bundler>,
        authenticator: Arc<dyn Authenticator>,
        credentials: CredentialStore,
    ) -> Self {
        Self {
            chain_id,
            factory,
            provider,
            bundler,
            authenticator: Arc::new(TimeoutAuthenticator::new(authenticator, WEBAUTHN_TIMEOUT)),
            credentials,
            allowlist: Arc::new(Allowlist::default()),
            relying_party: RelyingPartyConfig::default(),
            gas: GasPolicy::default(),
            sponsorship: SponsorshipPolicy::default(),
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            middleware: Vec::new(),
        }
    }

    /// Sets the allowlist.
    pub fn with_allowlist(mut self, allowlist: Allowlist) -> Self {
        self.allowlist = Arc::new(allowlist);
        self
    }

    /// Sets the relying party used on registration.
    pub fn with_relying_party(mut self, relying_party: RelyingPartyConfig) -> Self {
        self.relying_party = relying_party;
        self
    }

    /// Sets the gas fallback policy.
    pub fn with_gas_policy(mut self, gas: GasPolicy) -> Self {
        self.gas = gas;
        self
    }

    /// Sets the sponsorship policy.
    pub fn with_sponsorship(mut self, sponsorship: SponsorshipPolicy) -> Self {
        self.sponsorship = sponsorship;
        self
    }

    /// Sets how long to wait for inclusion.
    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    /// Sets how long a WebAuthn ceremony may take.
    pub fn with_webauthn_timeout(mut self, timeout: Duration) -> Self {
        let inner = self.authenticator.inner().clone();
        self.authenticator = Arc::new(TimeoutAuthenticator::new(inner, timeout));
        self
    }

    /// Adds an execution middleware.
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// The chain id.
    pub const fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// The credential store.
    pub const fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// The allowlist.
    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    /// The sponsorship policy.
    pub const fn sponsorship(&self) -> SponsorshipPolicy {
        self.sponsorship
    }

    /// How long an execution waits for inclusion.
    pub const fn receipt_timeout(&self) -> Duration {
        self.receipt_timeout
    }

    /// How long a WebAuthn ceremony may take.
    pub fn webauthn_timeout(&self) -> Duration {
        self.authenticator.timeout()
    }

    /// The relying party used on registration and checked on assertions.
    pub const fn relying_party(&self) -> &RelyingPartyConfig {
        &self.relying_party
    }

    /// Reports what the platform authenticator supports.
    pub async fn capabilities(&self) -> Capabilities {
        self.authenticator.check_support().await
    }

    /// Registers a passkey and derives its smart account.
    ///
    /// Fails with [`CredentialError::AlreadyExists`] when a credential is stored, since replacing
    /// it would orphan the wallet derived from it.
    #[instrument(skip_all)]
    pub async fn setup(
        &self,
        user_id: &str,
        display_name: &str,
    ) -> Result<BiometricCredential, WalletError> {
        if let Some(existing) = self.credentials.load().await? {
            return Err(CredentialError::AlreadyExists(existing.credential_id).into());
        }

        let options = RegistrationOptions::new(
            &self.relying_party.id,
            &self.relying_party.name,
            user_id,
            display_name,
        );
        let credential = register_credential(self.authenticator.as_ref(), &options).await?;
        let address = self.factory.get_address(&credential.owner()?, U256::ZERO);

        self.credentials.save(&credential).await?;
        let credential = self.credentials.link_wallet(&credential.credential_id, address).await?;
        info!(credential_id = %credential.credential_id, wallet = %address, "Wallet set up");
        Ok(credential)
    }

    /// The stored credential.
    pub async fn credential(&self) -> Result<BiometricCredential, WalletError> {
        Ok(self.credentials.load().await?.ok_or(CredentialError::NotFound)?)
    }

    /// The smart account address, computed from the stored credential.
    pub async fn address(&self) -> Result<Address, WalletError> {
        let credential = self.credential().await?;
        let address = self.factory.get_address(&credential.owner()?, U256::ZERO);
        if let Some(linked) = credential.wallet_address.filter(|linked| *linked != address) {
            warn!(%linked, computed = %address, "Stored wallet address differs from derivation");
        }
        Ok(address)
    }

    /// Checks the local address derivation against the factory.
    pub async fn verify_address(&self) -> Result<Address, WalletError> {
        let credential = self.credential().await?;
        self.factory.verify_address(&credential.owner()?, U256::ZERO).await
    }

    /// Whether the smart account has been deployed.
    pub async fn is_deployed(&self) -> Result<bool, WalletError> {
        let address = self.address().await?;
        Ok(SmartAccount::new(address, self.provider.clone()).is_deployed().await?)
    }

    async fn signer(&self) -> Result<PasskeySigner<Arc<dyn Authenticator>>, WalletError> {
        let credential = self.credential().await?;
        let authenticator: Arc<dyn Authenticator> = self.authenticator.clone();
        let public_key = credential.public_key()?;
        Ok(PasskeySigner::new(authenticator, credential.credential_id, public_key)
            .with_origin(&self.relying_party.origin))
    }

    /// An executor for the stored credential.
    ///
    /// The credential is marked used as soon as the passkey has signed, whatever the bundler
    /// does with the operation afterwards.
    pub async fn executor(&self) -> Result<Executor<P>, WalletError> {
        let credential = self.credential().await?;
        let builder = UserOperationBuilder::new(
            self.factory.clone(),
            self.provider.clone(),
            self.bundler.clone(),
        )
        .with_gas_policy(self.gas);
        let usage = UsageRecorder {
            credentials: self.credentials.clone(),
            credential_id: credential.credential_id.clone(),
        };

        let mut executor = Executor::new(
            builder,
            Arc::new(self.signer().await?),
            self.allowlist.clone(),
            credential.owner()?,
            self.chain_id,
        )
        .with_sponsorship(self.sponsorship)
        .with_receipt_timeout(self.receipt_timeout)
        .with_middleware(Arc::new(usage));
        for middleware in &self.middleware {
            executor = executor.with_middleware(middleware.clone());
        }
        Ok(executor)
    }

    /// Executes `calls` from the smart account and waits for inclusion.
    pub async fn execute(&self, calls: &[Call]) -> Result<Execution, WalletError> {
        self.executor().await?.execute(calls).await
    }

    /// Signs an application message for `contract` with the passkey.
    ///
    /// The message is the packed hash of `function`, the chain, `contract`, the smart account
    /// and `params`. Returns the hash and the account signature over it.
    pub async fn sign_message(
        &self,
        function: &str,
        contract: Address,
        params: Vec<PackedParam>,
    ) -> Result<(B256, Bytes), WalletError> {
        self.allowlist.assert_trusted(self.chain_id, contract, None)?;
        let user = self.address().await?;
        let hash =
            MessageHashBuilder::new(function, self.chain_id, contract, user).params(params).build();

        let credential = self.credential().await?;
        let signature = self.signer().await?.sign_payload_hash(hash).await?;
        self.credentials.mark_used(&credential.credential_id).await?;
        Ok((hash, signature))
    }

    /// Forgets the stored credential.
    ///
    /// The smart account stays on chain but can no longer be signed for from here.
    pub async fn reset(&self) -> Result<Option<String>, WalletError> {
        Ok(self.credentials.clear().await?)
    }
}

/// Marks the credential used once it has signed an operation.
#[derive(Debug)]
struct UsageRecorder {
    credentials: CredentialStore,
    credential_id: String,
}

#[async_trait::async_trait]
impl Middleware for UsageRecorder {
    async fn on_stage(
        &self,
        _ctx: &ExecutionContext<'_>,
        stage: Stage,
        _op: &UserOperation,
    ) -> eyre::Result<()> {
        if stage == Stage::Signed {
            self.credentials.mark_used(&self.credential_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        allowlist::TrustedContract,
        bundler::{PaymasterDialect, Sponsorship, UserOperationGasEstimate, UserOperationReceipt},
        error::{BundlerError, PaymasterError, StorageError},
        storage::{CredentialEvent, InMemoryStore},
        webauthn::{Assertion, Registration, SoftAuthenticator},
    };
    use alloy::{
        primitives::address,
        providers::ProviderBuilder,
        transports::mock::Asserter,
    };

    const FACTORY: Address = address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    const IMPLEMENTATION: Address = address!("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
    const USDC: Address = address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

    #[derive(Debug)]
    struct Offline;

    #[async_trait::async_trait]
    impl Bundler for Offline {
        fn entry_point(&self) -> Address {
            crate::constants::ENTRYPOINT_V06
        }

        async fn send_user_operation(&self, _op: &UserOperation) -> Result<B256, BundlerError> {
            unimplemented!()
        }

        async fn estimate_user_operation_gas(
            &self,
            _op: &UserOperation,
        ) -> Result<UserOperationGasEstimate, BundlerError> {
            unimplemented!()
        }

        async fn sponsor_user_operation(
            &self,
            _op: &UserOperation,
        ) -> Result<Sponsorship, PaymasterError> {
            unimplemented!()
        }

        async fn get_user_operation_receipt(
            &self,
            _hash: B256,
        ) -> Result<Option<UserOperationReceipt>, BundlerError> {
            unimplemented!()
        }
    }

    /// Estimates gas but refuses every operation.
    #[derive(Debug)]
    struct Refusing;

    #[async_trait::async_trait]
    impl Bundler for Refusing {
        fn entry_point(&self) -> Address {
            crate::constants::ENTRYPOINT_V06
        }

        async fn send_user_operation(&self, _op: &UserOperation) -> Result<B256, BundlerError> {
            Err(BundlerError::Rejected {
                method: "eth_sendUserOperation",
                code: -32500,
                message: "AA21 didn't pay prefund".into(),
            })
        }

        async fn estimate_user_operation_gas(
            &self,
            _op: &UserOperation,
        ) -> Result<UserOperationGasEstimate, BundlerError> {
            Ok(UserOperationGasEstimate {
                pre_verification_gas: U256::from(55_000),
                verification_gas_limit: U256::from(450_000),
                call_gas_limit: U256::from(35_000),
            })
        }

        async fn sponsor_user_operation(
            &self,
            _op: &UserOperation,
        ) -> Result<Sponsorship, PaymasterError> {
            Err(PaymasterError::Empty)
        }

        async fn get_user_operation_receipt(
            &self,
            _hash: B256,
        ) -> Result<Option<UserOperationReceipt>, BundlerError> {
            Ok(None)
        }
    }

    /// Never finishes a ceremony.
    #[derive(Debug)]
    struct Stalled;

    #[async_trait::async_trait]
    impl Authenticator for Stalled {
        async fn check_support(&self) -> Capabilities {
            Capabilities { available: true, platform_authenticator: true, secure_enclave: true }
        }

        async fn register(
            &self,
            _options: &RegistrationOptions,
        ) -> Result<Registration, CredentialError> {
            futures_util::future::pending().await
        }

        async fn authenticate(
            &self,
            _credential_id: &str,
            _challenge: B256,
        ) -> Result<Assertion, CredentialError> {
            futures_util::future::pending().await
        }
    }

    fn wallet_with(
        bundler: Arc<dyn Bundler>,
        authenticator: Arc<dyn Authenticator>,
    ) -> (Asserter, Wallet<DynProvider>) {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new().connect_mocked_client(asserter.clone()).erased();
        let wallet = Wallet::new(
            8453,
            AccountFactory::new(FACTORY, IMPLEMENTATION, provider.clone()),
            provider,
            bundler,
            authenticator,
            CredentialStore::new(Arc::new(InMemoryStore::default())),
        );
        (asserter, wallet)
    }

    fn wallet(authenticator: SoftAuthenticator) -> (Asserter, Wallet<DynProvider>) {
        wallet_with(Arc::new(Offline), Arc::new(authenticator))
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_ceremony_times_out() {
        let (_, wallet) = wallet_with(Arc::new(Offline), Arc::new(Stalled));
        assert_eq!(wallet.webauthn_timeout(), WEBAUTHN_TIMEOUT);
        let err = wallet.setup("alice", "Alice").await.unwrap_err();
        assert!(matches!(
            err,
            WalletError::Credential(CredentialError::Timeout(d)) if d == WEBAUTHN_TIMEOUT
        ));

        let wallet = wallet.with_webauthn_timeout(Duration::from_secs(5));
        let err = wallet.setup("alice", "Alice").await.unwrap_err();
        assert!(matches!(
            err,
            WalletError::Credential(CredentialError::Timeout(d)) if d == Duration::from_secs(5)
        ));
        assert!(wallet.credentials().load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn from_config_carries_every_section() {
        let vault = Address::repeat_byte(0x44);
        let mut config = WalletConfig::default()
            .with_chain_id(Some(84532))
            .with_factory(Some(FACTORY))
            .with_implementation(Some(IMPLEMENTATION))
            .with_bundler_url(Some("http://localhost:4337".parse().unwrap()))
            .with_paymaster(Some(PaymasterDialect::Pimlico))
            .with_policy_id(Some("sp_1".into()))
            .with_receipt_timeout(Some(Duration::from_secs(30)))
            .with_trusted_contracts(vec![TrustedContract::new(84532, vault, "Vault")])
            .with_relying_party(RelyingPartyConfig {
                id: "wallet.example".into(),
                name: "Example".into(),
                origin: "https://wallet.example".into(),
            });
        config.timeouts.webauthn = Duration::from_secs(20);

        let wallet = Wallet::from_config(
            &config,
            Arc::new(SoftAuthenticator::new("https://wallet.example")),
            Arc::new(InMemoryStore::default()),
        )
        .unwrap();
        assert_eq!(wallet.chain_id(), 84532);
        assert_eq!(wallet.allowlist().get(84532, vault), Some("Vault"));
        assert!(wallet.sponsorship().enabled);
        assert_eq!(wallet.receipt_timeout(), Duration::from_secs(30));
        assert_eq!(wallet.webauthn_timeout(), Duration::from_secs(20));
        assert_eq!(wallet.relying_party().origin, "https://wallet.example");

        assert!(Wallet::from_config(
            &WalletConfig::default(),
            Arc::new(SoftAuthenticator::new("https://localhost")),
            Arc::new(InMemoryStore::default()),
        )
        .is_err());
    }

    #[tokio::test]
    async fn assertion_from_another_origin_is_refused() {
        let (_, wallet) = wallet(SoftAuthenticator::new("https://evil.example"));
        let wallet = wallet.with_relying_party(RelyingPartyConfig {
            origin: "https://wallet.example".into(),
            ..Default::default()
        });
        wallet.setup("alice", "Alice").await.unwrap();

        let err = wallet.sign_message("vote", USDC, vec![]).await.unwrap_err();
        assert!(matches!(err, WalletError::Credential(CredentialError::InvalidAssertion(_))));
        assert!(wallet.credential().await.unwrap().last_used_at.is_none());
    }

    #[tokio::test]
    async fn signing_marks_used_even_when_bundler_refuses() {
        let authenticator = Arc::new(SoftAuthenticator::new("https://localhost"));
        let (asserter, wallet) = wallet_with(Arc::new(Refusing), authenticator);
        wallet.setup("alice", "Alice").await.unwrap();

        // eth_getCode, eth_gasPrice, eth_maxPriorityFeePerGas
        asserter.push_success(&Bytes::new());
        asserter.push_success(&"0x3b9aca00");
        asserter.push_success(&"0x5f5e100");

        let err = wallet.execute(&[Call::transfer(USDC, U256::ZERO)]).await.unwrap_err();
        assert!(matches!(err, WalletError::Bundler(BundlerError::Rejected { .. })));
        assert!(wallet.credential().await.unwrap().last_used_at.is_some());
    }

    #[tokio::test]
    async fn setup_registers_and_links() {
        let (_, wallet) = wallet(SoftAuthenticator::new("https://localhost"));
        let mut events = wallet.credentials().subscribe();

        let credential = wallet.setup("alice", "Alice").await.unwrap();
        let address = wallet.address().await.unwrap();
        assert_eq!(credential.wallet_address, Some(address));
        assert_eq!(wallet.credential().await.unwrap(), credential);

        assert!(matches!(events.recv().await.unwrap(), CredentialEvent::Registered { .. }));
        assert_eq!(
            events.recv().await.unwrap(),
            CredentialEvent::WalletLinked {
                credential_id: credential.credential_id.clone(),
                wallet_address: address
            }
        );
    }

    #[tokio::test]
    async fn second_setup_is_refused() {
        let (_, wallet) = wallet(SoftAuthenticator::new("https://localhost"));
        let first = wallet.setup("alice", "Alice").await.unwrap();

        let err = wallet.setup("alice", "Alice").await.unwrap_err();
        assert!(matches!(
            err,
            WalletError::Credential(CredentialError::AlreadyExists(ref id))
                if *id == first.credential_id
        ));
        assert_eq!(wallet.credential().await.unwrap(), first);
    }

    #[tokio::test]
    async fn unsupported_platform() {
        let authenticator =
            SoftAuthenticator::new("https://localhost").with_capabilities(Capabilities::default());
        let (_, wallet) = wallet(authenticator);
        let err = wallet.setup("alice", "Alice").await.unwrap_err();
        assert!(matches!(err, WalletError::Credential(CredentialError::NotSupported(_))));
        assert!(matches!(
            wallet.credential().await,
            Err(WalletError::Credential(CredentialError::NotFound))
        ));
    }

    #[tokio::test]
    async fn signs_messages_for_trusted_contracts() {
        let authenticator = SoftAuthenticator::new("https://localhost");
        let (_, wallet) = wallet(authenticator);
        wallet.setup("alice", "Alice").await.unwrap();

        let params = vec![PackedParam::Uint256(U256::from(1))];
        let (hash, signature) = wallet.sign_message("vote", USDC, params).await.unwrap();
        let expected = MessageHashBuilder::new("vote", 8453, USDC, wallet.address().await.unwrap())
            .param(PackedParam::Uint256(U256::from(1)))
            .build();
        assert_eq!(hash, expected);
        assert!(!signature.is_empty());
        assert!(wallet.credential().await.unwrap().last_used_at.is_some());

        let err = wallet
            .sign_message("vote", Address::repeat_byte(9), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Allowlist(_)));
    }

    #[tokio::test]
    async fn reads_deployment_fresh() {
        let (asserter, wallet) = wallet(SoftAuthenticator::new("https://localhost"));
        wallet.setup("alice", "Alice").await.unwrap();

        asserter.push_success(&Bytes::new());
        asserter.push_success(&Bytes::from_static(&[0x60, 0x80]));
        assert!(!wallet.is_deployed().await.unwrap());
        assert!(wallet.is_deployed().await.unwrap());
    }

    #[tokio::test]
    async fn reset_forgets_credential() {
        let (_, wallet) = wallet(SoftAuthenticator::new("https://localhost"));
        let credential = wallet.setup("alice", "Alice").await.unwrap();
        assert_eq!(wallet.reset().await.unwrap(), Some(credential.credential_id));
        assert!(wallet.credential().await.is_err());
        wallet.setup("alice", "Alice").await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_store_surfaces() {
        let store = InMemoryStore::with_entries([
            (crate::constants::LEGACY_CREDENTIAL_ID_KEY, "legacy"),
            (crate::constants::LEGACY_PUBLIC_KEY_KEY, "{}"),
        ]);
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new().connect_mocked_client(asserter).erased();
        let wallet = Wallet::new(
            8453,
            AccountFactory::new(FACTORY, IMPLEMENTATION, provider.clone()),
            provider,
            Arc::new(Offline),
            Arc::new(SoftAuthenticator::new("https://localhost")),
            CredentialStore::new(Arc::new(store)),
        );
        let err = wallet.credential().await.unwrap_err();
        assert!(matches!(err, WalletError::Storage(StorageError::SerdeError(_))));
    }
}
