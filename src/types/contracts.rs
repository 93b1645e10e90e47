//! ABI registry of the contracts the wallet talks to.

use alloy::sol;

sol! {
    /// The passkey-owned smart account.
    #[sol(rpc)]
    #[derive(Debug)]
    contract ISmartAccount {
        /// Executes a single call from the account.
        function execute(address target, uint256 value, bytes calldata data) external payable;

        /// Executes a batch of calls from the account.
        function executeBatch(
            address[] calldata targets,
            uint256[] calldata values,
            bytes[] calldata data
        ) external payable;

        /// Returns the EntryPoint nonce of the account.
        function getNonce() external view returns (uint256);

        /// Legacy nonce accessor exposed by older account implementations.
        function nonce() external view returns (uint256);

        /// Returns the raw owner bytes of every owner.
        function getOwners() external view returns (bytes[] memory);

        /// Registers a secp256r1 key as an additional owner.
        function registerSecp256r1Key(bytes32 x, bytes32 y) external;

        /// Returns the address derived for a registered secp256r1 key.
        function secp256r1ToAddress(bytes32 keyHash) external view returns (address);
    }
}

sol! {
    /// The CREATE2 account factory.
    #[sol(rpc)]
    #[derive(Debug)]
    contract IAccountFactory {
        /// Deploys an account for `owner` at its counterfactual address.
        ///
        /// Returns the existing account if it is already deployed.
        function createAccount(bytes calldata owner, uint256 salt)
            external
            payable
            returns (address account);

        /// Returns the counterfactual address of the account for `owner` and `salt`.
        function getAddress(bytes calldata owner, uint256 salt) external view returns (address);

        /// Whether the factory deployed an account at `wallet`.
        function isWalletDeployed(address wallet) external view returns (bool);
    }
}
