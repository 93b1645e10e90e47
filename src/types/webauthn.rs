use alloy::sol;

sol! {
    /// A WebAuthn assertion as verified by the account.
    #[derive(Debug, PartialEq, Eq)]
    struct WebAuthnAuth {
        /// The WebAuthn authenticator data.
        /// See: <https://www.w3.org/TR/webauthn-2/#sctn-authenticator-data>
        bytes authenticatorData;
        /// The WebAuthn client data JSON.
        /// See: https://www.w3.org/TR/webauthn-2/#dom-authenticatorresponse-clientdatajson.
        string clientDataJSON;
        /// Start index of "challenge":"..." in `clientDataJSON`.
        uint256 challengeIndex;
        /// Start index of "type":"..." in `clientDataJSON`.
        uint256 typeIndex;
        /// The r value of secp256r1 signature.
        uint256 r;
        /// The s value of secp256r1 signature, low-S.
        uint256 s;
    }

    /// The `signature` field of a user operation.
    #[derive(Debug, PartialEq, Eq)]
    struct SignatureWrapper {
        /// Index of the signing owner in the account's owner list.
        uint256 ownerIndex;
        /// `abi.encode(WebAuthnAuth)`.
        bytes signatureData;
    }
}
