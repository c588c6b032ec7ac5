//! EVM contract ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the stablecoin
//! and the LayerZero Aptos token bridge.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;

sol! {
    /// Minimal ERC20 surface used by the bridge legs and the custodial deposit
    #[sol(rpc)]
    contract IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

sol! {
    /// LayerZero refund / ZRO payment addresses
    struct LzCallParams {
        address refundAddress;
        address zroPaymentAddress;
    }

    /// LayerZero token bridge towards Aptos
    #[sol(rpc)]
    contract AptosBridge {
        /// Lock `amountLD` of `token` and deliver it to `toAddress` on Aptos
        function sendToAptos(
            address token,
            bytes32 toAddress,
            uint256 amountLD,
            LzCallParams callParams,
            bytes adapterParams
        ) external payable;

        /// Native (and ZRO) messaging fee for a send with these adapter params
        function quoteForSend(
            LzCallParams callParams,
            bytes adapterParams
        ) external view returns (uint256 nativeFee, uint256 zroFee);
    }
}

/// Destination gas for the Aptos-side `lz_receive`
pub const APTOS_RECEIVE_GAS: u64 = 10_000;

/// Version 2 adapter params: `uint16 2 | uint256 gas | uint256 airdrop | address`
pub fn adapter_params(airdrop: U256, airdrop_receiver: Address) -> Bytes {
    let mut out = Vec::with_capacity(2 + 32 + 32 + 20);
    out.extend_from_slice(&2u16.to_be_bytes());
    out.extend_from_slice(&U256::from(APTOS_RECEIVE_GAS).to_be_bytes::<32>());
    out.extend_from_slice(&airdrop.to_be_bytes::<32>());
    out.extend_from_slice(airdrop_receiver.as_slice());
    Bytes::from(out)
}

/// Refund to the sender, no ZRO payment
pub fn call_params(refund: Address) -> LzCallParams {
    LzCallParams {
        refundAddress: refund,
        zroPaymentAddress: Address::ZERO,
    }
}
