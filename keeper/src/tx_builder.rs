//! Atomic execution payload for rebalances
//!
//! Four calls executed as one bundle: approve collateral to the router, swap
//! collateral for the exact repay amount, approve the underlying to the loan
//! token, deposit into the loan token to burn debt.

use risk_model::{TokenRegistry, Vault, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ExecutionConfig;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("call encoding failed: {0}")]
    Encode(#[from] bincode::Error),

    #[error("no address for {symbol}")]
    MissingAddress { symbol: String },
}

fn address_of<'a>(registry: &'a TokenRegistry, symbol: &str) -> Result<&'a str, PayloadError> {
    registry
        .get(symbol)
        .map(|a| a.address.as_str())
        .map_err(|_| PayloadError::MissingAddress { symbol: symbol.to_string() })
}

/// Decoded form of a call's `data`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallIntent {
    Approve {
        spender: String,
        amount: U256,
    },
    ExactOutputSingle {
        token_in: String,
        token_out: String,
        fee: u32,
        recipient: String,
        deadline: u64,
        amount_out: U256,
        amount_in_maximum: U256,
    },
    Deposit {
        assets: U256,
        receiver: String,
    },
}

impl CallIntent {
    /// bs58(bincode(intent))
    pub fn encode(&self) -> Result<String, PayloadError> {
        let bytes = bincode::serialize(self)?;
        Ok(bs58::encode(bytes).into_string())
    }

    pub fn decode(data: &str) -> Option<Self> {
        let bytes = bs58::decode(data).into_vec().ok()?;
        bincode::deserialize(&bytes).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallData {
    pub target: String,
    pub value: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicExecution {
    #[serde(rename = "type")]
    pub kind: String,
    pub bundler: String,
    pub calls: Vec<CallData>,
}

/// Amounts a rebalance moves, in base units
#[derive(Debug, Clone, Copy)]
pub struct SwapAmounts {
    /// Collateral sold (swap input ceiling)
    pub sell_base: U256,
    /// Underlying bought and deposited
    pub repay_base: U256,
}

fn call(target: &str, intent: &CallIntent) -> Result<CallData, PayloadError> {
    Ok(CallData {
        target: target.to_string(),
        value: "0x0".to_string(),
        data: intent.encode()?,
    })
}

/// Build the multicall bundle for one vault
///
/// `now_secs` is the unix time the swap deadline counts from.
pub fn build_atomic_execution(
    vault: &Vault,
    registry: &TokenRegistry,
    exec: &ExecutionConfig,
    amounts: SwapAmounts,
    now_secs: u64,
) -> Result<AtomicExecution, PayloadError> {
    let collateral = address_of(registry, &vault.collateral.asset)?;
    let underlying = address_of(registry, registry.underlying_price_symbol(&vault.debt.asset))?;
    let loan_token = address_of(registry, &vault.debt.asset)?;

    let calls = vec![
        call(
            collateral,
            &CallIntent::Approve {
                spender: exec.router_address.clone(),
                amount: amounts.sell_base,
            },
        )?,
        call(
            &exec.router_address,
            &CallIntent::ExactOutputSingle {
                token_in: collateral.to_string(),
                token_out: underlying.to_string(),
                fee: exec.swap_fee_tier,
                recipient: exec.executor_address.clone(),
                deadline: now_secs + exec.deadline_secs,
                amount_out: amounts.repay_base,
                amount_in_maximum: amounts.sell_base,
            },
        )?,
        call(
            underlying,
            &CallIntent::Approve {
                spender: loan_token.to_string(),
                amount: amounts.repay_base,
            },
        )?,
        call(
            loan_token,
            &CallIntent::Deposit {
                assets: amounts.repay_base,
                receiver: loan_token.to_string(),
            },
        )?,
    ];

    Ok(AtomicExecution {
        kind: "multicall".to_string(),
        bundler: exec.bundler.clone(),
        calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SeedState;

    fn build(vault_idx: usize) -> AtomicExecution {
        let seed = SeedState::default_seed().unwrap();
        build_atomic_execution(
            &seed.vaults[vault_idx],
            &seed.registry,
            &ExecutionConfig::default(),
            SwapAmounts {
                sell_base: U256::from(2_000_000_000_000_000_000u64),
                repay_base: U256::from(4_000_000_000u64),
            },
            1_700_000_000,
        )
        .unwrap()
    }

    #[test]
    fn test_four_calls_in_order() {
        let exec = build(0);
        let cfg = ExecutionConfig::default();

        assert_eq!(exec.kind, "multicall");
        assert_eq!(exec.bundler, "Morpho Bundler");
        assert_eq!(exec.calls.len(), 4);
        assert_eq!(exec.calls[0].target, "0xc1cba3fcea344f02d92366546156461897602fe4");
        assert_eq!(exec.calls[1].target, cfg.router_address);
        // USDC, the loan token's underlying
        assert_eq!(exec.calls[2].target, "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913");
        assert_eq!(exec.calls[3].target, "0x1234567890123456789012345678901234567890");
        assert!(exec.calls.iter().all(|c| c.value == "0x0"));
    }

    #[test]
    fn test_swap_intent_decodes() {
        let exec = build(1);
        let intent = CallIntent::decode(&exec.calls[1].data).unwrap();

        match intent {
            CallIntent::ExactOutputSingle { fee, deadline, amount_out, amount_in_maximum, token_out, .. } => {
                assert_eq!(fee, 500);
                assert_eq!(deadline, 1_700_000_600);
                assert_eq!(amount_out, U256::from(4_000_000_000u64));
                assert_eq!(amount_in_maximum, U256::from(2_000_000_000_000_000_000u64));
                // WETH for the bETH vault
                assert_eq!(token_out, "0x4200000000000000000000000000000000000006");
            }
            other => panic!("unexpected intent {:?}", other),
        }
    }

    #[test]
    fn test_deposit_receiver_is_loan_token() {
        let exec = build(0);
        let intent = CallIntent::decode(&exec.calls[3].data).unwrap();
        assert_eq!(
            intent,
            CallIntent::Deposit {
                assets: U256::from(4_000_000_000u64),
                receiver: "0x1234567890123456789012345678901234567890".to_string(),
            }
        );
    }

    #[test]
    fn test_unregistered_asset() {
        let seed = SeedState::default_seed().unwrap();
        let err = build_atomic_execution(
            &seed.vaults[0],
            &risk_model::TokenRegistry::new(),
            &ExecutionConfig::default(),
            SwapAmounts { sell_base: U256::ZERO, repay_base: U256::ZERO },
            0,
        )
        .unwrap_err();
        assert!(matches!(err, PayloadError::MissingAddress { symbol } if symbol == "wstETH"));
    }

    #[test]
    fn test_garbage_data_does_not_decode() {
        assert!(CallIntent::decode("not-base58-0OIl").is_none());
    }
}
