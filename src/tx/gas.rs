//! Fee overrides: resolution against network fee data and escalation on retry

use ethers::types::U256;
use serde::Serialize;

/// Base fee assumed when the network reports neither EIP-1559 nor legacy pricing, in gwei
pub const FALLBACK_BASE_FEE_GWEI: u64 = 50;

/// Convert a gwei amount to wei
pub fn gwei(amount: u64) -> U256 {
    U256::from(amount) * U256::exp10(9)
}

/// Snapshot of the network's fee suggestion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeData {
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

impl FeeData {
    fn eip1559(&self) -> Option<(U256, U256)> {
        self.max_fee_per_gas.zip(self.max_priority_fee_per_gas)
    }
}

/// Fee and gas-limit overrides attached to a submission, in wei.
///
/// Transforms always return a fresh value. [`bump_fees`] and a network-derived
/// [`resolve_fees`] result never carry `gas_price` alongside EIP-1559 fees. The one
/// exception is caller input: when both EIP-1559 fields are supplied, [`resolve_fees`]
/// returns the value untouched, so a legacy `gas_price` set next to them survives
/// until the first bump. On submission the EIP-1559 fields take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeeOverrides {
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    /// Legacy gas price
    pub gas_price: Option<U256>,
    pub gas_limit: Option<U256>,
}

impl FeeOverrides {
    pub fn eip1559(max_fee_per_gas: U256, max_priority_fee_per_gas: U256) -> Self {
        Self {
            max_fee_per_gas: Some(max_fee_per_gas),
            max_priority_fee_per_gas: Some(max_priority_fee_per_gas),
            ..Self::default()
        }
    }

    pub fn legacy(gas_price: U256) -> Self {
        Self {
            gas_price: Some(gas_price),
            ..Self::default()
        }
    }

    pub fn with_gas_limit(&self, gas_limit: impl Into<U256>) -> Self {
        Self {
            gas_limit: Some(gas_limit.into()),
            ..self.clone()
        }
    }

    /// Whether both EIP-1559 fields are present
    pub fn has_eip1559(&self) -> bool {
        self.max_fee_per_gas.is_some() && self.max_priority_fee_per_gas.is_some()
    }

    /// Upper bound on what the submission can cost, if the limit and a price are known
    pub fn max_cost(&self) -> Option<U256> {
        let price = self.max_fee_per_gas.or(self.gas_price)?;
        Some(self.gas_limit? * price)
    }
}

/// Resolve the fees for a submission.
///
/// Caller-supplied EIP-1559 fees win. Otherwise the network's EIP-1559 suggestion is
/// adopted; failing that, `max_fee = base + priority` over the legacy price (or the
/// fixed fallback base fee). The result never carries a legacy gas price unless the
/// caller's own EIP-1559 overrides are returned untouched.
pub fn resolve_fees(current: &FeeOverrides, network: &FeeData, priority_fee: U256) -> FeeOverrides {
    if current.has_eip1559() {
        return current.clone();
    }

    let (max_fee_per_gas, max_priority_fee_per_gas) = match network.eip1559() {
        Some(fees) => fees,
        None => {
            let base = network.gas_price.unwrap_or_else(|| gwei(FALLBACK_BASE_FEE_GWEI));
            (base.saturating_add(priority_fee), priority_fee)
        }
    };

    FeeOverrides {
        max_fee_per_gas: Some(max_fee_per_gas),
        max_priority_fee_per_gas: Some(max_priority_fee_per_gas),
        gas_price: None,
        gas_limit: current.gas_limit,
    }
}

/// Scale the EIP-1559 fees by `multiplier` in whole percent, truncating
pub fn bump_fees(overrides: &FeeOverrides, multiplier: f64) -> FeeOverrides {
    let percent = U256::from((multiplier * 100.0).round().max(0.0) as u64);
    let scale = |fee: U256| fee.saturating_mul(percent) / 100;

    FeeOverrides {
        max_fee_per_gas: overrides.max_fee_per_gas.map(scale),
        max_priority_fee_per_gas: overrides.max_priority_fee_per_gas.map(scale),
        gas_price: None,
        gas_limit: overrides.gas_limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_eip1559_overrides_are_kept() {
        let current = FeeOverrides::eip1559(gwei(100), gwei(2)).with_gas_limit(21_000u64);
        let network = FeeData {
            gas_price: Some(gwei(7)),
            max_fee_per_gas: Some(gwei(9)),
            max_priority_fee_per_gas: Some(gwei(1)),
        };

        let resolved = resolve_fees(&current, &network, gwei(30));
        assert_eq!(resolved, current);
        assert_eq!(resolve_fees(&resolved, &network, gwei(30)), resolved);
    }

    #[test]
    fn test_network_eip1559_fees_are_adopted() {
        let current = FeeOverrides::legacy(gwei(80)).with_gas_limit(500_000u64);
        let network = FeeData {
            gas_price: Some(gwei(40)),
            max_fee_per_gas: Some(gwei(61)),
            max_priority_fee_per_gas: Some(gwei(3)),
        };

        let resolved = resolve_fees(&current, &network, gwei(30));
        assert_eq!(resolved.max_fee_per_gas, Some(gwei(61)));
        assert_eq!(resolved.max_priority_fee_per_gas, Some(gwei(3)));
        assert_eq!(resolved.gas_price, None);
        assert_eq!(resolved.gas_limit, Some(U256::from(500_000u64)));
    }

    #[test]
    fn test_legacy_network_price_becomes_base_fee() {
        let network = FeeData {
            gas_price: Some(gwei(40)),
            ..FeeData::default()
        };

        let resolved = resolve_fees(&FeeOverrides::default(), &network, gwei(30));
        assert_eq!(resolved.max_fee_per_gas, Some(gwei(70)));
        assert_eq!(resolved.max_priority_fee_per_gas, Some(gwei(30)));
        assert_eq!(resolved.gas_price, None);
    }

    #[test]
    fn test_caller_overrides_with_legacy_price_survive_until_bump() {
        let current = FeeOverrides {
            gas_price: Some(gwei(40)),
            ..FeeOverrides::eip1559(gwei(100), gwei(2))
        };

        let resolved = resolve_fees(&current, &FeeData::default(), gwei(30));
        assert_eq!(resolved, current);
        assert_eq!(resolved.gas_price, Some(gwei(40)));

        let bumped = bump_fees(&resolved, 1.2);
        assert_eq!(bumped.gas_price, None);
        assert_eq!(bumped.max_fee_per_gas, Some(gwei(120)));
    }

    #[test]
    fn test_fallback_base_fee_without_network_data() {
        let priority = gwei(30);
        let resolved = resolve_fees(&FeeOverrides::default(), &FeeData::default(), priority);
        assert_eq!(resolved.max_fee_per_gas, Some(gwei(FALLBACK_BASE_FEE_GWEI) + priority));
        assert_eq!(resolved.max_priority_fee_per_gas, Some(priority));
    }

    #[test]
    fn test_partial_caller_overrides_are_replaced() {
        let current = FeeOverrides {
            max_fee_per_gas: Some(gwei(500)),
            ..FeeOverrides::default()
        };
        let resolved = resolve_fees(&current, &FeeData::default(), gwei(30));
        assert_eq!(resolved.max_fee_per_gas, Some(gwei(80)));
    }

    #[test]
    fn test_bump_scales_by_truncated_percentage() {
        let overrides = FeeOverrides {
            max_fee_per_gas: Some(U256::from(1_001u64)),
            max_priority_fee_per_gas: Some(U256::from(99u64)),
            gas_price: Some(U256::from(5u64)),
            gas_limit: Some(U256::from(10u64)),
        };

        let bumped = bump_fees(&overrides, 1.2);
        assert_eq!(bumped.max_fee_per_gas, Some(U256::from(1_201u64)));
        assert_eq!(bumped.max_priority_fee_per_gas, Some(U256::from(118u64)));
        assert_eq!(bumped.gas_price, None);
        assert_eq!(bumped.gas_limit, Some(U256::from(10u64)));

        // input untouched
        assert_eq!(overrides.gas_price, Some(U256::from(5u64)));
    }

    #[test]
    fn test_bump_leaves_absent_fields_absent() {
        let bumped = bump_fees(&FeeOverrides::legacy(gwei(10)), 1.2);
        assert_eq!(bumped, FeeOverrides::default());
    }

    #[test]
    fn test_repeated_bumps_do_not_drift() {
        let mut fees = FeeOverrides::eip1559(gwei(80), gwei(30));
        for _ in 0..3 {
            fees = bump_fees(&fees, 1.2);
        }
        // 80 * 1.2^3 = 138.24 gwei, exact in integer percent steps
        assert_eq!(fees.max_fee_per_gas, Some(U256::from(138_240_000_000u64)));
        assert_eq!(fees.max_priority_fee_per_gas, Some(U256::from(51_840_000_000u64)));
    }

    #[test]
    fn test_max_cost() {
        let fees = FeeOverrides::eip1559(gwei(2), gwei(1)).with_gas_limit(21_000u64);
        assert_eq!(fees.max_cost(), Some(gwei(42_000)));
        assert_eq!(FeeOverrides::eip1559(gwei(2), gwei(1)).max_cost(), None);
    }
}
