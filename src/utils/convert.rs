use crate::errors::AppError;
use crate::utils::format::{bigdecimal_to_u256, u256_to_bigdecimal};
use bigdecimal::{BigDecimal, ToPrimitive};
use ethers_core::types::U256;
use std::str::FromStr;

const WEI_PER_GWEI: u64 = 1_000_000_000;
const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;

pub fn u256_to_u64(value: U256) -> Result<u64, AppError> {
    if value > U256::from(u64::MAX) {
        return Err(AppError::Conversion(format!("U256({}) 超出u64范围", value)));
    }
    Ok(value.as_u64())
}

/// wei → gwei（浮点，仅用于阈值比较与展示）
pub fn wei_to_gwei(wei: U256) -> f64 {
    (u256_to_bigdecimal(wei) / BigDecimal::from(WEI_PER_GWEI))
        .to_f64()
        .unwrap_or(f64::MAX)
}

/// gwei → wei，非法值（负数/NaN）按 0 处理
pub fn gwei_to_wei(gwei: f64) -> U256 {
    if !gwei.is_finite() || gwei <= 0.0 {
        return U256::zero();
    }
    match BigDecimal::from_str(&format!("{:.9}", gwei)) {
        Ok(v) => bigdecimal_to_u256(&(v * BigDecimal::from(WEI_PER_GWEI))),
        Err(_) => U256::zero(),
    }
}

/// 以原生代币美元价格折算 wei 成本
pub fn wei_to_usd(wei: U256, native_price_usd: f64) -> f64 {
    if !native_price_usd.is_finite() || native_price_usd <= 0.0 {
        return 0.0;
    }
    let price = match BigDecimal::from_str(&native_price_usd.to_string()) {
        Ok(p) => p,
        Err(_) => return 0.0,
    };
    let native = u256_to_bigdecimal(wei) / BigDecimal::from(WEI_PER_ETHER);
    (native * price).to_f64().unwrap_or(0.0)
}

/// 按整数百分比缩放（100 = 不变），结果向下取整，溢出时饱和为 U256::MAX
pub fn scale_percent(value: U256, percent: u128) -> U256 {
    let hundred = U256::from(100u64);
    let percent = U256::from(percent);
    // value = 100q + r，先除后乘避免中间值溢出
    let (q, r) = value.div_mod(hundred);
    q.saturating_mul(percent)
        .saturating_add(r * percent / hundred)
}
