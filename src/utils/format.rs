use bigdecimal::BigDecimal;
use ethers_core::types::U256;
use std::str::FromStr;

/// 将U256 转为 BigDecimal
pub fn u256_to_bigdecimal(value: U256) -> BigDecimal {
    // 先转字符串再转 BigDecimal，处理大数最稳
    let s = value.to_string();
    BigDecimal::from_str(&s).unwrap_or_else(|_| BigDecimal::from(0))
}

/// BigDecimal 截断小数部分后转 U256，负数按 0 处理
pub fn bigdecimal_to_u256(value: &BigDecimal) -> U256 {
    let truncated = value.with_scale(0);
    if truncated < BigDecimal::from(0) {
        return U256::zero();
    }
    let (digits, _) = truncated.into_bigint_and_exponent();
    U256::from_dec_str(&digits.to_string()).unwrap_or(U256::MAX)
}
