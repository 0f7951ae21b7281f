use crate::errors::AppError;
use crate::log_warn;
use crate::models::Chain;
use ethers_core::types::H160;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;

#[derive(Debug, Deserialize)]
struct AllowlistFile {
    #[serde(default)]
    chains: HashMap<String, AddressList>,
}

#[derive(Debug, Deserialize)]
struct AddressList {
    addresses: Vec<String>,
}

/// 每条链允许交互的合约地址（启动时加载一次，运行期不可变）
#[derive(Debug, Clone, Default)]
pub struct AllowlistConfig {
    contracts: HashMap<Chain, HashSet<H160>>,
}

impl AllowlistConfig {
    pub fn load(path: &str) -> Result<Self, AppError> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("无法读取白名单文件 '{}': {}", path, e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, AppError> {
        let file: AllowlistFile = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("白名单格式错误: {}", e)))?;

        let mut contracts = HashMap::new();
        for (name, list) in file.chains {
            let chain: Chain = name.parse()?;
            let mut set = HashSet::new();
            for addr in &list.addresses {
                match addr.parse::<H160>() {
                    Ok(a) => {
                        set.insert(a);
                    }
                    Err(_) => {
                        // 非法地址直接拒绝加载，避免白名单被静默缩小
                        return Err(AppError::InvalidAddress(format!("{}: {}", chain, addr)));
                    }
                }
            }
            if set.is_empty() {
                log_warn!("链 {} 的白名单为空，该链所有交易都会被拒绝", chain);
            }
            contracts.insert(chain, set);
        }
        Ok(Self { contracts })
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Chain, H160)>) -> Self {
        let mut contracts: HashMap<Chain, HashSet<H160>> = HashMap::new();
        for (chain, addr) in entries {
            contracts.entry(chain).or_default().insert(addr);
        }
        Self { contracts }
    }

    pub fn is_allowed(&self, chain: Chain, address: &H160) -> bool {
        self.contracts
            .get(&chain)
            .is_some_and(|set| set.contains(address))
    }

    pub fn len(&self, chain: Chain) -> usize {
        self.contracts.get(&chain).map_or(0, HashSet::len)
    }
}
