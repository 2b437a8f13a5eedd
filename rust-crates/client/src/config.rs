use crate::poller::POLL_INTERVAL;
use alloy::primitives::Address;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentEnv,
    DeploymentStore,
};
use std::{
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_POLYGON_RPC_URL: &str = "https://polygon-rpc.com";
pub const DEFAULT_AMOY_RPC_URL: &str = "https://rpc-amoy.polygon.technology";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545/";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkTarget {
    Polygon { url: String },
    Amoy { url: String },
    LocalNode { url: String },
}

impl NetworkTarget {
    pub fn new(env: DeploymentEnv, url: Option<String>) -> Self {
        match env {
            DeploymentEnv::Polygon => NetworkTarget::Polygon {
                url: url.unwrap_or_else(|| DEFAULT_POLYGON_RPC_URL.to_string()),
            },
            DeploymentEnv::Amoy => NetworkTarget::Amoy {
                url: url.unwrap_or_else(|| DEFAULT_AMOY_RPC_URL.to_string()),
            },
            DeploymentEnv::Local => NetworkTarget::LocalNode {
                url: url.unwrap_or_else(|| DEFAULT_LOCAL_RPC_URL.to_string()),
            },
        }
    }

    pub fn url(&self) -> &str {
        match self {
            NetworkTarget::Polygon { url }
            | NetworkTarget::Amoy { url }
            | NetworkTarget::LocalNode { url } => url,
        }
    }

    pub fn env(&self) -> DeploymentEnv {
        match self {
            NetworkTarget::Polygon { .. } => DeploymentEnv::Polygon,
            NetworkTarget::Amoy { .. } => DeploymentEnv::Amoy,
            NetworkTarget::LocalNode { .. } => DeploymentEnv::Local,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletConfig {
    /// Encrypted JSON keystore; bets are signed with it.
    Keystore { name: String, dir: PathBuf },
    /// Read-only view of another account's bets.
    WatchOnly { address: Address },
    None,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub wallet: WalletConfig,
    pub contract: Option<Address>,
    pub poll_interval: Duration,
}

impl AppConfig {
    pub fn new(network: NetworkTarget) -> Self {
        Self {
            network,
            wallet: WalletConfig::None,
            contract: None,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Contract to talk to and the chain id its node must report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContractTarget {
    pub address: Address,
    pub expected_chain_id: Option<u64>,
}

/// An explicit address wins; otherwise the network's deployment record is used.
pub fn resolve_contract(
    config: &AppConfig,
    store: &DeploymentStore,
) -> Result<ContractTarget> {
    let env = config.network.env();
    if let Some(address) = config.contract {
        return Ok(ContractTarget {
            address,
            expected_chain_id: env.default_chain_id(),
        });
    }

    let record = store
        .load()
        .map_err(|err| eyre!("{err:#}"))
        .wrap_err_with(|| format!("reading {}", store.path().display()))?
        .ok_or_else(|| {
            eyre!(
                "No contract recorded for {env}; pass --contract or run `prediction register`"
            )
        })?;
    let address = record
        .contract_address
        .parse::<Address>()
        .wrap_err_with(|| format!("invalid contract address {}", record.contract_address))?;
    Ok(ContractTarget {
        address,
        expected_chain_id: record.chain_id.or(env.default_chain_id()),
    })
}
