use crate::{
    source::{
        BetSubmitter,
        PredictionSource,
    },
    types::{
        BetInfo,
        Epoch,
        Position,
        Price,
        Round,
        Wei,
    },
};
use alloy::{
    network::{
        EthereumWallet,
        ReceiptResponse,
    },
    primitives::{
        Address,
        I256,
        TxHash,
        U256,
    },
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use prediction_abi::{
    IPrediction,
    oracle_instance,
    prediction_instance,
};
use tracing::info;

/// Prediction contract bound to a JSON-RPC node, optionally with a signer.
#[derive(Clone)]
pub struct ChainClient {
    contract: IPrediction::IPredictionInstance<DynProvider>,
    provider: DynProvider,
    signer: Option<Address>,
    chain_id: u64,
}

impl ChainClient {
    /// Connects to `rpc_url` and binds the contract at `contract`. A node
    /// reporting a different chain than `expected_chain_id` is rejected.
    pub async fn connect(
        rpc_url: &str,
        contract: Address,
        signer: Option<PrivateKeySigner>,
        expected_chain_id: Option<u64>,
    ) -> Result<Self> {
        let url: Url = rpc_url
            .parse()
            .wrap_err_with(|| format!("invalid RPC URL {rpc_url}"))?;
        let signer_address = signer.as_ref().map(|signer| signer.address());
        let provider = match signer {
            Some(signer) => ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer))
                .connect_http(url)
                .erased(),
            None => ProviderBuilder::new().connect_http(url).erased(),
        };

        let chain_id = provider
            .get_chain_id()
            .await
            .wrap_err_with(|| format!("failed to reach node at {rpc_url}"))?;
        if let Some(expected) = expected_chain_id {
            if expected != chain_id {
                return Err(eyre!(
                    "Wrong network: node at {rpc_url} reports chain id {chain_id}, expected {expected}"
                ));
            }
        }
        info!(rpc_url, %contract, chain_id, signer = ?signer_address, "chain client ready");

        Ok(Self {
            contract: prediction_instance(contract, provider.clone()),
            provider,
            signer: signer_address,
            chain_id,
        })
    }

    pub fn contract_address(&self) -> Address {
        *self.contract.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

fn to_u64(value: U256, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| eyre!("{field} {value} does not fit in u64"))
}

fn to_wei(value: U256, field: &str) -> Result<Wei> {
    u128::try_from(value)
        .map(Wei)
        .map_err(|_| eyre!("{field} {value} does not fit in u128"))
}

fn to_price(value: I256, field: &str) -> Result<Price> {
    i128::try_from(value)
        .map(Price)
        .map_err(|_| eyre!("{field} {value} does not fit in i128"))
}

/// `rounds(epoch)` returns a zeroed struct for epochs that never started.
fn round_from_abi(raw: IPrediction::roundsReturn) -> Result<Option<Round>> {
    if raw.epoch.is_zero() {
        return Ok(None);
    }
    Ok(Some(Round {
        epoch: to_u64(raw.epoch, "epoch")?,
        start_timestamp: to_u64(raw.startTimestamp, "startTimestamp")?,
        lock_timestamp: to_u64(raw.lockTimestamp, "lockTimestamp")?,
        close_timestamp: to_u64(raw.closeTimestamp, "closeTimestamp")?,
        lock_price: to_price(raw.lockPrice, "lockPrice")?,
        close_price: to_price(raw.closePrice, "closePrice")?,
        total_amount: to_wei(raw.totalAmount, "totalAmount")?,
        bull_amount: to_wei(raw.bullAmount, "bullAmount")?,
        bear_amount: to_wei(raw.bearAmount, "bearAmount")?,
        oracle_called: raw.oracleCalled,
    }))
}

fn user_rounds_from_abi(
    epochs: Vec<U256>,
    infos: Vec<IPrediction::BetInfo>,
) -> Result<Vec<(Epoch, BetInfo)>> {
    if epochs.len() != infos.len() {
        return Err(eyre!(
            "getUserRounds returned {} epochs but {} bets",
            epochs.len(),
            infos.len()
        ));
    }
    epochs
        .into_iter()
        .zip(infos)
        .map(|(epoch, info)| {
            let epoch = to_u64(epoch, "epoch")?;
            let bet = BetInfo {
                position: Position::from_raw(info.position)
                    .wrap_err_with(|| format!("bet on epoch {epoch}"))?,
                amount: to_wei(info.amount, "amount")?,
                claimed: info.claimed,
            };
            Ok((epoch, bet))
        })
        .collect()
}

impl PredictionSource for ChainClient {
    async fn current_epoch(&self) -> Result<Epoch> {
        let epoch = self.contract.currentEpoch().call().await?;
        to_u64(epoch, "currentEpoch")
    }

    async fn min_bet_amount(&self) -> Result<Wei> {
        let amount = self.contract.minBetAmount().call().await?;
        to_wei(amount, "minBetAmount")
    }

    async fn paused(&self) -> Result<bool> {
        Ok(self.contract.paused().call().await?)
    }

    async fn oracle(&self) -> Result<Address> {
        Ok(self.contract.oracle().call().await?)
    }

    async fn latest_price(&self, oracle: Address) -> Result<Price> {
        let latest = oracle_instance(oracle, self.provider.clone())
            .latestRoundData()
            .call()
            .await?;
        to_price(latest.answer, "answer")
    }

    async fn round(&self, epoch: Epoch) -> Result<Option<Round>> {
        let raw = self.contract.rounds(U256::from(epoch)).call().await?;
        round_from_abi(raw).wrap_err_with(|| format!("decoding round {epoch}"))
    }

    async fn user_rounds_length(&self, user: Address) -> Result<u64> {
        let length = self.contract.getUserRoundsLength(user).call().await?;
        to_u64(length, "getUserRoundsLength")
    }

    async fn user_rounds(
        &self,
        user: Address,
        cursor: u64,
        size: u64,
    ) -> Result<Vec<(Epoch, BetInfo)>> {
        let page = self
            .contract
            .getUserRounds(user, U256::from(cursor), U256::from(size))
            .call()
            .await?;
        user_rounds_from_abi(page._0, page._1)
    }
}

impl BetSubmitter for ChainClient {
    fn bettor(&self) -> Option<Address> {
        self.signer
    }

    async fn place_bet(
        &self,
        position: Position,
        epoch: Epoch,
        amount: Wei,
    ) -> Result<TxHash> {
        let epoch_arg = U256::from(epoch);
        let value = U256::from(amount.0);
        let pending = match position {
            Position::Bull => self.contract.betBull(epoch_arg).value(value).send().await,
            Position::Bear => self.contract.betBear(epoch_arg).value(value).send().await,
        }
        .wrap_err("transaction was not accepted by the node")?;
        let tx_hash = *pending.tx_hash();
        info!(%tx_hash, %position, epoch, "bet transaction sent");

        let receipt = pending
            .get_receipt()
            .await
            .wrap_err_with(|| format!("waiting for receipt of {tx_hash} failed"))?;
        if !receipt.status() {
            return Err(eyre!("transaction {tx_hash} reverted"));
        }
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn raw_round(epoch: u64) -> IPrediction::roundsReturn {
        IPrediction::roundsReturn {
            epoch: U256::from(epoch),
            startTimestamp: U256::from(1_000u64),
            lockTimestamp: U256::from(1_300u64),
            closeTimestamp: U256::from(1_600u64),
            lockPrice: I256::try_from(7_185_000_000_000i64).unwrap(),
            closePrice: I256::try_from(-5i64).unwrap(),
            lockOracleId: U256::ZERO,
            closeOracleId: U256::ZERO,
            totalAmount: U256::from(3_000u64),
            bullAmount: U256::from(2_000u64),
            bearAmount: U256::from(1_000u64),
            rewardBaseCalAmount: U256::ZERO,
            rewardAmount: U256::ZERO,
            oracleCalled: true,
        }
    }

    #[test]
    fn round_from_abi__zero_epoch_is_missing() {
        assert_eq!(round_from_abi(raw_round(0)).unwrap(), None);
    }

    #[test]
    fn round_from_abi__converts_every_field() {
        // when
        let round = round_from_abi(raw_round(7)).unwrap().unwrap();

        // then
        assert_eq!(round.epoch, 7);
        assert_eq!(round.lock_timestamp, 1_300);
        assert_eq!(round.close_timestamp, 1_600);
        assert_eq!(round.lock_price, Price(7_185_000_000_000));
        assert_eq!(round.close_price, Price(-5));
        assert_eq!(round.total_amount, Wei(3_000));
        assert!(round.oracle_called);
    }

    #[test]
    fn round_from_abi__oversized_timestamp_is_an_error() {
        let raw = IPrediction::roundsReturn {
            lockTimestamp: U256::MAX,
            ..raw_round(7)
        };

        assert!(round_from_abi(raw).is_err());
    }

    #[test]
    fn user_rounds_from_abi__pairs_epochs_with_bets() {
        // given
        let epochs = vec![U256::from(3u64), U256::from(4u64)];
        let infos = vec![
            IPrediction::BetInfo {
                position: 0,
                amount: U256::from(10u64),
                claimed: true,
            },
            IPrediction::BetInfo {
                position: 1,
                amount: U256::from(20u64),
                claimed: false,
            },
        ];

        // when
        let bets = user_rounds_from_abi(epochs, infos).unwrap();

        // then
        assert_eq!(bets[0].0, 3);
        assert_eq!(bets[0].1.position, Position::Bull);
        assert!(bets[0].1.claimed);
        assert_eq!(bets[1].1.position, Position::Bear);
        assert_eq!(bets[1].1.amount, Wei(20));
    }

    #[test]
    fn user_rounds_from_abi__unknown_position_is_an_error() {
        let infos = vec![IPrediction::BetInfo {
            position: 2,
            amount: U256::from(10u64),
            claimed: false,
        }];

        let result = user_rounds_from_abi(vec![U256::from(3u64)], infos);

        assert!(result.is_err());
    }

    #[test]
    fn user_rounds_from_abi__mismatched_lengths_are_an_error() {
        let result = user_rounds_from_abi(vec![U256::from(3u64)], Vec::new());

        assert!(result.is_err());
    }
}
