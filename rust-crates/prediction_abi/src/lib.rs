use alloy::{
    primitives::Address,
    providers::Provider,
    sol,
};

/// Raw `position` value the contract stores for a bull bet.
pub const POSITION_BULL: u8 = 0;
/// Raw `position` value the contract stores for a bear bet.
pub const POSITION_BEAR: u8 = 1;
/// Decimals of the oracle answer and of the round lock/close prices.
pub const PRICE_DECIMALS: u32 = 8;

sol! {
    #[sol(rpc)]
    interface IPrediction {
        struct BetInfo {
            uint8 position;
            uint256 amount;
            bool claimed;
        }

        function currentEpoch() external view returns (uint256);
        function minBetAmount() external view returns (uint256);
        function paused() external view returns (bool);
        function oracle() external view returns (address);

        function rounds(uint256 epoch) external view returns (
            uint256 epoch,
            uint256 startTimestamp,
            uint256 lockTimestamp,
            uint256 closeTimestamp,
            int256 lockPrice,
            int256 closePrice,
            uint256 lockOracleId,
            uint256 closeOracleId,
            uint256 totalAmount,
            uint256 bullAmount,
            uint256 bearAmount,
            uint256 rewardBaseCalAmount,
            uint256 rewardAmount,
            bool oracleCalled
        );

        function getUserRoundsLength(address user) external view returns (uint256);
        function getUserRounds(address user, uint256 cursor, uint256 size)
            external view returns (uint256[] memory, BetInfo[] memory, uint256);

        function betBull(uint256 epoch) external payable;
        function betBear(uint256 epoch) external payable;
    }

    #[sol(rpc)]
    interface AggregatorV3Interface {
        function latestRoundData() external view returns (
            uint80 roundId,
            int256 answer,
            uint256 startedAt,
            uint256 updatedAt,
            uint80 answeredInRound
        );
    }
}

pub fn prediction_instance<P: Provider>(
    address: Address,
    provider: P,
) -> IPrediction::IPredictionInstance<P> {
    IPrediction::new(address, provider)
}

pub fn oracle_instance<P: Provider>(
    address: Address,
    provider: P,
) -> AggregatorV3Interface::AggregatorV3InterfaceInstance<P> {
    AggregatorV3Interface::new(address, provider)
}
