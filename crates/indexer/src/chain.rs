//! Protocol and ERC-20 reads backing the engine's [`ProtocolReader`].
//!
//! Every call is pinned to the block of the notification being processed so
//! redelivered notifications read the same values as the first delivery.

use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::rpc::types::BlockId;
use alloy::sol;

use fxvault_common::error::ReadError;
use fxvault_common::types::{TokenId, TokenKind};
use fxvault_engine::handlers::ProtocolReader;
use fxvault_engine::rates::TokenMetadata;

sol! {
    #[sol(rpc)]
    interface IHandle {
        struct CollateralData {
            uint256 mintCR;
            uint256 liquidationFee;
            uint256 interestRate;
        }

        function getDebt(address account, address fxToken) external view returns (uint256);
        function getCollateralBalance(address account, address collateralType, address fxToken) external view returns (uint256);
        function getCollateralDetails(address collateral) external view returns (CollateralData memory);
        function isFxTokenValid(address fxToken) external view returns (bool);
        function isCollateralValid(address collateral) external view returns (bool);
        function totalBalances(address collateral) external view returns (uint256);
        function getAllCollateralTypes() external view returns (address[] memory);
    }

    #[sol(rpc)]
    interface IKeeperPool {
        function getPoolTotalDeposit(address fxToken) external view returns (uint256);
        function balanceOfStake(address account, address fxToken) external view returns (uint256);
        function getPoolCollateralBalance(address fxToken, address collateral) external view returns (uint256);
    }

    #[sol(rpc)]
    interface IERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
    }
}

fn read_error(error: alloy::contract::Error) -> ReadError {
    if error.as_revert_data().is_some() {
        ReadError::Reverted(error.to_string())
    } else {
        ReadError::Transport(error.to_string())
    }
}

/// Keep a successful read, log and drop a failed one.
fn logged<T>(token: TokenId, field: &'static str, result: Result<T, alloy::contract::Error>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(token = %token, field, error = %read_error(e), "Token metadata read failed");
            None
        }
    }
}

/// Reads protocol state through an alloy provider.
#[derive(Clone)]
pub struct ChainReader<P> {
    provider: P,
    protocol: Address,
}

impl<P: Provider + Clone> ChainReader<P> {
    pub fn new(provider: P, protocol: Address) -> Self {
        Self { provider, protocol }
    }

    fn handle(&self) -> IHandle::IHandleInstance<P> {
        IHandle::new(self.protocol, self.provider.clone())
    }

    fn keeper_pool(&self, pool: Address) -> IKeeperPool::IKeeperPoolInstance<P> {
        IKeeperPool::new(pool, self.provider.clone())
    }

    fn erc20(&self, token: TokenId) -> IERC20::IERC20Instance<P> {
        IERC20::new(token.0, self.provider.clone())
    }
}

impl<P: Provider + Clone> ProtocolReader for ChainReader<P> {
    async fn debt(&self, account: Address, token: TokenId, block: u64) -> Result<U256, ReadError> {
        self.handle()
            .getDebt(account, token.0)
            .call()
            .block(BlockId::number(block))
            .await
            .map_err(read_error)
    }

    async fn collateral_balance(
        &self,
        account: Address,
        synthetic: TokenId,
        collateral: TokenId,
        block: u64,
    ) -> Result<U256, ReadError> {
        self.handle()
            .getCollateralBalance(account, collateral.0, synthetic.0)
            .call()
            .block(BlockId::number(block))
            .await
            .map_err(read_error)
    }

    async fn token_metadata(&self, token: TokenId, kind: TokenKind, block: u64) -> TokenMetadata {
        let at = BlockId::number(block);
        let handle = self.handle();
        let erc20 = self.erc20(token);

        let mut metadata = TokenMetadata {
            symbol: logged(token, "symbol", erc20.symbol().call().block(at).await),
            name: logged(token, "name", erc20.name().call().block(at).await),
            decimals: logged(token, "decimals", erc20.decimals().call().block(at).await),
            ..Default::default()
        };

        match kind {
            TokenKind::Synthetic => {
                metadata.is_valid = logged(
                    token,
                    "isFxTokenValid",
                    handle.isFxTokenValid(token.0).call().block(at).await,
                );
                metadata.total_supply =
                    logged(token, "totalSupply", erc20.totalSupply().call().block(at).await);
            }
            TokenKind::Collateral => {
                metadata.is_valid = logged(
                    token,
                    "isCollateralValid",
                    handle.isCollateralValid(token.0).call().block(at).await,
                );
                if let Some(details) = logged(
                    token,
                    "getCollateralDetails",
                    handle.getCollateralDetails(token.0).call().block(at).await,
                ) {
                    metadata.mint_collateral_ratio = Some(details.mintCR);
                    metadata.liquidation_fee = Some(details.liquidationFee);
                    metadata.interest_rate = Some(details.interestRate);
                }
                metadata.total_balance = logged(
                    token,
                    "totalBalances",
                    handle.totalBalances(token.0).call().block(at).await,
                );
            }
        }

        metadata
    }

    async fn collateral_types(&self, block: u64) -> Result<Vec<TokenId>, ReadError> {
        let types = self
            .handle()
            .getAllCollateralTypes()
            .call()
            .block(BlockId::number(block))
            .await
            .map_err(read_error)?;
        Ok(types.into_iter().map(TokenId).collect())
    }

    async fn keeper_pool_deposits(
        &self,
        pool: Address,
        synthetic: TokenId,
        block: u64,
    ) -> Result<U256, ReadError> {
        self.keeper_pool(pool)
            .getPoolTotalDeposit(synthetic.0)
            .call()
            .block(BlockId::number(block))
            .await
            .map_err(read_error)
    }

    async fn keeper_pool_stake(
        &self,
        pool: Address,
        account: Address,
        synthetic: TokenId,
        block: u64,
    ) -> Result<U256, ReadError> {
        self.keeper_pool(pool)
            .balanceOfStake(account, synthetic.0)
            .call()
            .block(BlockId::number(block))
            .await
            .map_err(read_error)
    }

    async fn keeper_pool_collateral(
        &self,
        pool: Address,
        synthetic: TokenId,
        collateral: TokenId,
        block: u64,
    ) -> Result<U256, ReadError> {
        self.keeper_pool(pool)
            .getPoolCollateralBalance(synthetic.0, collateral.0)
            .call()
            .block(BlockId::number(block))
            .await
            .map_err(read_error)
    }
}
