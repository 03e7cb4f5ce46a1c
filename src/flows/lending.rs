//! Collateralized borrowing against an Aave v2 style lending pool.
//!
//! Sequence: wrap ETH → approve WETH → deposit → read account data →
//! read DAI/ETH price → borrow DAI → approve DAI → repay. Every
//! state-changing step waits for its own confirmation before the next
//! one starts, and any failure stops the sequence.

use alloy::primitives::{Address, TxHash, I256, U256};
use alloy::sol;
use serde::Serialize;
use std::str::FromStr;

use crate::config::LendingConfig;
use crate::error::{RendezvousError, RendezvousResult};
use crate::flows::{read, transact};
use crate::tx::{ConfirmationWaiter, ContractCall, Submitter};

sol! {
    interface IWeth {
        function deposit() external payable;
        function balanceOf(address owner) external view returns (uint256);
    }

    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
    }

    interface ILendingPoolAddressesProvider {
        function getLendingPool() external view returns (address);
    }

    interface ILendingPool {
        function deposit(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
        function borrow(address asset, uint256 amount, uint256 interestRateMode, uint16 referralCode, address onBehalfOf) external;
        function repay(address asset, uint256 amount, uint256 rateMode, address onBehalfOf) external returns (uint256);
        function getUserAccountData(address user) external view returns (
            uint256 totalCollateralETH,
            uint256 totalDebtETH,
            uint256 availableBorrowsETH,
            uint256 currentLiquidationThreshold,
            uint256 ltv,
            uint256 healthFactor
        );
    }

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

/// Variable interest rate mode.
const VARIABLE_RATE: u64 = 2;
const NO_REFERRAL: u16 = 0;
const BPS_DENOMINATOR: u64 = 10_000;

/// Parsed lending addresses.
#[derive(Debug, Clone, Copy)]
pub struct LendingAddresses {
    pub weth: Address,
    pub dai: Address,
    pub addresses_provider: Address,
    pub dai_eth_price_feed: Address,
}

impl LendingAddresses {
    pub fn from_config(config: &LendingConfig) -> RendezvousResult<Self> {
        let parse = |name: &str, value: &str| {
            Address::from_str(value)
                .map_err(|e| RendezvousError::Config(format!("lending.{}: {}", name, e)))
        };
        Ok(Self {
            weth: parse("weth", &config.weth)?,
            dai: parse("dai", &config.dai)?,
            addresses_provider: parse("addresses_provider", &config.addresses_provider)?,
            dai_eth_price_feed: parse("dai_eth_price_feed", &config.dai_eth_price_feed)?,
        })
    }
}

/// Account position as reported by the pool, in ETH wei.
#[derive(Debug, Clone, Serialize)]
pub struct AccountData {
    pub total_collateral_eth: U256,
    pub total_debt_eth: U256,
    pub available_borrows_eth: U256,
    pub health_factor: U256,
}

/// One confirmed step of the sequence.
#[derive(Debug, Clone, Serialize)]
pub struct LendingStep {
    pub name: &'static str,
    pub tx_hash: TxHash,
    pub block_number: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LendingReport {
    pub lending_pool: Address,
    pub deposited: U256,
    /// Price of one DAI in ETH wei.
    pub dai_price: U256,
    pub borrowed: U256,
    pub after_deposit: AccountData,
    pub after_borrow: AccountData,
    pub after_repay: AccountData,
    pub steps: Vec<LendingStep>,
}

/// DAI amount (wei) worth `ratio_bps` of `available_eth` at `dai_price` ETH per DAI.
pub fn borrow_amount(available_eth: U256, dai_price: U256, ratio_bps: u32) -> RendezvousResult<U256> {
    if dai_price.is_zero() {
        return Err(RendezvousError::Abi("price feed returned zero".into()));
    }
    let budget = available_eth * U256::from(ratio_bps) / U256::from(BPS_DENOMINATOR);
    Ok(budget * U256::from(10u64).pow(U256::from(18)) / dai_price)
}

/// Runs the lending sequence from one wallet.
#[derive(Debug, Clone)]
pub struct LendingFlow {
    submitter: Submitter,
    waiter: ConfirmationWaiter,
    addresses: LendingAddresses,
    amount: U256,
    borrow_ratio_bps: u32,
}

impl LendingFlow {
    pub fn new(submitter: Submitter, waiter: ConfirmationWaiter, config: &LendingConfig) -> RendezvousResult<Self> {
        let amount = U256::from_str(&config.amount_wei)
            .map_err(|e| RendezvousError::Config(format!("lending.amount_wei: {}", e)))?;
        Ok(Self {
            submitter,
            waiter,
            addresses: LendingAddresses::from_config(config)?,
            amount,
            borrow_ratio_bps: config.borrow_ratio_bps,
        })
    }

    async fn step(&self, name: &'static str, call: ContractCall, steps: &mut Vec<LendingStep>) -> RendezvousResult<()> {
        tracing::info!(step = name, to = %call.to, "Lending step");
        let confirmed = transact(&self.submitter, &self.waiter, call).await?;
        steps.push(LendingStep {
            name,
            tx_hash: confirmed.hash,
            block_number: confirmed.block_number,
        });
        Ok(())
    }

    pub async fn lending_pool(&self) -> RendezvousResult<Address> {
        read(
            self.submitter.ledger().as_ref(),
            self.addresses.addresses_provider,
            ILendingPoolAddressesProvider::getLendingPoolCall {},
        )
        .await
    }

    pub async fn account_data(&self, pool: Address) -> RendezvousResult<AccountData> {
        let data = read(
            self.submitter.ledger().as_ref(),
            pool,
            ILendingPool::getUserAccountDataCall {
                user: self.submitter.address(),
            },
        )
        .await?;
        let account = AccountData {
            total_collateral_eth: data.totalCollateralETH,
            total_debt_eth: data.totalDebtETH,
            available_borrows_eth: data.availableBorrowsETH,
            health_factor: data.healthFactor,
        };
        tracing::info!(
            collateral = %account.total_collateral_eth,
            debt = %account.total_debt_eth,
            available = %account.available_borrows_eth,
            "Account data"
        );
        Ok(account)
    }

    /// Latest DAI/ETH answer from the price feed.
    pub async fn dai_price(&self) -> RendezvousResult<U256> {
        let round = read(
            self.submitter.ledger().as_ref(),
            self.addresses.dai_eth_price_feed,
            AggregatorV3Interface::latestRoundDataCall {},
        )
        .await?;
        if round.answer <= I256::ZERO {
            return Err(RendezvousError::Abi(format!(
                "price feed answer is not positive: {}",
                round.answer
            )));
        }
        Ok(round.answer.into_raw())
    }

    pub async fn run(&self) -> RendezvousResult<LendingReport> {
        let me = self.submitter.address();
        let mut steps = Vec::new();

        self.step(
            "wrap",
            ContractCall::encode(self.addresses.weth, &IWeth::depositCall {}).with_value(self.amount),
            &mut steps,
        )
        .await?;

        let pool = self.lending_pool().await?;
        tracing::info!(lending_pool = %pool, "Resolved lending pool");

        self.step(
            "approve-weth",
            ContractCall::encode(
                self.addresses.weth,
                &IERC20::approveCall {
                    spender: pool,
                    amount: self.amount,
                },
            ),
            &mut steps,
        )
        .await?;

        self.step(
            "deposit",
            ContractCall::encode(
                pool,
                &ILendingPool::depositCall {
                    asset: self.addresses.weth,
                    amount: self.amount,
                    onBehalfOf: me,
                    referralCode: NO_REFERRAL,
                },
            ),
            &mut steps,
        )
        .await?;

        let after_deposit = self.account_data(pool).await?;
        let dai_price = self.dai_price().await?;
        let borrowed = borrow_amount(after_deposit.available_borrows_eth, dai_price, self.borrow_ratio_bps)?;
        tracing::info!(dai_price = %dai_price, amount = %borrowed, "Borrowing DAI");

        self.step(
            "borrow",
            ContractCall::encode(
                pool,
                &ILendingPool::borrowCall {
                    asset: self.addresses.dai,
                    amount: borrowed,
                    interestRateMode: U256::from(VARIABLE_RATE),
                    referralCode: NO_REFERRAL,
                    onBehalfOf: me,
                },
            ),
            &mut steps,
        )
        .await?;
        let after_borrow = self.account_data(pool).await?;

        self.step(
            "approve-dai",
            ContractCall::encode(
                self.addresses.dai,
                &IERC20::approveCall {
                    spender: pool,
                    amount: borrowed,
                },
            ),
            &mut steps,
        )
        .await?;

        self.step(
            "repay",
            ContractCall::encode(
                pool,
                &ILendingPool::repayCall {
                    asset: self.addresses.dai,
                    amount: borrowed,
                    rateMode: U256::from(VARIABLE_RATE),
                    onBehalfOf: me,
                },
            ),
            &mut steps,
        )
        .await?;
        // Interest accrued between borrow and repay leaves a small debt
        let after_repay = self.account_data(pool).await?;

        Ok(LendingReport {
            lending_pool: pool,
            deposited: self.amount,
            dai_price,
            borrowed,
            after_deposit,
            after_borrow,
            after_repay,
            steps,
        })
    }
}
