//! Rebalancer: the policy layer driven by an external keeper.
//!
//! Each [`Rebalancer::rebalance`] call runs three steps against a
//! [`BondMarket`]:
//!
//! 1. Close matured positions from the front, up to a per-call limit.
//! 2. If idle liquidity cannot cover the pending withdrawal, close
//!    immature positions from the front, sized from each position's own
//!    preview. A partial close whose residual quotes below the market's
//!    minimum transaction closes the whole position instead.
//! 3. Spend idle liquidity above the target (and above the pending
//!    withdrawal) on a new position at the market's next maturity.
//!
//! The call is all-or-nothing: the portfolio, idle balance and market are
//! staged and only committed when every step succeeds.
//!
//! ```
//! use bondbook::market::{BondMarket, MockMarket};
//! use bondbook::{RebalanceConfig, RebalanceOptions, Rebalancer};
//!
//! let mut market = MockMarket::builder().min_transaction_amount(10).build();
//! let mut strategy = Rebalancer::new(RebalanceConfig {
//!     target_idle_liquidity: 100,
//!     ..RebalanceConfig::default()
//! });
//!
//! strategy.deposit(1_000).unwrap();
//! assert!(strategy.can_rebalance(&market, 0));
//!
//! let report = strategy.rebalance(&mut market, &RebalanceOptions::default()).unwrap();
//! assert_eq!(report.spent, 900);
//! assert_eq!(strategy.idle(), 100);
//! assert_eq!(strategy.portfolio().position_count(), 1);
//! assert!(!strategy.can_rebalance(&market, 0));
//! ```

use log::{debug, info, warn};

use crate::error::{PortfolioError, Result};
use crate::event::PortfolioEvent;
use crate::market::{BondMarket, MarketError};
use crate::portfolio::Portfolio;
use crate::pricing::{bonds_to_cover, check_deviation, price_per_bond, sub_bps};
use crate::types::{Amount, BondAmount, Position};

/// Operator-set parameters for the rebalance policy.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RebalanceConfig {
    /// Idle liquidity kept uninvested to serve withdrawals immediately
    pub target_idle_liquidity: Amount,
    /// Padding on partial closes, and the maximum tolerated per-bond
    /// divergence between a partial quote and its position's full quote
    pub partial_closure_buffer_bps: u32,
    /// Matured positions closed per call at most
    pub max_positions_closed_per_call: usize,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            target_idle_liquidity: 0,
            partial_closure_buffer_bps: 10,
            max_positions_closed_per_call: 16,
        }
    }
}

/// Caller-supplied bounds for a single call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RebalanceOptions {
    /// Cap on the amount spent opening a new position
    pub spend_amount: Option<Amount>,
    /// Minimum bonds received by an open
    pub min_output: BondAmount,
    /// Minimum vault share price (`WAD`) accepted by an open
    pub min_vault_share_price: u128,
    /// Closes must return at least their preview less this many bps
    pub close_slippage_bps: u32,
    /// Overrides the configured matured-closure limit
    pub position_closure_limit: Option<usize>,
    /// Withdrawal the vault has queued; kept liquid and never reinvested
    pub withdrawal: Amount,
}

/// What a rebalance (or free-funds) call did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RebalanceReport {
    /// Matured positions fully closed
    pub matured_closed: usize,
    /// Immature positions closed (fully or partially) to raise liquidity
    pub immature_closed: usize,
    /// Bonds sold across all closes
    pub bonds_closed: BondAmount,
    /// Proceeds received across all closes
    pub proceeds: Amount,
    /// Position bought, if any (as reported by the market)
    pub opened: Option<Position>,
    /// Amount spent on the open
    pub spent: Amount,
    /// Idle liquidity after the call
    pub idle_after: Amount,
}

impl RebalanceReport {
    /// True if the call changed nothing.
    pub fn is_noop(&self) -> bool {
        self.matured_closed == 0 && self.immature_closed == 0 && self.opened.is_none()
    }
}

/// A bond strategy: the portfolio plus its idle liquidity and policy.
#[derive(Clone, Debug, Default)]
pub struct Rebalancer {
    portfolio: Portfolio,
    idle: Amount,
    config: RebalanceConfig,
}

impl Rebalancer {
    /// Create a strategy with an empty portfolio and no idle liquidity.
    pub fn new(config: RebalanceConfig) -> Self {
        Self {
            portfolio: Portfolio::new(),
            idle: 0,
            config,
        }
    }

    // === Queries ===

    #[inline]
    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Uninvested liquidity.
    #[inline]
    pub fn idle(&self) -> Amount {
        self.idle
    }

    #[inline]
    pub fn config(&self) -> &RebalanceConfig {
        &self.config
    }

    /// Idle liquidity plus every position valued at its own close preview.
    pub fn estimate_total_assets<M: BondMarket>(&self, market: &M) -> Result<Amount> {
        let mut total = self.idle;
        for pos in self.portfolio.positions() {
            let value = market.preview_close_position(pos.maturity_time, pos.bond_amount)?;
            total = total
                .checked_add(value)
                .ok_or(PortfolioError::ArithmeticOverflow)?;
        }
        Ok(total)
    }

    /// True if a rebalance with this pending `withdrawal` would do anything.
    pub fn can_rebalance<M: BondMarket>(&self, market: &M, withdrawal: Amount) -> bool {
        if self.portfolio.has_matured_positions(market.now()) {
            return true;
        }
        if self.idle < withdrawal && !self.portfolio.is_empty() {
            return true;
        }
        let reserved = self
            .config
            .target_idle_liquidity
            .saturating_add(withdrawal);
        self.idle.saturating_sub(reserved) > market.min_transaction_amount()
    }

    // === Vault interface ===

    /// Add idle liquidity from the vault.
    pub fn deposit(&mut self, amount: Amount) -> Result<()> {
        self.idle = self
            .idle
            .checked_add(amount)
            .ok_or(PortfolioError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Release `amount` to the vault, closing positions as needed.
    ///
    /// Matured positions are closed first (up to the per-call limit), then
    /// immature positions from the front. Fails with `InsufficientLiquidity`
    /// if everything closable is not enough; nothing is changed then.
    pub fn free_funds<M>(
        &mut self,
        market: &mut M,
        amount: Amount,
        options: &RebalanceOptions,
    ) -> Result<Amount>
    where
        M: BondMarket + Clone,
    {
        let config = self.config.clone();
        let limit = closure_limit(&config, options)?;
        self.transact(market, |tx| {
            tx.close_matured(limit, options)?;
            tx.raise_liquidity(amount, &config, options)?;
            if tx.idle < amount {
                return Err(PortfolioError::InsufficientLiquidity {
                    requested: amount,
                    available: tx.idle,
                });
            }
            tx.idle -= amount;
            tx.report.idle_after = tx.idle;
            Ok(amount)
        })
    }

    // === Rebalance ===

    /// Run one rebalance. See the module docs for the steps.
    ///
    /// Returns a no-op report, and changes nothing, when no action is needed.
    pub fn rebalance<M>(&mut self, market: &mut M, options: &RebalanceOptions) -> Result<RebalanceReport>
    where
        M: BondMarket + Clone,
    {
        let config = self.config.clone();
        let limit = closure_limit(&config, options)?;
        let report = self.transact(market, |tx| {
            tx.close_matured(limit, options)?;
            tx.raise_liquidity(options.withdrawal, &config, options)?;
            tx.deploy_idle(&config, options)?;
            tx.report.idle_after = tx.idle;
            if !tx.report.is_noop() {
                tx.portfolio.emit(PortfolioEvent::Rebalanced);
            }
            Ok(tx.report.clone())
        })?;

        if report.is_noop() {
            debug!("rebalance: nothing to do");
        } else {
            info!(
                "rebalance: closed {} matured + {} immature ({} bonds, proceeds {}), spent {}, idle {}",
                report.matured_closed,
                report.immature_closed,
                report.bonds_closed,
                report.proceeds,
                report.spent,
                report.idle_after,
            );
        }
        Ok(report)
    }

    /// Run `f` against staged state; commit on `Ok`, roll back on `Err`.
    fn transact<M, T, F>(&mut self, market: &mut M, f: F) -> Result<T>
    where
        M: BondMarket + Clone,
        F: FnOnce(&mut Staged<'_, M>) -> Result<T>,
    {
        let checkpoint = self.portfolio.checkpoint();
        let mut staged_market = market.clone();
        let mut tx = Staged {
            portfolio: &mut self.portfolio,
            idle: self.idle,
            market: &mut staged_market,
            report: RebalanceReport::default(),
        };

        match f(&mut tx) {
            Ok(out) => {
                self.idle = tx.idle;
                *market = staged_market;
                Ok(out)
            }
            Err(e) => {
                warn!("rebalance aborted, state rolled back: {e}");
                self.portfolio.restore(checkpoint);
                Err(e)
            }
        }
    }
}

/// Matured closures allowed this call. Zero is rejected up front.
fn closure_limit(config: &RebalanceConfig, options: &RebalanceOptions) -> Result<usize> {
    match options
        .position_closure_limit
        .unwrap_or(config.max_positions_closed_per_call)
    {
        0 => Err(PortfolioError::ZeroClosureLimit),
        limit => Ok(limit),
    }
}

/// Working state of one call. Ledger mutations for each close/open are
/// finished before the next market call is issued.
struct Staged<'a, M> {
    portfolio: &'a mut Portfolio,
    idle: Amount,
    market: &'a mut M,
    report: RebalanceReport,
}

impl<M: BondMarket> Staged<'_, M> {
    fn add_idle(&mut self, amount: Amount) -> Result<()> {
        self.idle = self
            .idle
            .checked_add(amount)
            .ok_or(PortfolioError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Step 1: close up to `limit` matured positions, front first.
    fn close_matured(&mut self, limit: usize, options: &RebalanceOptions) -> Result<()> {
        let now = self.market.now();

        while self.report.matured_closed < limit && self.portfolio.has_matured_positions(now) {
            let Some(front) = self.portfolio.front() else {
                break;
            };
            let preview = self
                .market
                .preview_close_position(front.maturity_time, front.bond_amount)?;
            let min_output = sub_bps(preview, options.close_slippage_bps);
            let proceeds =
                self.market
                    .close_position(front.maturity_time, front.bond_amount, min_output)?;

            self.portfolio.close_full()?;
            self.add_idle(proceeds)?;
            self.report.matured_closed += 1;
            self.report.bonds_closed = self.report.bonds_closed.saturating_add(front.bond_amount);
            self.report.proceeds = self.report.proceeds.saturating_add(proceeds);
            debug!("closed matured {front}: proceeds {proceeds}");
        }
        Ok(())
    }

    /// Step 2: close from the front until idle covers `target`, or the
    /// ledger is empty.
    fn raise_liquidity(
        &mut self,
        target: Amount,
        config: &RebalanceConfig,
        options: &RebalanceOptions,
    ) -> Result<()> {
        let min_tx = self.market.min_transaction_amount();
        let buffer = config.partial_closure_buffer_bps;

        while self.idle < target {
            let Some(front) = self.portfolio.front() else {
                break;
            };
            let needed = (target - self.idle).max(min_tx);

            // Size from this position's own quote, never a portfolio average.
            let value = self
                .market
                .preview_close_position(front.maturity_time, front.bond_amount)?;
            let mut bonds = bonds_to_cover(needed, value, front.bond_amount, buffer)?
                .max(min_tx)
                .min(front.bond_amount);

            // The residual must itself quote at or above the minimum transaction.
            if bonds < front.bond_amount {
                let residual = front.bond_amount - bonds;
                match self.market.preview_close_position(front.maturity_time, residual) {
                    Ok(residual_value) if residual_value >= min_tx => {}
                    Ok(_) | Err(MarketError::BelowMinimumTransaction { .. }) => {
                        bonds = front.bond_amount;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let quote = if bonds == front.bond_amount {
                value
            } else {
                let quote = self.market.preview_close_position(front.maturity_time, bonds)?;
                check_deviation(
                    price_per_bond(quote, bonds)?,
                    price_per_bond(value, front.bond_amount)?,
                    buffer,
                )?;
                quote
            };

            let min_output = sub_bps(quote, options.close_slippage_bps);
            let proceeds = self
                .market
                .close_position(front.maturity_time, bonds, min_output)?;

            self.portfolio.close_partial(bonds)?;
            self.add_idle(proceeds)?;
            self.report.immature_closed += 1;
            self.report.bonds_closed = self.report.bonds_closed.saturating_add(bonds);
            self.report.proceeds = self.report.proceeds.saturating_add(proceeds);
            debug!(
                "closed {bonds} of {front} to cover withdrawal: proceeds {proceeds}, idle {}",
                self.idle
            );
        }
        Ok(())
    }

    /// Step 3: open a position with idle liquidity above the reserve.
    fn deploy_idle(&mut self, config: &RebalanceConfig, options: &RebalanceOptions) -> Result<()> {
        let reserved = config
            .target_idle_liquidity
            .saturating_add(options.withdrawal);
        let mut excess = self.idle.saturating_sub(reserved);
        if let Some(cap) = options.spend_amount {
            excess = excess.min(cap);
        }
        if excess <= self.market.min_transaction_amount() {
            return Ok(());
        }

        let (maturity_time, bond_amount) = self.market.open_position(
            excess,
            options.min_output,
            options.min_vault_share_price,
        )?;
        self.portfolio.handle_open_position(maturity_time, bond_amount)?;
        self.idle -= excess;
        self.report.opened = Some(Position::new(maturity_time, bond_amount));
        self.report.spent = excess;
        debug!("opened {bond_amount} bonds @ t={maturity_time} for {excess}");
        Ok(())
    }
}
