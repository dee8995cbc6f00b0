//! Custody ledger engine: per-principal balances, one-shot time-locked
//! withdrawal requests, and drip reward accrual.
//!
//! Pure accounting over a fixed-size `Pod` slab. No Solana types beyond raw
//! 32-byte owner keys, no external calls. The program wrapper owns signer
//! authorization and token movement; everything here is checks and effects.

use bytemuck::{Pod, Zeroable};

/// Capacity of the account table embedded in the slab.
pub const MAX_ACCOUNTS: usize = 64;

/// Fixed-point denominator for reward rates (basis points per slot).
/// Divisions truncate, rounding against the claimant.
pub const RATE_DENOMINATOR: u128 = 10_000;

/// 128-bit value stored as two u64 halves. Native u128 is 16-aligned on the
/// host but 8-aligned on SBF, which would shift slab offsets between
/// targets; the split keeps the layout identical everywhere.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct U128 {
    lo: u64,
    hi: u64,
}

impl U128 {
    pub const ZERO: U128 = U128 { lo: 0, hi: 0 };

    #[inline]
    pub const fn new(v: u128) -> Self {
        Self {
            lo: v as u64,
            hi: (v >> 64) as u64,
        }
    }

    #[inline]
    pub const fn get(&self) -> u128 {
        ((self.hi as u128) << 64) | self.lo as u128
    }

    #[inline]
    pub fn set(&mut self, v: u128) {
        self.lo = v as u64;
        self.hi = (v >> 64) as u64;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LedgerError {
    ZeroAmount,
    ZeroAddress,
    InsufficientBalance,
    RequestAlreadyExists,
    RequestNotExists,
    WithdrawalNotReady,
    RequestedAmountExceeded,
    NothingToClaim,
    Overflow,
    AccountNotFound,
    AccountExists,
    LedgerFull,
    AccountNotEmpty,
    RewardFundsExhausted,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LedgerParams {
    /// Slots between a withdrawal request and its maturity. Zero is legal
    /// and means requests mature immediately.
    pub withdraw_delay_slots: u64,
    /// Reward rate in basis points per slot, captured into each deposit.
    pub reward_rate_bps: u64,
    /// Usable slot count, clamped to MAX_ACCOUNTS.
    pub max_accounts: u64,
}

/// One principal slot. No implicit padding (checked in tests/layout.rs).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PrincipalAccount {
    pub owner: [u8; 32],
    /// Custodied collateral.
    pub balance: U128,
    /// Amount locked into the active withdrawal request.
    pub request_amount: U128,
    /// Realized-but-unclaimed reward.
    pub accrued_rewards: U128,
    /// Slot at or after which the active request is executable.
    pub request_maturity_slot: u64,
    /// Rate captured when the position was last deposited into. A later
    /// global rate change never rewrites this.
    pub rate_at_deposit_bps: u64,
    /// Advances only when pending reward is realized.
    pub last_checkpoint_slot: u64,
    /// Explicit request existence flag; slot 0 is a legal maturity index.
    pub request_active: u8,
    pub used: u8,
    pub _padding: [u8; 6],
}

impl PrincipalAccount {
    #[inline]
    pub fn has_request(&self) -> bool {
        self.request_active != 0
    }
}

/// The custody ledger: balance ledger, request/maturity tracker, and
/// accrual engine over a fixed account table.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct CustodyLedger {
    pub accounts: [PrincipalAccount; MAX_ACCOUNTS],
    pub params: LedgerParams,
    pub num_used: u64,
    /// Sum of all balances (conservation accumulator).
    pub total_balance: U128,
    /// Sum of all accrued_rewards.
    pub total_rewards_owed: U128,
    /// Funded reward budget; claims never exceed it.
    pub reward_reserve: U128,
}

impl CustodyLedger {
    /// Initialize in place over a zeroed slab. Avoids constructing the
    /// full table on the stack.
    pub fn init(&mut self, params: LedgerParams) {
        *self = Self::zeroed();
        self.params = params;
        if self.params.max_accounts == 0 || self.params.max_accounts > MAX_ACCOUNTS as u64 {
            self.params.max_accounts = MAX_ACCOUNTS as u64;
        }
    }

    #[inline]
    pub fn is_used(&self, idx: usize) -> bool {
        idx < MAX_ACCOUNTS && self.accounts[idx].used != 0
    }

    fn slot_mut(&mut self, idx: u16) -> Result<&mut PrincipalAccount, LedgerError> {
        if !self.is_used(idx as usize) {
            return Err(LedgerError::AccountNotFound);
        }
        Ok(&mut self.accounts[idx as usize])
    }

    fn slot(&self, idx: u16) -> Result<&PrincipalAccount, LedgerError> {
        if !self.is_used(idx as usize) {
            return Err(LedgerError::AccountNotFound);
        }
        Ok(&self.accounts[idx as usize])
    }

    /// Register a principal. One slot per owner key.
    pub fn add_account(&mut self, owner: [u8; 32], now_slot: u64) -> Result<u16, LedgerError> {
        if owner == [0u8; 32] {
            return Err(LedgerError::ZeroAddress);
        }
        let limit = (self.params.max_accounts as usize).min(MAX_ACCOUNTS);
        let mut free: Option<usize> = None;
        for i in 0..limit {
            if self.accounts[i].used != 0 {
                if self.accounts[i].owner == owner {
                    return Err(LedgerError::AccountExists);
                }
            } else if free.is_none() {
                free = Some(i);
            }
        }
        let idx = free.ok_or(LedgerError::LedgerFull)?;
        let acct = &mut self.accounts[idx];
        *acct = PrincipalAccount::zeroed();
        acct.owner = owner;
        acct.last_checkpoint_slot = now_slot;
        acct.rate_at_deposit_bps = self.params.reward_rate_bps;
        acct.used = 1;
        self.num_used += 1;
        Ok(idx as u16)
    }

    /// Realize reward accrued since the last checkpoint and advance the
    /// accrual clock. Idempotent at a fixed slot; a no-op for empty
    /// positions and for a non-advancing clock.
    pub fn checkpoint(&mut self, idx: u16, now_slot: u64) -> Result<(), LedgerError> {
        let acct = self.slot_mut(idx)?;
        let balance = acct.balance.get();
        if balance == 0 {
            // Nothing accrues on an empty position; keep the clock current
            // so a later deposit does not back-accrue.
            acct.last_checkpoint_slot = acct.last_checkpoint_slot.max(now_slot);
            return Ok(());
        }
        let elapsed = now_slot.saturating_sub(acct.last_checkpoint_slot);
        if elapsed == 0 {
            return Ok(());
        }
        let pending = balance
            .checked_mul(elapsed as u128)
            .and_then(|x| x.checked_mul(acct.rate_at_deposit_bps as u128))
            .map(|x| x / RATE_DENOMINATOR)
            .ok_or(LedgerError::Overflow)?;
        let accrued = acct
            .accrued_rewards
            .get()
            .checked_add(pending)
            .ok_or(LedgerError::Overflow)?;
        acct.accrued_rewards.set(accrued);
        acct.last_checkpoint_slot = now_slot;
        let owed = self
            .total_rewards_owed
            .get()
            .checked_add(pending)
            .ok_or(LedgerError::Overflow)?;
        self.total_rewards_owed.set(owed);
        Ok(())
    }

    /// Credit a deposit. Accrual is realized under the old amount and rate
    /// before the balance changes; the combined position then captures the
    /// current global rate.
    pub fn deposit(&mut self, idx: u16, amount: u128, now_slot: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        self.checkpoint(idx, now_slot)?;
        let rate = self.params.reward_rate_bps;
        let total = self
            .total_balance
            .get()
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        let acct = self.slot_mut(idx)?;
        let balance = acct
            .balance
            .get()
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        acct.balance.set(balance);
        acct.rate_at_deposit_bps = rate;
        self.total_balance.set(total);
        Ok(())
    }

    /// Create the one-shot withdrawal request. At most one outstanding
    /// request per principal.
    pub fn request_withdraw(
        &mut self,
        idx: u16,
        amount: u128,
        now_slot: u64,
    ) -> Result<u64, LedgerError> {
        let delay = self.params.withdraw_delay_slots;
        let acct = self.slot_mut(idx)?;
        if acct.has_request() {
            return Err(LedgerError::RequestAlreadyExists);
        }
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if amount > acct.balance.get() {
            return Err(LedgerError::InsufficientBalance);
        }
        let maturity = now_slot.checked_add(delay).ok_or(LedgerError::Overflow)?;
        acct.request_amount.set(amount);
        acct.request_maturity_slot = maturity;
        acct.request_active = 1;
        Ok(maturity)
    }

    /// Settle a matured request. Withdrawing less than requested still
    /// consumes the request entirely; the remainder needs a new one.
    pub fn withdraw(&mut self, idx: u16, amount: u128, now_slot: u64) -> Result<(), LedgerError> {
        {
            let acct = self.slot(idx)?;
            if !acct.has_request() {
                return Err(LedgerError::RequestNotExists);
            }
            if now_slot < acct.request_maturity_slot {
                return Err(LedgerError::WithdrawalNotReady);
            }
            if amount == 0 {
                return Err(LedgerError::ZeroAmount);
            }
            if amount > acct.request_amount.get() {
                return Err(LedgerError::RequestedAmountExceeded);
            }
            // Balance may have moved since the request was stamped; the
            // request is not auto-adjusted, so re-check the live balance.
            if amount > acct.balance.get() {
                return Err(LedgerError::InsufficientBalance);
            }
        }
        self.checkpoint(idx, now_slot)?;
        let total = self
            .total_balance
            .get()
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow)?;
        let acct = self.slot_mut(idx)?;
        acct.request_amount = U128::ZERO;
        acct.request_maturity_slot = 0;
        acct.request_active = 0;
        let balance = acct.balance.get() - amount;
        acct.balance.set(balance);
        self.total_balance.set(total);
        Ok(())
    }

    /// Realize and pay out all pending reward. Returns the payout amount;
    /// the caller moves the reward tokens.
    pub fn claim_rewards(&mut self, idx: u16, now_slot: u64) -> Result<u128, LedgerError> {
        self.checkpoint(idx, now_slot)?;
        let reserve = self.reward_reserve.get();
        let owed = self.total_rewards_owed.get();
        let acct = self.slot_mut(idx)?;
        let payout = acct.accrued_rewards.get();
        if payout == 0 {
            return Err(LedgerError::NothingToClaim);
        }
        if payout > reserve {
            return Err(LedgerError::RewardFundsExhausted);
        }
        acct.accrued_rewards = U128::ZERO;
        self.total_rewards_owed.set(owed - payout);
        self.reward_reserve.set(reserve - payout);
        Ok(payout)
    }

    /// Credit the funded reward budget.
    pub fn fund_rewards(&mut self, amount: u128) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let reserve = self
            .reward_reserve
            .get()
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.reward_reserve.set(reserve);
        Ok(())
    }

    /// Free a slot. Only legal once the position is fully unwound.
    pub fn close_account(&mut self, idx: u16) -> Result<(), LedgerError> {
        let acct = self.slot_mut(idx)?;
        if acct.has_request() || acct.balance.get() != 0 || acct.accrued_rewards.get() != 0 {
            return Err(LedgerError::AccountNotEmpty);
        }
        *acct = PrincipalAccount::zeroed();
        self.num_used -= 1;
        Ok(())
    }

    /// Admin: future requests only; stamped maturities are untouched.
    pub fn set_withdraw_delay(&mut self, delay_slots: u64) {
        self.params.withdraw_delay_slots = delay_slots;
    }

    /// Admin: future deposits only; captured rates are untouched.
    pub fn set_reward_rate(&mut self, rate_bps: u64) {
        self.params.reward_rate_bps = rate_bps;
    }

    /// Reward claimable right now, including accrual not yet realized by a
    /// checkpoint. Read-only; saturates rather than erroring.
    pub fn pending_rewards(&self, idx: u16, now_slot: u64) -> Result<u128, LedgerError> {
        let acct = self.slot(idx)?;
        let balance = acct.balance.get();
        if balance == 0 {
            return Ok(acct.accrued_rewards.get());
        }
        let elapsed = now_slot.saturating_sub(acct.last_checkpoint_slot);
        let live = balance
            .saturating_mul(elapsed as u128)
            .saturating_mul(acct.rate_at_deposit_bps as u128)
            / RATE_DENOMINATOR;
        Ok(acct.accrued_rewards.get().saturating_add(live))
    }

    pub fn balance_of(&self, idx: u16) -> Result<u128, LedgerError> {
        Ok(self.slot(idx)?.balance.get())
    }

    /// Per-slot sums must equal the ledger accumulators.
    pub fn check_conservation(&self) -> bool {
        let mut balance_sum: u128 = 0;
        let mut owed_sum: u128 = 0;
        let mut used: u64 = 0;
        for acct in self.accounts.iter() {
            if acct.used == 0 {
                continue;
            }
            used += 1;
            balance_sum = match balance_sum.checked_add(acct.balance.get()) {
                Some(v) => v,
                None => return false,
            };
            owed_sum = match owed_sum.checked_add(acct.accrued_rewards.get()) {
                Some(v) => v,
                None => return false,
            };
            if acct.has_request() && acct.request_amount.get() == 0 {
                return false;
            }
        }
        balance_sum == self.total_balance.get()
            && owed_sum == self.total_rewards_owed.get()
            && used == self.num_used
    }
}
