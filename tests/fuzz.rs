use bytemuck::Zeroable;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use tidevault_prog::engine::{CustodyLedger, LedgerParams, MAX_ACCOUNTS};

fn default_params() -> LedgerParams {
    LedgerParams {
        withdraw_delay_slots: 20,
        reward_rate_bps: 50,
        max_accounts: MAX_ACCOUNTS as u64,
    }
}

#[test]
fn deterministic_fuzz_simulation() {
    let seed = [0xabu8; 16];
    let mut rng = XorShiftRng::from_seed(seed);
    let mut ledger = CustodyLedger::zeroed();
    ledger.init(default_params());

    let mut principals: Vec<u16> = Vec::new();
    let mut next_owner: u8 = 1;

    for i in 0..500 {
        let op: u8 = rng.gen_range(0..8);
        let slot = (i / 10) as u64; // Advance slot slowly

        match op {
            0 => {
                // Open account
                if let Ok(idx) = ledger.add_account([next_owner; 32], slot) {
                    principals.push(idx);
                    next_owner = next_owner.wrapping_add(1).max(1);
                }
            }
            1 | 2 => {
                // Deposit
                if !principals.is_empty() {
                    let p = principals[rng.gen_range(0..principals.len())];
                    let amt = rng.gen_range(1000..1_000_000u128);
                    let _ = ledger.deposit(p, amt, slot);
                }
            }
            3 => {
                // Request withdrawal
                if !principals.is_empty() {
                    let p = principals[rng.gen_range(0..principals.len())];
                    let amt = rng.gen_range(1..100_000u128);
                    let _ = ledger.request_withdraw(p, amt, slot);
                }
            }
            4 => {
                // Withdraw
                if !principals.is_empty() {
                    let p = principals[rng.gen_range(0..principals.len())];
                    let amt = rng.gen_range(1..100_000u128);
                    let _ = ledger.withdraw(p, amt, slot);
                }
            }
            5 => {
                // Claim rewards
                if !principals.is_empty() {
                    let p = principals[rng.gen_range(0..principals.len())];
                    let _ = ledger.claim_rewards(p, slot);
                }
            }
            6 => {
                // Fund reward budget
                let amt = rng.gen_range(1..1_000_000u128);
                let _ = ledger.fund_rewards(amt);
            }
            7 => {
                // Admin knob changes
                if rng.gen_bool(0.5) {
                    ledger.set_withdraw_delay(rng.gen_range(0..50));
                } else {
                    ledger.set_reward_rate(rng.gen_range(0..500));
                }
            }
            _ => {}
        }

        assert!(
            ledger.check_conservation(),
            "Conservation violated at step {}",
            i
        );
    }
}

#[test]
fn fuzz_checkpoints_never_lose_reward() {
    // Interleave checkpoints at random slots; total owed must match what a
    // single final checkpoint would have produced, because the rate is
    // constant and accrual is linear in elapsed slots.
    let mut rng = XorShiftRng::from_seed([0x17u8; 16]);

    for _ in 0..50 {
        let mut stepped = CustodyLedger::zeroed();
        stepped.init(default_params());
        let mut oneshot = CustodyLedger::zeroed();
        oneshot.init(default_params());

        let amount = rng.gen_range(1..1_000_000_000u128);
        // Keep the deposit a multiple of the denominator so per-step
        // truncation is exact and both paths agree.
        let amount = amount - (amount % 10_000) + 10_000;

        let a = stepped.add_account([1; 32], 0).unwrap();
        let b = oneshot.add_account([1; 32], 0).unwrap();
        stepped.deposit(a, amount, 0).unwrap();
        oneshot.deposit(b, amount, 0).unwrap();

        let mut slot = 0u64;
        for _ in 0..20 {
            slot += rng.gen_range(0..100);
            stepped.checkpoint(a, slot).unwrap();
        }
        oneshot.checkpoint(b, slot).unwrap();

        assert_eq!(
            stepped.accounts[a as usize].accrued_rewards.get(),
            oneshot.accounts[b as usize].accrued_rewards.get()
        );
    }
}
