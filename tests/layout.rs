//! Slab layout and U128 wrapper tests.
//!
//! The slab is shared between the SBF program and native tooling, so every
//! offset must be identical on both targets. U128 stores its halves as two
//! u64s to pin alignment at 8 on every target.

use bytemuck::bytes_of;
use memoffset::offset_of;
use tidevault_prog::constants::{CONFIG_LEN, HEADER_LEN, LEDGER_LEN, LEDGER_OFF, SLAB_LEN};
use tidevault_prog::engine::{CustodyLedger, LedgerParams, PrincipalAccount, U128, MAX_ACCOUNTS};
use tidevault_prog::state::{SlabHeader, VaultConfig};

/// Golden test values for U128: (value, lo, hi).
const U128_GOLDEN: [(u128, u64, u64); 8] = [
    (0, 0, 0),
    (1, 1, 0),
    (u128::MAX, u64::MAX, u64::MAX),
    (0xFFFF_FFFF_FFFF_FFFF, u64::MAX, 0),
    (1u128 << 64, 0, 1),
    ((1u128 << 64) + 42, 42, 1),
    (0xDEAD_BEEF_CAFE_BABE, 0xDEAD_BEEF_CAFE_BABE, 0),
    (
        0x0102_0304_0506_0708_090A_0B0C_0D0E_0F10,
        0x090A_0B0C_0D0E_0F10,
        0x0102_0304_0506_0708,
    ),
];

#[test]
fn u128_wrapper_golden_values() {
    for (value, expected_lo, expected_hi) in U128_GOLDEN {
        let wrapped = U128::new(value);
        assert_eq!(wrapped.get(), value, "round-trip failed for {}", value);

        // The in-memory form is lo then hi, both little-endian.
        let bytes = bytes_of(&wrapped);
        let lo = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let hi = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        assert_eq!(lo, expected_lo);
        assert_eq!(hi, expected_hi);
    }
}

#[test]
fn u128_set_overwrites_both_halves() {
    let mut v = U128::new(u128::MAX);
    v.set(7);
    assert_eq!(v.get(), 7);
}

#[test]
fn wrapper_alignment_is_8() {
    assert_eq!(std::mem::size_of::<U128>(), 16);
    assert_eq!(std::mem::align_of::<U128>(), 8);
    assert_eq!(std::mem::align_of::<PrincipalAccount>(), 8);
    assert_eq!(std::mem::align_of::<CustodyLedger>(), 8);
}

#[test]
fn principal_account_layout() {
    assert_eq!(offset_of!(PrincipalAccount, owner), 0);
    assert_eq!(offset_of!(PrincipalAccount, balance), 32);
    assert_eq!(offset_of!(PrincipalAccount, request_amount), 48);
    assert_eq!(offset_of!(PrincipalAccount, accrued_rewards), 64);
    assert_eq!(offset_of!(PrincipalAccount, request_maturity_slot), 80);
    assert_eq!(offset_of!(PrincipalAccount, rate_at_deposit_bps), 88);
    assert_eq!(offset_of!(PrincipalAccount, last_checkpoint_slot), 96);
    assert_eq!(offset_of!(PrincipalAccount, request_active), 104);
    assert_eq!(offset_of!(PrincipalAccount, used), 105);
    assert_eq!(std::mem::size_of::<PrincipalAccount>(), 112);
}

#[test]
fn custody_ledger_layout() {
    let table = MAX_ACCOUNTS * std::mem::size_of::<PrincipalAccount>();
    assert_eq!(offset_of!(CustodyLedger, params), table);
    assert_eq!(offset_of!(CustodyLedger, num_used), table + 24);
    assert_eq!(offset_of!(CustodyLedger, total_balance), table + 32);
    assert_eq!(offset_of!(CustodyLedger, total_rewards_owed), table + 48);
    assert_eq!(offset_of!(CustodyLedger, reward_reserve), table + 64);
    assert_eq!(std::mem::size_of::<CustodyLedger>(), table + 80);
    assert_eq!(std::mem::size_of::<LedgerParams>(), 24);
}

#[test]
fn slab_regions_do_not_overlap() {
    assert_eq!(std::mem::size_of::<SlabHeader>(), HEADER_LEN);
    assert_eq!(std::mem::size_of::<VaultConfig>(), CONFIG_LEN);
    assert!(LEDGER_OFF >= HEADER_LEN + CONFIG_LEN);
    assert_eq!(LEDGER_OFF % std::mem::align_of::<CustodyLedger>(), 0);
    assert_eq!(LEDGER_LEN, std::mem::size_of::<CustodyLedger>());
    assert_eq!(SLAB_LEN, LEDGER_OFF + LEDGER_LEN);
}
