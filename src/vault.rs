//! Tidevault: single-file Solana program with an embedded custody ledger.
//!
//! Custodies an SPL collateral token per principal, gates withdrawals behind
//! one-shot time-locked requests, and drips rewards in a second SPL token at
//! a rate captured at deposit time.

#![no_std]
#![deny(unsafe_code)]

extern crate alloc;

pub mod engine;

#[cfg(not(feature = "no-entrypoint"))]
solana_security_txt::security_txt! {
    name: "Tidevault",
    project_url: "https://github.com/tidevault/tidevault-prog",
    contacts: "email:security@tidevault.dev",
    policy: "https://github.com/tidevault/tidevault-prog/blob/main/SECURITY.md",
    preferred_languages: "en"
}

// 1. mod constants
pub mod constants {
    use crate::engine::CustodyLedger;
    use crate::state::VaultConfig;
    use core::mem::{align_of, size_of};

    pub const MAGIC: u64 = 0x5449444556415554; // "TIDEVAUT"
    pub const VERSION: u32 = 1;

    pub const HEADER_LEN: usize = 64;
    pub const CONFIG_LEN: usize = size_of::<VaultConfig>();
    pub const LEDGER_ALIGN: usize = align_of::<CustodyLedger>();

    pub const fn align_up(x: usize, a: usize) -> usize {
        (x + (a - 1)) & !(a - 1)
    }

    pub const LEDGER_OFF: usize = align_up(HEADER_LEN + CONFIG_LEN, LEDGER_ALIGN);
    pub const LEDGER_LEN: usize = size_of::<CustodyLedger>();
    pub const SLAB_LEN: usize = LEDGER_OFF + LEDGER_LEN;
}

// 2. mod zc (Zero-Copy unsafe island)
#[allow(unsafe_code)]
pub mod zc {
    use crate::constants::{LEDGER_ALIGN, LEDGER_LEN, LEDGER_OFF};
    use crate::engine::CustodyLedger;
    use solana_program::program_error::ProgramError;

    #[inline]
    pub fn ledger_ref<'a>(data: &'a [u8]) -> Result<&'a CustodyLedger, ProgramError> {
        if data.len() < LEDGER_OFF + LEDGER_LEN {
            return Err(ProgramError::InvalidAccountData);
        }
        let ptr = unsafe { data.as_ptr().add(LEDGER_OFF) };
        if (ptr as usize) % LEDGER_ALIGN != 0 {
            return Err(ProgramError::InvalidAccountData);
        }
        Ok(unsafe { &*(ptr as *const CustodyLedger) })
    }

    #[inline]
    pub fn ledger_mut<'a>(data: &'a mut [u8]) -> Result<&'a mut CustodyLedger, ProgramError> {
        if data.len() < LEDGER_OFF + LEDGER_LEN {
            return Err(ProgramError::InvalidAccountData);
        }
        let ptr = unsafe { data.as_mut_ptr().add(LEDGER_OFF) };
        if (ptr as usize) % LEDGER_ALIGN != 0 {
            return Err(ProgramError::InvalidAccountData);
        }
        Ok(unsafe { &mut *(ptr as *mut CustodyLedger) })
    }
}

// 3. mod error
pub mod error {
    use crate::engine::LedgerError;
    use num_derive::FromPrimitive;
    use solana_program::{decode_error::DecodeError, program_error::ProgramError};

    #[derive(Clone, Debug, Eq, PartialEq, FromPrimitive)]
    pub enum VaultError {
        InvalidMagic,
        InvalidVersion,
        AlreadyInitialized,
        NotInitialized,
        InvalidSlabLen,
        InvalidVaultAta,
        InvalidMint,
        ExpectedSigner,
        ExpectedWritable,
        NotAdmin,
        Unauthorized,
        // Ledger errors mapped:
        LedgerZeroAmount,
        LedgerZeroAddress,
        LedgerInsufficientBalance,
        LedgerRequestAlreadyExists,
        LedgerRequestNotExists,
        LedgerWithdrawalNotReady,
        LedgerRequestedAmountExceeded,
        LedgerNothingToClaim,
        LedgerOverflow,
        LedgerAccountNotFound,
        LedgerAccountExists,
        LedgerFull,
        LedgerAccountNotEmpty,
        LedgerRewardFundsExhausted,
    }

    impl From<VaultError> for ProgramError {
        fn from(e: VaultError) -> Self {
            ProgramError::Custom(e as u32)
        }
    }

    impl<T> DecodeError<T> for VaultError {
        fn type_of() -> &'static str {
            "VaultError"
        }
    }

    pub fn map_ledger_error(e: LedgerError) -> ProgramError {
        let err = match e {
            LedgerError::ZeroAmount => VaultError::LedgerZeroAmount,
            LedgerError::ZeroAddress => VaultError::LedgerZeroAddress,
            LedgerError::InsufficientBalance => VaultError::LedgerInsufficientBalance,
            LedgerError::RequestAlreadyExists => VaultError::LedgerRequestAlreadyExists,
            LedgerError::RequestNotExists => VaultError::LedgerRequestNotExists,
            LedgerError::WithdrawalNotReady => VaultError::LedgerWithdrawalNotReady,
            LedgerError::RequestedAmountExceeded => VaultError::LedgerRequestedAmountExceeded,
            LedgerError::NothingToClaim => VaultError::LedgerNothingToClaim,
            LedgerError::Overflow => VaultError::LedgerOverflow,
            LedgerError::AccountNotFound => VaultError::LedgerAccountNotFound,
            LedgerError::AccountExists => VaultError::LedgerAccountExists,
            LedgerError::LedgerFull => VaultError::LedgerFull,
            LedgerError::AccountNotEmpty => VaultError::LedgerAccountNotEmpty,
            LedgerError::RewardFundsExhausted => VaultError::LedgerRewardFundsExhausted,
        };
        ProgramError::Custom(err as u32)
    }
}

// 4. mod ix
pub mod ix {
    use crate::engine::LedgerParams;
    use solana_program::{program_error::ProgramError, pubkey::Pubkey};

    #[derive(Debug)]
    pub enum Instruction {
        InitVault {
            admin: Pubkey,
            collateral_mint: Pubkey,
            reward_mint: Pubkey,
            params: LedgerParams,
        },
        InitAccount,
        Deposit { user_idx: u16, amount: u64 },
        RequestWithdraw { user_idx: u16, amount: u64 },
        Withdraw { user_idx: u16, amount: u64 },
        ClaimRewards { user_idx: u16 },
        FundRewards { amount: u64 },
        SetWithdrawDelay { delay_slots: u64 },
        SetRewardRate { rate_bps: u64 },
        CloseAccount { user_idx: u16 },
    }

    impl Instruction {
        pub fn decode(input: &[u8]) -> Result<Self, ProgramError> {
            let (&tag, mut rest) = input
                .split_first()
                .ok_or(ProgramError::InvalidInstructionData)?;

            match tag {
                0 => {
                    let admin = read_pubkey(&mut rest)?;
                    let collateral_mint = read_pubkey(&mut rest)?;
                    let reward_mint = read_pubkey(&mut rest)?;
                    let params = read_params(&mut rest)?;
                    Ok(Instruction::InitVault {
                        admin,
                        collateral_mint,
                        reward_mint,
                        params,
                    })
                }
                1 => Ok(Instruction::InitAccount),
                2 => {
                    let user_idx = read_u16(&mut rest)?;
                    let amount = read_u64(&mut rest)?;
                    Ok(Instruction::Deposit { user_idx, amount })
                }
                3 => {
                    let user_idx = read_u16(&mut rest)?;
                    let amount = read_u64(&mut rest)?;
                    Ok(Instruction::RequestWithdraw { user_idx, amount })
                }
                4 => {
                    let user_idx = read_u16(&mut rest)?;
                    let amount = read_u64(&mut rest)?;
                    Ok(Instruction::Withdraw { user_idx, amount })
                }
                5 => {
                    let user_idx = read_u16(&mut rest)?;
                    Ok(Instruction::ClaimRewards { user_idx })
                }
                6 => {
                    let amount = read_u64(&mut rest)?;
                    Ok(Instruction::FundRewards { amount })
                }
                7 => {
                    let delay_slots = read_u64(&mut rest)?;
                    Ok(Instruction::SetWithdrawDelay { delay_slots })
                }
                8 => {
                    let rate_bps = read_u64(&mut rest)?;
                    Ok(Instruction::SetRewardRate { rate_bps })
                }
                9 => {
                    let user_idx = read_u16(&mut rest)?;
                    Ok(Instruction::CloseAccount { user_idx })
                }
                _ => Err(ProgramError::InvalidInstructionData),
            }
        }
    }

    fn read_u16(input: &mut &[u8]) -> Result<u16, ProgramError> {
        if input.len() < 2 {
            return Err(ProgramError::InvalidInstructionData);
        }
        let (bytes, rest) = input.split_at(2);
        *input = rest;
        Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_u64(input: &mut &[u8]) -> Result<u64, ProgramError> {
        if input.len() < 8 {
            return Err(ProgramError::InvalidInstructionData);
        }
        let (bytes, rest) = input.split_at(8);
        *input = rest;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_pubkey(input: &mut &[u8]) -> Result<Pubkey, ProgramError> {
        if input.len() < 32 {
            return Err(ProgramError::InvalidInstructionData);
        }
        let (bytes, rest) = input.split_at(32);
        *input = rest;
        Ok(Pubkey::new_from_array(bytes.try_into().unwrap()))
    }

    fn read_params(input: &mut &[u8]) -> Result<LedgerParams, ProgramError> {
        Ok(LedgerParams {
            withdraw_delay_slots: read_u64(input)?,
            reward_rate_bps: read_u64(input)?,
            max_accounts: read_u64(input)?,
        })
    }
}

// 5. mod accounts (validation)
pub mod accounts {
    use crate::error::VaultError;
    use solana_program::{account_info::AccountInfo, program_error::ProgramError, pubkey::Pubkey};

    pub fn expect_len(accounts: &[AccountInfo], n: usize) -> Result<(), ProgramError> {
        if accounts.len() < n {
            return Err(ProgramError::NotEnoughAccountKeys);
        }
        Ok(())
    }

    pub fn expect_signer(ai: &AccountInfo) -> Result<(), ProgramError> {
        if !ai.is_signer {
            return Err(VaultError::ExpectedSigner.into());
        }
        Ok(())
    }

    pub fn expect_writable(ai: &AccountInfo) -> Result<(), ProgramError> {
        if !ai.is_writable {
            return Err(VaultError::ExpectedWritable.into());
        }
        Ok(())
    }

    pub fn expect_owner(ai: &AccountInfo, owner: &Pubkey) -> Result<(), ProgramError> {
        if ai.owner != owner {
            return Err(ProgramError::IllegalOwner);
        }
        Ok(())
    }

    pub fn expect_key(ai: &AccountInfo, expected: &Pubkey) -> Result<(), ProgramError> {
        if ai.key != expected {
            return Err(ProgramError::InvalidArgument);
        }
        Ok(())
    }

    pub fn derive_vault_authority(program_id: &Pubkey, slab_key: &Pubkey) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[b"vault", slab_key.as_ref()], program_id)
    }
}

// 6. mod state
pub mod state {
    use crate::constants::{CONFIG_LEN, HEADER_LEN};
    use bytemuck::{Pod, Zeroable};
    use core::cell::RefMut;
    use solana_program::account_info::AccountInfo;
    use solana_program::program_error::ProgramError;

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct SlabHeader {
        pub magic: u64,
        pub version: u32,
        pub bump: u8,
        pub _padding: [u8; 3],
        pub admin: [u8; 32],
        pub _reserved: [u8; 16],
    }

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct VaultConfig {
        pub collateral_mint: [u8; 32],
        pub vault_pubkey: [u8; 32],
        pub reward_mint: [u8; 32],
        pub reward_vault_pubkey: [u8; 32],
        pub vault_authority_bump: u8,
        pub _padding: [u8; 7],
    }

    pub fn slab_data_mut<'a, 'b>(
        ai: &'b AccountInfo<'a>,
    ) -> Result<RefMut<'b, &'a mut [u8]>, ProgramError> {
        Ok(ai.try_borrow_mut_data()?)
    }

    pub fn read_header(data: &[u8]) -> SlabHeader {
        let mut h = SlabHeader::zeroed();
        let src = &data[..HEADER_LEN];
        let dst = bytemuck::bytes_of_mut(&mut h);
        dst.copy_from_slice(src);
        h
    }

    pub fn write_header(data: &mut [u8], h: &SlabHeader) {
        let src = bytemuck::bytes_of(h);
        let dst = &mut data[..HEADER_LEN];
        dst.copy_from_slice(src);
    }

    pub fn read_config(data: &[u8]) -> VaultConfig {
        let mut c = VaultConfig::zeroed();
        let src = &data[HEADER_LEN..HEADER_LEN + CONFIG_LEN];
        let dst = bytemuck::bytes_of_mut(&mut c);
        dst.copy_from_slice(src);
        c
    }

    pub fn write_config(data: &mut [u8], c: &VaultConfig) {
        let src = bytemuck::bytes_of(c);
        let dst = &mut data[HEADER_LEN..HEADER_LEN + CONFIG_LEN];
        dst.copy_from_slice(src);
    }
}

// 7. mod token (value transfer primitive)
pub mod token {
    use solana_program::{account_info::AccountInfo, program_error::ProgramError};

    #[cfg(not(test))]
    use solana_program::program::{invoke, invoke_signed};

    #[cfg(test)]
    use solana_program::program_pack::Pack;
    #[cfg(test)]
    use spl_token::state::Account as TokenAccount;

    /// Pull tokens from the caller into a vault. Under test the CPI is
    /// simulated by direct pack/unpack so the processor is testable without
    /// a runtime.
    pub fn deposit<'a>(
        _token_program: &AccountInfo<'a>,
        source: &AccountInfo<'a>,
        dest: &AccountInfo<'a>,
        _authority: &AccountInfo<'a>,
        amount: u64,
    ) -> Result<(), ProgramError> {
        #[cfg(not(test))]
        {
            let ix = spl_token::instruction::transfer(
                _token_program.key,
                source.key,
                dest.key,
                _authority.key,
                &[],
                amount,
            )?;
            invoke(
                &ix,
                &[
                    source.clone(),
                    dest.clone(),
                    _authority.clone(),
                    _token_program.clone(),
                ],
            )
        }
        #[cfg(test)]
        {
            let mut src_data = source.try_borrow_mut_data()?;
            let mut src_state = TokenAccount::unpack(&src_data)?;
            src_state.amount = src_state
                .amount
                .checked_sub(amount)
                .ok_or(ProgramError::InsufficientFunds)?;
            TokenAccount::pack(src_state, &mut src_data)?;

            let mut dst_data = dest.try_borrow_mut_data()?;
            let mut dst_state = TokenAccount::unpack(&dst_data)?;
            dst_state.amount = dst_state
                .amount
                .checked_add(amount)
                .ok_or(ProgramError::InvalidAccountData)?;
            TokenAccount::pack(dst_state, &mut dst_data)?;
            Ok(())
        }
    }

    /// Push tokens out of a vault, signed by the vault authority PDA.
    pub fn withdraw<'a>(
        _token_program: &AccountInfo<'a>,
        source: &AccountInfo<'a>,
        dest: &AccountInfo<'a>,
        _authority: &AccountInfo<'a>,
        amount: u64,
        _signer_seeds: &[&[&[u8]]],
    ) -> Result<(), ProgramError> {
        #[cfg(not(test))]
        {
            let ix = spl_token::instruction::transfer(
                _token_program.key,
                source.key,
                dest.key,
                _authority.key,
                &[],
                amount,
            )?;
            invoke_signed(
                &ix,
                &[
                    source.clone(),
                    dest.clone(),
                    _authority.clone(),
                    _token_program.clone(),
                ],
                _signer_seeds,
            )
        }
        #[cfg(test)]
        {
            let mut src_data = source.try_borrow_mut_data()?;
            let mut src_state = TokenAccount::unpack(&src_data)?;
            src_state.amount = src_state
                .amount
                .checked_sub(amount)
                .ok_or(ProgramError::InsufficientFunds)?;
            TokenAccount::pack(src_state, &mut src_data)?;

            let mut dst_data = dest.try_borrow_mut_data()?;
            let mut dst_state = TokenAccount::unpack(&dst_data)?;
            dst_state.amount = dst_state
                .amount
                .checked_add(amount)
                .ok_or(ProgramError::InvalidAccountData)?;
            TokenAccount::pack(dst_state, &mut dst_data)?;
            Ok(())
        }
    }
}

// 8. mod processor
pub mod processor {
    use alloc::format;

    use crate::{
        accounts,
        constants::{MAGIC, SLAB_LEN, VERSION},
        error::{map_ledger_error, VaultError},
        ix::Instruction,
        state::{self, SlabHeader, VaultConfig},
        token, zc,
    };
    use solana_program::{
        account_info::AccountInfo,
        entrypoint::ProgramResult,
        msg,
        program_error::ProgramError,
        program_pack::Pack,
        pubkey::Pubkey,
        sysvar::{clock::Clock, Sysvar},
    };

    fn slab_guard(program_id: &Pubkey, slab: &AccountInfo, data: &[u8]) -> Result<(), ProgramError> {
        accounts::expect_owner(slab, program_id)?;
        if data.len() != SLAB_LEN {
            return Err(VaultError::InvalidSlabLen.into());
        }
        Ok(())
    }

    fn require_initialized(data: &[u8]) -> Result<(), ProgramError> {
        let h = state::read_header(data);
        if h.magic != MAGIC {
            return Err(VaultError::NotInitialized.into());
        }
        if h.version != VERSION {
            return Err(VaultError::InvalidVersion.into());
        }
        Ok(())
    }

    fn require_admin(data: &[u8], signer: &AccountInfo) -> Result<(), ProgramError> {
        let h = state::read_header(data);
        if Pubkey::new_from_array(h.admin) != *signer.key {
            return Err(VaultError::NotAdmin.into());
        }
        Ok(())
    }

    fn require_principal(
        ledger: &crate::engine::CustodyLedger,
        idx: u16,
        signer: &AccountInfo,
    ) -> Result<(), ProgramError> {
        if !ledger.is_used(idx as usize) {
            return Err(VaultError::LedgerAccountNotFound.into());
        }
        let owner = ledger.accounts[idx as usize].owner;
        if Pubkey::new_from_array(owner) != *signer.key {
            return Err(VaultError::Unauthorized.into());
        }
        Ok(())
    }

    fn verify_vault(
        a_vault: &AccountInfo,
        expected_owner: &Pubkey,
        expected_mint: &Pubkey,
        expected_pubkey: &Pubkey,
    ) -> Result<(), ProgramError> {
        if a_vault.key != expected_pubkey {
            return Err(VaultError::InvalidVaultAta.into());
        }
        if a_vault.owner != &spl_token::ID {
            return Err(VaultError::InvalidVaultAta.into());
        }
        if a_vault.data_len() != spl_token::state::Account::LEN {
            return Err(VaultError::InvalidVaultAta.into());
        }

        let data = a_vault.try_borrow_data()?;
        let tok = spl_token::state::Account::unpack(&data)?;
        if tok.mint != *expected_mint {
            return Err(VaultError::InvalidMint.into());
        }
        if tok.owner != *expected_owner {
            return Err(VaultError::InvalidVaultAta.into());
        }
        Ok(())
    }

    fn vault_signer_seeds(slab_key: &Pubkey, bump: u8) -> ([u8; 1], [u8; 32]) {
        ([bump], slab_key.to_bytes())
    }

    pub fn process_instruction<'a, 'b>(
        program_id: &Pubkey,
        accounts: &'b [AccountInfo<'a>],
        instruction_data: &[u8],
    ) -> ProgramResult {
        let instruction = Instruction::decode(instruction_data)?;

        match instruction {
            Instruction::InitVault {
                admin,
                collateral_mint,
                reward_mint,
                params,
            } => {
                accounts::expect_len(accounts, 7)?;
                let a_admin = &accounts[0];
                let a_slab = &accounts[1];
                let a_mint = &accounts[2];
                let a_vault = &accounts[3];
                let a_reward_mint = &accounts[4];
                let a_reward_vault = &accounts[5];

                accounts::expect_signer(a_admin)?;
                accounts::expect_writable(a_slab)?;
                accounts::expect_key(a_mint, &collateral_mint)?;
                accounts::expect_key(a_reward_mint, &reward_mint)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;

                let header = state::read_header(&data);
                if header.magic == MAGIC {
                    return Err(VaultError::AlreadyInitialized.into());
                }

                let (auth, bump) = accounts::derive_vault_authority(program_id, a_slab.key);
                verify_vault(a_vault, &auth, a_mint.key, a_vault.key)?;
                verify_vault(a_reward_vault, &auth, a_reward_mint.key, a_reward_vault.key)?;

                for b in data.iter_mut() {
                    *b = 0;
                }

                let ledger = zc::ledger_mut(&mut data)?;
                ledger.init(params);

                let config = VaultConfig {
                    collateral_mint: a_mint.key.to_bytes(),
                    vault_pubkey: a_vault.key.to_bytes(),
                    reward_mint: a_reward_mint.key.to_bytes(),
                    reward_vault_pubkey: a_reward_vault.key.to_bytes(),
                    vault_authority_bump: bump,
                    _padding: [0; 7],
                };
                state::write_config(&mut data, &config);

                let new_header = SlabHeader {
                    magic: MAGIC,
                    version: VERSION,
                    bump,
                    _padding: [0; 3],
                    admin: admin.to_bytes(),
                    _reserved: [0; 16],
                };
                state::write_header(&mut data, &new_header);
            }
            Instruction::InitAccount => {
                accounts::expect_len(accounts, 3)?;
                let a_user = &accounts[0];
                let a_slab = &accounts[1];
                let a_clock = &accounts[2];

                accounts::expect_signer(a_user)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;

                let clock = Clock::from_account_info(a_clock)?;
                let ledger = zc::ledger_mut(&mut data)?;
                let idx = ledger
                    .add_account(a_user.key.to_bytes(), clock.slot)
                    .map_err(map_ledger_error)?;
                msg!("account_opened: idx={}", idx);
            }
            Instruction::Deposit { user_idx, amount } => {
                accounts::expect_len(accounts, 6)?;
                let a_user = &accounts[0];
                let a_slab = &accounts[1];
                let a_user_ata = &accounts[2];
                let a_vault = &accounts[3];
                let a_token = &accounts[4];
                let a_clock = &accounts[5];

                accounts::expect_signer(a_user)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;
                let config = state::read_config(&data);

                let (auth, _) = accounts::derive_vault_authority(program_id, a_slab.key);
                verify_vault(
                    a_vault,
                    &auth,
                    &Pubkey::new_from_array(config.collateral_mint),
                    &Pubkey::new_from_array(config.vault_pubkey),
                )?;

                let clock = Clock::from_account_info(a_clock)?;
                let ledger = zc::ledger_mut(&mut data)?;
                require_principal(ledger, user_idx, a_user)?;

                token::deposit(a_token, a_user_ata, a_vault, a_user, amount)?;
                ledger
                    .deposit(user_idx, amount as u128, clock.slot)
                    .map_err(map_ledger_error)?;
                msg!("deposit: idx={} amount={}", user_idx, amount);
            }
            Instruction::RequestWithdraw { user_idx, amount } => {
                accounts::expect_len(accounts, 3)?;
                let a_user = &accounts[0];
                let a_slab = &accounts[1];
                let a_clock = &accounts[2];

                accounts::expect_signer(a_user)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;

                let clock = Clock::from_account_info(a_clock)?;
                let ledger = zc::ledger_mut(&mut data)?;
                require_principal(ledger, user_idx, a_user)?;

                let maturity = ledger
                    .request_withdraw(user_idx, amount as u128, clock.slot)
                    .map_err(map_ledger_error)?;
                msg!(
                    "withdraw_requested: idx={} amount={} maturity_slot={}",
                    user_idx,
                    amount,
                    maturity
                );
            }
            Instruction::Withdraw { user_idx, amount } => {
                accounts::expect_len(accounts, 7)?;
                let a_user = &accounts[0];
                let a_slab = &accounts[1];
                let a_vault = &accounts[2];
                let a_user_ata = &accounts[3];
                let a_vault_pda = &accounts[4];
                let a_token = &accounts[5];
                let a_clock = &accounts[6];

                accounts::expect_signer(a_user)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;
                let config = state::read_config(&data);

                let (derived_pda, _) = accounts::derive_vault_authority(program_id, a_slab.key);
                accounts::expect_key(a_vault_pda, &derived_pda)?;
                verify_vault(
                    a_vault,
                    &derived_pda,
                    &Pubkey::new_from_array(config.collateral_mint),
                    &Pubkey::new_from_array(config.vault_pubkey),
                )?;

                let clock = Clock::from_account_info(a_clock)?;
                let ledger = zc::ledger_mut(&mut data)?;
                require_principal(ledger, user_idx, a_user)?;

                // Effects first: the request is consumed and the balance
                // debited before any tokens move.
                ledger
                    .withdraw(user_idx, amount as u128, clock.slot)
                    .map_err(map_ledger_error)?;

                let (bump_arr, slab_bytes) =
                    vault_signer_seeds(a_slab.key, config.vault_authority_bump);
                let seeds: [&[u8]; 3] = [b"vault", &slab_bytes, &bump_arr];
                let signer_seeds: [&[&[u8]]; 1] = [&seeds];

                token::withdraw(a_token, a_vault, a_user_ata, a_vault_pda, amount, &signer_seeds)?;
                msg!("withdraw: idx={} amount={}", user_idx, amount);
            }
            Instruction::ClaimRewards { user_idx } => {
                accounts::expect_len(accounts, 7)?;
                let a_user = &accounts[0];
                let a_slab = &accounts[1];
                let a_reward_vault = &accounts[2];
                let a_user_ata = &accounts[3];
                let a_vault_pda = &accounts[4];
                let a_token = &accounts[5];
                let a_clock = &accounts[6];

                accounts::expect_signer(a_user)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;
                let config = state::read_config(&data);

                let (derived_pda, _) = accounts::derive_vault_authority(program_id, a_slab.key);
                accounts::expect_key(a_vault_pda, &derived_pda)?;
                verify_vault(
                    a_reward_vault,
                    &derived_pda,
                    &Pubkey::new_from_array(config.reward_mint),
                    &Pubkey::new_from_array(config.reward_vault_pubkey),
                )?;

                let clock = Clock::from_account_info(a_clock)?;
                let ledger = zc::ledger_mut(&mut data)?;
                require_principal(ledger, user_idx, a_user)?;

                let payout = ledger
                    .claim_rewards(user_idx, clock.slot)
                    .map_err(map_ledger_error)?;
                let payout_u64: u64 = payout
                    .try_into()
                    .map_err(|_| VaultError::LedgerOverflow)?;

                let (bump_arr, slab_bytes) =
                    vault_signer_seeds(a_slab.key, config.vault_authority_bump);
                let seeds: [&[u8]; 3] = [b"vault", &slab_bytes, &bump_arr];
                let signer_seeds: [&[&[u8]]; 1] = [&seeds];

                token::withdraw(
                    a_token,
                    a_reward_vault,
                    a_user_ata,
                    a_vault_pda,
                    payout_u64,
                    &signer_seeds,
                )?;
                msg!("reward_claimed: idx={} amount={}", user_idx, payout_u64);
            }
            Instruction::FundRewards { amount } => {
                accounts::expect_len(accounts, 5)?;
                let a_funder = &accounts[0];
                let a_slab = &accounts[1];
                let a_funder_ata = &accounts[2];
                let a_reward_vault = &accounts[3];
                let a_token = &accounts[4];

                accounts::expect_signer(a_funder)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;
                let config = state::read_config(&data);

                let (auth, _) = accounts::derive_vault_authority(program_id, a_slab.key);
                verify_vault(
                    a_reward_vault,
                    &auth,
                    &Pubkey::new_from_array(config.reward_mint),
                    &Pubkey::new_from_array(config.reward_vault_pubkey),
                )?;

                let ledger = zc::ledger_mut(&mut data)?;

                token::deposit(a_token, a_funder_ata, a_reward_vault, a_funder, amount)?;
                ledger
                    .fund_rewards(amount as u128)
                    .map_err(map_ledger_error)?;
            }
            Instruction::SetWithdrawDelay { delay_slots } => {
                accounts::expect_len(accounts, 2)?;
                let a_admin = &accounts[0];
                let a_slab = &accounts[1];

                accounts::expect_signer(a_admin)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;
                require_admin(&data, a_admin)?;

                let ledger = zc::ledger_mut(&mut data)?;
                ledger.set_withdraw_delay(delay_slots);
            }
            Instruction::SetRewardRate { rate_bps } => {
                accounts::expect_len(accounts, 2)?;
                let a_admin = &accounts[0];
                let a_slab = &accounts[1];

                accounts::expect_signer(a_admin)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;
                require_admin(&data, a_admin)?;

                let ledger = zc::ledger_mut(&mut data)?;
                ledger.set_reward_rate(rate_bps);
            }
            Instruction::CloseAccount { user_idx } => {
                accounts::expect_len(accounts, 2)?;
                let a_user = &accounts[0];
                let a_slab = &accounts[1];

                accounts::expect_signer(a_user)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;

                let ledger = zc::ledger_mut(&mut data)?;
                require_principal(ledger, user_idx, a_user)?;
                ledger.close_account(user_idx).map_err(map_ledger_error)?;
            }
        }
        Ok(())
    }
}

// 9. mod entrypoint
#[cfg(not(feature = "no-entrypoint"))]
pub mod entrypoint {
    use crate::processor;
    use solana_program::{
        account_info::AccountInfo, entrypoint, entrypoint::ProgramResult, pubkey::Pubkey,
    };

    entrypoint!(process_instruction);

    fn process_instruction<'a>(
        program_id: &Pubkey,
        accounts: &'a [AccountInfo<'a>],
        instruction_data: &[u8],
    ) -> ProgramResult {
        processor::process_instruction(program_id, accounts, instruction_data)
    }
}
