// =============================================================================
// CPI Swap Router
// =============================================================================
// Swaps through the pool's configured swap program with a manual CPI. The
// pool PDA signs as owner of both vaults; the venue moves tokens between the
// vaults and its own reserves. Route-specific accounts come from the
// instruction's remaining accounts, in the order the venue expects.
//
// Instruction layout: 8-byte Anchor discriminator of
// `global:swap_exact_input` / `global:swap_exact_output`, then Borsh
// `SwapArgs`. Fills are measured from the vault balance deltas, not from the
// venue's return data.
// =============================================================================

use anchor_lang::prelude::*;
use anchor_lang::solana_program::{
    instruction::{AccountMeta, Instruction},
    program::invoke_signed,
};
use anchor_spl::token::accessor;
use solana_program::hash::hash;

use crate::engine::{SwapDirection, SwapRouter};
use crate::error::MarginPoolError;

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapArgs {
    pub direction: SwapDirection,
    /// Exact input, or exact output
    pub amount: u64,
    /// Minimum output, or maximum input
    pub limit: u64,
}

/// First 8 bytes of `sha256("global:<name>")`.
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    let preimage = format!("global:{}", name);
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash(preimage.as_bytes()).to_bytes()[..8]);
    out
}

pub fn encode_swap(name: &str, args: &SwapArgs) -> Result<Vec<u8>> {
    let mut data = instruction_discriminator(name).to_vec();
    args.serialize(&mut data)
        .map_err(|_| error!(MarginPoolError::SwapFailed))?;
    Ok(data)
}

pub struct CpiSwapRouter<'a, 'info> {
    pub swap_program: AccountInfo<'info>,
    /// Pool PDA, signer for the vaults
    pub pool: AccountInfo<'info>,
    pub base_vault: AccountInfo<'info>,
    pub quote_vault: AccountInfo<'info>,
    pub token_program: AccountInfo<'info>,
    pub route_accounts: &'a [AccountInfo<'info>],
    pub signer_seeds: &'a [&'a [&'a [u8]]],
}

/// Vault movement of one swap.
struct Fill {
    spent: u64,
    received: u64,
}

impl<'a, 'info> CpiSwapRouter<'a, 'info> {
    fn balances(&self) -> Result<(u64, u64)> {
        Ok((accessor::amount(&self.base_vault)?, accessor::amount(&self.quote_vault)?))
    }

    fn invoke(&self, name: &str, args: SwapArgs) -> Result<Fill> {
        let mut accounts = vec![
            AccountMeta::new_readonly(self.pool.key(), true),
            AccountMeta::new(self.base_vault.key(), false),
            AccountMeta::new(self.quote_vault.key(), false),
            AccountMeta::new_readonly(self.token_program.key(), false),
        ];
        accounts.extend(self.route_accounts.iter().map(|acc| {
            if acc.is_writable {
                AccountMeta::new(*acc.key, acc.is_signer)
            } else {
                AccountMeta::new_readonly(*acc.key, acc.is_signer)
            }
        }));

        let instruction = Instruction {
            program_id: self.swap_program.key(),
            accounts,
            data: encode_swap(name, &args)?,
        };

        let mut account_infos = vec![
            self.pool.clone(),
            self.base_vault.clone(),
            self.quote_vault.clone(),
            self.token_program.clone(),
        ];
        account_infos.extend(self.route_accounts.iter().cloned());

        let (base_before, quote_before) = self.balances()?;
        invoke_signed(&instruction, &account_infos, self.signer_seeds).map_err(|e| {
            msg!("Swap CPI failed: {:?}", e);
            error!(MarginPoolError::SwapFailed)
        })?;
        let (base_after, quote_after) = self.balances()?;

        let fill = match args.direction {
            SwapDirection::BaseToQuote => Fill {
                spent: base_before.saturating_sub(base_after),
                received: quote_after.saturating_sub(quote_before),
            },
            SwapDirection::QuoteToBase => Fill {
                spent: quote_before.saturating_sub(quote_after),
                received: base_after.saturating_sub(base_before),
            },
        };
        msg!("Swap {:?}: spent {}, received {}", args.direction, fill.spent, fill.received);
        Ok(fill)
    }
}

impl<'a, 'info> SwapRouter for CpiSwapRouter<'a, 'info> {
    fn swap_exact_input(&mut self, direction: SwapDirection, amount_in: u64, min_amount_out: u64) -> Result<u64> {
        let fill = self.invoke(
            "swap_exact_input",
            SwapArgs {
                direction,
                amount: amount_in,
                limit: min_amount_out,
            },
        )?;
        require!(fill.spent <= amount_in, MarginPoolError::SwapFailed);
        require!(fill.received >= min_amount_out, MarginPoolError::SlippageExceeded);
        Ok(fill.received)
    }

    fn swap_exact_output(&mut self, direction: SwapDirection, max_amount_in: u64, amount_out: u64) -> Result<u64> {
        let fill = self.invoke(
            "swap_exact_output",
            SwapArgs {
                direction,
                amount: amount_out,
                limit: max_amount_in,
            },
        )?;
        require!(fill.received >= amount_out, MarginPoolError::SwapFailed);
        require!(fill.spent <= max_amount_in, MarginPoolError::SlippageExceeded);
        Ok(fill.spent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminators_differ_per_instruction() {
        let input = instruction_discriminator("swap_exact_input");
        let output = instruction_discriminator("swap_exact_output");
        assert_ne!(input, output);
        assert_eq!(input, instruction_discriminator("swap_exact_input"));
    }

    #[test]
    fn test_swap_data_layout() {
        let args = SwapArgs {
            direction: SwapDirection::QuoteToBase,
            amount: 500,
            limit: 7,
        };
        let data = encode_swap("swap_exact_input", &args).unwrap();
        assert_eq!(data.len(), 8 + 1 + 8 + 8);
        assert_eq!(data[8], 1);
        assert_eq!(&data[9..17], &500u64.to_le_bytes());
        assert_eq!(&data[17..25], &7u64.to_le_bytes());
        assert_eq!(SwapArgs::deserialize(&mut &data[8..]).unwrap(), args);
    }
}
