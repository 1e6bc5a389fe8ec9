use crate::{
    error::{EngineError, Result},
    ingestor::types::{Address, Amount, Transfer},
};
use std::collections::HashMap;

/// Constant balance held over `[from_block, to_block)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceRun {
    pub from_block: u64,
    pub to_block: u64,
    pub balance: Amount,
}

impl BalanceRun {
    pub fn len(&self) -> u64 {
        self.to_block - self.from_block
    }

    pub fn is_empty(&self) -> bool {
        self.to_block == self.from_block
    }
}

/// Per-address view over a pool's transfer log.
///
/// Transfers are ordered by `(block, log_index)` once and indexed by the
/// addresses they touch, so replaying an address never walks the whole log.
/// The zero address is left out: it only stands for mints and burns.
#[derive(Debug, Default)]
pub struct BalanceLedger<'a> {
    by_address: HashMap<Address, Vec<&'a Transfer>>,
}

impl<'a> BalanceLedger<'a> {
    pub fn new(transfers: &'a [Transfer]) -> Self {
        let mut ordered: Vec<&Transfer> = transfers.iter().collect();
        ordered.sort_by_key(|t| t.sort_key());

        let mut by_address: HashMap<Address, Vec<&Transfer>> = HashMap::new();
        for transfer in ordered {
            // self-transfers leave every balance unchanged
            if transfer.from == transfer.to {
                continue;
            }
            if !transfer.from.is_zero() {
                by_address.entry(transfer.from).or_default().push(transfer);
            }
            if !transfer.to.is_zero() {
                by_address.entry(transfer.to).or_default().push(transfer);
            }
        }

        Self { by_address }
    }

    pub fn transfers_for(&self, address: &Address) -> &[&'a Transfer] {
        self.by_address
            .get(address)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_history(&self, address: &Address) -> bool {
        self.by_address.contains_key(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.by_address.keys()
    }

    /// Run-length balance series of `address` over `[start_block, end_block)`.
    ///
    /// Transfers before `start_block` establish the opening balance. Within
    /// the range, the prior balance is held up to each transfer's block and the
    /// transfer takes effect from its own block onwards.
    pub fn balance_runs(
        &self,
        address: &Address,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<BalanceRun>> {
        if end_block < start_block {
            return Err(EngineError::InvalidRange {
                start: start_block,
                end: end_block,
            });
        }

        let mut runs = Vec::new();
        let mut balance: Amount = 0;
        let mut cursor = start_block;

        for transfer in self.transfers_for(address) {
            if transfer.block >= end_block {
                break;
            }
            if transfer.block > cursor {
                push_run(&mut runs, cursor, transfer.block, balance);
                cursor = transfer.block;
            }
            balance = apply(address, balance, transfer)?;
        }
        push_run(&mut runs, cursor, end_block, balance);

        Ok(runs)
    }

    /// Explicit per-block balances over `[start_block, end_block)`
    pub fn dense_balances(
        &self,
        address: &Address,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<Amount>> {
        let runs = self.balance_runs(address, start_block, end_block)?;
        let mut dense = Vec::with_capacity((end_block - start_block) as usize);
        for run in runs {
            dense.extend(std::iter::repeat_n(run.balance, run.len() as usize));
        }
        let expected = (end_block - start_block) as usize;
        if dense.len() != expected {
            return Err(EngineError::LengthMismatch {
                what: "balance series",
                expected,
                actual: dense.len(),
            });
        }
        Ok(dense)
    }

    /// Balance held at `block`, including transfers made in that block
    pub fn balance_at(&self, address: &Address, block: u64) -> Result<Amount> {
        let mut balance: Amount = 0;
        for transfer in self.transfers_for(address) {
            if transfer.block > block {
                break;
            }
            balance = apply(address, balance, transfer)?;
        }
        Ok(balance)
    }
}

fn push_run(runs: &mut Vec<BalanceRun>, from_block: u64, to_block: u64, balance: Amount) {
    if to_block <= from_block {
        return;
    }
    // merge with the previous run when the balance did not change
    if let Some(last) = runs.last_mut() {
        if last.balance == balance && last.to_block == from_block {
            last.to_block = to_block;
            return;
        }
    }
    runs.push(BalanceRun {
        from_block,
        to_block,
        balance,
    });
}

fn apply(address: &Address, balance: Amount, transfer: &Transfer) -> Result<Amount> {
    let mut next = balance;
    if transfer.from == *address {
        next = next
            .checked_sub(transfer.amount)
            .ok_or(EngineError::NegativeBalance {
                address: *address,
                block: transfer.block,
                balance,
                amount: transfer.amount,
            })?;
    }
    if transfer.to == *address {
        next = next
            .checked_add(transfer.amount)
            .ok_or(EngineError::Overflow("address balance"))?;
    }
    Ok(next)
}
