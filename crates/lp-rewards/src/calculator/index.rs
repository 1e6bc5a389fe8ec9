use crate::ingestor::types::{Address, Transfer};
use indexmap::IndexSet;
use std::collections::BTreeSet;

/// Global address ordering shared by every per-pool vector of a period.
///
/// Built from the union of all non-zero addresses seen in any pool's
/// transfers, sorted so runs are reproducible regardless of fetch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressIndex {
    addresses: IndexSet<Address>,
}

impl AddressIndex {
    pub fn from_transfers<'a, I>(transfers: I) -> Self
    where
        I: IntoIterator<Item = &'a Transfer>,
    {
        let mut seen = BTreeSet::new();
        for transfer in transfers {
            for address in [transfer.from, transfer.to] {
                if !address.is_zero() {
                    seen.insert(address);
                }
            }
        }
        Self {
            addresses: seen.into_iter().collect(),
        }
    }

    pub fn from_addresses<I>(addresses: I) -> Self
    where
        I: IntoIterator<Item = Address>,
    {
        let seen: BTreeSet<Address> = addresses.into_iter().filter(|a| !a.is_zero()).collect();
        Self {
            addresses: seen.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn position(&self, address: &Address) -> Option<usize> {
        self.addresses.get_index_of(address)
    }

    pub fn get(&self, position: usize) -> Option<&Address> {
        self.addresses.get_index(position)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.contains(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.addresses.iter()
    }
}
