use crate::{calculator::allocation::PayoutMap, ingestor::types::Address};
use anyhow::Result;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// One payout line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRow {
    pub address: Address,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
}

/// Payout report as handed to the distributor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayoutReport {
    rows: Vec<PayoutRow>,
}

impl PayoutReport {
    /// Truncate every payout to `precision` decimals and drop what is left
    /// non-positive. Rows are ordered by address.
    pub fn from_payouts(payouts: &PayoutMap, precision: u32, asset: Option<&str>) -> Self {
        let rows = payouts
            .iter()
            .filter_map(|(address, amount)| {
                let truncated = amount
                    .round_dp_with_strategy(precision, RoundingStrategy::ToZero)
                    .normalize();
                (truncated > Decimal::ZERO).then(|| PayoutRow {
                    address: *address,
                    amount: truncated,
                    asset: asset.map(str::to_string),
                })
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[PayoutRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total(&self) -> Decimal {
        self.rows.iter().map(|r| r.amount).sum()
    }

    pub fn to_map(&self) -> PayoutMap {
        self.rows.iter().map(|r| (r.address, r.amount)).collect()
    }

    /// `address,amount[,asset]` with a header row
    pub fn to_csv(&self) -> Result<String> {
        let with_asset = self.rows.iter().any(|r| r.asset.is_some());
        let mut wtr = csv::Writer::from_writer(vec![]);
        if with_asset {
            wtr.write_record(["address", "amount", "asset"])?;
        } else {
            wtr.write_record(["address", "amount"])?;
        }
        for row in &self.rows {
            let mut record = vec![row.address.to_string(), row.amount.to_string()];
            if with_asset {
                record.push(row.asset.clone().unwrap_or_default());
            }
            wtr.write_record(&record)?;
        }
        let data = wtr.into_inner()?;
        Ok(String::from_utf8(data)?)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        if pretty {
            Ok(serde_json::to_string_pretty(self)?)
        } else {
            Ok(serde_json::to_string(self)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::new(bytes)
    }

    fn payouts() -> PayoutMap {
        PayoutMap::from([
            (addr(2), dec!(12.3456789)),
            (addr(1), dec!(0.0000009)),
            (addr(3), dec!(-4)),
            (addr(4), dec!(987.6543219)),
        ])
    }

    #[test]
    fn test_truncates_and_omits_non_positive() {
        let report = PayoutReport::from_payouts(&payouts(), 6, None);
        assert_eq!(report.len(), 2);
        assert_eq!(report.rows()[0].address, addr(2));
        assert_eq!(report.rows()[0].amount, dec!(12.345678));
        assert_eq!(report.rows()[1].amount, dec!(987.654321));
        assert_eq!(report.total(), dec!(999.999999));
        // never rounds up
        assert!(report.total() <= payouts().values().filter(|v| **v > Decimal::ZERO).sum());
    }

    #[test]
    fn test_csv_output() {
        let report = PayoutReport::from_payouts(&payouts(), 2, None);
        let csv = report.to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "address,amount");
        assert_eq!(
            lines[1],
            format!("{},12.34", addr(2))
        );

        let tagged = PayoutReport::from_payouts(&payouts(), 2, Some("GOV"));
        let csv = tagged.to_csv().unwrap();
        assert_eq!(csv.lines().next(), Some("address,amount,asset"));
        assert!(csv.lines().nth(1).unwrap().ends_with(",GOV"));
    }

    #[test]
    fn test_json_roundtrip() {
        let report = PayoutReport::from_payouts(&payouts(), 4, Some("GOV"));
        let json = report.to_json(false).unwrap();
        let parsed: PayoutReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
        assert_eq!(parsed.to_map()[&addr(4)], dec!(987.6543));

        let untagged = PayoutReport::from_payouts(&payouts(), 4, None);
        assert!(!untagged.to_json(false).unwrap().contains("asset"));
    }
}
