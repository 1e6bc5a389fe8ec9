//! Serde helpers for raw token amounts.
//!
//! Amounts travel as unsigned integer strings since they routinely exceed the
//! range JSON numbers can carry without loss.

/// Serialize a `u128` as a decimal string; accepts either a string or a
/// number when deserializing
pub mod u128_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s
                .trim()
                .parse::<u128>()
                .map_err(|e| D::Error::custom(format!("Invalid amount '{s}': {e}"))),
            Raw::Number(n) => Ok(n as u128),
        }
    }
}
