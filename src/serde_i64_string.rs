//! Serialize i64 as JSON string (for JS safe integer range); deserialize from string or number.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize<S>(value: &i64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    value.to_string().serialize(serializer)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        Str(String),
        Num(i64),
    }
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Str(s) => s.parse().map_err(serde::de::Error::custom),
        StringOrNumber::Num(n) => Ok(n),
    }
}
