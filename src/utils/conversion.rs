//! Lenient numeric decoding for node responses.
//!
//! The node is not consistent about numeric ids and amounts: token ids come
//! back as `0` in one call and `"0"` in the next, amounts as floats or as
//! decimal strings. These helpers accept both.

use serde::{de, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    String(String),
}

/// Deserialize a `u32` from either a JSON number or a decimal string.
pub fn u32_lenient<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| de::Error::custom(format!("invalid id: {}", n))),
        NumberOrString::String(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| de::Error::custom(format!("invalid id: {:?}", s))),
    }
}

/// Deserialize an `f64` from either a JSON number or a decimal string.
pub fn f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom(format!("invalid amount: {}", n))),
        NumberOrString::String(s) => parse_amount(&s)
            .ok_or_else(|| de::Error::custom(format!("invalid amount: {:?}", s))),
    }
}

/// Deserialize an optional `f64` leniently; `null` and missing map to `None`.
pub fn f64_lenient_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "f64_lenient")] f64);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
}

/// Parse a node amount string. Accepts `"12.5"` as well as the
/// `"12.5@DFI"` amount-with-symbol notation.
pub fn parse_amount(s: &str) -> Option<f64> {
    let value = s.split('@').next()?.trim();
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}
