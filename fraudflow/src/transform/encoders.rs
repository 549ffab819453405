//! Column encoders used by the feature transformer.

use crate::core::{cast_f64, RawPaymentEvent, SkipReason, AMOUNT_FIELD};
use md5::{Digest, Md5};
use serde_json::Value;

/// Field cast from a code to a number instead of read as one.
pub const GENDER_FIELD: &str = "gender";

/// Appends a one-hot block. Missing and unknown values encode as all zeros.
pub fn one_hot(vocabulary: &[String], value: Option<&str>, out: &mut Vec<f64>) {
    let start = out.len();
    out.resize(start + vocabulary.len(), 0.0);
    if let Some(value) = value.map(str::trim) {
        if let Some(pos) = vocabulary.iter().position(|v| v == value) {
            out[start + pos] = 1.0;
        }
    }
}

/// Bucket and sign of a token in a hashed block of `buckets` slots.
///
/// Stable across processes and platforms.
#[must_use]
pub fn hash_bucket(token: &str, buckets: usize) -> (usize, f64) {
    let digest = Md5::digest(token.as_bytes());
    let raw = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let index = usize::try_from(raw).unwrap_or(usize::MAX) % buckets.max(1);
    let sign = if digest[4] & 0x80 == 0 { 1.0 } else { -1.0 };
    (index, sign)
}

/// Appends a hashed block, accumulating every present token.
pub fn hashed<'a, I>(tokens: I, buckets: usize, out: &mut Vec<f64>)
where
    I: IntoIterator<Item = &'a str>,
{
    let start = out.len();
    out.resize(start + buckets, 0.0);
    if buckets == 0 {
        return;
    }
    for token in tokens {
        let (index, sign) = hash_bucket(token, buckets);
        out[start + index] += sign;
    }
}

/// Reads a required numeric field.
pub fn numeric(event: &RawPaymentEvent, field: &str) -> Result<f64, SkipReason> {
    if field == AMOUNT_FIELD {
        return Ok(event.amount);
    }
    let raw = match event.attributes.get(field) {
        None | Some(Value::Null) => {
            return Err(SkipReason::MissingField {
                field: field.to_string(),
            })
        }
        Some(raw) => raw,
    };
    if field == GENDER_FIELD {
        if let Some(code) = gender_code(raw) {
            return Ok(code);
        }
    }
    cast_f64(raw).ok_or_else(|| SkipReason::Uncastable {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

fn gender_code(value: &Value) -> Option<f64> {
    match value.as_str()?.trim() {
        "M" | "m" => Some(0.0),
        "F" | "f" => Some(1.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_one_hot_known_and_unknown() {
        let vocab = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let mut out = vec![9.0];
        one_hot(&vocab, Some("b"), &mut out);
        assert_eq!(out, vec![9.0, 0.0, 1.0, 0.0]);

        let mut out = Vec::new();
        one_hot(&vocab, Some("zzz"), &mut out);
        assert_eq!(out, vec![0.0; 3]);

        let mut out = Vec::new();
        one_hot(&vocab, None, &mut out);
        assert_eq!(out, vec![0.0; 3]);
    }

    #[test]
    fn test_hash_bucket_stable() {
        let (a, sign_a) = hash_bucket("fraud_Kirlin and Sons", 128);
        let (b, sign_b) = hash_bucket("fraud_Kirlin and Sons", 128);
        assert_eq!(a, b);
        assert_eq!(sign_a, sign_b);
        assert!(a < 128);
    }

    #[test]
    fn test_hashed_block_accumulates() {
        let mut out = Vec::new();
        hashed(["x", "x"], 8, &mut out);
        let (index, sign) = hash_bucket("x", 8);
        assert_eq!(out.len(), 8);
        assert_eq!(out[index], 2.0 * sign);
        assert_eq!(out.iter().filter(|v| **v != 0.0).count(), 1);
    }

    #[test]
    fn test_numeric_reads() {
        let event = RawPaymentEvent::new("T1", 0, 12.0)
            .with_attribute("lat", json!("40.5"))
            .with_attribute("zip", json!(null))
            .with_attribute("long", json!("west"))
            .with_attribute("gender", json!("F"));

        assert_eq!(numeric(&event, "amt"), Ok(12.0));
        assert_eq!(numeric(&event, "lat"), Ok(40.5));
        assert_eq!(numeric(&event, "gender"), Ok(1.0));
        assert_eq!(
            numeric(&event, "zip"),
            Err(SkipReason::MissingField { field: "zip".into() })
        );
        assert!(matches!(
            numeric(&event, "long"),
            Err(SkipReason::Uncastable { .. })
        ));
    }
}
