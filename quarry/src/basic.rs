//! Canonical serialized form shared by every strategy.
//!
//! Templates serialize to a small JSON subset: integers, booleans, null and
//! lists. The helpers here perform the structural checks used by
//! `from_basic` implementations.

use crate::error::BadData;

/// Canonical serialized representation of a template
pub type Basic = serde_json::Value;

/// Require `data` to be a list, returning its elements
pub fn check_list(data: &Basic) -> Result<&[Basic], BadData> {
    match data {
        Basic::Array(items) => Ok(items),
        other => Err(BadData::new(format!("expected a list but got {}", other))),
    }
}

/// Require `data` to be a list of exactly `length` elements
pub fn check_length(length: usize, data: &Basic) -> Result<&[Basic], BadData> {
    let items = check_list(data)?;
    if items.len() != length {
        return Err(BadData::new(format!(
            "expected {} elements but got {}",
            length,
            items.len()
        )));
    }
    Ok(items)
}

/// Require `data` to be an integer representable as `i128`
pub fn check_integer(data: &Basic) -> Result<i128, BadData> {
    match data {
        Basic::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .ok_or_else(|| BadData::new(format!("expected an integer but got {}", n))),
        other => Err(BadData::new(format!(
            "expected an integer but got {}",
            other
        ))),
    }
}

/// Require `data` to be a non-negative integer fitting in a `u64`
pub fn check_u64(data: &Basic) -> Result<u64, BadData> {
    let value = check_integer(data)?;
    u64::try_from(value).map_err(|_| BadData::new(format!("{} is not a valid seed", value)))
}

/// Require `data` to be a boolean
pub fn check_bool(data: &Basic) -> Result<bool, BadData> {
    data.as_bool()
        .ok_or_else(|| BadData::new(format!("expected a boolean but got {}", data)))
}

/// Render an `i128` as basic data, preferring the narrowest JSON integer
pub fn integer_to_basic(value: i128) -> Basic {
    if let Ok(v) = i64::try_from(value) {
        Basic::from(v)
    } else if let Ok(v) = u64::try_from(value) {
        Basic::from(v)
    } else {
        Basic::from(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_length() {
        assert!(check_length(2, &json!([1, 2])).is_ok());
        assert!(check_length(2, &json!([1])).is_err());
        assert!(check_length(2, &json!(7)).is_err());
    }

    #[test]
    fn test_check_integer() {
        assert_eq!(check_integer(&json!(-3)).unwrap(), -3);
        assert_eq!(check_integer(&json!(u64::MAX)).unwrap(), u64::MAX as i128);
        assert!(check_integer(&json!(1.5)).is_err());
        assert!(check_integer(&json!("1")).is_err());
    }

    #[test]
    fn test_check_u64_rejects_negative() {
        assert!(check_u64(&json!(-1)).is_err());
        assert_eq!(check_u64(&json!(12)).unwrap(), 12);
    }

    #[test]
    fn test_integer_to_basic() {
        assert_eq!(integer_to_basic(-5), json!(-5));
        assert_eq!(integer_to_basic(u64::MAX as i128), json!(u64::MAX));
    }
}
