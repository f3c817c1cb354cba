//! Serde helpers for JSON-RPC wire values.
//!
//! Upstream nodes send quantities as `0x` hex strings and byte fields as hex
//! strings of varying case; the gateway emits quantities as JSON numbers and
//! byte fields as canonical lowercase `0x` hex.

/// Parse a quantity given as `0x` hex or plain decimal.
pub fn parse_quantity(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Some(hex_str) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex_str.is_empty() {
            return Ok(0);
        }
        u64::from_str_radix(hex_str, 16).map_err(|e| format!("invalid hex quantity {s:?}: {e}"))
    } else {
        s.parse::<u64>()
            .map_err(|e| format!("invalid quantity {s:?}: {e}"))
    }
}

/// Normalise a hex string to lowercase with a `0x` prefix.
///
/// Accepts input with or without the prefix.
pub fn canonical_hex(s: &str) -> Result<String, String> {
    let s = s.trim();
    let body = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("not a hex string: {s:?}"));
    }
    Ok(format!("0x{}", body.to_ascii_lowercase()))
}

/// `u64` quantity: hex string or number in, JSON number out.
pub mod quantity {
    use serde::{de, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(*value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(QuantityVisitor)
    }

    pub(super) struct QuantityVisitor;

    impl<'de> de::Visitor<'de> for QuantityVisitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a hex quantity string or an unsigned integer")
        }

        fn visit_str<E>(self, value: &str) -> Result<u64, E>
        where
            E: de::Error,
        {
            super::parse_quantity(value).map_err(de::Error::custom)
        }

        fn visit_u64<E>(self, value: u64) -> Result<u64, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_i64<E>(self, value: i64) -> Result<u64, E>
        where
            E: de::Error,
        {
            u64::try_from(value).map_err(|_| de::Error::custom("negative quantity"))
        }
    }

    /// Optional quantity (`null` for pending transactions)
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(v) => serializer.serialize_u64(*v),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
        where
            D: Deserializer<'de>,
        {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] u64);

            Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
        }
    }
}

/// Byte field normalised to canonical lowercase `0x` hex.
pub mod hex_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &str, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::canonical_hex(&raw).map_err(de::Error::custom)
    }

    pub mod option {
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(v) => serializer.serialize_str(v),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| super::super::canonical_hex(&raw).map_err(de::Error::custom))
                .transpose()
        }
    }
}

/// Receipt status: `"0x1"`/`1`/`true` in, `1`/`0` out.
pub mod status_flag {
    use serde::{de, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::from(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StatusVisitor;

        impl<'de> de::Visitor<'de> for StatusVisitor {
            type Value = bool;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a receipt status (0x0/0x1, 0/1 or bool)")
            }

            fn visit_bool<E>(self, value: bool) -> Result<bool, E>
            where
                E: de::Error,
            {
                Ok(value)
            }

            fn visit_u64<E>(self, value: u64) -> Result<bool, E>
            where
                E: de::Error,
            {
                Ok(value != 0)
            }

            fn visit_str<E>(self, value: &str) -> Result<bool, E>
            where
                E: de::Error,
            {
                super::parse_quantity(value)
                    .map(|v| v != 0)
                    .map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(StatusVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(parse_quantity("42").unwrap(), 42);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_canonical_hex() {
        assert_eq!(canonical_hex("0xABcd").unwrap(), "0xabcd");
        assert_eq!(canonical_hex("ABcd").unwrap(), "0xabcd");
        assert_eq!(canonical_hex("0x").unwrap(), "0x");
        assert!(canonical_hex("0xhello").is_err());
    }

    #[test]
    fn test_optional_quantity_null() {
        #[derive(serde::Deserialize)]
        struct Probe {
            #[serde(default, with = "quantity::option")]
            n: Option<u64>,
        }

        let p: Probe = serde_json::from_str(r#"{"n": null}"#).unwrap();
        assert_eq!(p.n, None);
        let p: Probe = serde_json::from_str(r#"{"n": "0x10"}"#).unwrap();
        assert_eq!(p.n, Some(16));
        let p: Probe = serde_json::from_str("{}").unwrap();
        assert_eq!(p.n, None);
    }
}
