//! Serde helpers shared by wire formats.

/// Serialize opaque payload bytes as a standard base64 string.
///
/// Use with `#[serde(with = "delay_core::serde::base64_bytes")]` on a
/// `bytes::Bytes` field.
pub mod base64_bytes {
    // Module path shadows the `serde` crate; use `::serde` for the external crate.
    use ::serde::{Deserialize, Deserializer, Serializer, de::Error as _};
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;

    pub fn serialize<S>(value: &Bytes, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(D::Error::custom)
    }
}
