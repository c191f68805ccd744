//! Resource id strategies: how each row acquires a durable unique key.
//!
//! The registry is an immutable map from [`IdType`] to an id-deriving function,
//! built once at startup and passed by reference to the schema and model stages.

use crate::error::ConfigError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use md5::Md5;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Separator used when joining key fields unless configured otherwise.
pub const DEFAULT_CONCAT_SEP: &str = ".";

/// REST resource id types.
///
/// - `BizKey`: reuse an existing primary key as-is. Must be a single field and,
///   if create is exposed, an integer so the database can assign it.
/// - `BizKeyComposite`: concatenated key fields as a single id field.
/// - `BizHashMd5` / `BizHashSha256`: hex digest of the concatenated key fields.
/// - `Uuid4Base64`: URL-safe base64 UUID v4, padding stripped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    BizKey,
    BizKeyComposite,
    BizHashMd5,
    BizHashSha256,
    Uuid4Base64,
}

impl IdType {
    pub const ALL: [IdType; 5] = [
        IdType::BizKey,
        IdType::BizKeyComposite,
        IdType::BizHashMd5,
        IdType::BizHashSha256,
        IdType::Uuid4Base64,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdType::BizKey => "biz_key",
            IdType::BizKeyComposite => "biz_key_composite",
            IdType::BizHashMd5 => "biz_hash_md5",
            IdType::BizHashSha256 => "biz_hash_sha256",
            IdType::Uuid4Base64 => "uuid4_base64",
        }
    }

    /// Whether ids are derived from existing field data (as opposed to generated).
    pub fn uses_business_key(&self) -> bool {
        !matches!(self, IdType::Uuid4Base64)
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IdType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownIdType(s.to_string()))
    }
}

/// An id-deriving function: key field values plus separator in, id string out.
pub type IdFn = fn(&[Value], &str) -> String;

/// Stringify a key field value the way it would be written in the data file.
pub fn field_to_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn join_fields<'a>(fields: impl Iterator<Item = &'a Value>, sep: &str, trim: bool) -> String {
    fields
        .map(|f| {
            let s = field_to_string(f);
            if trim {
                s.trim().to_string()
            } else {
                s
            }
        })
        .collect::<Vec<_>>()
        .join(sep)
}

pub fn biz_key_composite_id(fields: &[Value], sep: &str) -> String {
    join_fields(fields.iter(), sep, false)
}

pub fn biz_hash_md5_id(fields: &[Value], sep: &str) -> String {
    let joined = join_fields(fields.iter(), sep, false);
    hex::encode(Md5::digest(joined.as_bytes()))
}

/// Each field is trimmed before joining.
pub fn biz_hash_sha256_id(fields: &[Value], sep: &str) -> String {
    let joined = join_fields(fields.iter(), sep, true);
    hex::encode(Sha256::digest(joined.as_bytes()))
}

/// Ignores its inputs. Draws from the process-wide RNG; safe to call from any thread.
pub fn uuid4_base64_id(_fields: &[Value], _sep: &str) -> String {
    URL_SAFE_NO_PAD.encode(uuid::Uuid::new_v4().as_bytes())
}

#[derive(Clone, Debug)]
pub struct IdRegistry {
    funcs: HashMap<IdType, Option<IdFn>>,
}

impl IdRegistry {
    /// All built-in strategies. `BizKey` maps to `None`: the database assigns the key.
    pub fn standard() -> Self {
        let mut funcs: HashMap<IdType, Option<IdFn>> = HashMap::new();
        funcs.insert(IdType::BizKey, None);
        funcs.insert(IdType::BizKeyComposite, Some(biz_key_composite_id as IdFn));
        funcs.insert(IdType::BizHashMd5, Some(biz_hash_md5_id as IdFn));
        funcs.insert(IdType::BizHashSha256, Some(biz_hash_sha256_id as IdFn));
        funcs.insert(IdType::Uuid4Base64, Some(uuid4_base64_id as IdFn));
        IdRegistry { funcs }
    }

    /// Registry restricted to the given strategies.
    pub fn with_only(types: &[IdType]) -> Self {
        let standard = Self::standard();
        let funcs = standard
            .funcs
            .into_iter()
            .filter(|(t, _)| types.contains(t))
            .collect();
        IdRegistry { funcs }
    }

    pub fn contains(&self, id_type: IdType) -> bool {
        self.funcs.contains_key(&id_type)
    }

    /// Look up the id function. `Ok(None)` means "let storage assign the key".
    pub fn get(&self, id_type: IdType) -> Result<Option<IdFn>, ConfigError> {
        self.funcs
            .get(&id_type)
            .copied()
            .ok_or_else(|| ConfigError::UnknownIdType(id_type.to_string()))
    }

    /// Derive an id from key field values. `Ok(None)` for storage-assigned keys.
    pub fn derive(&self, id_type: IdType, fields: &[Value], sep: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.get(id_type)?.map(|f| f(fields, sep)))
    }

    /// Same as [`IdRegistry::derive`] with a string tag, as read from a schema file.
    pub fn derive_tagged(&self, tag: &str, fields: &[Value], sep: &str) -> Result<Option<String>, ConfigError> {
        self.derive(tag.parse()?, fields, sep)
    }
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vals(v: Value) -> Vec<Value> {
        v.as_array().cloned().unwrap_or_default()
    }

    #[test]
    fn composite_joins_with_separator() {
        assert_eq!(biz_key_composite_id(&vals(json!(["foo", "bar"])), "."), "foo.bar");
        assert_eq!(biz_key_composite_id(&vals(json!(["foo", "bar"])), "-"), "foo-bar");
        assert_eq!(biz_key_composite_id(&vals(json!([1, 2])), "."), "1.2");
        assert_eq!(biz_key_composite_id(&vals(json!([1, 2.5])), "-"), "1-2.5");
        assert_eq!(biz_key_composite_id(&[], "."), "");
        assert_eq!(biz_key_composite_id(&vals(json!(["", ""])), "-"), "-");
    }

    #[test]
    fn single_source_field_is_its_string_form() {
        assert_eq!(biz_key_composite_id(&[json!(1)], "."), "1");
    }

    #[test]
    fn md5_digests_are_stable() {
        assert_eq!(biz_hash_md5_id(&vals(json!(["foo", "bar"])), "."), "04f98100995b2f5633210e10f21ee022");
        assert_eq!(biz_hash_md5_id(&vals(json!(["foo", "bar"])), "-"), "e5f9ec048d1dbe19c70f720e002f9cb1");
        assert_eq!(biz_hash_md5_id(&vals(json!([1, 2])), "."), "56765472680401499c79732468ba4340");
        assert_eq!(biz_hash_md5_id(&[], "."), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(biz_hash_md5_id(&vals(json!([1, 2.5])), "."), "db3daece29a9d5f93d193ed25a4b973b");
    }

    #[test]
    fn sha256_digests_are_stable() {
        assert_eq!(
            biz_hash_sha256_id(&vals(json!(["foo", "bar"])), "."),
            "2595d08ad22c733f7a1ce713e767563e13a8dfa35baa74919c28e0f586cb424b"
        );
        assert_eq!(
            biz_hash_sha256_id(&vals(json!([1, 2])), "-"),
            "412a4789b02cad19bacb029f5c8ec8e9b115375d82b97df1d6b15997a8e70e01"
        );
        assert_eq!(
            biz_hash_sha256_id(&[], "."),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            biz_hash_sha256_id(&vals(json!([" foo ", "bar"])), "."),
            biz_hash_sha256_id(&vals(json!(["foo", "bar"])), ".")
        );
    }

    #[test]
    fn hashes_differ_for_differing_input() {
        let a = biz_hash_sha256_id(&vals(json!(["a", "b"])), ".");
        let b = biz_hash_sha256_id(&vals(json!(["a", "c"])), ".");
        assert_ne!(a, b);
        assert_ne!(biz_hash_md5_id(&[json!("x")], "."), biz_hash_md5_id(&[json!("y")], "."));
    }

    #[test]
    fn uuid4_ids_are_unique_and_unpadded() {
        let a = uuid4_base64_id(&[], ".");
        let b = uuid4_base64_id(&[], ".");
        assert_ne!(a, b);
        assert_eq!(a.len(), 22);
        assert!(!a.contains('='));
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn biz_key_defers_to_storage() {
        let reg = IdRegistry::standard();
        assert_eq!(reg.derive(IdType::BizKey, &[json!(1)], ".").unwrap(), None);
        assert_eq!(
            reg.derive(IdType::BizKeyComposite, &[json!(1)], ".").unwrap(),
            Some("1".to_string())
        );
    }

    #[test]
    fn unknown_tag_is_config_error() {
        let reg = IdRegistry::standard();
        let err = reg.derive_tagged("uuid4_base58", &[], ".").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownIdType(t) if t == "uuid4_base58"));
    }

    #[test]
    fn restricted_registry_rejects_missing_types() {
        let reg = IdRegistry::with_only(&[IdType::BizKey]);
        assert!(reg.contains(IdType::BizKey));
        assert!(matches!(reg.get(IdType::Uuid4Base64), Err(ConfigError::UnknownIdType(_))));
    }

    #[test]
    fn tags_round_trip_through_serde() {
        for t in IdType::ALL {
            let s = serde_json::to_string(&t).unwrap();
            assert_eq!(s, format!("\"{}\"", t.as_str()));
            assert_eq!(t.as_str().parse::<IdType>().unwrap(), t);
        }
    }
}
