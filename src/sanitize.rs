//! Update-document sanitization
//!
//! A create/update payload is either a flat set of field assignments or an
//! operator-style partial update (`$set`, `$inc`, ...). Both shapes go
//! through the same table-driven walk over every site a field may appear:
//! the top level, plus the nested mapping under each recognized operator.
//!
//! The walk enforces, in order:
//! 1. `hash` may not appear anywhere — hard gate, checked before any
//!    mutation.
//! 2. `password` is removed from every site and surfaced as extracted
//!    plaintext together with the site it was found at, so the derived hash
//!    can be spliced back at the matching location.
//! 3. `login` is canonicalized in place and surfaced for uniqueness
//!    validation.

use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::auth::password::HashMaterial;
use crate::login;
use crate::types::{Error, Result};

/// Recognized partial-update operator names.
pub const UPDATE_OPERATORS: [&str; 13] = [
    "$inc",
    "$mul",
    "$set",
    "$unset",
    "$min",
    "$max",
    "$currentDate",
    "$push",
    "$pull",
    "$pop",
    "$addToSet",
    "$pushAll",
    "$pullAll",
];

/// Whether a key names a recognized update operator.
pub fn is_update_operator(key: &str) -> bool {
    UPDATE_OPERATORS.contains(&key)
}

/// Location a field was found at inside an update document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSite {
    TopLevel,
    Operator(String),
}

/// Plaintext password lifted out of a payload. Zeroized on drop.
pub struct ExtractedPassword {
    pub plaintext: Zeroizing<String>,
    pub site: FieldSite,
}

// Never expose the plaintext, not even through debug formatting.
impl std::fmt::Debug for ExtractedPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractedPassword")
            .field("plaintext", &"<redacted>")
            .field("site", &self.site)
            .finish()
    }
}

/// A payload cleared for persistence: no `hash` tampering, no plaintext
/// `password`, canonical `login`.
#[derive(Debug)]
pub struct SanitizedPayload {
    doc: Map<String, Value>,
    password: Option<ExtractedPassword>,
    /// Canonical login introduced or changed by this payload.
    pub login: Option<String>,
}

impl SanitizedPayload {
    /// Take the extracted password out of the payload, if any.
    pub fn take_password(&mut self) -> Option<ExtractedPassword> {
        self.password.take()
    }

    /// Insert hash material at the site the password was extracted from:
    /// a top-level `hash` field for direct assignments, nested under the
    /// same operator for operator-based updates.
    pub fn insert_hash(&mut self, site: &FieldSite, material: &HashMaterial) -> Result<()> {
        let value = serde_json::to_value(material)
            .map_err(|e| Error::Hashing(format!("hash material is not serializable: {e}")))?;

        match site {
            FieldSite::TopLevel => {
                self.doc.insert("hash".to_string(), value);
            }
            FieldSite::Operator(op) => {
                let nested = self
                    .doc
                    .entry(op.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                match nested.as_object_mut() {
                    Some(map) => {
                        map.insert("hash".to_string(), value);
                    }
                    None => {
                        return Err(Error::Validation(format!(
                            "update operator {op} must map to an object"
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// The document destined for the backend.
    pub fn document(&self) -> &Map<String, Value> {
        &self.doc
    }

    pub fn into_document(self) -> Value {
        Value::Object(self.doc)
    }
}

/// Apply `f` to every site of the document: the top level, then the nested
/// mapping under each recognized operator.
fn for_each_site<F>(doc: &mut Map<String, Value>, mut f: F) -> Result<()>
where
    F: FnMut(&FieldSite, &mut Map<String, Value>) -> Result<()>,
{
    f(&FieldSite::TopLevel, doc)?;

    let operators: Vec<String> = doc
        .keys()
        .filter(|key| is_update_operator(key))
        .cloned()
        .collect();
    for op in operators {
        if let Some(Value::Object(nested)) = doc.get_mut(&op) {
            let site = FieldSite::Operator(op);
            f(&site, nested)?;
        }
    }

    Ok(())
}

/// Sanitize a create/update payload.
///
/// Flat and operator-style documents go through the same walk; asymmetric
/// handling between the two is how hash-tampering bugs slip in.
pub fn sanitize(payload: Value, is_create: bool) -> Result<SanitizedPayload> {
    let Value::Object(mut doc) = payload else {
        return Err(Error::Validation("payload must be a JSON object".to_string()));
    };

    // Hard gate: reject hash tampering before touching anything else.
    for_each_site(&mut doc, |_, fields| {
        if fields.contains_key("hash") {
            Err(Error::AccessViolation(
                "no right to replace hash field".to_string(),
            ))
        } else {
            Ok(())
        }
    })?;

    let mut password: Option<ExtractedPassword> = None;
    let mut new_login: Option<String> = None;

    for_each_site(&mut doc, |site, fields| {
        if let Some(value) = fields.remove("password") {
            let Value::String(plaintext) = value else {
                return Err(Error::Validation("password must be a string".to_string()));
            };
            // First site wins; later occurrences are still removed.
            if password.is_none() {
                password = Some(ExtractedPassword {
                    plaintext: Zeroizing::new(plaintext),
                    site: site.clone(),
                });
            }
        }

        if let Some(value) = fields.get_mut("login") {
            let Value::String(raw) = value else {
                return Err(Error::Validation("login must be a string".to_string()));
            };
            let canonical = login::normalize(raw);
            *raw = canonical.clone();
            if new_login.is_none() {
                new_login = Some(canonical);
            }
        }

        Ok(())
    })?;

    if is_create && new_login.is_none() {
        return Err(Error::Validation("login is required".to_string()));
    }

    Ok(SanitizedPayload {
        doc,
        password,
        login: new_login,
    })
}
