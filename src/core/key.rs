//! Session keys and identifier validation.
//!
//! A session is addressed by the pair (application name, session id). The
//! pair is rendered into a single deterministic key for the metadata store
//! and into a name prefix for payload blobs.

use std::fmt;

use crate::error::{Result, StoreError};

/// Composite key of a session record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    application_name: String,
    session_id: String,
}

impl SessionKey {
    /// Build a key from already validated parts.
    pub fn new(application_name: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            session_id: session_id.into(),
        }
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Prefix shared by every payload blob of this session.
    ///
    /// Plain concatenation of session id and application name; the random
    /// suffix is appended per write.
    pub fn blob_prefix(&self) -> String {
        format!("{}{}", self.session_id, self.application_name)
    }

    /// Fresh, never reused payload blob name.
    pub fn fresh_blob_name(&self) -> String {
        format!("{}{}", self.blob_prefix(), uuid::Uuid::new_v4().simple())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            escape_component(&self.application_name),
            escape_component(&self.session_id)
        )
    }
}

/// Escape a string so it only contains `[A-Za-z0-9_-]` and `%XX` sequences.
///
/// Escaping is applied per character, so `escape(a)` is a prefix of
/// `escape(a + b)`. The filesystem adapters rely on that for prefix listing.
pub fn escape_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            out.push(ch);
        } else {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    out
}

/// Inverse of [`escape_component`].
pub fn unescape_component(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = value.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Validate and normalize an identifier argument.
///
/// The value is trimmed, must not be empty, must not exceed `max_len`
/// characters and, when `reject_commas` is set, must not contain a comma.
pub fn validate_parameter(
    value: &str,
    parameter: &str,
    max_len: usize,
    reject_commas: bool,
) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::validation(parameter, "must not be empty"));
    }
    let len = trimmed.chars().count();
    if len > max_len {
        return Err(StoreError::validation(
            parameter,
            format!("length {} exceeds maximum of {}", len, max_len),
        ));
    }
    if reject_commas && trimmed.contains(',') {
        return Err(StoreError::validation(parameter, "must not contain commas"));
    }
    Ok(trimmed.to_string())
}
