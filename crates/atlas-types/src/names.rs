//! Validated name newtypes: entity kinds, pointers, and server names.
//!
//! Valid entity kinds:
//! - Non-empty, at most 64 characters
//! - Lowercase ASCII letters, digits, and `-`
//! - Must start with a letter and must not end with `-`
//!
//! Valid pointers:
//! - Non-empty, at most 256 characters
//! - Printable ASCII with no whitespace
//!
//! Valid server names:
//! - Non-empty, at most 64 characters
//! - Lowercase ASCII letters, digits, `-`, `_`, and `.`
//! - Must start and end with a letter or digit
//!
//! Names are never normalized; anything outside these rules is rejected so
//! every server applies byte-identical keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Validate an entity kind string, returning `Ok(())` if valid.
pub fn validate_kind(kind: &str) -> Result<(), TypeError> {
    let err = |reason: &str| TypeError::InvalidKind {
        kind: kind.to_string(),
        reason: reason.to_string(),
    };

    if kind.is_empty() {
        return Err(err("kind must not be empty"));
    }
    if kind.len() > 64 {
        return Err(err("kind must be at most 64 characters"));
    }
    if !kind.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
        return Err(err("kind must start with a lowercase letter"));
    }
    if kind.ends_with('-') {
        return Err(err("kind must not end with '-'"));
    }
    for ch in kind.chars() {
        if !(ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-') {
            return Err(err(&format!("contains forbidden character: {ch:?}")));
        }
    }
    Ok(())
}

/// Validate a pointer string, returning `Ok(())` if valid.
pub fn validate_pointer(pointer: &str) -> Result<(), TypeError> {
    let err = |reason: &str| TypeError::InvalidPointer {
        pointer: pointer.to_string(),
        reason: reason.to_string(),
    };

    if pointer.is_empty() {
        return Err(err("pointer must not be empty"));
    }
    if pointer.len() > 256 {
        return Err(err("pointer must be at most 256 characters"));
    }
    for ch in pointer.chars() {
        if !ch.is_ascii() || ch.is_ascii_control() || ch == ' ' {
            return Err(err(&format!("contains forbidden character: {ch:?}")));
        }
    }
    Ok(())
}

/// Validate a server name, returning `Ok(())` if valid.
pub fn validate_server_name(name: &str) -> Result<(), TypeError> {
    let err = |reason: &str| TypeError::InvalidServerName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(err("server name must not be empty"));
    }
    if name.len() > 64 {
        return Err(err("server name must be at most 64 characters"));
    }
    if !name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Err(err("server name must start with a letter or digit"));
    }
    if !name.chars().last().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Err(err("server name must end with a letter or digit"));
    }
    for ch in name.chars() {
        let ok = ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '-' | '_' | '.');
        if !ok {
            return Err(err(&format!("contains forbidden character: {ch:?}")));
        }
    }
    Ok(())
}

/// Classification an entity belongs to, e.g. `scene` or `profile`.
///
/// Entities of different kinds never compete for a pointer: the kind is part
/// of the pointer-slot key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKind(String);

impl EntityKind {
    /// Create a kind, validating the string.
    pub fn new(kind: impl Into<String>) -> Result<Self, TypeError> {
        let kind = kind.into();
        validate_kind(&kind)?;
        Ok(Self(kind))
    }

    /// The kind as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKind({})", self.0)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EntityKind {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A pointer: the string key an entity claims, e.g. a scene coordinate
/// `"20,-34"` or a profile handle `"@aria"`.
///
/// At most one entity per kind is active for a pointer at any time.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pointer(String);

impl Pointer {
    /// Create a pointer, validating the string.
    pub fn new(pointer: impl Into<String>) -> Result<Self, TypeError> {
        let pointer = pointer.into();
        validate_pointer(&pointer)?;
        Ok(Self(pointer))
    }

    /// The pointer as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointer({})", self.0)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Pointer {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Name of a cluster member, e.g. `alpha` or `eu-west.build02`.
///
/// Identifies the server that first accepted a deployment; together with the
/// entity id it uniquely keys a deployment event.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerName(String);

impl ServerName {
    /// Create a server name, validating the string.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate_server_name(&name)?;
        Ok(Self(name))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerName({})", self.0)
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ServerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
