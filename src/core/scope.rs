use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of one cash desk: the owning tenant plus the desk itself.
///
/// Every balance, lot, transaction and audit record is partitioned by
/// scope. The engine never derives a scope; callers resolve it from their
/// own tenant and desk administration.
///
/// # Examples
///
/// ```
/// use cash_desk_engine::core::scope::ScopeId;
///
/// let prague = ScopeId::new("acme", "prague");
/// assert_eq!(prague.to_string(), "acme/prague");
/// assert_eq!("acme/prague".parse::<ScopeId>().unwrap(), prague);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId {
    tenant: String,
    desk: String,
}

impl ScopeId {
    pub fn new(tenant: impl Into<String>, desk: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            desk: desk.into(),
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn desk(&self) -> &str {
        &self.desk
    }

    /// A filesystem-safe name for per-scope documents, distinct for
    /// distinct scopes.
    ///
    /// ASCII letters, digits and `-` are kept; every other byte becomes `_`
    /// followed by two hex digits. Parts are joined with `__`, which no
    /// escaped part can contain.
    pub fn file_stem(&self) -> String {
        format!("{}__{}", escape_part(&self.tenant), escape_part(&self.desk))
    }
}

fn escape_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for byte in part.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("_{byte:02x}"));
        }
    }
    out
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.desk)
    }
}

/// Returned when a scope string is not of the form `tenant/desk`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid scope '{0}', expected <tenant>/<desk>")]
pub struct ParseScopeError(String);

impl FromStr for ScopeId {
    type Err = ParseScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((tenant, desk)) if !tenant.is_empty() && !desk.is_empty() => {
                Ok(Self::new(tenant, desk))
            }
            _ => Err(ParseScopeError(s.to_string())),
        }
    }
}
