//! Delegate target addresses
//!
//! Accepted forms:
//!
//! | Input | host | port | path |
//! |-------|------|------|------|
//! | `http://search-2:8080/query` | search-2 | 8080 | /query |
//! | `search-2:8080/query` | search-2 | 8080 | /query |
//! | `search-2` | search-2 | 80 | / |
//! | `[::1]:9000` | ::1 | 9000 | / |
//!
//! TLS is not supported; `https://` addresses are rejected.

use crate::error::{EngineError, Result};
use std::fmt;

const DEFAULT_PORT: u16 = 80;

/// Parsed delegate address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateAddress {
    original: String,
    authority: String,
    host: String,
    port: u16,
    path: String,
}

impl DelegateAddress {
    /// Parse an address string
    pub fn parse(address: &str) -> Result<Self> {
        let invalid = |reason| EngineError::InvalidAddress {
            address: address.to_string(),
            reason,
        };

        let trimmed = address.trim();
        let rest = match trimmed.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("http") => rest,
            Some(_) => return Err(invalid("only http:// is supported")),
            None => trimmed,
        };

        let (authority, path) = match rest.find(['/', '?']) {
            Some(pos) if rest.as_bytes()[pos] == b'?' => (&rest[..pos], format!("/{}", &rest[pos..])),
            Some(pos) => (&rest[..pos], rest[pos..].to_string()),
            None => (rest, "/".to_string()),
        };
        if authority.is_empty() {
            return Err(invalid("missing host"));
        }
        if authority.contains('@') {
            return Err(invalid("credentials are not supported"));
        }

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 literal"))?;
            let port = match tail {
                "" => DEFAULT_PORT,
                _ => tail
                    .strip_prefix(':')
                    .and_then(|p| p.parse().ok())
                    .ok_or_else(|| invalid("bad port"))?,
            };
            (host.to_string(), port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (
                    host.to_string(),
                    port.parse().map_err(|_| invalid("bad port"))?,
                ),
                None => (authority.to_string(), DEFAULT_PORT),
            }
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(DelegateAddress {
            original: address.to_string(),
            authority: authority.to_string(),
            host,
            port,
            path,
        })
    }

    /// Address string as given
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// `host[:port]` as written, used for the Host header
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Host name or IP literal (without brackets)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Request target path, including any query
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for DelegateAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}
