//! Identity key generation and client address handling.

use std::fmt;
use std::net::IpAddr;

/// Address used when the request carries no usable client address.
pub const LOOPBACK: &str = "127.0.0.1";

/// A key that uniquely identifies a rate-limited subject.
///
/// The key is composed of a purpose (what is being limited, e.g.
/// `password_upd`) and a subject (an IP address or a user ID).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    /// What the limit protects
    pub purpose: String,
    /// Who is being limited
    pub subject: String,
}

impl IdentityKey {
    pub fn new(purpose: &str, subject: &str) -> Self {
        Self {
            purpose: purpose.to_string(),
            subject: subject.to_string(),
        }
    }

    /// Store key in the form `{purpose}_{subject}`.
    pub fn to_string_key(&self) -> String {
        format!("{}_{}", self.purpose, self.subject)
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}

/// Resolve the client address of a request.
///
/// Uses the first entry of an `X-Forwarded-For` header when present, then
/// the socket peer address, then the loopback address.
pub fn client_ip(forwarded_for: Option<&str>, remote_addr: Option<IpAddr>) -> String {
    if let Some(first) = forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
    {
        return first.to_string();
    }

    remote_addr
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| LOOPBACK.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_to_string() {
        let key = IdentityKey::new("password_upd", "203.0.113.9");
        assert_eq!(key.to_string_key(), "password_upd_203.0.113.9");
        assert_eq!(key.to_string(), "password_upd_203.0.113.9");
    }

    #[test]
    fn test_identity_key_equality() {
        let key1 = IdentityKey::new("chat", "user-1");
        let key2 = IdentityKey::new("chat", "user-1");
        assert_eq!(key1, key2);
        assert_ne!(key1, IdentityKey::new("chat", "user-2"));
    }

    #[test]
    fn test_client_ip_prefers_first_forwarded_entry() {
        let remote: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(
            client_ip(Some(" 198.51.100.7 , 10.0.0.1"), Some(remote)),
            "198.51.100.7"
        );
    }

    #[test]
    fn test_client_ip_falls_back_to_remote() {
        let remote: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(client_ip(None, Some(remote)), "10.0.0.5");
        assert_eq!(client_ip(Some("  "), Some(remote)), "10.0.0.5");
    }

    #[test]
    fn test_client_ip_defaults_to_loopback() {
        assert_eq!(client_ip(None, None), LOOPBACK);
    }
}
