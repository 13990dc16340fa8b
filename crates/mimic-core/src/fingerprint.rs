//! Request fingerprinting.
//!
//! A fingerprint is the content key under which an exchange is stored. It is
//! derived from exactly five request fields, concatenated in a fixed order:
//! destination, path, method, query, body. Headers, scheme and the peer
//! address never participate, so cosmetic variations between otherwise
//! identical requests still hit the same record.
//!
//! The byte order fed to the digest is frozen; changing it would orphan
//! every previously stored payload.

use md5::{Digest, Md5};

/// Computes the lowercase hex fingerprint of a request.
pub fn fingerprint(
    destination: &str,
    path: &str,
    method: &str,
    query: &str,
    body: &str,
) -> String {
    let mut hasher = Md5::new();
    hasher.update(destination.as_bytes());
    hasher.update(path.as_bytes());
    hasher.update(method.as_bytes());
    hasher.update(query.as_bytes());
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint("api.test", "/v1/ping", "GET", "x=1", "");
        let b = fingerprint("api.test", "/v1/ping", "GET", "x=1", "");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_is_128_bit_lowercase_hex() {
        let key = fingerprint("api.test", "/", "GET", "", "");
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn each_field_changes_the_fingerprint() {
        let base = fingerprint("api.test", "/a", "GET", "q=1", "body");
        assert_ne!(base, fingerprint("other.test", "/a", "GET", "q=1", "body"));
        assert_ne!(base, fingerprint("api.test", "/b", "GET", "q=1", "body"));
        assert_ne!(base, fingerprint("api.test", "/a", "POST", "q=1", "body"));
        assert_ne!(base, fingerprint("api.test", "/a", "GET", "q=2", "body"));
        assert_ne!(base, fingerprint("api.test", "/a", "GET", "q=1", "other"));
    }

    #[test]
    fn empty_body_is_part_of_the_hash() {
        assert_ne!(
            fingerprint("api.test", "/a", "GET", "", ""),
            fingerprint("api.test", "/a", "GET", "", "x"),
        );
    }

    #[test]
    fn headers_never_participate() {
        use crate::model::RequestDetails;

        let mut first = RequestDetails {
            destination: "api.test".into(),
            path: "/a".into(),
            method: "GET".into(),
            ..Default::default()
        };
        let mut second = first.clone();
        first.headers.insert("x-trace".into(), vec!["1".into()]);
        second.headers.insert("x-trace".into(), vec!["2".into()]);
        second.scheme = "https".into();
        second.remote_addr = "10.0.0.1:80".into();

        assert_eq!(first.fingerprint(), second.fingerprint());
    }
}
