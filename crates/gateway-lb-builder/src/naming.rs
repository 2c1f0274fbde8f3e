//! Deterministic names for generated AWS resources.

use sha2::{Digest, Sha256};

/// Strip characters AWS names reject and cap the length.
fn sanitize(value: &str, max: usize) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(max)
        .collect()
}

/// Build a `k8s-<namespace:8>-<name:8>-<hash:10>` name.
///
/// The hash is SHA-256 over `parts` in order, each terminated so that
/// adjacent parts cannot run together.
#[must_use]
pub fn hashed_name(namespace: &str, name: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hex::encode(hasher.finalize());
    format!(
        "k8s-{}-{}-{}",
        sanitize(namespace, 8),
        sanitize(name, 8),
        &digest[..10]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_and_determinism() {
        let a = hashed_name("my-namespace-long", "checkout_service", &["cluster", "80"]);
        let b = hashed_name("my-namespace-long", "checkout_service", &["cluster", "80"]);
        assert_eq!(a, b);
        assert!(a.starts_with("k8s-mynamesp-checkout-"));
        assert_eq!(a.len(), "k8s-mynamesp-checkout-".len() + 10);
        assert!(a.len() <= 32);
    }

    #[test]
    fn parts_are_delimited() {
        let a = hashed_name("ns", "n", &["ab", "c"]);
        let b = hashed_name("ns", "n", &["a", "bc"]);
        assert_ne!(a, b);
    }
}
