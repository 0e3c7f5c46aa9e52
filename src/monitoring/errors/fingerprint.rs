//! Deterministic error fingerprints

use sha2::{Digest, Sha256};

/// First `frames` non-empty, trimmed stack lines
pub fn stack_digest(stack: Option<&str>, frames: usize) -> Vec<String> {
    stack
        .map(|s| {
            s.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .take(frames)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// SHA-256 hex of `name:message:<stack lines joined by newline>`
pub fn fingerprint(name: &str, message: &str, digest: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b":");
    hasher.update(message.as_bytes());
    hasher.update(b":");
    hasher.update(digest.join("\n").as_bytes());
    hex::encode(hasher.finalize())
}
