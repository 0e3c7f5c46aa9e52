//! Keyword classifier for error severity and category
//!
//! Computed once when a record is created. Identical fingerprints imply
//! identical input, so the result never changes afterwards.

use super::types::{ErrorCategory, ErrorSeverity};

const CRITICAL_KEYWORDS: &[&str] = &["fatal", "panic", "corrupt", "out of memory", "oom"];
const HIGH_NAME_KEYWORDS: &[&str] = &["timeout", "memory"];
const HIGH_MESSAGE_KEYWORDS: &[&str] = &["timed out", "etimedout", "deadlock"];
const LOW_KEYWORDS: &[&str] = &["validation", "invalid", "not found", "deprecated"];

const CATEGORY_KEYWORDS: &[(ErrorCategory, &[&str])] = &[
    (ErrorCategory::Validation, &["validation", "invalid"]),
    (ErrorCategory::Timeout, &["timeout", "timed out", "etimedout"]),
    (
        ErrorCategory::Network,
        &["network", "connect", "econn", "socket", "dns", "unreachable"],
    ),
    (
        ErrorCategory::Authentication,
        &["unauthorized", "forbidden", "auth", "permission", "401", "403"],
    ),
    (
        ErrorCategory::RateLimit,
        &["rate limit", "ratelimit", "too many requests", "429"],
    ),
    (ErrorCategory::Resource, &["memory", "disk", "quota", "resource"]),
    (ErrorCategory::Database, &["database", "sql", "query", "constraint"]),
    (
        ErrorCategory::Serialization,
        &["json", "parse", "serializ", "deserializ", "decode"],
    ),
];

/// Classify an error by keywords in its name and message
pub fn classify(name: &str, message: &str) -> (ErrorSeverity, ErrorCategory) {
    let name = name.to_lowercase();
    let message = message.to_lowercase();
    (severity(&name, &message), category(&name, &message))
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn severity(name: &str, message: &str) -> ErrorSeverity {
    if contains_any(name, CRITICAL_KEYWORDS) || contains_any(message, CRITICAL_KEYWORDS) {
        ErrorSeverity::Critical
    } else if contains_any(name, HIGH_NAME_KEYWORDS) || contains_any(message, HIGH_MESSAGE_KEYWORDS)
    {
        ErrorSeverity::High
    } else if contains_any(name, LOW_KEYWORDS) || contains_any(message, LOW_KEYWORDS) {
        ErrorSeverity::Low
    } else {
        ErrorSeverity::Medium
    }
}

fn category(name: &str, message: &str) -> ErrorCategory {
    // message keywords win over name keywords
    for text in [message, name] {
        for (category, keywords) in CATEGORY_KEYWORDS {
            if contains_any(text, keywords) {
                return *category;
            }
        }
    }
    ErrorCategory::Unknown
}
