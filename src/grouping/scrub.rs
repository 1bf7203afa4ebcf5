// Copyright 2026-Present Crash Reporting Team
// SPDX-License-Identifier: Apache-2.0

//! Regex scrubbing of strings that look like secrets, bearer tokens, or
//! email addresses, per `spec.md` §4.10's "no secrets in outgoing payloads"
//! rule (verified end-to-end by testable property 6 in `spec.md` §8).

use regex::Regex;
use std::sync::OnceLock;

const REDACTED: &str = "[REDACTED]";

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // key="value" / key: value style assignments for common secret names.
            Regex::new(
                r#"(?i)\b(password|secret|token|api[_-]?key|auth)\b\s*[:=]\s*["']?[^\s"',]+["']?"#,
            )
            .expect("valid regex"),
            // `Authorization: Bearer <token>` / bare bearer tokens.
            Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9\-_.]+").expect("valid regex"),
            // Email addresses.
            Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}")
                .expect("valid regex"),
        ]
    })
}

/// Replaces every match of the secret/bearer/email patterns in `input` with
/// `[REDACTED]`. Applied to every outgoing string field at the payload
/// optimizer layer, not just top-level free-form fields, since stack traces
/// and breadcrumb messages can both carry host-supplied text.
pub fn scrub_string(input: &str) -> String {
    let mut out = input.to_string();
    for pattern in patterns() {
        out = pattern.replace_all(&out, REDACTED).into_owned();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_password_assignment() {
        let input = "login failed: password=hunter2prod";
        let out = scrub_string(input);
        assert!(!out.contains("hunter2prod"));
        assert!(out.contains(REDACTED));
    }

    #[test]
    fn redacts_bearer_token() {
        let input = "header Authorization: Bearer abc123.def456-ghi";
        let out = scrub_string(input);
        assert!(!out.contains("abc123.def456-ghi"));
        assert!(out.contains(REDACTED));
    }

    #[test]
    fn redacts_email_addresses() {
        let input = "crash reported by jane.doe+test@example.co.uk";
        let out = scrub_string(input);
        assert!(!out.contains("jane.doe+test@example.co.uk"));
        assert!(out.contains(REDACTED));
    }

    #[test]
    fn redacts_api_key_variants() {
        for candidate in ["api_key=sk_live_12345", "api-key: sk_live_12345", "apikey=sk_live_12345"] {
            let out = scrub_string(candidate);
            assert!(!out.contains("sk_live_12345"), "failed for {candidate}");
        }
    }

    #[test]
    fn leaves_ordinary_text_untouched() {
        let input = "NullPointerException at com.example.Foo.bar(Foo.kt:42)";
        assert_eq!(scrub_string(input), input);
    }
}
