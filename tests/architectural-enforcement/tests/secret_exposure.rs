//! Integration Test: Secret Exposure
//!
//! **Policy**: Credential secrets leave their `SecretString` only where an
//! outgoing request is built. Everything else handles credentials through
//! `CredentialLease` and its redacted `Debug`.

use architectural_enforcement::{is_allowed, scan};

/// Files allowed to read a secret value
const ALLOWED: [&str; 3] = [
    "pool/credential.rs",
    "backend/openai_compat.rs",
    "backend/gemini.rs",
];

#[test]
fn test_secrets_exposed_only_by_adapters() {
    let violations = scan(|path, lines, idx| {
        let code = lines[idx].1;
        (code.contains("expose_secret") || code.contains(".secret()")) && !is_allowed(path, &ALLOWED)
    });

    if !violations.is_empty() {
        eprintln!("\nSecret values read outside the adapters:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        panic!(
            "\nFound {} secret exposure violation(s).\nPass a CredentialLease instead.",
            violations.len()
        );
    }
}

#[test]
fn test_secrets_never_logged() {
    let violations = scan(|_, lines, idx| {
        let code = lines[idx].1;
        let in_log_macro = ["trace!(", "debug!(", "info!(", "warn!(", "error!("]
            .iter()
            .any(|m| code.contains(m));
        in_log_macro && (code.contains("secret") || code.contains("api_key"))
    });

    assert!(
        violations.is_empty(),
        "log statements mention secrets:\n{}",
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    );
}
