//! Recipient handles.
//!
//! Routes are configured with a display handle such as `@acct`, while the payment service
//! stores bare handles. [`normalize_handle`] maps one to the other: surrounding whitespace
//! is trimmed and a single leading `@` is removed. Case is preserved, so `@Acct` and
//! `@acct` are different recipients.

/// Returns the bare handle the payment service compares against.
pub fn normalize_handle(handle: &str) -> &str {
    let trimmed = handle.trim();
    trimmed.strip_prefix('@').unwrap_or(trimmed)
}
