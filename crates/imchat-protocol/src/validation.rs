//! Contact address validation.
//!
//! Addresses accepted from users must be `0x` followed by exactly 40
//! hex digits. Accepted addresses are canonicalized to lowercase.

use imchat_types::{ImchatError, Identity, Result};

/// Number of hex digits after the `0x` prefix.
pub const ADDRESS_HEX_LEN: usize = 40;

// ---------------------------------------------------------------------------
// Address parsing
// ---------------------------------------------------------------------------

/// Parses an untrusted wallet address into a canonical [`Identity`].
///
/// The input must be the address and nothing else: surrounding
/// whitespace is rejected. The `0x` prefix is case-sensitive; the hex
/// digits are not.
///
/// # Errors
///
/// Returns [`ImchatError::ValidationError`] if the input is not
/// `0x` + 40 hex digits.
pub fn parse_address(raw: &str) -> Result<Identity> {
    let digits = raw.strip_prefix("0x").ok_or_else(|| ImchatError::ValidationError {
        reason: format!("'{raw}' is not a wallet address: missing 0x prefix"),
    })?;

    if digits.len() != ADDRESS_HEX_LEN || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ImchatError::ValidationError {
            reason: format!(
                "'{raw}' is not a wallet address: expected {ADDRESS_HEX_LEN} hex digits after 0x"
            ),
        });
    }

    Ok(Identity::new(raw))
}

// ---------------------------------------------------------------------------
// Contact rules
// ---------------------------------------------------------------------------

/// Validates a contact candidate against the owner and the current list.
///
/// `owner` is `None` when no session is authenticated; the self check
/// is then skipped.
///
/// # Errors
///
/// Returns [`ImchatError::ValidationError`] if the address is malformed,
/// names the owner, or is already a contact.
pub fn validate_new_contact(
    raw: &str,
    owner: Option<&Identity>,
    existing: &[Identity],
) -> Result<Identity> {
    let candidate = parse_address(raw)?;

    if owner == Some(&candidate) {
        return Err(ImchatError::ValidationError {
            reason: "cannot add your own address as a contact".into(),
        });
    }

    if existing.contains(&candidate) {
        return Err(ImchatError::ValidationError {
            reason: format!("{candidate} is already a contact"),
        });
    }

    Ok(candidate)
}
