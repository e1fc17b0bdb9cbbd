//! Login message a wallet signs to unlock a session.
//!
//! The signature over this text is the session key's only input, so
//! the template must stay byte-stable: changing a character changes
//! every derived key. The nonce is informational and is not verified.

use imchat_types::Identity;

/// Renders the login message for `identity`.
pub fn login_message(app_name: &str, identity: &Identity, nonce_millis: i64) -> String {
    format!(
        "Login to {app_name}\n\nUser: {identity}\nNonce: {nonce_millis}\n\n\
         Sign this to generate your encryption key."
    )
}
