//! Profile commands: show, set.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::Subcommand;
use imchat_protocol::validation::parse_address;
use imchat_types::{ImchatError, Result};

use super::{open_session, own_address, signed_in_session};
use crate::GlobalOpts;

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Show a profile. Defaults to your own.
    Show {
        /// Address to look up.
        address: Option<String>,
    },
    /// Update your profile.
    Set {
        /// Display name.
        #[arg(long)]
        name: Option<String>,
        /// Path to an avatar image, stored as a data URI.
        #[arg(long, conflicts_with = "remove_avatar")]
        avatar: Option<String>,
        /// Remove the current avatar.
        #[arg(long)]
        remove_avatar: bool,
    },
}

pub async fn run(action: ProfileAction, opts: &GlobalOpts) -> Result<()> {
    match action {
        ProfileAction::Show { address } => show(opts, address.as_deref()).await,
        ProfileAction::Set {
            name,
            avatar,
            remove_avatar,
        } => set(opts, name, avatar, remove_avatar).await,
    }
}

async fn show(opts: &GlobalOpts, address: Option<&str>) -> Result<()> {
    let identity = match address {
        Some(raw) => parse_address(raw)?,
        None => own_address(opts)?,
    };

    let session = open_session(opts).await?;
    let profile = session.profile(&identity).await?;

    opts.out.record(&[
        ("address", identity.as_str()),
        ("name", profile.name.as_str()),
        ("avatar", profile.avatar.as_str()),
    ]);
    Ok(())
}

async fn set(
    opts: &GlobalOpts,
    name: Option<String>,
    avatar: Option<String>,
    remove_avatar: bool,
) -> Result<()> {
    if name.is_none() && avatar.is_none() && !remove_avatar {
        return Err(ImchatError::ValidationError {
            reason: "nothing to update: pass --name, --avatar or --remove-avatar".into(),
        });
    }

    let mut session = signed_in_session(opts).await?;
    let mut profile = session.own_profile().cloned().unwrap_or_default();

    if let Some(name) = name {
        let name = name.trim();
        if name.is_empty() {
            return Err(ImchatError::ValidationError {
                reason: "display name must not be empty".into(),
            });
        }
        profile.name = name.to_string();
    }
    if let Some(path) = avatar {
        profile.avatar = avatar_data_uri(Path::new(&path))?;
    }
    if remove_avatar {
        profile.avatar.clear();
    }

    session.update_profile(profile).await?;
    opts.out.done("profile updated");
    Ok(())
}

/// Reads an image into a `data:` URI.
fn avatar_data_uri(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| ImchatError::ValidationError {
        reason: format!("cannot read avatar {}: {e}", path.display()),
    })?;

    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    };

    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}
