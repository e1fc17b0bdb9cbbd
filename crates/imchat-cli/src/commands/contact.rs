//! Contact commands: add, list.

use clap::Subcommand;
use imchat_types::Result;

use super::{open_session, signed_in_session};
use crate::GlobalOpts;

#[derive(Subcommand)]
pub enum ContactAction {
    /// Add a contact by wallet address.
    Add {
        /// Contact address (0x + 40 hex digits).
        address: String,
    },
    /// List all contacts.
    List,
}

pub async fn run(action: ContactAction, opts: &GlobalOpts) -> Result<()> {
    match action {
        ContactAction::Add { address } => add(opts, &address).await,
        ContactAction::List => list(opts).await,
    }
}

async fn add(opts: &GlobalOpts, address: &str) -> Result<()> {
    // Logged in when credentials are present, so adding yourself is caught.
    let mut session = if opts.address.is_some() && opts.signature.is_some() {
        signed_in_session(opts).await?
    } else {
        open_session(opts).await?
    };

    let contact = session.add_contact(address).await?;
    opts.out.done(&format!("contact added: {contact}"));
    Ok(())
}

async fn list(opts: &GlobalOpts) -> Result<()> {
    let session = open_session(opts).await?;
    let contacts = session.contacts();

    let mut rows = Vec::with_capacity(contacts.len());
    for contact in &contacts {
        let profile = session.profile(contact).await?;
        rows.push(vec![contact.to_string(), profile.name]);
    }

    opts.out.rows(&["ADDRESS", "NAME"], &rows);
    Ok(())
}
