//! Message commands: login-message, send, send-audio, read, watch.

use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use imchat_protocol::login;
use imchat_protocol::message::AudioClip;
use imchat_protocol::validation::parse_address;
use imchat_types::{ImchatError, Result};

use super::{own_address, signed_in_session};
use crate::output;
use crate::GlobalOpts;

pub fn login_message(opts: &GlobalOpts) -> Result<()> {
    let identity = own_address(opts)?;
    let message = login::login_message(
        &opts.config.app_name,
        &identity,
        Utc::now().timestamp_millis(),
    );

    if opts.out.is_json() {
        opts.out.json_line(&serde_json::json!({ "message": message }));
    } else {
        println!("{message}");
    }
    Ok(())
}

pub async fn send(opts: &GlobalOpts, peer: &str, text: &str) -> Result<()> {
    let peer = parse_address(peer)?;
    let mut session = signed_in_session(opts).await?;
    session.select_conversation(peer.as_str()).await?;

    let sent = session.send_text(text).await?;

    if opts.out.is_json() {
        opts.out.json_line(&sent);
    } else {
        opts.out.done(&format!(
            "message sent to {} (id: {})",
            output::short(peer.as_str()),
            sent.id
        ));
    }
    Ok(())
}

pub async fn send_audio(opts: &GlobalOpts, peer: &str, file: &Path, mime: &str) -> Result<()> {
    let peer = parse_address(peer)?;

    let bytes = std::fs::read(file).map_err(|e| ImchatError::ValidationError {
        reason: format!("cannot read audio file {}: {e}", file.display()),
    })?;
    let clip = AudioClip::new(STANDARD.encode(bytes)).with_mime(mime);

    let mut session = signed_in_session(opts).await?;
    session.select_conversation(peer.as_str()).await?;
    let sent = session.send_audio(&clip).await?;

    if opts.out.is_json() {
        opts.out.json_line(&serde_json::json!({ "id": sent.id, "type": sent.kind }));
    } else {
        opts.out.done(&format!(
            "voice message sent to {} (id: {})",
            output::short(peer.as_str()),
            sent.id
        ));
    }
    Ok(())
}

pub async fn read(opts: &GlobalOpts, peer: &str) -> Result<()> {
    let peer = parse_address(peer)?;
    let mut session = signed_in_session(opts).await?;
    session.select_conversation(peer.as_str()).await?;

    let messages = session.messages();
    if opts.out.is_json() {
        opts.out.json_line(&messages);
        return Ok(());
    }

    if messages.is_empty() {
        println!("no messages with {}", output::short(peer.as_str()));
    }
    for msg in &messages {
        opts.out.message(msg, session.identity());
    }
    Ok(())
}

pub async fn watch(opts: &GlobalOpts, peer: &str, seconds: Option<u64>) -> Result<()> {
    let peer = parse_address(peer)?;
    let mut session = signed_in_session(opts).await?;
    session.select_conversation(peer.as_str()).await?;

    let mut updates = session.subscribe_messages();
    let mut printed = 0usize;

    let deadline = async {
        match seconds {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        let current = updates.borrow_and_update().messages.clone();
        // A replaced view can only grow; anything shorter means a reset.
        if current.len() < printed {
            printed = 0;
        }
        for msg in &current[printed..] {
            opts.out.message(msg, session.identity());
        }
        printed = current.len();

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.disconnect();
    Ok(())
}
