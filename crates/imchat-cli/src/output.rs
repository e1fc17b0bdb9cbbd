//! Rendering of command results.
//!
//! A [`Printer`] is built once from `--json` and handed to every command.
//! Human mode is colored text on stdout. JSON mode writes exactly one
//! compact JSON document per line and never emits ANSI escapes. Errors
//! always go to stderr.

use colored::Colorize;
use imchat_protocol::message::ChatMessage;
use imchat_types::{Identity, MessageKind};
use serde::Serialize;

/// Values longer than this are elided in human-mode records.
const RECORD_VALUE_MAX: usize = 48;

#[derive(Clone, Copy, Debug)]
pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Confirms a completed write.
    pub fn done(&self, msg: &str) {
        if self.json {
            self.json_line(&serde_json::json!({ "status": "ok", "message": msg }));
        } else {
            println!("{} {msg}", "✓".green().bold());
        }
    }

    pub fn failure(&self, msg: &str) {
        if self.json {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        } else {
            eprintln!("{} {msg}", "error:".red().bold());
        }
    }

    /// Writes `value` as one JSON line. Used for results that only have
    /// a machine form, or whose human form the caller prints itself.
    pub fn json_line<T: Serialize>(&self, value: &T) {
        match serde_json::to_string(value) {
            Ok(line) => println!("{line}"),
            Err(e) => self.failure(&format!("cannot encode output: {e}")),
        }
    }

    /// A single object: `key: value` lines, or one JSON object with the
    /// raw values.
    pub fn record(&self, fields: &[(&str, &str)]) {
        if self.json {
            let obj: serde_json::Map<String, serde_json::Value> = fields
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
                .collect();
            self.json_line(&obj);
            return;
        }

        let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in fields {
            let shown = match value.chars().count() {
                0 => "(none)".dimmed().to_string(),
                n if n > RECORD_VALUE_MAX => {
                    let head: String = value.chars().take(24).collect();
                    format!("{head}… ({n} chars)")
                }
                _ => value.to_string(),
            };
            println!("{:>width$}  {shown}", key.bold());
        }
    }

    /// Rows under `headers`. JSON mode emits an array of objects keyed by
    /// the lowercased header.
    pub fn rows(&self, headers: &[&str], rows: &[Vec<String>]) {
        if self.json {
            let keys: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
            let objects: Vec<serde_json::Map<String, serde_json::Value>> = rows
                .iter()
                .map(|row| {
                    keys.iter()
                        .zip(row.iter().map(String::as_str).chain(std::iter::repeat("")))
                        .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                        .collect()
                })
                .collect();
            self.json_line(&objects);
            return;
        }

        if rows.is_empty() {
            println!("{}", "(none)".dimmed());
            return;
        }

        let widths: Vec<usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                rows.iter()
                    .filter_map(|r| r.get(i))
                    .map(|c| c.chars().count())
                    .fold(h.len(), usize::max)
            })
            .collect();

        let line = |cells: Vec<&str>| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{c:<w$}"))
                .collect::<Vec<_>>()
                .join("  ")
        };

        println!("{}", line(headers.to_vec()).bold());
        for row in rows {
            println!("{}", line(row.iter().map(String::as_str).collect()));
        }
    }

    /// One chat line, or the message as a JSON line.
    pub fn message(&self, msg: &ChatMessage, me: Option<&Identity>) {
        if self.json {
            self.json_line(msg);
            return;
        }

        let time = msg
            .sent_at()
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".into());

        let who = if me == Some(&msg.sender) {
            "me".cyan().bold()
        } else {
            short(msg.sender.as_str()).yellow().bold()
        };

        let body = if msg.is_undecryptable() {
            msg.text.red().to_string()
        } else {
            match msg.kind {
                MessageKind::Text => msg.text.clone(),
                MessageKind::Audio => format!("[voice message, {} base64 chars]", msg.text.len())
                    .dimmed()
                    .to_string(),
            }
        };

        println!("{} {who}: {body}", time.dimmed());
    }
}

/// Shortens an address for display: `0x1234…abcd`.
pub fn short(address: &str) -> String {
    let count = address.chars().count();
    if count <= 12 {
        return address.to_string();
    }
    let head: String = address.chars().take(6).collect();
    let tail: String = address.chars().skip(count - 4).collect();
    format!("{head}…{tail}")
}
