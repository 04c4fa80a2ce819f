//! Replays a JSON transcript through a fresh session and prints one JSON line
//! per user turn: the decision plus the slots after commit.
//!
//! Usage: replay_transcript <transcript.json> [--json-logs]
//!
//! The transcript is an array whose entries are either a turn
//! (`{"text": .., "intent": {"name": .., "confidence": ..}, "entities": [..]}`)
//! or a bot message (`{"bot": "Which district are you in?"}`).

use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::json;
use std::{env, fs};

use crisis_decision_core::{telemetry, DecisionEngine, EngineConfig, Session, Turn};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entry {
    Bot { bot: String },
    User(Turn),
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let mut path = None;
    let mut json_logs = false;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--json-logs" => json_logs = true,
            _ if path.is_none() => path = Some(arg),
            other => bail!("unexpected argument `{other}`"),
        }
    }
    let Some(path) = path else {
        bail!("usage: replay_transcript <transcript.json> [--json-logs]");
    };

    telemetry::init_tracing(json_logs);

    let cfg = EngineConfig::load().context("loading engine config")?;
    let engine = DecisionEngine::new(cfg);

    let raw = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let entries: Vec<Entry> =
        serde_json::from_str(&raw).with_context(|| format!("parsing transcript {path}"))?;

    let mut session = Session::new("replay");
    for (i, entry) in entries.into_iter().enumerate() {
        match entry {
            Entry::Bot { bot } => session.record_bot_message(&bot),
            Entry::User(turn) => {
                let decision = session
                    .handle_turn(&engine, &turn)
                    .with_context(|| format!("turn #{i} rejected"))?;
                let line = json!({
                    "turn": i,
                    "decision": decision,
                    "slots": session.slots(),
                });
                println!("{line}");
            }
        }
    }
    Ok(())
}
