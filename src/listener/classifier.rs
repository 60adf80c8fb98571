//! Log classification
//!
//! There is no schema for program logs, so events are recognized by text
//! patterns. The rules are approximate: direction comes from the relative
//! position of the `from:` and `to:` markers and swap attribution falls back
//! to the master account.

use crate::constants::{markers, mints};
use crate::models::{ClassifiedEvent, TradeDirection};
use crate::runtime_config::RuntimeConfigStore;
use crate::utils::{is_base58_char, lamports_to_sol};
use std::sync::Arc;
use tracing::trace;

const MIN_ADDRESS_LEN: usize = 32;
const MAX_ADDRESS_LEN: usize = 44;

/// Turns a transaction's log lines into a typed event
pub trait LogClassifier: Send + Sync {
    fn classify(&self, logs: &[String], signature: &str) -> Option<ClassifiedEvent>;
}

/// Pattern-matching classifier
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    master: String,
    runtime: Arc<RuntimeConfigStore>,
}

impl HeuristicClassifier {
    pub fn new(master: impl Into<String>, runtime: Arc<RuntimeConfigStore>) -> Self {
        Self {
            master: master.into(),
            runtime,
        }
    }

    /// Swap against the native asset
    fn classify_swap(&self, text: &str, signature: &str) -> Option<ClassifiedEvent> {
        if !text.contains(markers::SWAP_INSTRUCTION) {
            return None;
        }
        if !(text.contains(markers::WSOL) || text.contains(mints::SOL)) {
            return None;
        }

        let from_pos = text.find(markers::FROM)?;
        let to_pos = text.find(markers::TO)?;
        let direction = if from_pos < to_pos {
            TradeDirection::Buy
        } else {
            TradeDirection::Sell
        };

        let asset_id = base58_tokens(text)
            .into_iter()
            .find(|token| *token != mints::SOL)
            .map(str::to_string);

        Some(ClassifiedEvent::Swap {
            direction,
            source_account: self.master.clone(),
            asset_id,
            amount_sol: parse_sol_amount(text),
            signature: signature.to_string(),
        })
    }

    /// Native transfer within the discovery range
    fn classify_transfer(&self, text: &str, signature: &str) -> Option<ClassifiedEvent> {
        if !(text.contains(markers::TRANSFER) && text.contains(markers::LAMPORTS)) {
            return None;
        }
        let amount_sol = lamports_to_sol(parse_lamports(text)?);
        if !self.runtime.snapshot().in_transfer_range(amount_sol) {
            trace!(signature = %signature, amount_sol, "Transfer outside range");
            return None;
        }

        let to = address_after(text, "to: ")?;
        let from = address_after(text, "from: ").unwrap_or(self.master.as_str());

        Some(ClassifiedEvent::Transfer {
            from: from.to_string(),
            to: to.to_string(),
            amount_sol,
            signature: signature.to_string(),
        })
    }
}

impl LogClassifier for HeuristicClassifier {
    fn classify(&self, logs: &[String], signature: &str) -> Option<ClassifiedEvent> {
        let text = logs.join(" ");
        self.classify_swap(&text, signature)
            .or_else(|| self.classify_transfer(&text, signature))
    }
}

/// Base58-looking tokens of 32..=44 characters, in order of appearance.
///
/// A longer run is consumed in 44-character chunks, like a greedy
/// `[1-9A-HJ-NP-Za-km-z]{32,44}` scan.
pub fn base58_tokens(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut run_start: Option<usize> = None;

    for (idx, c) in text.char_indices() {
        match (is_base58_char(c), run_start) {
            (true, None) => run_start = Some(idx),
            (false, Some(start)) => {
                push_run(text, start, idx, &mut tokens);
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        push_run(text, start, text.len(), &mut tokens);
    }
    tokens
}

fn push_run<'a>(text: &'a str, start: usize, end: usize, tokens: &mut Vec<&'a str>) {
    let mut pos = start;
    while end - pos >= MIN_ADDRESS_LEN {
        let chunk_end = (pos + MAX_ADDRESS_LEN).min(end);
        tokens.push(&text[pos..chunk_end]);
        pos = chunk_end;
    }
}

/// First address following `marker`, e.g. `to: <addr>`
fn address_after<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    text.match_indices(marker).find_map(|(idx, _)| {
        let rest = &text[idx + marker.len()..];
        let len = rest
            .char_indices()
            .find(|(_, c)| !is_base58_char(*c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        (len >= MIN_ADDRESS_LEN).then(|| &rest[..len.min(MAX_ADDRESS_LEN)])
    })
}

/// Amount from the first `Transfer: <n>[.<m>] SOL`
pub fn parse_sol_amount(text: &str) -> Option<f64> {
    text.match_indices(markers::TRANSFER_PREFIX)
        .find_map(|(idx, _)| {
            let rest = &text[idx + markers::TRANSFER_PREFIX.len()..];
            let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
            if int_len == 0 {
                return None;
            }
            let mut len = int_len;
            if rest[len..].starts_with('.') {
                len += 1 + rest[len + 1..].bytes().take_while(u8::is_ascii_digit).count();
            }
            if !rest[len..].starts_with(" SOL") {
                return None;
            }
            rest[..len].trim_end_matches('.').parse::<f64>().ok()
        })
}

/// Integer from the first `<n> lamports`
pub fn parse_lamports(text: &str) -> Option<u64> {
    text.match_indices(" lamports").find_map(|(idx, _)| {
        let before = &text[..idx];
        let digits = before
            .bytes()
            .rev()
            .take_while(u8::is_ascii_digit)
            .count();
        if digits == 0 {
            return None;
        }
        before[idx - digits..].parse::<u64>().ok()
    })
}
