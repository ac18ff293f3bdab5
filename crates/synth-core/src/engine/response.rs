//! Clasificación de respuestas crudas del controlador.
//!
//! Las respuestas ambiguas (ni claramente positivas ni negativas) se tratan
//! como éxito tentativo y se registran con `warn!`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseVerdict {
    Accepted,
    Tentative,
    Rejected,
}

const ERROR_TOKENS: [&str; 4] = ["ERROR", "FAIL", "UNKNOWN", "INVALID"];
const ACK_PREFIXES: [&str; 5] = ["OK:", "DATA:", "STATUS:", "ACK", "INIT"];
const ACK_TOKENS: [&str; 3] = ["STARTED", "STOPPED", "P01"];

pub fn classify_response(raw: &str) -> ResponseVerdict {
    let r = raw.trim().to_ascii_uppercase();
    if r.is_empty() || ERROR_TOKENS.iter().any(|t| r.contains(t)) {
        ResponseVerdict::Rejected
    } else if r == "OK" || ACK_PREFIXES.iter().any(|p| r.starts_with(p)) || ACK_TOKENS.iter().any(|t| r.contains(t)) || r.starts_with("P?") {
        ResponseVerdict::Accepted
    } else {
        ResponseVerdict::Tentative
    }
}
