//! Challenge and block detection
//!
//! Classifies a fetch attempt independently of the transport layer's idea
//! of success: a 200 carrying a bot-challenge interstitial is still a soft
//! block, and a response that arrived through a long redirect chain is
//! treated as one too.

use crate::constants::{challenge, http};

/// Outcome classification for one fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Usable response; stop retrying
    Success,
    /// Transient rejection; retry the same tier with a fresh identity
    SoftBlock,
    /// Not worth retrying at this tier; escalate
    HardBlock,
}

/// Classify a completed HTTP exchange.
///
/// Rules, in precedence order:
/// - challenge markers in the body are a soft block regardless of status
/// - 403, 429 and 503 are soft blocks (rate limiting or challenge gates)
/// - a redirect chain longer than the threshold is a soft block even on 2xx
/// - a terminal 3xx means the redirect chain never resolved, the same
///   open-redirect symptom, so it is a soft block too
/// - any other 2xx is a success
/// - everything else is a hard block
pub fn classify(status: u16, redirect_hops: u32, body: &[u8]) -> Classification {
    if has_challenge_markers(body) {
        return Classification::SoftBlock;
    }
    if matches!(status, 403 | 429 | 503) {
        return Classification::SoftBlock;
    }
    if (300..400).contains(&status) {
        return Classification::SoftBlock;
    }
    if (200..300).contains(&status) {
        if redirect_hops > http::REDIRECT_SOFT_BLOCK_THRESHOLD {
            return Classification::SoftBlock;
        }
        return Classification::Success;
    }
    Classification::HardBlock
}

/// Scan the body prefix for known challenge-page markers
pub fn has_challenge_markers(body: &[u8]) -> bool {
    let prefix = &body[..body.len().min(challenge::BODY_SCAN_LIMIT)];
    let text = String::from_utf8_lossy(prefix).to_lowercase();
    challenge::BODY_MARKERS.iter().any(|m| text.contains(m))
}
