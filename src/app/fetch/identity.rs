//! Request identity rotation
//!
//! A fixed pool of browser identities (user-agent plus matching header
//! profile). The fetcher rotates to a fresh identity on every soft block;
//! the pool is shared across all tiers so escalation does not re-present an
//! identity the site has just rejected. Rotation is a pure index step over
//! the pool rather than in-place mutation of shared client headers.

/// A user-agent and its accompanying header profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_agent: &'static str,
    pub headers: &'static [(&'static str, &'static str)],
}

const DESKTOP_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Referer", "https://www.google.com/"),
];

const FRENCH_DESKTOP_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "fr-FR,fr;q=0.9,en;q=0.8"),
    ("Referer", "https://www.google.com/"),
];

/// Fixed identity pool shared by every fetch tier
pub const IDENTITIES: &[Identity] = &[
    Identity {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        headers: DESKTOP_HEADERS,
    },
    Identity {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        headers: FRENCH_DESKTOP_HEADERS,
    },
    Identity {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
        headers: DESKTOP_HEADERS,
    },
    Identity {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        headers: FRENCH_DESKTOP_HEADERS,
    },
    Identity {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (Version/17.4 Safari/605.1.15)",
        headers: DESKTOP_HEADERS,
    },
];

/// Pure rotation step: the identity following `last_used` in the pool
pub fn next_index(pool_len: usize, last_used: usize) -> usize {
    (last_used + 1) % pool_len
}

/// Cursor over the shared identity pool
#[derive(Debug)]
pub struct IdentityPool {
    index: usize,
}

impl IdentityPool {
    /// Start at a random position so repeated runs do not always lead
    /// with the same identity.
    pub fn new() -> Self {
        Self {
            index: rand::random::<usize>() % IDENTITIES.len(),
        }
    }

    /// The identity in effect for the next attempt
    pub fn current(&self) -> &'static Identity {
        &IDENTITIES[self.index]
    }

    /// Advance to a fresh identity, returning it
    pub fn rotate(&mut self) -> &'static Identity {
        self.index = next_index(IDENTITIES.len(), self.index);
        self.current()
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self::new()
    }
}
