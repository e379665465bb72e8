//! Subscription Registry
//!
//! The authoritative set of symbols the pipeline wants to receive.
//!
//! # Design
//!
//! The registry is the single source of truth for what the upstream feed
//! should be streaming. It is independent of any connection: it survives
//! reconnects, and every new connection replays a snapshot of it after
//! authentication succeeds.
//!
//! Symbols are normalized on the way in (trimmed, uppercased) so that
//! `" aapl"` and `"AAPL"` refer to the same entry. Blank inputs are ignored.

use std::collections::BTreeSet;

use parking_lot::RwLock;

// =============================================================================
// Types
// =============================================================================

/// A normalized ticker symbol (e.g. `AAPL`).
pub type Symbol = String;

/// Longest symbol accepted.
pub const MAX_SYMBOL_LEN: usize = 16;

/// Normalize a raw symbol: trim surrounding whitespace and uppercase it.
///
/// Returns `None` for blank input and for anything that is not a plain
/// ticker: only ASCII letters, digits and interior dots are allowed, so a
/// symbol can never carry a comma or wildcard into the subscribe list.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Option<Symbol> {
    let trimmed = raw.trim();
    let valid = !trimmed.is_empty()
        && trimmed.len() <= MAX_SYMBOL_LEN
        && !trimmed.starts_with('.')
        && !trimmed.ends_with('.')
        && trimmed
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.');
    valid.then(|| trimmed.to_ascii_uppercase())
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Thread-safe set of symbols the feed should be subscribed to.
///
/// Mutations are linearizable and `snapshot` always returns a consistent,
/// sorted copy of the set.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    symbols: RwLock<BTreeSet<Symbol>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with an initial symbol set.
    #[must_use]
    pub fn with_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let registry = Self::new();
        registry.add(symbols);
        registry
    }

    /// Add symbols to the set.
    ///
    /// Returns the symbols that were not present before, in input order.
    pub fn add<I, S>(&self, symbols: I) -> Vec<Symbol>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = self.symbols.write();
        symbols
            .into_iter()
            .filter_map(|raw| normalize_symbol(raw.as_ref()))
            .filter(|symbol| set.insert(symbol.clone()))
            .collect()
    }

    /// Remove symbols from the set.
    ///
    /// Returns the symbols that were actually present, in input order.
    /// Removing an absent symbol is a no-op.
    pub fn remove<I, S>(&self, symbols: I) -> Vec<Symbol>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = self.symbols.write();
        symbols
            .into_iter()
            .filter_map(|raw| normalize_symbol(raw.as_ref()))
            .filter(|symbol| set.remove(symbol))
            .collect()
    }

    /// Consistent copy of the current set, sorted.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Symbol> {
        self.symbols.read().iter().cloned().collect()
    }

    /// Whether a symbol is currently registered.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        normalize_symbol(symbol).is_some_and(|s| self.symbols.read().contains(&s))
    }

    /// Number of registered symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
