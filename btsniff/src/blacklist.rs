use std::collections::HashSet;

use btsniff_core::MacAddress;
use tracing::warn;

/// Set of device addresses that must never be logged.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    entries: HashSet<String>,
}

impl Blacklist {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|entry| {
                let entry = entry.as_ref();
                if entry.parse::<MacAddress>().is_err() {
                    warn!(entry, "Blacklist entry is not a valid device address");
                }
                canonicalize(entry)
            })
            .collect();

        Self { entries }
    }

    /// Returns false iff the identifier matches a blacklist entry.
    pub fn keep(&self, identifier: &str) -> bool {
        !self.entries.contains(&canonicalize(identifier))
    }

    pub fn keep_address(&self, address: &MacAddress) -> bool {
        !self.entries.contains(&address.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

/// Canonical form used on both sides of the comparison.
///
/// Strings that are not device addresses fall back to their trimmed
/// uppercase form so they can still match each other exactly.
fn canonicalize(identifier: &str) -> String {
    match identifier.parse::<MacAddress>() {
        Ok(mac) => mac.to_string(),
        Err(_) => identifier.trim().to_uppercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_addresses_are_dropped_in_any_format() {
        let blacklist = Blacklist::new(["aa:bb:cc:dd:ee:ff", "11-22-33-44-55-66"]);

        for id in [
            "AA:BB:CC:DD:EE:FF",
            "aa:bb:cc:dd:ee:ff",
            "aabbccddeeff",
            "Aa-Bb-Cc-Dd-Ee-Ff",
            "11:22:33:44:55:66",
            "112233445566",
        ] {
            assert!(!blacklist.keep(id), "{id} should be dropped");
        }
    }

    #[test]
    fn unlisted_addresses_are_kept() {
        let blacklist = Blacklist::new(["AA:BB:CC:DD:EE:FF"]);

        assert!(blacklist.keep("11:22:33:44:55:67"));
        assert!(blacklist.keep("AA:BB:CC:DD:EE:FE"));
        assert!(blacklist.keep("garbage"));
    }

    #[test]
    fn address_check_matches_string_check() {
        let blacklist = Blacklist::new(["aa:bb:cc:dd:ee:ff"]);
        let listed: MacAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        let other: MacAddress = "11:22:33:44:55:67".parse().unwrap();

        assert!(!blacklist.keep_address(&listed));
        assert!(blacklist.keep_address(&other));
    }

    #[test]
    fn invalid_entries_match_exactly_ignoring_case() {
        let blacklist = Blacklist::new([" my-beacon "]);

        assert!(!blacklist.keep("MY-BEACON"));
        assert!(blacklist.keep("my-beacon-2"));
        assert_eq!(blacklist.len(), 1);
    }

    #[test]
    fn empty_blacklist_keeps_everything() {
        let blacklist = Blacklist::default();
        assert!(blacklist.is_empty());
        assert!(blacklist.keep("AA:BB:CC:DD:EE:FF"));
    }
}
