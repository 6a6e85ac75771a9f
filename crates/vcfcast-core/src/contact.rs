//! Contacts and the contact directory built from one upload.
//!
//! A [`ContactSet`] is built once from the parser's entries and never mutated
//! afterwards. Ingestion canonicalizes every telephone value, drops values
//! that are too short, and keeps only the first occurrence of each address
//! across the whole upload.

use std::collections::HashMap;

use serde::Serialize;

use crate::Address;

/// A named recipient.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Contact {
    /// Display name (placeholder when the card had none).
    pub name: String,
    /// Canonical recipient address.
    pub address: Address,
}

impl Contact {
    /// Create a contact from an already canonical address.
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        Self { name: name.into(), address }
    }
}

/// One entry as produced by the contact-file parser.
///
/// An entry may carry zero, one, or several raw telephone values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEntry {
    /// Formatted name, if the card had one.
    pub name: Option<String>,
    /// Raw telephone values in card order.
    pub phones: Vec<String>,
}

impl ParsedEntry {
    /// Entry with a name and telephone values.
    pub fn new<I, S>(name: impl Into<String>, phones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { name: Some(name.into()), phones: phones.into_iter().map(Into::into).collect() }
    }
}

/// What ingestion kept and dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Parser entries seen.
    pub entries: usize,
    /// Raw telephone values seen across all entries.
    pub phone_values: usize,
    /// Values discarded for being shorter than the minimum address length.
    pub too_short: usize,
    /// Values discarded because their address was already accepted.
    pub duplicates: usize,
}

impl IngestSummary {
    /// Values that did not become contacts.
    pub fn skipped(&self) -> usize {
        self.too_short + self.duplicates
    }
}

/// Ordered, de-duplicated recipient directory.
///
/// # Invariants
///
/// - Every `address` appears at most once.
/// - Order is first-seen order across the parser output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactSet {
    contacts: Vec<Contact>,
    positions: HashMap<Address, usize>,
    summary: IngestSummary,
}

impl ContactSet {
    /// Build a contact set from parser entries.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = ParsedEntry>,
    {
        let mut set = Self::default();

        for (position, entry) in entries.into_iter().enumerate() {
            set.summary.entries += 1;

            let name = entry
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("Contact {}", position + 1));

            for raw in &entry.phones {
                set.summary.phone_values += 1;

                let Some(address) = Address::canonicalize(raw) else {
                    set.summary.too_short += 1;
                    continue;
                };

                if set.positions.contains_key(&address) {
                    set.summary.duplicates += 1;
                    continue;
                }

                set.positions.insert(address.clone(), set.contacts.len());
                set.contacts.push(Contact::new(name.clone(), address));
            }
        }

        tracing::debug!(
            entries = set.summary.entries,
            accepted = set.contacts.len(),
            too_short = set.summary.too_short,
            duplicates = set.summary.duplicates,
            "contact set built"
        );

        set
    }

    /// Number of contacts.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// True if ingestion kept no contacts.
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Contact at a zero-based index. `None` if out of range.
    pub fn get(&self, index: usize) -> Option<&Contact> {
        self.contacts.get(index)
    }

    /// Index of the contact with this address. `None` if absent.
    pub fn position(&self, address: &Address) -> Option<usize> {
        self.positions.get(address).copied()
    }

    /// Check whether an address belongs to this set.
    pub fn contains(&self, address: &Address) -> bool {
        self.positions.contains_key(address)
    }

    /// Contacts in first-seen order.
    pub fn iter(&self) -> std::slice::Iter<'_, Contact> {
        self.contacts.iter()
    }

    /// Contacts in first-seen order.
    pub fn as_slice(&self) -> &[Contact] {
        &self.contacts
    }

    /// Ingestion statistics.
    pub fn summary(&self) -> IngestSummary {
        self.summary
    }
}

impl<'a> IntoIterator for &'a ContactSet {
    type Item = &'a Contact;
    type IntoIter = std::slice::Iter<'a, Contact>;

    fn into_iter(self) -> Self::IntoIter {
        self.contacts.iter()
    }
}
