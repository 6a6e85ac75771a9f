//! Recipient selection within one session.
//!
//! The tracker is bound to one [`ContactSet`] and compares contacts by
//! address, so a contact reconstructed from the same address is the same
//! member. Selection order is the order in which contacts were added; that
//! order is the delivery order.

use std::{collections::HashSet, sync::Arc};

use crate::{Address, Contact, ContactError, ContactSet};

/// Result of a toggle-style mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Contact is now selected.
    Added,
    /// Contact is now not selected.
    Removed,
}

/// Mutable set of chosen recipients drawn from one contact set.
///
/// # Invariants
///
/// - Every selected address exists in the backing contact set.
/// - `order` and `members` always hold the same addresses.
#[derive(Debug, Clone)]
pub struct SelectionTracker {
    contacts: Arc<ContactSet>,
    order: Vec<Address>,
    members: HashSet<Address>,
}

impl SelectionTracker {
    /// Empty selection over `contacts`.
    pub fn new(contacts: Arc<ContactSet>) -> Self {
        Self { contacts, order: Vec::new(), members: HashSet::new() }
    }

    /// Backing contact set.
    pub fn contacts(&self) -> &Arc<ContactSet> {
        &self.contacts
    }

    /// Flip membership of `contact`.
    ///
    /// # Errors
    ///
    /// - `ContactError::UnknownContact` if the address is not in the set
    pub fn toggle(&mut self, contact: &Contact) -> Result<ToggleOutcome, ContactError> {
        self.ensure_known(&contact.address)?;

        if self.members.remove(&contact.address) {
            self.order.retain(|a| a != &contact.address);
            Ok(ToggleOutcome::Removed)
        } else {
            self.members.insert(contact.address.clone());
            self.order.push(contact.address.clone());
            Ok(ToggleOutcome::Added)
        }
    }

    /// Flip membership of the contact at a zero-based index.
    pub fn toggle_index(&mut self, index: usize) -> Result<ToggleOutcome, ContactError> {
        let contact = self.contacts.get(index).cloned().ok_or_else(|| {
            ContactError::IndexOutOfRange { indices: vec![index], len: self.contacts.len() }
        })?;
        self.toggle(&contact)
    }

    /// Remove `contact`. Removing an unselected contact is a no-op.
    pub fn deselect(&mut self, contact: &Contact) -> Result<ToggleOutcome, ContactError> {
        self.ensure_known(&contact.address)?;

        if self.members.remove(&contact.address) {
            self.order.retain(|a| a != &contact.address);
        }
        Ok(ToggleOutcome::Removed)
    }

    /// Select every contact. Returns `false` if everything was selected already.
    ///
    /// Missing contacts are appended in contact set order.
    pub fn select_all(&mut self) -> bool {
        let mut changed = false;
        for contact in self.contacts.iter() {
            if self.members.insert(contact.address.clone()) {
                self.order.push(contact.address.clone());
                changed = true;
            }
        }
        changed
    }

    /// Deselect everything. Returns `false` if nothing was selected.
    pub fn clear(&mut self) -> bool {
        if self.order.is_empty() {
            return false;
        }
        self.order.clear();
        self.members.clear();
        true
    }

    /// Replace the selection with the contacts at the given zero-based indices.
    ///
    /// Duplicate indices collapse to their first occurrence. The selection is
    /// untouched if any index is out of range.
    ///
    /// # Errors
    ///
    /// - `ContactError::IndexOutOfRange` listing every invalid index
    pub fn replace_with_indices(&mut self, indices: &[usize]) -> Result<usize, ContactError> {
        let len = self.contacts.len();
        let invalid: Vec<usize> = indices.iter().copied().filter(|&i| i >= len).collect();
        if !invalid.is_empty() {
            return Err(ContactError::IndexOutOfRange { indices: invalid, len });
        }

        let mut order = Vec::with_capacity(indices.len());
        let mut members = HashSet::with_capacity(indices.len());
        for contact in indices.iter().filter_map(|&i| self.contacts.get(i)) {
            if members.insert(contact.address.clone()) {
                order.push(contact.address.clone());
            }
        }

        self.order = order;
        self.members = members;
        Ok(self.order.len())
    }

    /// Check whether an address is selected.
    pub fn contains(&self, address: &Address) -> bool {
        self.members.contains(address)
    }

    /// Number of selected contacts.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Selected contacts in selection order.
    pub fn snapshot(&self) -> Vec<Contact> {
        self.order
            .iter()
            .filter_map(|a| self.contacts.position(a).and_then(|i| self.contacts.get(i)))
            .cloned()
            .collect()
    }

    fn ensure_known(&self, address: &Address) -> Result<(), ContactError> {
        if self.contacts.contains(address) {
            Ok(())
        } else {
            Err(ContactError::UnknownContact(address.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParsedEntry;

    fn tracker() -> SelectionTracker {
        let set = ContactSet::from_entries(vec![
            ParsedEntry::new("Alice", ["+15551234567"]),
            ParsedEntry::new("Bob", ["+15557654321"]),
            ParsedEntry::new("Carol", ["+15550001111"]),
        ]);
        SelectionTracker::new(Arc::new(set))
    }

    #[test]
    fn toggle_compares_by_address() {
        let mut tracker = tracker();
        let address = Address::canonicalize("+1 555 123 4567").unwrap();
        let rebuilt = Contact::new("Someone Else", address);

        assert_eq!(tracker.toggle(&rebuilt), Ok(ToggleOutcome::Added));
        assert!(tracker.contains(&rebuilt.address));
        assert_eq!(tracker.toggle_index(0), Ok(ToggleOutcome::Removed));
        assert!(tracker.is_empty());
    }

    #[test]
    fn toggle_rejects_foreign_contact() {
        let mut tracker = tracker();
        let stranger = Contact::new("Mallory", Address::canonicalize("+19990000000").unwrap());

        assert!(matches!(tracker.toggle(&stranger), Err(ContactError::UnknownContact(_))));
        assert!(tracker.is_empty());
    }

    #[test]
    fn deselect_absent_is_noop() {
        let mut tracker = tracker();
        let bob = tracker.contacts().get(1).cloned().unwrap();

        assert_eq!(tracker.deselect(&bob), Ok(ToggleOutcome::Removed));
        assert!(tracker.is_empty());
    }

    #[test]
    fn snapshot_preserves_selection_order() {
        let mut tracker = tracker();
        tracker.toggle_index(2).unwrap();
        tracker.toggle_index(0).unwrap();

        let names: Vec<_> = tracker.snapshot().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["Carol", "Alice"]);

        assert!(tracker.select_all());
        let names: Vec<_> = tracker.snapshot().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["Carol", "Alice", "Bob"]);
    }

    #[test]
    fn select_all_and_clear_report_changes() {
        let mut tracker = tracker();

        assert!(!tracker.clear());
        assert!(tracker.select_all());
        assert!(!tracker.select_all());
        assert!(tracker.clear());
        assert!(!tracker.clear());
    }

    #[test]
    fn replace_with_indices_validates_everything_first() {
        let mut tracker = tracker();
        tracker.toggle_index(1).unwrap();

        let err = tracker.replace_with_indices(&[0, 5, 9]).unwrap_err();
        assert_eq!(err, ContactError::IndexOutOfRange { indices: vec![5, 9], len: 3 });
        assert_eq!(tracker.len(), 1);

        assert_eq!(tracker.replace_with_indices(&[2, 0, 2]), Ok(2));
        let names: Vec<_> = tracker.snapshot().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["Carol", "Alice"]);
    }
}
