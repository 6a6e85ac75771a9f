//! Test fixtures.

use std::fmt::Write as _;

/// Render `(name, phones)` pairs as vCard 3.0 text.
///
/// An empty name omits the `FN` line.
pub fn vcard_file(cards: &[(&str, &[&str])]) -> String {
    let mut out = String::new();
    for (name, phones) in cards {
        out.push_str("BEGIN:VCARD\r\nVERSION:3.0\r\n");
        if !name.is_empty() {
            let _ = write!(out, "FN:{name}\r\n");
        }
        for phone in *phones {
            let _ = write!(out, "TEL;TYPE=CELL:{phone}\r\n");
        }
        out.push_str("END:VCARD\r\n");
    }
    out
}

/// The two-contact file used by end-to-end scenarios.
pub fn alice_and_bob() -> String {
    vcard_file(&[("Alice", &["+1 555 123 4567"]), ("Bob", &["+1 (555) 765-4321"])])
}
