//! Unavailability notes on line items.

/// Marker every unavailability entry starts with.
pub const UNAVAILABLE_PREFIX: &str = "UNAVAILABLE";

/// Format one audit entry. Blank notes still produce a bare marker.
pub fn unavailable_entry(note: Option<&str>) -> String {
    match note.map(str::trim).filter(|n| !n.is_empty()) {
        Some(note) => format!("{UNAVAILABLE_PREFIX}: {note}"),
        None => UNAVAILABLE_PREFIX.to_string(),
    }
}
