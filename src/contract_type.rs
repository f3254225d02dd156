//! Keyword-based contract type classification.

/// Reported when no keyword family matches.
pub const DEFAULT_CONTRACT_TYPE: &str = "General Agreement";

/// Keyword families in priority order; the first family with a hit wins.
const CONTRACT_TYPES: &[(&str, &[&str])] = &[
    (
        "Non-Disclosure Agreement",
        &["non-disclosure agreement", "nondisclosure agreement", "confidentiality agreement", "mutual nda"],
    ),
    ("Lease Agreement", &["lease agreement", "landlord", "tenant", "premises"]),
    ("Employment Agreement", &["employment agreement", "employee", "employer", "salary"]),
    ("License Agreement", &["license agreement", "licensor", "licensee", "royalt"]),
    (
        "Service Agreement",
        &["services agreement", "service agreement", "statement of work", "service provider"],
    ),
    ("Purchase Agreement", &["purchase agreement", "purchase order", "buyer", "seller"]),
    ("Partnership Agreement", &["partnership agreement", "joint venture", "partners"]),
];

/// Only the opening of the contract is inspected; titles and recitals live there.
const HEADER_CHARS: usize = 3_000;

pub fn identify_contract_type(text: &str) -> &'static str {
    let header: String = text.chars().take(HEADER_CHARS).collect::<String>().to_lowercase();

    CONTRACT_TYPES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| header.contains(k)))
        .map(|(name, _)| *name)
        .unwrap_or(DEFAULT_CONTRACT_TYPE)
}
