/// Phrases that mark a message as urgent. English only and not exhaustive.
///
/// Matching is case-insensitive. A keyword must start at a word boundary and
/// must not run into a following digit, so "102" does not fire on "1020 IU".
/// An occurrence directly after "non-" or "non " is ignored.
pub const EMERGENCY_KEYWORDS: &[&str] = &[
    "head injury",
    "head hit",
    "hit my head",
    "hit his head",
    "hit her head",
    "bleeding heavily",
    "severe bleeding",
    "uncontrolled bleeding",
    "won't stop bleeding",
    "can't stop bleeding",
    "internal bleeding",
    "intracranial",
    "emergency",
    "ambulance",
    "911",
    "102",
    "unconscious",
    "passed out",
    "can't breathe",
    "cannot breathe",
    "choking",
    "severe pain",
    "life threatening",
    "dying",
];

/// True when `text` mentions any emergency keyword.
pub fn is_emergency_message(text: &str) -> bool {
    let lower = text.to_lowercase().replace('\u{2019}', "'");
    EMERGENCY_KEYWORDS
        .iter()
        .any(|keyword| mentions(&lower, keyword))
}

fn mentions(text: &str, keyword: &str) -> bool {
    text.match_indices(keyword).any(|(start, _)| {
        let prefix = &text[..start];
        let before = prefix.chars().next_back();
        let after = text[start + keyword.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric)
            && !after.is_some_and(|c| c.is_ascii_digit())
            && !prefix.ends_with("non-")
            && !prefix.ends_with("non ")
    })
}
