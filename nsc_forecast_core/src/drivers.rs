// ---------------------------------------------------------------------
// Fallback driver labels, used when the external driver generator is
// unavailable. Keyed on coarse question topics.
// ---------------------------------------------------------------------

/// Bounds on the number of driver labels a generator may return.
pub const MIN_DRIVERS: usize = 3;
pub const MAX_DRIVERS: usize = 5;

const TOPICS: &[(&[&str], [&str; 4])] = &[
    (
        &["election", "political", "vote", "senate", "president"],
        ["Polling data", "Economic conditions", "Campaign activity", "Voter turnout"],
    ),
    (
        &["bitcoin", "crypto", "ethereum", "token"],
        ["Regulatory environment", "Institutional adoption", "Market sentiment", "Technology development"],
    ),
    (
        &["ai", "technology", "model", "chip"],
        ["Research breakthroughs", "Compute scaling", "Regulatory frameworks", "Investment funding"],
    ),
    (
        &["climate", "environment", "emission", "temperature"],
        ["Policy changes", "Technology adoption", "Economic incentives", "International cooperation"],
    ),
];

const GENERIC: [&str; 4] = ["Market conditions", "Regulatory environment", "Public sentiment", "Economic factors"];

/// Deterministic driver labels for a question, chosen by keyword.
pub fn fallback_drivers(question: &str) -> Vec<String> {
    let lo = question.to_lowercase();
    let words: Vec<&str> = lo
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    for (keywords, labels) in TOPICS {
        // whole-word match so "ai" does not fire on "said"
        if keywords.iter().any(|k| words.contains(k)) {
            return labels.iter().map(|s| s.to_string()).collect();
        }
    }
    GENERIC.iter().map(|s| s.to_string()).collect()
}

/// Accept a generated driver list only if it has 3–5 non-empty labels.
pub fn validate_drivers(drivers: &[String]) -> Result<(), String> {
    if drivers.len() < MIN_DRIVERS || drivers.len() > MAX_DRIVERS {
        return Err(format!(
            "expected {}..={} drivers, got {}",
            MIN_DRIVERS,
            MAX_DRIVERS,
            drivers.len()
        ));
    }
    if drivers.iter().any(|d| d.trim().is_empty()) {
        return Err("empty driver label".to_string());
    }
    Ok(())
}
