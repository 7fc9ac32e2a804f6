//! Relative-age formatting for listings.

/// Format an age in seconds as a short "ago" string.
pub fn format_age(secs: i64) -> String {
    if secs < 0 {
        return "in the future".to_string();
    }
    let secs = secs as u64;
    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86400)
    }
}
