//! Masking of secrets before they reach the log output.

const DEFAULT_VISIBLE: usize = 4;

/// Replace every character except the last four with `*`.
pub fn mask_secret(value: &str) -> String {
    mask_secret_keep(value, DEFAULT_VISIBLE)
}

/// Replace every character except the last `visible` ones with `*`.
///
/// Values no longer than `visible` are returned unchanged.
pub fn mask_secret_keep(value: &str, visible: usize) -> String {
    let total = value.chars().count();
    if total <= visible {
        return value.to_string();
    }
    let hidden = total - visible;
    value
        .chars()
        .enumerate()
        .map(|(i, c)| if i < hidden { '*' } else { c })
        .collect()
}
