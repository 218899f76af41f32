use serde::Serializer;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Slots, lamports and stake can exceed 2^53, so they go over the wire as
/// strings.
pub fn serialize_u64_as_string<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

/// Format lamports as SOL
/// Examples: "0 SOL", "1.5 SOL", "0.000005 SOL"
pub fn format_sol(lamports: u64) -> String {
    if lamports == 0 {
        return "0 SOL".to_string();
    }
    let whole = lamports / LAMPORTS_PER_SOL;
    let frac = lamports % LAMPORTS_PER_SOL;
    if frac == 0 {
        return format!("{whole} SOL");
    }
    let frac = format!("{frac:09}");
    format!("{whole}.{} SOL", frac.trim_end_matches('0'))
}

/// Scale a raw token amount by its mint decimals. Works on the digit string,
/// so any `u8` decimals is fine.
pub fn format_token_amount(raw: u64, decimals: u8) -> String {
    let digits = raw.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }
    let padded = format!("{digits:0>width$}", width = decimals + 1);
    let (whole, frac) = padded.split_at(padded.len() - decimals);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac}")
    }
}

/// Block time (unix seconds) as a UTC timestamp string.
pub fn format_block_time(unix_secs: i64) -> String {
    use chrono::{TimeZone, Utc};
    match Utc.timestamp_opt(unix_secs, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "-".into(),
    }
}

/// Shorten a base58 key for log lines: "9xQeWv...VFin"
pub fn short_key(key: &str) -> String {
    let len = key.chars().count();
    if len <= 12 {
        return key.to_string();
    }
    let head: String = key.chars().take(6).collect();
    let tail: String = key.chars().skip(len - 4).collect();
    format!("{head}...{tail}")
}
