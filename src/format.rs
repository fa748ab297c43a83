use num_format::{Locale, ToFormattedString};

/// `$61,000.00` above one dollar, four decimals below it.
pub fn format_usd(amount: f64) -> String {
    if !amount.is_finite() {
        return "-".to_string();
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    let amount = amount.abs();
    let (scale, decimals) = if amount >= 1.0 { (100.0, 2) } else { (10_000.0, 4) };
    let scaled = (amount * scale).round() as u64;
    let whole = scaled / scale as u64;
    let fraction = scaled % scale as u64;
    format!(
        "{}${}.{:0width$}",
        sign,
        whole.to_formatted_string(&Locale::en),
        fraction,
        width = decimals
    )
}

/// Compact dollar amount for market cap and volume columns.
pub fn format_compact_usd(amount: f64) -> String {
    if !amount.is_finite() {
        return "-".to_string();
    }
    if amount >= 1e12 {
        format!("${:.2}T", amount / 1e12)
    } else if amount >= 1e9 {
        format!("${:.2}B", amount / 1e9)
    } else if amount >= 1e6 {
        format!("${:.2}M", amount / 1e6)
    } else {
        format_usd(amount)
    }
}

pub fn format_change(change: f64) -> String {
    if change > 0.0 {
        format!("+{:.2}%", change)
    } else {
        format!("{:.2}%", change)
    }
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}
