//! Number formatting shared by the expense and stock renderers

/// Format `value` with a fixed number of decimals and comma thousands
/// separators, e.g. `1234567.891` → `1,234,567.89`.
pub fn grouped(value: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (fixed.as_str(), None),
    };

    let mut out = String::with_capacity(fixed.len() + int_part.len() / 3 + 1);
    let negative = value.is_sign_negative() && fixed.bytes().any(|b| matches!(b, b'1'..=b'9'));
    if negative {
        out.push('-');
    }

    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    if let Some(frac_part) = frac_part {
        out.push('.');
        out.push_str(frac_part);
    }

    out
}

/// Rupee amount with two decimals: `₹1,234.50`.
pub fn rupees(value: f64) -> String {
    format!("₹{}", grouped(value, 2))
}
