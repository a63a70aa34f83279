/// Normalises a stored phone number to `+<country><number>`.
///
/// Accepts `+` or `00` international forms and 10-digit national mobiles
/// (leading `3`), which get `country_code` prepended. Returns `None` when the
/// value cannot be turned into an E.164 number.
pub fn to_international(raw: &str, country_code: &str) -> Option<String> {
    let mut s: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    if let Some(rest) = s.strip_prefix("00") {
        s = format!("+{rest}");
    }

    let digits = if let Some(rest) = s.strip_prefix('+') {
        rest.to_string()
    } else if s.len() == 10 && s.starts_with('3') {
        format!("{country_code}{s}")
    } else if s.len() == country_code.len() + 10 && s.starts_with(country_code) {
        s
    } else {
        return None;
    };

    if digits.len() < 8 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    Some(format!("+{digits}"))
}

#[cfg(test)]
mod tests {
    use super::to_international;

    #[test]
    fn national_mobile_gets_country_code() {
        assert_eq!(to_international("300 123 4567", "57").as_deref(), Some("+573001234567"));
        assert_eq!(to_international("(310)-555.1234", "57").as_deref(), Some("+573105551234"));
    }

    #[test]
    fn international_forms_are_kept() {
        assert_eq!(to_international("+57 300 1234567", "57").as_deref(), Some("+573001234567"));
        assert_eq!(to_international("0034612345678", "57").as_deref(), Some("+34612345678"));
        assert_eq!(to_international("573001234567", "57").as_deref(), Some("+573001234567"));
    }

    #[test]
    fn landlines_and_garbage_are_rejected() {
        assert_eq!(to_international("8712345", "57"), None);
        assert_eq!(to_international("+57abc", "57"), None);
        assert_eq!(to_international("", "57"), None);
        assert_eq!(to_international("+1234567890123456", "57"), None);
    }
}
