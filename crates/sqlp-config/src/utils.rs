/// Parses a duration string into a number of milliseconds.
///
/// The string is a sequence of `<digits><unit>` pairs where the unit is one
/// of `s`, `m`, `h` or `d`, e.g. `1h30m` or `45s`.
///
/// Returns `None` for malformed input, an empty string, or on overflow.
///
/// # Examples
///
/// ```
/// use sqlp_config::utils::parse_duration;
///
/// assert_eq!(parse_duration("1m30s"), Some(90_000));
/// ```
pub fn parse_duration(input: &str) -> Option<u128> {
    if input.is_empty() {
        return None;
    }

    let mut total: u128 = 0;
    let mut chars = input.chars().peekable();

    while chars.peek().is_some() {
        let mut number_str = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() {
                number_str.push(chars.next()?);
            } else {
                break;
            }
        }

        if number_str.is_empty() {
            return None;
        }

        let number: u128 = number_str.parse().ok()?;
        let multiplier = match chars.next()? {
            's' => 1000,
            'm' => 60 * 1000,
            'h' => 60 * 60 * 1000,
            'd' => 24 * 60 * 60 * 1000,
            _ => return None,
        };

        total = total.checked_add(number.checked_mul(multiplier)?)?;
    }

    Some(total)
}
