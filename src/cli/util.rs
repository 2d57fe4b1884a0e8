use crate::errors::SessionError;

/// Split `field=value` at the first `=`.
///
/// # Errors
/// Returns a query error when there is no `=` or the field is empty.
pub fn parse_pair(s: &str) -> Result<(String, String), SessionError> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(SessionError::QueryError(format!("expected field=value, got '{s}'"))),
    }
}

/// Comma-separated sort spec: `-Email,+Name,Date` → descending Email, ascending Name and Date.
#[must_use]
pub fn parse_sort(s: &str) -> Vec<(String, bool)> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|part| {
            if let Some(rest) = part.strip_prefix('-') {
                (rest.to_string(), false)
            } else if let Some(rest) = part.strip_prefix('+') {
                (rest.to_string(), true)
            } else {
                (part.to_string(), true)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_parsing() {
        assert_eq!(parse_pair("Name=jo=hn").unwrap(), ("Name".to_string(), "jo=hn".to_string()));
        assert_eq!(parse_pair("Email=").unwrap(), ("Email".to_string(), String::new()));
        assert!(parse_pair("Name").is_err());
        assert!(parse_pair("=x").is_err());
    }

    #[test]
    fn sort_parsing() {
        assert_eq!(
            parse_sort("-Email, +Name,Date,,"),
            vec![("Email".to_string(), false), ("Name".to_string(), true), ("Date".to_string(), true)]
        );
        assert!(parse_sort("").is_empty());
    }
}
