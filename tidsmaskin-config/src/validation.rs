//! Custom validation functions for clock configuration.

use std::borrow::Cow;

use tidsmaskin_core::intercept::CallSite;
use validator::ValidationError;

/// Every chain entry must be a `key=value` pair with a non-empty key.
pub fn validate_chain(entries: &[String]) -> Result<(), ValidationError> {
    for entry in entries {
        let key = entry.split_once('=').map_or(entry.as_str(), |(key, _)| key);
        if key.trim().is_empty() {
            let mut error = ValidationError::new("malformed_chain_entry");
            error.message = Some(Cow::Owned(format!("'{entry}' is not a key=value pair")));
            return Err(error);
        }
    }
    Ok(())
}

/// Intercept names must be redirect points this crate knows about.
pub fn validate_intercepts(names: &[String]) -> Result<(), ValidationError> {
    match names.iter().find(|name| name.parse::<CallSite>().is_err()) {
        Some(unknown) => {
            let mut error = ValidationError::new("unknown_intercept");
            error.message = Some(Cow::Owned(format!("unknown intercepted method '{unknown}'")));
            Err(error)
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_entries_need_a_key() {
        assert!(validate_chain(&["offset=5".into(), "scaled=2".into()]).is_ok());
        assert!(validate_chain(&["manual".into()]).is_ok());
        assert!(validate_chain(&["=5".into()]).is_err());
        assert!(validate_chain(&["".into()]).is_err());
    }

    #[test]
    fn intercepts_must_be_known() {
        assert!(validate_intercepts(&["sleep".into(), "getStartTime".into()]).is_ok());
        let error = validate_intercepts(&["sleep".into(), "yield".into()]).unwrap_err();
        assert_eq!(error.code, "unknown_intercept");
    }
}
