use crate::utils::error::{Result, SparseError};
use std::path::Path;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field: &str, value: impl ToString, reason: impl Into<String>) -> SparseError {
    SparseError::InvalidConfigValueError {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_path(field: &str, path: &str) -> Result<()> {
    match path {
        "" => Err(invalid(field, path, "Path cannot be empty")),
        _ if path.contains('\0') => Err(invalid(field, path, "Path contains null bytes")),
        _ => Ok(()),
    }
}

pub fn validate_at_least(field: &str, value: usize, min: usize) -> Result<()> {
    if value < min {
        return Err(invalid(field, value, format!("Value must be at least {}", min)));
    }
    Ok(())
}

/// Checks the extension of `path` against `allowed`, returning the match.
pub fn validate_extension<'a>(field: &str, path: &'a Path, allowed: &[&str]) -> Result<&'a str> {
    let shown = path.display();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| invalid(field, &shown, "File has no extension"))?;
    if !allowed.contains(&extension) {
        return Err(invalid(
            field,
            &shown,
            format!("Expected one of: {}", allowed.join(", ")),
        ));
    }
    Ok(extension)
}

pub fn validate_required_field<'a, T>(field: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| SparseError::MissingConfigError {
        field: field.to_string(),
    })
}

pub fn validate_non_empty_string(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(field, value, "Value cannot be empty or whitespace-only"));
    }
    Ok(())
}

pub fn validate_one_of(field: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if !allowed.contains(&value) {
        return Err(invalid(field, value, format!("Valid values: {}", allowed.join(", "))));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("virtualenv_root", "/data/virtualenvs").is_ok());
        assert!(validate_path("virtualenv_root", "").is_err());
        assert!(validate_path("virtualenv_root", "bad\0path").is_err());
    }

    #[test]
    fn test_validate_at_least() {
        assert!(validate_at_least("parallelism", 2, 1).is_ok());
        assert!(validate_at_least("parallelism", 0, 1).is_err());
    }

    #[test]
    fn test_validate_extension() {
        let allowed = &["json", "toml"];
        assert_eq!(
            validate_extension("config", Path::new("conf/config.toml"), allowed).unwrap(),
            "toml"
        );
        assert!(validate_extension("config", Path::new("config.yaml"), allowed).is_err());
        assert!(validate_extension("config", Path::new("config"), allowed).is_err());
    }

    #[test]
    fn test_validate_one_of() {
        assert!(validate_one_of("log.level", "debug", &["debug", "info"]).is_ok());
        assert!(validate_one_of("log.level", "loud", &["debug", "info"]).is_err());
    }

    #[test]
    fn test_validate_required_field() {
        let present = Some("nimbus.example.com".to_string());
        let missing: Option<String> = None;
        assert_eq!(
            validate_required_field("nimbus", &present).unwrap(),
            "nimbus.example.com"
        );
        assert!(matches!(
            validate_required_field("nimbus", &missing),
            Err(SparseError::MissingConfigError { .. })
        ));
    }
}
