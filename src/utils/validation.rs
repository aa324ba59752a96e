use crate::utils::error::{EtlError, Result};
use std::collections::HashSet;
use std::path::Path;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl ToString, reason: impl Into<String>) -> EtlError {
    EtlError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// 只接受 http / https
pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    let url = Url::parse(url_str)
        .map_err(|e| invalid(field_name, url_str, format!("Invalid URL format: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(invalid(
            field_name,
            url_str,
            format!("Unsupported URL scheme: {}", scheme),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        Err(invalid(field_name, path, "Path cannot be empty"))
    } else if path.contains('\0') {
        Err(invalid(field_name, path, "Path contains null bytes"))
    } else {
        Ok(())
    }
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

/// 副檔名比對不分大小寫（`Postcodes.XLSX` 視為 xlsx）
pub fn validate_file_extensions(
    field_name: &str,
    files: &[String],
    allowed_extensions: &[&str],
) -> Result<()> {
    let allowed: HashSet<&str> = allowed_extensions.iter().copied().collect();

    for file in files {
        let extension = Path::new(file)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| invalid(field_name, file, "File has no extension or invalid filename"))?;

        if !allowed.contains(extension.as_str()) {
            return Err(invalid(
                field_name,
                file,
                format!(
                    "Unsupported file extension: {}. Allowed extensions: {}",
                    extension,
                    allowed_extensions.join(", ")
                ),
            ));
        }
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(field_name, value, "Value cannot be empty or whitespace-only"));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("geocoding.endpoint", "https://maps.googleapis.com").is_ok());
        assert!(validate_url("geocoding.endpoint", "http://127.0.0.1:8080/geocode").is_ok());
        assert!(validate_url("geocoding.endpoint", "").is_err());
        assert!(validate_url("geocoding.endpoint", "invalid-url").is_err());
        assert!(validate_url("geocoding.endpoint", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("concurrent_requests", 5, 1).is_ok());
        assert!(validate_positive_number("concurrent_requests", 0, 1).is_err());
    }

    #[test]
    fn test_validate_file_extensions() {
        let files = vec!["postcodes.csv".to_string(), "Postcodes.XLSX".to_string()];
        assert!(validate_file_extensions("lookup_files", &files, &["csv", "tsv", "xlsx"]).is_ok());

        let invalid_files = vec!["postcodes.txt".to_string()];
        assert!(
            validate_file_extensions("lookup_files", &invalid_files, &["csv", "tsv", "xlsx"])
                .is_err()
        );

        let no_extension = vec!["postcodes".to_string()];
        assert!(validate_file_extensions("lookup_files", &no_extension, &["csv"]).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("transform.reference_year", 2024, 1900, 2200).is_ok());
        assert!(validate_range("transform.century_pivot", 120, 0, 99).is_err());
    }

    #[test]
    fn test_validate_non_empty_string() {
        assert!(validate_non_empty_string("load.sheet_name", "CleanedData").is_ok());
        assert!(validate_non_empty_string("load.sheet_name", "   ").is_err());
    }
}
