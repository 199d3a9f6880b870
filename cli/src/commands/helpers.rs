use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::path::Path;

use fitpulse_core::settings::format_day;

/// Resolve a date argument (YYYY-MM-DD or today/yesterday/tomorrow) against `today`.
pub(crate) fn parse_date(date_str: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    match date_str {
        None | Some("today") => Ok(today),
        Some("yesterday") => Ok(today - Duration::days(1)),
        Some("tomorrow") => Ok(today + Duration::days(1)),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| {
            format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
        }),
    }
}

/// Same as [`parse_date`], formatted for the service layer.
pub(crate) fn day_arg(date_str: Option<&str>, today: NaiveDate) -> Result<String> {
    Ok(format_day(parse_date(date_str, today)?))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Read an image file and guess its content type from the extension.
pub(crate) fn read_image(path: &Path) -> Result<(Vec<u8>, &'static str)> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let content_type = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "gif" => "image/gif",
        _ => bail!("Unsupported image '{}'. Use jpg, png, webp, heic or gif", path.display()),
    };
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok((bytes, content_type))
}

/// Ten-cell text bar for a 0-100 percentage.
pub(crate) fn bar(percent: u8) -> String {
    let filled = usize::from(percent.min(100)) / 10;
    format!("{}{}", "#".repeat(filled), ".".repeat(10 - filled))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max.saturating_sub(3)).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    #[test]
    fn test_parse_date_keywords() {
        assert_eq!(parse_date(None, today()).unwrap(), today());
        assert_eq!(parse_date(Some("today"), today()).unwrap(), today());
        assert_eq!(
            parse_date(Some("yesterday"), today()).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 9).unwrap()
        );
        assert_eq!(
            parse_date(Some("tomorrow"), today()).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 11).unwrap()
        );
    }

    #[test]
    fn test_parse_date_iso_and_invalid() {
        assert_eq!(day_arg(Some("2024-01-15"), today()).unwrap(), "2024-01-15");
        assert!(parse_date(Some("nope"), today()).is_err());
    }

    #[test]
    fn test_read_image_rejects_unknown_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, b"hi").unwrap();
        assert!(read_image(&path).is_err());

        let png = tmp.path().join("plate.PNG");
        std::fs::write(&png, [1u8, 2]).unwrap();
        let (bytes, ct) = read_image(&png).unwrap();
        assert_eq!(bytes, vec![1, 2]);
        assert_eq!(ct, "image/png");
    }

    #[test]
    fn test_bar() {
        assert_eq!(bar(0), "..........");
        assert_eq!(bar(56), "#####.....");
        assert_eq!(bar(100), "##########");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
    }

    #[test]
    fn test_truncate_tiny_width() {
        assert_eq!(truncate("hello", 2), "...");
        assert_eq!(truncate("hello", 0), "...");
        assert_eq!(truncate("", 0), "");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(5.0), 5.0);
    }
}
