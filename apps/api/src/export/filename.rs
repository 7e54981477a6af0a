use chrono::{NaiveDate, Utc};

const FALLBACK_STEM: &str = "resume";

/// Builds `"<clean subject> <YYYY-MM-DD>.pdf"`.
///
/// Anything other than ASCII letters, digits and whitespace becomes a space, whitespace
/// runs collapse to one space, and the result is trimmed. An empty result falls back to
/// `resume`.
pub fn generate_filename(subject_name: Option<&str>, date: NaiveDate) -> String {
    let replaced: String = subject_name
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    let stem = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem.as_str() };

    format!("{stem} {}.pdf", date.format("%Y-%m-%d"))
}

/// [`generate_filename`] with today's UTC date.
pub fn filename_for_today(subject_name: Option<&str>) -> String {
    generate_filename(subject_name, Utc::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn march_5() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    #[test]
    fn test_strips_punctuation_and_collapses_spaces() {
        assert_eq!(
            generate_filename(Some("Sarah Johnson!!"), march_5()),
            "Sarah Johnson 2024-03-05.pdf"
        );
        assert_eq!(
            generate_filename(Some("  Jean-Luc   O'Neil "), march_5()),
            "Jean Luc O Neil 2024-03-05.pdf"
        );
    }

    #[test]
    fn test_empty_subject_falls_back() {
        assert_eq!(generate_filename(None, march_5()), "resume 2024-03-05.pdf");
        assert_eq!(generate_filename(Some("!!!"), march_5()), "resume 2024-03-05.pdf");
        assert_eq!(generate_filename(Some("   "), march_5()), "resume 2024-03-05.pdf");
    }

    #[test]
    fn test_output_has_no_path_characters() {
        let name = generate_filename(Some("../../etc/passwd\\x"), march_5());
        assert!(!name.contains('/') && !name.contains('\\'));
        assert!(name.ends_with(" 2024-03-05.pdf"));
    }

    #[test]
    fn test_today_uses_iso_date() {
        let name = filename_for_today(Some("Ada"));
        let date = name
            .strip_prefix("Ada ")
            .and_then(|rest| rest.strip_suffix(".pdf"))
            .unwrap();
        assert!(NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok());
    }
}
