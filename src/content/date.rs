//! Publication date parsing and formatting

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Locale used for month names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    PtBr,
    En,
}

impl Locale {
    /// Pick a locale from a language tag; unknown tags fall back to English
    pub fn from_language(tag: &str) -> Self {
        match tag.to_ascii_lowercase().replace('_', "-").as_str() {
            "pt-br" | "pt" => Locale::PtBr,
            _ => Locale::En,
        }
    }

    /// Abbreviated month name, `month` in 1..=12
    pub fn month_abbrev(self, month: u32) -> &'static str {
        const PT_BR: [&str; 12] = [
            "jan", "fev", "mar", "abr", "mai", "jun", "jul", "ago", "set", "out", "nov", "dez",
        ];
        const EN: [&str; 12] = [
            "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
        ];
        let index = (month.clamp(1, 12) - 1) as usize;
        match self {
            Locale::PtBr => PT_BR[index],
            Locale::En => EN[index],
        }
    }
}

/// Parse a CMS timestamp
///
/// The CMS emits `2021-03-15T19:25:28+0000`; RFC 3339 and bare dates are
/// accepted as well. Anything else yields `None`.
pub fn parse_publication_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date);
    }

    for format in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(date) = DateTime::parse_from_str(raw, format) {
            return Some(date);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt).fixed_offset())
}

/// Formats publication dates as `dd MMM yyyy` in a locale and timezone
#[derive(Debug, Clone, Copy)]
pub struct DateFormatter {
    locale: Locale,
    timezone: Tz,
}

impl DateFormatter {
    pub fn new(locale: Locale, timezone: Tz) -> Self {
        Self { locale, timezone }
    }

    /// Format a date, e.g. `15 mar 2021`; `None` formats as the empty string
    pub fn format(&self, date: Option<&DateTime<FixedOffset>>) -> String {
        let Some(date) = date else {
            return String::new();
        };
        let local = date.with_timezone(&self.timezone);
        format!(
            "{:02} {} {:04}",
            local.day(),
            self.locale.month_abbrev(local.month()),
            local.year()
        )
    }

    /// Parse and format a raw CMS timestamp
    pub fn format_raw(&self, raw: Option<&str>) -> String {
        self.format(raw.and_then(parse_publication_date).as_ref())
    }
}

impl Default for DateFormatter {
    fn default() -> Self {
        Self::new(Locale::PtBr, Tz::UTC)
    }
}
