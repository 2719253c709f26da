//! Timestamp encoding.
//!
//! 永続化される時刻はすべて秒精度の UTC テキスト（`YYYY-MM-DDTHH:MM:SSZ`）です。
//! 固定長なので辞書順の比較がそのまま時刻の比較になり、due クエリはこの性質に依存します。

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};

/// `2006-01-02T15:04:05Z` style, whole seconds, always UTC.
pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn format(at: &DateTime<Utc>) -> String {
    at.format(FORMAT).to_string()
}

pub fn parse(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, FORMAT).map(|naive| naive.and_utc())
}

/// Years 0000..=9999 keep the fixed width, and with it the text ordering.
pub fn is_encodable(at: &DateTime<Utc>) -> bool {
    (0..=9999).contains(&at.year())
}

/// Drop sub-second precision so in-memory comparisons match the stored text.
pub fn truncate(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_nanosecond(0).unwrap_or(at)
}

/// `#[serde(with = "timestamp::text")]`
pub mod text {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "timestamp::text_opt")]`
pub mod text_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        at: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match at {
            Some(at) => serializer.serialize_some(&super::format(at)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|text| super::parse(&text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_whole_seconds_in_utc() {
        let at = Utc.with_ymd_and_hms(2018, 9, 2, 0, 2, 3).unwrap()
            + chrono::Duration::milliseconds(750);
        assert_eq!(format(&at), "2018-09-02T00:02:03Z");
    }

    #[test]
    fn parse_accepts_formatted_text() {
        let parsed = parse("2018-09-04T00:02:03Z").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2018, 9, 4, 0, 2, 3).unwrap());
    }

    #[test]
    fn parse_rejects_other_layouts() {
        assert!(parse("2018-09-04 00:02:03").is_err());
        assert!(parse("2018-09-04T00:02:03+00:00").is_err());
    }

    #[test]
    fn text_order_matches_time_order() {
        let earlier = Utc.with_ymd_and_hms(2019, 12, 31, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert!(format(&earlier) < format(&later));
    }

    #[test]
    fn only_four_digit_years_are_encodable() {
        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        assert!(is_encodable(&last));
        assert!(is_encodable(&Utc.with_ymd_and_hms(0, 1, 1, 0, 0, 0).unwrap()));
        assert!(!is_encodable(&(last + chrono::Duration::seconds(1))));
        assert!(!is_encodable(&Utc.with_ymd_and_hms(-1, 12, 31, 0, 0, 0).unwrap()));
        assert!(format(&Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()) < format(&last));
    }

    #[test]
    fn truncate_drops_fraction() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(truncate(at + chrono::Duration::milliseconds(999)), at);
    }
}
