//! Target index naming.
//!
//! The index a batch lands in is a pure function of the instant the flush
//! happens. Two documents buffered together can still end up in different
//! indices if the flush straddles a rotation boundary.

use crate::app::config::{ConfigError, HandlerConfig};
use crate::sender::WriteMode;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::str::FromStr;

pub const DEFAULT_DATE_FORMAT: &str = "%Y.%m.%d";
pub const DEFAULT_SEPARATOR: &str = "-";

/// How often the target index name changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl Rotation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rotation::Daily => "daily",
            Rotation::Weekly => "weekly",
            Rotation::Monthly => "monthly",
            Rotation::Yearly => "yearly",
            Rotation::Never => "never",
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rotation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Rotation::Daily),
            "weekly" => Ok(Rotation::Weekly),
            "monthly" => Ok(Rotation::Monthly),
            "yearly" => Ok(Rotation::Yearly),
            "never" => Ok(Rotation::Never),
            other => Err(ConfigError::InvalidConfig(format!(
                "Unknown index rotation '{other}'. \
                 Valid values: daily, weekly, monthly, yearly, never"
            ))),
        }
    }
}

/// Computes the index name for `reference`.
///
/// Weekly rotation rolls back to the Monday of the ISO week, monthly to the
/// first of the month and yearly to January 1st before formatting.
pub fn resolve(
    basename: &str,
    rotation: Rotation,
    reference: DateTime<Utc>,
    date_format: &str,
    separator: &str,
) -> String {
    let anchor = match rotation {
        Rotation::Never => return basename.to_string(),
        Rotation::Daily => reference,
        Rotation::Weekly => {
            let back = i64::from(reference.weekday().num_days_from_monday());
            reference - TimeDelta::days(back)
        }
        Rotation::Monthly => start_of(reference.date_naive().with_day(1), reference),
        Rotation::Yearly => start_of(NaiveDate::from_ymd_opt(reference.year(), 1, 1), reference),
    };

    let mut date = String::new();
    // Formats are validated at construction; an invalid one degrades to the bare name.
    if write!(date, "{}", anchor.format(date_format)).is_err() {
        return basename.to_string();
    }
    format!("{basename}{separator}{date}")
}

fn start_of(date: Option<NaiveDate>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    date.and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(fallback)
}

/// Rejects strftime patterns chrono cannot render.
pub fn validate_date_format(date_format: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(date_format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::InvalidConfig(format!(
            "Invalid index date format '{date_format}'"
        )));
    }
    Ok(())
}

/// Index naming policy of one handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNameResolver {
    basename: String,
    rotation: Rotation,
    date_format: String,
    separator: String,
    data_stream: bool,
}

impl IndexNameResolver {
    pub fn new(
        basename: impl Into<String>,
        rotation: Rotation,
        date_format: impl Into<String>,
        separator: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let date_format = date_format.into();
        validate_date_format(&date_format)?;
        Ok(Self {
            basename: basename.into(),
            rotation,
            date_format,
            separator: separator.into(),
            data_stream: false,
        })
    }

    pub fn from_config(config: &HandlerConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.index_name.clone(),
            config.index_rotate,
            config.index_date_format.clone(),
            config.index_name_sep.clone(),
        )?
        .data_stream(config.is_data_stream))
    }

    /// Data streams are append-only and never rotate.
    pub fn data_stream(mut self, enabled: bool) -> Self {
        self.data_stream = enabled;
        self
    }

    pub fn is_data_stream(&self) -> bool {
        self.data_stream
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn write_mode(&self) -> WriteMode {
        if self.data_stream {
            WriteMode::Create
        } else {
            WriteMode::Index
        }
    }

    pub fn resolve_at(&self, reference: DateTime<Utc>) -> String {
        let rotation = if self.data_stream {
            Rotation::Never
        } else {
            self.rotation
        };
        resolve(
            &self.basename,
            rotation,
            reference,
            &self.date_format,
            &self.separator,
        )
    }

    pub fn resolve_now(&self) -> String {
        self.resolve_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_daily_index_name() {
        let name = resolve("i", Rotation::Daily, at(2021, 11, 8, 0, 0, 0), "%Y-%m-%d", "-");
        assert_eq!(name, "i-2021-11-08");
    }

    #[test]
    fn test_weekly_index_name_rolls_back_to_monday() {
        for reference in [
            at(2021, 11, 8, 0, 0, 1),
            at(2021, 11, 10, 23, 59, 59),
            at(2021, 11, 14, 12, 0, 0),
        ] {
            assert_eq!(
                resolve("i", Rotation::Weekly, reference, DEFAULT_DATE_FORMAT, "-"),
                "i-2021.11.08"
            );
        }
        assert_eq!(
            resolve("i", Rotation::Weekly, at(2021, 11, 15, 0, 0, 0), DEFAULT_DATE_FORMAT, "-"),
            "i-2021.11.15"
        );
    }

    #[test]
    fn test_monthly_index_name() {
        let name = resolve("name", Rotation::Monthly, at(2021, 11, 8, 9, 0, 0), "%Y_%m_%d", "_");
        assert_eq!(name, "name_2021_11_01");
    }

    #[test]
    fn test_yearly_index_name() {
        let name = resolve("index", Rotation::Yearly, at(2021, 11, 8, 9, 0, 0), "%YZ", "_");
        assert_eq!(name, "index_2021Z");
    }

    #[test]
    fn test_never_index_name_ignores_format() {
        let name = resolve("index", Rotation::Never, at(2021, 11, 8, 0, 0, 0), "%Y-%m-%d", "_");
        assert_eq!(name, "index");
    }

    #[test]
    fn test_data_stream_disables_rotation() {
        let resolver = IndexNameResolver::new("logs-app", Rotation::Daily, DEFAULT_DATE_FORMAT, "-")
            .unwrap()
            .data_stream(true);
        assert_eq!(resolver.resolve_at(at(2021, 11, 8, 0, 0, 0)), "logs-app");
        assert_eq!(resolver.write_mode(), WriteMode::Create);
    }

    #[test]
    fn test_invalid_date_format_rejected() {
        assert!(validate_date_format("%Y.%m.%d").is_ok());
        assert!(validate_date_format("%Y.%!").is_err());
        assert!(IndexNameResolver::new("i", Rotation::Daily, "%Q%", "-").is_err());
    }

    #[test]
    fn test_rotation_parsing() {
        assert_eq!("WEEKLY".parse::<Rotation>().unwrap(), Rotation::Weekly);
        assert_eq!(" never ".parse::<Rotation>().unwrap(), Rotation::Never);
        assert!("hourly".parse::<Rotation>().is_err());
    }
}
