use anyhow::anyhow;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    /// The one fixed zone all civil dates and times are interpreted in.
    /// Stored instants stay reproducible no matter where the process runs.
    pub time_zone: Tz,
    /// Minutes-before-start offsets at which reminders fire.
    pub reminder_offsets: Vec<i64>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/studyplanner".to_string());

        let time_zone_name = env::var("APP_TIMEZONE").unwrap_or_else(|_| "Asia/Tokyo".to_string());
        let time_zone: Tz = time_zone_name
            .parse()
            .map_err(|_| anyhow!("Invalid APP_TIMEZONE value: {}", time_zone_name))?;

        let reminder_offsets =
            parse_offsets(&env::var("REMINDER_OFFSETS").unwrap_or_else(|_| "30,5".to_string()))?;

        Ok(Config {
            database_url,
            time_zone,
            reminder_offsets,
        })
    }
}

fn parse_offsets(raw: &str) -> anyhow::Result<Vec<i64>> {
    let mut offsets = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let minutes: i64 = part
            .parse()
            .map_err(|_| anyhow!("Invalid REMINDER_OFFSETS entry: {}", part))?;
        if minutes <= 0 {
            return Err(anyhow!("Reminder offsets must be positive: {}", part));
        }
        offsets.push(minutes);
    }
    if offsets.is_empty() {
        return Err(anyhow!("REMINDER_OFFSETS must contain at least one offset"));
    }
    offsets.sort_unstable_by(|a, b| b.cmp(a));
    offsets.dedup();
    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_offsets_default_set() {
        assert_eq!(parse_offsets("30,5").unwrap(), vec![30, 5]);
    }

    #[test]
    fn parse_offsets_sorts_descending_and_dedups() {
        assert_eq!(parse_offsets("5, 30, 5, 60").unwrap(), vec![60, 30, 5]);
    }

    #[test]
    fn parse_offsets_rejects_garbage() {
        assert!(parse_offsets("30,abc").is_err());
        assert!(parse_offsets("0").is_err());
        assert!(parse_offsets("-5").is_err());
        assert!(parse_offsets("").is_err());
    }
}
