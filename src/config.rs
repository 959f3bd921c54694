use std::env;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveTime, Weekday};
use dotenvy::dotenv;

use crate::model::leave_request::LeaveType;
use crate::service::policy::{LeavePolicy, OfficePolicy};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvidenceBackend {
    /// Files written under `dir`, served from `public_url`.
    Local { dir: String, public_url: String },
    /// Multipart upload to an object-storage endpoint.
    Http {
        endpoint: String,
        bucket: String,
        api_key: String,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: String,
    /// `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub api_prefix: String,
    pub log_level: tracing::Level,

    // Rate limiting
    pub rate_protected_per_min: u32,
    pub rate_attendance_per_min: u32,

    pub office: OfficePolicy,
    pub leave: LeavePolicy,

    pub evidence: EvidenceBackend,
    pub evidence_max_bytes: usize,

    /// 0 disables the periodic auto-stop sweep.
    pub auto_stop_sweep_secs: u64,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key}: cannot parse '{raw}': {e}")),
        Err(_) => Ok(default),
    }
}

fn time_of_day(key: &str, default: &str) -> Result<NaiveTime> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .with_context(|| format!("{key}: expected HH:MM, got '{raw}'"))
}

/// Parses a comma separated weekday list such as `Sat,Sun`.
pub fn parse_weekdays(raw: &str) -> Result<Vec<Weekday>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Weekday>()
                .map_err(|_| anyhow!("unknown weekday '{s}'"))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let office = OfficePolicy::new(
            time_of_day("OFFICE_START", "09:30")?,
            time_of_day("OFFICE_END", "18:30")?,
            parsed("MIN_PRESENT_MINUTES", 270)?,
            parse_weekdays(&env::var("WEEKEND_DAYS").unwrap_or_else(|_| "Sat,Sun".to_string()))
                .context("WEEKEND_DAYS")?,
        )?;

        let leave = LeavePolicy::default()
            .with_allocation(LeaveType::Annual, parsed("LEAVE_ALLOCATION_ANNUAL", 15.0)?)
            .with_allocation(LeaveType::Casual, parsed("LEAVE_ALLOCATION_CASUAL", 12.0)?)
            .with_allocation(LeaveType::Sick, parsed("LEAVE_ALLOCATION_SICK", 14.0)?);

        let evidence = match env::var("EVIDENCE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .as_str()
        {
            "local" => EvidenceBackend::Local {
                dir: env::var("EVIDENCE_DIR").unwrap_or_else(|_| "evidence".to_string()),
                public_url: env::var("EVIDENCE_PUBLIC_URL")
                    .unwrap_or_else(|_| "/evidence".to_string()),
            },
            "http" => EvidenceBackend::Http {
                endpoint: required("EVIDENCE_ENDPOINT")?,
                bucket: required("EVIDENCE_BUCKET")?,
                api_key: required("EVIDENCE_API_KEY")?,
            },
            other => bail!("EVIDENCE_BACKEND must be 'local' or 'http', got '{other}'"),
        };

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            jwt_secret: required("JWT_SECRET")?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_level: parsed("LOG_LEVEL", tracing::Level::DEBUG)?,

            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", 1000)?,
            rate_attendance_per_min: parsed("RATE_ATTENDANCE_PER_MIN", 10)?,

            office,
            leave,

            evidence,
            evidence_max_bytes: parsed("EVIDENCE_MAX_BYTES", 5 * 1024 * 1024)?,

            auto_stop_sweep_secs: parsed("AUTO_STOP_SWEEP_SECS", 0)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekdays_parse_short_and_long_names() {
        assert_eq!(
            parse_weekdays("Sat, sunday").unwrap(),
            vec![Weekday::Sat, Weekday::Sun]
        );
        assert_eq!(parse_weekdays("Fri,Sat,").unwrap().len(), 2);
        assert!(parse_weekdays("Sat,Caturday").is_err());
    }
}
