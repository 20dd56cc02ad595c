//! Command-line arguments.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use incident_sources::DateRange;

const DEFAULT_DAYS: u32 = 7;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "rca-backend",
    version,
    about = "Builds an HTML root-cause-analysis report from tracker tickets and their chat threads"
)]
pub struct Args {
    /// Tickets created in the last N days (default 7).
    #[arg(long, value_name = "N", conflicts_with_all = ["since", "until"])]
    pub days: Option<u32>,

    /// First creation day, inclusive (YYYY-MM-DD).
    #[arg(long, value_name = "DATE", requires = "until")]
    pub since: Option<NaiveDate>,

    /// Last creation day, inclusive (YYYY-MM-DD).
    #[arg(long, value_name = "DATE", requires = "since")]
    pub until: Option<NaiveDate>,

    /// Analyze these ticket ids instead of scanning the folder.
    #[arg(long = "ticket", value_name = "ID")]
    pub tickets: Vec<String>,

    /// Tickets analyzed concurrently.
    #[arg(long, value_name = "N", env = "RCA_WORKERS", default_value_t = 1,
          value_parser = clap::value_parser!(u16).range(1..=64))]
    pub workers: u16,

    /// Directory the report is written to.
    #[arg(long, value_name = "DIR", env = "RCA_OUT_DIR", default_value = ".")]
    pub out: PathBuf,

    /// Debug logs for the workspace crates.
    #[arg(long)]
    pub debug: bool,

    /// Skip model calls; every analysis is reported as unavailable.
    #[arg(long)]
    pub no_ai: bool,
}

impl Args {
    /// Creation window to scan.
    pub fn date_range(&self, now: DateTime<Utc>) -> DateRange {
        match (self.since, self.until) {
            (Some(since), Some(until)) => DateRange::from_dates(since, until),
            _ => DateRange::last_days(self.days.unwrap_or(DEFAULT_DAYS), now),
        }
    }

    /// `--since` must not come after `--until`.
    pub fn validate(&self) -> Result<(), String> {
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(format!("--since {since} is after --until {until}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn defaults_to_last_week() {
        let args = Args::try_parse_from(["rca-backend"]).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 8, 12, 0, 0).unwrap();
        let range = args.date_range(now);
        assert_eq!(range.end, now);
        assert_eq!((range.end - range.start).num_days(), 7);
        assert_eq!(args.workers, 1);
        assert!(!args.no_ai);
    }

    #[test]
    fn explicit_dates_and_tickets() {
        let args = Args::try_parse_from([
            "rca-backend",
            "--since",
            "2024-05-01",
            "--until",
            "2024-05-07",
            "--ticket",
            "abc",
            "--ticket",
            "def",
            "--workers",
            "4",
        ])
        .unwrap();
        assert_eq!(args.tickets, vec!["abc", "def"]);
        assert_eq!(args.workers, 4);
        let range = args.date_range(Utc::now());
        assert_eq!(range.label(), "2024-05-01 to 2024-05-07");
        assert!(args.validate().is_ok());
    }

    #[test]
    fn conflicting_or_bad_arguments_are_rejected() {
        assert!(Args::try_parse_from(["rca-backend", "--days", "3", "--since", "2024-05-01"]).is_err());
        assert!(Args::try_parse_from(["rca-backend", "--since", "2024-05-01"]).is_err());
        assert!(Args::try_parse_from(["rca-backend", "--workers", "0"]).is_err());

        let reversed = Args::try_parse_from([
            "rca-backend",
            "--since",
            "2024-05-09",
            "--until",
            "2024-05-01",
        ])
        .unwrap();
        assert!(reversed.validate().is_err());
    }
}
