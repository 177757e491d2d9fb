use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Zone used for "today" and for calendar windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalZone {
    #[default]
    System,
    Named(Tz),
}

impl LocalZone {
    pub fn parse(name: Option<&str>) -> Result<Self, String> {
        match name.map(str::trim).filter(|value| !value.is_empty()) {
            None => Ok(Self::System),
            Some(raw) => raw
                .parse::<Tz>()
                .map(Self::Named)
                .map_err(|error| format!("unknown timezone '{raw}': {error}")),
        }
    }

    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::System => instant.with_timezone(&Local).date_naive(),
            Self::Named(tz) => instant.with_timezone(tz).date_naive(),
        }
    }

    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        match self {
            Self::System => midnight_in(&Local, date),
            Self::Named(tz) => midnight_in(tz, date),
        }
    }
}

fn midnight_in<Z: TimeZone>(zone: &Z, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    zone.from_local_datetime(&naive)
        .earliest()
        // Midnight can fall inside a DST gap.
        .or_else(|| zone.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}
