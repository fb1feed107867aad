//! CF-style time decoding for non-Gregorian model calendars
//!
//! Model output stores time as a numeric offset from a base date, in a
//! calendar that is often not the civil Gregorian one (`noleap`, `360_day`).
//! Offsets are decoded into [`CivilTime`] values, which carry plain
//! year/month/day components so dates that do not exist in the Gregorian
//! calendar, or predate the range of a standard formatter, still format.
//!
//! All calendars share one day numbering: Gregorian and Julian dates use the
//! Julian Day Number, the fixed-length calendars count days from year 0.

use crate::errors::{ConvertError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

const MS_PER_DAY: i64 = 86_400_000;

/// Julian Day Number of 0001-01-01 in the proleptic Gregorian calendar, minus one.
const CE_TO_JDN: i64 = 1_721_425;

/// First Gregorian day (1582-10-15) of the mixed `standard` calendar.
const GREGORIAN_CUTOVER_JDN: i64 = 2_299_161;

const NOLEAP_CUMULATIVE: [i64; 13] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 365];
const ALL_LEAP_CUMULATIVE: [i64; 13] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335, 366];

/// Calendar systems understood by the time decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Calendar {
    /// Mixed Julian/Gregorian, switching on 1582-10-15
    Standard,
    ProlepticGregorian,
    Julian,
    /// Every year has 365 days
    NoLeap,
    /// Every year has 366 days
    AllLeap,
    /// Twelve months of 30 days
    Day360,
}

impl FromStr for Calendar {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" | "gregorian" => Ok(Calendar::Standard),
            "proleptic_gregorian" => Ok(Calendar::ProlepticGregorian),
            "julian" => Ok(Calendar::Julian),
            "noleap" | "no_leap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            other => Err(format!("Unknown calendar '{}'", other)),
        }
    }
}

impl TryFrom<String> for Calendar {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Calendar::Standard => "standard",
            Calendar::ProlepticGregorian => "proleptic_gregorian",
            Calendar::Julian => "julian",
            Calendar::NoLeap => "noleap",
            Calendar::AllLeap => "all_leap",
            Calendar::Day360 => "360_day",
        };
        write!(f, "{}", name)
    }
}

impl Calendar {
    pub fn is_leap_year(&self, year: i32) -> bool {
        match self {
            Calendar::NoLeap | Calendar::Day360 => false,
            Calendar::AllLeap => true,
            Calendar::Julian => year.rem_euclid(4) == 0,
            Calendar::ProlepticGregorian => gregorian_leap(year),
            Calendar::Standard => {
                if year > 1582 {
                    gregorian_leap(year)
                } else {
                    year.rem_euclid(4) == 0
                }
            }
        }
    }

    pub fn days_in_month(&self, year: i32, month: u32) -> u32 {
        match (self, month) {
            (Calendar::Day360, _) => 30,
            (_, 1 | 3 | 5 | 7 | 8 | 10 | 12) => 31,
            (_, 4 | 6 | 9 | 11) => 30,
            (_, 2) if self.is_leap_year(year) => 29,
            (_, 2) => 28,
            _ => 0,
        }
    }

    /// Day number of a date in this calendar's numbering.
    fn day_number(&self, year: i32, month: u32, day: u32) -> Result<i64> {
        if month == 0 || month > 12 || day == 0 || day > self.days_in_month(year, month) {
            return Err(ConvertError::Config(format!(
                "{:04}-{:02}-{:02} does not exist in the {} calendar",
                year, month, day, self
            )));
        }
        let (y, m, d) = (i64::from(year), month as usize, i64::from(day));
        let number = match self {
            Calendar::NoLeap => y * 365 + NOLEAP_CUMULATIVE[m - 1] + d - 1,
            Calendar::AllLeap => y * 366 + ALL_LEAP_CUMULATIVE[m - 1] + d - 1,
            Calendar::Day360 => y * 360 + (m as i64 - 1) * 30 + d - 1,
            Calendar::Julian => julian_to_jdn(y, m as i64, d),
            Calendar::ProlepticGregorian => gregorian_to_jdn(year, month, day)?,
            Calendar::Standard => {
                if (year, month, day) >= (1582, 10, 15) {
                    gregorian_to_jdn(year, month, day)?
                } else if (year, month, day) > (1582, 10, 4) {
                    return Err(ConvertError::Config(format!(
                        "1582-10-{:02} falls in the Julian/Gregorian gap",
                        day
                    )));
                } else {
                    julian_to_jdn(y, m as i64, d)
                }
            }
        };
        Ok(number)
    }

    /// Inverse of [`Calendar::day_number`].
    fn civil_date(&self, number: i64) -> Result<(i32, u32, u32)> {
        let (year, month, day) = match self {
            Calendar::NoLeap => fixed_year_date(number, &NOLEAP_CUMULATIVE),
            Calendar::AllLeap => fixed_year_date(number, &ALL_LEAP_CUMULATIVE),
            Calendar::Day360 => {
                let doy = number.rem_euclid(360);
                (number.div_euclid(360), doy / 30 + 1, doy % 30 + 1)
            }
            Calendar::Julian => jdn_to_julian(number),
            Calendar::ProlepticGregorian => return jdn_to_gregorian(number),
            Calendar::Standard => {
                if number >= GREGORIAN_CUTOVER_JDN {
                    return jdn_to_gregorian(number);
                }
                jdn_to_julian(number)
            }
        };
        let year = i32::try_from(year)
            .map_err(|_| ConvertError::SourceRead(format!("Year {} is out of range", year)))?;
        Ok((year, month as u32, day as u32))
    }
}

fn gregorian_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn gregorian_to_jdn(year: i32, month: u32, day: u32) -> Result<i64> {
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        ConvertError::Config(format!("Invalid Gregorian date {}-{}-{}", year, month, day))
    })?;
    Ok(i64::from(date.num_days_from_ce()) + CE_TO_JDN)
}

fn jdn_to_gregorian(jdn: i64) -> Result<(i32, u32, u32)> {
    let date = i32::try_from(jdn - CE_TO_JDN)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| {
            ConvertError::SourceRead(format!("Day number {} is outside the Gregorian range", jdn))
        })?;
    Ok((date.year(), date.month(), date.day()))
}

fn julian_to_jdn(year: i64, month: i64, day: i64) -> i64 {
    let a = (14 - month).div_euclid(12);
    let y = year + 4800 - a;
    let m = month + 12 * a - 3;
    day + (153 * m + 2).div_euclid(5) + 365 * y + y.div_euclid(4) - 32083
}

fn jdn_to_julian(jdn: i64) -> (i64, i64, i64) {
    let c = jdn + 32082;
    let d = (4 * c + 3).div_euclid(1461);
    let e = c - (1461 * d).div_euclid(4);
    let m = (5 * e + 2).div_euclid(153);
    let day = e - (153 * m + 2).div_euclid(5) + 1;
    let month = m + 3 - 12 * m.div_euclid(10);
    let year = d - 4800 + m.div_euclid(10);
    (year, month, day)
}

fn fixed_year_date(number: i64, cumulative: &[i64; 13]) -> (i64, i64, i64) {
    let year_len = cumulative[12];
    let year = number.div_euclid(year_len);
    let doy = number.rem_euclid(year_len);
    let month = cumulative.iter().rposition(|&c| c <= doy).unwrap_or(0);
    (year, month as i64 + 1, doy - cumulative[month] + 1)
}

/// Unit of the numeric time axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeUnit {
    fn millis(&self) -> f64 {
        match self {
            TimeUnit::Days => 86_400_000.0,
            TimeUnit::Hours => 3_600_000.0,
            TimeUnit::Minutes => 60_000.0,
            TimeUnit::Seconds => 1_000.0,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" | "days" | "d" => Ok(TimeUnit::Days),
            "hour" | "hours" | "h" | "hr" => Ok(TimeUnit::Hours),
            "minute" | "minutes" | "min" => Ok(TimeUnit::Minutes),
            "second" | "seconds" | "s" => Ok(TimeUnit::Seconds),
            other => Err(format!("Unknown time unit '{}'", other)),
        }
    }
}

impl TryFrom<String> for TimeUnit {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// Calendar-agnostic timestamp with millisecond resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CivilTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millisecond: u32,
}

impl CivilTime {
    pub fn new(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            millisecond: 0,
        }
    }

    /// Parse `YYYY-MM-DD[( |T)HH:MM:SS]`.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_end_matches('Z');
        let parsed = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
            .or_else(|_| {
                NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                    .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
            })
            .map_err(|e| ConvertError::Config(format!("Invalid base date '{}': {}", s, e)))?;
        Ok(Self::new(
            parsed.year(),
            parsed.month(),
            parsed.day(),
            parsed.hour(),
            parsed.minute(),
            parsed.second(),
        ))
    }

    /// Reference time in the `YYYY-MM-DDTHH:MM:SS.mmmZ` form the visualization expects.
    pub fn ref_time(&self) -> String {
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.millisecond
        )
    }

    /// `YYYYMMDDHHMMSS`, plus `mmm` when the milliseconds are non-zero. Used to tell
    /// time steps apart in file names.
    pub fn compact(&self) -> String {
        let stamp = format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        );
        if self.millisecond == 0 {
            stamp
        } else {
            format!("{}{:03}", stamp, self.millisecond)
        }
    }

    fn millis_of_day(&self) -> i64 {
        ((i64::from(self.hour) * 60 + i64::from(self.minute)) * 60 + i64::from(self.second)) * 1000
            + i64::from(self.millisecond)
    }
}

impl fmt::Display for CivilTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Decodes numeric time-axis values into civil timestamps.
#[derive(Debug, Clone)]
pub struct TimeDecoder {
    calendar: Calendar,
    unit: TimeUnit,
    shift: f64,
    base_millis: i64,
}

impl TimeDecoder {
    /// `shift` is added to every raw value (in `unit`s) before decoding.
    pub fn new(calendar: Calendar, unit: TimeUnit, base: CivilTime, shift: f64) -> Result<Self> {
        let day = calendar.day_number(base.year, base.month, base.day)?;
        Ok(Self {
            calendar,
            unit,
            shift,
            base_millis: day * MS_PER_DAY + base.millis_of_day(),
        })
    }

    pub fn decode(&self, value: f64) -> Result<CivilTime> {
        let offset = (value + self.shift) * self.unit.millis();
        if !offset.is_finite() || offset.abs() > 1e17 {
            return Err(ConvertError::SourceRead(format!(
                "Time value {} cannot be decoded",
                value
            )));
        }
        let total = self.base_millis + offset.round() as i64;
        let (year, month, day) = self.calendar.civil_date(total.div_euclid(MS_PER_DAY))?;
        let ms = total.rem_euclid(MS_PER_DAY);
        Ok(CivilTime {
            year,
            month,
            day,
            hour: (ms / 3_600_000) as u32,
            minute: (ms / 60_000 % 60) as u32,
            second: (ms / 1000 % 60) as u32,
            millisecond: (ms % 1000) as u32,
        })
    }

    pub fn decode_all(&self, values: &[f64]) -> Result<Vec<CivilTime>> {
        values.iter().map(|&v| self.decode(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder(calendar: Calendar, unit: TimeUnit, base: &str) -> TimeDecoder {
        TimeDecoder::new(calendar, unit, CivilTime::parse(base).unwrap(), 0.0).unwrap()
    }

    #[test]
    fn test_gregorian_days() {
        let d = decoder(Calendar::Standard, TimeUnit::Days, "1990-01-01 00:00:00");
        assert_eq!(d.decode(0.0).unwrap(), CivilTime::new(1990, 1, 1, 0, 0, 0));
        // 1990-01-01 + 11323 days
        assert_eq!(d.decode(11323.0).unwrap(), CivilTime::new(2021, 1, 1, 0, 0, 0));
        assert_eq!(d.decode(0.5).unwrap(), CivilTime::new(1990, 1, 1, 12, 0, 0));
        assert_eq!(d.decode(-1.0).unwrap(), CivilTime::new(1989, 12, 31, 0, 0, 0));
    }

    #[test]
    fn test_noleap_skips_february_29() {
        let d = decoder(Calendar::NoLeap, TimeUnit::Days, "2020-02-28");
        assert_eq!(d.decode(1.0).unwrap(), CivilTime::new(2020, 3, 1, 0, 0, 0));
        assert_eq!(d.decode(365.0).unwrap(), CivilTime::new(2021, 2, 28, 0, 0, 0));

        let greg = decoder(Calendar::Standard, TimeUnit::Days, "2020-02-28");
        assert_eq!(greg.decode(1.0).unwrap(), CivilTime::new(2020, 2, 29, 0, 0, 0));
    }

    #[test]
    fn test_day360_and_all_leap() {
        let d = decoder(Calendar::Day360, TimeUnit::Days, "2000-01-01");
        assert_eq!(d.decode(59.0).unwrap(), CivilTime::new(2000, 2, 30, 0, 0, 0));
        assert_eq!(d.decode(360.0).unwrap(), CivilTime::new(2001, 1, 1, 0, 0, 0));

        let d = decoder(Calendar::AllLeap, TimeUnit::Days, "2001-02-28");
        assert_eq!(d.decode(1.0).unwrap(), CivilTime::new(2001, 2, 29, 0, 0, 0));
    }

    #[test]
    fn test_standard_calendar_crosses_gregorian_reform() {
        let d = decoder(Calendar::Standard, TimeUnit::Days, "1582-10-04");
        assert_eq!(d.decode(1.0).unwrap(), CivilTime::new(1582, 10, 15, 0, 0, 0));

        let d = decoder(Calendar::ProlepticGregorian, TimeUnit::Days, "1582-10-04");
        assert_eq!(d.decode(1.0).unwrap(), CivilTime::new(1582, 10, 5, 0, 0, 0));
    }

    #[test]
    fn test_julian_leap_century() {
        let d = decoder(Calendar::Julian, TimeUnit::Days, "1900-02-28");
        assert_eq!(d.decode(1.0).unwrap(), CivilTime::new(1900, 2, 29, 0, 0, 0));
    }

    #[test]
    fn test_hours_and_shift() {
        let base = CivilTime::parse("2021-06-01T00:00:00").unwrap();
        let d = TimeDecoder::new(Calendar::Standard, TimeUnit::Hours, base, -6.0).unwrap();
        assert_eq!(d.decode(30.0).unwrap(), CivilTime::new(2021, 6, 2, 0, 0, 0));
    }

    #[test]
    fn test_ref_time_format() {
        let t = CivilTime {
            millisecond: 250,
            ..CivilTime::new(1850, 3, 7, 4, 5, 6)
        };
        assert_eq!(t.ref_time(), "1850-03-07T04:05:06.250Z");
        assert_eq!(t.compact(), "18500307040506250");
    }

    #[test]
    fn test_compact_keeps_seconds_apart() {
        let d = decoder(Calendar::Standard, TimeUnit::Seconds, "2021-01-01");
        let a = d.decode(0.0).unwrap().compact();
        let b = d.decode(30.0).unwrap().compact();
        assert_eq!(a, "20210101000000");
        assert_eq!(b, "20210101000030");
        assert_eq!(d.decode(30.25).unwrap().compact(), "20210101000030250");
    }

    #[test]
    fn test_invalid_base_dates() {
        assert!(CivilTime::parse("not a date").is_err());
        let feb29 = CivilTime::new(2021, 2, 29, 0, 0, 0);
        assert!(TimeDecoder::new(Calendar::NoLeap, TimeUnit::Days, feb29, 0.0).is_err());
        assert!(TimeDecoder::new(Calendar::Standard, TimeUnit::Days, feb29, 0.0).is_err());
    }

    #[test]
    fn test_calendar_names() {
        assert_eq!("365_day".parse::<Calendar>().unwrap(), Calendar::NoLeap);
        assert_eq!("Gregorian".parse::<Calendar>().unwrap(), Calendar::Standard);
        assert!("lunar".parse::<Calendar>().is_err());
        assert_eq!(Calendar::Day360.to_string(), "360_day");
    }
}
