use std::{fmt, str::FromStr};

/// A wall-clock time of day at the destination, stored as `HH:MM` (24-hour).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockTimeError {
    #[error("{0:?} is not a time of the form HH:MM")]
    Malformed(String),
    #[error("{0:?} is out of range (00:00 to 23:59)")]
    OutOfRange(String),
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// Panics on out-of-range values. Meant for literals in `const` contexts.
    pub const fn from_hm(hour: u8, minute: u8) -> Self {
        assert!(hour < 24 && minute < 60, "clock time out of range");
        Self { hour, minute }
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    /// `14:30` displays as `2:30 PM`.
    pub fn to_12_hour(self) -> String {
        let period = if self.hour >= 12 { "PM" } else { "AM" };
        let hour = match self.hour % 12 {
            0 => 12,
            hour => hour,
        };
        format!("{hour}:{:02} {period}", self.minute)
    }

    /// Parses `h:mm AM/PM` (case-insensitive, space before the period optional).
    pub fn parse_12_hour(s: &str) -> Option<Self> {
        let s = s.trim();
        let split = s.len().checked_sub(2)?;
        if !s.is_char_boundary(split) {
            return None;
        }
        let (time, period) = s.split_at(split);
        let pm = match period.to_ascii_uppercase().as_str() {
            "AM" => false,
            "PM" => true,
            _ => return None,
        };

        let (hour, minute) = time.trim_end().split_once(':')?;
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return None;
        }
        let hour: u8 = hour.parse().ok()?;
        let minute: u8 = minute.parse().ok()?;
        if !(1..=12).contains(&hour) {
            return None;
        }

        let hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (hour, false) => hour,
            (hour, true) => hour + 12,
        };
        Self::new(hour, minute)
    }

    /// `2:30 PM - 4:00 PM`, or just the start when there's no end.
    pub fn format_range(start: ClockTime, end: Option<ClockTime>) -> String {
        match end {
            Some(end) => format!("{} - {}", start.to_12_hour(), end.to_12_hour()),
            None => start.to_12_hour(),
        }
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = ClockTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ClockTimeError::Malformed(s.to_string());

        let (hour, minute) = s.split_once(':').ok_or_else(malformed)?;
        let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
        if !two_digits(hour) || !two_digits(minute) {
            return Err(malformed());
        }

        let hour = hour.parse().map_err(|_| malformed())?;
        let minute = minute.parse().map_err(|_| malformed())?;
        Self::new(hour, minute).ok_or_else(|| ClockTimeError::OutOfRange(s.to_string()))
    }
}

impl TryFrom<String> for ClockTime {
    type Error = ClockTimeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ClockTime> for String {
    fn from(time: ClockTime) -> Self {
        time.to_string()
    }
}
