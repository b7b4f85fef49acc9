//! Calendar frequencies and their period arithmetic.
//!
//! Codes follow the pandas offset aliases the stored series were produced
//! with (`A-DEC`, `Q-DEC`, `M`, `2W-SUN`, `W-SUN`, `B`, `D`). Annual,
//! quarterly and monthly periods are labelled by their last calendar day and
//! weekly periods by the Sunday that closes them. Two-week periods close on
//! every other Sunday counted from 1970-01-04; a two-week series on the
//! off weeks is not inferred as biweekly.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Supported sampling frequencies, declared from coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Frequency {
    Annual,
    Quarterly,
    Monthly,
    Biweekly,
    Weekly,
    BusinessDaily,
    Daily,
}

/// Order in which a common frequency is chosen when combining series of
/// different native frequencies: the first entry present wins.
pub const RECONCILE_PREFERENCE: [Frequency; 5] = [
    Frequency::Annual,
    Frequency::Quarterly,
    Frequency::Monthly,
    Frequency::Biweekly,
    Frequency::Weekly,
];

// Sunday used to anchor two-week bins.
const BIWEEKLY_ANCHOR: (i32, u32, u32) = (1970, 1, 4);

impl Frequency {
    /// Every frequency, in the order inference tries them.
    pub const INFERENCE_ORDER: [Frequency; 7] = [
        Frequency::Annual,
        Frequency::Quarterly,
        Frequency::Monthly,
        Frequency::Biweekly,
        Frequency::Weekly,
        Frequency::Daily,
        Frequency::BusinessDaily,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Frequency::Annual => "A-DEC",
            Frequency::Quarterly => "Q-DEC",
            Frequency::Monthly => "M",
            Frequency::Biweekly => "2W-SUN",
            Frequency::Weekly => "W-SUN",
            Frequency::BusinessDaily => "B",
            Frequency::Daily => "D",
        }
    }

    /// Parses a frequency code, accepting the usual pandas aliases.
    pub fn from_code(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "A" | "A-DEC" | "Y" | "Y-DEC" | "YE" | "YE-DEC" => Some(Frequency::Annual),
            "Q" | "Q-DEC" | "QE" | "QE-DEC" => Some(Frequency::Quarterly),
            "M" | "ME" => Some(Frequency::Monthly),
            "2W" | "2W-SUN" => Some(Frequency::Biweekly),
            "W" | "W-SUN" => Some(Frequency::Weekly),
            "B" => Some(Frequency::BusinessDaily),
            "D" => Some(Frequency::Daily),
            _ => None,
        }
    }

    pub fn is_coarser_than(&self, other: Frequency) -> bool {
        *self < other
    }

    /// Number of periods in a year, for frequencies where that is fixed.
    pub fn periods_per_year(&self) -> Option<usize> {
        match self {
            Frequency::Annual => Some(1),
            Frequency::Quarterly => Some(4),
            Frequency::Monthly => Some(12),
            Frequency::Biweekly => Some(26),
            Frequency::Weekly => Some(52),
            Frequency::BusinessDaily | Frequency::Daily => None,
        }
    }

    /// Seasonal cycle length used by decomposition.
    pub fn seasonal_period(&self) -> Option<usize> {
        match self {
            Frequency::Quarterly => Some(4),
            Frequency::Monthly => Some(12),
            _ => None,
        }
    }

    /// Label of the period containing `date`.
    pub fn period_end(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Frequency::Annual => ymd(date.year(), 12, 31),
            Frequency::Quarterly => {
                let month = ((date.month() - 1) / 3 + 1) * 3;
                last_day_of_month(date.year(), month)
            }
            Frequency::Monthly => last_day_of_month(date.year(), date.month()),
            Frequency::Weekly => next_sunday(date),
            Frequency::Biweekly => {
                let sunday = next_sunday(date);
                let anchor = ymd(BIWEEKLY_ANCHOR.0, BIWEEKLY_ANCHOR.1, BIWEEKLY_ANCHOR.2);
                let weeks = (sunday - anchor).num_days().div_euclid(7);
                if weeks.rem_euclid(2) == 0 {
                    sunday
                } else {
                    sunday + Duration::days(7)
                }
            }
            Frequency::BusinessDaily => match date.weekday() {
                Weekday::Sat => date + Duration::days(2),
                Weekday::Sun => date + Duration::days(1),
                _ => date,
            },
            Frequency::Daily => date,
        }
    }

    /// First calendar day belonging to the period containing `date`.
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        let end = self.period_end(date);
        match self {
            Frequency::Annual => ymd(end.year(), 1, 1),
            Frequency::Quarterly => ymd(end.year(), end.month() - 2, 1),
            Frequency::Monthly => ymd(end.year(), end.month(), 1),
            Frequency::Biweekly => end - Duration::days(13),
            Frequency::Weekly => end - Duration::days(6),
            Frequency::BusinessDaily => {
                if end.weekday() == Weekday::Mon {
                    end - Duration::days(2)
                } else {
                    end
                }
            }
            Frequency::Daily => end,
        }
    }

    /// Label of the period following the one containing `date`.
    pub fn next_period_end(&self, date: NaiveDate) -> NaiveDate {
        let end = self.period_end(date);
        self.period_end(end + Duration::days(1))
    }

    /// Every period label from the period containing `start` through the
    /// period containing `end`.
    pub fn grid(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut labels = Vec::new();
        if start > end {
            return labels;
        }
        let last = self.period_end(end);
        let mut current = self.period_end(start);
        while current <= last {
            labels.push(current);
            current = self.next_period_end(current);
        }
        labels
    }

    /// Infers the frequency of a sorted index.
    ///
    /// Needs at least three observations. Returns `None` for irregular
    /// indexes and for anchors other than the ones listed in the module docs.
    pub fn infer(index: &[NaiveDate]) -> Option<Frequency> {
        if index.len() < 3 {
            return None;
        }
        Frequency::INFERENCE_ORDER
            .into_iter()
            .find(|frequency| frequency.matches(index))
    }

    // Biweekly indexes only match on the anchored Sundays, so a series
    // sitting on the other week never shares rows with resampled data.
    fn matches(&self, index: &[NaiveDate]) -> bool {
        index.iter().all(|date| self.period_end(*date) == *date)
            && index
                .windows(2)
                .all(|pair| self.next_period_end(pair[0]) == pair[1])
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl From<Frequency> for String {
    fn from(frequency: Frequency) -> Self {
        frequency.code().to_string()
    }
}

impl TryFrom<String> for Frequency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Frequency::from_code(&value).ok_or_else(|| format!("unknown frequency code '{value}'"))
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MAX)
}

/// Last calendar day of the given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

fn next_sunday(date: NaiveDate) -> NaiveDate {
    let offset = (7 - date.weekday().num_days_from_sunday()) % 7;
    date + Duration::days(offset as i64)
}
