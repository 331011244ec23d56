use std::fmt;
use std::str::FromStr;

use chrono::{
  DateTime,
  Days,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use tracing::trace;

use crate::datetime::{
  DueRange,
  format_short_date,
  local_date
};
use crate::error::TrackerError;
use crate::store::TaskQuery;
use crate::task::Priority;

const SUMMARY_SEPARATOR: &str = " • ";

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DateFilter {
  #[default]
  Today,
  Tomorrow,
  Week,
  All,
  Custom(NaiveDate)
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
  #[default]
  All,
  Active,
  Completed,
  Overdue
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PriorityFilter {
  #[default]
  Any,
  Only(Priority)
}

impl PriorityFilter {
  pub fn priority(
    self
  ) -> Option<Priority> {
    match self {
      | Self::Any => None,
      | Self::Only(priority) => {
        Some(priority)
      }
    }
  }
}

impl DateFilter {
  /// Local-day window for this filter, or `None` for `All`.
  pub fn range(
    self,
    now: DateTime<Utc>,
    tz: Tz
  ) -> anyhow::Result<Option<DueRange>> {
    let today = local_date(now, tz);
    let (from, to) = match self {
      | Self::All => return Ok(None),
      | Self::Today => (today, today),
      | Self::Tomorrow => {
        let day = shift_days(today, 1)?;
        (day, day)
      }
      | Self::Week => {
        (today, shift_days(today, 7)?)
      }
      | Self::Custom(day) => (day, day)
    };
    DueRange::local_days(from, to, tz)
      .map(Some)
  }

  pub fn label(
    self
  ) -> Option<String> {
    match self {
      | Self::Today => None,
      | Self::Tomorrow => {
        Some("Tomorrow".to_string())
      }
      | Self::Week => {
        Some("This Week".to_string())
      }
      | Self::All => {
        Some("All Dates".to_string())
      }
      | Self::Custom(day) => {
        Some(format_short_date(day))
      }
    }
  }
}

impl StatusFilter {
  pub const ALL: [StatusFilter; 4] = [
    StatusFilter::All,
    StatusFilter::Active,
    StatusFilter::Completed,
    StatusFilter::Overdue
  ];

  pub fn label(
    self
  ) -> Option<&'static str> {
    match self {
      | Self::All => None,
      | Self::Active => Some("Active"),
      | Self::Completed => {
        Some("Completed")
      }
      | Self::Overdue => Some("Overdue")
    }
  }
}

impl PriorityFilter {
  pub const ALL: [PriorityFilter; 4] = [
    PriorityFilter::Any,
    PriorityFilter::Only(Priority::Low),
    PriorityFilter::Only(
      Priority::Medium
    ),
    PriorityFilter::Only(Priority::High)
  ];

  pub fn label(
    self
  ) -> Option<String> {
    self.priority().map(|priority| {
      format!("{priority} Priority")
    })
  }
}

fn shift_days(
  day: NaiveDate,
  days: u64
) -> anyhow::Result<NaiveDate> {
  day
    .checked_add_days(Days::new(days))
    .ok_or_else(|| {
      anyhow::anyhow!(
        "date out of range: {day} + \
         {days} days"
      )
    })
}

/// The (date, status, priority) triple driving the visible task list.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
)]
pub struct FilterState {
  pub date:     DateFilter,
  pub status:   StatusFilter,
  pub priority: PriorityFilter
}

impl FilterState {
  pub fn is_default(&self) -> bool {
    *self == Self::default()
  }

  /// Picks the one store query for this triple. Overdue ignores the
  /// date filter.
  #[tracing::instrument(skip(now, tz))]
  pub fn resolve(
    &self,
    now: DateTime<Utc>,
    tz: Tz
  ) -> anyhow::Result<TaskQuery> {
    let priority =
      self.priority.priority();

    let query = match self.status {
      | StatusFilter::Overdue => {
        TaskQuery::Overdue {
          now,
          priority
        }
      }
      | StatusFilter::All => {
        match self
          .date
          .range(now, tz)?
        {
          | Some(range) => {
            TaskQuery::DueBetween {
              range,
              priority
            }
          }
          | None => {
            TaskQuery::All {
              priority
            }
          }
        }
      }
      | StatusFilter::Active => {
        TaskQuery::Active {
          range: self
            .date
            .range(now, tz)?,
          priority
        }
      }
      | StatusFilter::Completed => {
        TaskQuery::Completed {
          range: self
            .date
            .range(now, tz)?,
          priority
        }
      }
    };

    trace!(?query, "resolved filter");
    Ok(query)
  }

  /// Labels of the non-default filters, `" • "`-joined. Empty at defaults.
  pub fn summary(&self) -> String {
    let labels: Vec<String> = [
      self.date.label(),
      self
        .status
        .label()
        .map(str::to_string),
      self.priority.label()
    ]
    .into_iter()
    .flatten()
    .collect();
    labels.join(SUMMARY_SEPARATOR)
  }
}

impl fmt::Display for FilterState {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    let summary = self.summary();
    if summary.is_empty() {
      f.write_str("Today")
    } else {
      f.write_str(&summary)
    }
  }
}

impl FromStr for DateFilter {
  type Err = TrackerError;

  fn from_str(
    raw: &str
  ) -> Result<Self, Self::Err> {
    let token =
      raw.trim().to_ascii_lowercase();
    match token.as_str() {
      | "today" => Ok(Self::Today),
      | "tomorrow" => Ok(Self::Tomorrow),
      | "week" => Ok(Self::Week),
      | "all" => Ok(Self::All),
      | other => {
        NaiveDate::parse_from_str(
          other, "%Y-%m-%d"
        )
        .map(Self::Custom)
        .map_err(|_| {
          TrackerError::Validation(
            format!(
              "invalid date filter \
               '{raw}': expected \
               today, tomorrow, week, \
               all, or YYYY-MM-DD"
            )
          )
        })
      }
    }
  }
}

impl FromStr for StatusFilter {
  type Err = TrackerError;

  fn from_str(
    raw: &str
  ) -> Result<Self, Self::Err> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(Self::All),
      | "active" => Ok(Self::Active),
      | "completed" | "done" => {
        Ok(Self::Completed)
      }
      | "overdue" => Ok(Self::Overdue),
      | _ => {
        Err(TrackerError::Validation(
          format!(
            "invalid status filter \
             '{raw}': expected all, \
             active, completed, or \
             overdue"
          )
        ))
      }
    }
  }
}

impl FromStr for PriorityFilter {
  type Err = TrackerError;

  fn from_str(
    raw: &str
  ) -> Result<Self, Self::Err> {
    let token = raw.trim();
    if token.eq_ignore_ascii_case("any")
      || token
        .eq_ignore_ascii_case("none")
    {
      return Ok(Self::Any);
    }
    token
      .parse::<Priority>()
      .map(Self::Only)
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone
  };

  use super::*;

  fn now() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 10, 18, 12, 0, 0
      )
      .single()
      .expect("valid now")
  }

  fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, d)
      .expect("valid date")
  }

  #[test]
  fn resolver_is_total_over_every_combination()
  {
    let dates = [
      DateFilter::Today,
      DateFilter::Tomorrow,
      DateFilter::Week,
      DateFilter::All,
      DateFilter::Custom(day(20))
    ];
    let mut seen = 0;
    for date in dates {
      for status in StatusFilter::ALL {
        for priority in
          PriorityFilter::ALL
        {
          let state = FilterState {
            date,
            status,
            priority
          };
          let query = state
            .resolve(
              now(),
              chrono_tz::UTC
            )
            .expect("resolves");
          assert_eq!(
            query.priority(),
            priority.priority()
          );
          seen += 1;
        }
      }
    }
    assert_eq!(seen, 80);
  }

  #[test]
  fn overdue_ignores_the_date_filter() {
    for date in [
      DateFilter::Today,
      DateFilter::All,
      DateFilter::Custom(day(1))
    ] {
      let state = FilterState {
        date,
        status: StatusFilter::Overdue,
        priority: PriorityFilter::Only(
          Priority::High
        )
      };
      assert_eq!(
        state
          .resolve(now(), chrono_tz::UTC)
          .expect("resolves"),
        TaskQuery::Overdue {
          now:      now(),
          priority: Some(Priority::High)
        }
      );
    }
  }

  #[test]
  fn all_status_without_range_lists_everything()
  {
    let state = FilterState {
      date: DateFilter::All,
      ..FilterState::default()
    };
    assert_eq!(
      state
        .resolve(now(), chrono_tz::UTC)
        .expect("resolves"),
      TaskQuery::All {
        priority: None
      }
    );
  }

  #[test]
  fn active_and_completed_carry_optional_range()
  {
    let active = FilterState {
      date:     DateFilter::All,
      status:   StatusFilter::Active,
      priority: PriorityFilter::Any
    };
    assert_eq!(
      active
        .resolve(now(), chrono_tz::UTC)
        .expect("resolves"),
      TaskQuery::Active {
        range:    None,
        priority: None
      }
    );

    let completed = FilterState {
      status: StatusFilter::Completed,
      ..FilterState::default()
    };
    let query = completed
      .resolve(now(), chrono_tz::UTC)
      .expect("resolves");
    assert!(matches!(
      query,
      TaskQuery::Completed {
        range: Some(_),
        priority: None
      }
    ));
  }

  #[test]
  fn date_windows_match_local_days() {
    let tz = chrono_tz::UTC;
    let midnight = Utc
      .with_ymd_and_hms(
        2026, 10, 18, 0, 0, 0
      )
      .single()
      .expect("valid");
    let last_ms = Duration::days(1)
      - Duration::milliseconds(1);

    let today = DateFilter::Today
      .range(now(), tz)
      .expect("range")
      .expect("today has a range");
    assert_eq!(today.start, midnight);
    assert_eq!(
      today.end,
      midnight + last_ms
    );

    let tomorrow = DateFilter::Tomorrow
      .range(now(), tz)
      .expect("range")
      .expect("tomorrow has a range");
    assert_eq!(
      tomorrow.start,
      midnight + Duration::days(1)
    );

    let week = DateFilter::Week
      .range(now(), tz)
      .expect("range")
      .expect("week has a range");
    assert_eq!(week.start, midnight);
    assert_eq!(
      week.end,
      midnight
        + Duration::days(7)
        + last_ms
    );

    assert!(
      DateFilter::All
        .range(now(), tz)
        .expect("range")
        .is_none()
    );
  }

  #[test]
  fn summary_lists_non_default_filters()
  {
    assert_eq!(
      FilterState::default().summary(),
      ""
    );

    let state = FilterState {
      date:     DateFilter::Custom(day(
        19
      )),
      status:   StatusFilter::Active,
      priority: PriorityFilter::Only(
        Priority::High
      )
    };
    assert_eq!(
      state.summary(),
      "Oct 19 • Active • High Priority"
    );

    let week = FilterState {
      date: DateFilter::Week,
      ..FilterState::default()
    };
    assert_eq!(week.summary(), "This Week");
  }

  #[test]
  fn parses_cli_filter_strings() {
    assert_eq!(
      "week".parse::<DateFilter>().ok(),
      Some(DateFilter::Week)
    );
    assert_eq!(
      "2026-10-19"
        .parse::<DateFilter>()
        .ok(),
      Some(DateFilter::Custom(day(19)))
    );
    assert!(
      "someday"
        .parse::<DateFilter>()
        .is_err()
    );
    assert_eq!(
      "Overdue"
        .parse::<StatusFilter>()
        .ok(),
      Some(StatusFilter::Overdue)
    );
    assert_eq!(
      "3".parse::<PriorityFilter>().ok(),
      Some(PriorityFilter::Only(
        Priority::High
      ))
    );
    assert_eq!(
      "any"
        .parse::<PriorityFilter>()
        .ok(),
      Some(PriorityFilter::Any)
    );
  }
}
