use std::sync::LazyLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::{
  Deserialize,
  Serialize
};

static RELATIVE_RE: LazyLock<Regex> =
  LazyLock::new(|| {
    Regex::new(
      r"^\+(?P<num>\d+)(?P<unit>[dhm])$"
    )
    .expect("relative offset regex")
  });

static CLOCK_RE: LazyLock<Regex> =
  LazyLock::new(|| {
    Regex::new(
      r"(?i)^(?P<hour>\d{1,2})(:(?P<minute>\d{2}))?\s*(?P<ampm>[ap]m)?$",
    )
    .expect("clock time regex")
  });

/// Inclusive window of due instants.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct DueRange {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>
}

impl DueRange {
  pub fn contains(
    &self,
    instant: DateTime<Utc>
  ) -> bool {
    self.start <= instant
      && instant <= self.end
  }

  /// `[00:00:00.000 of from, 23:59:59.999 of to]` in `tz`.
  pub fn local_days(
    from: NaiveDate,
    to: NaiveDate,
    tz: Tz
  ) -> anyhow::Result<Self> {
    let start = local_to_utc(
      from.and_time(NaiveTime::MIN),
      tz,
      "start-of-day"
    )?;
    let next_midnight = to
      .succ_opt()
      .ok_or_else(|| {
        anyhow!(
          "date out of range: {to}"
        )
      })?
      .and_time(NaiveTime::MIN);
    let end = local_to_utc(
      next_midnight,
      tz,
      "end-of-day"
    )? - Duration::milliseconds(1);
    Ok(Self {
      start,
      end
    })
  }

  pub fn local_day(
    day: NaiveDate,
    tz: Tz
  ) -> anyhow::Result<Self> {
    Self::local_days(day, day, tz)
  }
}

#[must_use]
pub fn truncate_to_millis(
  dt: DateTime<Utc>
) -> DateTime<Utc> {
  DateTime::from_timestamp_millis(
    dt.timestamp_millis()
  )
  .unwrap_or(dt)
}

#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  tz: Tz
) -> NaiveDate {
  dt.with_timezone(&tz).date_naive()
}

pub fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

fn local_to_utc(
  local_naive: NaiveDateTime,
  tz: Tz,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match tz.from_local_datetime(
    &local_naive
  ) {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      // Inside a DST gap; take the first instant after it.
      let shifted =
        local_naive + Duration::hours(1);
      match tz
        .from_local_datetime(&shifted)
        .earliest()
      {
        | Some(local_dt) => {
          Ok(local_dt.with_timezone(&Utc))
        }
        | None => Err(anyhow!(
          "local datetime does not \
           exist in timezone {tz}: \
           {context}"
        ))
      }
    }
  }
}

/// Resolves a calendar-day expression relative to `now` in `tz`.
#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_day_expr(
  input: &str,
  now: DateTime<Utc>,
  tz: Tz
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = local_date(now, tz);

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return today.succ_opt().ok_or_else(
        || anyhow!("date out of range")
      );
    }
    | "yesterday" => {
      return today.pred_opt().ok_or_else(
        || anyhow!("date out of range")
      );
    }
    | _ => {}
  }

  if let Some(target) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today, target
    ));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(date);
  }

  Err(anyhow!(
    "unrecognized day expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     today/tomorrow/yesterday, weekday \
     names (e.g. monday), YYYY-MM-DD"
  })
}

/// Resolves a due-time expression. A day expression may be followed by a
/// clock time (`tomorrow 9:00`, `2026-10-20 3:30pm`); a bare clock time means
/// its next occurrence.
#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_due_expr(
  input: &str,
  now: DateTime<Utc>,
  tz: Tz
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  if lower == "now" {
    return Ok(now);
  }

  if let Some(delta) =
    parse_relative(token)?
  {
    return now
      .checked_add_signed(delta)
      .ok_or_else(|| {
        anyhow!(
          "relative offset out of \
           range: {token}"
        )
      });
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return local_to_utc(ndt, tz, fmt);
    }
  }

  if let Some((hour, minute)) =
    parse_clock_time(token)
  {
    let local_now = now.with_timezone(&tz);
    let mut day = local_now.date_naive();
    let candidate = day
      .and_hms_opt(hour, minute, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct clock \
           time candidate"
        )
      })?;
    if candidate
      <= local_now.naive_local()
    {
      day = day.succ_opt().ok_or_else(
        || anyhow!("date out of range")
      )?;
    }
    let next = day
      .and_hms_opt(hour, minute, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct next \
           clock time candidate"
        )
      })?;
    return local_to_utc(
      next,
      tz,
      "clock-time"
    );
  }

  let (day_part, time_part) =
    match token.split_once(' ') {
      | Some((day, time)) => {
        (day, Some(time.trim()))
      }
      | None => (token, None)
    };

  let day =
    parse_day_expr(day_part, now, tz)
      .with_context(|| {
        format!(
          "unrecognized due expression: \
           {input}"
        )
      })?;

  let (hour, minute) = match time_part {
    | Some(raw) => {
      parse_clock_time(raw).ok_or_else(
        || {
          anyhow!(
            "invalid clock time: {raw}"
          )
        }
      )?
    }
    | None => (0, 0)
  };

  let naive = day
    .and_hms_opt(hour, minute, 0)
    .ok_or_else(|| {
      anyhow!(
        "failed to construct due time"
      )
    })?;
  local_to_utc(naive, tz, "day-and-time")
}

fn parse_relative(
  token: &str
) -> anyhow::Result<Option<Duration>> {
  let Some(caps) =
    RELATIVE_RE.captures(token)
  else {
    return Ok(None);
  };

  let num: i64 = caps["num"]
    .parse()
    .context(
      "invalid relative number"
    )?;

  let duration = match &caps["unit"] {
    | "d" => Duration::try_days(num),
    | "h" => Duration::try_hours(num),
    | "m" => Duration::try_minutes(num),
    | unit => {
      return Err(anyhow!(
        "unknown relative unit: \
         {unit}"
      ))
    }
  };
  duration
    .map(Some)
    .ok_or_else(|| {
      anyhow!(
        "relative offset out of range: \
         {token}"
      )
    })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}

fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  let captures =
    CLOCK_RE.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = match captures
    .name("minute")
  {
    | Some(m) => {
      m.as_str().parse::<u32>().ok()?
    }
    | None => 0
  };
  if minute > 59 {
    return None;
  }

  match captures.name("ampm") {
    | Some(ampm) => {
      if raw_hour == 0 || raw_hour > 12 {
        return None;
      }
      let hour = match ampm
        .as_str()
        .to_ascii_lowercase()
        .as_str()
      {
        | "am" => raw_hour % 12,
        | "pm" => raw_hour % 12 + 12,
        | _ => return None
      };
      Some((hour, minute))
    }
    // A bare number without am/pm is not a clock time.
    | None if captures
      .name("minute")
      .is_none() =>
    {
      None
    }
    | None => {
      if raw_hour > 23 {
        return None;
      }
      Some((raw_hour, minute))
    }
  }
}

/// `45 min`, `1h`, `1h 5m`.
pub fn format_minutes(
  minutes: u32
) -> String {
  if minutes < 60 {
    return format!("{minutes} min");
  }
  let hours = minutes / 60;
  let mins = minutes % 60;
  if mins > 0 {
    format!("{hours}h {mins}m")
  } else {
    format!("{hours}h")
  }
}

/// `0m`, `45m`, `2h`, `2h 5m`.
pub fn format_minutes_compact(
  minutes: u32
) -> String {
  if minutes < 60 {
    return format!("{minutes}m");
  }
  let hours = minutes / 60;
  let mins = minutes % 60;
  if mins == 0 {
    format!("{hours}h")
  } else {
    format!("{hours}h {mins}m")
  }
}

#[must_use]
pub fn format_short_date(
  date: NaiveDate
) -> String {
  date.format("%b %d").to_string()
}

#[must_use]
pub fn format_due(
  dt: DateTime<Utc>,
  tz: Tz
) -> String {
  dt.with_timezone(&tz)
    .format("%b %d, %-I:%M %p")
    .to_string()
}
