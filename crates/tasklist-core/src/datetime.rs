use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Days,
  Local,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use tracing::debug;

const DUE_DATE_FORMAT: &str =
  "%Y-%m-%d";

/// Timezone used to decide what
/// "today" means for due dates.
#[derive(Debug, Clone, Copy)]
pub enum Zone {
  Local,
  Named(Tz)
}

impl Zone {
  /// `None` or a blank name selects
  /// the system timezone.
  pub fn parse(
    name: Option<&str>
  ) -> anyhow::Result<Self> {
    let Some(name) = name
      .map(str::trim)
      .filter(|n| !n.is_empty())
    else {
      return Ok(Self::Local);
    };

    let tz =
      name.parse::<Tz>().map_err(
        |e| {
          anyhow!(
            "invalid timezone \
             {name:?}: {e}"
          )
        }
      )?;
    debug!(timezone = %tz, "using configured timezone");
    Ok(Self::Named(tz))
  }

  #[must_use]
  pub fn today(
    self,
    now: DateTime<Utc>
  ) -> NaiveDate {
    match self {
      | Self::Local => {
        now
          .with_timezone(&Local)
          .date_naive()
      }
      | Self::Named(tz) => {
        now
          .with_timezone(&tz)
          .date_naive()
      }
    }
  }
}

#[must_use]
pub fn format_due_date(
  date: NaiveDate
) -> String {
  date
    .format(DUE_DATE_FORMAT)
    .to_string()
}

/// Parses a due-date expression
/// relative to `today`. `none` (or
/// an empty string) clears the date.
pub fn parse_due_date(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<Option<NaiveDate>>
{
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "" | "none" => return Ok(None),
    | "today" => {
      return Ok(Some(today));
    }
    | "tomorrow" => {
      return offset_days(today, 1)
        .map(Some);
    }
    | "yesterday" => {
      return today
        .checked_sub_days(Days::new(1))
        .map(Some)
        .ok_or_else(|| {
          anyhow!(
            "date out of range: \
             {token}"
          )
        });
    }
    | _ => {}
  }

  if let Some(weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(Some(next_weekday_date(
      today, weekday
    )));
  }

  let rel_re = Regex::new(
    r"^\+?(?P<num>\d+)(?P<unit>[dw])$"
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile \
       failure: {e}"
    )
  })?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let num: u64 = caps
      .name("num")
      .map(|m| m.as_str())
      .unwrap_or_default()
      .parse()
      .with_context(|| {
        format!(
          "invalid relative date: \
           {token}"
        )
      })?;
    let days = match caps
      .name("unit")
      .map(|m| m.as_str())
    {
      | Some("w") => {
        num.saturating_mul(7)
      }
      | _ => num
    };
    return offset_days(today, days)
      .map(Some);
  }

  NaiveDate::parse_from_str(
    token,
    DUE_DATE_FORMAT
  )
  .map(Some)
  .map_err(|_| {
    anyhow!(
      "unrecognized date: {token} \
       (use YYYY-MM-DD, today, \
       tomorrow, a weekday or +Nd)"
    )
  })
}

fn offset_days(
  from: NaiveDate,
  days: u64
) -> anyhow::Result<NaiveDate> {
  from
    .checked_add_days(Days::new(days))
    .ok_or_else(|| {
      anyhow!(
        "date out of range: {from} \
         + {days} days"
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

/// Next occurrence strictly after
/// `from`.
fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday();
  let target_idx =
    target.num_days_from_monday();
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_days(Days::new(
      u64::from(delta)
    ))
    .unwrap_or(from)
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    Zone,
    parse_due_date
  };

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .unwrap()
  }

  #[test]
  fn named_and_relative_dates() {
    // 2026-10-16 is a Friday.
    let today = day(2026, 10, 16);

    assert_eq!(
      parse_due_date("today", today)
        .unwrap(),
      Some(today)
    );
    assert_eq!(
      parse_due_date(
        "Tomorrow", today
      )
      .unwrap(),
      Some(day(2026, 10, 17))
    );
    assert_eq!(
      parse_due_date("+3d", today)
        .unwrap(),
      Some(day(2026, 10, 19))
    );
    assert_eq!(
      parse_due_date("2w", today)
        .unwrap(),
      Some(day(2026, 10, 30))
    );
    assert_eq!(
      parse_due_date("mon", today)
        .unwrap(),
      Some(day(2026, 10, 19))
    );
    assert_eq!(
      parse_due_date("friday", today)
        .unwrap(),
      Some(day(2026, 10, 23))
    );
  }

  #[test]
  fn absolute_and_empty_dates() {
    let today = day(2026, 10, 16);

    assert_eq!(
      parse_due_date(
        "2026-12-24",
        today
      )
      .unwrap(),
      Some(day(2026, 12, 24))
    );
    assert_eq!(
      parse_due_date("none", today)
        .unwrap(),
      None
    );
    assert!(
      parse_due_date(
        "2026-13-01",
        today
      )
      .is_err()
    );
    assert!(
      parse_due_date(
        "someday", today
      )
      .is_err()
    );
  }

  #[test]
  fn named_zone_shifts_today() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 10, 16, 2, 0, 0
      )
      .unwrap();

    let mexico = Zone::parse(Some(
      "America/Mexico_City"
    ))
    .unwrap();
    assert_eq!(
      mexico.today(now),
      day(2026, 10, 15)
    );

    let tokyo =
      Zone::parse(Some("Asia/Tokyo"))
        .unwrap();
    assert_eq!(
      tokyo.today(now),
      day(2026, 10, 16)
    );

    assert!(
      Zone::parse(Some("Mars/Base"))
        .is_err()
    );
    assert!(matches!(
      Zone::parse(None).unwrap(),
      Zone::Local
    ));
  }
}
