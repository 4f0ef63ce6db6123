use chrono::{DateTime, Days, FixedOffset, NaiveDate, TimeZone, Utc};

pub fn calendar_day(instant: DateTime<Utc>, tz: &FixedOffset) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

pub fn same_calendar_day(last: Option<DateTime<Utc>>, now: DateTime<Utc>, tz: &FixedOffset) -> bool {
    match last {
        Some(last) => calendar_day(last, tz) == calendar_day(now, tz),
        None => false,
    }
}

pub fn next_day_start(now: DateTime<Utc>, tz: &FixedOffset) -> Option<DateTime<Utc>> {
    let tomorrow = calendar_day(now, tz).checked_add_days(Days::new(1))?;
    let midnight = tomorrow.and_hms_opt(0, 0, 0)?;

    tz.from_local_datetime(&midnight)
        .single()
        .map(|local| local.with_timezone(&Utc))
}
