use std::{collections::HashSet, fmt::Display, sync::Arc, time::Duration};

use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone};

use crate::{
    models::{StopTime, TransportType},
    shared::time::Time,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub line: Arc<str>,
    pub direction: Arc<str>,
    pub vehicle_ref: Arc<str>,
    /// "HH:MM" in the caller's timezone.
    pub departure_time: String,
    /// Unix seconds.
    pub departs_at: i64,
    pub minutes_until: i64,
}

fn matches(record: &StopTime, stop_num: &str, category: TransportType) -> bool {
    record.category == category && &*record.stop_num == stop_num
}

/// Upcoming departures from one stop, soonest first.
///
/// Predicted timestamps win over planned times. A planned "HH:MM" already
/// behind `now` is taken to mean tomorrow. Anything further out than
/// `horizon`, or already gone, is dropped.
pub fn departures<Tz: TimeZone>(
    records: &[StopTime],
    stop_num: &str,
    category: TransportType,
    now: &DateTime<Tz>,
    horizon: Duration,
) -> Vec<Departure>
where
    Tz::Offset: Display,
{
    let now_ts = now.timestamp();
    let max_ts = now_ts + horizon.as_secs() as i64;

    let mut departures: Vec<Departure> = records
        .iter()
        .filter(|record| matches(record, stop_num, category))
        .filter_map(|record| {
            let (departs_at, departure_time) = departure_epoch(record, now)?;
            let minutes_until = ((departs_at - now_ts) as f64 / 60.0).round() as i64;
            Some(Departure {
                line: record.line.clone(),
                direction: record.headsign.clone(),
                vehicle_ref: record.vehicle_ref.clone(),
                departure_time,
                departs_at,
                minutes_until,
            })
        })
        .filter(|departure| departure.departs_at <= max_ts && departure.minutes_until >= 0)
        .collect();
    departures.sort_by_key(|departure| departure.minutes_until);
    departures
}

/// Distinct headsigns served at one stop, in first-seen order.
pub fn directions(records: &[StopTime], stop_num: &str, category: TransportType) -> Vec<Arc<str>> {
    let mut seen: HashSet<Arc<str>> = HashSet::new();
    records
        .iter()
        .filter(|record| matches(record, stop_num, category))
        .filter_map(|record| {
            seen.insert(record.headsign.clone())
                .then(|| record.headsign.clone())
        })
        .collect()
}

fn departure_epoch<Tz: TimeZone>(record: &StopTime, now: &DateTime<Tz>) -> Option<(i64, String)>
where
    Tz::Offset: Display,
{
    if let Some(predicted) = record.predicted_departure.filter(|ts| *ts > 0) {
        let local = DateTime::from_timestamp(predicted, 0)?.with_timezone(&now.timezone());
        return Some((predicted, local.format("%H:%M").to_string()));
    }

    let planned = Time::from_hm(&record.planned_departure)?;
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    let mut planned_at = (midnight + TimeDelta::seconds(planned.as_seconds() as i64))
        .and_local_timezone(now.timezone())
        .earliest()?;
    if planned_at < *now {
        planned_at = planned_at + TimeDelta::days(1);
    }
    Some((planned_at.timestamp(), record.planned_departure.to_string()))
}

#[cfg(test)]
fn record(stop_num: &str, planned: &str, predicted: Option<i64>) -> StopTime {
    StopTime {
        category: TransportType::Tram,
        headsign: "Nowy Bieżanów".into(),
        line: "3".into(),
        stop_num: stop_num.into(),
        planned_departure: planned.into(),
        predicted_departure: predicted,
        vehicle_ref: "RY801".into(),
    }
}

#[test]
fn predicted_wins_over_planned() {
    let now = chrono::Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
    let predicted = now.timestamp() + 7 * 60;
    let records = [record("1", "12:30", Some(predicted))];
    let result = departures(&records, "1", TransportType::Tram, &now, Duration::from_secs(3600));
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].minutes_until, 7);
    assert_eq!(result[0].departure_time, "12:07");
}

#[test]
fn directions_are_unique() {
    let mut other = record("1", "12:10", None);
    other.headsign = "Krowodrza Górka".into();
    let records = [
        record("1", "12:05", None),
        other,
        record("1", "12:20", None),
        record("2", "12:20", None),
    ];
    let result = directions(&records, "1", TransportType::Tram);
    assert_eq!(result.len(), 2);
    assert_eq!(&*result[0], "Nowy Bieżanów");
    assert_eq!(&*result[1], "Krowodrza Górka");
}
