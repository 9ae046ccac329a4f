#![allow(dead_code)]

use std::{f64::consts::PI, fmt::Write as _, path::Path};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Value, json};

/// One half-hourly observation of the synthetic feed.
#[derive(Debug, Clone)]
pub struct Record {
    pub time: DateTime<Utc>,
    pub demand: f64,
    pub temperature: f64,
    pub holiday: bool,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap()
}

/// Deterministic half-hourly feed with a daily demand cycle, a weekly
/// offset and a holiday on the first day.
pub fn records(days: usize) -> Vec<Record> {
    (0..days * 48)
        .map(|i| {
            let time = start() + Duration::minutes(30 * i as i64);
            let hour = i as f64 / 2.0;
            let day = i / 48;
            let daily = (2.0 * PI * hour / 24.0).sin();
            let weekly = if day % 7 >= 5 { -300.0 } else { 0.0 };
            Record {
                time,
                demand: 4500.0 + 800.0 * daily + weekly + (i % 5) as f64,
                temperature: 22.0 + 6.0 * (2.0 * PI * (hour - 6.0) / 24.0).sin(),
                holiday: day == 0,
            }
        })
        .collect()
}

pub fn write_csv(path: &Path, records: &[Record]) {
    let mut out = String::from("Time,Date,Demand,Temperature,Holiday\n");
    for r in records {
        writeln!(
            out,
            "{},{},{},{},{}",
            r.time.format("%Y-%m-%dT%H:%M:%SZ"),
            r.time.date_naive(),
            r.demand,
            r.temperature,
            if r.holiday { "TRUE" } else { "FALSE" }
        )
        .unwrap();
    }
    std::fs::write(path, out).unwrap();
}

pub fn to_json(records: &[Record]) -> Value {
    Value::Array(
        records
            .iter()
            .map(|r| {
                json!({
                    "Time": r.time.to_rfc3339(),
                    "Date": r.time.date_naive().to_string(),
                    "Demand": r.demand,
                    "Temperature": r.temperature,
                    "Holiday": r.holiday,
                })
            })
            .collect(),
    )
}
