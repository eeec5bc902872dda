use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};
use serde_json::json;

/// Fixed daily periods of the timetable, in display order.
pub const PERIODS: [&str; 3] = ["Sáng", "Chiều", "Tối"];

/// Ordered slots available within one (date, period) cell.
pub const SLOTS_PER_PERIOD: i64 = 2;

pub fn is_valid_period(period: &str) -> bool {
    PERIODS.contains(&period)
}

/// Monday-start 7-day window containing `date`. A Sunday maps to the window
/// that started the previous Monday.
pub fn week_window(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = date - ChronoDuration::days(date.weekday().num_days_from_monday() as i64);
    (monday, monday + ChronoDuration::days(6))
}

/// One schedule entry falling inside a week window, already joined with its
/// course name.
#[derive(Debug, Clone)]
pub struct WeekEntry {
    pub id: String,
    pub course_id: String,
    pub course_name: String,
    pub date: NaiveDate,
    pub period: String,
    pub order_index: i64,
    pub lesson: Option<String>,
    pub entry_type: String,
}

/// Projects the window's entries onto the fixed 3-period x 7-day x 2-slot
/// grid, keyed by period name. Cells without an entry are `{type:"empty"}`.
/// Entries carrying an unknown period or an out-of-range `order_index`
/// (possible in rows that predate write-time validation) are left out of the
/// grid rather than rejected.
pub fn project_grid(monday: NaiveDate, entries: &[WeekEntry]) -> serde_json::Value {
    let mut grid = serde_json::Map::new();
    for period in PERIODS {
        let days: Vec<serde_json::Value> = (0..7)
            .map(|_| {
                (0..SLOTS_PER_PERIOD)
                    .map(|_| json!({ "type": "empty" }))
                    .collect::<Vec<_>>()
                    .into()
            })
            .collect();
        grid.insert(period.to_string(), days.into());
    }

    for entry in entries {
        let day = (entry.date - monday).num_days();
        if !(0..7).contains(&day) {
            continue;
        }
        if !(0..SLOTS_PER_PERIOD).contains(&entry.order_index) {
            continue;
        }
        let Some(days) = grid.get_mut(&entry.period).and_then(|v| v.as_array_mut()) else {
            continue;
        };
        days[day as usize][entry.order_index as usize] = json!({
            "type": entry.entry_type,
            "entryId": entry.id,
            "courseId": entry.course_id,
            "courseName": entry.course_name,
            "date": entry.date.format("%Y-%m-%d").to_string(),
            "period": entry.period,
            "orderIndex": entry.order_index,
            "lesson": entry.lesson,
        });
    }

    grid.into()
}
