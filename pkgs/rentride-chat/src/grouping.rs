//! Calendar-day grouping of a conversation log for display

use chrono::{Local, NaiveDate, TimeZone};

use crate::models::LogEntry;

#[derive(Debug, Clone, PartialEq)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub entries: Vec<LogEntry>,
}

/// Group `entries` by calendar day in `tz`
///
/// Groups appear in order of their first entry; entries keep log order.
pub fn group_by_day<Tz: TimeZone>(entries: &[LogEntry], tz: &Tz) -> Vec<DayGroup> {
    let mut groups: Vec<DayGroup> = Vec::new();
    for entry in entries {
        let date = entry.created_at.with_timezone(tz).date_naive();
        match groups.iter_mut().find(|g| g.date == date) {
            Some(group) => group.entries.push(entry.clone()),
            None => groups.push(DayGroup {
                date,
                entries: vec![entry.clone()],
            }),
        }
    }
    groups
}

pub fn group_by_local_day(entries: &[LogEntry]) -> Vec<DayGroup> {
    group_by_day(entries, &Local)
}
