//! Free-slot computation for a master on a single day.
//!
//! A day's candidates start at the schedule's opening time and advance in
//! fixed 30-minute steps; a candidate is offered when the whole service fits
//! before closing time and it does not overlap any active appointment.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::Serialize;

use crate::models::{Appointment, MasterSchedule};

/// Cursor step between candidate start times (minutes).
pub const SLOT_STEP_MIN: i64 = 30;

/// Longest service duration accepted (minutes).
pub const MAX_DURATION_MIN: i64 = 24 * 60;

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    pub fn starting_at(start: NaiveDateTime, minutes: i64) -> Self {
        Self {
            start,
            end: start + TimeDelta::minutes(minutes),
        }
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Opening hours of one working day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingHours {
    /// `None` for a day off or a malformed row.
    pub fn from_schedule(schedule: &MasterSchedule) -> Option<Self> {
        if !schedule.is_working {
            return None;
        }
        let start = parse_hhmm(&schedule.start_time)?;
        let end = parse_hhmm(&schedule.end_time)?;
        (start < end).then_some(Self { start, end })
    }

    /// Whether `interval` lies within these hours on `date`.
    pub fn contains(&self, date: NaiveDate, interval: &Interval) -> bool {
        interval.start >= date.and_time(self.start) && interval.end <= date.and_time(self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub start_time: String,
    pub end_time: String,
    pub duration: i64,
}

/// Parse a strict "HH:MM" time.
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    if s.len() != 5 {
        return None;
    }
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

/// Schedule weekday index for a date: 0 = Sunday … 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> i64 {
    i64::from(date.weekday().num_days_from_sunday())
}

/// Window of appointment start times that can overlap `interval`.
pub fn overlap_search_window(interval: &Interval) -> Interval {
    Interval {
        start: interval.start - TimeDelta::minutes(MAX_DURATION_MIN),
        end: interval.end,
    }
}

/// Intervals occupied by active appointments.
pub fn occupied(appointments: &[Appointment]) -> Vec<Interval> {
    appointments
        .iter()
        .filter(|a| a.status.is_active())
        .map(|a| Interval::starting_at(a.appointment_date, a.duration))
        .collect()
}

pub fn overlaps_any(candidate: &Interval, busy: &[Interval]) -> bool {
    busy.iter().any(|b| candidate.overlaps(b))
}

/// Free slots of `duration_min` minutes on `date`.
///
/// Candidates starting before `not_before` are skipped (used for today).
pub fn generate_slots(
    date: NaiveDate,
    hours: WorkingHours,
    duration_min: i64,
    busy: &[Interval],
    not_before: Option<NaiveDateTime>,
) -> Vec<Slot> {
    let mut slots = Vec::new();
    if duration_min <= 0 {
        return slots;
    }

    let close = date.and_time(hours.end);
    let mut cursor = date.and_time(hours.start);

    while cursor < close {
        let candidate = Interval::starting_at(cursor, duration_min);
        if candidate.end > close {
            break;
        }

        let too_early = not_before.is_some_and(|limit| candidate.start < limit);
        if !too_early && !overlaps_any(&candidate, busy) {
            slots.push(Slot {
                start_time: candidate.start.format("%H:%M").to_string(),
                end_time: candidate.end.format("%H:%M").to_string(),
                duration: duration_min,
            });
        }

        cursor += TimeDelta::minutes(SLOT_STEP_MIN);
    }

    slots
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2099, 3, 2).unwrap()
    }

    fn at(hhmm: &str) -> NaiveDateTime {
        day().and_time(parse_hhmm(hhmm).unwrap())
    }

    fn hours(start: &str, end: &str) -> WorkingHours {
        WorkingHours {
            start: parse_hhmm(start).unwrap(),
            end: parse_hhmm(end).unwrap(),
        }
    }

    fn starts(slots: &[Slot]) -> Vec<&str> {
        slots.iter().map(|s| s.start_time.as_str()).collect()
    }

    fn schedule(start: &str, end: &str, working: bool) -> MasterSchedule {
        MasterSchedule {
            id: 1,
            master_id: 1,
            day_of_week: 1,
            start_time: start.into(),
            end_time: end.into(),
            is_working: working,
        }
    }

    fn appointment(start: &str, duration: i64, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: 1,
            user_id: 1,
            master_id: 1,
            service_id: 1,
            appointment_date: at(start),
            duration,
            status,
            total_price: 0,
            notes: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_full_day_first_and_last_slot() {
        let slots = generate_slots(day(), hours("09:00", "18:00"), 60, &[], None);
        assert_eq!(slots.first().unwrap().start_time, "09:00");
        assert_eq!(slots.last().unwrap().start_time, "17:00");
        assert_eq!(slots.last().unwrap().end_time, "18:00");
        assert_eq!(slots.len(), 17);
        assert!(slots.iter().all(|s| s.duration == 60));
    }

    #[test]
    fn test_overlapping_slots_excluded() {
        let busy = occupied(&[appointment("10:00", 60, AppointmentStatus::Confirmed)]);
        let slots = generate_slots(day(), hours("09:00", "18:00"), 60, &busy, None);
        let s = starts(&slots);

        assert!(s.contains(&"09:00"));
        assert!(!s.contains(&"09:30"));
        assert!(!s.contains(&"10:00"));
        assert!(!s.contains(&"10:30"));
        assert!(s.contains(&"11:00"));
        assert_eq!(slots.len(), 14);
    }

    #[test]
    fn test_existing_appointment_uses_its_own_duration() {
        // A 120-minute booking blocks until 12:00 even for a 30-minute service.
        let busy = occupied(&[appointment("10:00", 120, AppointmentStatus::Pending)]);
        let slots = generate_slots(day(), hours("09:00", "13:00"), 30, &busy, None);
        assert_eq!(starts(&slots), vec!["09:00", "09:30", "12:00", "12:30"]);
    }

    #[test]
    fn test_cancelled_and_completed_do_not_block() {
        let busy = occupied(&[
            appointment("10:00", 60, AppointmentStatus::Cancelled),
            appointment("11:00", 60, AppointmentStatus::Completed),
        ]);
        assert!(busy.is_empty());
        let slots = generate_slots(day(), hours("10:00", "12:00"), 60, &busy, None);
        assert_eq!(starts(&slots), vec!["10:00", "10:30", "11:00"]);
    }

    #[test]
    fn test_service_longer_than_day() {
        let slots = generate_slots(day(), hours("09:00", "10:00"), 90, &[], None);
        assert!(slots.is_empty());
    }

    #[test]
    fn test_odd_duration_must_fit_before_close() {
        let slots = generate_slots(day(), hours("09:00", "11:00"), 45, &[], None);
        assert_eq!(starts(&slots), vec!["09:00", "09:30", "10:00"]);
        assert_eq!(slots[2].end_time, "10:45");
    }

    #[test]
    fn test_not_before_skips_past_candidates() {
        let slots = generate_slots(
            day(),
            hours("09:00", "12:00"),
            60,
            &[],
            Some(at("10:10")),
        );
        assert_eq!(starts(&slots), vec!["10:30", "11:00"]);
    }

    #[test]
    fn test_zero_duration_yields_nothing() {
        assert!(generate_slots(day(), hours("09:00", "18:00"), 0, &[], None).is_empty());
    }

    #[test]
    fn test_touching_intervals_do_not_overlap() {
        let a = Interval::starting_at(at("10:00"), 60);
        let b = Interval::starting_at(at("11:00"), 30);
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
        let c = Interval::starting_at(at("10:59"), 30);
        assert!(a.overlaps(&c));
    }

    #[test]
    fn test_working_hours_from_schedule() {
        assert_eq!(
            WorkingHours::from_schedule(&schedule("09:00", "18:00", true)),
            Some(hours("09:00", "18:00"))
        );
        assert_eq!(WorkingHours::from_schedule(&schedule("09:00", "18:00", false)), None);
        assert_eq!(WorkingHours::from_schedule(&schedule("18:00", "09:00", true)), None);
        assert_eq!(WorkingHours::from_schedule(&schedule("9:00", "18:00", true)), None);
    }

    #[test]
    fn test_parse_hhmm() {
        assert!(parse_hhmm("00:00").is_some());
        assert!(parse_hhmm("23:59").is_some());
        assert!(parse_hhmm("24:00").is_none());
        assert!(parse_hhmm("12:60").is_none());
        assert!(parse_hhmm("garbage").is_none());
    }

    #[test]
    fn test_weekday_index_sunday_is_zero() {
        assert_eq!(weekday_index(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()), 0);
        assert_eq!(weekday_index(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()), 1);
        assert_eq!(weekday_index(NaiveDate::from_ymd_opt(2026, 10, 24).unwrap()), 6);
    }

    #[test]
    fn test_previous_day_booking_blocks_early_slots() {
        // 23:30 the day before with 120 minutes runs until 01:30.
        let mut late = appointment("23:30", 120, AppointmentStatus::Confirmed);
        late.appointment_date -= TimeDelta::days(1);
        let busy = occupied(&[late]);
        let slots = generate_slots(day(), hours("00:00", "03:00"), 60, &busy, None);
        assert_eq!(starts(&slots), vec!["01:30", "02:00"]);
    }

    #[test]
    fn test_search_window_reaches_back_one_max_duration() {
        let wanted = Interval::starting_at(at("00:00"), 60);
        let window = overlap_search_window(&wanted);
        assert_eq!(window.start, at("00:00") - TimeDelta::days(1));
        assert_eq!(window.end, at("01:00"));
    }

    #[test]
    fn test_working_hours_contains() {
        let h = hours("09:00", "18:00");
        assert!(h.contains(day(), &Interval::starting_at(at("09:00"), 60)));
        assert!(h.contains(day(), &Interval::starting_at(at("17:00"), 60)));
        assert!(!h.contains(day(), &Interval::starting_at(at("17:30"), 60)));
        assert!(!h.contains(day(), &Interval::starting_at(at("08:30"), 60)));
    }
}
