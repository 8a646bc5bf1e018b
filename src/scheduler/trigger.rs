use std::time::Duration;

use crate::errors::AppError;
use crate::models::{ScheduleParams, ScheduleType};

/// Interval used when an interval schedule specifies no duration at all.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

/// Zero-based day-of-week names, Monday first, matching the persisted
/// `day_of_week` convention.
const DAY_NAMES: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// A live trigger is either a six-field cron expression
/// (sec min hour day month weekday) or a fixed repeat interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerSpec {
    Cron(String),
    Every(Duration),
}

fn check_time(hour: u32, minute: u32) -> Result<(), AppError> {
    if hour > 23 {
        return Err(AppError::Scheduling(format!("hour {hour} out of range")));
    }
    if minute > 59 {
        return Err(AppError::Scheduling(format!("minute {minute} out of range")));
    }
    Ok(())
}

/// Builds the trigger for a schedule definition. Defaults: daily 00:00,
/// weekly Monday 00:00, monthly on the 1st at 00:00, interval one hour when
/// every component is zero.
pub fn build_trigger(
    schedule_type: ScheduleType,
    params: &ScheduleParams,
) -> Result<TriggerSpec, AppError> {
    match schedule_type {
        ScheduleType::Daily => {
            let hour = params.hour.unwrap_or(0);
            let minute = params.minute.unwrap_or(0);
            check_time(hour, minute)?;
            Ok(TriggerSpec::Cron(format!("0 {minute} {hour} * * *")))
        }
        ScheduleType::Weekly => {
            let day_of_week = params.day_of_week.unwrap_or(0);
            let hour = params.hour.unwrap_or(0);
            let minute = params.minute.unwrap_or(0);
            check_time(hour, minute)?;
            let day = DAY_NAMES
                .get(day_of_week as usize)
                .ok_or_else(|| AppError::Scheduling(format!("day_of_week {day_of_week} out of range")))?;
            Ok(TriggerSpec::Cron(format!("0 {minute} {hour} * * {day}")))
        }
        ScheduleType::Monthly => {
            let day = params.day.unwrap_or(1);
            let hour = params.hour.unwrap_or(0);
            let minute = params.minute.unwrap_or(0);
            check_time(hour, minute)?;
            if !(1..=31).contains(&day) {
                return Err(AppError::Scheduling(format!("day {day} out of range")));
            }
            Ok(TriggerSpec::Cron(format!("0 {minute} {hour} {day} * *")))
        }
        ScheduleType::Interval => {
            let seconds = params.hours.unwrap_or(0) * 3600
                + params.minutes.unwrap_or(0) * 60
                + params.seconds.unwrap_or(0);
            if seconds == 0 {
                return Ok(TriggerSpec::Every(DEFAULT_INTERVAL));
            }
            Ok(TriggerSpec::Every(Duration::from_secs(seconds)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_defaults_to_midnight() {
        let trigger = build_trigger(ScheduleType::Daily, &ScheduleParams::default()).unwrap();
        assert_eq!(trigger, TriggerSpec::Cron("0 0 0 * * *".into()));
    }

    #[test]
    fn daily_honours_hour_and_minute() {
        let params = ScheduleParams {
            hour: Some(17),
            minute: Some(30),
            ..Default::default()
        };
        let trigger = build_trigger(ScheduleType::Daily, &params).unwrap();
        assert_eq!(trigger, TriggerSpec::Cron("0 30 17 * * *".into()));
    }

    #[test]
    fn weekly_defaults_to_monday_midnight() {
        let trigger = build_trigger(ScheduleType::Weekly, &ScheduleParams::default()).unwrap();
        assert_eq!(trigger, TriggerSpec::Cron("0 0 0 * * MON".into()));
    }

    #[test]
    fn weekly_day_of_week_is_monday_based() {
        let params = ScheduleParams {
            day_of_week: Some(6),
            ..Default::default()
        };
        let trigger = build_trigger(ScheduleType::Weekly, &params).unwrap();
        assert_eq!(trigger, TriggerSpec::Cron("0 0 0 * * SUN".into()));
    }

    #[test]
    fn monthly_defaults_to_first_of_month() {
        let trigger = build_trigger(ScheduleType::Monthly, &ScheduleParams::default()).unwrap();
        assert_eq!(trigger, TriggerSpec::Cron("0 0 0 1 * *".into()));
    }

    #[test]
    fn interval_sums_components() {
        let params = ScheduleParams {
            hours: Some(1),
            minutes: Some(30),
            seconds: Some(15),
            ..Default::default()
        };
        let trigger = build_trigger(ScheduleType::Interval, &params).unwrap();
        assert_eq!(trigger, TriggerSpec::Every(Duration::from_secs(5415)));
    }

    #[test]
    fn zero_interval_defaults_to_one_hour() {
        let params = ScheduleParams {
            hours: Some(0),
            minutes: Some(0),
            seconds: Some(0),
            ..Default::default()
        };
        let trigger = build_trigger(ScheduleType::Interval, &params).unwrap();
        assert_eq!(trigger, TriggerSpec::Every(DEFAULT_INTERVAL));
    }

    #[test]
    fn out_of_range_params_are_scheduling_errors() {
        let params = ScheduleParams {
            hour: Some(24),
            ..Default::default()
        };
        assert!(matches!(
            build_trigger(ScheduleType::Daily, &params),
            Err(AppError::Scheduling(_))
        ));

        let params = ScheduleParams {
            day_of_week: Some(7),
            ..Default::default()
        };
        assert!(matches!(
            build_trigger(ScheduleType::Weekly, &params),
            Err(AppError::Scheduling(_))
        ));

        let params = ScheduleParams {
            day: Some(32),
            ..Default::default()
        };
        assert!(matches!(
            build_trigger(ScheduleType::Monthly, &params),
            Err(AppError::Scheduling(_))
        ));
    }
}
