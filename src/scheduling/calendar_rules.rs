use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::{HolidayStore, SchedulingError};

/// Why a date cannot be booked. Rules are checked in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DateRejection {
    Sunday,
    Holiday { name: String },
    PastDate,
}

impl fmt::Display for DateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateRejection::Sunday => write!(f, "Appointments cannot be scheduled on Sundays"),
            DateRejection::Holiday { name } => {
                write!(f, "Appointments cannot be scheduled on a holiday: {name}")
            }
            DateRejection::PastDate => write!(f, "Appointments cannot be scheduled in the past"),
        }
    }
}

pub struct CalendarRules {
    holidays: Arc<dyn HolidayStore>,
}

impl CalendarRules {
    pub fn new(holidays: Arc<dyn HolidayStore>) -> Self {
        Self { holidays }
    }

    /// `Ok(None)` when bookable. `today` is the current UTC date.
    pub async fn evaluate(
        &self,
        branch_id: Uuid,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Option<DateRejection>, SchedulingError> {
        if date.weekday() == Weekday::Sun {
            return Ok(Some(DateRejection::Sunday));
        }

        let holiday = self
            .holidays
            .find_applicable(branch_id, date)
            .await
            .map_err(SchedulingError::operation("checking holidays"))?
            .filter(|h| h.applies_to(branch_id, date));
        if let Some(h) = holiday {
            debug!(%branch_id, %date, holiday = %h.name, "date falls on a holiday");
            return Ok(Some(DateRejection::Holiday { name: h.name }));
        }

        if date < today {
            return Ok(Some(DateRejection::PastDate));
        }

        Ok(None)
    }

    pub async fn ensure_bookable(
        &self,
        branch_id: Uuid,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<(), SchedulingError> {
        match self.evaluate(branch_id, date, today).await? {
            None => Ok(()),
            Some(r) => Err(SchedulingError::DateNotBookable(r)),
        }
    }
}
