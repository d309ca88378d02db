use casare_core::{define_uuid_id, AppError, AppResult, NonEmptyString, TenantId};
use chrono::{DateTime, Datelike, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

define_uuid_id!(
    /// Identifier for a business calendar.
    BusinessCalendarId
);
define_uuid_id!(
    /// Identifier for a blackout period owned by a business calendar.
    BlackoutPeriodId
);

/// Policy applied to schedules outside a calendar's configured working
/// hours or on a weekend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutsideHoursPolicy {
    /// Suppress the fire entirely.
    Skip,
    /// Defer the fire to the next valid working instant.
    Defer,
    /// Fire anyway.
    Allow,
}

impl OutsideHoursPolicy {
    /// Returns a stable storage value for this policy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Defer => "defer",
            Self::Allow => "allow",
        }
    }

    /// Parses a stored policy value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "skip" => Ok(Self::Skip),
            "defer" => Ok(Self::Defer),
            "allow" => Ok(Self::Allow),
            other => Err(AppError::Validation(format!(
                "unknown outside-hours policy value '{other}'"
            ))),
        }
    }
}

/// Working-hours configuration for a single weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdayHours {
    /// Whether this weekday has working hours configured at all.
    pub enabled: bool,
    /// Start of the working window, local to the calendar's timezone.
    pub start: NaiveTime,
    /// End of the working window, local to the calendar's timezone.
    pub end: NaiveTime,
}

impl WeekdayHours {
    /// Creates validated working hours for a weekday.
    pub fn new(enabled: bool, start: NaiveTime, end: NaiveTime) -> AppResult<Self> {
        if enabled && end <= start {
            return Err(AppError::Validation(
                "weekday working hours end must be after start".to_owned(),
            ));
        }

        Ok(Self { enabled, start, end })
    }

    /// Returns `true` if `time` falls within this weekday's working
    /// window.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.enabled && time >= self.start && time < self.end
    }
}

/// A named window during which affected workflows may not fire, owned by a
/// `BusinessCalendar`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutPeriod {
    id: BlackoutPeriodId,
    calendar_id: BusinessCalendarId,
    name: NonEmptyString,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    recurring: bool,
    affected_workflows: Vec<crate::workflow::WorkflowId>,
}

impl BlackoutPeriod {
    /// Creates a new blackout period.
    ///
    /// Invariant: `end > start`.
    pub fn new(
        calendar_id: BusinessCalendarId,
        name: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        recurring: bool,
        affected_workflows: Vec<crate::workflow::WorkflowId>,
    ) -> AppResult<Self> {
        if end <= start {
            return Err(AppError::Validation(
                "blackout period end must be after start".to_owned(),
            ));
        }

        Ok(Self {
            id: BlackoutPeriodId::new(),
            calendar_id,
            name: NonEmptyString::new(name)?,
            start,
            end,
            recurring,
            affected_workflows,
        })
    }

    /// Reconstructs a blackout period from persisted fields without
    /// re-running creation-time validation (used by repository `FromRow`
    /// mappings).
    #[must_use]
    pub fn from_parts(
        id: BlackoutPeriodId,
        calendar_id: BusinessCalendarId,
        name: NonEmptyString,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        recurring: bool,
        affected_workflows: Vec<crate::workflow::WorkflowId>,
    ) -> Self {
        Self {
            id,
            calendar_id,
            name,
            start,
            end,
            recurring,
            affected_workflows,
        }
    }

    /// Returns the blackout period identifier.
    #[must_use]
    pub fn id(&self) -> BlackoutPeriodId {
        self.id
    }

    /// Returns the owning calendar.
    #[must_use]
    pub fn calendar_id(&self) -> BusinessCalendarId {
        self.calendar_id
    }

    /// Returns the blackout's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the start of the blackout window.
    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Returns the end of the blackout window.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns `true` if this blackout recurs on the same time-of-day
    /// every year rather than covering one absolute window.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        self.recurring
    }

    /// Returns the workflows this blackout affects, or an empty slice if
    /// it affects every workflow.
    #[must_use]
    pub fn affected_workflows(&self) -> &[crate::workflow::WorkflowId] {
        &self.affected_workflows
    }

    /// Returns `true` if `workflow_id` is affected by this blackout, which
    /// is the case either when the affected list is empty (meaning "all
    /// workflows") or `workflow_id` is explicitly listed.
    #[must_use]
    pub fn affects(&self, workflow_id: crate::workflow::WorkflowId) -> bool {
        self.affected_workflows.is_empty() || self.affected_workflows.contains(&workflow_id)
    }

    /// Returns `true` if `instant` falls within this blackout window,
    /// accounting for `recurring` by comparing only time-of-year when set.
    #[must_use]
    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        if self.recurring {
            let time_of_day = instant.time();
            time_of_day >= self.start.time() && time_of_day < self.end.time()
        } else {
            instant >= self.start && instant < self.end
        }
    }
}

/// Tenant-scoped calendar describing working hours, holidays, and blackout
/// windows that the schedule engine gates fires against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessCalendar {
    id: BusinessCalendarId,
    tenant_id: TenantId,
    name: NonEmptyString,
    timezone: String,
    weekday_hours: [WeekdayHours; 7],
    weekend_policy: OutsideHoursPolicy,
    outside_hours_policy: OutsideHoursPolicy,
    holidays: Vec<DateTime<Utc>>,
}

impl BusinessCalendar {
    /// Creates a new business calendar.
    pub fn new(
        tenant_id: TenantId,
        name: impl Into<String>,
        timezone: impl Into<String>,
        weekday_hours: [WeekdayHours; 7],
        weekend_policy: OutsideHoursPolicy,
        outside_hours_policy: OutsideHoursPolicy,
        holidays: Vec<DateTime<Utc>>,
    ) -> AppResult<Self> {
        let timezone = timezone.into();
        let _parsed: chrono_tz::Tz = timezone
            .parse()
            .map_err(|_| AppError::Validation(format!("invalid IANA timezone '{timezone}'")))?;

        Ok(Self {
            id: BusinessCalendarId::new(),
            tenant_id,
            name: NonEmptyString::new(name)?,
            timezone,
            weekday_hours,
            weekend_policy,
            outside_hours_policy,
            holidays,
        })
    }

    /// Reconstructs a calendar from persisted fields without re-running
    /// creation-time validation (used by repository `FromRow` mappings).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: BusinessCalendarId,
        tenant_id: TenantId,
        name: NonEmptyString,
        timezone: String,
        weekday_hours: [WeekdayHours; 7],
        weekend_policy: OutsideHoursPolicy,
        outside_hours_policy: OutsideHoursPolicy,
        holidays: Vec<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            name,
            timezone,
            weekday_hours,
            weekend_policy,
            outside_hours_policy,
            holidays,
        }
    }

    /// Returns the calendar identifier.
    #[must_use]
    pub fn id(&self) -> BusinessCalendarId {
        self.id
    }

    /// Returns the owning tenant.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the calendar's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the calendar's IANA timezone.
    #[must_use]
    pub fn timezone(&self) -> &str {
        self.timezone.as_str()
    }

    /// Returns the per-weekday working-hours configuration, indexed
    /// Monday (0) through Sunday (6).
    #[must_use]
    pub fn weekday_hours(&self) -> &[WeekdayHours; 7] {
        &self.weekday_hours
    }

    /// Returns the policy applied on weekend days.
    #[must_use]
    pub fn weekend_policy(&self) -> OutsideHoursPolicy {
        self.weekend_policy
    }

    /// Returns the policy applied outside configured working hours on a
    /// weekday.
    #[must_use]
    pub fn outside_hours_policy(&self) -> OutsideHoursPolicy {
        self.outside_hours_policy
    }

    /// Returns the configured holiday instants.
    #[must_use]
    pub fn holidays(&self) -> &[DateTime<Utc>] {
        &self.holidays
    }

    /// Returns `true` if `instant`, expressed in the calendar's local
    /// timezone, falls within configured working hours (weekday window,
    /// not a holiday).
    #[must_use]
    pub fn is_working_time(&self, instant: DateTime<Utc>) -> bool {
        let Ok(tz): Result<chrono_tz::Tz, _> = self.timezone.parse() else {
            return false;
        };
        let local = instant.with_timezone(&tz);

        if self
            .holidays
            .iter()
            .any(|holiday| holiday.with_timezone(&tz).date_naive() == local.date_naive())
        {
            return matches!(self.outside_hours_policy, OutsideHoursPolicy::Allow);
        }

        let weekday_index = local.date_naive().weekday().num_days_from_monday() as usize;
        let is_weekend = weekday_index >= 5;
        let hours = &self.weekday_hours[weekday_index];

        if is_weekend {
            return matches!(self.weekend_policy, OutsideHoursPolicy::Allow);
        }

        if hours.contains(local.time()) {
            return true;
        }

        matches!(self.outside_hours_policy, OutsideHoursPolicy::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::{BlackoutPeriod, BusinessCalendarId};
    use chrono::Utc;

    #[test]
    fn blackout_rejects_inverted_window() {
        let now = Utc::now();
        let result = BlackoutPeriod::new(
            BusinessCalendarId::new(),
            "maintenance",
            now,
            now - chrono::Duration::hours(1),
            false,
            vec![],
        );
        assert!(result.is_err());
    }

    #[test]
    fn blackout_with_empty_affected_list_covers_every_workflow() {
        let now = Utc::now();
        let blackout = BlackoutPeriod::new(
            BusinessCalendarId::new(),
            "maintenance",
            now - chrono::Duration::hours(1),
            now + chrono::Duration::hours(1),
            false,
            vec![],
        )
        .expect("valid blackout");
        assert!(blackout.affects(crate::workflow::WorkflowId::new()));
        assert!(blackout.covers(now));
    }
}
