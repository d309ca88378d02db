//! Thin application-layer wrapper over business calendars and the
//! blackout periods attached to them. Calendars carry no tenant quota or
//! cross-aggregate invariant beyond what `casare_domain::calendar`
//! already validates in its constructors, so this service is a direct
//! pass-through to the repository port, kept only so handlers depend on
//! an application service rather than a port trait directly.

use std::sync::Arc;

use casare_core::{AppResult, TenantId};
use casare_domain::{BlackoutPeriod, BusinessCalendar, BusinessCalendarId};

use crate::ports::CalendarRepository;

/// Application service for business calendars and blackout periods.
#[derive(Clone)]
pub struct CalendarService {
    repository: Arc<dyn CalendarRepository>,
}

impl CalendarService {
    /// Creates a new calendar service.
    #[must_use]
    pub fn new(repository: Arc<dyn CalendarRepository>) -> Self {
        Self { repository }
    }

    /// Creates a new calendar.
    pub async fn create(&self, calendar: BusinessCalendar) -> AppResult<BusinessCalendar> {
        self.repository.create(calendar).await
    }

    /// Returns a calendar by id.
    pub async fn find(&self, calendar_id: BusinessCalendarId) -> AppResult<Option<BusinessCalendar>> {
        self.repository.find(calendar_id).await
    }

    /// Lists calendars for a tenant.
    pub async fn list(&self, tenant_id: TenantId) -> AppResult<Vec<BusinessCalendar>> {
        self.repository.list(tenant_id).await
    }

    /// Adds a blackout period to a calendar.
    pub async fn add_blackout(&self, blackout: BlackoutPeriod) -> AppResult<BlackoutPeriod> {
        self.repository.add_blackout(blackout).await
    }

    /// Lists the blackout periods attached to a calendar.
    pub async fn list_blackouts(&self, calendar_id: BusinessCalendarId) -> AppResult<Vec<BlackoutPeriod>> {
        self.repository.list_blackouts(calendar_id).await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use casare_core::{AppResult, TenantId};
    use casare_domain::{
        BlackoutPeriod, BusinessCalendar, BusinessCalendarId, OutsideHoursPolicy, WeekdayHours,
    };
    use chrono::{NaiveTime, Utc};
    use std::sync::Mutex;

    use super::*;

    struct StubCalendars {
        calendars: Mutex<Vec<BusinessCalendar>>,
        blackouts: Mutex<Vec<BlackoutPeriod>>,
    }

    #[async_trait]
    impl CalendarRepository for StubCalendars {
        async fn create(&self, calendar: BusinessCalendar) -> AppResult<BusinessCalendar> {
            self.calendars.lock().unwrap().push(calendar.clone());
            Ok(calendar)
        }

        async fn find(&self, calendar_id: BusinessCalendarId) -> AppResult<Option<BusinessCalendar>> {
            Ok(self
                .calendars
                .lock()
                .unwrap()
                .iter()
                .find(|calendar| calendar.id() == calendar_id)
                .cloned())
        }

        async fn list(&self, tenant_id: TenantId) -> AppResult<Vec<BusinessCalendar>> {
            Ok(self
                .calendars
                .lock()
                .unwrap()
                .iter()
                .filter(|calendar| calendar.tenant_id() == tenant_id)
                .cloned()
                .collect())
        }

        async fn add_blackout(&self, blackout: BlackoutPeriod) -> AppResult<BlackoutPeriod> {
            self.blackouts.lock().unwrap().push(blackout.clone());
            Ok(blackout)
        }

        async fn list_blackouts(&self, calendar_id: BusinessCalendarId) -> AppResult<Vec<BlackoutPeriod>> {
            Ok(self
                .blackouts
                .lock()
                .unwrap()
                .iter()
                .filter(|blackout| blackout.calendar_id() == calendar_id)
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn lists_only_blackouts_for_the_requested_calendar() {
        let repository = Arc::new(StubCalendars {
            calendars: Mutex::new(Vec::new()),
            blackouts: Mutex::new(Vec::new()),
        });
        let service = CalendarService::new(repository.clone());

        let working_day = WeekdayHours::new(
            true,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        )
        .unwrap();
        let weekend = WeekdayHours::new(false, NaiveTime::MIN, NaiveTime::MIN).unwrap();
        let weekday_hours = [working_day, working_day, working_day, working_day, working_day, weekend, weekend];

        let calendar = BusinessCalendar::new(
            TenantId::new(),
            "Default",
            "UTC",
            weekday_hours,
            OutsideHoursPolicy::Skip,
            OutsideHoursPolicy::Defer,
            Vec::new(),
        )
        .unwrap();
        service.create(calendar.clone()).await.unwrap();

        let now = Utc::now();
        let blackout = BlackoutPeriod::new(
            calendar.id(),
            "Maintenance",
            now,
            now + chrono::Duration::hours(1),
            false,
            Vec::new(),
        )
        .unwrap();
        service.add_blackout(blackout).await.unwrap();

        let found = service.list_blackouts(calendar.id()).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
