use async_trait::async_trait;
use casare_core::{AppResult, TenantId};
use casare_domain::{BlackoutPeriod, BusinessCalendar, BusinessCalendarId};

/// Repository port for business calendars and their blackout periods.
#[async_trait]
pub trait CalendarRepository: Send + Sync {
    /// Persists a newly created calendar.
    async fn create(&self, calendar: BusinessCalendar) -> AppResult<BusinessCalendar>;

    /// Returns a calendar by id.
    async fn find(&self, calendar_id: BusinessCalendarId) -> AppResult<Option<BusinessCalendar>>;

    /// Lists calendars for a tenant.
    async fn list(&self, tenant_id: TenantId) -> AppResult<Vec<BusinessCalendar>>;

    /// Adds a blackout period to a calendar.
    async fn add_blackout(&self, blackout: BlackoutPeriod) -> AppResult<BlackoutPeriod>;

    /// Lists blackout periods owned by a calendar.
    async fn list_blackouts(
        &self,
        calendar_id: BusinessCalendarId,
    ) -> AppResult<Vec<BlackoutPeriod>>;
}
