use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ── Enums ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Some(AppointmentStatus::Pending),
            "CONFIRMED" => Some(AppointmentStatus::Confirmed),
            "COMPLETED" => Some(AppointmentStatus::Completed),
            "CANCELLED" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }

    /// PENDING and CONFIRMED appointments occupy the master's time.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed
        )
    }

    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
        )
    }

    pub fn label_ru(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "ожидает подтверждения",
            AppointmentStatus::Confirmed => "подтверждена",
            AppointmentStatus::Completed => "завершена",
            AppointmentStatus::Cancelled => "отменена",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminRole {
    Admin,
    SuperAdmin,
}

// ── Database models ──

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Master {
    pub id: i64,
    pub name: String,
    pub specialization: String,
    pub description: String,
    pub experience: i64,
    pub rating: f64,
    pub photo_url: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Minor currency units (kopecks).
    pub price: i64,
    /// Minutes.
    pub duration: i64,
    pub category: String,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MasterSchedule {
    pub id: i64,
    pub master_id: i64,
    /// 0 = Sunday … 6 = Saturday.
    pub day_of_week: i64,
    pub start_time: String,
    pub end_time: String,
    pub is_working: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: i64,
    pub user_id: i64,
    pub master_id: i64,
    pub service_id: i64,
    /// Salon wall-clock time.
    pub appointment_date: NaiveDateTime,
    pub duration: i64,
    pub status: AppointmentStatus,
    pub total_price: i64,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Appointment joined with master, service and client names.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDetail {
    pub id: i64,
    pub user_id: i64,
    pub master_id: i64,
    pub master_name: String,
    pub service_id: i64,
    pub service_name: String,
    pub appointment_date: NaiveDateTime,
    pub duration: i64,
    pub status: AppointmentStatus,
    pub total_price: i64,
    pub notes: Option<String>,
    pub client_telegram_id: i64,
    pub client_first_name: String,
    pub client_username: Option<String>,
    pub client_phone: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub id: i64,
    pub telegram_id: i64,
    pub role: AdminRole,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: i64,
    pub user_id: i64,
    pub master_id: i64,
    pub appointment_id: Option<i64>,
    pub rating: i64,
    pub comment: Option<String>,
    pub author_name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub appointment_id: Option<i64>,
    pub kind: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
}

// ── API request/response types ──

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterWithDetails {
    #[serde(flatten)]
    pub master: Master,
    pub services: Vec<Service>,
    pub schedule: Vec<MasterSchedule>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceWithMasters {
    #[serde(flatten)]
    pub service: Service,
    pub masters: Vec<Master>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MastersQuery {
    pub service_id: Option<i64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesQuery {
    pub category: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Raw strings so malformed values map to a localized 400.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableSlotsQuery {
    pub master_id: Option<String>,
    pub service_id: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentsQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAppointmentsQuery {
    pub status: Option<String>,
    pub date: Option<String>,
    pub master_id: Option<i64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    pub master_id: Option<i64>,
    pub service_id: Option<i64>,
    pub appointment_date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub master_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMasterRequest {
    pub name: String,
    pub specialization: Option<String>,
    pub description: Option<String>,
    pub experience: Option<i64>,
    pub photo_url: Option<String>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub service_ids: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMasterRequest {
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub description: Option<String>,
    pub experience: Option<i64>,
    pub photo_url: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMasterServicesRequest {
    pub service_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDay {
    pub day_of_week: i64,
    pub start_time: String,
    pub end_time: String,
    #[serde(default = "default_true")]
    pub is_working: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SetScheduleRequest {
    pub days: Vec<ScheduleDay>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub duration: i64,
    pub category: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub duration: Option<i64>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub today_appointments: i64,
    pub pending_appointments: i64,
    pub upcoming_confirmed: i64,
    pub total_users: i64,
    pub active_masters: i64,
    pub active_services: i64,
    pub month_revenue: i64,
    pub recent_appointments: Vec<AppointmentDetail>,
}

// ── Envelope ──

/// Page request resolved from `page`/`limit` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    pub fn with_total(&self, total: i64) -> Pagination {
        let limit = i64::from(self.limit);
        Pagination {
            page: self.page,
            limit: self.limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            pagination: None,
        }
    }

    pub fn paginated(data: T, pagination: Pagination) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            pagination: Some(pagination),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
            pagination: None,
        }
    }
}

// ── Telegram auth ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use AppointmentStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Confirmed));
    }

    #[test]
    fn test_status_parse_case_insensitive() {
        assert_eq!(
            AppointmentStatus::parse("confirmed"),
            Some(AppointmentStatus::Confirmed)
        );
        assert_eq!(AppointmentStatus::parse("DONE"), None);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&AppointmentStatus::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
    }

    #[test]
    fn test_page_request_defaults_and_clamps() {
        let p = PageRequest::new(None, None);
        assert_eq!(p, PageRequest { page: 1, limit: 20 });
        let p = PageRequest::new(Some(0), Some(1000));
        assert_eq!(p, PageRequest { page: 1, limit: 100 });
        assert_eq!(PageRequest::new(Some(3), Some(10)).offset(), 20);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let p = PageRequest::new(Some(1), Some(20));
        assert_eq!(p.with_total(0).total_pages, 0);
        assert_eq!(p.with_total(20).total_pages, 1);
        assert_eq!(p.with_total(21).total_pages, 2);
    }

    #[test]
    fn test_envelope_skips_empty_fields() {
        let json = serde_json::to_value(ApiResponse::success(1)).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "data": 1 }));
        let json = serde_json::to_value(ApiResponse::<()>::error("x")).unwrap();
        assert_eq!(json, serde_json::json!({ "success": false, "error": "x" }));
    }
}
