use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::ApiResponse;

/// Domain objects named in user-facing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Master,
    Service,
    Appointment,
    User,
    Notification,
}

impl Entity {
    fn not_found_ru(self) -> &'static str {
        match self {
            Entity::Master => "Мастер не найден",
            Entity::Service => "Услуга не найдена",
            Entity::Appointment => "Запись не найдена",
            Entity::User => "Пользователь не найден",
            Entity::Notification => "Уведомление не найдено",
        }
    }
}

/// Reasons a request fails validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalid {
    /// A required field is missing or empty.
    Missing(&'static str),
    /// A field has the wrong format or range.
    Format(&'static str),
    DateInPast,
    MasterInactive,
    ServiceInactive,
    /// The master does not offer the requested service.
    ServiceNotOffered,
    /// The requested time falls outside the master's hours for that day.
    OutsideWorkingHours,
    StatusTransition { from: String, to: String },
    NotCancellable,
    ReviewWithoutVisit,
    /// Every completed visit with the master is already reviewed.
    AlreadyReviewed,
    /// The JSON body could not be read.
    Body,
    /// Query string or path parameters could not be parsed.
    Params,
}

impl Invalid {
    fn message_ru(&self) -> String {
        match self {
            Invalid::Missing(field) => format!("Не заполнено обязательное поле: {}", field),
            Invalid::Format(field) => format!("Неверный формат поля: {}", field),
            Invalid::DateInPast => "Нельзя записаться на прошедшее время".into(),
            Invalid::MasterInactive => "Мастер сейчас не принимает записи".into(),
            Invalid::ServiceInactive => "Услуга недоступна".into(),
            Invalid::ServiceNotOffered => "Мастер не оказывает эту услугу".into(),
            Invalid::OutsideWorkingHours => "Мастер не работает в это время".into(),
            Invalid::StatusTransition { from, to } => {
                format!("Нельзя изменить статус записи с {} на {}", from, to)
            }
            Invalid::NotCancellable => "Эту запись уже нельзя отменить".into(),
            Invalid::ReviewWithoutVisit => {
                "Отзыв можно оставить только после завершённого визита".into()
            }
            Invalid::AlreadyReviewed => "Вы уже оставили отзыв об этом визите".into(),
            Invalid::Body => "Некорректное тело запроса".into(),
            Invalid::Params => "Некорректные параметры запроса".into(),
        }
    }
}

/// Every failure a request handler can produce.
///
/// Messages are localized only when the error is turned into a response.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed: {0:?}")]
    Validation(Invalid),

    #[error("missing or invalid Telegram auth")]
    Unauthorized,

    #[error("admin access required")]
    Forbidden,

    #[error("{0:?} not found")]
    NotFound(Entity),

    #[error("time slot is already taken")]
    SlotTaken,

    #[error("{0:?} has active appointments")]
    HasActiveAppointments(Entity),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SlotTaken => StatusCode::CONFLICT,
            AppError::HasActiveAppointments(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message_ru(&self) -> String {
        match self {
            AppError::Validation(reason) => reason.message_ru(),
            AppError::Unauthorized => "Требуется авторизация через Telegram".into(),
            AppError::Forbidden => "Доступ запрещён".into(),
            AppError::NotFound(entity) => entity.not_found_ru().into(),
            AppError::SlotTaken => "Это время уже занято".into(),
            AppError::HasActiveAppointments(Entity::Master) => {
                "Нельзя удалить мастера с активными записями".into()
            }
            AppError::HasActiveAppointments(Entity::Service) => {
                "Нельзя удалить услугу с активными записями".into()
            }
            AppError::HasActiveAppointments(_) => "Есть активные записи".into(),
            AppError::Database(_) => "Внутренняя ошибка сервера".into(),
        }
    }
}

impl From<Invalid> for AppError {
    fn from(reason: Invalid) -> Self {
        AppError::Validation(reason)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("rejected JSON body: {}", rejection.body_text());
        AppError::Validation(Invalid::Body)
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!("rejected query: {}", rejection.body_text());
        AppError::Validation(Invalid::Params)
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!("rejected path: {}", rejection.body_text());
        AppError::Validation(Invalid::Params)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Database(e) = &self {
            tracing::error!("database error: {}", e);
        }
        let status = self.status();
        (status, Json(ApiResponse::<()>::error(self.message_ru()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Validation(Invalid::DateInPast).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::NotFound(Entity::Master).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::SlotTaken.status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::HasActiveAppointments(Entity::Service).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages_are_localized() {
        assert_eq!(
            AppError::NotFound(Entity::Service).message_ru(),
            "Услуга не найдена"
        );
        assert_eq!(
            AppError::from(Invalid::Missing("masterId")).message_ru(),
            "Не заполнено обязательное поле: masterId"
        );
        assert_eq!(
            AppError::HasActiveAppointments(Entity::Master).message_ru(),
            "Нельзя удалить мастера с активными записями"
        );
    }

    #[test]
    fn test_database_error_hides_details() {
        let msg = AppError::Database(sqlx::Error::PoolTimedOut).message_ru();
        assert_eq!(msg, "Внутренняя ошибка сервера");
    }
}
