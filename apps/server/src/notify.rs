//! Appointment notifications: stored in-app rows plus Telegram messages.
//!
//! Telegram sends are spawned; only the database write can fail a request.

use chrono::NaiveDateTime;

use crate::{
    db::notifications, error::AppResult, models::AppointmentDetail, telegram::escape_html,
    AppState,
};

pub fn format_when(at: NaiveDateTime) -> String {
    at.format("%d.%m.%Y %H:%M").to_string()
}

fn format_price(kopecks: i64) -> String {
    if kopecks % 100 == 0 {
        format!("{} ₽", kopecks / 100)
    } else {
        format!("{}.{:02} ₽", kopecks / 100, kopecks % 100)
    }
}

fn client_label(a: &AppointmentDetail) -> String {
    match &a.client_username {
        Some(username) => format!(
            "{} (@{})",
            escape_html(&a.client_first_name),
            escape_html(username)
        ),
        None => escape_html(&a.client_first_name),
    }
}

/// New booking: confirmation for the client, alert for the owner.
pub async fn appointment_created(state: &AppState, a: &AppointmentDetail) -> AppResult<()> {
    let message = format!(
        "Вы записаны на «{}» к мастеру {} на {}. Ожидайте подтверждения.",
        a.service_name,
        a.master_name,
        format_when(a.appointment_date)
    );
    notifications::insert(
        &state.db,
        a.user_id,
        Some(a.id),
        notifications::KIND_CREATED,
        &message,
    )
    .await?;

    let alert = format!(
        "\u{1f4c5} <b>Новая запись #{}</b>\n\
         Клиент: {}\n\
         Услуга: {}\n\
         Мастер: {}\n\
         Время: {}\n\
         Стоимость: {}",
        a.id,
        client_label(a),
        escape_html(&a.service_name),
        escape_html(&a.master_name),
        format_when(a.appointment_date),
        format_price(a.total_price)
    );
    state.telegram.spawn_message(state.config.admin_tg_id, alert);
    Ok(())
}

/// Client cancelled their own booking.
pub async fn appointment_cancelled(state: &AppState, a: &AppointmentDetail) -> AppResult<()> {
    let message = format!(
        "Запись на «{}» {} отменена.",
        a.service_name,
        format_when(a.appointment_date)
    );
    notifications::insert(
        &state.db,
        a.user_id,
        Some(a.id),
        notifications::KIND_CANCELLED,
        &message,
    )
    .await?;

    let alert = format!(
        "\u{274c} <b>Отмена записи #{}</b>\n\
         Клиент: {}\n\
         Мастер: {}\n\
         Время: {}",
        a.id,
        client_label(a),
        escape_html(&a.master_name),
        format_when(a.appointment_date)
    );
    state.telegram.spawn_message(state.config.admin_tg_id, alert);
    Ok(())
}

/// Admin changed the status; the client is told in-app and in Telegram.
pub async fn status_changed(state: &AppState, a: &AppointmentDetail) -> AppResult<()> {
    let message = format!(
        "Ваша запись на «{}» {} {}.",
        a.service_name,
        format_when(a.appointment_date),
        a.status.label_ru()
    );
    notifications::insert(
        &state.db,
        a.user_id,
        Some(a.id),
        notifications::KIND_STATUS,
        &message,
    )
    .await?;

    state
        .telegram
        .spawn_message(a.client_telegram_id, escape_html(&message));
    Ok(())
}
