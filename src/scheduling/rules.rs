//! Booking and registration rules.
//!
//! Every check returns the message the portal shows to the user. Handlers
//! turn a [`RuleViolation`] into a 400 response unchanged.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorResponse};
use crate::models::{Room, UnitSettings, User};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleViolation {
    pub message: String,
    pub code: &'static str,
}

impl RuleViolation {
    fn new(message: impl Into<String>, code: &'static str) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

impl From<RuleViolation> for ApiErrorResponse {
    fn from(v: RuleViolation) -> Self {
        ApiError::bad_request(v.message, v.code)
    }
}

pub type RuleResult<T> = Result<T, RuleViolation>;

/// The scheduling part of a booking form, common to equipment and rooms.
#[derive(Debug, Clone)]
pub struct BookingDraft<'a> {
    pub unit: &'a str,
    pub totvs_number: &'a str,
    /// Required for equipment; rooms use the room name instead.
    pub local: Option<&'a str>,
    pub date: Option<NaiveDate>,
    /// 0 = Sunday.
    pub day_of_week: Option<i16>,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
    pub is_recurring: bool,
    pub term_accepted: bool,
}

/// When the booking happens: a single date or a weekly slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    Once(NaiveDate),
    Weekly(i16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckedWindow {
    pub occurrence: Occurrence,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn required_fields(draft: &BookingDraft<'_>, needs_local: bool) -> RuleResult<CheckedWindow> {
    let base_missing = blank(draft.unit)
        || blank(draft.totvs_number)
        || (needs_local && draft.local.is_none_or(blank))
        || draft.start.is_none()
        || draft.end.is_none();

    let occurrence = if draft.is_recurring {
        match draft.day_of_week {
            Some(d) if !base_missing && (0..=6).contains(&d) => Occurrence::Weekly(d),
            _ => {
                return Err(RuleViolation::new(
                    "Por favor, preencha todos os campos obrigatórios para o agendamento fixo.",
                    "MISSING_FIELDS",
                ))
            }
        }
    } else {
        match draft.date {
            Some(d) if !base_missing => Occurrence::Once(d),
            _ => {
                return Err(RuleViolation::new(
                    "Por favor, preencha todos os campos obrigatórios.",
                    "MISSING_FIELDS",
                ))
            }
        }
    };

    // Both are Some after the checks above.
    let (Some(start), Some(end)) = (draft.start, draft.end) else {
        return Err(RuleViolation::new(
            "Por favor, preencha todos os campos obrigatórios.",
            "MISSING_FIELDS",
        ));
    };

    Ok(CheckedWindow {
        occurrence,
        start,
        end,
    })
}

/// A teacher may create weekly bookings in a unit listed in
/// `recurring_booking_units`, or anywhere when `recurring_booking_enabled`.
pub fn check_recurring_authorization(user: &User, unit: &str) -> RuleResult<()> {
    if user.recurring_booking_enabled || user.recurring_booking_units.iter().any(|u| u == unit) {
        Ok(())
    } else {
        Err(RuleViolation::new(
            format!("A unidade {unit} não autorizou agendamentos fixos para seu usuário."),
            "RECURRING_NOT_AUTHORIZED",
        ))
    }
}

fn check_order(start: NaiveTime, end: NaiveTime) -> RuleResult<()> {
    if end <= start {
        return Err(RuleViolation::new(
            "A hora de término deve ser posterior à hora de início.",
            "INVALID_TIME_RANGE",
        ));
    }
    Ok(())
}

fn check_membership(user: &User, unit: &str) -> RuleResult<()> {
    if !user.belongs_to_unit(unit) {
        return Err(RuleViolation::new(
            "Você não está vinculado a esta unidade.",
            "UNIT_NOT_LINKED",
        ));
    }
    Ok(())
}

fn check_term(accepted: bool) -> RuleResult<()> {
    if !accepted {
        return Err(RuleViolation::new(
            "Você precisa aceitar os termos para confirmar o agendamento.",
            "TERM_NOT_ACCEPTED",
        ));
    }
    Ok(())
}

/// Whole hours between `now` and `start`, truncated toward zero.
fn whole_hours_until(start: NaiveDateTime, now: NaiveDateTime) -> i64 {
    (start - now).num_hours()
}

/// Validates an equipment booking. `lines` holds the requested quantity per
/// equipment item; `now` is local wall time.
pub fn check_equipment_booking(
    draft: &BookingDraft<'_>,
    user: &User,
    settings: &UnitSettings,
    lines: &[i32],
    now: NaiveDateTime,
) -> RuleResult<CheckedWindow> {
    let window = required_fields(draft, true)?;

    if draft.is_recurring {
        check_recurring_authorization(user, draft.unit)?;
    }

    if let Occurrence::Once(date) = window.occurrence {
        if date < now.date() {
            return Err(RuleViolation::new(
                "Não é possível agendar para datas passadas.",
                "DATE_IN_PAST",
            ));
        }
    }

    check_order(window.start, window.end)?;

    if let Occurrence::Once(date) = window.occurrence {
        if settings.min_advance_time_enabled
            && whole_hours_until(date.and_time(window.start), now)
                < i64::from(settings.min_advance_time_hours)
        {
            return Err(RuleViolation::new(
                format!(
                    "É necessário agendar com no mínimo {} horas de antecedência. Por favor, escolha outro horário.",
                    settings.min_advance_time_hours
                ),
                "MIN_ADVANCE_TIME",
            ));
        }
    }

    if lines.is_empty() {
        return Err(RuleViolation::new(
            "Selecione pelo menos um equipamento.",
            "NO_EQUIPMENT",
        ));
    }
    if lines.iter().any(|q| *q < 1) {
        return Err(RuleViolation::new(
            "A quantidade de cada equipamento deve ser pelo menos 1.",
            "INVALID_QUANTITY",
        ));
    }

    check_term(draft.term_accepted)?;
    check_membership(user, draft.unit)?;

    Ok(window)
}

/// Validates a room booking against the unit settings and the room's own
/// opening hours and weekdays.
pub fn check_room_booking(
    draft: &BookingDraft<'_>,
    user: &User,
    settings: &UnitSettings,
    room: &Room,
    now: NaiveDateTime,
) -> RuleResult<CheckedWindow> {
    let window = required_fields(draft, false)?;

    if draft.is_recurring {
        check_recurring_authorization(user, draft.unit)?;
    }

    if let Occurrence::Once(date) = window.occurrence {
        let starts_at = date.and_time(window.start);
        // Without an advance rule a booking for the current minute is fine.
        let cutoff = if settings.room_min_advance_time_enabled {
            now
        } else {
            now.with_second(0)
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(now)
        };
        if starts_at < cutoff {
            return Err(RuleViolation::new(
                "Não é possível realizar agendamentos para horários que já passaram.",
                "TIME_IN_PAST",
            ));
        }
    }

    check_order(window.start, window.end)?;

    if let Occurrence::Once(date) = window.occurrence {
        if settings.room_min_advance_time_enabled
            && whole_hours_until(date.and_time(window.start), now)
                < i64::from(settings.room_min_advance_time_hours)
        {
            return Err(RuleViolation::new(
                format!(
                    "É necessário agendar salas com no mínimo {} horas de antecedência. Por favor, escolha outro horário.",
                    settings.room_min_advance_time_hours
                ),
                "MIN_ADVANCE_TIME",
            ));
        }
    }

    if window.start < room.min_time || window.end > room.max_time {
        return Err(RuleViolation::new(
            format!(
                "O horário deve estar entre {} e {}.",
                room.min_time.format("%H:%M"),
                room.max_time.format("%H:%M")
            ),
            "OUTSIDE_ROOM_HOURS",
        ));
    }

    let weekday = match window.occurrence {
        Occurrence::Once(date) => date.weekday().num_days_from_sunday() as i32,
        Occurrence::Weekly(d) => i32::from(d),
    };
    if !room.available_days.is_empty() && !room.available_days.contains(&weekday) {
        return Err(RuleViolation::new(
            "A sala não está disponível neste dia da semana.",
            "ROOM_DAY_UNAVAILABLE",
        ));
    }

    check_term(draft.term_accepted)?;
    check_membership(user, draft.unit)?;

    Ok(window)
}

/// True once the booking's end has passed.
pub fn is_expired(date: NaiveDate, end_time: NaiveTime, now: NaiveDateTime) -> bool {
    date.and_time(end_time) < now
}

pub mod status {
    pub const ACTIVE: &str = "active";
    pub const CLOSED: &str = "encerrado";
    pub const CANCELLED: &str = "cancelled";
    pub const CANCELLED_BY_USER: &str = "cancelled_by_user";
    pub const ROOM_CONFIRMED: &str = "confirmed";
    pub const LOAN_ACTIVE: &str = "active";
    pub const LOAN_RETURNED: &str = "returned";
}

/// What a booking looks like to the user right now, taking the clock into
/// account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    Active,
    Closed,
    Cancelled,
    CancelledByUser,
}

impl EffectiveStatus {
    pub fn of(stored: &str, date: NaiveDate, end_time: NaiveTime, now: NaiveDateTime) -> Self {
        match stored {
            status::CANCELLED => Self::Cancelled,
            status::CANCELLED_BY_USER => Self::CancelledByUser,
            status::CLOSED => Self::Closed,
            _ if is_expired(date, end_time, now) => Self::Closed,
            _ => Self::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Closed,
    Cancelled,
}

impl StatusFilter {
    pub fn matches(&self, status: EffectiveStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => status == EffectiveStatus::Active,
            StatusFilter::Closed => status == EffectiveStatus::Closed,
            StatusFilter::Cancelled => matches!(
                status,
                EffectiveStatus::Cancelled | EffectiveStatus::CancelledByUser
            ),
        }
    }
}

/// Time-of-day buckets used by the admin filters, matched on start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Morning,
    Afternoon,
    Night,
}

impl Period {
    pub fn bounds(&self) -> (NaiveTime, NaiveTime) {
        let t = |h, m, s| NaiveTime::from_hms_opt(h, m, s).unwrap_or(NaiveTime::MIN);
        match self {
            Period::Morning => (t(7, 0, 0), t(12, 0, 59)),
            Period::Afternoon => (t(12, 1, 0), t(18, 0, 59)),
            Period::Night => (t(18, 1, 0), t(23, 59, 59)),
        }
    }

    pub fn contains(&self, start: NaiveTime) -> bool {
        let (from, to) = self.bounds();
        start >= from && start <= to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceFilter {
    Recurring,
    Normal,
}

/// The sign-up form as typed by the teacher.
#[derive(Debug, Clone, Default)]
pub struct Registration<'a> {
    pub full_name: &'a str,
    pub totvs_number: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub confirm_password: &'a str,
    pub units: &'a [String],
}

pub const MIN_PASSWORD_CHARS: usize = 8;

pub fn check_registration(form: &Registration<'_>, institutional_domain: &str) -> RuleResult<()> {
    if [
        form.full_name,
        form.totvs_number,
        form.email,
        form.password,
        form.confirm_password,
    ]
    .iter()
    .any(|f| blank(f))
    {
        return Err(RuleViolation::new(
            "Por favor, preencha todos os campos obrigatórios.",
            "MISSING_FIELDS",
        ));
    }

    if form.units.iter().all(|u| blank(u)) {
        return Err(RuleViolation::new(
            "Selecione pelo menos uma unidade onde você trabalha.",
            "NO_UNITS",
        ));
    }

    if form.password != form.confirm_password {
        return Err(RuleViolation::new(
            "As senhas não coincidem.",
            "PASSWORD_MISMATCH",
        ));
    }

    if form.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(RuleViolation::new(
            format!("A senha deve ter no mínimo {MIN_PASSWORD_CHARS} caracteres."),
            "PASSWORD_TOO_SHORT",
        ));
    }

    if !form
        .email
        .trim()
        .to_lowercase()
        .ends_with(&institutional_domain.to_lowercase())
    {
        return Err(RuleViolation::new(
            format!("Use apenas seu e-mail institucional {institutional_domain}"),
            "EMAIL_DOMAIN",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    const UNIT: &str = "Objetivo Embaré";

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn teacher() -> User {
        let now = Utc::now().naive_utc();
        User {
            id: Uuid::new_v4(),
            totvs_number: "12345".to_string(),
            full_name: "Maria Souza".to_string(),
            email: "maria@objetivoportal.com.br".to_string(),
            password_hash: String::new(),
            units: vec![UNIT.to_string()],
            active: true,
            recurring_booking_enabled: false,
            recurring_booking_units: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn room() -> Room {
        let now = Utc::now().naive_utc();
        Room {
            id: Uuid::new_v4(),
            name: "Laboratório".to_string(),
            unit: UNIT.to_string(),
            capacity: 40,
            description: None,
            min_time: t(7, 0),
            max_time: t(22, 0),
            available_days: vec![1, 2, 3, 4, 5],
            resources: vec![],
            is_active: true,
            is_available: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn draft(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> BookingDraft<'static> {
        BookingDraft {
            unit: UNIT,
            totvs_number: "12345",
            local: Some("Sala 12"),
            date: Some(date),
            day_of_week: None,
            start: Some(start),
            end: Some(end),
            is_recurring: false,
            term_accepted: true,
        }
    }

    // Monday 2026-03-09, 10:00 local.
    fn now() -> NaiveDateTime {
        d(2026, 3, 9).and_time(t(10, 0))
    }

    #[test]
    fn test_valid_equipment_booking() {
        let settings = UnitSettings::defaults_for(UNIT);
        let window = check_equipment_booking(
            &draft(d(2026, 3, 10), t(7, 30), t(9, 10)),
            &teacher(),
            &settings,
            &[2],
            now(),
        )
        .unwrap();
        assert_eq!(window.occurrence, Occurrence::Once(d(2026, 3, 10)));
    }

    #[test]
    fn test_missing_fields_messages_differ_by_kind() {
        let settings = UnitSettings::defaults_for(UNIT);
        let mut form = draft(d(2026, 3, 10), t(7, 30), t(9, 10));
        form.local = Some("  ");
        let err = check_equipment_booking(&form, &teacher(), &settings, &[1], now()).unwrap_err();
        assert_eq!(err.message, "Por favor, preencha todos os campos obrigatórios.");

        form.is_recurring = true;
        form.day_of_week = Some(2);
        let err = check_equipment_booking(&form, &teacher(), &settings, &[1], now()).unwrap_err();
        assert_eq!(
            err.message,
            "Por favor, preencha todos os campos obrigatórios para o agendamento fixo."
        );
    }

    #[test]
    fn test_past_date_is_rejected() {
        let settings = UnitSettings::defaults_for(UNIT);
        let err = check_equipment_booking(
            &draft(d(2026, 3, 8), t(7, 30), t(9, 10)),
            &teacher(),
            &settings,
            &[1],
            now(),
        )
        .unwrap_err();
        assert_eq!(err.message, "Não é possível agendar para datas passadas.");
    }

    #[test]
    fn test_end_must_follow_start() {
        let settings = UnitSettings::defaults_for(UNIT);
        let err = check_equipment_booking(
            &draft(d(2026, 3, 10), t(9, 0), t(9, 0)),
            &teacher(),
            &settings,
            &[1],
            now(),
        )
        .unwrap_err();
        assert_eq!(err.code, "INVALID_TIME_RANGE");
    }

    #[test]
    fn test_min_advance_time_uses_whole_hours() {
        let mut settings = UnitSettings::defaults_for(UNIT);
        settings.min_advance_time_enabled = true;
        settings.min_advance_time_hours = 24;

        // 23h59m ahead truncates to 23 hours.
        let err = check_equipment_booking(
            &draft(d(2026, 3, 10), t(9, 59), t(11, 0)),
            &teacher(),
            &settings,
            &[1],
            now(),
        )
        .unwrap_err();
        assert_eq!(
            err.message,
            "É necessário agendar com no mínimo 24 horas de antecedência. Por favor, escolha outro horário."
        );

        assert!(check_equipment_booking(
            &draft(d(2026, 3, 10), t(10, 0), t(11, 0)),
            &teacher(),
            &settings,
            &[1],
            now(),
        )
        .is_ok());
    }

    #[test]
    fn test_equipment_lines_and_term() {
        let settings = UnitSettings::defaults_for(UNIT);
        let form = draft(d(2026, 3, 10), t(7, 30), t(9, 10));

        let err = check_equipment_booking(&form, &teacher(), &settings, &[], now()).unwrap_err();
        assert_eq!(err.message, "Selecione pelo menos um equipamento.");

        let err = check_equipment_booking(&form, &teacher(), &settings, &[0], now()).unwrap_err();
        assert_eq!(err.code, "INVALID_QUANTITY");

        let mut unsigned = form.clone();
        unsigned.term_accepted = false;
        let err = check_equipment_booking(&unsigned, &teacher(), &settings, &[1], now()).unwrap_err();
        assert_eq!(
            err.message,
            "Você precisa aceitar os termos para confirmar o agendamento."
        );
    }

    #[test]
    fn test_teacher_must_belong_to_unit() {
        let settings = UnitSettings::defaults_for(UNIT);
        let mut user = teacher();
        user.units = vec!["Objetivo Guarujá".to_string()];
        let err = check_equipment_booking(
            &draft(d(2026, 3, 10), t(7, 30), t(9, 10)),
            &user,
            &settings,
            &[1],
            now(),
        )
        .unwrap_err();
        assert_eq!(err.message, "Você não está vinculado a esta unidade.");
    }

    #[test]
    fn test_recurring_requires_authorization() {
        let settings = UnitSettings::defaults_for(UNIT);
        let mut form = draft(d(2026, 3, 10), t(7, 30), t(9, 10));
        form.is_recurring = true;
        form.date = None;
        form.day_of_week = Some(3);

        let err = check_equipment_booking(&form, &teacher(), &settings, &[1], now()).unwrap_err();
        assert_eq!(
            err.message,
            "A unidade Objetivo Embaré não autorizou agendamentos fixos para seu usuário."
        );

        let mut allowed = teacher();
        allowed.recurring_booking_units = vec![UNIT.to_string()];
        let window = check_equipment_booking(&form, &allowed, &settings, &[1], now()).unwrap();
        assert_eq!(window.occurrence, Occurrence::Weekly(3));

        let mut global = teacher();
        global.recurring_booking_enabled = true;
        assert!(check_equipment_booking(&form, &global, &settings, &[1], now()).is_ok());
    }

    #[test]
    fn test_room_same_minute_is_allowed_without_advance_rule() {
        let settings = UnitSettings::defaults_for(UNIT);
        let now = d(2026, 3, 9).and_hms_opt(10, 0, 42).unwrap();

        assert!(check_room_booking(
            &draft(d(2026, 3, 9), t(10, 0), t(11, 0)),
            &teacher(),
            &settings,
            &room(),
            now,
        )
        .is_ok());

        let err = check_room_booking(
            &draft(d(2026, 3, 9), t(9, 59), t(11, 0)),
            &teacher(),
            &settings,
            &room(),
            now,
        )
        .unwrap_err();
        assert_eq!(
            err.message,
            "Não é possível realizar agendamentos para horários que já passaram."
        );
    }

    #[test]
    fn test_room_advance_rule_message() {
        let mut settings = UnitSettings::defaults_for(UNIT);
        settings.room_min_advance_time_enabled = true;
        settings.room_min_advance_time_hours = 2;

        let err = check_room_booking(
            &draft(d(2026, 3, 9), t(11, 0), t(12, 0)),
            &teacher(),
            &settings,
            &room(),
            now(),
        )
        .unwrap_err();
        assert!(err.message.starts_with("É necessário agendar salas com no mínimo 2 horas"));
    }

    #[test]
    fn test_room_hours_and_days() {
        let settings = UnitSettings::defaults_for(UNIT);

        let err = check_room_booking(
            &draft(d(2026, 3, 10), t(6, 30), t(8, 0)),
            &teacher(),
            &settings,
            &room(),
            now(),
        )
        .unwrap_err();
        assert_eq!(err.message, "O horário deve estar entre 07:00 e 22:00.");

        // 2026-03-14 is a Saturday.
        let err = check_room_booking(
            &draft(d(2026, 3, 14), t(8, 0), t(9, 0)),
            &teacher(),
            &settings,
            &room(),
            now(),
        )
        .unwrap_err();
        assert_eq!(err.code, "ROOM_DAY_UNAVAILABLE");
    }

    #[test]
    fn test_effective_status() {
        let date = d(2026, 3, 9);
        assert_eq!(
            EffectiveStatus::of("active", date, t(11, 0), now()),
            EffectiveStatus::Active
        );
        assert_eq!(
            EffectiveStatus::of("active", date, t(9, 0), now()),
            EffectiveStatus::Closed
        );
        assert_eq!(
            EffectiveStatus::of("encerrado", date, t(23, 0), now()),
            EffectiveStatus::Closed
        );
        assert_eq!(
            EffectiveStatus::of("cancelled", date, t(9, 0), now()),
            EffectiveStatus::Cancelled
        );
        assert_eq!(
            EffectiveStatus::of("cancelled_by_user", date, t(23, 0), now()),
            EffectiveStatus::CancelledByUser
        );
    }

    #[test]
    fn test_status_filter_groups_cancellations() {
        assert!(StatusFilter::Cancelled.matches(EffectiveStatus::Cancelled));
        assert!(StatusFilter::Cancelled.matches(EffectiveStatus::CancelledByUser));
        assert!(!StatusFilter::Active.matches(EffectiveStatus::Closed));
        assert!(StatusFilter::All.matches(EffectiveStatus::Closed));
    }

    #[test]
    fn test_period_boundaries() {
        assert!(Period::Morning.contains(t(7, 0)));
        assert!(Period::Morning.contains(t(12, 0)));
        assert!(!Period::Morning.contains(t(6, 59)));
        assert!(Period::Afternoon.contains(t(12, 1)));
        assert!(Period::Afternoon.contains(t(18, 0)));
        assert!(Period::Night.contains(t(18, 1)));
        assert!(Period::Night.contains(t(23, 59)));
    }

    #[test]
    fn test_registration_rules() {
        let units = vec![UNIT.to_string()];
        let form = Registration {
            full_name: "Maria Souza",
            totvs_number: "12345",
            email: "maria@objetivoportal.com.br",
            password: "segredo123",
            confirm_password: "segredo123",
            units: &units,
        };
        let domain = "@objetivoportal.com.br";
        assert!(check_registration(&form, domain).is_ok());

        let no_units: Vec<String> = vec![];
        let err = check_registration(&Registration { units: &no_units, ..form.clone() }, domain)
            .unwrap_err();
        assert_eq!(err.message, "Selecione pelo menos uma unidade onde você trabalha.");

        let err = check_registration(
            &Registration {
                confirm_password: "outra1234",
                ..form.clone()
            },
            domain,
        )
        .unwrap_err();
        assert_eq!(err.message, "As senhas não coincidem.");

        let err = check_registration(
            &Registration {
                password: "curta1",
                confirm_password: "curta1",
                ..form.clone()
            },
            domain,
        )
        .unwrap_err();
        assert_eq!(err.code, "PASSWORD_TOO_SHORT");

        let err = check_registration(
            &Registration {
                email: "maria@gmail.com",
                ..form.clone()
            },
            domain,
        )
        .unwrap_err();
        assert_eq!(
            err.message,
            "Use apenas seu e-mail institucional @objetivoportal.com.br"
        );
    }
}
