//! Weekly bookings and their month-by-month expansion.

use chrono::{Datelike, Months, NaiveDate, NaiveTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Equipment, NewBooking, NewRoomBooking, RecurringBooking};
use crate::schema::{bookings, equipment, recurring_bookings};
use crate::term;

use super::availability::{
    compute_availability, load_reserved_slots, load_room_intervals, room_is_free,
};
use super::rules::status;

/// One equipment line of a weekly booking, stored in `recurring_bookings.equipments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecurrenceLine {
    pub id: Uuid,
    pub name: String,
    pub quantity: i32,
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn month_end(date: NaiveDate) -> NaiveDate {
    month_start(date)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// Every date from `from` through the end of its month that falls on
/// `day_of_week` (0 = Sunday).
pub fn dates_until_month_end(from: NaiveDate, day_of_week: i16) -> Vec<NaiveDate> {
    let last = month_end(from);
    from.iter_days()
        .take_while(|d| *d <= last)
        .filter(|d| i64::from(d.weekday().num_days_from_sunday()) == i64::from(day_of_week))
        .collect()
}

/// First days of the months after `last_generated` up to the current one.
pub fn months_to_generate(last_generated: NaiveDate, today: NaiveDate) -> Vec<NaiveDate> {
    let current = month_start(today);
    let mut month = month_start(last_generated);
    let mut out = Vec::new();
    while let Some(next) = month.checked_add_months(Months::new(1)) {
        if next > current {
            break;
        }
        out.push(next);
        month = next;
    }
    out
}

/// Term fields shared by every row generated from one confirmation.
#[derive(Debug, Clone, Default)]
pub struct TermStamp {
    pub term_document: Option<serde_json::Value>,
    pub term_hash: Option<String>,
    pub display_id: Option<String>,
}

/// Rows for an equipment recurrence: one per line per date.
pub fn equipment_rows(
    rec: &RecurringBooking,
    lines: &[RecurrenceLine],
    dates: &[NaiveDate],
    stamp: &TermStamp,
    observations: Option<&str>,
) -> Vec<NewBooking> {
    dates
        .iter()
        .flat_map(|date| {
            lines.iter().map(move |line| NewBooking {
                user_id: rec.user_id,
                unit: rec.unit.clone(),
                local: rec.local.clone(),
                booking_date: *date,
                start_time: rec.start_time,
                end_time: rec.end_time,
                equipment_id: line.id,
                quantity: line.quantity,
                observations: observations.map(str::to_string),
                status: status::ACTIVE.to_string(),
                term_signed: true,
                term_document: stamp.term_document.clone(),
                term_hash: stamp.term_hash.clone(),
                display_id: stamp.display_id.clone(),
                verification_token: term::generate_verification_token(),
                is_recurring: true,
                recurring_id: Some(rec.id),
            })
        })
        .collect()
}

pub fn room_rows(rec: &RecurringBooking, room_id: Uuid, dates: &[NaiveDate]) -> Vec<NewRoomBooking> {
    dates
        .iter()
        .map(|date| NewRoomBooking {
            room_id,
            user_id: rec.user_id,
            unit: rec.unit.clone(),
            booking_date: *date,
            start_time: rec.start_time,
            end_time: rec.end_time,
            status: status::ROOM_CONFIRMED.to_string(),
            is_recurring: true,
            recurring_id: Some(rec.id),
        })
        .collect()
}

pub fn parse_lines(rec: &RecurringBooking) -> Vec<RecurrenceLine> {
    serde_json::from_value(rec.equipments.clone()).unwrap_or_else(|e| {
        warn!(recurring_id = %rec.id, error = %e, "Unreadable equipment lines on recurrence");
        Vec::new()
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct GenerationReport {
    pub recurrences: usize,
    pub rows_created: usize,
    pub rows_skipped: usize,
}

impl std::ops::AddAssign for GenerationReport {
    fn add_assign(&mut self, other: Self) {
        self.recurrences += other.recurrences;
        self.rows_created += other.rows_created;
        self.rows_skipped += other.rows_skipped;
    }
}

/// Inserts the occurrences of `rec` on `dates`, skipping dates where the
/// slot is no longer free. Caller holds a transaction.
pub fn insert_occurrences(
    conn: &mut PgConnection,
    rec: &RecurringBooking,
    dates: &[NaiveDate],
    stamp: &TermStamp,
) -> QueryResult<GenerationReport> {
    let mut report = GenerationReport::default();

    if let Some(room_id) = rec.room_id {
        let mut free = Vec::with_capacity(dates.len());
        for date in dates {
            let busy = load_room_intervals(conn, room_id, *date)?;
            if room_is_free(busy, rec.start_time, rec.end_time) {
                free.push(*date);
            } else {
                report.rows_skipped += 1;
            }
        }
        let rows = room_rows(rec, room_id, &free);
        if rows.is_empty() {
            return Ok(report);
        }
        report.rows_created += diesel::insert_into(crate::schema::room_bookings::table)
            .values(&rows)
            .execute(conn)?;
        return Ok(report);
    }

    let lines = parse_lines(rec);
    if lines.is_empty() {
        return Ok(report);
    }

    let items: Vec<Equipment> = equipment::table
        .filter(equipment::unit.eq(&rec.unit))
        .filter(equipment::id.eq_any(lines.iter().map(|l| l.id).collect::<Vec<_>>()))
        .select(Equipment::as_select())
        .for_update()
        .load(conn)?;

    let mut rows = Vec::new();
    for date in dates {
        let reserved = load_reserved_slots(conn, &rec.unit, *date)?;
        let free = compute_availability(&items, &reserved, rec.start_time, rec.end_time);
        for line in &lines {
            let available = free
                .iter()
                .find(|a| a.id == line.id)
                .map(|a| a.available_quantity)
                .unwrap_or(0);
            if available >= line.quantity {
                rows.extend(equipment_rows(
                    rec,
                    std::slice::from_ref(line),
                    std::slice::from_ref(date),
                    stamp,
                    None,
                ));
            } else {
                report.rows_skipped += 1;
            }
        }
    }

    if rows.is_empty() {
        return Ok(report);
    }
    report.rows_created += diesel::insert_into(bookings::table)
        .values(&rows)
        .execute(conn)?;
    Ok(report)
}

/// The term of the first confirmation, reused for later months.
fn stamp_for(conn: &mut PgConnection, rec_id: Uuid) -> QueryResult<TermStamp> {
    let row: Option<(Option<serde_json::Value>, Option<String>, Option<String>)> = bookings::table
        .filter(bookings::recurring_id.eq(rec_id))
        .order(bookings::created_at.asc())
        .select((
            bookings::term_document,
            bookings::term_hash,
            bookings::display_id,
        ))
        .first(conn)
        .optional()?;

    Ok(row
        .map(|(term_document, term_hash, display_id)| TermStamp {
            term_document,
            term_hash,
            display_id,
        })
        .unwrap_or_default())
}

/// Generates every month that active recurrences are missing, up to the
/// month of `today`, and advances their cursor.
#[instrument(skip(conn))]
pub fn generate_due_months(
    conn: &mut PgConnection,
    today: NaiveDate,
) -> QueryResult<GenerationReport> {
    let current = month_start(today);

    let due: Vec<Uuid> = recurring_bookings::table
        .filter(recurring_bookings::is_active.eq(true))
        .filter(recurring_bookings::last_generated_month.lt(current))
        .select(recurring_bookings::id)
        .load(conn)?;

    let mut report = GenerationReport::default();

    for id in due {
        let generated = conn.transaction::<_, diesel::result::Error, _>(|conn| {
            // Re-read under lock; another worker may have advanced it.
            let rec: RecurringBooking = recurring_bookings::table
                .find(id)
                .select(RecurringBooking::as_select())
                .for_update()
                .first(conn)?;

            let mut part = GenerationReport::default();
            if !rec.is_active || rec.last_generated_month >= current {
                return Ok(part);
            }

            let stamp = if rec.room_id.is_none() {
                stamp_for(conn, rec.id)?
            } else {
                TermStamp::default()
            };

            for month in months_to_generate(rec.last_generated_month, today) {
                let dates = dates_until_month_end(month, rec.day_of_week);
                part += insert_occurrences(conn, &rec, &dates, &stamp)?;
            }

            diesel::update(recurring_bookings::table.find(rec.id))
                .set(recurring_bookings::last_generated_month.eq(current))
                .execute(conn)?;

            part.recurrences = 1;
            Ok(part)
        })?;

        debug!(recurring_id = %id, rows = generated.rows_created, "Recurrence extended");
        report += generated;
    }

    if report.recurrences > 0 {
        info!(
            recurrences = report.recurrences,
            rows_created = report.rows_created,
            rows_skipped = report.rows_skipped,
            "Recurring bookings generated"
        );
    }
    Ok(report)
}

/// Weekday names as printed in the term, indexed from Sunday.
pub const WEEKDAY_NAMES: [&str; 7] = [
    "Domingo",
    "Segunda-feira",
    "Terça-feira",
    "Quarta-feira",
    "Quinta-feira",
    "Sexta-feira",
    "Sábado",
];

pub fn weekday_name(day_of_week: i16) -> &'static str {
    usize::try_from(day_of_week)
        .ok()
        .and_then(|i| WEEKDAY_NAMES.get(i))
        .copied()
        .unwrap_or("")
}

/// True when a generated occurrence has not started yet.
pub fn is_future_occurrence(date: NaiveDate, start: NaiveTime, now: chrono::NaiveDateTime) -> bool {
    date.and_time(start) > now
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_bounds() {
        assert_eq!(month_start(d(2026, 2, 17)), d(2026, 2, 1));
        assert_eq!(month_end(d(2026, 2, 17)), d(2026, 2, 28));
        assert_eq!(month_end(d(2028, 2, 1)), d(2028, 2, 29));
        assert_eq!(month_end(d(2026, 12, 5)), d(2026, 12, 31));
    }

    #[test]
    fn test_dates_until_month_end_includes_from() {
        // 2026-03-09 is a Monday.
        let mondays = dates_until_month_end(d(2026, 3, 9), 1);
        assert_eq!(
            mondays,
            vec![d(2026, 3, 9), d(2026, 3, 16), d(2026, 3, 23), d(2026, 3, 30)]
        );

        let sundays = dates_until_month_end(d(2026, 3, 30), 0);
        assert!(sundays.is_empty());
    }

    #[test]
    fn test_dates_from_first_of_month() {
        let fridays = dates_until_month_end(d(2026, 4, 1), 5);
        assert_eq!(
            fridays,
            vec![d(2026, 4, 3), d(2026, 4, 10), d(2026, 4, 17), d(2026, 4, 24)]
        );
    }

    #[test]
    fn test_months_to_generate() {
        assert!(months_to_generate(d(2026, 3, 1), d(2026, 3, 20)).is_empty());
        assert_eq!(
            months_to_generate(d(2026, 3, 1), d(2026, 4, 2)),
            vec![d(2026, 4, 1)]
        );
        assert_eq!(
            months_to_generate(d(2025, 11, 1), d(2026, 1, 15)),
            vec![d(2025, 12, 1), d(2026, 1, 1)]
        );
        assert!(months_to_generate(d(2026, 5, 1), d(2026, 4, 2)).is_empty());
    }

    #[test]
    fn test_weekday_names() {
        assert_eq!(weekday_name(0), "Domingo");
        assert_eq!(weekday_name(3), "Quarta-feira");
        assert_eq!(weekday_name(7), "");
        assert_eq!(weekday_name(-1), "");
    }

    fn recurrence() -> RecurringBooking {
        RecurringBooking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            unit: "Objetivo Embaré".to_string(),
            local: "Sala 3".to_string(),
            room_id: None,
            day_of_week: 1,
            start_time: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(9, 10, 0).unwrap(),
            equipments: serde_json::json!([]),
            is_active: true,
            last_generated_month: d(2026, 3, 1),
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_equipment_rows_one_per_line_and_date() {
        let rec = recurrence();
        let lines = vec![
            RecurrenceLine {
                id: Uuid::new_v4(),
                name: "Projetor".to_string(),
                quantity: 1,
            },
            RecurrenceLine {
                id: Uuid::new_v4(),
                name: "Notebook".to_string(),
                quantity: 3,
            },
        ];
        let dates = vec![d(2026, 3, 16), d(2026, 3, 23)];

        let rows = equipment_rows(&rec, &lines, &dates, &TermStamp::default(), None);

        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.is_recurring && r.recurring_id == Some(rec.id)));
        assert!(rows.iter().all(|r| r.status == "active"));
        assert_ne!(rows[0].verification_token, rows[1].verification_token);
    }

    #[test]
    fn test_room_rows_are_confirmed() {
        let mut rec = recurrence();
        let room_id = Uuid::new_v4();
        rec.room_id = Some(room_id);

        let rows = room_rows(&rec, room_id, &[d(2026, 3, 16)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "confirmed");
        assert_eq!(rows[0].room_id, room_id);
    }

    #[test]
    fn test_parse_lines_tolerates_bad_json() {
        let mut rec = recurrence();
        rec.equipments = serde_json::json!({"not": "a list"});
        assert!(parse_lines(&rec).is_empty());

        let id = Uuid::new_v4();
        rec.equipments = serde_json::json!([{"id": id, "name": "Tablet", "quantity": 2}]);
        assert_eq!(parse_lines(&rec)[0].quantity, 2);
    }
}
