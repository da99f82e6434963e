//! Free-capacity arithmetic for equipment and rooms.

use chrono::{NaiveDate, NaiveTime};
use diesel::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Equipment;
use crate::schema::{bookings, room_bookings};

use super::rules::status;

/// Half-open interval overlap: `[a_start, a_end)` vs `[b_start, b_end)`.
/// Back-to-back slots (one ends at 09:10, the next starts at 09:10) do not
/// overlap.
pub fn overlaps(a_start: NaiveTime, a_end: NaiveTime, b_start: NaiveTime, b_end: NaiveTime) -> bool {
    a_start < b_end && a_end > b_start
}

/// The slice of a booking row the availability pass needs.
#[derive(Debug, Clone)]
pub struct ReservedSlot {
    pub equipment_id: Uuid,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EquipmentAvailability {
    pub id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub total_quantity: i32,
    pub available_quantity: i32,
}

/// Subtracts every overlapping reservation from each item's total.
///
/// `reserved` must already be restricted to the same date and to bookings
/// that still hold stock; this function only filters by time. The output
/// keeps the order of `equipment` and never goes below zero.
pub fn compute_availability(
    equipment: &[Equipment],
    reserved: &[ReservedSlot],
    start: NaiveTime,
    end: NaiveTime,
) -> Vec<EquipmentAvailability> {
    let mut used: HashMap<Uuid, i32> = HashMap::new();
    for slot in reserved
        .iter()
        .filter(|s| overlaps(s.start_time, s.end_time, start, end))
    {
        *used.entry(slot.equipment_id).or_insert(0) += slot.quantity;
    }

    equipment
        .iter()
        .map(|e| EquipmentAvailability {
            id: e.id,
            name: e.name.clone(),
            brand: e.brand.clone(),
            model: e.model.clone(),
            total_quantity: e.total_quantity,
            available_quantity: (e.total_quantity - used.get(&e.id).copied().unwrap_or(0)).max(0),
        })
        .collect()
}

/// True when none of the given intervals overlap the requested one.
pub fn room_is_free(
    occupied: impl IntoIterator<Item = (NaiveTime, NaiveTime)>,
    start: NaiveTime,
    end: NaiveTime,
) -> bool {
    !occupied
        .into_iter()
        .any(|(s, e)| overlaps(s, e, start, end))
}

/// Active equipment bookings of a unit on one date.
pub fn load_reserved_slots(
    conn: &mut PgConnection,
    unit: &str,
    date: NaiveDate,
) -> QueryResult<Vec<ReservedSlot>> {
    let rows: Vec<(Uuid, NaiveTime, NaiveTime, i32)> = bookings::table
        .filter(bookings::unit.eq(unit))
        .filter(bookings::booking_date.eq(date))
        .filter(bookings::status.eq(status::ACTIVE))
        .select((
            bookings::equipment_id,
            bookings::start_time,
            bookings::end_time,
            bookings::quantity,
        ))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(equipment_id, start_time, end_time, quantity)| ReservedSlot {
            equipment_id,
            start_time,
            end_time,
            quantity,
        })
        .collect())
}

/// Confirmed intervals of a room on one date, ordered by start.
pub fn load_room_intervals(
    conn: &mut PgConnection,
    room_id: Uuid,
    date: NaiveDate,
) -> QueryResult<Vec<(NaiveTime, NaiveTime)>> {
    room_bookings::table
        .filter(room_bookings::room_id.eq(room_id))
        .filter(room_bookings::booking_date.eq(date))
        .filter(room_bookings::status.eq(status::ROOM_CONFIRMED))
        .order(room_bookings::start_time.asc())
        .select((room_bookings::start_time, room_bookings::end_time))
        .load(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn item(name: &str, total: i32) -> Equipment {
        let now = Utc::now().naive_utc();
        Equipment {
            id: Uuid::new_v4(),
            unit: "Objetivo Embaré".to_string(),
            name: name.to_string(),
            brand: None,
            model: None,
            total_quantity: total,
            created_at: now,
            updated_at: now,
        }
    }

    fn slot(e: &Equipment, start: NaiveTime, end: NaiveTime, qty: i32) -> ReservedSlot {
        ReservedSlot {
            equipment_id: e.id,
            start_time: start,
            end_time: end,
            quantity: qty,
        }
    }

    #[test]
    fn test_overlap_edges() {
        assert!(overlaps(t(8, 0), t(10, 0), t(9, 0), t(11, 0)));
        assert!(overlaps(t(8, 0), t(10, 0), t(8, 30), t(9, 0)));
        assert!(!overlaps(t(8, 0), t(9, 0), t(9, 0), t(10, 0)));
        assert!(!overlaps(t(10, 0), t(11, 0), t(8, 0), t(10, 0)));
    }

    #[test]
    fn test_overlapping_bookings_are_subtracted() {
        let projector = item("Projetor", 5);
        let notebook = item("Notebook", 10);
        let reserved = vec![
            slot(&projector, t(8, 0), t(10, 0), 2),
            slot(&projector, t(9, 0), t(9, 50), 1),
            slot(&notebook, t(13, 0), t(15, 0), 4),
        ];

        let result = compute_availability(
            &[projector.clone(), notebook.clone()],
            &reserved,
            t(9, 0),
            t(11, 0),
        );

        assert_eq!(result[0].name, "Projetor");
        assert_eq!(result[0].available_quantity, 2);
        assert_eq!(result[1].name, "Notebook");
        assert_eq!(result[1].available_quantity, 10);
    }

    #[test]
    fn test_availability_is_clamped_at_zero() {
        let speaker = item("Caixa de som", 1);
        let reserved = vec![
            slot(&speaker, t(7, 0), t(12, 0), 1),
            slot(&speaker, t(8, 0), t(9, 0), 1),
        ];

        let result = compute_availability(&[speaker], &reserved, t(8, 0), t(9, 0));
        assert_eq!(result[0].available_quantity, 0);
    }

    #[test]
    fn test_adjacent_booking_does_not_consume_stock() {
        let tablet = item("Tablet", 3);
        let reserved = vec![slot(&tablet, t(7, 0), t(8, 0), 3)];

        let result = compute_availability(&[tablet], &reserved, t(8, 0), t(9, 0));
        assert_eq!(result[0].available_quantity, 3);
    }

    #[test]
    fn test_room_is_free() {
        let busy = vec![(t(8, 0), t(9, 0)), (t(10, 0), t(11, 0))];
        assert!(room_is_free(busy.clone(), t(9, 0), t(10, 0)));
        assert!(!room_is_free(busy.clone(), t(8, 30), t(9, 30)));
        assert!(room_is_free(Vec::new(), t(8, 0), t(22, 0)));
    }
}
