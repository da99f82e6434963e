//! Admin dashboard counters and charts.

use std::collections::{BTreeMap, HashMap};

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{Datelike, Duration, NaiveDate};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::jwt::Claims,
    error::{db_failure, get_db_conn, ApiResult},
    helpers::UnitFilter,
    scheduling::rules::status,
    schema::{bookings, equipment, users},
    AppState,
};

use super::admin_scope;

const TOP_N: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DashboardPeriod {
    #[default]
    Week,
    Month,
    Total,
}

impl DashboardPeriod {
    /// First day covered by the charts. Weeks start on Monday.
    pub fn start(&self, today: NaiveDate) -> NaiveDate {
        match self {
            DashboardPeriod::Week => {
                today - Duration::days(today.weekday().num_days_from_monday() as i64)
            }
            DashboardPeriod::Month => today.with_day(1).unwrap_or(today),
            DashboardPeriod::Total => today - Duration::days(365),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DashboardQuery {
    #[serde(default)]
    #[param(value_type = Option<String>, example = "week")]
    pub period: DashboardPeriod,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RankedName {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct DashboardStats {
    pub active_bookings: i64,
    pub equipment_count: i64,
    pub teacher_count: i64,
    pub bookings_per_day: Vec<DayCount>,
    pub top_equipment: Vec<RankedName>,
    pub top_teachers: Vec<RankedName>,
}

fn per_day(dates: &[NaiveDate]) -> Vec<DayCount> {
    let mut days: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for date in dates {
        *days.entry(*date).or_default() += 1;
    }
    days.into_iter()
        .map(|(date, count)| DayCount { date, count })
        .collect()
}

/// Most frequent names first; ties break alphabetically.
fn top<'a>(names: impl Iterator<Item = &'a str>, n: usize) -> Vec<RankedName> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for name in names {
        *counts.entry(name).or_default() += 1;
    }
    let mut ranked: Vec<RankedName> = counts
        .into_iter()
        .map(|(name, count)| RankedName {
            name: name.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(n);
    ranked
}

#[utoipa::path(
    get,
    path = "/admin/dashboard",
    tag = "Dashboard",
    params(DashboardQuery),
    responses((status = 200, description = "Counters and charts for the admin's unit", body = DashboardStats)),
    security(("bearer_auth" = []))
)]
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Json<DashboardStats>> {
    let unit = match admin_scope(&state, &claims).unit_filter(query.unit.as_deref()) {
        UnitFilter::Any => None,
        UnitFilter::Only(u) => Some(u),
        UnitFilter::Deny => return Ok(Json(DashboardStats::default())),
    };

    let today = state.clock.today();
    let since = query.period.start(today);
    let mut conn = get_db_conn(&state.db_pool)?;

    let mut active = bookings::table
        .filter(bookings::status.eq(status::ACTIVE))
        .filter(bookings::booking_date.ge(today))
        .into_boxed();
    let mut stock = equipment::table.into_boxed();
    let mut teachers = users::table.into_boxed();
    let mut recent = bookings::table
        .inner_join(equipment::table)
        .inner_join(users::table)
        .filter(bookings::status.ne(status::CANCELLED_BY_USER))
        .filter(bookings::booking_date.ge(since))
        .into_boxed();

    if let Some(unit) = unit {
        active = active.filter(bookings::unit.eq(unit.clone()));
        stock = stock.filter(equipment::unit.eq(unit.clone()));
        teachers = teachers.filter(users::units.contains(vec![unit.clone()]));
        recent = recent.filter(bookings::unit.eq(unit));
    }

    let active_bookings: i64 = active.count().get_result(&mut conn).map_err(db_failure)?;
    let equipment_count: i64 = stock.count().get_result(&mut conn).map_err(db_failure)?;
    let teacher_count: i64 = teachers.count().get_result(&mut conn).map_err(db_failure)?;

    let rows: Vec<(NaiveDate, String, String)> = recent
        .select((bookings::booking_date, equipment::name, users::full_name))
        .load(&mut conn)
        .map_err(db_failure)?;

    let dates: Vec<NaiveDate> = rows.iter().map(|(d, _, _)| *d).collect();

    Ok(Json(DashboardStats {
        active_bookings,
        equipment_count,
        teacher_count,
        bookings_per_day: per_day(&dates),
        top_equipment: top(rows.iter().map(|(_, e, _)| e.as_str()), TOP_N),
        top_teachers: top(rows.iter().map(|(_, _, t)| t.as_str()), TOP_N),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_start() {
        // Thursday
        let today = date(2026, 10, 15);
        assert_eq!(DashboardPeriod::Week.start(today), date(2026, 10, 12));
        assert_eq!(DashboardPeriod::Month.start(today), date(2026, 10, 1));
        assert_eq!(DashboardPeriod::Total.start(today), date(2025, 10, 15));
        // A Monday starts its own week.
        assert_eq!(DashboardPeriod::Week.start(date(2026, 10, 12)), date(2026, 10, 12));
    }

    #[test]
    fn test_per_day_is_sorted() {
        let days = per_day(&[date(2026, 3, 2), date(2026, 3, 1), date(2026, 3, 2)]);
        assert_eq!(
            days,
            vec![
                DayCount { date: date(2026, 3, 1), count: 1 },
                DayCount { date: date(2026, 3, 2), count: 2 },
            ]
        );
    }

    #[test]
    fn test_top_ranks_and_truncates() {
        let names = ["Projetor", "Notebook", "Projetor", "Caixa de Som", "Notebook", "Projetor"];
        let ranked = top(names.iter().copied(), 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0], RankedName { name: "Projetor".to_string(), count: 3 });
        assert_eq!(ranked[1], RankedName { name: "Notebook".to_string(), count: 2 });
    }

    #[test]
    fn test_period_parses_lowercase() {
        let q: DashboardQuery = serde_json::from_value(serde_json::json!({"period": "month"})).unwrap();
        assert_eq!(q.period, DashboardPeriod::Month);
    }
}
