//! Human-readable rendering of audit rows for the log viewer.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::models::AuditLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IconType {
    Create,
    Update,
    Delete,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FriendlySummary {
    pub action: String,
    pub target: String,
    pub details: String,
    pub icon: IconType,
}

pub fn format_action(code: &str) -> String {
    let label = match code {
        "CREATE_ROOM" => "Criou Sala",
        "UPDATE_ROOM" => "Editou Sala",
        "DELETE_ROOM" => "Excluiu Sala",
        "TOGGLE_ROOM_AVAILABILITY" => "Alterou Disponibilidade de Sala",
        "DELETE_ROOM_BOOKING" => "Excluiu Reserva de Sala",
        "CREATE_LOAN" => "Novo Empréstimo",
        "RETURN_LOAN" => "Devolução de Equipamento",
        "DELETE_LOAN" => "Excluiu Empréstimo",
        "UPDATE_USER" => "Gerenciou Professor",
        "DELETE_BOOKINGS" => "Cancelou Agendamento(s)",
        "UPDATE_ADMIN" => "Editou Administrador",
        "RESET_ADMIN_PASSWORD" => "Resetou Senha de Admin",
        "DELETE_ADMIN_BOOKINGS" => "Removeu Agendamentos",
        "CREATE_EQUIPMENT" => "Cadastrou Equipamento",
        "UPDATE_EQUIPMENT" => "Editou Equipamento",
        "DELETE_EQUIPMENT" => "Excluiu Equipamento",
        "UPDATE_SETTINGS" => "Alterou Configurações",
        "CREATE_ADMIN" => "Criou Administrador",
        "DEACTIVATE_RECURRING" => "Desativou Agendamento Fixo",
        other => return other.replace('_', " "),
    };
    label.to_string()
}

pub fn format_target_type(table: &str) -> String {
    match table {
        "rooms" => "Sala",
        "equipment_loans" => "Empréstimo",
        "users" => "Professor",
        "bookings" => "Agendamento",
        "admins" => "Administrador",
        other => other,
    }
    .to_string()
}

/// Icon bucket by keyword; TOGGLE counts as an update.
pub fn icon_type(code: &str) -> IconType {
    let lower = code.to_lowercase();
    if lower.contains("create") {
        IconType::Create
    } else if lower.contains("delete") {
        IconType::Delete
    } else if lower.contains("update") || lower.contains("toggle") {
        IconType::Update
    } else {
        IconType::Info
    }
}

/// Non-empty string field, treating `""` like a missing value.
fn text<'a>(data: Option<&'a Value>, key: &str) -> Option<&'a str> {
    data.and_then(|d| d.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn first_text<'a>(candidates: &[(Option<&'a Value>, &str)]) -> Option<&'a str> {
    candidates.iter().find_map(|(data, key)| text(*data, key))
}

fn br_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d")
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|_| "?".to_string())
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    raw.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|d| d.naive_local())
        })
}

fn room_details(log: &AuditLog, old: Option<&Value>, new: Option<&Value>) -> Option<String> {
    let room = first_text(&[(new, "name"), (old, "name")]).unwrap_or("Desconhecida");
    let details = match log.action_type.as_str() {
        "CREATE_ROOM" => format!(
            "Criou a sala \"{}\" na unidade {}.",
            room,
            text(new, "unit").unwrap_or("?")
        ),
        "UPDATE_ROOM" => format!("Atualizou dados da sala \"{room}\"."),
        "DELETE_ROOM" => format!("Removeu a sala \"{room}\" permanentemente."),
        "TOGGLE_ROOM_AVAILABILITY" => format!(
            "Alterou a disponibilidade da sala (ID: {}).",
            log.record_id.as_deref().unwrap_or_default()
        ),
        _ => return None,
    };
    Some(details)
}

fn loan_details(log: &AuditLog, old: Option<&Value>, new: Option<&Value>) -> Option<String> {
    let borrower = first_text(&[
        (new, "borrower"),
        (new, "user_full_name"),
        (old, "user_full_name"),
    ])
    .unwrap_or("Desconhecido");

    let details = match log.action_type.as_str() {
        "CREATE_LOAN" => {
            let equipment = text(new, "equipment_name").unwrap_or("Equipamento");
            let asset = text(new, "asset_number")
                .map(|a| format!(" (Patrimônio: {a})"))
                .unwrap_or_default();
            let location = text(new, "location")
                .map(|l| format!(" para uso em: {l}"))
                .unwrap_or_default();
            let unit = text(new, "unit")
                .map(|u| format!(" ({u})"))
                .unwrap_or_default();
            let quantity = new
                .and_then(|d| d.get("quantity"))
                .and_then(Value::as_i64)
                .filter(|q| *q != 0)
                .unwrap_or(1);
            format!(
                "Novo empréstimo de \"{equipment}\"{asset}{unit}.\n\
                 • Solicitante: {borrower} ({}){location}\n\
                 • Quantidade: {quantity}",
                text(new, "role").unwrap_or("Cargo não informado"),
            )
        }
        "RETURN_LOAN" => format!(
            "Confirmou devolução de empréstimo (ID: {}).",
            log.record_id.as_deref().unwrap_or_default()
        ),
        "DELETE_LOAN" => {
            let equipment = text(old, "equipment_name")
                .map(|e| format!(" do equipamento \"{e}\""))
                .unwrap_or_default();
            format!("Apagou o registro de empréstimo{equipment} de \"{borrower}\".")
        }
        _ => return None,
    };
    Some(details)
}

fn user_details(log: &AuditLog, old: Option<&Value>, new: Option<&Value>) -> Option<String> {
    if log.action_type != "UPDATE_USER" {
        return None;
    }
    let name = first_text(&[(new, "full_name"), (old, "full_name")]).unwrap_or("Usuário");
    let field = |data: Option<&Value>, key: &str| data.and_then(|d| d.get(key)).cloned();

    let mut changes = Vec::new();
    let active = field(new, "active");
    if field(old, "active") != active {
        changes.push(if active.and_then(|a| a.as_bool()).unwrap_or(false) {
            "Reativou acesso"
        } else {
            "Desativou acesso"
        });
    }
    if field(old, "units") != field(new, "units") {
        changes.push("Alterou unidades");
    }
    Some(format!(
        "Atualizou professor \"{}\". {}",
        name,
        changes.join(", ")
    ))
}

fn booking_details(log: &AuditLog, old: Option<&Value>) -> Option<String> {
    match log.action_type.as_str() {
        "DELETE_BOOKINGS" => Some(match old.and_then(Value::as_array).filter(|a| !a.is_empty()) {
            Some(items) if items.len() == 1 => {
                let item = Some(&items[0]);
                let equipment = format!(
                    "{} (Marca: {}, Modelo: {})",
                    text(item, "equipment_name").unwrap_or("Equipamento desconhecido"),
                    text(item, "equipment_brand").unwrap_or("-"),
                    text(item, "equipment_model").unwrap_or("-"),
                );
                let quantity = item
                    .and_then(|d| d.get("quantity"))
                    .and_then(Value::as_i64)
                    .filter(|q| *q != 0)
                    .unwrap_or(1);
                let created = text(item, "created_at")
                    .and_then(parse_timestamp)
                    .map(|t| t.format("%d/%m/%Y %H:%M").to_string())
                    .unwrap_or_else(|| "?".to_string());
                format!(
                    "Cancelou agendamento de \"{equipment}\" (Qtd: {quantity}).\n\
                     • Professor: {}\n\
                     • Para uso em: {} no local: {}\n\
                     • Criado em: {created}",
                    text(item, "user_full_name").unwrap_or("Professor desconhecido"),
                    text(item, "booking_date").map(br_date).unwrap_or_else(|| "?".to_string()),
                    text(item, "local").unwrap_or("Local não informado"),
                )
            }
            Some(items) => {
                let first = Some(&items[0]);
                format!(
                    "Cancelou {} agendamentos. (Ex: {} de {}...)",
                    items.len(),
                    text(first, "equipment_name").unwrap_or_default(),
                    text(first, "user_full_name").unwrap_or_default(),
                )
            }
            None => {
                let count = log
                    .record_id
                    .as_deref()
                    .map(|ids| ids.split(',').count())
                    .unwrap_or(1);
                format!(
                    "Cancelou {count} agendamento(s) de equipamento (Dados detalhados indisponíveis para logs antigos)."
                )
            }
        }),
        "DELETE_ROOM_BOOKING" => {
            let range = match (
                text(old, "start_ts").and_then(parse_timestamp),
                text(old, "end_ts").and_then(parse_timestamp),
            ) {
                (Some(start), Some(end)) => format!(
                    " ({} - {})",
                    start.format("%d/%m/%Y %H:%M"),
                    end.format("%H:%M")
                ),
                _ => String::new(),
            };
            Some(format!(
                "Excluiu reserva da sala \"{}\" {}.\n\
                 • Responsável pela reserva: {}\n\
                 • Período: {range}",
                text(old, "room_name").unwrap_or("Sala desconhecida"),
                text(old, "room_unit").unwrap_or_default(),
                text(old, "user_name").unwrap_or("Professor desconhecido"),
            ))
        }
        _ => None,
    }
}

fn admin_details(log: &AuditLog, old: Option<&Value>, new: Option<&Value>) -> Option<String> {
    let name = first_text(&[(new, "username"), (old, "username")]).unwrap_or("Admin");
    match log.action_type.as_str() {
        "RESET_ADMIN_PASSWORD" => Some(format!("Resetou a senha do administrador \"{name}\".")),
        "UPDATE_USER" | "UPDATE_ADMIN" => {
            Some(format!("Atualizou dados do administrador \"{name}\"."))
        }
        "CREATE_ADMIN" => Some(format!(
            "Criou o administrador \"{}\" para a unidade {}.",
            name,
            text(new, "unit").unwrap_or("?")
        )),
        _ => None,
    }
}

fn equipment_details(log: &AuditLog, old: Option<&Value>, new: Option<&Value>) -> Option<String> {
    let name = first_text(&[(new, "name"), (old, "name")]).unwrap_or("Equipamento");
    match log.action_type.as_str() {
        "CREATE_EQUIPMENT" => Some(format!(
            "Cadastrou o equipamento \"{}\" na unidade {}.",
            name,
            text(new, "unit").unwrap_or("?")
        )),
        "UPDATE_EQUIPMENT" => Some(format!("Atualizou dados do equipamento \"{name}\".")),
        "DELETE_EQUIPMENT" => Some(format!("Removeu o equipamento \"{name}\".")),
        _ => None,
    }
}

pub fn friendly_summary(log: &AuditLog) -> FriendlySummary {
    let old = log.old_data.as_ref();
    let new = log.new_data.as_ref();
    let target = format_target_type(&log.table_name);

    let details = match log.table_name.as_str() {
        "rooms" => room_details(log, old, new),
        "equipment_loans" => loan_details(log, old, new),
        "users" => user_details(log, old, new),
        "bookings" | "room_bookings" => booking_details(log, old),
        "admins" => admin_details(log, old, new),
        "equipment" => equipment_details(log, old, new),
        "settings" if log.action_type == "UPDATE_SETTINGS" => Some(format!(
            "Alterou as configurações da unidade {}.",
            log.record_id.as_deref().unwrap_or("?")
        )),
        _ => None,
    }
    .unwrap_or_else(|| {
        format!(
            "Realizou ação {} em {} (ID: {}).",
            log.action_type,
            target,
            log.record_id.as_deref().unwrap_or("?")
        )
    });

    FriendlySummary {
        action: format_action(&log.action_type),
        target,
        details,
        icon: icon_type(&log.action_type),
    }
}

const TRACKED_FIELDS: [(&str, &str); 8] = [
    ("name", "Nome"),
    ("description", "Descrição"),
    ("min_time", "Tempo Mínimo"),
    ("max_time", "Tempo Máximo"),
    ("active", "Ativo"),
    ("role", "Cargo"),
    ("unit", "Unidade"),
    ("available_days", "Dias Disponíveis"),
];

fn render_value(value: &Value) -> String {
    match value {
        Value::Bool(true) => "Sim".to_string(),
        Value::Bool(false) => "Não".to_string(),
        Value::Null => "Vazio".to_string(),
        Value::String(s) if s.is_empty() => "Vazio".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) if n.as_f64() == Some(0.0) => "Vazio".to_string(),
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// One-line diff of the fields admins usually edit, e.g.
/// `Nome: Sala 1 ➝ Sala 2 | Ativo: Sim ➝ Não`.
pub fn change_tip(old: Option<&Value>, new: Option<&Value>) -> Option<String> {
    let (old, new) = (old?, new?);
    if old.is_null() || new.is_null() {
        return None;
    }

    let changes: Vec<String> = TRACKED_FIELDS
        .iter()
        .filter_map(|(key, label)| {
            let (before, after) = (old.get(key)?, new.get(key)?);
            (before != after).then(|| {
                format!("{}: {} ➝ {}", label, render_value(before), render_value(after))
            })
        })
        .collect();

    (!changes.is_empty()).then(|| changes.join(" | "))
}
