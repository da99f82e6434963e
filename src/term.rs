//! Term of responsibility: the document a teacher accepts when confirming a
//! booking, its SHA-256 fingerprint and the identifiers printed on it.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::scheduling::recurrence::weekday_name;
use crate::scheduling::time::{format_br_date, format_hhmm};

pub const SCHOOL_UNITS: [&str; 7] = [
    "Objetivo São Vicente",
    "Objetivo Praia Grande",
    "Objetivo Embaré",
    "Objetivo Conselheiro Nébias",
    "Objetivo Ponta da Praia",
    "Objetivo Guarujá",
    "Objetivo São José dos Campos",
];

/// Registered company name behind each unit. Both spellings of Nébias are
/// in use.
pub fn unit_legal_name(unit: &str) -> Option<&'static str> {
    match unit {
        "Objetivo São Vicente" => Some("SISTEMA DE ENSINO DE SAO VICENTE LTDA"),
        "Objetivo Embaré"
        | "Objetivo Conselheiro Nebias"
        | "Objetivo Conselheiro Nébias"
        | "Objetivo Ponta da Praia" => Some("SOCIEDADE INSTRUTIVA JOAQUIM NABUCO LTDA"),
        "Objetivo Guarujá" => Some("SOCIEDADE EDUCACIONAL DE GUARUJA LTDA"),
        "Objetivo Praia Grande" => Some("CENTRO EDUCACIONAL E CULTURAL DE PRAIA GRANDE LTDA"),
        "Objetivo São José dos Campos" => Some("INSTITUTO EDUCACIONAL VALE DO PARAIBA LTDA"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TermKind {
    Equipment,
    Room,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TermEquipment {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub quantity: i32,
}

/// Stored as JSON in `bookings.term_document`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TermDocument {
    #[serde(rename = "type")]
    pub kind: TermKind,
    pub user_name: String,
    pub user_totvs: String,
    pub unit: String,
    pub unit_legal_name: Option<String>,
    pub local: String,
    /// `YYYY-MM-DD`; absent for weekly bookings.
    pub date: Option<NaiveDate>,
    pub is_recurring: bool,
    pub day_of_week: Option<i16>,
    #[schema(value_type = String)]
    pub start_time: NaiveTime,
    #[schema(value_type = String)]
    pub end_time: NaiveTime,
    pub equipments: Vec<TermEquipment>,
    pub timestamp: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub display_id: String,
}

impl TermDocument {
    fn noun(&self) -> &'static str {
        match self.kind {
            TermKind::Equipment => "equipamento",
            TermKind::Room => "espaço",
        }
    }

    fn day_of_use(&self) -> String {
        match (self.is_recurring, self.day_of_week, self.date) {
            (true, Some(d), _) => format!("Toda {}", weekday_name(d)),
            (_, _, Some(date)) => format_br_date(date),
            _ => String::new(),
        }
    }

    /// Plain-text rendering of the term. This is the hashed content, so any
    /// change here changes every new fingerprint.
    pub fn canonical_text(&self) -> String {
        let is_room = self.kind == TermKind::Room;
        let mut lines: Vec<String> = Vec::new();

        if let Some(legal) = &self.unit_legal_name {
            lines.push(legal.clone());
        }
        lines.push("DECLARAÇÃO DE RESPONSABILIDADE E TERMO DE USO".to_string());
        lines.push(String::new());
        lines.push(format!(
            "Declaro que eu, {}, portador(a) do número de usuário TOTVS {}, estou ciente e de acordo com as condições de uso {} abaixo descrito(s), responsabilizando-me integralmente por sua utilização durante o período de agendamento.",
            self.user_name,
            self.user_totvs,
            if is_room { "do espaço físico" } else { "do(s) equipamento(s)" },
        ));
        lines.push(String::new());
        lines.push("DADOS DO AGENDAMENTO".to_string());
        lines.push(format!("Unidade: {}", self.unit));
        lines.push(format!(
            "{}: {}",
            if is_room { "Sala/Espaço" } else { "Local" },
            self.local
        ));
        lines.push(format!("Dia de Uso: {}", self.day_of_use()));
        lines.push(format!(
            "Horário: {} às {}",
            format_hhmm(self.start_time),
            format_hhmm(self.end_time)
        ));

        if !self.equipments.is_empty() {
            lines.push(String::new());
            lines.push("EQUIPAMENTOS".to_string());
            for eq in &self.equipments {
                let detail = match &eq.brand {
                    Some(brand) => format!(
                        " ({} {})",
                        brand,
                        eq.model.as_deref().unwrap_or_default()
                    ),
                    None => String::new(),
                };
                lines.push(format!("{}{} - {} unidade(s)", eq.name, detail, eq.quantity));
            }
        }

        let noun = self.noun();
        lines.push(String::new());
        lines.push("COMPROMISSOS E RESPONSABILIDADES".to_string());
        lines.push("Ao aceitar este termo, comprometo-me a:".to_string());
        lines.push(format!(
            "1. Utilizar o {noun} exclusivamente durante o período agendado e no local especificado."
        ));
        lines.push(format!(
            "2. Zelar pela conservação e bom funcionamento do {}.",
            if is_room { "espaço e seus itens" } else { "equipamento" }
        ));
        lines.push(
            "3. Comunicar imediatamente à equipe responsável qualquer defeito ou irregularidade constatada."
                .to_string(),
        );
        lines.push(format!(
            "4. Não emprestar ou transferir o {noun} a terceiros sem autorização prévia."
        ));
        lines.push(format!(
            "5. Orientar adequadamente o uso do {noun}, quando utilizado por alunos, zelando por sua conservação."
        ));
        if self.is_recurring {
            lines.push("6. Declaro ciência que este é um AGENDAMENTO FIXO (RECORRENTE) e este termo de responsabilidade aplica-se a todas as ocorrências geradas automaticamente por esta reserva semanal.".to_string());
        }
        lines.push(String::new());
        lines.push("Comprometo-me a devolver o(s) equipamento(s) nas mesmas condições em que o(s) recebi. Estou ciente que qualquer dano ou extravio será de minha responsabilidade.".to_string());
        lines.push(String::new());
        lines.push("TERMO DE CIÊNCIA".to_string());
        lines.push(format!(
            "Estou ciente que a utilização inadequada pode resultar em medidas administrativas e que sou responsável pela segurança e integridade do {noun} durante todo o período da recorrência."
        ));

        lines.join("\n")
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.canonical_text())
    }
}

/// Trims and turns CRLF into LF so the same text hashes the same everywhere.
pub fn normalize_for_hash(text: &str) -> String {
    text.trim().replace("\r\n", "\n")
}

/// Lowercase hex SHA-256 of the normalised text.
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(normalize_for_hash(text).as_bytes()))
}

/// Six-digit number printed on the term and read over the phone.
pub fn generate_display_id() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Opaque token encoded in the term's QR code.
pub fn generate_verification_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
