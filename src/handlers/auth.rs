//! Authentication handlers for teachers and admins.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{
        jwt::{Claims, Role},
        password::PasswordService,
    },
    error::{get_db_conn, map_db_error, validation_error, ApiError, ApiResult},
    events::{outbox::OutboxService, AggregateType, EventType, LoginPayload},
    helpers::{hash_token, principal_id},
    middleware::RequestId,
    models::{Admin, NewPasswordResetToken, NewUser, User},
    scheduling::rules::{check_registration, Registration},
    schema::{admins, password_reset_tokens, refresh_tokens, users},
    telemetry::{record_auth_attempt, AuthOutcome},
    term::SCHOOL_UNITS,
    AppState,
};

const INVALID_CREDENTIALS: &str = "Credenciais inválidas.";
const ACCOUNT_DISABLED: &str = "Sua conta foi desativada. Entre em contato com a administração.";
const RESET_TOKEN_MINUTES: i64 = 30;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(max = 200, message = "Nome muito longo."))]
    #[schema(example = "Maria da Silva")]
    pub full_name: String,
    #[validate(length(max = 32, message = "Número TOTVS inválido."))]
    #[schema(example = "123456")]
    pub totvs_number: String,
    #[schema(example = "maria.silva@objetivoportal.com.br")]
    pub email: String,
    #[schema(example = "senhaSegura1", min_length = 8)]
    pub password: String,
    #[schema(example = "senhaSegura1")]
    pub confirm_password: String,
    #[schema(example = json!(["Objetivo Embaré"]))]
    pub units: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    /// Admin username, institutional email or TOTVS number.
    #[validate(length(min = 1, message = "Por favor, preencha todos os campos obrigatórios"))]
    #[schema(example = "123456")]
    pub identifier: String,
    #[validate(length(min = 1, message = "Por favor, preencha todos os campos obrigatórios"))]
    #[schema(example = "senhaSegura1")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TeacherProfile {
    pub id: Uuid,
    #[schema(example = "Maria da Silva")]
    pub full_name: String,
    #[schema(example = "123456")]
    pub totvs_number: String,
    pub email: String,
    pub units: Vec<String>,
    pub active: bool,
    pub recurring_booking_enabled: bool,
    pub recurring_booking_units: Vec<String>,
    pub created_at: NaiveDateTime,
}

impl From<User> for TeacherProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            totvs_number: user.totvs_number,
            email: user.email,
            units: user.units,
            active: user.active,
            recurring_booking_enabled: user.recurring_booking_enabled,
            recurring_booking_units: user.recurring_booking_units,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminProfile {
    pub id: Uuid,
    #[schema(example = "admin.embare")]
    pub username: String,
    pub unit: Option<String>,
    pub is_super_admin: bool,
    pub created_at: NaiveDateTime,
}

impl AdminProfile {
    pub fn new(admin: Admin, super_admin_unit: &str) -> Self {
        Self {
            is_super_admin: admin.unit.as_deref() == Some(super_admin_unit),
            id: admin.id,
            username: admin.username,
            unit: admin.unit,
            created_at: admin.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Profile {
    Teacher(TeacherProfile),
    Admin(AdminProfile),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub profile: Profile,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Senha alterada com sucesso.")]
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
struct NewRefreshToken {
    principal_id: Uuid,
    principal_kind: String,
    token_hash: String,
    expires_at: NaiveDateTime,
}

fn store_refresh_token(
    conn: &mut PgConnection,
    principal: Uuid,
    role: Role,
    token: &str,
    expires_in_secs: i64,
) -> QueryResult<()> {
    diesel::insert_into(refresh_tokens::table)
        .values(&NewRefreshToken {
            principal_id: principal,
            principal_kind: role.as_str().to_string(),
            token_hash: hash_token(token),
            expires_at: (Utc::now() + Duration::seconds(expires_in_secs)).naive_utc(),
        })
        .execute(conn)?;
    Ok(())
}

/// Returns the owner of a stored, unexpired refresh token.
fn verify_stored_token(conn: &mut PgConnection, token: &str) -> Result<(Uuid, String), &'static str> {
    let token_hash = hash_token(token);
    let now = Utc::now().naive_utc();

    let stored: Option<(Uuid, String, NaiveDateTime)> = refresh_tokens::table
        .filter(refresh_tokens::token_hash.eq(&token_hash))
        .select((
            refresh_tokens::principal_id,
            refresh_tokens::principal_kind,
            refresh_tokens::expires_at,
        ))
        .first(conn)
        .optional()
        .map_err(|_| "Invalid refresh token")?;

    match stored {
        Some((_, _, expires_at)) if expires_at < now => {
            let _ = diesel::delete(
                refresh_tokens::table.filter(refresh_tokens::token_hash.eq(&token_hash)),
            )
            .execute(conn);
            Err("Refresh token has expired")
        }
        Some((id, kind, _)) => Ok((id, kind)),
        None => Err("Invalid refresh token"),
    }
}

fn invalidate_token(conn: &mut PgConnection, token: &str) -> QueryResult<usize> {
    diesel::delete(refresh_tokens::table.filter(refresh_tokens::token_hash.eq(hash_token(token))))
        .execute(conn)
}

fn cleanup_expired_tokens(conn: &mut PgConnection, principal: Uuid) {
    let now = Utc::now().naive_utc();
    if let Ok(count) = diesel::delete(
        refresh_tokens::table
            .filter(refresh_tokens::principal_id.eq(principal))
            .filter(refresh_tokens::expires_at.lt(now)),
    )
    .execute(conn)
    {
        if count > 0 {
            info!(principal_id = %principal, deleted_count = count, "Cleaned up expired refresh tokens");
        }
    }
}

fn token_error(e: jwt_simple::Error) -> crate::error::ApiErrorResponse {
    error!(error = %e, "Token generation failed");
    ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
}

/// The subject of a token pair, whichever table it lives in.
struct Principal {
    id: Uuid,
    identifier: String,
    role: Role,
    unit: Option<String>,
}

impl Principal {
    fn teacher(user: &User) -> Self {
        Self {
            id: user.id,
            identifier: user.email.clone(),
            role: Role::Teacher,
            unit: None,
        }
    }

    fn admin(admin: &Admin) -> Self {
        Self {
            id: admin.id,
            identifier: admin.username.clone(),
            role: Role::Admin,
            unit: admin.unit.clone(),
        }
    }
}

fn generate_tokens(
    state: &AppState,
    conn: &mut PgConnection,
    principal: &Principal,
) -> ApiResult<(String, String)> {
    let jwt = &state.jwt_config;
    let access_token = jwt
        .generate_access_token(
            principal.id,
            &principal.identifier,
            principal.role,
            principal.unit.clone(),
        )
        .map_err(token_error)?;
    let refresh_token = jwt
        .generate_refresh_token(principal.id, principal.role)
        .map_err(token_error)?;

    store_refresh_token(
        conn,
        principal.id,
        principal.role,
        &refresh_token,
        jwt.refresh_token_expiry,
    )
    .map_err(|e| {
        error!(error = %e, "Failed to store refresh token");
        ApiError::internal("Token storage failed", "TOKEN_STORAGE_ERROR")
    })?;

    Ok((access_token, refresh_token))
}

pub(crate) fn hash_password(state: &AppState, password: &str) -> ApiResult<String> {
    PasswordService::hash_password_with_cost(password, state.password_hash_cost).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
    })
}

fn verify_password(password: &str, hash: &str) -> ApiResult<bool> {
    PasswordService::verify_password(password, hash).map_err(|e| {
        error!(error = %e, "Password verification error");
        ApiError::internal("Password verification error", "PASSWORD_VERIFY_ERROR")
    })
}

fn emit_auth_event(
    conn: &mut PgConnection,
    event: EventType,
    aggregate: AggregateType,
    id: Uuid,
    payload: &LoginPayload,
    request_id: &RequestId,
) {
    if let Err(e) = OutboxService::emit(
        conn,
        event,
        aggregate,
        id,
        serde_json::to_value(payload).unwrap_or_default(),
        Some(id),
        None,
        Some(request_id.to_string()),
    ) {
        warn!(error = %e, event = %event, "Failed to write auth event");
    }
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registration successful", body = AuthResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 409, description = "Email or TOTVS number already registered", body = ApiError)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<Json<AuthResponse>> {
    payload.validate().map_err(validation_error)?;

    check_registration(
        &Registration {
            full_name: &payload.full_name,
            totvs_number: &payload.totvs_number,
            email: &payload.email,
            password: &payload.password,
            confirm_password: &payload.confirm_password,
            units: &payload.units,
        },
        &state.booking.institutional_email_domain,
    )?;

    if let Some(unknown) = payload
        .units
        .iter()
        .find(|u| !SCHOOL_UNITS.contains(&u.as_str()))
    {
        return Err(ApiError::validation(format!("Unidade desconhecida: {unknown}")));
    }

    state
        .password_policy
        .validate(&payload.password)
        .map_err(|e| ApiError::bad_request(e.to_string(), "PASSWORD_POLICY_VIOLATION"))?;

    let email = payload.email.trim().to_lowercase();
    let totvs = payload.totvs_number.trim().to_string();

    let mut conn = get_db_conn(&state.db_pool)?;

    let email_taken: bool = diesel::select(diesel::dsl::exists(
        users::table.filter(users::email.eq(&email)),
    ))
    .get_result(&mut conn)
    .map_err(|_| ApiError::db_error())?;
    if email_taken {
        return Err(ApiError::conflict(
            "Este e-mail já está cadastrado no sistema.",
            "EMAIL_EXISTS",
        ));
    }

    let totvs_taken: bool = diesel::select(diesel::dsl::exists(
        users::table.filter(users::totvs_number.eq(&totvs)),
    ))
    .get_result(&mut conn)
    .map_err(|_| ApiError::db_error())?;
    if totvs_taken {
        return Err(ApiError::conflict(
            "Este número TOTVS já está cadastrado no sistema.",
            "TOTVS_EXISTS",
        ));
    }

    let mut units: Vec<String> = payload.units.iter().map(|u| u.trim().to_string()).collect();
    units.dedup();

    let new_user = NewUser {
        totvs_number: totvs,
        full_name: payload.full_name.trim().to_string(),
        email,
        password_hash: hash_password(&state, &payload.password)?,
        units,
    };

    let user: User = diesel::insert_into(users::table)
        .values(&new_user)
        .returning(User::as_returning())
        .get_result(&mut conn)
        .map_err(|e| {
            warn!(error = %e, email = %new_user.email, "Failed to register teacher");
            map_db_error(
                e,
                "Este e-mail já está cadastrado no sistema.",
                "Não foi possível concluir o cadastro.",
            )
        })?;

    let (access_token, refresh_token) = generate_tokens(&state, &mut conn, &Principal::teacher(&user))?;

    emit_auth_event(
        &mut conn,
        EventType::UserRegistered,
        AggregateType::User,
        user.id,
        &LoginPayload {
            identifier: user.email.clone(),
            role: Some(Role::Teacher.as_str().to_string()),
            reason: None,
        },
        &request_id,
    );

    info!(user_id = %user.id, totvs = %user.totvs_number, "Teacher registered");

    Ok(Json(AuthResponse {
        profile: Profile::Teacher(user.into()),
        access_token,
        refresh_token,
    }))
}

async fn reject_login(
    state: &AppState,
    conn: &mut PgConnection,
    lockout_key: &str,
    failed: Option<(Uuid, AggregateType)>,
    request_id: &RequestId,
) -> crate::error::ApiErrorResponse {
    record_auth_attempt("login", AuthOutcome::InvalidCredentials);
    let _ = state.lockout.record_failed_attempt(lockout_key).await;

    if let Some((id, aggregate)) = failed {
        emit_auth_event(
            conn,
            EventType::LoginFailed,
            aggregate,
            id,
            &LoginPayload {
                identifier: lockout_key.to_string(),
                role: None,
                reason: Some("invalid_password".to_string()),
            },
            request_id,
        );
    }

    ApiError::unauthorized(INVALID_CREDENTIALS, "INVALID_CREDENTIALS")
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Invalid credentials", body = ApiError),
        (status = 403, description = "Account disabled", body = ApiError),
        (status = 423, description = "Account locked", body = ApiError)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    payload.validate().map_err(validation_error)?;

    let identifier = payload.identifier.trim();
    let lockout_key = identifier.to_lowercase();

    if let Some(remaining) = state.lockout.lockout_remaining(&lockout_key).await {
        warn!(identifier = %lockout_key, "Login attempt for locked account");
        record_auth_attempt("login", AuthOutcome::AccountLocked);
        return Err(ApiError::locked(
            format!(
                "Muitas tentativas de login. Tente novamente em {} minuto(s).",
                remaining.div_ceil(60).max(1)
            ),
            "ACCOUNT_LOCKED",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;

    // Admin usernames take precedence; a wrong admin password never falls
    // through to the teacher lookup.
    let admin: Option<Admin> = admins::table
        .filter(admins::username.eq(identifier))
        .select(Admin::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|_| ApiError::db_error())?;

    if let Some(admin) = admin {
        if !verify_password(&payload.password, &admin.password_hash)? {
            warn!(admin_id = %admin.id, "Failed admin login - invalid password");
            return Err(reject_login(
                &state,
                &mut conn,
                &lockout_key,
                Some((admin.id, AggregateType::Admin)),
                &request_id,
            )
            .await);
        }

        let _ = state.lockout.clear_failed_attempts(&lockout_key).await;
        cleanup_expired_tokens(&mut conn, admin.id);
        let (access_token, refresh_token) =
            generate_tokens(&state, &mut conn, &Principal::admin(&admin))?;

        emit_auth_event(
            &mut conn,
            EventType::LoginSuccess,
            AggregateType::Admin,
            admin.id,
            &LoginPayload {
                identifier: admin.username.clone(),
                role: Some(Role::Admin.as_str().to_string()),
                reason: None,
            },
            &request_id,
        );

        record_auth_attempt("login", AuthOutcome::Success);
        info!(admin_id = %admin.id, unit = ?admin.unit, "Admin logged in");

        return Ok(Json(AuthResponse {
            profile: Profile::Admin(AdminProfile::new(admin, &state.booking.super_admin_unit)),
            access_token,
            refresh_token,
        }));
    }

    let query = users::table.select(User::as_select()).into_boxed();
    let query = if identifier.contains('@') {
        query.filter(users::email.eq(identifier.to_lowercase()))
    } else {
        query.filter(users::totvs_number.eq(identifier.to_string()))
    };
    let lookup: Option<User> = query
        .first(&mut conn)
        .optional()
        .map_err(|_| ApiError::db_error())?;

    let Some(user) = lookup else {
        warn!(identifier = %lockout_key, "Login attempt for unknown identifier");
        return Err(reject_login(&state, &mut conn, &lockout_key, None, &request_id).await);
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "Failed teacher login - invalid password");
        return Err(reject_login(
            &state,
            &mut conn,
            &lockout_key,
            Some((user.id, AggregateType::User)),
            &request_id,
        )
        .await);
    }

    if !user.active {
        warn!(user_id = %user.id, "Login attempt for inactive teacher");
        record_auth_attempt("login", AuthOutcome::AccountInactive);
        return Err(ApiError::forbidden(ACCOUNT_DISABLED, "ACCOUNT_INACTIVE"));
    }

    let _ = state.lockout.clear_failed_attempts(&lockout_key).await;
    cleanup_expired_tokens(&mut conn, user.id);
    let (access_token, refresh_token) = generate_tokens(&state, &mut conn, &Principal::teacher(&user))?;

    emit_auth_event(
        &mut conn,
        EventType::LoginSuccess,
        AggregateType::User,
        user.id,
        &LoginPayload {
            identifier: user.email.clone(),
            role: Some(Role::Teacher.as_str().to_string()),
            reason: None,
        },
        &request_id,
    );

    record_auth_attempt("login", AuthOutcome::Success);
    info!(user_id = %user.id, "Teacher logged in");

    Ok(Json(AuthResponse {
        profile: Profile::Teacher(user.into()),
        access_token,
        refresh_token,
    }))
}

fn load_principal(conn: &mut PgConnection, id: Uuid, role: Role) -> ApiResult<Principal> {
    match role {
        Role::Teacher => {
            let user: User = users::table
                .find(id)
                .select(User::as_select())
                .first(conn)
                .map_err(|_| ApiError::unauthorized("User not found", "USER_NOT_FOUND"))?;
            if !user.active {
                return Err(ApiError::forbidden(ACCOUNT_DISABLED, "ACCOUNT_INACTIVE"));
            }
            Ok(Principal::teacher(&user))
        }
        Role::Admin => {
            let admin: Admin = admins::table
                .find(id)
                .select(Admin::as_select())
                .first(conn)
                .map_err(|_| ApiError::unauthorized("User not found", "USER_NOT_FOUND"))?;
            Ok(Principal::admin(&admin))
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens refreshed", body = RefreshResponse),
        (status = 401, description = "Invalid or expired refresh token", body = ApiError),
        (status = 403, description = "Account disabled", body = ApiError)
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let refresh_claims = state
        .jwt_config
        .verify_refresh_token(&payload.refresh_token)
        .map_err(|_| {
            ApiError::unauthorized("Invalid or expired refresh token", "INVALID_REFRESH_TOKEN")
        })?;

    let claimed_id = Uuid::parse_str(&refresh_claims.sub)
        .map_err(|_| ApiError::bad_request("Invalid token format", "INVALID_TOKEN_FORMAT"))?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let (stored_id, stored_kind) =
        verify_stored_token(&mut conn, &payload.refresh_token).map_err(|msg| {
            warn!(principal_id = %claimed_id, "Refresh token not found in database");
            ApiError::unauthorized(msg, "INVALID_REFRESH_TOKEN")
        })?;

    if stored_id != claimed_id || stored_kind != refresh_claims.role.as_str() {
        warn!(claimed = %claimed_id, stored = %stored_id, "Refresh token owner mismatch");
        return Err(ApiError::unauthorized(
            "Invalid refresh token",
            "TOKEN_USER_MISMATCH",
        ));
    }

    let principal = load_principal(&mut conn, claimed_id, refresh_claims.role)?;

    if state.rotate_refresh_tokens {
        invalidate_token(&mut conn, &payload.refresh_token).map_err(|e| {
            error!(error = %e, "Failed to invalidate old refresh token");
            ApiError::internal("Token invalidation failed", "TOKEN_INVALIDATION_ERROR")
        })?;

        let (access_token, refresh_token) = generate_tokens(&state, &mut conn, &principal)?;
        info!(principal_id = %principal.id, "Tokens refreshed (rotated)");

        return Ok(Json(RefreshResponse {
            access_token,
            refresh_token,
        }));
    }

    let access_token = state
        .jwt_config
        .generate_access_token(
            principal.id,
            &principal.identifier,
            principal.role,
            principal.unit.clone(),
        )
        .map_err(token_error)?;

    info!(principal_id = %principal.id, "Access token refreshed");

    Ok(Json(RefreshResponse {
        access_token,
        refresh_token: payload.refresh_token,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses((status = 204, description = "Logged out"))
)]
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let _ = invalidate_token(&mut conn, &payload.refresh_token);
    info!("Session ended");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/logout-all",
    tag = "Authentication",
    responses(
        (status = 204, description = "Logged out from all devices"),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    request_id: RequestId,
) -> ApiResult<StatusCode> {
    let id = principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let deleted = diesel::delete(refresh_tokens::table.filter(refresh_tokens::principal_id.eq(id)))
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to delete refresh tokens");
            ApiError::internal("Failed to logout", "LOGOUT_ERROR")
        })?;

    let _ = state
        .cache
        .token_revocation
        .revoke_all_for_principal(id, state.jwt_config.access_token_expiry as u64)
        .await;

    let aggregate = match claims.role {
        Role::Teacher => AggregateType::User,
        Role::Admin => AggregateType::Admin,
    };
    emit_auth_event(
        &mut conn,
        EventType::LogoutCompleted,
        aggregate,
        id,
        &LoginPayload {
            identifier: claims.identifier.clone(),
            role: Some(claims.role.as_str().to_string()),
            reason: Some("all_devices".to_string()),
        },
        &request_id,
    );

    info!(principal_id = %id, tokens_deleted = deleted, "Logged out from all devices");
    Ok(StatusCode::NO_CONTENT)
}

/// Revokes the access token used for this request.
#[utoipa::path(
    post,
    path = "/auth/revoke",
    tag = "Authentication",
    responses(
        (status = 200, description = "Token revoked", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn revoke_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> ApiResult<Json<MessageResponse>> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("Missing token", "MISSING_TOKEN"))?;

    let remaining_secs = (claims.exp - Utc::now().timestamp()).max(0) as u64;
    if remaining_secs == 0 {
        return Ok(MessageResponse::new("Token already expired"));
    }

    if !state.cache.token_revocation.is_available() {
        warn!("Token revocation requested but Redis is not configured");
        return Ok(MessageResponse::new(
            "Token revocation not available (Redis not configured)",
        ));
    }

    state
        .cache
        .token_revocation
        .revoke_token(&hash_token(token), remaining_secs)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to revoke token");
            ApiError::internal("Failed to revoke token", "REVOCATION_ERROR")
        })?;

    info!(principal_id = %claims.sub, "Access token revoked");
    Ok(MessageResponse::new("Token revoked"))
}

/// Profile of whoever holds the token.
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Authentication",
    responses(
        (status = 200, description = "Current profile", body = Profile),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Profile not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Profile>> {
    let id = principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let profile = match claims.role {
        Role::Teacher => {
            let user: User = users::table
                .find(id)
                .select(User::as_select())
                .first(&mut conn)
                .map_err(|_| ApiError::not_found("Usuário não encontrado.", "USER_NOT_FOUND"))?;
            Profile::Teacher(user.into())
        }
        Role::Admin => {
            let admin: Admin = admins::table
                .find(id)
                .select(Admin::as_select())
                .first(&mut conn)
                .map_err(|_| ApiError::not_found("Usuário não encontrado.", "USER_NOT_FOUND"))?;
            Profile::Admin(AdminProfile::new(admin, &state.booking.super_admin_unit))
        }
    };

    Ok(Json(profile))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[schema(min_length = 8)]
    pub new_password: String,
}

#[utoipa::path(
    post,
    path = "/auth/change-password",
    tag = "Authentication",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Password policy violation", body = ApiError),
        (status = 401, description = "Current password is wrong", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .password_policy
        .validate(&payload.new_password)
        .map_err(|e| ApiError::bad_request(e.to_string(), "PASSWORD_POLICY_VIOLATION"))?;

    let id = principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let current_hash: String = match claims.role {
        Role::Teacher => users::table
            .find(id)
            .select(users::password_hash)
            .first(&mut conn),
        Role::Admin => admins::table
            .find(id)
            .select(admins::password_hash)
            .first(&mut conn),
    }
    .map_err(|_| ApiError::not_found("Usuário não encontrado.", "USER_NOT_FOUND"))?;

    if !verify_password(&payload.current_password, &current_hash)? {
        record_auth_attempt("change_password", AuthOutcome::InvalidCredentials);
        return Err(ApiError::unauthorized(
            "A senha atual está incorreta.",
            "INVALID_CREDENTIALS",
        ));
    }

    let new_hash = hash_password(&state, &payload.new_password)?;
    let now = Utc::now().naive_utc();

    match claims.role {
        Role::Teacher => diesel::update(users::table.find(id))
            .set((users::password_hash.eq(&new_hash), users::updated_at.eq(now)))
            .execute(&mut conn),
        Role::Admin => diesel::update(admins::table.find(id))
            .set((admins::password_hash.eq(&new_hash), admins::updated_at.eq(now)))
            .execute(&mut conn),
    }
    .map_err(|e| {
        error!(error = %e, "Failed to update password");
        ApiError::internal("Failed to change password", "PASSWORD_UPDATE_ERROR")
    })?;

    record_auth_attempt("change_password", AuthOutcome::Success);
    info!(principal_id = %id, role = claims.role.as_str(), "Password changed");

    Ok(MessageResponse::new("Senha alterada com sucesso."))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    #[schema(example = "maria.silva@objetivoportal.com.br")]
    pub email: String,
    #[schema(example = "123456")]
    pub totvs_number: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForgotPasswordResponse {
    pub message: String,
    /// Handed to the caller in place of an email link.
    pub reset_token: String,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    #[schema(min_length = 8)]
    pub password: String,
}

fn generate_reset_token() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Issues a reset token once the email and TOTVS number are confirmed to
/// belong to the same active teacher.
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    tag = "Authentication",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset token issued", body = ForgotPasswordResponse),
        (status = 400, description = "Missing fields", body = ApiError),
        (status = 404, description = "Email and TOTVS number do not match", body = ApiError)
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(payload): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<ForgotPasswordResponse>> {
    if payload.email.trim().is_empty() || payload.totvs_number.trim().is_empty() {
        return Err(ApiError::validation(
            "Por favor, preencha todos os campos obrigatórios.",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;

    let user: Option<User> = users::table
        .filter(users::email.eq(payload.email.trim().to_lowercase()))
        .filter(users::totvs_number.eq(payload.totvs_number.trim()))
        .filter(users::active.eq(true))
        .select(User::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, "Database error looking up teacher");
            ApiError::db_error()
        })?;

    let Some(user) = user else {
        return Err(ApiError::not_found(
            "Dados não conferem. Verifique o Número TOTVS e o Email informados.",
            "IDENTITY_MISMATCH",
        ));
    };

    let token = generate_reset_token();
    let expires_at = (Utc::now() + Duration::minutes(RESET_TOKEN_MINUTES)).naive_utc();

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(
            password_reset_tokens::table.filter(password_reset_tokens::user_id.eq(user.id)),
        )
        .execute(conn)?;

        diesel::insert_into(password_reset_tokens::table)
            .values(&NewPasswordResetToken {
                user_id: user.id,
                token_hash: hash_token(&token),
                expires_at,
            })
            .execute(conn)?;
        Ok(())
    })
    .map_err(|e| {
        error!(error = %e, "Failed to create password reset token");
        ApiError::internal("Failed to initiate password reset", "RESET_TOKEN_ERROR")
    })?;

    emit_auth_event(
        &mut conn,
        EventType::PasswordResetRequested,
        AggregateType::User,
        user.id,
        &LoginPayload {
            identifier: user.email.clone(),
            role: None,
            reason: None,
        },
        &request_id,
    );

    info!(user_id = %user.id, "Password reset requested");

    Ok(Json(ForgotPasswordResponse {
        message: "Solicitação de redefinição de senha criada.".to_string(),
        reset_token: token,
        expires_at,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    tag = "Authentication",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = ApiError)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .password_policy
        .validate(&payload.password)
        .map_err(|e| ApiError::bad_request(e.to_string(), "PASSWORD_POLICY_VIOLATION"))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let now = Utc::now().naive_utc();

    let reset_token: Option<(Uuid, Uuid)> = password_reset_tokens::table
        .filter(password_reset_tokens::token_hash.eq(hash_token(&payload.token)))
        .filter(password_reset_tokens::expires_at.gt(now))
        .filter(password_reset_tokens::used_at.is_null())
        .select((password_reset_tokens::id, password_reset_tokens::user_id))
        .first(&mut conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, "Database error looking up reset token");
            ApiError::db_error()
        })?;

    let Some((token_id, user_id)) = reset_token else {
        return Err(ApiError::bad_request(
            "Link de redefinição inválido ou expirado.",
            "INVALID_RESET_TOKEN",
        ));
    };

    let password_hash = hash_password(&state, &payload.password)?;

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::update(users::table.find(user_id))
            .set((
                users::password_hash.eq(&password_hash),
                users::updated_at.eq(now),
            ))
            .execute(conn)?;

        diesel::update(password_reset_tokens::table.find(token_id))
            .set(password_reset_tokens::used_at.eq(Some(now)))
            .execute(conn)?;

        diesel::delete(refresh_tokens::table.filter(refresh_tokens::principal_id.eq(user_id)))
            .execute(conn)?;
        Ok(())
    })
    .map_err(|e| {
        error!(error = %e, "Failed to reset password");
        ApiError::internal("Failed to reset password", "PASSWORD_UPDATE_ERROR")
    })?;

    let _ = state
        .cache
        .token_revocation
        .revoke_all_for_principal(user_id, state.jwt_config.access_token_expiry as u64)
        .await;

    emit_auth_event(
        &mut conn,
        EventType::PasswordResetCompleted,
        AggregateType::User,
        user_id,
        &LoginPayload {
            identifier: user_id.to_string(),
            role: None,
            reason: None,
        },
        &request_id,
    );

    info!(user_id = %user_id, "Password reset completed");
    Ok(MessageResponse::new("Senha redefinida com sucesso."))
}
