//! OpenAPI document and the Swagger UI route.

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{
    admins, audit_logs, auth, bookings, catalog, classrooms, dashboard, equipment, health, loans,
    notifications, recurring, rooms, settings, teachers, verification,
};
use crate::pagination::PaginationMeta;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Agendamento API",
        version = "1.0.0",
        description = "Booking portal for the school network: equipment, rooms, classrooms \
        and equipment loans.\n\n\
        ## Profiles\n\
        - Teachers register with an institutional email and book equipment or rooms.\n\
        - Unit admins manage the inventory, bookings and teachers of their unit.\n\
        - Head-office admins see every unit, manage admins and read the audit log.\n\n\
        ## Authentication\n\
        1. Log in with a TOTVS number, email or admin username\n\
        2. Send the access token as `Authorization: Bearer <token>`\n\
        3. Use the refresh token to get a new pair when it expires",
        contact(
            name = "Agendamento"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Authentication", description = "Sign-up, login and token management"),
        (name = "Catalog", description = "School units"),
        (name = "Equipment", description = "Inventory and availability"),
        (name = "Bookings", description = "Equipment bookings and their terms"),
        (name = "Recurring", description = "Weekly bookings"),
        (name = "Rooms", description = "Rooms and room bookings"),
        (name = "Classrooms", description = "Classroom names used as booking locations"),
        (name = "Loans", description = "Equipment loans"),
        (name = "Settings", description = "Per-unit rules"),
        (name = "Teachers", description = "Teacher accounts"),
        (name = "Notifications", description = "Admin notification bell"),
        (name = "Dashboard", description = "Admin counters"),
        (name = "Admins", description = "Admin accounts (head office)"),
        (name = "Audit", description = "Audit log (head office)"),
        (name = "Verification", description = "Public QR code check")
    ),
    paths(
        health::health_check_simple,
        health::health_check,
        health::ready_check,
        health::live_check,

        auth::register,
        auth::login,
        auth::refresh_token,
        auth::logout,
        auth::logout_all,
        auth::revoke_token,
        auth::get_current_user,
        auth::change_password,
        auth::forgot_password,
        auth::reset_password,

        catalog::list_units,
        verification::verify_booking,

        equipment::availability,
        equipment::list_equipment,
        equipment::create_equipment,
        equipment::update_equipment,
        equipment::delete_equipment,

        bookings::create_booking,
        bookings::my_bookings,
        bookings::cancel_booking,
        bookings::list_admin_bookings,
        bookings::delete_bookings,
        bookings::close_booking,

        recurring::my_recurring,
        recurring::list_recurring,
        recurring::deactivate_recurring,
        recurring::generate_now,

        rooms::list_rooms,
        rooms::room_occupancy,
        rooms::create_room_booking,
        rooms::my_room_bookings,
        rooms::cancel_room_booking,
        rooms::admin_list_rooms,
        rooms::create_room,
        rooms::update_room,
        rooms::delete_room,
        rooms::toggle_room_availability,
        rooms::admin_list_room_bookings,
        rooms::admin_delete_room_booking,

        classrooms::list_classrooms,
        classrooms::create_classroom,
        classrooms::rename_classroom,
        classrooms::delete_classroom,
        classrooms::reorder_classrooms,

        loans::list_loans,
        loans::create_loan,
        loans::return_loan,
        loans::delete_loan,

        settings::get_booking_rules,
        settings::get_settings,
        settings::update_settings,

        teachers::list_teachers,
        teachers::update_teacher,
        teachers::toggle_teacher_active,
        teachers::remove_teacher_unit,

        notifications::list_notifications,
        notifications::mark_read,
        notifications::mark_all_read,
        notifications::delete_notification,

        dashboard::dashboard,

        admins::list_admins,
        admins::create_admin,
        admins::reset_admin_password,

        audit_logs::list_audit_logs,
    ),
    components(
        schemas(
            crate::error::ApiError,
            PaginationMeta,

            auth::RegisterRequest,
            auth::LoginRequest,
            auth::RefreshRequest,
            auth::AuthResponse,
            auth::RefreshResponse,
            auth::Profile,
            auth::TeacherProfile,
            auth::AdminProfile,
            auth::MessageResponse,
            auth::ChangePasswordRequest,
            auth::ForgotPasswordRequest,
            auth::ForgotPasswordResponse,
            auth::ResetPasswordRequest,

            catalog::SchoolUnit,

            crate::models::Equipment,
            crate::scheduling::availability::EquipmentAvailability,
            equipment::EquipmentRequest,

            crate::models::Booking,
            crate::term::TermDocument,
            crate::term::TermEquipment,
            crate::term::TermKind,
            crate::scheduling::rules::EffectiveStatus,
            crate::scheduling::rules::StatusFilter,
            crate::scheduling::rules::Period,
            crate::scheduling::rules::RecurrenceFilter,
            bookings::BookingLine,
            bookings::CreateBookingRequest,
            bookings::TeacherBooking,
            bookings::BookingConfirmation,
            bookings::AdminBooking,
            bookings::AdminBookingListResponse,
            bookings::DeleteBookingsRequest,
            bookings::DeleteBookingsResponse,

            crate::models::RecurringBooking,
            crate::scheduling::recurrence::RecurrenceLine,
            crate::scheduling::recurrence::GenerationReport,
            recurring::RecurringView,
            recurring::DeactivateResponse,

            crate::models::Room,
            crate::models::RoomBooking,
            rooms::RoomGroup,
            rooms::Interval,
            rooms::CreateRoomBookingRequest,
            rooms::RoomBookingConfirmation,
            rooms::RoomBookingView,
            rooms::RoomRequest,

            crate::models::Classroom,
            classrooms::ClassroomRequest,
            classrooms::ReorderRequest,

            crate::models::EquipmentLoan,
            loans::LoanStatusFilter,
            loans::LoanView,
            loans::CreateLoanRequest,

            crate::models::UnitSettings,
            settings::BookingRules,
            settings::UpdateSettingsRequest,

            teachers::TeacherSchema,
            teachers::UpdateTeacherRequest,
            teachers::RemoveUnitRequest,

            crate::models::Notification,
            notifications::NotificationList,
            notifications::MarkAllResponse,

            dashboard::DashboardPeriod,
            dashboard::DayCount,
            dashboard::RankedName,
            dashboard::DashboardStats,

            admins::AdminSchema,
            admins::CreateAdminRequest,
            admins::ResetAdminPasswordRequest,

            audit_logs::AuditLogView,
            crate::audit::formatter::FriendlySummary,
            crate::audit::formatter::IconType,

            verification::VerificationResult,
            verification::VerifiedBooking,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Access token from /auth/login.\n\
                            Send as `Authorization: Bearer <token>`",
                        ))
                        .build(),
                ),
            );
        }

        openapi.security = Some(vec![]);
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Agendamento API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_openapi_has_security_scheme() {
        let spec = ApiDoc::openapi();
        assert!(spec.components.is_some());
        let components = spec.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }

    #[test]
    fn test_openapi_has_tags() {
        let spec = ApiDoc::openapi();
        assert!(spec.tags.is_some());
        let tags = spec.tags.unwrap();
        assert!(tags.iter().any(|t| t.name == "Authentication"));
        assert!(tags.iter().any(|t| t.name == "Health"));
        assert!(tags.iter().any(|t| t.name == "Bookings"));
    }

    #[test]
    fn test_openapi_documents_booking_routes() {
        let spec = ApiDoc::openapi();
        assert!(spec.paths.paths.contains_key("/bookings"));
        assert!(spec.paths.paths.contains_key("/verify/{token}"));
        assert!(spec.paths.paths.contains_key("/admin/audit-logs"));
    }
}
