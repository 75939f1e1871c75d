//! OpenAPI schema aggregation for the gatekeeper API.
use crate::api::types::{
    AssignRoleRequest, CreateSessionRequest, CreateSessionResponse, ErrorResponse, HealthStatus,
    IdentityResponse, ReviewDecision, ReviewRequest, SubmitVerificationRequest,
    SubmitVerificationResponse, VerificationRequestListResponse, VerificationStatusResponse,
};
use crate::api::{access, admin, identities, internal, system, verification};
use crate::model::{RequestState, VerificationRequest};
use crate::workflow::{CurrentStatus, ReconcileReport};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "campus-gatekeeper",
        version = "v1",
        description = "Route guard, access checks and role verification workflow"
    ),
    paths(
        system::system_health,
        access::check_access,
        identities::current_identity,
        verification::submit_verification,
        verification::verification_status,
        admin::review_request,
        admin::list_verification_requests,
        admin::reconcile,
        admin::assign_role,
        internal::create_session
    ),
    components(schemas(
        ErrorResponse,
        HealthStatus,
        IdentityResponse,
        SubmitVerificationRequest,
        SubmitVerificationResponse,
        VerificationStatusResponse,
        CurrentStatus,
        ReviewDecision,
        ReviewRequest,
        VerificationRequest,
        VerificationRequestListResponse,
        RequestState,
        ReconcileReport,
        AssignRoleRequest,
        CreateSessionRequest,
        CreateSessionResponse
    )),
    tags(
        (name = "system", description = "Health endpoints"),
        (name = "access", description = "Forward-auth access checks"),
        (name = "identities", description = "Caller identity"),
        (name = "verification", description = "Role verification applications"),
        (name = "admin", description = "Verification review and role administration"),
        (name = "internal", description = "Session issuance for the trusted login front end")
    )
)]
pub struct ApiDoc;
