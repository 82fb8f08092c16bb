//! OpenAPI documentation assembly, served through Swagger UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MedEquip Transfer API",
        description = "Equipment transfer lifecycle engine: status workflow, permission gating, table/kanban read models and transition dispatch."
    ),
    paths(
        crate::handlers::transfers::list_transfers,
        crate::handlers::transfers::transfer_counts,
        crate::handlers::transfers::kanban_board,
        crate::handlers::transfers::kanban_column,
        crate::handlers::transfers::get_transfer,
        crate::handlers::transfers::create_transfer,
        crate::handlers::transfers::update_transfer,
        crate::handlers::transfers::update_transfer_status,
        crate::handlers::transfers::complete_transfer,
        crate::handlers::transfers::delete_transfer,
    ),
    components(schemas(
        crate::models::TransferRequest,
        crate::models::TransferStatus,
        crate::models::TransferType,
        crate::models::ReceivingOrg,
        crate::lifecycle::TransferAction,
        crate::auth::permissions::Capabilities,
        crate::handlers::transfers::TransferDetail,
        crate::handlers::transfers::TransitionBody,
        crate::services::kanban::KanbanBoard,
        crate::services::kanban::ColumnPage,
        crate::services::transitions::CreateTransferInput,
        crate::store::TransferPage,
        crate::store::TransferCounts,
        crate::store::TransferPatch,
        crate::errors::ErrorResponse,
    )),
    tags(
        (name = "transfers", description = "Equipment transfer lifecycle"),
    )
)]
pub struct ApiDoc;
