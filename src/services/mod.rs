pub mod counts;
pub mod kanban;
pub mod table_query;
pub mod transitions;

pub use counts::CountsService;
pub use kanban::KanbanColumnLoader;
pub use table_query::TableQueryService;
pub use transitions::TransitionDispatcher;
