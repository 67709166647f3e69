pub mod cli;
pub mod http;

pub use cli::{build_source, Cli, CliError, CliHandler, Commands};
pub use http::{
    get_health, get_session, get_session_flows, get_session_graph, list_sessions, router,
    ApiError, ApiServer, AppState, FlowsResponse, HealthResponse, SessionDetailResponse,
    SessionsResponse,
};
