pub mod access;
pub mod response;
pub mod tracer;

pub use access::{installation_access_middleware, InstallationQuery};
pub use response::{ApiResponse, ApiResult};
pub use tracer::{tracer_middleware, TRACER_HEADER};
