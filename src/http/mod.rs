pub mod method;
pub mod request;
pub mod response;
pub mod transport;

pub use method::HttpMethod;
pub use request::HttpRequest;
pub use response::HttpResponse;
pub use transport::{ReqwestTransport, Transport};
