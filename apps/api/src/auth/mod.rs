// Session-cookie authentication: register, login, me, logout.
// Handlers read the session once through the `Session` extractor and pass it
// explicitly into the service functions.

pub mod handlers;
pub mod password;
pub mod service;
pub mod session;

pub use session::Session;
