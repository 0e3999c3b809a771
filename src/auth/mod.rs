pub mod models;
pub mod sessions;
pub mod verification;

pub use sessions::AuthService;
