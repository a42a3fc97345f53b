pub mod documents;
pub mod fields;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod projects;
pub mod routes;

pub use routes::create_router;
