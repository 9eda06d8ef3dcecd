pub mod releases;
pub mod repos;
pub mod webhooks;



pub use releases::configure_release_routes;
pub use repos::configure_repo_routes;
pub use webhooks::configure_webhook_routes;
