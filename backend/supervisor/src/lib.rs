pub mod store;
pub mod supervisor;

pub use store::AlertStore;
pub use supervisor::Supervisor;
