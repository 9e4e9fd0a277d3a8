pub mod entities;
pub mod events;
pub mod messaging;
pub mod repositories;

pub use entities::*;
pub use events::*;
pub use messaging::*;
pub use repositories::*;
pub use teletest_errors::{TeletestError, TeletestResult};
