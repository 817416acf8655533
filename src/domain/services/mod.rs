mod conversation;
mod executor;
mod interpreter;
mod todo_store;

pub use conversation::*;
pub use executor::*;
pub use interpreter::*;
pub use todo_store::*;
