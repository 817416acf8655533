mod author;
mod endpoint;
mod message;
mod model_id;
mod operation;
mod slash_commands;
mod todo;

pub use author::*;
pub use endpoint::*;
pub use message::*;
pub use model_id::*;
pub use operation::*;
pub use slash_commands::*;
pub use todo::*;
