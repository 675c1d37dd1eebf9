pub mod claude;
pub mod traits;

pub use claude::ClaudeModel;
pub use traits::{Completion, Prompt, TextModel};
