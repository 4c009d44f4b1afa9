//! Prompt state machine
//!
//! - **flags**: classification of a screen snapshot into named states
//! - **resolver**: answers special prompts until the screen is actionable

pub mod flags;
pub mod resolver;

pub use flags::{classify, PromptFlags};
pub use resolver::{response_for, PromptResolver, PromptTarget, DEFAULT_SAFETY_LIMIT};
