pub mod component;

pub use component::{ComponentSummary, IntentResponse, IntentResult};
