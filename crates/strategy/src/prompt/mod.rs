pub mod composer;
pub mod templates;

pub use composer::{PromptComposer, fmt_usd, render_account, render_market};
