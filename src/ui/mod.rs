pub mod layout;
pub mod renderer;
pub mod state;
pub mod terminal;

pub use state::{Effect, Event, SortKey, ViewState};
pub use terminal::{run_ui, UiOptions};
