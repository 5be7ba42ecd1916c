//! 展示层：Ratatui + crossterm 的 TUI（app / event / render）与纯文本控制台输出（console）

pub mod app;
pub mod console;
pub mod event;
pub mod render;

pub use app::run_app;
pub use console::ConsolePresenter;
pub use event::EventHandler;
pub use render::draw;
