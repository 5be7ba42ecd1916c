//! 会话层：会话标识、事件历史、按输出键保存的命名结果，以及会话存储抽象

pub mod store;
pub mod types;

pub use store::{InMemorySessionStore, SessionError, SessionStore};
pub use types::{Session, SessionEvent, SessionKey, USER_AUTHOR};
