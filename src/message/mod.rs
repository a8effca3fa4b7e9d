//! Message-related types (`Msg`, `Control`, `Flags`).

mod control;
mod flags;
mod msg;

pub use control::Control;
pub use flags::Flags;
pub use msg::Msg;
