//! Sitelog Notifications
//!
//! [`NotificationDispatcher`] routes a [`NotificationRequest`](sitelog_core::NotificationRequest)
//! to the channels its severity calls for and delivers on each of them
//! concurrently:
//!
//! | severity            | email | push |
//! |---------------------|-------|------|
//! | info                | only if subscribed | no |
//! | warning, error      | yes   | no   |
//! | critical            | yes   | yes  |
//!
//! Every channel gets one try and a single quick retry. A failing channel never
//! blocks or undoes delivery on the other one.

pub mod channel;
pub mod dispatcher;
pub mod email;
pub mod memory;
pub mod push;

// Re-export commonly used types
pub use channel::{ChannelError, NotificationChannel};
pub use dispatcher::{route, DispatchReport, NotificationDispatcher};
pub use email::{EmailChannel, SmtpSettings};
pub use memory::MemoryChannel;
pub use push::PushChannel;
