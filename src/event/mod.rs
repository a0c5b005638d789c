//! 事件模块
//!
//! 把外部发布/订阅传输桥接为按实例的回调投递

pub mod adapter;
pub mod deliverer;
pub mod dispatcher;
pub mod memory;

pub use adapter::{EventAdapter, EventHandler};
pub use deliverer::Deliverer;
pub use dispatcher::{DISPATCHER_PLUGIN_NAME, EventDispatcher};
pub use memory::{InMemoryEventAdapter, Responder};
