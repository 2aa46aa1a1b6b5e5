//! Types shared by the orders and payments services.
//!
//! Both services exchange JSON messages over two fanout destinations. The
//! message shapes and the topology names live here so that producers and
//! consumers cannot drift apart.

pub mod config;
pub mod contracts;
pub mod telemetry;
pub mod types;
pub mod workers;

pub use config::Config;
pub use contracts::{OrderCreated, PaymentResult, PaymentStatus, message_types, topology};
pub use types::{MessageId, Money, OrderId};
pub use workers::Workers;
