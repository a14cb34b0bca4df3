//! Protocol implementation module
//!
//! This module defines the clock protocol wire layouts, the packed bit-field
//! accessors, and the paginated retrieval loop shared by rate and parent
//! enumeration.

pub mod codec;
pub mod iterator;
pub mod message;

pub use self::codec::Field;
pub use self::iterator::{PageState, Paginated};
pub use self::message::Command;
