mod committable;
mod entity;
mod event_record;

pub use committable::Committable;
pub use entity::Entity;
pub use event_record::EventRecord;

pub(crate) use event_record::payload_serde;
