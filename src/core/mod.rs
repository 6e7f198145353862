pub mod change;
pub mod mime;
pub mod record;
