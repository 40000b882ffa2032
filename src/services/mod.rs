pub mod dates;
pub mod dimensions;
pub mod integrity;
pub mod payment_matrix;
pub mod refresher;
pub mod sheets;
pub mod snapshot;
pub mod sticker_matrix;
