pub mod create;
pub mod qr_tokens;
pub mod utils;

pub use create::*;
pub use qr_tokens::*;
pub use utils::*;
