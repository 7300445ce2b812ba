pub mod qr;
pub mod routes;
pub mod utils;
