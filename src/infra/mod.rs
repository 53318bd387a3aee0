pub mod error;
pub mod http;
pub mod raster;
pub mod telemetry;
pub mod upstream;
