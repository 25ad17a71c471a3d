pub mod calibration;
pub mod camera;
pub mod config;
pub mod controller;
pub mod garment;
pub mod notify;
pub mod placement;
pub mod pose;
pub mod render;
pub mod smoothing;
