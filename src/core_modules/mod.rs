pub mod classifier;
pub mod frame;
pub mod frame_adapter;
pub mod geometry;
pub mod labels;
pub mod model_slot;
pub mod preprocess;
pub mod single_flight;
